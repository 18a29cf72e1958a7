//! Per-resource, per-contributor and per-run outcomes.
//!
//! ## Invariants
//!
//! - A subject that already existed reports `cost == 0` and the empty tx ref
//! - `created_count + updated_count` equals the number of successful results
//! - `total_cost` is the sum of every resource outcome's cost in the run
//! - `tx_refs` never contains the empty sentinel and is in submission order

use crate::ledger::types::{Amount, ResourceId, TxRef};
use serde::{Deserialize, Serialize};

/// Outcome of ensuring one subject or relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub stake_id: ResourceId,
    pub tx_ref: TxRef,
    pub cost: Amount,
    pub existed_before: bool,
}

impl ResourceOutcome {
    /// Resource was already on the ledger and nothing was submitted.
    pub fn existing(id: ResourceId) -> Self {
        Self {
            id,
            stake_id: id.stake_id(),
            tx_ref: TxRef::EMPTY,
            cost: 0,
            existed_before: true,
        }
    }

    /// Resource was created by `tx_ref`, depositing `cost`.
    pub fn created(id: ResourceId, tx_ref: TxRef, cost: Amount) -> Self {
        Self {
            id,
            stake_id: id.stake_id(),
            tx_ref,
            cost,
            existed_before: false,
        }
    }

    /// Resource already existed and `cost` was added to its stake by `tx_ref`.
    pub fn topped_up(id: ResourceId, tx_ref: TxRef, cost: Amount) -> Self {
        Self {
            id,
            stake_id: id.stake_id(),
            tx_ref,
            cost,
            existed_before: true,
        }
    }

    /// The submitted transaction, if any.
    pub fn submitted(&self) -> Option<TxRef> {
        (!self.tx_ref.is_empty()).then_some(self.tx_ref)
    }
}

/// Outcome for one contributor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorOutcome {
    pub contributor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<ResourceOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<ResourceOutcome>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContributorOutcome {
    pub fn succeeded(
        contributor: impl Into<String>,
        subject: ResourceOutcome,
        relationship: ResourceOutcome,
    ) -> Self {
        Self {
            contributor: contributor.into(),
            subject: Some(subject),
            relationship: Some(relationship),
            success: true,
            error: None,
        }
    }

    /// A failure; `subject` is set when the subject was ensured before the
    /// relationship failed. Ledger writes are never reverted.
    pub fn failed(
        contributor: impl Into<String>,
        subject: Option<ResourceOutcome>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            contributor: contributor.into(),
            subject,
            relationship: None,
            success: false,
            error: Some(error.into()),
        }
    }

    fn resources(&self) -> impl Iterator<Item = &ResourceOutcome> {
        self.subject.iter().chain(self.relationship.iter())
    }
}

/// Aggregated result of one attestation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttestationSummary {
    pub project_subject_id: ResourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_tx_ref: Option<TxRef>,
    pub contributor_count: usize,
    pub created_count: usize,
    pub updated_count: usize,
    pub tx_refs: Vec<TxRef>,
    pub total_cost: Amount,
    pub results: Vec<ContributorOutcome>,
}

impl AttestationSummary {
    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Accumulates outcomes into an [`AttestationSummary`] in submission order.
#[derive(Debug)]
pub struct SummaryBuilder {
    summary: AttestationSummary,
}

impl SummaryBuilder {
    /// Start a summary from the ensured project subject.
    pub fn new(project: &ResourceOutcome) -> Self {
        let mut builder = Self {
            summary: AttestationSummary {
                project_subject_id: project.id,
                project_tx_ref: project.submitted(),
                contributor_count: 0,
                created_count: 0,
                updated_count: 0,
                tx_refs: Vec::new(),
                total_cost: 0,
                results: Vec::new(),
            },
        };
        builder.spend(project);
        builder
    }

    /// Append one contributor outcome.
    ///
    /// The relationship's `existed_before` decides between created and
    /// updated; the subject's does not.
    pub fn record(&mut self, outcome: ContributorOutcome) {
        for resource in outcome.resources() {
            self.spend(resource);
        }
        if outcome.success {
            match outcome.relationship {
                Some(rel) if rel.existed_before => self.summary.updated_count += 1,
                _ => self.summary.created_count += 1,
            }
        }
        self.summary.contributor_count += 1;
        self.summary.results.push(outcome);
    }

    pub fn finish(self) -> AttestationSummary {
        self.summary
    }

    fn spend(&mut self, resource: &ResourceOutcome) {
        self.summary.total_cost += resource.cost;
        if let Some(tx) = resource.submitted() {
            self.summary.tx_refs.push(tx);
        }
    }
}

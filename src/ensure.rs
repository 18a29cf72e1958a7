//! Ensure a named resource exists on the ledger.
//!
//! One routine serves subjects and relationships:
//!
//! ```text
//! CHECKING ──found──▶ on_found: Keep ─────────────────────────────▶ DONE
//!    │                          AddStake ─▶ DEPOSITING ─▶ CONFIRMING ─▶ DONE
//!    └──not found──▶ CREATING ─▶ CONFIRMING ─────────────────────────▶ DONE
//! ```
//!
//! A strategy supplies the three capabilities that differ between resource
//! kinds: `lookup`, `create_new` and `on_found`. Funds checks, confirmation
//! and error mapping live here once.
//!
//! The whole sequence is a single retry unit: a transient failure anywhere
//! restarts it from the lookup. Every step is idempotent against ledger
//! state, so a restart can only find what the previous attempt wrote.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::traits::LedgerGateway;
use crate::ledger::types::{
    Amount, Created, RelationshipDescriptor, ResourceId, SubjectDescriptor, TxRef,
};
use crate::observer::{Event, Observer};
use crate::retry::{self, RetryPolicy};
use crate::summary::ResourceOutcome;
use async_trait::async_trait;
use std::future::Future;

/// What to do with a resource that is already on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoundAction {
    /// Nothing; report it as existing.
    Keep,
    /// Deposit this amount into its stake position.
    AddStake(Amount),
}

/// The per-kind capabilities of the ensure routine.
#[async_trait]
pub trait EnsureStrategy: Send + Sync {
    /// Short human-readable name of the resource, for events and errors.
    fn describe(&self) -> String;

    /// Deposit attached when the resource is created.
    fn deposit(&self) -> Amount;

    async fn lookup(&self, gateway: &dyn LedgerGateway) -> LedgerResult<Option<ResourceId>>;

    async fn create_new(&self, gateway: &dyn LedgerGateway, stake: Amount)
        -> LedgerResult<Created>;

    fn on_found(&self, id: &ResourceId) -> FoundAction;
}

/// Subjects are created once and never re-staked.
pub struct SubjectStrategy<'a> {
    pub descriptor: &'a SubjectDescriptor,
    pub deposit: Amount,
}

#[async_trait]
impl<'a> EnsureStrategy for SubjectStrategy<'a> {
    fn describe(&self) -> String {
        format!("subject '{}'", self.descriptor.name)
    }

    fn deposit(&self) -> Amount {
        self.deposit
    }

    async fn lookup(&self, gateway: &dyn LedgerGateway) -> LedgerResult<Option<ResourceId>> {
        gateway.find_subject(&self.descriptor.key()).await
    }

    async fn create_new(
        &self,
        gateway: &dyn LedgerGateway,
        stake: Amount,
    ) -> LedgerResult<Created> {
        gateway.create_subject(self.descriptor, stake).await
    }

    fn on_found(&self, _id: &ResourceId) -> FoundAction {
        FoundAction::Keep
    }
}

/// Relationships accumulate stake every time they are observed again.
pub struct RelationshipStrategy {
    pub descriptor: RelationshipDescriptor,
    pub deposit: Amount,
}

#[async_trait]
impl EnsureStrategy for RelationshipStrategy {
    fn describe(&self) -> String {
        format!("relationship {}", self.descriptor.key())
    }

    fn deposit(&self) -> Amount {
        self.deposit
    }

    async fn lookup(&self, gateway: &dyn LedgerGateway) -> LedgerResult<Option<ResourceId>> {
        let d = &self.descriptor;
        gateway
            .find_relationship(&d.subject_id, &d.predicate_id, &d.object_id)
            .await
    }

    async fn create_new(
        &self,
        gateway: &dyn LedgerGateway,
        stake: Amount,
    ) -> LedgerResult<Created> {
        gateway.create_relationship(&self.descriptor, stake).await
    }

    fn on_found(&self, _id: &ResourceId) -> FoundAction {
        FoundAction::AddStake(self.deposit)
    }
}

/// Minimum deposits per resource kind; a network setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deposits {
    pub subject: Amount,
    pub relationship: Amount,
}

/// Ensures subjects and relationships through one gateway, under one retry
/// policy.
pub struct ResourceEnsurer<'a> {
    gateway: &'a dyn LedgerGateway,
    policy: &'a RetryPolicy,
    observer: &'a dyn Observer,
    deposits: Deposits,
}

impl<'a> ResourceEnsurer<'a> {
    pub fn new(
        gateway: &'a dyn LedgerGateway,
        policy: &'a RetryPolicy,
        observer: &'a dyn Observer,
        deposits: Deposits,
    ) -> Self {
        Self {
            gateway,
            policy,
            observer,
            deposits,
        }
    }

    pub async fn ensure_subject(
        &self,
        descriptor: &SubjectDescriptor,
    ) -> LedgerResult<ResourceOutcome> {
        descriptor.validate()?;
        let strategy = SubjectStrategy {
            descriptor,
            deposit: self.deposits.subject,
        };
        self.ensure(&strategy).await
    }

    pub async fn ensure_relationship(
        &self,
        descriptor: RelationshipDescriptor,
    ) -> LedgerResult<ResourceOutcome> {
        let strategy = RelationshipStrategy {
            descriptor,
            deposit: self.deposits.relationship,
        };
        self.ensure(&strategy).await
    }

    /// Run the ensure routine for any strategy, retried as one unit.
    pub async fn ensure<S: EnsureStrategy>(&self, strategy: &S) -> LedgerResult<ResourceOutcome> {
        retry::execute(|| self.ensure_once(strategy), self.policy, self.observer).await
    }

    async fn ensure_once<S: EnsureStrategy>(&self, strategy: &S) -> LedgerResult<ResourceOutcome> {
        let found = match strategy.lookup(self.gateway).await {
            Ok(found) => found,
            Err(err) => {
                // Unreadable is treated as absent. A duplicate create fails
                // with a retryable conflict and the next attempt finds it.
                self.observer.emit(Event::LookupDegraded {
                    resource: strategy.describe(),
                    message: err.to_string(),
                });
                None
            }
        };

        match found {
            Some(id) => match strategy.on_found(&id) {
                FoundAction::Keep => Ok(ResourceOutcome::existing(id)),
                FoundAction::AddStake(amount) => {
                    let operation = format!("add stake to {}", strategy.describe());
                    let deposited = self
                        .submit_and_confirm(amount, &operation, || async move {
                            self.gateway
                                .add_stake(&id, amount)
                                .await
                                .map(|deposited| Created {
                                    id,
                                    tx_ref: deposited.tx_ref,
                                })
                        })
                        .await?;
                    Ok(ResourceOutcome::topped_up(id, deposited.tx_ref, amount))
                }
            },
            None => {
                let stake = strategy.deposit();
                let operation = format!("create {}", strategy.describe());
                let created = self
                    .submit_and_confirm(stake, &operation, || {
                        strategy.create_new(self.gateway, stake)
                    })
                    .await?;
                Ok(ResourceOutcome::created(created.id, created.tx_ref, stake))
            }
        }
    }

    /// Check funds, submit, and wait for confirmation.
    async fn submit_and_confirm<F, Fut>(
        &self,
        amount: Amount,
        operation: &str,
        submit: F,
    ) -> LedgerResult<Created>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = LedgerResult<Created>>,
    {
        self.gateway
            .assert_sufficient_balance(amount)
            .await
            .map_err(|e| e.into_transaction_failure(operation, None))?;

        let created = submit()
            .await
            .map_err(|e| e.into_transaction_failure(operation, None))?;

        self.confirm(&created.tx_ref, operation).await?;
        Ok(created)
    }

    async fn confirm(&self, tx_ref: &TxRef, operation: &str) -> LedgerResult<()> {
        let confirmation = self
            .gateway
            .await_confirmation(tx_ref)
            .await
            .map_err(|e| e.into_transaction_failure(operation, Some(*tx_ref)))?;
        if !confirmation.confirmed {
            return Err(LedgerError::transaction_failed(
                Some(*tx_ref),
                format!(
                    "{}: not confirmed (included in block {})",
                    operation, confirmation.block_ref
                ),
            ));
        }
        Ok(())
    }
}

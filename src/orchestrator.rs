//! Attestation orchestration.
//!
//! Ensures the project subject once, then walks the contributors in input
//! order: ensure the contributor's subject, then the "has contributed to"
//! relationship to the project. Ledger calls are strictly sequential; every
//! write debits the same funding identity and concurrent submissions from one
//! identity race at the ledger layer.
//!
//! The failure mode is applied in exactly one place, [`FailureMode::settle`],
//! which turns a contributor's attempt into either an outcome or a run-ending
//! error.

use crate::ensure::{Deposits, ResourceEnsurer};
use crate::error::{LedgerError, LedgerResult};
use crate::ledger::traits::LedgerGateway;
use crate::ledger::types::{ContributorDescriptor, RelationshipDescriptor, SubjectDescriptor};
use crate::observer::{Event, Observer, TracingObserver};
use crate::retry::RetryPolicy;
use crate::summary::{AttestationSummary, ContributorOutcome, ResourceOutcome, SummaryBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// What a contributor failure does to the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// The first failing contributor ends the run with its error.
    Abort,
    /// Failing contributors are recorded and the run moves on.
    #[default]
    Continue,
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::Continue => write!(f, "continue"),
        }
    }
}

impl FromStr for FailureMode {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(LedgerError::invalid_input(format!(
                "unknown failure mode '{}' (expected abort or continue)",
                other
            ))),
        }
    }
}

/// What happened when one contributor was processed.
#[derive(Debug)]
pub enum ContributorAttempt {
    Completed {
        subject: ResourceOutcome,
        relationship: ResourceOutcome,
    },
    /// `subject` is set when the failure came from the relationship step.
    Failed {
        subject: Option<ResourceOutcome>,
        error: LedgerError,
    },
}

impl FailureMode {
    /// Turn an attempt into an outcome; under `Abort` a failure is returned
    /// as the run's error instead.
    pub fn settle(
        self,
        contributor: &str,
        attempt: ContributorAttempt,
    ) -> LedgerResult<ContributorOutcome> {
        match (attempt, self) {
            (
                ContributorAttempt::Completed {
                    subject,
                    relationship,
                },
                _,
            ) => Ok(ContributorOutcome::succeeded(contributor, subject, relationship)),
            (ContributorAttempt::Failed { error, .. }, FailureMode::Abort) => Err(error),
            (ContributorAttempt::Failed { subject, error }, FailureMode::Continue) => Ok(
                ContributorOutcome::failed(contributor, subject, error.to_string()),
            ),
        }
    }
}

/// Links contributors to a project on the ledger.
pub struct AttestationOrchestrator<G: LedgerGateway> {
    gateway: G,
    deposits: Deposits,
    observer: Arc<dyn Observer>,
}

impl<G: LedgerGateway> AttestationOrchestrator<G> {
    pub fn new(gateway: G, deposits: Deposits) -> Self {
        Self {
            gateway,
            deposits,
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Ensure the project, every contributor and every contributor-to-project
    /// relationship, and summarize what was spent.
    ///
    /// A failure to ensure the project always ends the run. Contributor
    /// failures end it only under [`FailureMode::Abort`].
    pub async fn run(
        &self,
        project: &SubjectDescriptor,
        contributors: &[ContributorDescriptor],
        failure_mode: FailureMode,
        retry_policy: &RetryPolicy,
    ) -> LedgerResult<AttestationSummary> {
        let observer = self.observer.as_ref();
        let ensurer = ResourceEnsurer::new(&self.gateway, retry_policy, observer, self.deposits);

        self.report_funding().await;

        observer.emit(Event::progress(
            "project",
            format!("ensuring project subject '{}'", project.name),
        ));
        let project_outcome = ensurer.ensure_subject(project).await?;
        observer.emit(Event::progress(
            "project",
            format!(
                "project subject {} {}",
                project_outcome.id,
                if project_outcome.existed_before {
                    "already existed"
                } else {
                    "created"
                }
            ),
        ));

        let mut summary = SummaryBuilder::new(&project_outcome);
        let total = contributors.len();

        for (index, contributor) in contributors.iter().enumerate() {
            let label = contributor.label();
            observer.emit(Event::progress(
                "contributor",
                format!("[{}/{}] attesting {}", index + 1, total, label),
            ));

            let attempt = attest_contributor(&ensurer, &project_outcome, contributor).await;
            if let ContributorAttempt::Failed { error, .. } = &attempt {
                if failure_mode == FailureMode::Continue {
                    observer.emit(Event::ContributorFailed {
                        contributor: label.to_string(),
                        message: error.to_string(),
                    });
                }
            }
            summary.record(failure_mode.settle(label, attempt)?);
        }

        let summary = summary.finish();
        observer.emit(Event::progress(
            "summary",
            format!(
                "{} contributors: {} created, {} updated, {} failed; total cost {}",
                summary.contributor_count,
                summary.created_count,
                summary.updated_count,
                summary.failed_count(),
                summary.total_cost
            ),
        ));
        Ok(summary)
    }

    /// Report the funding identity and its balance. Informational only.
    async fn report_funding(&self) {
        let funding = async {
            let address = self.gateway.address().await?;
            let balance = self.gateway.balance().await?;
            Ok::<_, LedgerError>((address, balance))
        };
        match funding.await {
            Ok((address, balance)) => self.observer.emit(Event::progress(
                "funding",
                format!("funding identity {} holds {}", address, balance),
            )),
            Err(err) => self.observer.emit(Event::LookupDegraded {
                resource: "funding balance".to_string(),
                message: err.to_string(),
            }),
        }
    }
}

/// Ensure one contributor's subject and its relationship to the project.
async fn attest_contributor(
    ensurer: &ResourceEnsurer<'_>,
    project: &ResourceOutcome,
    contributor: &ContributorDescriptor,
) -> ContributorAttempt {
    let subject = match ensurer.ensure_subject(&contributor.to_subject()).await {
        Ok(subject) => subject,
        Err(error) => {
            return ContributorAttempt::Failed {
                subject: None,
                error,
            }
        }
    };

    let relationship = RelationshipDescriptor::contributed_to(subject.id, project.id);
    match ensurer.ensure_relationship(relationship).await {
        Ok(relationship) => ContributorAttempt::Completed {
            subject,
            relationship,
        },
        Err(error) => ContributorAttempt::Failed {
            subject: Some(subject),
            error,
        },
    }
}

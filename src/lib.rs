//! Attestor - contribution attestation on a content-addressed ledger
//!
//! Links merged contributions to deposit-backed ledger records: one subject
//! per project, one subject per contributor, and one staked
//! "has contributed to" relationship between them, no matter how often a run
//! is repeated.
//!
//! Key principles:
//! - Check before create; the ledger is the only source of truth
//! - Every ledger interaction is retried as one idempotent unit
//! - Ledger writes are strictly sequential (one funding identity)
//! - Contributor failures abort or are recorded, never half-hidden

pub mod ensure;
pub mod error;
pub mod ledger;
pub mod observer;
pub mod orchestrator;
pub mod provider;
pub mod retry;
pub mod summary;

pub use ensure::{Deposits, ResourceEnsurer};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use orchestrator::{AttestationOrchestrator, FailureMode};
pub use retry::RetryPolicy;
pub use summary::{AttestationSummary, ContributorOutcome, ResourceOutcome};

//! Ledger access for the attestation core.
//!
//! - `types`: content-addressed identifiers and resource descriptors
//! - `traits`: the [`LedgerGateway`] the core consumes
//! - `memory`: an in-process gateway for tests and dry runs

pub mod memory;
pub mod traits;
pub mod types;

pub use memory::InMemoryLedger;
pub use traits::LedgerGateway;
pub use types::{
    Address, Amount, ContributorDescriptor, RelationshipDescriptor, ResourceId,
    SubjectDescriptor, TxRef,
};

//! Trait abstraction for ledger operations.
//!
//! The orchestration core consumes the ledger exclusively through
//! [`LedgerGateway`]. Key management, signing and transport belong to the
//! implementation; `InMemoryLedger` provides one for tests and dry runs.

use super::types::{
    Address, Amount, Confirmation, Created, Deposited, RelationshipDescriptor, ResourceId,
    SubjectDescriptor, TxRef,
};
use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;

/// Remote ledger gateway.
///
/// Any operation may fail with `TransientNetwork` on transport failure.
/// Implementations carry their own request and confirmation timeouts and
/// must not retry internally.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Funding identity that pays for every write.
    async fn address(&self) -> LedgerResult<Address>;

    /// Current balance of the funding identity.
    async fn balance(&self) -> LedgerResult<Amount>;

    /// Fail with `InsufficientFunds` when the balance is below `required`.
    async fn assert_sufficient_balance(&self, required: Amount) -> LedgerResult<()> {
        let balance = self.balance().await?;
        if balance < required {
            return Err(LedgerError::insufficient_funds(format!(
                "balance {} is below required {}",
                balance, required
            )));
        }
        Ok(())
    }

    /// Look up a subject by its identity key.
    async fn find_subject(&self, key: &ResourceId) -> LedgerResult<Option<ResourceId>>;

    /// Look up a relationship by its triple.
    async fn find_relationship(
        &self,
        subject_id: &ResourceId,
        predicate_id: &ResourceId,
        object_id: &ResourceId,
    ) -> LedgerResult<Option<ResourceId>>;

    /// Create a subject, depositing `stake` into its stake position.
    ///
    /// Fails with `RemoteApi(409)` when the subject already exists.
    async fn create_subject(
        &self,
        descriptor: &SubjectDescriptor,
        stake: Amount,
    ) -> LedgerResult<Created>;

    /// Create a relationship, depositing `stake` into its stake position.
    ///
    /// Fails with `RemoteApi(409)` when the relationship already exists.
    async fn create_relationship(
        &self,
        descriptor: &RelationshipDescriptor,
        stake: Amount,
    ) -> LedgerResult<Created>;

    /// Deposit `amount` into an existing relationship's stake position.
    async fn add_stake(&self, relationship_id: &ResourceId, amount: Amount)
        -> LedgerResult<Deposited>;

    /// Wait until `tx_ref` reaches the configured confirmation depth.
    ///
    /// Fails with `TransactionFailed` if the wait errors or the depth is
    /// never reached.
    async fn await_confirmation(&self, tx_ref: &TxRef) -> LedgerResult<Confirmation>;
}

//! In-process ledger for tests and dry runs.
//!
//! Behaves like the remote ledger as far as the orchestration core can tell:
//! content-addressed subjects and relationships, duplicate creation rejected,
//! a funding balance debited by every deposit, and transactions that confirm
//! after a configurable number of blocks. Failures can be scripted per
//! operation to exercise retry and failure-mode handling.

use super::traits::LedgerGateway;
use super::types::{
    relationship_key, Address, Amount, Confirmation, Created, Deposited, RelationshipDescriptor,
    ResourceId, SubjectDescriptor, TxRef,
};
use crate::error::{LedgerError, LedgerResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Gateway operations, used to script faults and count calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Address,
    Balance,
    FindSubject,
    FindRelationship,
    CreateSubject,
    CreateRelationship,
    AddStake,
    AwaitConfirmation,
}

/// A scripted failure, consumed by the next call of its operation.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail the call with this error.
    Error(LedgerError),
    /// Report the transaction as not confirmed (confirmation calls only).
    Unconfirmed,
}

/// A subject stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSubject {
    pub descriptor: SubjectDescriptor,
    pub stake_id: ResourceId,
}

/// A relationship stored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRelationship {
    pub descriptor: RelationshipDescriptor,
    pub stake_id: ResourceId,
}

/// Durable ledger state; everything a later run needs to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub address: Address,
    pub balance: Amount,
    pub confirmation_depth: u64,
    pub block_height: u64,
    pub nonce: u64,
    #[serde(default)]
    pub subjects: BTreeMap<ResourceId, StoredSubject>,
    #[serde(default)]
    pub relationships: BTreeMap<ResourceId, StoredRelationship>,
    /// Total deposited per stake position.
    #[serde(default)]
    pub stakes: BTreeMap<ResourceId, Amount>,
    /// Block each transaction was included in.
    #[serde(default)]
    pub transactions: BTreeMap<TxRef, u64>,
}

struct Inner {
    snapshot: LedgerSnapshot,
    faults: HashMap<Operation, VecDeque<Fault>>,
    calls: HashMap<Operation, usize>,
}

impl Inner {
    /// Count the call and pop the next scripted fault, if any.
    fn enter(&mut self, op: Operation) -> Option<Fault> {
        *self.calls.entry(op).or_insert(0) += 1;
        self.faults.get_mut(&op).and_then(VecDeque::pop_front)
    }

    fn enter_or_fail(&mut self, op: Operation) -> LedgerResult<()> {
        match self.enter(op) {
            Some(Fault::Error(err)) => Err(err),
            // Unconfirmed only applies to confirmation waits.
            Some(Fault::Unconfirmed) | None => Ok(()),
        }
    }

    fn debit(&mut self, amount: Amount) -> LedgerResult<()> {
        let balance = self.snapshot.balance;
        self.snapshot.balance = balance.checked_sub(amount).ok_or_else(|| {
            LedgerError::insufficient_funds(format!(
                "balance {} cannot cover deposit {}",
                balance, amount
            ))
        })?;
        Ok(())
    }

    /// Include a transaction in the next block.
    fn submit(&mut self, operation: &str, target: &ResourceId) -> TxRef {
        self.snapshot.nonce += 1;
        self.snapshot.block_height += 1;
        let tx_ref = TxRef::derive(self.snapshot.nonce, operation, target);
        self.snapshot
            .transactions
            .insert(tx_ref, self.snapshot.block_height);
        tx_ref
    }

    fn deposit(&mut self, stake_id: ResourceId, amount: Amount) {
        *self.snapshot.stakes.entry(stake_id).or_insert(0) += amount;
    }
}

/// Funding address controlled by a credential: the first 20 bytes of its
/// SHA-256, hex encoded.
pub fn address_for_credential(credential: &str) -> Address {
    let digest = Sha256::digest(credential.trim().as_bytes());
    Address(format!("0x{}", hex::encode(&digest[..20])))
}

/// In-memory [`LedgerGateway`].
#[derive(Clone)]
pub struct InMemoryLedger {
    state: Arc<Mutex<Inner>>,
}

impl InMemoryLedger {
    /// Create an empty ledger with a funded identity.
    pub fn new(address: Address, balance: Amount) -> Self {
        Self::from_snapshot(LedgerSnapshot {
            address,
            balance,
            confirmation_depth: 0,
            block_height: 0,
            nonce: 0,
            subjects: BTreeMap::new(),
            relationships: BTreeMap::new(),
            stakes: BTreeMap::new(),
            transactions: BTreeMap::new(),
        })
    }

    /// Create an empty ledger whose funding address is derived from an
    /// opaque credential.
    pub fn from_credential(credential: &str, balance: Amount) -> Self {
        Self::new(address_for_credential(credential), balance)
    }

    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            state: Arc::new(Mutex::new(Inner {
                snapshot,
                faults: HashMap::new(),
                calls: HashMap::new(),
            })),
        }
    }

    /// Blocks a transaction must be buried under before it counts as confirmed.
    pub fn with_confirmation_depth(self, depth: u64) -> Self {
        self.inner().snapshot.confirmation_depth = depth;
        self
    }

    /// Load a snapshot previously written by [`InMemoryLedger::save`].
    pub fn load(path: &Path) -> LedgerResult<Self> {
        let contents = fs::read_to_string(path)?;
        let snapshot: LedgerSnapshot = serde_json::from_str(&contents)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Persist the current snapshot as JSON.
    pub fn save(&self, path: &Path) -> LedgerResult<()> {
        let contents = serde_json::to_string_pretty(&self.snapshot())?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner().snapshot.clone()
    }

    /// Script a failure for the next call of `op`. Faults queue in FIFO order.
    pub fn fail_next(&self, op: Operation, err: LedgerError) {
        self.push_fault(op, Fault::Error(err));
    }

    /// Make the next confirmation wait report `confirmed: false`.
    pub fn reject_next_confirmation(&self) {
        self.push_fault(Operation::AwaitConfirmation, Fault::Unconfirmed);
    }

    fn push_fault(&self, op: Operation, fault: Fault) {
        self.inner().faults.entry(op).or_default().push_back(fault);
    }

    /// Number of calls made to `op` so far.
    pub fn calls(&self, op: Operation) -> usize {
        self.inner().calls.get(&op).copied().unwrap_or(0)
    }

    /// Total stake deposited behind a subject or relationship.
    pub fn stake_of(&self, id: &ResourceId) -> Amount {
        self.inner()
            .snapshot
            .stakes
            .get(&id.stake_id())
            .copied()
            .unwrap_or(0)
    }

    pub fn subject_count(&self) -> usize {
        self.inner().snapshot.subjects.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.inner().snapshot.relationships.len()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        // No code path panics while holding the lock.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerGateway for InMemoryLedger {
    async fn address(&self) -> LedgerResult<Address> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::Address)?;
        Ok(inner.snapshot.address.clone())
    }

    async fn balance(&self) -> LedgerResult<Amount> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::Balance)?;
        Ok(inner.snapshot.balance)
    }

    async fn find_subject(&self, key: &ResourceId) -> LedgerResult<Option<ResourceId>> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::FindSubject)?;
        Ok(inner.snapshot.subjects.contains_key(key).then_some(*key))
    }

    async fn find_relationship(
        &self,
        subject_id: &ResourceId,
        predicate_id: &ResourceId,
        object_id: &ResourceId,
    ) -> LedgerResult<Option<ResourceId>> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::FindRelationship)?;
        let key = relationship_key(subject_id, predicate_id, object_id);
        Ok(inner.snapshot.relationships.contains_key(&key).then_some(key))
    }

    async fn create_subject(
        &self,
        descriptor: &SubjectDescriptor,
        stake: Amount,
    ) -> LedgerResult<Created> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::CreateSubject)?;
        descriptor.validate()?;

        let id = descriptor.key();
        if inner.snapshot.subjects.contains_key(&id) {
            return Err(LedgerError::conflict(format!("subject {} already exists", id)));
        }
        inner.debit(stake)?;

        let stake_id = id.stake_id();
        inner.snapshot.subjects.insert(
            id,
            StoredSubject {
                descriptor: descriptor.clone(),
                stake_id,
            },
        );
        inner.deposit(stake_id, stake);
        let tx_ref = inner.submit("create_subject", &id);
        Ok(Created { id, tx_ref })
    }

    async fn create_relationship(
        &self,
        descriptor: &RelationshipDescriptor,
        stake: Amount,
    ) -> LedgerResult<Created> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::CreateRelationship)?;

        for endpoint in [&descriptor.subject_id, &descriptor.object_id] {
            if !inner.snapshot.subjects.contains_key(endpoint) {
                return Err(LedgerError::transaction_failed(
                    None,
                    format!("relationship endpoint {} does not exist", endpoint),
                ));
            }
        }
        let id = descriptor.key();
        if inner.snapshot.relationships.contains_key(&id) {
            return Err(LedgerError::conflict(format!(
                "relationship {} already exists",
                id
            )));
        }
        inner.debit(stake)?;

        let stake_id = id.stake_id();
        inner.snapshot.relationships.insert(
            id,
            StoredRelationship {
                descriptor: *descriptor,
                stake_id,
            },
        );
        inner.deposit(stake_id, stake);
        let tx_ref = inner.submit("create_relationship", &id);
        Ok(Created { id, tx_ref })
    }

    async fn add_stake(
        &self,
        relationship_id: &ResourceId,
        amount: Amount,
    ) -> LedgerResult<Deposited> {
        let mut inner = self.inner();
        inner.enter_or_fail(Operation::AddStake)?;

        if !inner.snapshot.relationships.contains_key(relationship_id) {
            return Err(LedgerError::remote_api(
                Some(404),
                format!("relationship {} not found", relationship_id),
            ));
        }
        inner.debit(amount)?;
        inner.deposit(relationship_id.stake_id(), amount);
        let tx_ref = inner.submit("add_stake", relationship_id);
        Ok(Deposited { tx_ref })
    }

    async fn await_confirmation(&self, tx_ref: &TxRef) -> LedgerResult<Confirmation> {
        let mut inner = self.inner();
        let fault = inner.enter(Operation::AwaitConfirmation);

        let included = inner.snapshot.transactions.get(tx_ref).copied();
        match (fault, included) {
            (Some(Fault::Error(err)), _) => Err(err),
            (_, None) => Err(LedgerError::transaction_failed(
                Some(*tx_ref),
                "transaction was never included",
            )),
            (Some(Fault::Unconfirmed), Some(block)) => Ok(Confirmation {
                confirmed: false,
                block_ref: block,
            }),
            (None, Some(block)) => {
                // Mine until the transaction is buried deep enough.
                let target = block.saturating_add(inner.snapshot.confirmation_depth);
                inner.snapshot.block_height = inner.snapshot.block_height.max(target);
                Ok(Confirmation {
                    confirmed: true,
                    block_ref: block,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::ledger::types::{contributed_to_predicate, subject_key};

    fn subject(url: &str) -> SubjectDescriptor {
        SubjectDescriptor {
            name: url.to_string(),
            description: String::new(),
            url: url.to_string(),
            image: None,
        }
    }

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new(Address("0xfunder".to_string()), 10_000)
    }

    #[tokio::test]
    async fn test_create_and_find_subject() {
        let ledger = ledger();
        let desc = subject("https://github.com/acme/widgets");

        assert_eq!(ledger.find_subject(&desc.key()).await.unwrap(), None);

        let created = ledger.create_subject(&desc, 100).await.unwrap();
        assert_eq!(created.id, desc.key());
        assert!(!created.tx_ref.is_empty());

        assert_eq!(
            ledger.find_subject(&desc.key()).await.unwrap(),
            Some(created.id)
        );
        assert_eq!(ledger.balance().await.unwrap(), 9_900);
        assert_eq!(ledger.stake_of(&created.id), 100);
    }

    #[tokio::test]
    async fn test_duplicate_subject_rejected() {
        let ledger = ledger();
        let desc = subject("https://github.com/acme/widgets");
        ledger.create_subject(&desc, 100).await.unwrap();

        let err = ledger.create_subject(&desc, 100).await.unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RemoteApi { status: Some(409) });
        assert!(err.is_retryable());
        assert_eq!(ledger.subject_count(), 1);
        assert_eq!(ledger.balance().await.unwrap(), 9_900);
    }

    #[tokio::test]
    async fn test_relationship_requires_endpoints() {
        let ledger = ledger();
        let rel = RelationshipDescriptor::contributed_to(
            subject_key("https://github.com/alice"),
            subject_key("https://github.com/acme/widgets"),
        );
        let err = ledger.create_relationship(&rel, 50).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TransactionFailed { .. }));
    }

    #[tokio::test]
    async fn test_relationship_and_stake() {
        let ledger = ledger();
        let alice = ledger
            .create_subject(&subject("https://github.com/alice"), 100)
            .await
            .unwrap();
        let project = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 100)
            .await
            .unwrap();

        let rel = RelationshipDescriptor::contributed_to(alice.id, project.id);
        let created = ledger.create_relationship(&rel, 50).await.unwrap();
        assert_eq!(
            ledger
                .find_relationship(&alice.id, &contributed_to_predicate(), &project.id)
                .await
                .unwrap(),
            Some(created.id)
        );

        ledger.add_stake(&created.id, 50).await.unwrap();
        assert_eq!(ledger.stake_of(&created.id), 100);
        assert_eq!(ledger.balance().await.unwrap(), 10_000 - 300);
    }

    #[tokio::test]
    async fn test_add_stake_unknown_relationship() {
        let ledger = ledger();
        let err = ledger
            .add_stake(&subject_key("https://nowhere.example"), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::RemoteApi { status: Some(404) });
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state_untouched() {
        let ledger = InMemoryLedger::new(Address("0xpoor".to_string()), 10);
        let err = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 100)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::InsufficientFunds);
        assert_eq!(ledger.subject_count(), 0);
        assert_eq!(ledger.balance().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_confirmation_depth() {
        let ledger = ledger().with_confirmation_depth(3);
        let created = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 1)
            .await
            .unwrap();

        let confirmation = ledger.await_confirmation(&created.tx_ref).await.unwrap();
        assert!(confirmation.confirmed);
        assert_eq!(confirmation.block_ref, 1);
        assert_eq!(ledger.snapshot().block_height, 4);

        let err = ledger
            .await_confirmation(&TxRef::from_bytes([9u8; 32]))
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::TransactionFailed { tx_ref: Some(_) }));
    }

    #[tokio::test]
    async fn test_huge_confirmation_depth_saturates() {
        let ledger = ledger().with_confirmation_depth(u64::MAX);
        let created = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 1)
            .await
            .unwrap();

        let confirmation = ledger.await_confirmation(&created.tx_ref).await.unwrap();
        assert!(confirmation.confirmed);
        assert_eq!(ledger.snapshot().block_height, u64::MAX);
    }

    #[tokio::test]
    async fn test_scripted_faults_are_fifo_and_counted() {
        let ledger = ledger();
        let key = subject_key("https://github.com/alice");
        ledger.fail_next(Operation::FindSubject, LedgerError::transient("first"));
        ledger.fail_next(Operation::FindSubject, LedgerError::remote_api(Some(500), "second"));

        let first = ledger.find_subject(&key).await.unwrap_err();
        assert_eq!(first.message(), "first");
        let second = ledger.find_subject(&key).await.unwrap_err();
        assert_eq!(second.message(), "second");
        assert_eq!(ledger.find_subject(&key).await.unwrap(), None);
        assert_eq!(ledger.calls(Operation::FindSubject), 3);
        assert_eq!(ledger.calls(Operation::CreateSubject), 0);
    }

    #[tokio::test]
    async fn test_reject_next_confirmation() {
        let ledger = ledger();
        let created = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 1)
            .await
            .unwrap();
        ledger.reject_next_confirmation();

        let confirmation = ledger.await_confirmation(&created.tx_ref).await.unwrap();
        assert!(!confirmation.confirmed);
        assert!(ledger.await_confirmation(&created.tx_ref).await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let ledger = InMemoryLedger::from_credential("secret-key", 5_000);
        let created = ledger
            .create_subject(&subject("https://github.com/acme/widgets"), 100)
            .await
            .unwrap();
        ledger.save(&path).unwrap();

        let restored = InMemoryLedger::load(&path).unwrap();
        assert_eq!(restored.snapshot(), ledger.snapshot());
        assert_eq!(
            restored.find_subject(&created.id).await.unwrap(),
            Some(created.id)
        );
        assert_eq!(
            restored.address().await.unwrap(),
            address_for_credential("secret-key\n")
        );
        assert_eq!(restored.address().await.unwrap().0.len(), 42);
    }
}

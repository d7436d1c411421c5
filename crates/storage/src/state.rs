//! Account state store with journal-based snapshot/revert.
//!
//! The full account map is held in memory (loaded from the KV store at
//! open) so the state root is always a pure function of the complete
//! mapping. Mutations append undo entries to a journal; `snapshot` captures
//! the journal length and `revert` pops back to it. `commit` recomputes the
//! Merkle root over every account ordered by address, flushes dirty entries
//! in one atomic batch and clears the journal.
//!
//! Accounts are keyed by the 28-byte address payload; the kind tag is
//! presentation-only and never part of a storage key.

use crate::error::StorageError;
use crate::keys;
use crate::kv::{Database, WriteBatch};
use crate::Result;
use sable_types::account::ACCOUNT_STATE_LEN;
use sable_types::address::ADDRESS_LEN;
use sable_types::merkle::{merkle_proof, merkle_root};
use sable_types::{AccountState, Address, AddressKind, Hash};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

type AddrKey = [u8; ADDRESS_LEN];
type SlotKey = (AddrKey, Hash);

/// Opaque token capturing a point-in-time view for [`StateStore::revert`].
#[derive(Clone, Copy, Debug)]
pub struct Snapshot {
    journal_len: usize,
}

enum JournalEntry {
    Account {
        key: AddrKey,
        prev: Option<AccountState>,
    },
    Storage {
        key: SlotKey,
        prev: Option<Vec<u8>>,
    },
}

/// Accounts, contract storage and contract code over a [`Database`].
pub struct StateStore {
    db: Arc<dyn Database>,
    accounts: BTreeMap<AddrKey, AccountState>,
    storage: BTreeMap<SlotKey, Vec<u8>>,
    /// Code written since the last commit, keyed by code hash.
    pending_code: HashMap<Hash, Vec<u8>>,
    dirty_accounts: BTreeSet<AddrKey>,
    dirty_storage: BTreeSet<SlotKey>,
    journal: Vec<JournalEntry>,
    root: Hash,
}

impl StateStore {
    /// Open the store, replaying persisted accounts and storage slots.
    pub fn open(db: Arc<dyn Database>) -> Result<Self> {
        let mut accounts = BTreeMap::new();
        for (key, value) in db.iterate_prefix(keys::ACCOUNT_PREFIX)? {
            if value.len() != ADDRESS_LEN + ACCOUNT_STATE_LEN {
                return Err(StorageError::corrupt(
                    &key,
                    sable_types::CodecError::InvalidSize {
                        expected: ADDRESS_LEN + ACCOUNT_STATE_LEN,
                        got: value.len(),
                    },
                ));
            }
            let mut addr = [0u8; ADDRESS_LEN];
            addr.copy_from_slice(&value[..ADDRESS_LEN]);
            let state = AccountState::decode(&value[ADDRESS_LEN..])
                .map_err(|e| StorageError::corrupt(&key, e))?;
            accounts.insert(addr, state);
        }

        let mut storage = BTreeMap::new();
        for (key, value) in db.iterate_prefix(keys::STORAGE_PREFIX)? {
            let body = &key[keys::STORAGE_PREFIX.len()..];
            if body.len() != ADDRESS_LEN + 32 {
                continue;
            }
            let mut addr = [0u8; ADDRESS_LEN];
            addr.copy_from_slice(&body[..ADDRESS_LEN]);
            let mut slot = [0u8; 32];
            slot.copy_from_slice(&body[ADDRESS_LEN..]);
            storage.insert((addr, Hash(slot)), value);
        }

        let mut store = Self {
            db,
            accounts,
            storage,
            pending_code: HashMap::new(),
            dirty_accounts: BTreeSet::new(),
            dirty_storage: BTreeSet::new(),
            journal: Vec::new(),
            root: Hash::ZERO,
        };
        store.root = store.compute_root();
        debug!(accounts = store.accounts.len(), root = %store.root, "state store opened");
        Ok(store)
    }

    /// Current account state; absent accounts read as the zero value.
    pub fn get_account(&self, addr: &Address) -> AccountState {
        self.accounts.get(&addr.payload).copied().unwrap_or_default()
    }

    /// Write an account, recording the previous value in the journal.
    pub fn set_account(&mut self, addr: &Address, state: AccountState) {
        let key = addr.payload;
        let prev = self.accounts.get(&key).copied();
        self.journal.push(JournalEntry::Account { key, prev });
        self.accounts.insert(key, state);
        self.dirty_accounts.insert(key);
    }

    pub fn get_balance(&self, addr: &Address) -> u64 {
        self.get_account(addr).balance
    }

    pub fn get_nonce(&self, addr: &Address) -> u64 {
        self.get_account(addr).nonce
    }

    pub fn add_balance(&mut self, addr: &Address, amount: u64) {
        let mut state = self.get_account(addr);
        state.balance = state.balance.saturating_add(amount);
        self.set_account(addr, state);
    }

    /// Fails with `BalanceUnderflow` when the balance cannot cover `amount`.
    pub fn sub_balance(&mut self, addr: &Address, amount: u64) -> Result<()> {
        let mut state = self.get_account(addr);
        if state.balance < amount {
            return Err(StorageError::BalanceUnderflow {
                address: *addr,
                balance: state.balance,
                requested: amount,
            });
        }
        state.balance -= amount;
        self.set_account(addr, state);
        Ok(())
    }

    pub fn increment_nonce(&mut self, addr: &Address) {
        let mut state = self.get_account(addr);
        state.nonce += 1;
        self.set_account(addr, state);
    }

    /// Remove an account entirely (self-destruct). Journaled like any other
    /// account write.
    pub fn delete_account(&mut self, addr: &Address) {
        let key = addr.payload;
        let prev = self.accounts.get(&key).copied();
        self.journal.push(JournalEntry::Account { key, prev });
        self.accounts.remove(&key);
        self.dirty_accounts.insert(key);
    }

    /// Storage slot value; absent slots read as empty.
    pub fn get_storage(&self, addr: &Address, slot: &Hash) -> Vec<u8> {
        self.storage
            .get(&(addr.payload, *slot))
            .cloned()
            .unwrap_or_default()
    }

    /// Write a storage slot. An empty value clears the slot.
    pub fn set_storage(&mut self, addr: &Address, slot: &Hash, value: Vec<u8>) {
        let key = (addr.payload, *slot);
        let prev = self.storage.get(&key).cloned();
        self.journal.push(JournalEntry::Storage { key, prev });
        if value.is_empty() {
            self.storage.remove(&key);
        } else {
            self.storage.insert(key, value);
        }
        self.dirty_storage.insert(key);
    }

    /// Code for `addr`, resolved through its `code_hash`.
    pub fn get_code(&self, addr: &Address) -> Result<Vec<u8>> {
        let code_hash = self.get_account(addr).code_hash;
        self.get_code_by_hash(&code_hash)
    }

    /// Code by hash; the zero hash reads as empty.
    pub fn get_code_by_hash(&self, code_hash: &Hash) -> Result<Vec<u8>> {
        if code_hash.is_zero() {
            return Ok(Vec::new());
        }
        if let Some(code) = self.pending_code.get(code_hash) {
            return Ok(code.clone());
        }
        Ok(self.db.get(&keys::code_key(code_hash))?.unwrap_or_default())
    }

    /// Store `code` once under its content hash and point the account at it.
    pub fn set_code(&mut self, addr: &Address, code: Vec<u8>) {
        let code_hash = if code.is_empty() {
            Hash::ZERO
        } else {
            Hash::compute(&code)
        };
        if !code_hash.is_zero() {
            self.pending_code.insert(code_hash, code);
        }
        let mut state = self.get_account(addr);
        state.code_hash = code_hash;
        self.set_account(addr, state);
    }

    /// Capture the current journal position.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            journal_len: self.journal.len(),
        }
    }

    /// Undo every mutation made after `snap` was taken.
    ///
    /// Content-addressed code written in between may remain as garbage in
    /// the KV store; it is unreachable once no account references it.
    pub fn revert(&mut self, snap: Snapshot) {
        while self.journal.len() > snap.journal_len {
            match self.journal.pop().expect("journal entry") {
                JournalEntry::Account { key, prev } => match prev {
                    Some(state) => {
                        self.accounts.insert(key, state);
                    }
                    None => {
                        self.accounts.remove(&key);
                        self.dirty_accounts.remove(&key);
                    }
                },
                JournalEntry::Storage { key, prev } => match prev {
                    Some(value) => {
                        self.storage.insert(key, value);
                    }
                    None => {
                        self.storage.remove(&key);
                        self.dirty_storage.remove(&key);
                    }
                },
            }
        }
    }

    /// The root committed by the last [`Self::commit`].
    pub fn root(&self) -> Hash {
        self.root
    }

    /// Flush dirty entries atomically, clear the journal and return the new
    /// state root.
    pub fn commit(&mut self) -> Result<Hash> {
        let mut batch = WriteBatch::new();

        for key in std::mem::take(&mut self.dirty_accounts) {
            let addr = payload_addr(&key);
            match self.accounts.get(&key) {
                Some(state) => {
                    let mut value = Vec::with_capacity(ADDRESS_LEN + ACCOUNT_STATE_LEN);
                    value.extend_from_slice(&key);
                    value.extend_from_slice(&state.encode());
                    batch.put(keys::account_key(&addr), value);
                }
                None => batch.delete(keys::account_key(&addr)),
            }
        }

        for key in std::mem::take(&mut self.dirty_storage) {
            let addr = payload_addr(&key.0);
            let db_key = keys::storage_key(&addr, &key.1);
            match self.storage.get(&key) {
                Some(value) => batch.put(db_key, value.clone()),
                None => batch.delete(db_key),
            }
        }

        for (code_hash, code) in std::mem::take(&mut self.pending_code) {
            batch.put(keys::code_key(&code_hash), code);
        }

        if !batch.is_empty() {
            self.db.write_batch(batch)?;
        }
        self.journal.clear();
        self.root = self.compute_root();
        debug!(root = %self.root, accounts = self.accounts.len(), "state committed");
        Ok(self.root)
    }

    /// Inclusion proof for `addr` in the current account set.
    ///
    /// Returns `(leaf index, sibling path)` against [`Self::compute_root`];
    /// `None` for absent accounts.
    pub fn prove_account(&self, addr: &Address) -> Option<(usize, Vec<Hash>)> {
        let index = self
            .accounts
            .keys()
            .position(|key| key == &addr.payload)?;
        let leaves = self.leaves();
        let proof = merkle_proof(&leaves, index)?;
        Some((index, proof))
    }

    /// Leaf hash for one account entry: `hash(addr ‖ encode(state))`.
    pub fn account_leaf(addr: &Address, state: &AccountState) -> Hash {
        Hash::compute_all(&[addr.as_bytes(), &state.encode()])
    }

    fn leaves(&self) -> Vec<Hash> {
        self.accounts
            .iter()
            .map(|(key, state)| Hash::compute_all(&[key, &state.encode()]))
            .collect()
    }

    fn compute_root(&self) -> Hash {
        merkle_root(&self.leaves())
    }
}

fn payload_addr(payload: &[u8; ADDRESS_LEN]) -> Address {
    Address::new(AddressKind::PaymentOnly, *payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryDatabase;
    use sable_types::merkle::verify_merkle_proof;

    fn addr(byte: u8) -> Address {
        Address::new(AddressKind::PaymentOnly, [byte; ADDRESS_LEN])
    }

    fn fresh_store() -> StateStore {
        StateStore::open(Arc::new(MemoryDatabase::new())).unwrap()
    }

    #[test]
    fn absent_account_is_zero_value() {
        let store = fresh_store();
        assert_eq!(store.get_account(&addr(1)), AccountState::default());
    }

    #[test]
    fn balance_arithmetic() {
        let mut store = fresh_store();
        store.add_balance(&addr(1), 100);
        assert_eq!(store.get_balance(&addr(1)), 100);
        store.sub_balance(&addr(1), 40).unwrap();
        assert_eq!(store.get_balance(&addr(1)), 60);

        let err = store.sub_balance(&addr(1), 61).unwrap_err();
        assert!(matches!(err, StorageError::BalanceUnderflow { .. }));
        assert_eq!(store.get_balance(&addr(1)), 60);
    }

    #[test]
    fn revert_restores_exact_state() {
        let mut store = fresh_store();
        store.add_balance(&addr(1), 100);
        store.set_storage(&addr(1), &Hash::compute(b"slot"), vec![1, 2, 3]);

        let snap = store.snapshot();
        store.add_balance(&addr(1), 50);
        store.add_balance(&addr(2), 7);
        store.increment_nonce(&addr(1));
        store.set_storage(&addr(1), &Hash::compute(b"slot"), vec![9]);
        store.set_storage(&addr(1), &Hash::compute(b"slot2"), vec![8]);

        store.revert(snap);

        assert_eq!(store.get_balance(&addr(1)), 100);
        assert_eq!(store.get_nonce(&addr(1)), 0);
        assert_eq!(store.get_account(&addr(2)), AccountState::default());
        assert_eq!(
            store.get_storage(&addr(1), &Hash::compute(b"slot")),
            vec![1, 2, 3]
        );
        assert!(store
            .get_storage(&addr(1), &Hash::compute(b"slot2"))
            .is_empty());
    }

    #[test]
    fn nested_snapshots_revert_independently() {
        let mut store = fresh_store();
        store.add_balance(&addr(1), 10);

        let outer = store.snapshot();
        store.add_balance(&addr(1), 5);
        let inner = store.snapshot();
        store.add_balance(&addr(1), 3);

        store.revert(inner);
        assert_eq!(store.get_balance(&addr(1)), 15);
        store.revert(outer);
        assert_eq!(store.get_balance(&addr(1)), 10);
    }

    #[test]
    fn commit_produces_stable_root() {
        let mut a = fresh_store();
        a.add_balance(&addr(1), 100);
        a.add_balance(&addr(2), 200);
        let root_a = a.commit().unwrap();

        // Same mapping written in a different order gives the same root.
        let mut b = fresh_store();
        b.add_balance(&addr(2), 200);
        b.add_balance(&addr(1), 100);
        let root_b = b.commit().unwrap();

        assert_eq!(root_a, root_b);
        assert_ne!(root_a, Hash::ZERO);
    }

    #[test]
    fn root_changes_with_state() {
        let mut store = fresh_store();
        store.add_balance(&addr(1), 100);
        let first = store.commit().unwrap();
        store.add_balance(&addr(1), 1);
        let second = store.commit().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn state_survives_reopen() {
        let db = Arc::new(MemoryDatabase::new());
        let root = {
            let mut store = StateStore::open(db.clone()).unwrap();
            store.add_balance(&addr(1), 123);
            store.set_storage(&addr(1), &Hash::compute(b"s"), vec![0xaa]);
            store.set_code(&addr(1), vec![0x60, 0x00]);
            store.commit().unwrap()
        };

        let store = StateStore::open(db).unwrap();
        assert_eq!(store.root(), root);
        assert_eq!(store.get_balance(&addr(1)), 123);
        assert_eq!(store.get_storage(&addr(1), &Hash::compute(b"s")), vec![0xaa]);
        assert_eq!(store.get_code(&addr(1)).unwrap(), vec![0x60, 0x00]);
    }

    #[test]
    fn code_is_content_addressed() {
        let mut store = fresh_store();
        store.set_code(&addr(1), vec![1, 2, 3]);
        store.set_code(&addr(2), vec![1, 2, 3]);
        assert_eq!(
            store.get_account(&addr(1)).code_hash,
            store.get_account(&addr(2)).code_hash
        );
        assert!(store.get_account(&addr(1)).is_contract());
    }

    #[test]
    fn account_proofs_verify() {
        let mut store = fresh_store();
        for i in 1..=5u8 {
            store.add_balance(&addr(i), i as u64 * 10);
        }
        let root = store.commit().unwrap();

        let target = addr(3);
        let (index, proof) = store.prove_account(&target).unwrap();
        let leaf = StateStore::account_leaf(&target, &store.get_account(&target));
        assert!(verify_merkle_proof(&leaf, &proof, index, &root));

        // A tampered account state fails against the same proof.
        let mut forged = store.get_account(&target);
        forged.balance += 1;
        let forged_leaf = StateStore::account_leaf(&target, &forged);
        assert!(!verify_merkle_proof(&forged_leaf, &proof, index, &root));
    }
}

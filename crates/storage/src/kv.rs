//! Byte-level key-value store abstraction.

use crate::Result;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// A set of writes applied atomically.
#[derive(Debug, Default, Clone)]
pub struct WriteBatch {
    pub puts: Vec<(Vec<u8>, Vec<u8>)>,
    pub deletes: Vec<Vec<u8>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.puts.push((key.into(), value.into()));
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.deletes.push(key.into());
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }
}

/// Byte-string keys to byte-string values.
///
/// After `put` or `write_batch` returns, a process restart must observe
/// the write (durable backends flush before returning).
pub trait Database: Send + Sync {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn del(&self, key: &[u8]) -> Result<bool>;
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Apply all puts then all deletes as one atomic unit.
    fn write_batch(&self, batch: WriteBatch) -> Result<()>;

    /// All `(key, value)` pairs whose key starts with `prefix`, in key
    /// order.
    fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory database for tests and ephemeral nodes.
#[derive(Default)]
pub struct MemoryDatabase {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl Database for MemoryDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    fn del(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut data = self.data.write();
        for (key, value) in batch.puts {
            data.insert(key, value);
        }
        for key in batch.deletes {
            data.remove(&key);
        }
        Ok(())
    }

    fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_del() {
        let db = MemoryDatabase::new();
        db.put(b"k", b"v").unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert!(db.exists(b"k").unwrap());
        assert!(db.del(b"k").unwrap());
        assert_eq!(db.get(b"k").unwrap(), None);
        assert!(!db.del(b"k").unwrap());
    }

    #[test]
    fn batch_applies_puts_then_deletes() {
        let db = MemoryDatabase::new();
        db.put(b"old", b"1").unwrap();

        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"old".to_vec());
        db.write_batch(batch).unwrap();

        assert!(db.exists(b"a").unwrap());
        assert!(db.exists(b"b").unwrap());
        assert!(!db.exists(b"old").unwrap());
    }

    #[test]
    fn prefix_iteration_is_ordered_and_bounded() {
        let db = MemoryDatabase::new();
        db.put(b"ac", b"3").unwrap();
        db.put(b"aa", b"1").unwrap();
        db.put(b"ab", b"2").unwrap();
        db.put(b"b", b"x").unwrap();

        let entries = db.iterate_prefix(b"a").unwrap();
        let keys: Vec<_> = entries.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(keys, vec![b"aa".to_vec(), b"ab".to_vec(), b"ac".to_vec()]);
    }
}

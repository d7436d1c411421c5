//! Durable append-only database.
//!
//! Every mutation is appended to a single log file and flushed before the
//! call returns; on open the log is replayed into memory. There is no
//! compaction: the log only grows, which keeps recovery trivially correct.
//!
//! Record layout:
//! `u8 op ‖ u32 key_len ‖ key [‖ u32 value_len ‖ value]` with op 1 = put,
//! op 2 = delete. Integers are big-endian.

use crate::kv::{Database, WriteBatch};
use crate::Result;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const OP_PUT: u8 = 1;
const OP_DEL: u8 = 2;

struct LogInner {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    file: File,
}

/// Append-only log-backed database.
pub struct AppendLogDatabase {
    path: PathBuf,
    inner: Mutex<LogInner>,
}

impl AppendLogDatabase {
    /// Open (or create) the log at `path` and replay it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let mut data = BTreeMap::new();
        if path.exists() {
            replay(&path, &mut data)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), entries = data.len(), "opened append-log database");

        Ok(Self {
            path,
            inner: Mutex::new(LogInner { data, file }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.inner.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }
}

fn replay(path: &Path, data: &mut BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
    let mut reader = BufReader::new(File::open(path)?);

    loop {
        let mut op = [0u8; 1];
        match reader.read_exact(&mut op) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }

        // A torn trailing record is dropped; everything before it is
        // intact because records are flushed whole.
        let Some(key) = read_field(&mut reader)? else {
            break;
        };
        match op[0] {
            OP_PUT => {
                let Some(value) = read_field(&mut reader)? else {
                    break;
                };
                data.insert(key, value);
            }
            OP_DEL => {
                data.remove(&key);
            }
            _ => break,
        }
    }

    Ok(())
}

/// Read a length-prefixed field; `None` when the log ends mid-record.
fn read_field(reader: &mut impl Read) -> Result<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    match reader.read_exact(&mut len_bytes) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn append_record(file: &mut File, op: u8, key: &[u8], value: Option<&[u8]>) -> Result<()> {
    let mut record = Vec::with_capacity(9 + key.len() + value.map_or(0, |v| v.len()));
    record.push(op);
    record.extend_from_slice(&(key.len() as u32).to_be_bytes());
    record.extend_from_slice(key);
    if let Some(value) = value {
        record.extend_from_slice(&(value.len() as u32).to_be_bytes());
        record.extend_from_slice(value);
    }
    file.write_all(&record)?;
    Ok(())
}

impl Database for AppendLogDatabase {
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        append_record(&mut inner.file, OP_PUT, key, Some(value))?;
        inner.file.sync_data()?;
        inner.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.inner.lock().data.get(key).cloned())
    }

    fn del(&self, key: &[u8]) -> Result<bool> {
        let mut inner = self.inner.lock();
        if !inner.data.contains_key(key) {
            return Ok(false);
        }
        append_record(&mut inner.file, OP_DEL, key, None)?;
        inner.file.sync_data()?;
        inner.data.remove(key);
        Ok(true)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.inner.lock().data.contains_key(key))
    }

    fn write_batch(&self, batch: WriteBatch) -> Result<()> {
        let mut inner = self.inner.lock();
        for (key, value) in &batch.puts {
            append_record(&mut inner.file, OP_PUT, key, Some(value))?;
        }
        for key in &batch.deletes {
            append_record(&mut inner.file, OP_DEL, key, None)?;
        }
        inner.file.sync_data()?;

        for (key, value) in batch.puts {
            inner.data.insert(key, value);
        }
        for key in batch.deletes {
            inner.data.remove(&key);
        }
        Ok(())
    }

    fn iterate_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let inner = self.inner.lock();
        Ok(inner
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");

        {
            let db = AppendLogDatabase::open(&path).unwrap();
            db.put(b"a", b"1").unwrap();
            db.put(b"b", b"2").unwrap();
            db.del(b"a").unwrap();
        }

        let db = AppendLogDatabase::open(&path).unwrap();
        assert_eq!(db.get(b"a").unwrap(), None);
        assert_eq!(db.get(b"b").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn batch_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");

        {
            let db = AppendLogDatabase::open(&path).unwrap();
            let mut batch = WriteBatch::new();
            batch.put(b"x".to_vec(), b"10".to_vec());
            batch.put(b"y".to_vec(), b"20".to_vec());
            db.write_batch(batch).unwrap();
        }

        let db = AppendLogDatabase::open(&path).unwrap();
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(b"y").unwrap(), Some(b"20".to_vec()));
    }

    #[test]
    fn later_puts_win_on_replay() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("kv.log");

        {
            let db = AppendLogDatabase::open(&path).unwrap();
            db.put(b"k", b"old").unwrap();
            db.put(b"k", b"new").unwrap();
        }

        let db = AppendLogDatabase::open(&path).unwrap();
        assert_eq!(db.get(b"k").unwrap(), Some(b"new".to_vec()));
    }

    #[test]
    fn prefix_iteration_matches_memory_semantics() {
        let dir = tempdir().unwrap();
        let db = AppendLogDatabase::open(dir.path().join("kv.log")).unwrap();
        db.put(b"p1", b"a").unwrap();
        db.put(b"p2", b"b").unwrap();
        db.put(b"q1", b"c").unwrap();

        let entries = db.iterate_prefix(b"p").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b"p1".to_vec());
    }
}

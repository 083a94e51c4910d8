//! Ordered key-value storage used by the migration passes
//!
//! Every pass reads and writes through [`KvStore`]. [`ParityStore`] is the
//! on-disk backend: a single ParityDB column with a B-tree index, which gives
//! ordered iteration over raw keys. [`MemoryStore`] keeps the same contract
//! in memory.

use crate::error::{MigrationError, Result};
use parity_db::{Db, Options};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The only column used by the migration
const COLUMN: u8 = 0;

/// Records copied per lock acquisition in [`MemoryStore`] scans
const SCAN_CHUNK: usize = 1024;

/// Whether a scan should keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFlow {
    Continue,
    Stop,
}

/// A single write operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// Operations committed together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Put {
            key: key.into(),
            value: value.into(),
        });
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.ops.push(WriteOp::Delete { key: key.into() });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

/// Ordered key-value store with atomic batches
pub trait KvStore: Send + Sync {
    /// Point lookup
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Visit records in ascending key order starting at the first key
    /// `>= start`, until the visitor returns [`ScanFlow::Stop`] or the store
    /// is exhausted.
    fn scan_from(
        &self,
        start: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanFlow>,
    ) -> Result<()>;

    /// Apply every operation in `batch` atomically
    fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Visit every record whose key starts with `prefix`
    fn scan_prefix(
        &self,
        prefix: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanFlow>,
    ) -> Result<()> {
        self.scan_from(prefix, &mut |key, value| {
            if !key.starts_with(prefix) {
                return Ok(ScanFlow::Stop);
            }
            visit(key, value)
        })
    }

    /// Whether any key starts with `prefix`
    fn contains_prefix(&self, prefix: &[u8]) -> Result<bool> {
        let mut found = false;
        self.scan_prefix(prefix, &mut |_, _| {
            found = true;
            Ok(ScanFlow::Stop)
        })?;
        Ok(found)
    }

    /// Whether the store holds no records at all
    fn is_empty(&self) -> Result<bool> {
        Ok(!self.contains_prefix(&[])?)
    }
}

/// ParityDB-backed store
pub struct ParityStore {
    db: Db,
    path: PathBuf,
}

impl ParityStore {
    fn options(path: &Path) -> Options {
        let mut opts = Options::with_columns(path, 1);
        // Ordered iteration needs the B-tree index; preimage columns refuse
        // overwrites and deletes.
        opts.columns[COLUMN as usize].btree_index = true;
        opts.columns[COLUMN as usize].preimage = false;
        opts
    }

    /// Open a store for writing, creating it if needed
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| MigrationError::OpenDestination {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        let db = Db::open_or_create(&Self::options(path)).map_err(|e| {
            MigrationError::OpenDestination {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        info!("Opened destination store at {}", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Open an existing store without write access
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = Db::open_read_only(&Self::options(path)).map_err(|e| {
            MigrationError::OpenSource {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
        })?;

        info!("Opened source store at {} (read-only)", path.display());
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KvStore for ParityStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(COLUMN, key)?)
    }

    fn scan_from(
        &self,
        start: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanFlow>,
    ) -> Result<()> {
        let mut iter = self.db.iter(COLUMN)?;
        if start.is_empty() {
            iter.seek_to_first()?;
        } else {
            iter.seek(start)?;
        }

        while let Some((key, value)) = iter.next()? {
            if visit(&key, &value)? == ScanFlow::Stop {
                break;
            }
        }
        Ok(())
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let len = batch.len();
        let tx = batch.into_ops().into_iter().map(|op| match op {
            WriteOp::Put { key, value } => (COLUMN, key, Some(value)),
            WriteOp::Delete { key } => (COLUMN, key, None),
        });
        self.db.commit(tx)?;
        debug!("Committed {} operations to {}", len, self.path.display());
        Ok(())
    }
}

/// In-memory store with the same ordering and batch semantics
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record, in key order
    pub fn snapshot(&self) -> BTreeMap<Vec<u8>, Vec<u8>> {
        self.records.read().clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Insert a record directly, bypassing batches
    pub fn insert(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.records.write().insert(key.into(), value.into());
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(key).cloned())
    }

    fn scan_from(
        &self,
        start: &[u8],
        visit: &mut dyn FnMut(&[u8], &[u8]) -> Result<ScanFlow>,
    ) -> Result<()> {
        // Copy out bounded chunks so visitors may write to this store
        let mut lower = Bound::Included(start.to_vec());
        loop {
            let chunk: Vec<(Vec<u8>, Vec<u8>)> = {
                let records = self.records.read();
                let from = match &lower {
                    Bound::Included(k) => Bound::Included(k.as_slice()),
                    Bound::Excluded(k) => Bound::Excluded(k.as_slice()),
                    Bound::Unbounded => Bound::Unbounded,
                };
                records
                    .range::<[u8], _>((from, Bound::Unbounded))
                    .take(SCAN_CHUNK)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            };

            let Some((last, _)) = chunk.last() else {
                return Ok(());
            };
            let exhausted = chunk.len() < SCAN_CHUNK;
            lower = Bound::Excluded(last.clone());

            for (key, value) in &chunk {
                if visit(key, value)? == ScanFlow::Stop {
                    return Ok(());
                }
            }
            if exhausted {
                return Ok(());
            }
        }
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        let mut records = self.records.write();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put { key, value } => {
                    records.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    records.remove(&key);
                }
            }
        }
        Ok(())
    }
}

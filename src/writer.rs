//! Bounded batch writes and cooperative cancellation

use crate::error::{MigrationError, Result};
use crate::store::{KvStore, WriteBatch};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared cancellation request, honoured at batch boundaries
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask running passes to stop after their in-flight batch
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Stages writes and commits them in batches of at most `limit` operations.
///
/// Operations staged between two [`BatchWriter::checkpoint`] calls always
/// land in the same commit, so a delete and its replacement put are never
/// split across batches.
pub struct BatchWriter<'a> {
    store: &'a dyn KvStore,
    batch: WriteBatch,
    limit: usize,
    cancel: CancelFlag,
    committed_ops: u64,
    commits: u64,
}

impl<'a> BatchWriter<'a> {
    pub fn new(store: &'a dyn KvStore, limit: usize, cancel: CancelFlag) -> Self {
        Self {
            store,
            batch: WriteBatch::new(),
            limit: limit.max(1),
            cancel,
            committed_ops: 0,
            commits: 0,
        }
    }

    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.batch.put(key, value);
    }

    pub fn delete(&mut self, key: impl Into<Vec<u8>>) {
        self.batch.delete(key);
    }

    /// Number of operations staged but not yet committed
    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Commit if the staged batch reached the limit.
    ///
    /// Cancellation is checked only after a commit, so a cancelled pass
    /// never leaves a half-written batch behind.
    pub fn checkpoint(&mut self) -> Result<()> {
        if self.batch.len() >= self.limit {
            self.flush()?;
            if self.cancel.is_cancelled() {
                info!("Cancellation requested, stopping after {} operations", self.committed_ops);
                return Err(MigrationError::Cancelled {
                    committed: self.committed_ops,
                });
            }
        }
        Ok(())
    }

    /// Commit whatever is staged
    pub fn flush(&mut self) -> Result<()> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.batch);
        let len = batch.len() as u64;
        self.store
            .commit(batch)
            .map_err(|e| MigrationError::BatchCommit {
                committed: self.committed_ops,
                reason: e.to_string(),
            })?;
        self.committed_ops += len;
        self.commits += 1;
        debug!("Flushed batch {} ({} operations)", self.commits, len);
        Ok(())
    }

    /// Commit the remainder and return (operations committed, commits).
    ///
    /// A cancellation requested while the last batch was pending still
    /// commits it, then reports the pass as cancelled.
    pub fn finish(mut self) -> Result<(u64, u64)> {
        self.flush()?;
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, stopped after {} operations", self.committed_ops);
            return Err(MigrationError::Cancelled {
                committed: self.committed_ops,
            });
        }
        Ok((self.committed_ops, self.commits))
    }
}

//! Chain Denamespace - flatten a namespaced chain store
//!
//! Several chains can share one physical key-value store, each record key
//! prefixed by a 32-byte namespace. This crate copies one chain out of such
//! a store into a fresh single-chain store whose keys use per-type prefixes,
//! repairs the canonical index and writes the markers a node reads on startup.
//!
//! # Pipeline
//!
//! ```text
//! Source store (read-only, namespaced)
//!     ↓
//! StreamingTranscoder
//!     ├─ KeyClassifier: namespaced / ASCII / raw / bare hash
//!     ├─ RecordTypeRegistry: destination prefix + profile filter
//!     └─ BatchWriter: bounded atomic commits
//!     ↓
//! Destination store (flat)
//!     ↓
//! CanonicalIndexRebuilder   legacy 10-byte keys -> 9-byte keys
//!     ↓
//! ContinuityMarkerWriter    Height + last-accepted aliases
//!     ↓
//! IntegrityScanner          gaps in [tip - window, tip]
//! ```
//!
//! Passes run synchronously against a [`KvStore`]; [`Migrator`] drives them
//! on the blocking thread pool.

pub mod canonical;
pub mod classifier;
pub mod config;
pub mod continuity;
pub mod error;
pub mod integrity;
pub mod registry;
pub mod report;
pub mod schema;
pub mod store;
pub mod transcode;
pub mod types;
pub mod writer;

pub use canonical::CanonicalIndexRebuilder;
pub use classifier::{Classification, KeyClassifier};
pub use config::{known_namespace, MigrationConfig};
pub use continuity::ContinuityMarkerWriter;
pub use error::{MigrationError, RecordError, Result};
pub use integrity::IntegrityScanner;
pub use registry::RecordTypeRegistry;
pub use report::{
    ContinuityOutcome, IntegrityReport, MigrationReport, RebuildReport, TranscodeReport,
};
pub use store::{KvStore, MemoryStore, ParityStore, WriteBatch};
pub use transcode::StreamingTranscoder;
pub use types::{BlockHash, ChainTip, KeyConvention, MigrationProfile, Namespace, RecordType};
pub use writer::CancelFlag;

use std::sync::Arc;
use tracing::info;

/// Runs a migration between two stores
pub struct Migrator {
    config: MigrationConfig,
    source: Arc<dyn KvStore>,
    destination: Arc<dyn KvStore>,
    cancel: CancelFlag,
}

impl Migrator {
    /// Open the source read-only and the destination for writing
    pub fn open(config: MigrationConfig) -> Result<Self> {
        config.validate()?;
        info!(
            "Migrating {} -> {}",
            config.source_path.display(),
            config.destination_path.display()
        );

        let source = Arc::new(ParityStore::open_read_only(&config.source_path)?);
        let destination = Arc::new(ParityStore::open(&config.destination_path)?);
        Ok(Self::with_stores(config, source, destination))
    }

    /// Use already opened stores
    pub fn with_stores(
        config: MigrationConfig,
        source: Arc<dyn KvStore>,
        destination: Arc<dyn KvStore>,
    ) -> Self {
        Self {
            config,
            source,
            destination,
            cancel: CancelFlag::new(),
        }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Flag that stops running passes at their next batch boundary
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn destination(&self) -> Arc<dyn KvStore> {
        self.destination.clone()
    }

    /// Copy and re-key every record of the configured chain
    pub async fn transcode(&self) -> Result<TranscodeReport> {
        let transcoder = StreamingTranscoder::from_config(&self.config, self.cancel.clone());
        let source = self.source.clone();
        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || {
            transcoder.transcode(source.as_ref(), destination.as_ref())
        })
        .await?
    }

    /// Normalize the destination's canonical index
    pub async fn rebuild_canonical(&self) -> Result<RebuildReport> {
        let rebuilder = CanonicalIndexRebuilder::from_config(&self.config, self.cancel.clone());
        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || rebuilder.rebuild(destination.as_ref())).await?
    }

    /// Point the continuity markers at the canonical tip
    pub async fn write_continuity(&self) -> Result<ContinuityOutcome> {
        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || {
            ContinuityMarkerWriter::new().write(destination.as_ref())
        })
        .await?
    }

    /// Scan `[from, to]` of the destination for missing records
    pub async fn scan_integrity(&self, from: u64, to: u64) -> Result<IntegrityReport> {
        let destination = self.destination.clone();
        tokio::task::spawn_blocking(move || {
            IntegrityScanner::new().scan(destination.as_ref(), from, to)
        })
        .await?
    }

    /// Stop before starting another pass once cancellation was requested
    fn ensure_running(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            info!("Cancellation requested, not starting the next pass");
            return Err(MigrationError::Cancelled { committed: 0 });
        }
        Ok(())
    }

    /// Run every pass in order
    pub async fn run(&self) -> Result<MigrationReport> {
        self.ensure_running()?;
        let transcode = self.transcode().await?;
        self.ensure_running()?;
        let rebuild = self.rebuild_canonical().await?;
        self.ensure_running()?;
        let continuity = self.write_continuity().await?;

        let integrity = match (continuity.tip(), self.config.integrity_window) {
            (Some(tip), Some(window)) => {
                self.ensure_running()?;
                let from = tip.number.saturating_sub(window);
                Some(self.scan_integrity(from, tip.number).await?)
            }
            _ => None,
        };

        info!("Migration finished");
        Ok(MigrationReport {
            transcode,
            rebuild,
            continuity,
            integrity,
        })
    }
}

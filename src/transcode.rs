//! Streaming transcode of a namespaced store into the flat key space

use crate::classifier::KeyClassifier;
use crate::config::MigrationConfig;
use crate::error::{RecordError, Result};
use crate::registry::RecordTypeRegistry;
use crate::report::TranscodeReport;
use crate::schema::keys::ALWAYS_COPIED;
use crate::store::{KvStore, ScanFlow};
use crate::types::{KeyConvention, MigrationProfile, RecordType};
use crate::writer::{BatchWriter, CancelFlag};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Whether `key` is a pointer record copied verbatim
pub fn is_pointer_key(key: &[u8]) -> bool {
    ALWAYS_COPIED.iter().any(|pointer| *pointer == key)
}

/// What to do with one source key
#[derive(Debug, PartialEq, Eq)]
enum Plan {
    Pointer,
    Write {
        record_type: RecordType,
        convention: KeyConvention,
        key: Vec<u8>,
    },
    Excluded {
        record_type: RecordType,
        convention: KeyConvention,
    },
}

/// Copies every recognised record of one chain into the destination,
/// re-keyed under the destination prefixes.
///
/// Destination keys are a pure function of source keys, so re-running a
/// transcode over the same source overwrites identical records.
pub struct StreamingTranscoder {
    classifier: KeyClassifier,
    profile: MigrationProfile,
    batch_size: usize,
    progress_interval: u64,
    limit: Option<u64>,
    cancel: CancelFlag,
}

impl StreamingTranscoder {
    pub fn new(classifier: KeyClassifier, profile: MigrationProfile) -> Self {
        let defaults = MigrationConfig::default();
        Self {
            classifier,
            profile,
            batch_size: defaults.batch_size,
            progress_interval: defaults.progress_interval,
            limit: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn from_config(config: &MigrationConfig, cancel: CancelFlag) -> Self {
        Self {
            classifier: KeyClassifier::new(config.namespace),
            profile: config.profile(),
            batch_size: config.batch_size,
            progress_interval: config.progress_interval.max(1),
            limit: config.limit,
            cancel,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    fn plan(&self, key: &[u8]) -> std::result::Result<Plan, RecordError> {
        if is_pointer_key(key) {
            return Ok(Plan::Pointer);
        }

        let class = self.classifier.classify(key);
        if !class.is_known() {
            return Err(RecordError::Unclassified { key: key.to_vec() });
        }

        Ok(
            match RecordTypeRegistry::destination_key(class.record_type, class.key, self.profile) {
                Some(key) => Plan::Write {
                    record_type: class.record_type,
                    convention: class.convention,
                    key,
                },
                None => Plan::Excluded {
                    record_type: class.record_type,
                    convention: class.convention,
                },
            },
        )
    }

    /// Transcode every record of `source` into `destination`
    pub fn transcode(
        &self,
        source: &dyn KvStore,
        destination: &dyn KvStore,
    ) -> Result<TranscodeReport> {
        info!(
            "Transcoding namespace {} (include state: {})",
            self.classifier.namespace(),
            self.profile.include_state
        );

        let start = Instant::now();
        let mut report = TranscodeReport::default();
        let mut writer = BatchWriter::new(destination, self.batch_size, self.cancel.clone());

        source.scan_from(&[], &mut |key, value| {
            if let Some(limit) = self.limit {
                if report.written >= limit {
                    report.limit_reached = true;
                    return Ok(ScanFlow::Stop);
                }
            }

            report.processed += 1;
            if report.processed % self.progress_interval == 0 {
                info!(
                    "Progress: {} keys processed, {} written, {} skipped",
                    report.processed,
                    report.written,
                    report.skipped()
                );
            }

            match self.plan(key) {
                Ok(Plan::Pointer) => {
                    debug!("Copying pointer key {}", String::from_utf8_lossy(key));
                    writer.put(key, value);
                    report.pointers_copied += 1;
                }
                Ok(Plan::Write {
                    record_type,
                    convention,
                    key: destination_key,
                }) => {
                    writer.put(destination_key, value);
                    report.saw(convention);
                    report.record(record_type);
                }
                Ok(Plan::Excluded {
                    record_type,
                    convention,
                }) => {
                    report.saw(convention);
                    report.skipped_excluded += 1;
                    debug!("Excluding {} record by profile", record_type);
                    return Ok(ScanFlow::Continue);
                }
                Err(e) => {
                    report.saw(KeyConvention::Unrecognized);
                    report.skipped_unknown += 1;
                    debug!("Skipping: {}", e);
                    return Ok(ScanFlow::Continue);
                }
            }

            report.written += 1;
            writer.checkpoint()?;
            if self.limit == Some(report.written) {
                report.limit_reached = true;
                return Ok(ScanFlow::Stop);
            }
            Ok(ScanFlow::Continue)
        })?;

        let (_, commits) = writer.finish()?;
        report.commits = commits;

        info!(
            "Transcode complete in {:?}: {} processed, {} written ({} pointers), {} unknown, {} excluded",
            start.elapsed(),
            report.processed,
            report.written,
            report.pointers_copied,
            report.skipped_unknown,
            report.skipped_excluded
        );
        for (record_type, count) in &report.counts {
            info!("  {}: {}", record_type, count);
        }
        if report.skipped_unknown > 0 {
            warn!(
                "{} keys matched no known convention; review before trusting this migration",
                report.skipped_unknown
            );
        }

        Ok(report)
    }
}

//! Canonical index rebuild
//!
//! Runs over the destination after transcode. Legacy 10-byte canonical keys
//! are rewritten under the normalized 9-byte key, and numbers with no
//! canonical record are filled from the hash -> number index when exactly
//! one hash claims them.

use crate::config::MigrationConfig;
use crate::error::{MigrationError, RecordError, Result};
use crate::report::RebuildReport;
use crate::schema::keys::{CANONICAL_PREFIX, HASH_TO_NUMBER_TAG};
use crate::schema::{canonical_key, decode_block_number, parse_canonical_key, CanonicalLayout};
use crate::store::{KvStore, ScanFlow};
use crate::types::BlockHash;
use crate::writer::{BatchWriter, CancelFlag};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Legacy canonical record awaiting rewrite
struct LegacyRecord {
    key: Vec<u8>,
    number: u64,
    hash: BlockHash,
}

/// Rebuilds the canonical number -> hash index in normalized form
pub struct CanonicalIndexRebuilder {
    batch_size: usize,
    cancel: CancelFlag,
}

impl Default for CanonicalIndexRebuilder {
    fn default() -> Self {
        Self {
            batch_size: MigrationConfig::default().batch_size,
            cancel: CancelFlag::new(),
        }
    }
}

impl CanonicalIndexRebuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MigrationConfig, cancel: CancelFlag) -> Self {
        Self {
            batch_size: config.batch_size,
            cancel,
        }
    }

    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Read every hash -> number entry
    fn load_hash_index(
        store: &dyn KvStore,
        report: &mut RebuildReport,
    ) -> Result<HashMap<BlockHash, u64>> {
        let mut index = HashMap::new();
        store.scan_prefix(HASH_TO_NUMBER_TAG, &mut |key, value| {
            let hash: Option<BlockHash> = key[HASH_TO_NUMBER_TAG.len()..].try_into().ok();
            match (hash, decode_block_number(value)) {
                (Some(hash), Some(number)) => {
                    index.insert(hash, number);
                    report.hash_entries += 1;
                }
                _ => warn!(
                    "Ignoring hash -> number entry {} with {}-byte value",
                    hex::encode(key),
                    value.len()
                ),
            }
            Ok(ScanFlow::Continue)
        })?;
        Ok(index)
    }

    /// Split existing canonical records into normalized and legacy ones
    fn load_canonical(
        store: &dyn KvStore,
        report: &mut RebuildReport,
    ) -> Result<(BTreeMap<u64, BlockHash>, Vec<LegacyRecord>)> {
        let mut normalized = BTreeMap::new();
        let mut legacy = Vec::new();

        store.scan_prefix(&[CANONICAL_PREFIX], &mut |key, value| {
            let hash: Option<BlockHash> = value.try_into().ok();
            match (parse_canonical_key(key), hash) {
                (Some(CanonicalLayout::Normalized(number)), Some(hash)) => {
                    normalized.insert(number, hash);
                    report.already_normalized += 1;
                }
                (Some(CanonicalLayout::Legacy(number)), Some(hash)) => {
                    legacy.push(LegacyRecord {
                        key: key.to_vec(),
                        number,
                        hash,
                    });
                }
                _ => {
                    report.malformed += 1;
                    let err = RecordError::MalformedCanonical {
                        key: key.to_vec(),
                        value_len: value.len(),
                    };
                    warn!("Skipping: {}", err);
                }
            }
            Ok(ScanFlow::Continue)
        })?;

        Ok((normalized, legacy))
    }

    /// Rebuild the canonical index of `store`
    pub fn rebuild(&self, store: &dyn KvStore) -> Result<RebuildReport> {
        if store.is_empty()? {
            return Err(MigrationError::InvariantViolation(
                "canonical rebuild on an empty destination; transcode must run first".to_string(),
            ));
        }

        info!("Rebuilding canonical index");
        let mut report = RebuildReport::default();

        let by_hash = Self::load_hash_index(store, &mut report)?;
        info!("Loaded {} hash -> number entries", by_hash.len());

        let (mut normalized, legacy) = Self::load_canonical(store, &mut report)?;
        info!(
            "Found {} normalized and {} legacy canonical records ({} malformed)",
            normalized.len(),
            legacy.len(),
            report.malformed
        );

        let mut writer = BatchWriter::new(store, self.batch_size, self.cancel.clone());

        for record in legacy {
            let indexed = by_hash.get(&record.hash).copied();
            let number = indexed.unwrap_or(record.number);

            if let Some(existing) = normalized.get(&number) {
                if *existing != record.hash {
                    report.conflicts += 1;
                    warn!(
                        "Block {}: legacy hash {} conflicts with canonical {}, keeping canonical",
                        number,
                        hex::encode(record.hash),
                        hex::encode(existing)
                    );
                }
                writer.delete(record.key);
                writer.checkpoint()?;
                continue;
            }

            match indexed {
                Some(n) if n != record.number => {
                    report.corrected += 1;
                    warn!(
                        "Legacy canonical key for {} holds hash {} indexed at {}",
                        record.number,
                        hex::encode(record.hash),
                        n
                    );
                }
                Some(_) => {}
                None => {
                    report.orphans += 1;
                    debug!(
                        "Hash {} has no hash -> number entry, keeping block {}",
                        hex::encode(record.hash),
                        record.number
                    );
                }
            }

            // Put and delete land in the same commit
            writer.put(canonical_key(number), record.hash.to_vec());
            writer.delete(record.key);
            writer.checkpoint()?;
            normalized.insert(number, record.hash);
            report.rebuilt += 1;
        }

        let mut claims: BTreeMap<u64, Vec<BlockHash>> = BTreeMap::new();
        for (hash, number) in &by_hash {
            if !normalized.contains_key(number) {
                claims.entry(*number).or_default().push(*hash);
            }
        }
        for (number, hashes) in claims {
            if let [hash] = hashes.as_slice() {
                writer.put(canonical_key(number), hash.to_vec());
                writer.checkpoint()?;
                report.derived += 1;
            } else {
                report.ambiguous += 1;
                debug!("Block {} claimed by {} hashes, not deriving", number, hashes.len());
            }
        }

        writer.finish()?;

        info!(
            "Canonical rebuild complete: {} rebuilt, {} derived, {} orphans, {} conflicts, {} malformed, {} ambiguous",
            report.rebuilt,
            report.derived,
            report.orphans,
            report.conflicts,
            report.malformed,
            report.ambiguous
        );
        Ok(report)
    }
}

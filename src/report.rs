//! Reports returned by each pass
//!
//! Reports are the operator-facing surface of a migration. Everything an
//! operator needs to judge a run is in here, so nothing has to be scraped
//! from logs.

use crate::types::{ChainTip, KeyConvention, RecordType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of the transcode pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeReport {
    /// Records written per semantic type
    pub counts: BTreeMap<RecordType, u64>,
    /// Keys seen per matched convention
    pub conventions: BTreeMap<KeyConvention, u64>,
    /// Pointer records copied verbatim
    pub pointers_copied: u64,
    /// Keys no convention recognised
    pub skipped_unknown: u64,
    /// Recognised keys excluded by the profile
    pub skipped_excluded: u64,
    /// Source keys visited
    pub processed: u64,
    /// Records written to the destination
    pub written: u64,
    /// Batch commits issued
    pub commits: u64,
    /// Scan ended early at the configured write limit
    pub limit_reached: bool,
}

impl TranscodeReport {
    /// Every key not written to the destination
    pub fn skipped(&self) -> u64 {
        self.skipped_unknown + self.skipped_excluded
    }

    pub fn count(&self, record_type: RecordType) -> u64 {
        self.counts.get(&record_type).copied().unwrap_or(0)
    }

    pub(crate) fn record(&mut self, record_type: RecordType) {
        *self.counts.entry(record_type).or_insert(0) += 1;
    }

    pub(crate) fn saw(&mut self, convention: KeyConvention) {
        *self.conventions.entry(convention).or_insert(0) += 1;
    }
}

/// Outcome of the canonical index rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// Legacy records rewritten under the normalized key
    pub rebuilt: u64,
    /// Normalized records left untouched
    pub already_normalized: u64,
    /// Rebuilt records whose hash had no hash -> number entry
    pub orphans: u64,
    /// Rebuilt records whose number was corrected by the hash -> number index
    pub corrected: u64,
    /// Legacy records dropped in favour of an existing normalized record with
    /// a different hash
    pub conflicts: u64,
    /// Canonical records that could not be decoded
    pub malformed: u64,
    /// Canonical records derived from the hash -> number index alone
    pub derived: u64,
    /// Numbers claimed by more than one hash with no canonical record
    pub ambiguous: u64,
    /// Hash -> number entries read
    pub hash_entries: u64,
}

/// Outcome of writing continuity markers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContinuityOutcome {
    /// Markers written for this tip
    Tip(ChainTip),
    /// No canonical records exist; no markers written
    EmptyChain,
}

impl ContinuityOutcome {
    pub fn tip(&self) -> Option<ChainTip> {
        match self {
            ContinuityOutcome::Tip(tip) => Some(*tip),
            ContinuityOutcome::EmptyChain => None,
        }
    }
}

/// Missing records in a scanned block range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub from: u64,
    pub to: u64,
    pub missing_headers: Vec<u64>,
    pub missing_bodies: Vec<u64>,
    pub missing_receipts: Vec<u64>,
    pub missing_canonical: Vec<u64>,
}

impl IntegrityReport {
    pub fn is_complete(&self) -> bool {
        self.missing_headers.is_empty()
            && self.missing_bodies.is_empty()
            && self.missing_receipts.is_empty()
            && self.missing_canonical.is_empty()
    }
}

/// Aggregated result of a full pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationReport {
    pub transcode: TranscodeReport,
    pub rebuild: RebuildReport,
    pub continuity: ContinuityOutcome,
    /// Present when an integrity window was configured and a tip exists
    pub integrity: Option<IntegrityReport>,
}

impl MigrationReport {
    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serializes_for_operators() {
        let mut transcode = TranscodeReport::default();
        transcode.record(RecordType::Header);
        transcode.record(RecordType::Header);
        transcode.saw(KeyConvention::Namespaced);
        transcode.skipped_unknown = 3;

        let report = MigrationReport {
            transcode,
            rebuild: RebuildReport::default(),
            continuity: ContinuityOutcome::EmptyChain,
            integrity: None,
        };
        let json = report.to_json_pretty().unwrap();
        assert!(json.contains("\"Header\": 2"));
        assert!(json.contains("\"skipped_unknown\": 3"));
        assert!(json.contains("empty_chain"));
    }

    #[test]
    fn skipped_adds_both_kinds() {
        let report = TranscodeReport {
            skipped_unknown: 2,
            skipped_excluded: 5,
            ..Default::default()
        };
        assert_eq!(report.skipped(), 7);
        assert_eq!(report.count(RecordType::Body), 0);
    }
}

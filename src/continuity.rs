//! Continuity markers
//!
//! After the canonical index is rebuilt, the destination must name its tip
//! under every key a consuming node may look for on startup.

use crate::error::Result;
use crate::report::ContinuityOutcome;
use crate::schema::keys::{CANONICAL_PREFIX, HASH_MARKERS, HEIGHT_MARKER};
use crate::schema::{encode_block_number, header_prefix, parse_canonical_key, CanonicalLayout};
use crate::store::{KvStore, ScanFlow, WriteBatch};
use crate::types::{BlockHash, ChainTip};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Writes the height and last-accepted markers for the canonical tip
#[derive(Debug, Default, Clone, Copy)]
pub struct ContinuityMarkerWriter;

impl ContinuityMarkerWriter {
    pub fn new() -> Self {
        Self
    }

    /// Highest block with both a normalized canonical record and a header
    pub fn find_tip(&self, store: &dyn KvStore) -> Result<Option<ChainTip>> {
        let mut canonical: BTreeMap<u64, BlockHash> = BTreeMap::new();

        store.scan_prefix(&[CANONICAL_PREFIX], &mut |key, value| {
            if let Some(CanonicalLayout::Normalized(number)) = parse_canonical_key(key) {
                match BlockHash::try_from(value) {
                    Ok(hash) => {
                        canonical.insert(number, hash);
                    }
                    Err(_) => warn!(
                        "Canonical record for block {} has a {}-byte value, ignoring",
                        number,
                        value.len()
                    ),
                }
            }
            Ok(ScanFlow::Continue)
        })?;

        for (&number, &hash) in canonical.iter().rev() {
            if store.contains_prefix(&header_prefix(number))? {
                return Ok(Some(ChainTip { number, hash }));
            }
            debug!("Block {} has a canonical record but no header", number);
        }
        Ok(None)
    }

    /// Locate the tip and write every marker in one atomic batch
    pub fn write(&self, store: &dyn KvStore) -> Result<ContinuityOutcome> {
        let tip = match self.find_tip(store)? {
            Some(tip) => tip,
            None => {
                warn!(
                    "No block has both a header and a canonical record, leaving continuity markers unset"
                );
                return Ok(ContinuityOutcome::EmptyChain);
            }
        };

        let mut batch = WriteBatch::new();
        batch.put(HEIGHT_MARKER, encode_block_number(tip.number).to_vec());
        for marker in HASH_MARKERS {
            batch.put(*marker, tip.hash.to_vec());
        }
        store.commit(batch)?;

        info!(
            "Continuity markers set: tip {} ({})",
            tip.number,
            hex::encode(tip.hash)
        );
        Ok(ContinuityOutcome::Tip(tip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{canonical_key, header_key, legacy_canonical_key};
    use crate::store::MemoryStore;

    fn block(store: &MemoryStore, number: u64) {
        let hash = [number as u8; 32];
        store.insert(header_key(number, &hash), b"header".to_vec());
        store.insert(canonical_key(number), hash.to_vec());
    }

    #[test]
    fn markers_point_at_highest_canonical_block() {
        let store = MemoryStore::new();
        for n in [0u64, 1, 2, 5] {
            block(&store, n);
        }

        let outcome = ContinuityMarkerWriter::new().write(&store).unwrap();

        let tip = outcome.tip().unwrap();
        assert_eq!(tip.number, 5);
        assert_eq!(tip.hash, [5u8; 32]);
        assert_eq!(
            store.get(HEIGHT_MARKER).unwrap(),
            Some(5u64.to_be_bytes().to_vec())
        );
        for marker in HASH_MARKERS {
            assert_eq!(store.get(marker).unwrap(), Some(vec![5u8; 32]));
        }
    }

    #[test]
    fn tip_needs_a_header() {
        let store = MemoryStore::new();
        for n in 0..=3u64 {
            block(&store, n);
        }
        store.insert(canonical_key(4), vec![4u8; 32]);
        store.insert(canonical_key(5), vec![5u8; 32]);

        let outcome = ContinuityMarkerWriter::new().write(&store).unwrap();

        assert_eq!(outcome.tip().unwrap().number, 3);
        assert_eq!(
            store.get(HEIGHT_MARKER).unwrap(),
            Some(3u64.to_be_bytes().to_vec())
        );
        assert_eq!(store.get(b"LastAccepted").unwrap(), Some(vec![3u8; 32]));
    }

    #[test]
    fn canonical_without_any_header_is_empty() {
        let store = MemoryStore::new();
        store.insert(canonical_key(7), vec![7u8; 32]);

        let outcome = ContinuityMarkerWriter::new().write(&store).unwrap();

        assert_eq!(outcome, ContinuityOutcome::EmptyChain);
        assert_eq!(store.get(HEIGHT_MARKER).unwrap(), None);
    }

    #[test]
    fn legacy_and_malformed_records_are_not_tips() {
        let store = MemoryStore::new();
        block(&store, 3);
        store.insert(legacy_canonical_key(9), vec![9u8; 32]);
        store.insert(header_key(9, &[9u8; 32]), b"header".to_vec());
        store.insert(canonical_key(8), vec![8u8; 4]);
        store.insert(header_key(8, &[8u8; 32]), b"header".to_vec());

        let tip = ContinuityMarkerWriter::new().find_tip(&store).unwrap().unwrap();
        assert_eq!(tip.number, 3);
    }

    #[test]
    fn empty_chain_writes_nothing() {
        let store = MemoryStore::new();
        store.insert(b"evmhk1".to_vec(), b"v1".to_vec());

        let outcome = ContinuityMarkerWriter::new().write(&store).unwrap();

        assert_eq!(outcome, ContinuityOutcome::EmptyChain);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(HEIGHT_MARKER).unwrap(), None);
    }
}

//! Destination prefixes and profile membership per record type

use crate::schema::keys::*;
use crate::types::{MigrationProfile, RecordType};

/// Static table of destination key prefixes
pub struct RecordTypeRegistry;

impl RecordTypeRegistry {
    /// Destination prefix for a record type, `None` for `Unknown`
    pub fn destination_prefix(record_type: RecordType) -> Option<&'static [u8]> {
        let prefix: &'static [u8] = match record_type {
            RecordType::Header => HEADER_TAG,
            RecordType::Body => BODY_TAG,
            RecordType::Receipts => RECEIPTS_TAG,
            RecordType::HashToNumber => HASH_TO_NUMBER_TAG,
            RecordType::NumberToHash => &[CANONICAL_PREFIX],
            RecordType::Transaction => TRANSACTION_TAG,
            RecordType::TxLookup => TX_LOOKUP_TAG,
            RecordType::TotalDifficulty => TOTAL_DIFFICULTY_TAG,
            RecordType::Metadata => METADATA_TAG,
            RecordType::Account => ACCOUNT_TAG,
            RecordType::Storage => STORAGE_TAG,
            RecordType::StateObject => STATE_OBJECT_TAG,
            RecordType::StateTrieNode => STATE_TRIE_TAG,
            RecordType::Code => CODE_TAG,
            RecordType::Unknown => return None,
        };
        Some(prefix)
    }

    /// Whether records of this type are migrated under `profile`
    pub fn included(record_type: RecordType, profile: MigrationProfile) -> bool {
        match record_type {
            RecordType::Unknown => false,
            t if t.is_state() => profile.include_state,
            _ => true,
        }
    }

    /// Destination key for a classified record, `None` if the type is
    /// excluded or unnamed
    pub fn destination_key(
        record_type: RecordType,
        natural_key: &[u8],
        profile: MigrationProfile,
    ) -> Option<Vec<u8>> {
        if !Self::included(record_type, profile) {
            return None;
        }
        let prefix = Self::destination_prefix(record_type)?;
        let mut key = Vec::with_capacity(prefix.len() + natural_key.len());
        key.extend_from_slice(prefix);
        key.extend_from_slice(natural_key);
        Some(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_named_type_has_a_distinct_prefix() {
        let mut seen = HashSet::new();
        for t in RecordType::ALL {
            match RecordTypeRegistry::destination_prefix(t) {
                Some(prefix) => assert!(seen.insert(prefix), "{} shares a prefix", t),
                None => assert_eq!(t, RecordType::Unknown),
            }
        }
    }

    #[test]
    fn state_follows_profile() {
        let history = MigrationProfile::history_only();
        let state = MigrationProfile::with_state();

        assert!(RecordTypeRegistry::included(RecordType::Header, history));
        assert!(RecordTypeRegistry::included(RecordType::Metadata, history));
        assert!(!RecordTypeRegistry::included(RecordType::Account, history));
        assert!(RecordTypeRegistry::included(RecordType::Account, state));
        assert!(!RecordTypeRegistry::included(RecordType::Unknown, state));
    }

    #[test]
    fn destination_key_concatenates() {
        let key = RecordTypeRegistry::destination_key(
            RecordType::Header,
            b"natural",
            MigrationProfile::default(),
        );
        assert_eq!(key.as_deref(), Some(&b"evmhnatural"[..]));

        let canonical = RecordTypeRegistry::destination_key(
            RecordType::NumberToHash,
            &7u64.to_be_bytes(),
            MigrationProfile::default(),
        )
        .unwrap();
        assert_eq!(canonical, crate::schema::canonical_key(7));

        assert!(RecordTypeRegistry::destination_key(
            RecordType::Code,
            b"x",
            MigrationProfile::default()
        )
        .is_none());
    }
}

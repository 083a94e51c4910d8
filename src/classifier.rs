//! Key classification
//!
//! Maps raw key bytes to a semantic [`RecordType`] and the natural key that
//! follows the convention-specific prefix. All knowledge of source key
//! conventions lives here; see [`crate::schema`] for the tables.

use crate::schema::keys::*;
use crate::types::{KeyConvention, Namespace, RecordType};

/// Result of classifying one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    /// Semantic record type, `Unknown` if no convention matched
    pub record_type: RecordType,
    /// Natural key with every convention prefix stripped. For unknown keys
    /// this is the whole input key.
    pub key: &'a [u8],
    /// Convention the key matched
    pub convention: KeyConvention,
}

impl<'a> Classification<'a> {
    fn unrecognized(key: &'a [u8]) -> Self {
        Self {
            record_type: RecordType::Unknown,
            key,
            convention: KeyConvention::Unrecognized,
        }
    }

    /// Whether the key matched a known convention
    pub fn is_known(&self) -> bool {
        self.record_type != RecordType::Unknown
    }
}

/// Classifies keys of one chain's dataset
#[derive(Debug, Clone)]
pub struct KeyClassifier {
    namespace: Namespace,
}

impl KeyClassifier {
    /// Create a classifier for keys namespaced under `namespace`
    pub fn new(namespace: Namespace) -> Self {
        Self { namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Classify a key.
    ///
    /// Conventions are tried in priority order: namespaced, ASCII tag,
    /// single-byte raw, bare hash. A namespaced key with an unlisted suffix
    /// has its namespace stripped and the remainder classified exactly once
    /// more as a flat key.
    pub fn classify<'a>(&self, key: &'a [u8]) -> Classification<'a> {
        if key.len() > NAMESPACE_LEN && key[..NAMESPACE_LEN] == self.namespace.as_bytes()[..] {
            let suffix = key[NAMESPACE_LEN];
            let natural = &key[NAMESPACE_LEN + 1..];

            if let Some(record_type) = namespaced_suffix_type(suffix) {
                let record_type = if suffix == CANONICAL_PREFIX {
                    refine_h(natural).unwrap_or(RecordType::Header)
                } else {
                    record_type
                };
                return Classification {
                    record_type,
                    key: natural,
                    convention: KeyConvention::Namespaced,
                };
            }

            return match classify_flat(&key[NAMESPACE_LEN..]) {
                Some((record_type, natural, _)) => Classification {
                    record_type,
                    key: natural,
                    convention: KeyConvention::NamespacedFlat,
                },
                None => Classification::unrecognized(key),
            };
        }

        match classify_flat(key) {
            Some((record_type, natural, convention)) => Classification {
                record_type,
                key: natural,
                convention,
            },
            None => Classification::unrecognized(key),
        }
    }
}

/// Record type for a namespaced suffix byte
pub fn namespaced_suffix_type(suffix: u8) -> Option<RecordType> {
    let record_type = match suffix {
        0x68 => RecordType::Header,
        0x48 => RecordType::HashToNumber,
        0x62 | 0x42 => RecordType::Body,
        0x72 => RecordType::Receipts,
        0x6e => RecordType::NumberToHash,
        0x74 => RecordType::Transaction,
        0xfd | 0x6c => RecordType::Metadata,
        0x64 | 0x44 => RecordType::TotalDifficulty,
        0x26 | 0x41 => RecordType::Account,
        0xa3 | 0x53 => RecordType::Storage,
        0x6f => RecordType::StateObject,
        0x73 => RecordType::StateTrieNode,
        0x63 => RecordType::Code,
        _ => return None,
    };
    Some(record_type)
}

/// Record type for a 4-byte ASCII tag
pub fn ascii_tag_type(tag: &[u8]) -> Option<RecordType> {
    let tag: &[u8; 4] = tag.try_into().ok()?;
    let record_type = match tag {
        HEADER_TAG => RecordType::Header,
        BODY_TAG => RecordType::Body,
        RECEIPTS_TAG => RecordType::Receipts,
        HASH_TO_NUMBER_TAG => RecordType::HashToNumber,
        NUMBER_TO_HASH_TAG => RecordType::NumberToHash,
        TRANSACTION_TAG => RecordType::Transaction,
        TX_LOOKUP_TAG => RecordType::TxLookup,
        TOTAL_DIFFICULTY_TAG => RecordType::TotalDifficulty,
        METADATA_TAG => RecordType::Metadata,
        ACCOUNT_TAG => RecordType::Account,
        STORAGE_TAG => RecordType::Storage,
        STATE_OBJECT_TAG => RecordType::StateObject,
        STATE_TRIE_TAG => RecordType::StateTrieNode,
        CODE_TAG => RecordType::Code,
        _ => return None,
    };
    Some(record_type)
}

/// Disambiguate the records sharing the `h` prefix by natural key shape
fn refine_h(natural: &[u8]) -> Option<RecordType> {
    match natural.len() {
        NUMBER_LEN => Some(RecordType::NumberToHash),
        len if len == NUMBER_LEN + 1 && natural[NUMBER_LEN] == LEGACY_CANONICAL_SUFFIX => {
            Some(RecordType::NumberToHash)
        }
        len if len == NUMBER_LEN + HASH_LEN => Some(RecordType::Header),
        len if len == NUMBER_LEN + HASH_LEN + 1 && natural[NUMBER_LEN + HASH_LEN] == TD_SUFFIX => {
            Some(RecordType::TotalDifficulty)
        }
        _ => None,
    }
}

/// Record type for a raw single-byte prefix, given the natural key
fn raw_type(tag: u8, natural: &[u8]) -> Option<RecordType> {
    let len = natural.len();
    match tag {
        b'h' => refine_h(natural),
        b'H' if len == HASH_LEN => Some(RecordType::HashToNumber),
        b'b' if len == NUMBER_LEN + HASH_LEN => Some(RecordType::Body),
        b'r' if len == NUMBER_LEN + HASH_LEN => Some(RecordType::Receipts),
        b'l' if len == HASH_LEN => Some(RecordType::TxLookup),
        b'c' if len == HASH_LEN => Some(RecordType::Code),
        b'a' if len == HASH_LEN => Some(RecordType::Account),
        b'o' if len == 2 * HASH_LEN => Some(RecordType::Storage),
        _ => None,
    }
}

/// Classify a key that carries no namespace
fn classify_flat(key: &[u8]) -> Option<(RecordType, &[u8], KeyConvention)> {
    // No tagged layout leaves a 28- or 31-byte natural key, so a 32-byte
    // key is always a trie node even when its first bytes look like a tag.
    if key.len() == HASH_LEN {
        return Some((RecordType::StateTrieNode, key, KeyConvention::BareHash));
    }

    if key.len() >= 4 {
        if let Some(record_type) = ascii_tag_type(&key[..4]) {
            return Some((record_type, &key[4..], KeyConvention::Ascii));
        }
    }

    if let Some((&tag, natural)) = key.split_first() {
        if let Some(record_type) = raw_type(tag, natural) {
            return Some((record_type, natural, KeyConvention::Raw));
        }
    }

    None
}

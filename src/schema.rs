//! Key layouts read and written by the migration
//!
//! This module documents every byte-level key convention the engine knows
//! and provides builders for the destination layout.

/// Key conventions
///
/// # Source: namespaced
///
/// Several chains share one physical store. Each record key is
///
/// ```text
/// namespace (32 bytes) ‖ suffix (1 byte) ‖ natural key
/// ```
///
/// | Suffix | Record | State only |
/// |--------|--------|------------|
/// | `0x68` | Header (refined by natural key length, see below) | no |
/// | `0x48` | HashToNumber | no |
/// | `0x62`, `0x42` | Body | no |
/// | `0x72` | Receipts | no |
/// | `0x6e` | NumberToHash (legacy suffixed form) | no |
/// | `0x74` | Transaction | no |
/// | `0xfd`, `0x6c` | Metadata | no |
/// | `0x64`, `0x44` | TotalDifficulty | no |
/// | `0x26`, `0x41` | Account | yes |
/// | `0xa3`, `0x53` | Storage | yes |
/// | `0x6f` | StateObject | yes |
/// | `0x73` | StateTrieNode | yes |
/// | `0x63` | Code | yes |
///
/// A namespaced key whose suffix byte is not in the table is treated as a
/// namespace-wrapped flat key: bytes 32.. are classified once more as ASCII
/// or raw, never as namespaced again.
///
/// # Source and destination: ASCII tags
///
/// A 4-byte tag followed directly by the natural key. The same tags are the
/// destination prefixes for every type except NumberToHash.
///
/// | Tag | Record |
/// |-----|--------|
/// | `evmh` | Header (`number ‖ hash`) |
/// | `evmb` | Body (`number ‖ hash`) |
/// | `evmr` | Receipts (`number ‖ hash`) |
/// | `evmH` | HashToNumber (`hash` -> `u64be`) |
/// | `evmn` | NumberToHash (`number` -> `hash`) |
/// | `evmt` | Transaction |
/// | `evml` | TxLookup |
/// | `evmd` | TotalDifficulty |
/// | `evmm` | Metadata |
/// | `evma` | Account |
/// | `evmo` | Storage |
/// | `evmO` | StateObject |
/// | `evms` | StateTrieNode |
/// | `evmc` | Code |
///
/// # Source: single-byte raw
///
/// A single type byte followed by a natural key of an exact length.
///
/// | Byte | Remainder | Record |
/// |------|-----------|--------|
/// | `h` | 8 | NumberToHash (normalized) |
/// | `h` | 8 + `n` | NumberToHash (legacy) |
/// | `h` | 40 | Header |
/// | `h` | 40 + `t` | TotalDifficulty |
/// | `H` | 32 | HashToNumber |
/// | `b` | 40 | Body |
/// | `r` | 40 | Receipts |
/// | `l` | 32 | TxLookup |
/// | `c` | 32 | Code |
/// | `a` | 32 | Account |
/// | `o` | 64 | Storage |
///
/// A bare 32-byte key with none of the above prefixes is a hash-scheme trie
/// node.
///
/// # Destination: canonical index
///
/// - Normalized: `0x68 ‖ u64be(number)` (9 bytes) -> 32-byte hash
/// - Legacy: `0x68 ‖ u64be(number) ‖ 0x6e` (10 bytes), rewritten to the
///   normalized key and deleted by the canonical rebuild
///
/// # Pointer records
///
/// Fixed ASCII names with no namespace. The always-copied set is carried
/// verbatim from source to destination. The continuity set is rewritten
/// after migration so every alias names the same tip.
pub mod keys {
    /// Length of a namespace prefix
    pub const NAMESPACE_LEN: usize = 32;
    /// Length of a block hash
    pub const HASH_LEN: usize = 32;
    /// Length of an encoded block number
    pub const NUMBER_LEN: usize = 8;

    /// Destination canonical prefix and raw header prefix (`h`)
    pub const CANONICAL_PREFIX: u8 = 0x68;
    /// Trailing byte of the legacy 10-byte canonical key (`n`)
    pub const LEGACY_CANONICAL_SUFFIX: u8 = 0x6e;
    /// Trailing byte of a raw total difficulty key (`t`)
    pub const TD_SUFFIX: u8 = 0x74;
    /// Normalized canonical key length
    pub const CANONICAL_KEY_LEN: usize = 1 + NUMBER_LEN;
    /// Legacy canonical key length
    pub const LEGACY_CANONICAL_KEY_LEN: usize = 2 + NUMBER_LEN;

    pub const HEADER_TAG: &[u8; 4] = b"evmh";
    pub const BODY_TAG: &[u8; 4] = b"evmb";
    pub const RECEIPTS_TAG: &[u8; 4] = b"evmr";
    pub const HASH_TO_NUMBER_TAG: &[u8; 4] = b"evmH";
    pub const NUMBER_TO_HASH_TAG: &[u8; 4] = b"evmn";
    pub const TRANSACTION_TAG: &[u8; 4] = b"evmt";
    pub const TX_LOOKUP_TAG: &[u8; 4] = b"evml";
    pub const TOTAL_DIFFICULTY_TAG: &[u8; 4] = b"evmd";
    pub const METADATA_TAG: &[u8; 4] = b"evmm";
    pub const ACCOUNT_TAG: &[u8; 4] = b"evma";
    pub const STORAGE_TAG: &[u8; 4] = b"evmo";
    pub const STATE_OBJECT_TAG: &[u8; 4] = b"evmO";
    pub const STATE_TRIE_TAG: &[u8; 4] = b"evms";
    pub const CODE_TAG: &[u8; 4] = b"evmc";

    /// Pointer keys copied verbatim regardless of profile
    pub const ALWAYS_COPIED: &[&[u8]] = &[
        b"LastAccepted",
        b"last_accepted_key",
        b"lastAccepted",
        b"lastFinalized",
        b"LastFinalizedKey",
        b"vm_state",
        b"chain_state",
        b"lastBlock",
        b"vm_lastAccepted",
        b"TrieDB.scheme",
        b"snapshotDisabled",
        b"snapshotRecovery",
        b"snapshotJournal",
        b"snapshotGenerator",
        b"snapshotRoot",
        b"snapshotBlock",
        b"Height",
        b"consensus/accepted",
        b"LastBlock",
        b"LastHeader",
        b"lastAcceptedKey",
        b"LastFast",
    ];

    /// Continuity marker holding the tip number (`u64be`)
    pub const HEIGHT_MARKER: &[u8] = b"Height";

    /// Continuity markers holding the tip hash
    pub const HASH_MARKERS: &[&[u8]] = &[
        b"LastAccepted",
        b"lastAccepted",
        b"last_accepted_key",
        b"lastAcceptedKey",
        b"consensus/accepted",
        b"LastBlock",
        b"LastHeader",
        b"LastFast",
    ];
}

use keys::*;

/// Encode a block number as 8 big-endian bytes
pub fn encode_block_number(number: u64) -> [u8; NUMBER_LEN] {
    number.to_be_bytes()
}

/// Decode 8 big-endian bytes into a block number
pub fn decode_block_number(bytes: &[u8]) -> Option<u64> {
    let array: [u8; NUMBER_LEN] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(array))
}

/// Build the normalized 9-byte canonical key
pub fn canonical_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(CANONICAL_KEY_LEN);
    key.push(CANONICAL_PREFIX);
    key.extend_from_slice(&encode_block_number(number));
    key
}

/// Build the legacy 10-byte canonical key
pub fn legacy_canonical_key(number: u64) -> Vec<u8> {
    let mut key = canonical_key(number);
    key.push(LEGACY_CANONICAL_SUFFIX);
    key
}

/// Layout of a key under the canonical prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanonicalLayout {
    Normalized(u64),
    Legacy(u64),
}

/// Recognise a canonical key by its layout
pub fn parse_canonical_key(key: &[u8]) -> Option<CanonicalLayout> {
    if key.first() != Some(&CANONICAL_PREFIX) {
        return None;
    }
    match key.len() {
        CANONICAL_KEY_LEN => decode_block_number(&key[1..]).map(CanonicalLayout::Normalized),
        LEGACY_CANONICAL_KEY_LEN if key[LEGACY_CANONICAL_KEY_LEN - 1] == LEGACY_CANONICAL_SUFFIX => {
            decode_block_number(&key[1..1 + NUMBER_LEN]).map(CanonicalLayout::Legacy)
        }
        _ => None,
    }
}

/// Build a destination hash -> number key
pub fn hash_to_number_key(hash: &[u8; HASH_LEN]) -> Vec<u8> {
    [&HASH_TO_NUMBER_TAG[..], &hash[..]].concat()
}

/// Prefix shared by all destination headers at `number`
pub fn header_prefix(number: u64) -> Vec<u8> {
    [&HEADER_TAG[..], &encode_block_number(number)[..]].concat()
}

/// Build a destination header key
pub fn header_key(number: u64, hash: &[u8; HASH_LEN]) -> Vec<u8> {
    [header_prefix(number).as_slice(), &hash[..]].concat()
}

/// Prefix shared by all destination bodies at `number`
pub fn body_prefix(number: u64) -> Vec<u8> {
    [&BODY_TAG[..], &encode_block_number(number)[..]].concat()
}

/// Build a destination body key
pub fn body_key(number: u64, hash: &[u8; HASH_LEN]) -> Vec<u8> {
    [body_prefix(number).as_slice(), &hash[..]].concat()
}

/// Prefix shared by all destination receipts at `number`
pub fn receipts_prefix(number: u64) -> Vec<u8> {
    [&RECEIPTS_TAG[..], &encode_block_number(number)[..]].concat()
}

/// Build a destination receipts key
pub fn receipts_key(number: u64, hash: &[u8; HASH_LEN]) -> Vec<u8> {
    [receipts_prefix(number).as_slice(), &hash[..]].concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_layouts() {
        assert_eq!(canonical_key(7).len(), 9);
        assert_eq!(legacy_canonical_key(7).len(), 10);
        assert_eq!(
            parse_canonical_key(&canonical_key(7)),
            Some(CanonicalLayout::Normalized(7))
        );
        assert_eq!(
            parse_canonical_key(&legacy_canonical_key(7)),
            Some(CanonicalLayout::Legacy(7))
        );
    }

    #[test]
    fn canonical_rejects_other_shapes() {
        let mut wrong_suffix = canonical_key(7);
        wrong_suffix.push(0x00);
        assert_eq!(parse_canonical_key(&wrong_suffix), None);
        assert_eq!(parse_canonical_key(&header_key(7, &[1; 32])), None);
        assert_eq!(parse_canonical_key(&[CANONICAL_PREFIX; 4]), None);
        assert_eq!(parse_canonical_key(&[]), None);
    }

    #[test]
    fn block_numbers_sort_by_key() {
        assert!(canonical_key(255) < canonical_key(256));
        assert!(header_prefix(1) < header_prefix(2));
    }

    #[test]
    fn primary_markers_are_copied_verbatim() {
        assert!(ALWAYS_COPIED.contains(&HEIGHT_MARKER));
        assert!(ALWAYS_COPIED.contains(&&b"LastAccepted"[..]));
    }

    #[test]
    fn every_continuity_alias_is_copied_verbatim() {
        for marker in HASH_MARKERS {
            assert!(
                ALWAYS_COPIED.contains(marker),
                "{}",
                String::from_utf8_lossy(marker)
            );
        }
    }
}

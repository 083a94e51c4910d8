//! Migration types

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte block hash
pub type BlockHash = [u8; 32];

/// Semantic type of a stored record, independent of the key convention it
/// was written under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RecordType {
    Header,
    Body,
    Receipts,
    HashToNumber,
    /// Canonical number -> hash mapping
    NumberToHash,
    Transaction,
    TxLookup,
    TotalDifficulty,
    /// Chain metadata and pointer records
    Metadata,
    Account,
    Storage,
    StateObject,
    StateTrieNode,
    Code,
    Unknown,
}

impl RecordType {
    /// Every type the classifier can produce, `Unknown` last
    pub const ALL: [RecordType; 15] = [
        RecordType::Header,
        RecordType::Body,
        RecordType::Receipts,
        RecordType::HashToNumber,
        RecordType::NumberToHash,
        RecordType::Transaction,
        RecordType::TxLookup,
        RecordType::TotalDifficulty,
        RecordType::Metadata,
        RecordType::Account,
        RecordType::Storage,
        RecordType::StateObject,
        RecordType::StateTrieNode,
        RecordType::Code,
        RecordType::Unknown,
    ];

    /// Whether the type belongs to world state rather than block history
    pub fn is_state(self) -> bool {
        matches!(
            self,
            RecordType::Account
                | RecordType::Storage
                | RecordType::StateObject
                | RecordType::StateTrieNode
                | RecordType::Code
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            RecordType::Header => "header",
            RecordType::Body => "body",
            RecordType::Receipts => "receipts",
            RecordType::HashToNumber => "hash-to-number",
            RecordType::NumberToHash => "number-to-hash",
            RecordType::Transaction => "transaction",
            RecordType::TxLookup => "tx-lookup",
            RecordType::TotalDifficulty => "total-difficulty",
            RecordType::Metadata => "metadata",
            RecordType::Account => "account",
            RecordType::Storage => "storage",
            RecordType::StateObject => "state-object",
            RecordType::StateTrieNode => "state-trie-node",
            RecordType::Code => "code",
            RecordType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which key convention a key was recognised under
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyConvention {
    /// `namespace ‖ suffix ‖ natural key`
    Namespaced,
    /// `namespace ‖ flat key`, where the flat key is ASCII or raw
    NamespacedFlat,
    /// 4-byte ASCII tag followed by the natural key
    Ascii,
    /// Single type byte followed by the natural key
    Raw,
    /// Bare 32-byte hash key (hash-scheme trie node)
    BareHash,
    Unrecognized,
}

/// 32-byte chain identifier used as the key namespace in shared stores
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Namespace([u8; 32]);

impl Namespace {
    pub const LEN: usize = 32;

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a namespace from 64 hex characters, with or without `0x`
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed)?;
        let array: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
            crate::MigrationError::InvalidConfig(format!(
                "namespace must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Namespace({})", hex::encode(self.0))
    }
}

impl Serialize for Namespace {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Namespace {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Namespace::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Which record families a migration carries over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationProfile {
    /// Copy account, storage, code and trie records as well as block history
    pub include_state: bool,
}

impl MigrationProfile {
    pub fn history_only() -> Self {
        Self {
            include_state: false,
        }
    }

    pub fn with_state() -> Self {
        Self {
            include_state: true,
        }
    }
}

/// Resolved chain tip after migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTip {
    /// Highest canonical block number present
    pub number: u64,
    /// Canonical hash at `number`, stored as hex string for serialization
    #[serde(serialize_with = "serialize_hash", deserialize_with = "deserialize_hash")]
    pub hash: BlockHash,
}

/// Serialize 32-byte hash as hex string
pub(crate) fn serialize_hash<S>(hash: &BlockHash, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&hex::encode(hash))
}

/// Deserialize 32-byte hash from hex string
pub(crate) fn deserialize_hash<'de, D>(deserializer: D) -> std::result::Result<BlockHash, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
    if bytes.len() != 32 {
        return Err(serde::de::Error::custom("Invalid hash length"));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&bytes);
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_parses_with_and_without_prefix() {
        let hex = "337fb73f9bcdac8c31a2d5f7b877ab1e8a2b7f2a1e9bf02a0a0e6c6fd164f1d1";
        let a = Namespace::from_hex(hex).unwrap();
        let b = Namespace::from_hex(&format!("0x{}", hex)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), hex);
    }

    #[test]
    fn namespace_rejects_wrong_length() {
        assert!(Namespace::from_hex("abcd").is_err());
        assert!(Namespace::from_hex("zz").is_err());
    }

    #[test]
    fn state_types() {
        let state: Vec<_> = RecordType::ALL.iter().filter(|t| t.is_state()).collect();
        assert_eq!(state.len(), 5);
        assert!(!RecordType::Header.is_state());
        assert!(!RecordType::Unknown.is_state());
    }

    #[test]
    fn chain_tip_serializes_hash_as_hex() {
        let tip = ChainTip {
            number: 5,
            hash: [0xab; 32],
        };
        let json = serde_json::to_string(&tip).unwrap();
        assert!(json.contains(&"ab".repeat(32)));
        let back: ChainTip = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tip);
    }
}

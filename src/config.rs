//! Migration configuration

use crate::error::{MigrationError, Result};
use crate::types::{MigrationProfile, Namespace};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Networks whose namespace is known ahead of time
const KNOWN_NETWORKS: &[(u64, &str)] = &[
    (96369, "337fb73f9bcdac8c31a2d5f7b877ab1e8a2b7f2a1e9bf02a0a0e6c6fd164f1d1"),
    (96368, "337fb73f9bcdac8c31a2d5f7b877ab1e8a2b7f2a1e9bf02a0a0e6c6fd164f1d1"),
    (200200, "6078e156c49594d6f65dc1f49a2d2a96f2a59e7c9e8f7e5c4f3a2b1c0d9e8f7a"),
    (36911, "5f4e3d2c1b0a9f8e7d6c5b4a3f2e1d0c9b8a7f6e5d4c3b2a1f0e9d8c7b6a5f4e"),
];

/// Namespace of a known network
pub fn known_namespace(network_id: u64) -> Result<Namespace> {
    let (_, hex) = KNOWN_NETWORKS
        .iter()
        .find(|(id, _)| *id == network_id)
        .ok_or(MigrationError::UnknownNetwork(network_id))?;
    Namespace::from_hex(hex)
}

/// Migration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Source store, opened read-only
    pub source_path: PathBuf,
    /// Destination store, opened for exclusive writing
    pub destination_path: PathBuf,
    /// Namespace of the chain being migrated (hex in serialized form)
    pub namespace: Namespace,
    /// Also migrate account, storage, code and trie records
    pub include_state: bool,
    /// Staged writes per batch commit
    pub batch_size: usize,
    /// Processed source keys between progress log lines
    pub progress_interval: u64,
    /// Stop transcoding after this many written records (trial runs)
    pub limit: Option<u64>,
    /// Scan `[tip - window, tip]` for gaps after the markers are written
    pub integrity_window: Option<u64>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data/source"),
            destination_path: PathBuf::from("data/destination"),
            namespace: Namespace::new([0u8; 32]),
            include_state: false,
            batch_size: 10_000,
            progress_interval: 100_000,
            limit: None,
            integrity_window: None,
        }
    }
}

impl MigrationConfig {
    /// Configuration for a known network
    pub fn for_network(
        network_id: u64,
        source_path: impl Into<PathBuf>,
        destination_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            source_path: source_path.into(),
            destination_path: destination_path.into(),
            namespace: known_namespace(network_id)?,
            ..Default::default()
        })
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let config: Self = serde_json::from_slice(&bytes)?;
        config.validate()?;
        Ok(config)
    }

    pub fn profile(&self) -> MigrationProfile {
        MigrationProfile {
            include_state: self.include_state,
        }
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.as_bytes() == &[0u8; 32] {
            return Err(MigrationError::InvalidConfig(
                "namespace is required".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(MigrationError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if self.progress_interval == 0 {
            return Err(MigrationError::InvalidConfig(
                "progress_interval must be positive".to_string(),
            ));
        }
        if self.source_path == self.destination_path {
            return Err(MigrationError::InvalidConfig(
                "source and destination must differ".to_string(),
            ));
        }
        Ok(())
    }
}

//! Run manifest: config snapshot, environment capture, stable config digest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::ids::RunId;
use crate::rng::RNG_ALGORITHM;

/// Environment metadata captured once per run, for forensics only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    /// The crate's own version, standing in for a language-runtime version.
    pub engine_version: String,
    /// `<os>-<arch>` platform string.
    pub platform: String,
    /// UTC run-start timestamp.
    pub timestamp_utc: DateTime<Utc>,
    /// Name of the deterministic RNG algorithm in use by this build.
    pub rng_algorithm: String,
}

impl Environment {
    /// Capture the current environment. `started_at` is passed in rather
    /// than read from the clock here, so callers control exactly what
    /// "now" means for a run (and tests can fix it).
    #[must_use]
    pub fn capture(started_at: DateTime<Utc>) -> Self {
        Self {
            engine_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH),
            timestamp_utc: started_at,
            rng_algorithm: RNG_ALGORITHM.to_string(),
        }
    }
}

/// Immutable record produced once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    /// Run identifier.
    pub run_id: RunId,
    /// First 16 hex characters of SHA-256 over the canonical serialization
    /// of `config_snapshot`.
    pub config_hash: String,
    /// The full resolved configuration.
    pub config_snapshot: serde_json::Value,
    /// Environment metadata.
    pub environment: Environment,
}

/// Compute the stable 16-hex-character digest of `config`'s canonical
/// (recursively key-sorted) JSON serialization.
///
/// `serde_json::Value`'s object variant is backed by a `BTreeMap` unless
/// the `preserve_order` feature is enabled (it is not, here), so
/// `serde_json::to_string` already emits keys in sorted order at every
/// nesting level.
#[must_use]
pub fn compute_config_hash(config: &serde_json::Value) -> String {
    let canonical = serde_json::to_string(config).unwrap_or_default();
    let digest = Sha256::digest(canonical.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

impl RunManifest {
    /// Build a manifest from a run id, resolved config, and start time.
    #[must_use]
    pub fn new(run_id: RunId, config_snapshot: serde_json::Value, started_at: DateTime<Utc>) -> Self {
        let config_hash = compute_config_hash(&config_snapshot);
        Self {
            run_id,
            config_hash,
            config_snapshot,
            environment: Environment::capture(started_at),
        }
    }

    /// Write this manifest as pretty JSON to `<output_dir>/run_manifest.json`.
    pub fn write(&self, output_dir: &std::path::Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join("run_manifest.json");
        let json = serde_json::to_string_pretty(self).unwrap_or_default();
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a manifest previously written by [`Self::write`].
    pub fn load(output_dir: &std::path::Path) -> Result<Self> {
        let path = output_dir.join("run_manifest.json");
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| crate::error::CoreError::Config(e.to_string()))
    }
}

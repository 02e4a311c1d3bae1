//! tsync-config
//!
//! Layered YAML configuration for the sync engine.
//!
//! - Documents merge in order (base -> site -> env overrides); maps deep-merge,
//!   scalars and arrays are replaced.
//! - The merged value is serialised canonically and hashed (SHA-256) so a
//!   pass can be attributed to an exact configuration.
//! - Literal secrets are rejected at load time. YAML stores env var NAMES;
//!   [`resolve_credentials`] reads the values once at startup.
//! - [`report_unused_keys`] flags leaves no consumer reads.

mod consumption;
mod guard;
mod secrets;
mod settings;
mod tree;

pub use consumption::{
    consumed_pointers, report_unused_keys, ConfigConsumer, UnusedKeyPolicy, UnusedKeyReport,
};
pub use secrets::{resolve_credentials, PlatformCredentials};
pub use settings::{
    ApiSettings, DaemonSettings, EnrolmentSettings, FetchSettings, JobSchedule, LockSettings,
    PlatformSettings, RequestLogSettings, ScheduleSettings, SyncSettings,
};

use anyhow::{Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// The merged configuration together with its canonical text and hash.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Lowercase hex SHA-256 of `canonical_json`.
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    /// Typed, validated view of the merged tree.
    pub fn settings(&self) -> Result<SyncSettings> {
        SyncSettings::from_json(&self.config_json)
    }
}

/// Reads each file in order and layers them; see
/// [`load_layered_yaml_from_strings`].
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|path| {
            std::fs::read_to_string(path).with_context(|| format!("cannot read config file {path}"))
        })
        .collect::<Result<Vec<String>>>()?;
    let refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&refs)
}

/// Layers the YAML documents left to right, refuses literal secrets, then
/// fixes the canonical form and its hash.
pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(serde_json::Map::new());
    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("config layer {layer} is not valid YAML"))?;
        let doc = serde_json::to_value(doc)
            .with_context(|| format!("config layer {layer} has no JSON equivalent"))?;
        tree::merge_layer(&mut merged, doc);
    }

    guard::reject_literal_secrets(&merged)?;

    let canonical_json = tree::canonical_string(&merged).context("config canonicalisation failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

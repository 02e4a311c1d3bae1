use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::tree::for_each_leaf;

/// Which binary is reading the configuration. Each registers the JSON-pointer
/// prefixes it actually reads so unused keys can be flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigConsumer {
    /// One-shot passes from the CLI.
    Cli,
    /// Long-running scheduler.
    Daemon,
}

impl ConfigConsumer {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigConsumer::Cli => "CLI",
            ConfigConsumer::Daemon => "DAEMON",
        }
    }
}

pub fn consumed_pointers(consumer: ConfigConsumer) -> &'static [&'static str] {
    match consumer {
        ConfigConsumer::Cli => ENGINE,
        ConfigConsumer::Daemon => DAEMON,
    }
}

static ENGINE: &[&str] = &[
    "/platform",
    "/fetch",
    "/schedule",
    "/locks",
    "/api",
    "/enrolment",
    "/request_log",
];

static DAEMON: &[&str] = &[
    "/platform",
    "/fetch",
    "/schedule",
    "/locks",
    "/api",
    "/enrolment",
    "/request_log",
    "/daemon",
];

/// Whether leftover keys are only reported or abort startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

/// Leaves of a merged config that `consumer` never reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub consumer: String,
    /// Prefixes the consumer reads, normalised and sorted.
    pub consumed_prefixes: Vec<String>,
    /// Sorted, unique.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Audits `config_json` against what `consumer` registers. Under
/// [`UnusedKeyPolicy::Fail`] any leftover leaf is an error.
pub fn report_unused_keys(
    consumer: ConfigConsumer,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let prefixes: BTreeSet<String> = consumed_pointers(consumer)
        .iter()
        .map(|p| tidy_prefix(p))
        .collect();

    let mut unused = BTreeSet::new();
    for_each_leaf(config_json, |leaf, _| {
        if !prefixes.iter().any(|prefix| covers(prefix, leaf)) {
            unused.insert(leaf.to_string());
        }
    });

    let report = UnusedKeyReport {
        consumer: consumer.as_str().to_string(),
        consumed_prefixes: prefixes.into_iter().collect(),
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} reads none of {} key(s): {}",
            report.consumer,
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }
    Ok(report)
}

/// `"schedule/"` and `"/schedule"` name the same prefix; blank means root.
fn tidy_prefix(raw: &str) -> String {
    let body = raw.trim().trim_matches('/');
    format!("/{body}")
}

/// Token-wise prefix test: `/api` covers `/api/timeout_secs` but not
/// `/api_extra`. The root covers everything.
fn covers(prefix: &str, leaf: &str) -> bool {
    prefix == "/"
        || match leaf.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
}

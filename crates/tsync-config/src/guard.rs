//! Load-time refusal of credentials written straight into YAML.
//!
//! Errors carry the leaf pointer only. The offending value never reaches a
//! message or a log line.

use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::tree::for_each_leaf;

/// Token shapes that are credentials no matter which key holds them.
const TOKEN_SHAPES: &[&str] = &[
    "sk-",
    "sk_live",
    "sk_test",
    "AKIA",
    "-----BEGIN",
    "ghp_",
    "glpat-",
    "xoxb-",
];

/// Leaf keys that hold the NAME of an environment variable.
const CREDENTIAL_KEYS: &[&str] = &["username", "password", "secret", "token"];

#[derive(Debug, PartialEq, Eq)]
enum Violation {
    TokenShaped,
    NotAnEnvName,
}

fn inspect(pointer: &str, text: &str) -> Option<Violation> {
    if has_token_shape(text) {
        return Some(Violation::TokenShaped);
    }
    let key = pointer.rsplit('/').next().unwrap_or_default();
    if CREDENTIAL_KEYS.contains(&key) && !is_env_name(text) {
        return Some(Violation::NotAnEnvName);
    }
    None
}

/// Fails with CONFIG_SECRET_DETECTED on the first string leaf that looks
/// like a credential literal.
pub(crate) fn reject_literal_secrets(merged: &Value) -> Result<()> {
    let mut first: Option<(String, Violation)> = None;
    for_each_leaf(merged, |pointer, leaf| {
        if first.is_some() {
            return;
        }
        if let Some(found) = leaf.as_str().and_then(|s| inspect(pointer, s)) {
            first = Some((pointer.to_string(), found));
        }
    });

    match first {
        None => Ok(()),
        Some((pointer, Violation::TokenShaped)) => Err(anyhow!(
            "CONFIG_SECRET_DETECTED at {pointer}: value has a credential token shape (redacted)"
        )),
        Some((pointer, Violation::NotAnEnvName)) => Err(anyhow!(
            "CONFIG_SECRET_DETECTED at {pointer}: expected an UPPER_SNAKE_CASE env var name"
        )),
    }
}

fn has_token_shape(text: &str) -> bool {
    let text = text.trim();
    text.len() >= 8 && TOKEN_SHAPES.iter().any(|shape| text.starts_with(shape))
}

fn is_env_name(text: &str) -> bool {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

//! Runtime credential resolution.
//!
//! # Contract
//! - Config YAML stores only **env var NAMES** under
//!   `/platform/credentials_env/{username,password}`.
//! - Binaries call [`resolve_credentials`] once at startup and pass the result
//!   into the API client constructor; nothing else reads these env vars.
//! - `Debug` redacts the values; errors name the variable, never the value.

use anyhow::{bail, Result};
use serde_json::Value;

const DEFAULT_USERNAME_VAR: &str = "TSYNC_API_USERNAME";
const DEFAULT_PASSWORD_VAR: &str = "TSYNC_API_PASSWORD";

/// Upstream API credentials resolved from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PlatformCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformCredentials")
            .field("username", &self.username)
            .field("password", &"<REDACTED>")
            .finish()
    }
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Resolve the API username/password named by the config.
///
/// Both are required: the engine has no anonymous mode.
pub fn resolve_credentials(config_json: &Value) -> Result<PlatformCredentials> {
    let username_var = read_str_at(config_json, "/platform/credentials_env/username")
        .unwrap_or_else(|| DEFAULT_USERNAME_VAR.to_string());
    let password_var = read_str_at(config_json, "/platform/credentials_env/password")
        .unwrap_or_else(|| DEFAULT_PASSWORD_VAR.to_string());

    let Some(username) = resolve_env(&username_var) else {
        bail!("SECRETS_MISSING: required env var '{username_var}' (api username) is not set or empty");
    };
    let Some(password) = resolve_env(&password_var) else {
        bail!("SECRETS_MISSING: required env var '{password_var}' (api password) is not set or empty");
    };

    Ok(PlatformCredentials { username, password })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_password() {
        let creds = PlatformCredentials {
            username: "svc".to_string(),
            password: "hunter2".to_string(),
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("<REDACTED>"));
    }
}

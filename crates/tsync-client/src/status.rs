//! Global callability policy over the rolling [`ApiStatus`].
//!
//! Pure: callers load the status, feed every exchange through [`observe`],
//! persist the result, and consult [`is_callable`] before each job.
//!
//! | status            | class              | effect                                   |
//! |-------------------|--------------------|------------------------------------------|
//! | < 400             | `Ok`               | counters cleared, gate open              |
//! | 401, 403          | `CredentialFailure`| count + backoff, alert at threshold      |
//! | >= 500, transport | `ServerError`      | count + backoff                          |
//! | other 4xx         | `RequestError`     | recorded, gate untouched                 |

use chrono::{DateTime, Duration, Utc};
use tsync_schemas::ApiStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiPolicy {
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub auth_alert_threshold: u32,
}

impl Default for ApiPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::seconds(60),
            backoff_max: Duration::seconds(3_600),
            auth_alert_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthClass {
    Ok,
    CredentialFailure,
    ServerError,
    RequestError,
}

/// `None` is a transport failure (no status received).
pub fn classify(status: Option<u16>) -> HealthClass {
    match status {
        Some(s) if s < 400 => HealthClass::Ok,
        Some(401) | Some(403) => HealthClass::CredentialFailure,
        Some(s) if s < 500 => HealthClass::RequestError,
        _ => HealthClass::ServerError,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub class: HealthClass,
    /// True exactly once per failure streak, when the credential-failure
    /// count reaches the policy threshold.
    pub alert_credentials: bool,
}

/// `base * 2^(n-1)`, capped at `max`. `n` is the failure count (>= 1).
pub fn backoff_delay(base: Duration, max: Duration, n: u32) -> Duration {
    let exp = n.saturating_sub(1).min(30);
    let factor = 1i64 << exp;
    base.checked_mul(factor as i32)
        .filter(|d| *d <= max)
        .unwrap_or(max)
}

pub fn observe(
    status: &mut ApiStatus,
    http_status: Option<u16>,
    error: Option<&str>,
    now: DateTime<Utc>,
    policy: &ApiPolicy,
) -> Observation {
    let class = classify(http_status);
    status.last_status = http_status.unwrap_or(0);

    let mut alert_credentials = false;
    match class {
        HealthClass::Ok => {
            status.error_count = 0;
            status.next_callable_at = None;
            status.credential_alert_sent = false;
        }
        HealthClass::CredentialFailure | HealthClass::ServerError => {
            status.error_count = status.error_count.saturating_add(1);
            status.last_error = Some(
                error
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("HTTP {}", status.last_status)),
            );
            status.last_error_at = Some(now);
            status.next_callable_at = Some(
                now + backoff_delay(policy.backoff_base, policy.backoff_max, status.error_count),
            );
            if class == HealthClass::CredentialFailure
                && status.error_count >= policy.auth_alert_threshold
                && !status.credential_alert_sent
            {
                status.credential_alert_sent = true;
                alert_credentials = true;
            }
        }
        HealthClass::RequestError => {
            status.last_error = error.map(str::to_string);
            status.last_error_at = Some(now);
        }
    }

    Observation {
        class,
        alert_credentials,
    }
}

/// The gate: closed while a backoff window is open.
pub fn is_callable(status: &ApiStatus, now: DateTime<Utc>) -> bool {
    status.next_callable_at.map_or(true, |t| now >= t)
}

/// Fresh counters, e.g. after the platform credentials were replaced.
pub fn reset(status: &mut ApiStatus) {
    *status = ApiStatus::default();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn forbidden_closes_gate_for_backoff_window() {
        let policy = ApiPolicy::default();
        let mut st = ApiStatus::default();
        let obs = observe(&mut st, Some(403), None, t0(), &policy);
        assert_eq!(obs.class, HealthClass::CredentialFailure);
        assert!(!obs.alert_credentials);
        assert!(!is_callable(&st, t0() + Duration::seconds(59)));
        assert!(is_callable(&st, t0() + Duration::seconds(60)));
    }

    #[test]
    fn credential_alert_fires_once_at_threshold() {
        let policy = ApiPolicy::default();
        let mut st = ApiStatus::default();
        let alerts: Vec<bool> = (0..5)
            .map(|i| observe(&mut st, Some(401), None, t0() + Duration::hours(i), &policy))
            .map(|o| o.alert_credentials)
            .collect();
        assert_eq!(alerts, vec![false, false, true, false, false]);

        observe(&mut st, Some(200), None, t0() + Duration::hours(6), &policy);
        assert_eq!(st.error_count, 0);
        assert!(!st.credential_alert_sent);
        assert!(is_callable(&st, t0() + Duration::hours(6)));
    }

    #[test]
    fn server_errors_back_off_exponentially_and_cap() {
        let base = Duration::seconds(60);
        let max = Duration::seconds(3_600);
        assert_eq!(backoff_delay(base, max, 1), Duration::seconds(60));
        assert_eq!(backoff_delay(base, max, 2), Duration::seconds(120));
        assert_eq!(backoff_delay(base, max, 4), Duration::seconds(480));
        assert_eq!(backoff_delay(base, max, 7), max);
        assert_eq!(backoff_delay(base, max, 40), max);
    }

    #[test]
    fn transport_failure_counts_as_server_error() {
        let mut st = ApiStatus::default();
        let obs = observe(&mut st, None, Some("refused"), t0(), &ApiPolicy::default());
        assert_eq!(obs.class, HealthClass::ServerError);
        assert_eq!(st.last_status, 0);
        assert_eq!(st.last_error.as_deref(), Some("refused"));
        assert!(!is_callable(&st, t0()));
    }

    #[test]
    fn not_found_leaves_gate_open() {
        let mut st = ApiStatus::default();
        let obs = observe(&mut st, Some(404), Some("gone"), t0(), &ApiPolicy::default());
        assert_eq!(obs.class, HealthClass::RequestError);
        assert_eq!(st.error_count, 0);
        assert!(is_callable(&st, t0()));
    }
}

//! Typed view over the merged configuration.
//!
//! Every section is optional except `platform`; missing values fall back to
//! the defaults below. [`SyncSettings::validate`] runs after deserialization so
//! a bad value fails at startup, not halfway through a pass.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tsync_schemas::ResourceKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncSettings {
    pub platform: PlatformSettings,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub schedule: ScheduleSettings,
    #[serde(default)]
    pub locks: LockSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub enrolment: EnrolmentSettings,
    #[serde(default)]
    pub request_log: RequestLogSettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSettings {
    /// Identifies the upstream tenant; every mirrored row is keyed by it.
    #[serde(default = "default_platform_name")]
    pub name: String,
    /// Base URL, e.g. `https://acme.example.com`.
    pub host: String,
}

fn default_platform_name() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchSettings {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_page_size() -> u32 {
    250
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSchedule {
    pub interval_secs: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl JobSchedule {
    fn every(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

macro_rules! schedule_default {
    ($name:ident, $secs:expr) => {
        fn $name() -> JobSchedule {
            JobSchedule::every($secs)
        }
    };
}

schedule_default!(default_hourly, 3_600);
schedule_default!(default_quarter_hourly, 900);
schedule_default!(default_five_minutes, 300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSettings {
    #[serde(default = "default_hourly")]
    pub event_templates: JobSchedule,
    #[serde(default = "default_hourly")]
    pub events: JobSchedule,
    #[serde(default = "default_hourly")]
    pub online_activities: JobSchedule,
    #[serde(default = "default_quarter_hourly")]
    pub contact_merge_requests: JobSchedule,
    #[serde(default = "default_quarter_hourly")]
    pub registrations: JobSchedule,
    #[serde(default = "default_quarter_hourly")]
    pub outcomes: JobSchedule,
    #[serde(default = "default_hourly")]
    pub contacts: JobSchedule,
    #[serde(default = "default_hourly")]
    pub enrolment_expirations: JobSchedule,
    #[serde(default = "default_five_minutes")]
    pub notifications: JobSchedule,
    #[serde(default = "default_error_backoff_base")]
    pub error_backoff_base_secs: u64,
    #[serde(default = "default_error_backoff_max")]
    pub error_backoff_max_secs: u64,
    /// Extension past `attempt_window_end` before a watermark is disabled.
    #[serde(default = "default_window_grace")]
    pub window_grace_secs: u64,
}

fn default_error_backoff_base() -> u64 {
    300
}

fn default_error_backoff_max() -> u64 {
    86_400
}

fn default_window_grace() -> u64 {
    7 * 86_400
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            event_templates: default_hourly(),
            events: default_hourly(),
            online_activities: default_hourly(),
            contact_merge_requests: default_quarter_hourly(),
            registrations: default_quarter_hourly(),
            outcomes: default_quarter_hourly(),
            contacts: default_hourly(),
            enrolment_expirations: default_hourly(),
            notifications: default_five_minutes(),
            error_backoff_base_secs: default_error_backoff_base(),
            error_backoff_max_secs: default_error_backoff_max(),
            window_grace_secs: default_window_grace(),
        }
    }
}

impl ScheduleSettings {
    pub fn for_kind(&self, kind: ResourceKind) -> &JobSchedule {
        match kind {
            ResourceKind::EventTemplates => &self.event_templates,
            ResourceKind::Events => &self.events,
            ResourceKind::OnlineActivities => &self.online_activities,
            ResourceKind::ContactMergeRequests => &self.contact_merge_requests,
            ResourceKind::Registrations => &self.registrations,
            ResourceKind::Outcomes => &self.outcomes,
            ResourceKind::Contacts => &self.contacts,
            ResourceKind::EnrolmentExpirations => &self.enrolment_expirations,
            ResourceKind::Notifications => &self.notifications,
        }
    }

    pub fn interval(&self, kind: ResourceKind) -> Duration {
        Duration::from_secs(self.for_kind(kind).interval_secs)
    }

    pub fn window_grace(&self) -> Duration {
        Duration::from_secs(self.window_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSettings {
    #[serde(default = "default_lock_timeout")]
    pub timeout_secs: u64,
    /// A crashed holder's lease expires after this long.
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,
}

fn default_lock_timeout() -> u64 {
    5
}

fn default_lease_ttl() -> u64 {
    1_800
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_lock_timeout(),
            lease_ttl_secs: default_lease_ttl(),
        }
    }
}

impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.lease_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_api_backoff_max")]
    pub backoff_max_secs: u64,
    /// Consecutive 401/403 responses before a credential alert is queued.
    #[serde(default = "default_auth_alert_threshold")]
    pub auth_alert_threshold: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_backoff_base() -> u64 {
    60
}

fn default_api_backoff_max() -> u64 {
    3_600
}

fn default_auth_alert_threshold() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            backoff_base_secs: default_api_backoff_base(),
            backoff_max_secs: default_api_backoff_max(),
            auth_alert_threshold: default_auth_alert_threshold(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrolmentSettings {
    /// Create a local user when a contact matches nobody.
    #[serde(default = "default_true")]
    pub create_users: bool,
    /// Expire enrolments this long after the instance end date; unset disables expiry.
    #[serde(default)]
    pub expire_after_secs: Option<u64>,
}

impl Default for EnrolmentSettings {
    fn default() -> Self {
        Self {
            create_users: true,
            expire_after_secs: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogSettings {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    30
}

impl Default for RequestLogSettings {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonSettings {
    #[serde(default = "default_tick")]
    pub tick_secs: u64,
    #[serde(default)]
    pub addr: Option<String>,
}

fn default_tick() -> u64 {
    60
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            tick_secs: default_tick(),
            addr: None,
        }
    }
}

impl SyncSettings {
    pub fn from_json(config_json: &Value) -> Result<Self> {
        let settings: SyncSettings = serde_json::from_value(config_json.clone())
            .context("config does not match the sync settings shape")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Defaults for everything except the platform.
    pub fn for_platform(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            platform: PlatformSettings {
                name: name.into(),
                host: host.into(),
            },
            fetch: FetchSettings::default(),
            schedule: ScheduleSettings::default(),
            locks: LockSettings::default(),
            api: ApiSettings::default(),
            enrolment: EnrolmentSettings::default(),
            request_log: RequestLogSettings::default(),
            daemon: DaemonSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let host = self.platform.host.trim();
        if !(host.starts_with("https://") || host.starts_with("http://")) {
            bail!("CONFIG_INVALID /platform/host must include http:// or https://");
        }
        if self.platform.name.trim().is_empty() {
            bail!("CONFIG_INVALID /platform/name must not be empty");
        }
        if !(1..=1000).contains(&self.fetch.page_size) {
            bail!(
                "CONFIG_INVALID /fetch/page_size must be within 1..=1000 (got {})",
                self.fetch.page_size
            );
        }
        for kind in ResourceKind::ALL {
            if self.schedule.for_kind(kind).interval_secs == 0 {
                bail!("CONFIG_INVALID /schedule/{}/interval_secs must be > 0", kind);
            }
        }
        if self.schedule.error_backoff_base_secs > self.schedule.error_backoff_max_secs {
            bail!("CONFIG_INVALID /schedule/error_backoff_base_secs exceeds error_backoff_max_secs");
        }
        if self.api.backoff_base_secs > self.api.backoff_max_secs {
            bail!("CONFIG_INVALID /api/backoff_base_secs exceeds backoff_max_secs");
        }
        if self.api.auth_alert_threshold == 0 {
            bail!("CONFIG_INVALID /api/auth_alert_threshold must be > 0");
        }
        if self.locks.timeout_secs == 0 || self.locks.lease_ttl_secs == 0 {
            bail!("CONFIG_INVALID /locks timeout and lease ttl must be > 0");
        }
        Ok(())
    }
}

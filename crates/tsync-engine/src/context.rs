use chrono::Duration;
use std::sync::Arc;
use tsync_client::{ApiPolicy, Upstream};
use tsync_config::{PlatformSettings, SyncSettings};
use tsync_schemas::ResourceKind;

use crate::policy::SchedulePolicy;

/// Seconds from configuration as a chrono duration, clamped to a century.
pub(crate) fn secs(s: u64) -> Duration {
    const CENTURY: u64 = 100 * 365 * 86_400;
    Duration::seconds(s.min(CENTURY) as i64)
}

/// Explicitly injected configuration and upstream handle.
///
/// Nothing in the engine reads ambient state; every component is handed
/// this context. Changing the platform goes through [`replace_platform`],
/// whose side effect (clearing the API status) the engine applies.
///
/// [`replace_platform`]: SyncContext::replace_platform
#[derive(Clone)]
pub struct SyncContext {
    settings: SyncSettings,
    upstream: Arc<dyn Upstream>,
}

impl SyncContext {
    pub fn new(settings: SyncSettings, upstream: Arc<dyn Upstream>) -> Self {
        Self { settings, upstream }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn platform(&self) -> &str {
        &self.settings.platform.name
    }

    pub fn upstream(&self) -> &dyn Upstream {
        self.upstream.as_ref()
    }

    /// Swap host/credentials. Returns the previous platform name; the caller
    /// must reset the API status of the new one.
    pub fn replace_platform(
        &mut self,
        platform: PlatformSettings,
        upstream: Arc<dyn Upstream>,
    ) -> String {
        let previous = std::mem::replace(&mut self.settings.platform, platform);
        self.upstream = upstream;
        previous.name
    }

    pub fn api_policy(&self) -> ApiPolicy {
        let api = &self.settings.api;
        ApiPolicy {
            backoff_base: secs(api.backoff_base_secs),
            backoff_max: secs(api.backoff_max_secs),
            auth_alert_threshold: api.auth_alert_threshold,
        }
    }

    pub fn schedule_policy(&self) -> SchedulePolicy {
        let s = &self.settings.schedule;
        SchedulePolicy {
            error_backoff_base: secs(s.error_backoff_base_secs),
            error_backoff_max: secs(s.error_backoff_max_secs),
            window_grace: secs(s.window_grace_secs),
        }
    }

    pub fn interval(&self, kind: ResourceKind) -> Duration {
        secs(self.settings.schedule.for_kind(kind).interval_secs)
    }

    pub fn job_enabled(&self, kind: ResourceKind) -> bool {
        self.settings.schedule.for_kind(kind).enabled
    }

    pub fn page_size(&self) -> u32 {
        self.settings.fetch.page_size
    }

    pub fn lock_name(&self, kind: ResourceKind, scope: tsync_schemas::Scope) -> String {
        match scope {
            tsync_schemas::Scope::Global => format!("tsync:{}:{kind}", self.platform()),
            tsync_schemas::Scope::Instance(id) => {
                format!("tsync:{}:{kind}:{id}", self.platform())
            }
        }
    }
}

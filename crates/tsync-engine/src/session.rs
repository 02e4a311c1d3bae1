//! Upstream calls with their bookkeeping.
//!
//! Every exchange, good or bad, is appended to the request log and folded
//! into the persisted API status. Crossing the credential-failure threshold
//! queues one operator notification.

use tracing::{debug, warn};
use tsync_client::{status, ApiError, CollectionQuery, Exchange, ResourceFetch, ResourcePage};
use tsync_schemas::{Notification, NotificationKind, RequestLogEntry};

use crate::error::JobError;
use crate::SyncEngine;

pub(crate) struct ApiSession<'a> {
    engine: &'a SyncEngine,
}

impl<'a> ApiSession<'a> {
    pub(crate) fn new(engine: &'a SyncEngine) -> Self {
        Self { engine }
    }

    pub(crate) async fn fetch_page(&self, query: &CollectionQuery) -> Result<ResourcePage, JobError> {
        match self.engine.context().upstream().fetch_page(query).await {
            Ok(page) => {
                self.record_ok(&page.exchange).await?;
                Ok(page)
            }
            Err(e) => Err(self.record_err(e).await?),
        }
    }

    pub(crate) async fn fetch_resource(&self, path: &str, item: &str) -> Result<ResourceFetch, JobError> {
        match self.engine.context().upstream().fetch_resource(path, item).await {
            Ok(fetch) => {
                self.record_ok(&fetch.exchange).await?;
                Ok(fetch)
            }
            Err(e) => Err(self.record_err(e).await?),
        }
    }

    pub(crate) async fn patch_registration(
        &self,
        registration_id: i64,
        diff_xml: &str,
    ) -> Result<Exchange, JobError> {
        match self
            .engine
            .context()
            .upstream()
            .patch_registration(registration_id, diff_xml)
            .await
        {
            Ok(exchange) => {
                self.record_ok(&exchange).await?;
                Ok(exchange)
            }
            Err(e) => Err(self.record_err(e).await?),
        }
    }

    async fn record_ok(&self, exchange: &Exchange) -> Result<(), JobError> {
        debug!(method = exchange.method, uri = %exchange.uri, status = exchange.status, "upstream ok");
        self.record(
            exchange.method,
            &exchange.uri,
            Some(exchange.status),
            Some(exchange.status),
            None,
        )
        .await
    }

    /// Records the failure and hands it back for the caller to return.
    async fn record_err(&self, err: ApiError) -> Result<JobError, JobError> {
        warn!(method = err.method, uri = %err.uri, status = ?err.status, error = %err, "upstream failure");
        // a 2xx with an unusable body counts against health like a server error
        let health = err.status.filter(|s| !(200..300).contains(s));
        self.record(err.method, &err.uri, err.status, health, Some(err.to_string()))
            .await?;
        Ok(JobError::Upstream(err))
    }

    async fn record(
        &self,
        method: &str,
        uri: &str,
        logged_status: Option<u16>,
        health_status: Option<u16>,
        error: Option<String>,
    ) -> Result<(), JobError> {
        let store = self.engine.store();
        let ctx = self.engine.context();
        let platform = ctx.platform();
        let now = self.engine.now();

        store
            .append_request_log(&RequestLogEntry {
                at: now,
                platform: platform.to_string(),
                method: method.to_string(),
                uri: uri.to_string(),
                status: logged_status,
                error: error.clone(),
            })
            .await?;

        let mut api = store.load_api_status(platform).await?;
        let obs = status::observe(&mut api, health_status, error.as_deref(), now, &ctx.api_policy());
        store.save_api_status(platform, &api).await?;

        if obs.alert_credentials {
            warn!(platform, failures = api.error_count, "upstream credentials rejected repeatedly");
            store
                .enqueue_notification(&Notification {
                    id: None,
                    kind: NotificationKind::CredentialFailure,
                    subject: platform.to_string(),
                    message: format!(
                        "upstream rejected the API credentials {} times in a row; last error: {}",
                        api.error_count,
                        api.last_error.as_deref().unwrap_or("-")
                    ),
                    created_at: now,
                })
                .await?;
        }
        Ok(())
    }
}

//! reqwest-backed [`Upstream`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode, Url};
use std::time::Duration;
use tracing::debug;

use crate::decode::{parse_collection, unwrap_resource};
use crate::query::resource_url;
use crate::xml;
use crate::{ApiError, ApiErrorKind, CollectionQuery, Exchange, ResourceFetch, ResourcePage, Upstream};

const XML_CONTENT_TYPE: &str = "application/xml";

pub struct ApiClient {
    http: Client,
    base: Url,
    username: String,
    password: String,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base", &self.base.as_str())
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(
        host: &str,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(host)
            .map_err(|e| ApiError::transport("INIT", host, format!("invalid host: {e}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::transport("INIT", host, e.to_string()))?;
        Ok(Self {
            http,
            base,
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get_xml(&self, url: Url) -> Result<(Exchange, xml::Element), ApiError> {
        let uri = url.to_string();
        debug!(%uri, "GET");
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, XML_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| ApiError::transport("GET", &uri, e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(ApiError::status("GET", &uri, status.as_u16()));
        }
        check_content_type("GET", &uri, &resp)?;

        let body = resp
            .text()
            .await
            .map_err(|e| ApiError::transport("GET", &uri, e.to_string()))?;
        let root = xml::parse(&body).map_err(|e| ApiError {
            method: "GET",
            uri: uri.clone(),
            status: Some(status.as_u16()),
            kind: ApiErrorKind::Decode(e.to_string()),
        })?;

        Ok((
            Exchange {
                method: "GET",
                uri,
                status: status.as_u16(),
            },
            root,
        ))
    }
}

fn check_content_type(method: &'static str, uri: &str, resp: &Response) -> Result<(), ApiError> {
    let ct = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let mime = ct.split(';').next().unwrap_or("").trim();
    if mime.eq_ignore_ascii_case(XML_CONTENT_TYPE) {
        Ok(())
    } else {
        Err(ApiError {
            method,
            uri: uri.to_string(),
            status: Some(resp.status().as_u16()),
            kind: ApiErrorKind::ContentType(ct),
        })
    }
}

#[async_trait]
impl Upstream for ApiClient {
    async fn fetch_page(&self, query: &CollectionQuery) -> Result<ResourcePage, ApiError> {
        let url = query
            .to_url(&self.base)
            .map_err(|e| ApiError::transport("GET", &query.path, e))?;
        let (exchange, root) = self.get_xml(url).await?;
        let page = parse_collection(root, query.item);
        Ok(ResourcePage {
            exchange,
            has_more: page.next.is_some(),
            items: page.items,
        })
    }

    async fn fetch_resource(&self, path: &str, item: &str) -> Result<ResourceFetch, ApiError> {
        let url = resource_url(&self.base, path).map_err(|e| ApiError::transport("GET", path, e))?;
        let (exchange, root) = self.get_xml(url).await?;
        let element = unwrap_resource(root, item).ok_or_else(|| ApiError {
            method: "GET",
            uri: exchange.uri.clone(),
            status: Some(exchange.status),
            kind: ApiErrorKind::Decode(format!("response carries no <{item}>")),
        })?;
        Ok(ResourceFetch { exchange, element })
    }

    async fn patch_registration(
        &self,
        registration_id: i64,
        diff_xml: &str,
    ) -> Result<Exchange, ApiError> {
        let path = format!("registrations/{registration_id}/");
        let url = resource_url(&self.base, &path)
            .map_err(|e| ApiError::transport("PATCH", &path, e))?;
        let uri = url.to_string();
        debug!(%uri, "PATCH");
        let resp = self
            .http
            .patch(url)
            .basic_auth(&self.username, Some(&self.password))
            .header(ACCEPT, XML_CONTENT_TYPE)
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .body(diff_xml.to_string())
            .send()
            .await
            .map_err(|e| ApiError::transport("PATCH", &uri, e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(ApiError::status("PATCH", &uri, status.as_u16()));
        }
        // an empty acknowledgement carries no content-type
        if resp.content_length() != Some(0) {
            check_content_type("PATCH", &uri, &resp)?;
        }
        Ok(Exchange {
            method: "PATCH",
            uri,
            status: status.as_u16(),
        })
    }
}

use std::fmt;

/// Why an upstream exchange failed. Every variant is a request-level failure:
/// it is written to the request log and stops the current page loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// Connection, TLS or timeout failure; no status was received.
    Transport(String),
    /// A status other than the expected success code.
    Status,
    /// The body was not `application/xml`.
    ContentType(String),
    /// The body was XML but not the shape we expect.
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub method: &'static str,
    pub uri: String,
    pub status: Option<u16>,
    pub kind: ApiErrorKind,
}

impl ApiError {
    pub fn transport(method: &'static str, uri: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            status: None,
            kind: ApiErrorKind::Transport(msg.into()),
        }
    }

    pub fn status(method: &'static str, uri: impl Into<String>, status: u16) -> Self {
        Self {
            method,
            uri: uri.into(),
            status: Some(status),
            kind: ApiErrorKind::Status,
        }
    }

    /// 401 or 403: the credentials are bad, not the request.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ApiErrorKind::Transport(msg) => {
                write!(f, "{} {} transport error: {msg}", self.method, self.uri)
            }
            ApiErrorKind::Status => write!(
                f,
                "{} {} unexpected status {}",
                self.method,
                self.uri,
                self.status.unwrap_or_default()
            ),
            ApiErrorKind::ContentType(ct) => write!(
                f,
                "{} {} unexpected content-type '{ct}'",
                self.method, self.uri
            ),
            ApiErrorKind::Decode(msg) => {
                write!(f, "{} {} decode error: {msg}", self.method, self.uri)
            }
        }
    }
}

impl std::error::Error for ApiError {}

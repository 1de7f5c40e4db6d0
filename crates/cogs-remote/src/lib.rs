//! HTTP transport for remote configuration sources.
//!
//! A remote source is fetched with one request per distinct
//! `{url, header, method, body}` combination. Any non-2xx response is an
//! error carrying the response body, so the caller can surface what the
//! server said.

pub mod http;

pub use http::HttpClient;

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    #[error("\"{url}\": {method} returned status code of {code}: {body}")]
    Status {
        url: String,
        method: String,
        code: u16,
        body: String,
    },
}

/// One request against a remote source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    /// Header values in send order; a key may carry several values.
    pub header: BTreeMap<String, Vec<String>>,
    /// Already defaulted by the link decoder; sent as is.
    pub method: String,
    /// Request body, not sent when empty.
    pub body: String,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_owned(),
            ..Self::default()
        }
    }
}

/// Transport capability used by the resolver for remote sources.
pub trait Transport {
    fn fetch(&self, request: &HttpRequest) -> Result<Vec<u8>, RemoteError>;
}

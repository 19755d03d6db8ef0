//! Transport layer: one network call in, JSON or a classified failure out.
//!
//! No caching and no retries live here; those belong to the coordinators.

mod http;

use async_trait::async_trait;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::error;

pub use http::{HttpTransport, TransportError};

/// Classified failure of a single transport call.
///
/// `Clone` so one failure can be stored on a cache entry and fanned out to
/// every caller that joined the request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// No response was received (connection failure, timeout).
    #[error("network error: {message}")]
    Network { message: String },
    /// The server answered with a non-2xx status.
    #[error("server responded with status {status}")]
    Server { status: u16, body: Option<String> },
    /// The response did not match the expected shape.
    #[error("failed to decode response: {message}")]
    Decode { message: String },
    /// The request could not be built. Nothing was sent.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl FetchError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn server(status: u16, body: Option<String>) -> Self {
        Self::Server { status, body }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Short label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network",
            FetchError::Server { .. } => "server",
            FetchError::Decode { .. } => "decode",
            FetchError::InvalidRequest { .. } => "invalid_request",
        }
    }
}

/// A request as seen by the transport: method, relative path, query, body.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    pub fn with_json(mut self, body: &impl Serialize) -> Result<Self, FetchError> {
        let value = serde_json::to_value(body).map_err(|err| {
            error!(path = %self.path, error = %err, "Request body cannot be serialized");
            FetchError::invalid_request(format!("request body: {err}"))
        })?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Performs a single network call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, FetchError>;
}

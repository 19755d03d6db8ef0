use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ApiSettings;

use super::{ApiRequest, FetchError, Transport};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid base URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}

/// `reqwest`-backed transport against the site backend.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration, user_agent: &str) -> Result<Self, TransportError> {
        let base = directory_url(Url::parse(base_url)?);
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self {
            client,
            base,
            timeout,
        })
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self, TransportError> {
        Self::new(
            settings.base_url.as_str(),
            settings.timeout,
            &settings.user_agent,
        )
    }

    pub fn default_user_agent() -> &'static str {
        concat!("lexquery/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve a request path against the base URL.
    ///
    /// Paths are relative to the base, so a leading slash does not escape an
    /// `/api/` prefix.
    pub fn url(&self, request: &ApiRequest) -> Result<Url, FetchError> {
        let mut url = self
            .base
            .join(request.path.trim_start_matches('/'))
            .map_err(|err| FetchError::network(format!("invalid request path: {err}")))?;
        if !request.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn handle(resp: Response) -> Result<Value, FetchError> {
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|err| FetchError::network(format!("failed to read body: {err}")))?;
        if !status.is_success() {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let body = (!text.is_empty()).then_some(text);
            return Err(FetchError::server(status.as_u16(), body));
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|err| FetchError::decode(format!("response is not JSON: {err}")))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, FetchError> {
        let url = self.url(&request)?;
        debug!(method = %request.method, url = %url, "Sending request");

        let mut req = self
            .client
            .request(request.method, url)
            .timeout(self.timeout);
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(classify)?;
        Self::handle(resp).await
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::network(format!("request timed out: {err}"))
    } else {
        FetchError::network(err.to_string())
    }
}

fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

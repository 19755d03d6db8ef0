#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use lexquery::ApiClient;
use lexquery::cache::CacheConfig;
use lexquery::transport::{ApiRequest, FetchError, Transport};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};

type Handler = dyn Fn(&ApiRequest) -> Result<Value, FetchError> + Send + Sync;

/// Answers every request synchronously from a closure and records it.
pub struct StubTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl StubTransport {
    pub fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&ApiRequest) -> Result<Value, FetchError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("calls lock").len()
    }

    /// Calls matching a method and path.
    pub fn count(&self, method: &str, path: &str) -> usize {
        self.calls
            .lock()
            .expect("calls lock")
            .iter()
            .filter(|request| request.method.as_str() == method && request.path == path)
            .count()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, FetchError> {
        let result = (self.handler)(&request);
        self.calls.lock().expect("calls lock").push(request);
        result
    }
}

/// A request held open until the test answers it.
pub struct PendingCall {
    pub request: ApiRequest,
    reply: oneshot::Sender<Result<Value, FetchError>>,
}

impl PendingCall {
    pub fn respond(self, result: Result<Value, FetchError>) {
        let _ = self.reply.send(result);
    }
}

/// Hands every request to the test, which decides when and how it completes.
pub struct GatedTransport {
    calls: mpsc::UnboundedSender<PendingCall>,
}

impl GatedTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<PendingCall>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { calls: tx }), rx)
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(&self, request: ApiRequest) -> Result<Value, FetchError> {
        let (reply, response) = oneshot::channel();
        self.calls
            .send(PendingCall { request, reply })
            .map_err(|_| FetchError::network("test harness closed"))?;
        response
            .await
            .unwrap_or_else(|_| Err(FetchError::network("request abandoned")))
    }
}

pub fn client_with(transport: Arc<dyn Transport>) -> ApiClient {
    ApiClient::new(transport, CacheConfig::default())
}

pub fn client_with_config(transport: Arc<dyn Transport>, config: CacheConfig) -> ApiClient {
    ApiClient::new(transport, config)
}

/// Let spawned fetch tasks run to completion.
pub async fn drain_tasks() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub async fn next_call(calls: &mut mpsc::UnboundedReceiver<PendingCall>) -> PendingCall {
    tokio::time::timeout(Duration::from_secs(5), calls.recv())
        .await
        .expect("request should reach the transport")
        .expect("transport channel open")
}

pub fn event_json(id: i64, title: &str) -> Value {
    json!({ "event_id": id, "event_title": title })
}

pub fn ticket_json(id: i64, status: &str) -> Value {
    json!({
        "ticket_id": id,
        "name": "Ada",
        "email": "ada@example.com",
        "subject": format!("Ticket {id}"),
        "description": "Help needed",
        "status": status,
    })
}

pub fn article_json(url: &str) -> Value {
    json!({
        "source": { "id": null, "name": "Law Daily" },
        "title": format!("Article at {url}"),
        "url": url,
        "publishedAt": "2024-03-01T09:00:00Z",
    })
}

/// A news page whose articles are `https://news.example/{n}` for each `n`.
pub fn news_page<I: IntoIterator<Item = u32>>(numbers: I, total: u64) -> Value {
    let articles: Vec<Value> = numbers
        .into_iter()
        .map(|n| article_json(&format!("https://news.example/{n}")))
        .collect();
    json!({ "status": "ok", "totalResults": total, "articles": articles })
}

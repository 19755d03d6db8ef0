//! End-to-end flows the site's pages drive.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lexquery::api::{
    CreateEvent, DeleteEvent, EventUpdate, FetchEvents, FetchNews, NewsQuery, SendMessage,
    UpdateEvent,
};
use lexquery::cache::Fingerprint;
use lexquery::transport::{ApiRequest, FetchError};
use lexquery::types::{ChatReply, ChatRequest, NewEvent};
use serde_json::{Value, json};

use support::{StubTransport, client_with, event_json, news_page};

#[tokio::test]
async fn chat_exchange_leaves_no_cache_entry() {
    let transport = StubTransport::new(|request: &ApiRequest| {
        assert_eq!(request.path, "chat");
        assert_eq!(request.body, Some(json!({ "prompt": "Hello" })));
        Ok(json!({ "response": "Hi there" }))
    });
    let client = client_with(transport.clone());

    let reply = client
        .mutate(
            &SendMessage,
            ChatRequest {
                prompt: "Hello".into(),
            },
        )
        .await
        .expect("chat succeeds");

    assert_eq!(
        reply,
        ChatReply {
            response: "Hi there".into()
        }
    );
    assert!(client.store().is_empty());
    assert!(
        client
            .get(&Fingerprint::from_value("sendMessage", &json!({ "prompt": "Hello" })))
            .is_none()
    );
    assert_eq!(transport.call_count(), 1);
}

/// In-memory events backend supporting the calendar page's CRUD calls.
fn calendar_backend() -> Arc<StubTransport> {
    let events: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let next_id = Arc::new(AtomicUsize::new(1));
    StubTransport::new(move |request: &ApiRequest| {
        let mut events = events.lock().expect("events lock");
        let path: Vec<&str> = request.path.split('/').collect();
        match (request.method.as_str(), path.as_slice()) {
            ("GET", ["events"]) => Ok(Value::Array(events.clone())),
            ("POST", ["events"]) => {
                let id = next_id.fetch_add(1, Ordering::SeqCst) as i64;
                let mut event = request.body.clone().unwrap_or_else(|| json!({}));
                event["event_id"] = json!(id);
                events.push(event.clone());
                Ok(event)
            }
            ("PUT", ["events", id]) => {
                let id: i64 = id.parse().map_err(|_| FetchError::server(400, None))?;
                let mut event = request.body.clone().unwrap_or_else(|| json!({}));
                event["event_id"] = json!(id);
                let slot = events
                    .iter_mut()
                    .find(|existing| existing["event_id"] == json!(id))
                    .ok_or_else(|| FetchError::server(404, None))?;
                *slot = event.clone();
                Ok(event)
            }
            ("DELETE", ["events", id]) => {
                let id: i64 = id.parse().map_err(|_| FetchError::server(400, None))?;
                events.retain(|existing| existing["event_id"] != json!(id));
                Ok(Value::Null)
            }
            _ => Err(FetchError::server(404, None)),
        }
    })
}

#[tokio::test]
async fn event_crud_notifies_watching_calendar() {
    let transport = calendar_backend();
    let client = client_with(transport.clone());

    let lengths = Arc::new(Mutex::new(Vec::new()));
    let watch = client
        .watch(FetchEvents, (), {
            let lengths = Arc::clone(&lengths);
            move |state| {
                lengths
                    .lock()
                    .expect("lengths lock")
                    .push(state.data.as_ref().map(|events| events.len()));
            }
        })
        .await
        .expect("fingerprint");

    let created = client
        .mutate(&CreateEvent, NewEvent::titled("Meeting"))
        .await
        .expect("create succeeds");
    assert_eq!(created.event_id, 1);
    assert_eq!(created.event_title, "Meeting");

    assert_eq!(*lengths.lock().expect("lengths lock"), vec![Some(0), Some(1)]);
    assert_eq!(transport.count("GET", "events"), 2);

    client
        .mutate(
            &UpdateEvent,
            EventUpdate {
                id: 1,
                event: NewEvent::titled("Consultation"),
            },
        )
        .await
        .expect("update succeeds");
    let titles: Vec<String> = watch
        .state()
        .data
        .expect("data")
        .iter()
        .map(|event| event.event_title.clone())
        .collect();
    assert_eq!(titles, ["Consultation"]);

    client.mutate(&DeleteEvent, 1).await.expect("delete succeeds");
    assert!(watch.state().data.expect("data").is_empty());
    assert_eq!(
        *lengths.lock().expect("lengths lock"),
        vec![Some(0), Some(1), Some(1), Some(0)]
    );
}

fn news_backend(second_page: std::ops::Range<u32>) -> Arc<StubTransport> {
    StubTransport::new(move |request: &ApiRequest| {
        let page = request
            .query
            .iter()
            .find(|(key, _)| key == "page")
            .map(|(_, value)| value.clone());
        match page.as_deref() {
            Some("1") => Ok(news_page(0..10, 40)),
            Some("2") => Ok(news_page(second_page.clone(), 40)),
            _ => Ok(news_page(Vec::new(), 40)),
        }
    })
}

#[tokio::test]
async fn paginated_news_accumulates_unique_articles() {
    let client = client_with(news_backend(10..20));

    let first = NewsQuery::new("law");
    let page_one = client.query(&FetchNews, first.clone()).await.expect("fingerprint");
    assert_eq!(page_one.data.expect("data").len(), 10);

    let page_two = client
        .query(&FetchNews, first.next_page())
        .await
        .expect("fingerprint");
    let feed = page_two.data.expect("data");
    assert_eq!(feed.len(), 20);
    assert_eq!(feed.total_count, 40);
    assert!(feed.has_more());
}

#[tokio::test]
async fn overlapping_page_does_not_duplicate_articles() {
    let client = client_with(news_backend(5..15));

    let first = NewsQuery::new("law");
    client.query(&FetchNews, first.clone()).await.expect("fingerprint");
    let feed = client
        .query(&FetchNews, first.next_page())
        .await
        .expect("fingerprint")
        .data
        .expect("data");

    let urls: Vec<&str> = feed.items.iter().map(|article| article.url.as_str()).collect();
    assert_eq!(urls.len(), 15);
    assert_eq!(urls[0], "https://news.example/0");
    assert_eq!(urls[14], "https://news.example/14");
}

#[tokio::test]
async fn separate_clients_share_nothing() {
    let transport = StubTransport::new(|_| Ok(json!([event_json(1, "Meeting")])));
    let first = client_with(transport.clone());
    let second = client_with(transport.clone());

    first.query(&FetchEvents, ()).await.expect("fingerprint");
    assert!(second.store().is_empty());

    second.query(&FetchEvents, ()).await.expect("fingerprint");
    assert_eq!(transport.call_count(), 2);
}

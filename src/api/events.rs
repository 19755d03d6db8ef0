//! Calendar events.

use lexquery_api_types::{Event, NewEvent};
use serde::Serialize;
use serde_json::Value;

use crate::cache::Tag;
use crate::transport::{ApiRequest, FetchError};

use super::{MutationEndpoint, QueryEndpoint, decode_json};

const EVENT: &str = "Event";

/// `fetchEvents()`: every event, tagged per event and as a whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchEvents;

impl QueryEndpoint for FetchEvents {
    type Args = ();
    type Output = Vec<Event>;

    const NAME: &'static str = "fetchEvents";

    fn request(&self, _args: &()) -> Result<ApiRequest, FetchError> {
        Ok(ApiRequest::get("events"))
    }

    fn decode(&self, payload: Value) -> Result<Vec<Event>, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn provides(&self, _args: &(), events: &Vec<Event>) -> Vec<Tag> {
        let mut tags = vec![Tag::kind(EVENT)];
        tags.extend(events.iter().map(|event| Tag::id(EVENT, event.event_id)));
        tags
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateEvent;

impl MutationEndpoint for CreateEvent {
    type Args = NewEvent;
    type Output = Event;

    const NAME: &'static str = "createEvent";

    fn request(&self, event: &NewEvent) -> Result<ApiRequest, FetchError> {
        ApiRequest::post("events").with_json(event)
    }

    fn decode(&self, payload: Value) -> Result<Event, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn invalidates(&self, _event: &NewEvent) -> Vec<Tag> {
        vec![Tag::kind(EVENT)]
    }
}

/// Replacement fields for an existing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventUpdate {
    pub id: i64,
    pub event: NewEvent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateEvent;

impl MutationEndpoint for UpdateEvent {
    type Args = EventUpdate;
    type Output = Event;

    const NAME: &'static str = "updateEvent";

    fn request(&self, update: &EventUpdate) -> Result<ApiRequest, FetchError> {
        ApiRequest::put(format!("events/{}", update.id)).with_json(&update.event)
    }

    fn decode(&self, payload: Value) -> Result<Event, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn invalidates(&self, _update: &EventUpdate) -> Vec<Tag> {
        vec![Tag::kind(EVENT)]
    }
}

/// `deleteEvent(id)`. The response body is not inspected.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteEvent;

impl MutationEndpoint for DeleteEvent {
    type Args = i64;
    type Output = ();

    const NAME: &'static str = "deleteEvent";

    fn request(&self, id: &i64) -> Result<ApiRequest, FetchError> {
        Ok(ApiRequest::delete(format!("events/{id}")))
    }

    fn decode(&self, _payload: Value) -> Result<(), FetchError> {
        Ok(())
    }

    fn invalidates(&self, _id: &i64) -> Vec<Tag> {
        vec![Tag::kind(EVENT)]
    }
}

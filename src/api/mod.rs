//! API slices: one descriptor per backend operation.
//!
//! Queries declare the tags their data provides; mutations declare the tags
//! they invalidate. The tag index is the only place the two sides meet.

mod chat;
mod events;
mod news;
mod tickets;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cache::{Fingerprint, FingerprintError, MergePolicy, Replace, Tag, args_value};
use crate::transport::{ApiRequest, FetchError};

pub use chat::SendMessage;
pub use events::{CreateEvent, DeleteEvent, EventUpdate, FetchEvents, UpdateEvent};
pub use news::{FetchNews, NewsQuery};
pub use tickets::{CreateTicket, FetchTicket, FetchTickets, TicketStatusChange, UpdateTicketStatus};

/// A cacheable read.
pub trait QueryEndpoint: Clone + Send + Sync + 'static {
    type Args: Serialize + Clone + Send + Sync + 'static;
    type Output: PartialEq + Send + Sync + 'static;

    /// Endpoint name used in fingerprints and logs.
    const NAME: &'static str;

    fn request(&self, args: &Self::Args) -> Result<ApiRequest, FetchError>;

    fn decode(&self, payload: Value) -> Result<Self::Output, FetchError>;

    /// Tags the fetched data provides.
    fn provides(&self, args: &Self::Args, output: &Self::Output) -> Vec<Tag>;

    /// Arguments that identify the cache entry. Endpoints that accumulate
    /// pages leave the page number out.
    fn cache_args(&self, args: &Self::Args) -> Result<Value, FingerprintError> {
        args_value(Self::NAME, args)
    }

    /// Combine a fresh result with the cached one.
    fn merge(&self, previous: Option<&Self::Output>, next: Self::Output) -> Self::Output {
        Replace.merge(previous, next)
    }

    fn fingerprint(&self, args: &Self::Args) -> Result<Fingerprint, FingerprintError> {
        Ok(Fingerprint::from_value(Self::NAME, &self.cache_args(args)?))
    }
}

/// A write.
pub trait MutationEndpoint: Send + Sync {
    type Args: Send + Sync;
    type Output: Send;

    const NAME: &'static str;

    fn request(&self, args: &Self::Args) -> Result<ApiRequest, FetchError>;

    fn decode(&self, payload: Value) -> Result<Self::Output, FetchError>;

    /// Tags whose cached data this write makes outdated.
    fn invalidates(&self, _args: &Self::Args) -> Vec<Tag> {
        Vec::new()
    }
}

/// Decode a payload into a fixed schema, failing closed on mismatch.
pub fn decode_json<T: DeserializeOwned>(endpoint: &str, payload: Value) -> Result<T, FetchError> {
    serde_json::from_value(payload)
        .map_err(|err| FetchError::decode(format!("{endpoint}: {err}")))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Reply {
        response: String,
    }

    #[test]
    fn decode_json_accepts_matching_payload() {
        let reply: Reply = decode_json("sendMessage", json!({ "response": "Hi" })).expect("decode");
        assert_eq!(reply.response, "Hi");
    }

    #[test]
    fn decode_json_fails_closed() {
        let err = decode_json::<Reply>("sendMessage", json!({ "answer": "Hi" }))
            .expect_err("missing field");
        assert_eq!(err.kind(), "decode");
        assert!(err.to_string().contains("sendMessage"));
    }
}

//! AI chat. Replies are never cached; every message is its own request.

use lexquery_api_types::{ChatReply, ChatRequest};
use serde_json::Value;

use crate::transport::{ApiRequest, FetchError};

use super::{MutationEndpoint, decode_json};

/// `sendMessage(prompt)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SendMessage;

impl MutationEndpoint for SendMessage {
    type Args = ChatRequest;
    type Output = ChatReply;

    const NAME: &'static str = "sendMessage";

    fn request(&self, message: &ChatRequest) -> Result<ApiRequest, FetchError> {
        ApiRequest::post("chat").with_json(message)
    }

    fn decode(&self, payload: Value) -> Result<ChatReply, FetchError> {
        decode_json(Self::NAME, payload)
    }
}

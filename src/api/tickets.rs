//! Support tickets.
//!
//! The list provides `Ticket` plus one `Ticket:{id}` per row, and a single
//! ticket provides only its own instance tag. A status change therefore
//! reaches the list and that ticket, but not other open ticket views.

use lexquery_api_types::{NewTicket, Ticket, TicketStatus, TicketStatusUpdate};
use serde::Serialize;
use serde_json::Value;

use crate::cache::Tag;
use crate::transport::{ApiRequest, FetchError};

use super::{MutationEndpoint, QueryEndpoint, decode_json};

const TICKET: &str = "Ticket";

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTickets;

impl QueryEndpoint for FetchTickets {
    type Args = ();
    type Output = Vec<Ticket>;

    const NAME: &'static str = "fetchTickets";

    fn request(&self, _args: &()) -> Result<ApiRequest, FetchError> {
        Ok(ApiRequest::get("tickets"))
    }

    fn decode(&self, payload: Value) -> Result<Vec<Ticket>, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn provides(&self, _args: &(), tickets: &Vec<Ticket>) -> Vec<Tag> {
        let mut tags = vec![Tag::kind(TICKET)];
        tags.extend(tickets.iter().map(|ticket| Tag::id(TICKET, ticket.ticket_id)));
        tags
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FetchTicket;

impl QueryEndpoint for FetchTicket {
    type Args = i64;
    type Output = Ticket;

    const NAME: &'static str = "fetchTicket";

    fn request(&self, id: &i64) -> Result<ApiRequest, FetchError> {
        Ok(ApiRequest::get(format!("tickets/{id}")))
    }

    fn decode(&self, payload: Value) -> Result<Ticket, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn provides(&self, id: &i64, _ticket: &Ticket) -> Vec<Tag> {
        vec![Tag::id(TICKET, id)]
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateTicket;

impl MutationEndpoint for CreateTicket {
    type Args = NewTicket;
    type Output = Ticket;

    const NAME: &'static str = "createTicket";

    fn request(&self, ticket: &NewTicket) -> Result<ApiRequest, FetchError> {
        ApiRequest::post("tickets").with_json(ticket)
    }

    fn decode(&self, payload: Value) -> Result<Ticket, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn invalidates(&self, _ticket: &NewTicket) -> Vec<Tag> {
        vec![Tag::kind(TICKET)]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TicketStatusChange {
    pub id: i64,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateTicketStatus;

impl MutationEndpoint for UpdateTicketStatus {
    type Args = TicketStatusChange;
    type Output = Ticket;

    const NAME: &'static str = "updateTicketStatus";

    fn request(&self, change: &TicketStatusChange) -> Result<ApiRequest, FetchError> {
        ApiRequest::patch(format!("tickets/{}/status", change.id)).with_json(&TicketStatusUpdate {
            status: change.status,
        })
    }

    fn decode(&self, payload: Value) -> Result<Ticket, FetchError> {
        decode_json(Self::NAME, payload)
    }

    fn invalidates(&self, change: &TicketStatusChange) -> Vec<Tag> {
        vec![Tag::id(TICKET, change.id)]
    }
}

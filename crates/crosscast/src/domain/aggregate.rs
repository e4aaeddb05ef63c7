//! Per-kind response aggregation policy.
//!
//! Quorum kinds (Clients, AllRooms, Custom) accumulate valid responses until
//! `received == expected`; the rest resolve on the first qualifying
//! response. A response missing its expected payload field is inert: it
//! advances no counter, touches no accumulator, and never triggers
//! resolution - an incomplete answer must never falsely satisfy quorum.

use crate::domain::protocol::{QueryKind, ResponseMessage};
use serde_json::Value;
use std::collections::HashSet;

/// Resolution value handed to the caller's completion.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryReply {
    /// Deduplicated client ids, order unspecified.
    Clients(Vec<String>),
    /// Room names: deduplicated union for AllRooms, the first responder's
    /// list verbatim for ClientRooms.
    Rooms(Vec<String>),
    /// Every custom reply payload, in arrival order.
    Replies(Vec<Value>),
    /// Success signal with no value (remote join/leave/disconnect).
    Ack,
}

/// Kind-specific partial result.
enum Accumulator {
    /// Deduplicating union of client ids.
    ClientIds(HashSet<String>),
    /// Deduplicating union of room names.
    RoomUnion(HashSet<String>),
    /// First responder's room list, verbatim.
    RoomList(Vec<String>),
    /// Custom replies in arrival order.
    Replies(Vec<Value>),
    /// Nothing to accumulate.
    Ack,
}

/// Aggregation state for one in-flight request.
pub struct Aggregation {
    kind: QueryKind,
    /// Quorum snapshot from issue time; never refreshed mid-flight.
    expected: usize,
    received: usize,
    acc: Accumulator,
}

impl Aggregation {
    /// Fresh aggregation state for a request of the given kind.
    ///
    /// `expected` is the subscriber count on the request channel at issue
    /// time; it is ignored by first-response kinds.
    #[must_use]
    pub fn new(kind: QueryKind, expected: usize) -> Self {
        let acc = match kind {
            QueryKind::Clients => Accumulator::ClientIds(HashSet::new()),
            QueryKind::AllRooms => Accumulator::RoomUnion(HashSet::new()),
            QueryKind::ClientRooms => Accumulator::RoomList(Vec::new()),
            QueryKind::Custom => Accumulator::Replies(Vec::new()),
            QueryKind::RemoteJoin | QueryKind::RemoteLeave | QueryKind::RemoteDisconnect => {
                Accumulator::Ack
            }
        };
        Self {
            kind,
            expected,
            received: 0,
            acc,
        }
    }

    /// The kind this aggregation serves.
    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Valid responses absorbed so far.
    #[must_use]
    pub fn received(&self) -> usize {
        self.received
    }

    /// Absorb one response. Returns `true` when the request should resolve.
    ///
    /// Responses missing the payload field their kind expects are ignored
    /// outright and return `false`.
    pub fn absorb(&mut self, resp: &ResponseMessage) -> bool {
        match self.kind {
            QueryKind::Clients => {
                let Some(clients) = &resp.clients else {
                    return false;
                };
                if let Accumulator::ClientIds(set) = &mut self.acc {
                    set.extend(clients.iter().cloned());
                }
                self.received += 1;
                self.received == self.expected
            }
            QueryKind::AllRooms => {
                let Some(rooms) = &resp.rooms else {
                    return false;
                };
                if let Accumulator::RoomUnion(set) = &mut self.acc {
                    set.extend(rooms.iter().cloned());
                }
                self.received += 1;
                self.received == self.expected
            }
            QueryKind::Custom => {
                let Some(payload) = &resp.data else {
                    return false;
                };
                if let Accumulator::Replies(replies) = &mut self.acc {
                    replies.push(payload.clone().unwrap_or(Value::Null));
                }
                self.received += 1;
                self.received == self.expected
            }
            QueryKind::ClientRooms => {
                let Some(rooms) = &resp.rooms else {
                    return false;
                };
                self.acc = Accumulator::RoomList(rooms.clone());
                self.received += 1;
                true
            }
            QueryKind::RemoteJoin | QueryKind::RemoteLeave | QueryKind::RemoteDisconnect => {
                self.received += 1;
                true
            }
        }
    }

    /// Consume the aggregation and build the caller-facing reply.
    #[must_use]
    pub fn into_reply(self) -> QueryReply {
        match self.acc {
            Accumulator::ClientIds(set) => QueryReply::Clients(set.into_iter().collect()),
            Accumulator::RoomUnion(set) => QueryReply::Rooms(set.into_iter().collect()),
            Accumulator::RoomList(list) => QueryReply::Rooms(list),
            Accumulator::Replies(replies) => QueryReply::Replies(replies),
            Accumulator::Ack => QueryReply::Ack,
        }
    }
}

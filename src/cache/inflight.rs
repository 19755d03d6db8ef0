//! In-flight request tracking.
//!
//! At most one fetch per fingerprint is tracked. Callers asking for the same
//! arguments while it runs wait on its outcome instead of issuing another
//! transport call. A forced or differently-argued fetch supersedes the
//! tracked one and inherits its waiters.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::oneshot;

use super::keys::Fingerprint;
use super::store::{EntrySnapshot, Epoch};

struct Flight {
    seq: Epoch,
    args: Value,
    waiters: Vec<oneshot::Sender<EntrySnapshot>>,
}

/// How a query was admitted.
pub(crate) enum Admission {
    /// Served from the cache without touching the network.
    Cached(EntrySnapshot),
    /// Waiting on a fetch another caller started.
    Joined(oneshot::Receiver<EntrySnapshot>),
    /// This caller must run the fetch tagged `seq`.
    Started {
        seq: Epoch,
        receiver: oneshot::Receiver<EntrySnapshot>,
    },
}

pub(crate) struct InFlightTable {
    flights: DashMap<Fingerprint, Flight>,
    seq_counter: AtomicU64,
}

impl InFlightTable {
    pub fn new() -> Self {
        Self {
            flights: DashMap::new(),
            seq_counter: AtomicU64::new(0),
        }
    }

    /// Decide how a query proceeds.
    ///
    /// `lookup` is consulted only when nothing is in flight and the query is
    /// not forced; returning a snapshot serves it from the cache.
    pub fn admit<F>(&self, fingerprint: &Fingerprint, args: &Value, force: bool, lookup: F) -> Admission
    where
        F: FnOnce() -> Option<EntrySnapshot>,
    {
        let (tx, rx) = oneshot::channel();

        match self.flights.entry(fingerprint.clone()) {
            Entry::Occupied(mut occupied) => {
                let flight = occupied.get_mut();
                flight.waiters.push(tx);
                if !force && flight.args == *args {
                    return Admission::Joined(rx);
                }
                let seq = self.next_seq();
                flight.seq = seq;
                flight.args = args.clone();
                Admission::Started { seq, receiver: rx }
            }
            Entry::Vacant(vacant) => {
                if !force && let Some(hit) = lookup() {
                    return Admission::Cached(hit);
                }
                let seq = self.next_seq();
                vacant.insert(Flight {
                    seq,
                    args: args.clone(),
                    waiters: vec![tx],
                });
                Admission::Started { seq, receiver: rx }
            }
        }
    }

    /// Resolve every waiter if `seq` is still the tracked fetch.
    ///
    /// A superseded fetch leaves the flight in place for its successor.
    pub fn settle(&self, fingerprint: &Fingerprint, seq: Epoch, snapshot: &EntrySnapshot) -> bool {
        let Some((_, flight)) = self
            .flights
            .remove_if(fingerprint, |_, flight| flight.seq == seq)
        else {
            return false;
        };

        for waiter in flight.waiters {
            // A waiter whose caller went away has nothing to receive.
            let _ = waiter.send(snapshot.clone());
        }
        true
    }

    /// Whether `seq` is the fetch currently tracked for the fingerprint.
    pub fn is_tracked(&self, fingerprint: &Fingerprint, seq: Epoch) -> bool {
        self.flights
            .get(fingerprint)
            .is_some_and(|flight| flight.seq == seq)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    fn next_seq(&self) -> Epoch {
        self.seq_counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for InFlightTable {
    fn default() -> Self {
        Self::new()
    }
}

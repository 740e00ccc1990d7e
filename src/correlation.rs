//! Correlation registry: pending round trips keyed by correlation id.
//!
//! Every outbound request registers a [`PendingRequest`] and receives a
//! [`Waiter`]. The demultiplexer completes the entry when the matching
//! response arrives; the round-trip client evicts it on timeout or
//! cancellation; the transport fails all of them when the channel closes.
//!
//! An entry is removed exactly once. Every completion path (`resolve`,
//! `fail`, `evict`, `cancel`, `fail_all`, fallback) takes the entry out of
//! the map before touching its slot, so a second attempt on the same id finds
//! nothing and returns `false`.
//!
//! Insertion order is tracked separately so that untagged responses can be
//! routed to the oldest pending request.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::errors::RelayError;

/// Outcome delivered to a waiter.
pub type Resolution = Result<String, RelayError>;

/// A registered, not yet completed round trip.
#[derive(Debug)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    seq: u64,
    slot: oneshot::Sender<Resolution>,
}

/// Receiving half handed to the caller that registered a request.
#[derive(Debug)]
pub struct Waiter {
    correlation_id: String,
    rx: oneshot::Receiver<Resolution>,
}

impl Waiter {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Wait for the entry to be completed.
    ///
    /// If the registry is dropped with the entry still pending the waiter
    /// observes `ChannelClosed`.
    pub async fn wait(self) -> Resolution {
        match self.rx.await {
            Ok(resolution) => resolution,
            Err(_) => Err(RelayError::ChannelClosed),
        }
    }

    /// Non-blocking check; `None` while the entry is still pending.
    pub fn try_result(&mut self) -> Option<Resolution> {
        match self.rx.try_recv() {
            Ok(resolution) => Some(resolution),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(RelayError::ChannelClosed)),
        }
    }
}

/// Result of routing a response that carried no correlation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOutcome {
    /// The oldest pending request was completed.
    Resolved { correlation_id: String },
    /// Nothing was pending; the value was discarded.
    Unrouted,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, PendingRequest>,
    /// seq -> correlation id, ascending = insertion order
    order: BTreeMap<u64, String>,
    next_seq: u64,
    unrouted: u64,
}

impl RegistryInner {
    fn take(&mut self, id: &str) -> Option<PendingRequest> {
        let entry = self.entries.remove(id)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn take_oldest(&mut self) -> Option<PendingRequest> {
        let (_, id) = self.order.pop_first()?;
        self.entries.remove(&id)
    }
}

/// Thread-safe map from correlation id to pending result slot.
///
/// Owned by the service that owns the channel; share it with `Arc`.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    inner: Mutex<RegistryInner>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Entries stay consistent even if a holder panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new pending request.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateId` if `id` is already pending.
    pub fn register(&self, id: &str, session_id: Option<&str>) -> Result<Waiter, RelayError> {
        let mut inner = self.lock();
        if inner.entries.contains_key(id) {
            return Err(RelayError::DuplicateId { id: id.to_string() });
        }

        let (slot, rx) = oneshot::channel();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.order.insert(seq, id.to_string());
        inner.entries.insert(
            id.to_string(),
            PendingRequest {
                correlation_id: id.to_string(),
                session_id: session_id.map(str::to_string),
                created_at: Utc::now(),
                seq,
                slot,
            },
        );
        tracing::debug!(correlation_id = id, pending = inner.entries.len(), "registered request");

        Ok(Waiter {
            correlation_id: id.to_string(),
            rx,
        })
    }

    fn complete(&self, id: &str, resolution: Resolution) -> bool {
        let entry = self.lock().take(id);
        match entry {
            Some(entry) => {
                // The waiter may already be gone (cancelled caller); the entry is still consumed.
                let _ = entry.slot.send(resolution);
                true
            }
            None => false,
        }
    }

    /// Complete `id` with a value. Returns `false` if nothing was pending under `id`.
    pub fn resolve(&self, id: &str, value: String) -> bool {
        self.complete(id, Ok(value))
    }

    /// Complete `id` with an error. Returns `false` if nothing was pending under `id`.
    pub fn fail(&self, id: &str, error: RelayError) -> bool {
        self.complete(id, Err(error))
    }

    /// Complete the oldest pending request with `resolution`.
    ///
    /// Used for responses that carry no correlation id, on the assumption that
    /// the backend answers in the order requests were sent.
    pub fn resolve_fallback(&self, resolution: Resolution) -> FallbackOutcome {
        let entry = {
            let mut inner = self.lock();
            let entry = inner.take_oldest();
            if entry.is_none() {
                inner.unrouted += 1;
            }
            entry
        };

        match entry {
            Some(entry) => {
                let _ = entry.slot.send(resolution);
                FallbackOutcome::Resolved {
                    correlation_id: entry.correlation_id,
                }
            }
            None => FallbackOutcome::Unrouted,
        }
    }

    /// Remove a timed-out entry and fail its waiter with `Timeout`.
    pub fn evict(&self, id: &str, after: Duration) -> bool {
        let evicted = self.fail(
            id,
            RelayError::Timeout {
                id: id.to_string(),
                after,
            },
        );
        if evicted {
            tracing::warn!(correlation_id = id, ?after, "evicted timed-out request");
        }
        evicted
    }

    /// Remove an entry whose waiter has been abandoned by its owner.
    pub fn cancel(&self, id: &str) -> bool {
        self.fail(id, RelayError::Cancelled { id: id.to_string() })
    }

    /// Fail every pending entry with `error`, leaving the registry empty.
    ///
    /// Returns the number of entries failed.
    pub fn fail_all(&self, error: RelayError) -> usize {
        let drained: Vec<PendingRequest> = {
            let mut inner = self.lock();
            inner.order.clear();
            inner.entries.drain().map(|(_, entry)| entry).collect()
        };

        let count = drained.len();
        for entry in drained {
            let _ = entry.slot.send(Err(error.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().entries.contains_key(id)
    }

    /// Pending correlation ids, oldest first.
    pub fn pending_ids(&self) -> Vec<String> {
        self.lock().order.values().cloned().collect()
    }

    pub fn session_of(&self, id: &str) -> Option<String> {
        self.lock()
            .entries
            .get(id)
            .and_then(|entry| entry.session_id.clone())
    }

    pub fn created_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().entries.get(id).map(|entry| entry.created_at)
    }

    /// Number of untagged responses discarded because nothing was pending.
    pub fn unrouted_count(&self) -> u64 {
        self.lock().unrouted
    }
}

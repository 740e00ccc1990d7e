//! One correlated round trip: register → send → await (bounded) → done.
//!
//! The client is shared by every caller of the service; runs are isolated
//! purely by their correlation ids, so no run-level locking exists here.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use uuid::Uuid;

use crate::channel::{FrameSink, OutboundFrame};
use crate::correlation::CorrelationRegistry;
use crate::errors::RelayError;

/// Removes the registry entry if the round-trip future is dropped early.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    id: &'a str,
    armed: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.registry.cancel(self.id) {
            tracing::debug!(correlation_id = self.id, "round trip cancelled; entry evicted");
        }
    }
}

pub struct RoundTripClient {
    registry: Arc<CorrelationRegistry>,
    sink: Arc<dyn FrameSink>,
    timeout: Duration,
    issued: AtomicU64,
}

impl RoundTripClient {
    pub fn new(registry: Arc<CorrelationRegistry>, sink: Arc<dyn FrameSink>, timeout: Duration) -> Self {
        Self {
            registry,
            sink,
            timeout,
            issued: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Number of round trips issued (registered and sent or attempted) so far.
    pub fn round_trips(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    /// Round trip under a freshly generated correlation id.
    pub async fn request(&self, prompt: &str, session_id: Option<&str>) -> Result<String, RelayError> {
        let id = Uuid::new_v4().to_string();
        self.request_with_id(&id, prompt, session_id).await
    }

    /// Round trip under a caller-chosen correlation id.
    ///
    /// # Errors
    ///
    /// - `DuplicateId` if `id` is already in flight
    /// - `SendFailure` if the frame could not be transmitted
    /// - `Timeout` if no response arrived in time (the entry is evicted)
    /// - `ChannelClosed` if the channel went away while waiting
    /// - `Backend` if the backend answered with an error frame
    pub async fn request_with_id(
        &self,
        id: &str,
        prompt: &str,
        session_id: Option<&str>,
    ) -> Result<String, RelayError> {
        let frame = OutboundFrame::new(id, prompt).to_json()?;
        let waiter = self.registry.register(id, session_id)?;
        let mut guard = PendingGuard {
            registry: self.registry.as_ref(),
            id,
            armed: true,
        };
        self.issued.fetch_add(1, Ordering::SeqCst);

        if let Err(e) = self.sink.send(frame).await {
            guard.armed = false;
            self.registry.fail(id, e.clone());
            tracing::warn!(correlation_id = id, error = %e, "failed to send request");
            return Err(e);
        }

        let result = match tokio::time::timeout(self.timeout, waiter.wait()).await {
            Ok(resolution) => resolution,
            Err(_) => {
                self.registry.evict(id, self.timeout);
                Err(RelayError::Timeout {
                    id: id.to_string(),
                    after: self.timeout,
                })
            }
        };
        guard.armed = false;
        result
    }
}

//! Routes inbound frames to pending requests.
//!
//! Routing rules, in order:
//! 1. Structured frame with a correlation id → resolve that id. An id nobody
//!    is waiting for is logged and dropped.
//! 2. Structured frame without an id → oldest pending request.
//! 3. Unparseable frame → treated as an untagged payload, same as rule 2.
//!
//! Nothing in here returns an error or panics: a bad frame degrades to the
//! fallback path and the channel keeps running.

use std::sync::Arc;

use crate::correlation::{CorrelationRegistry, FallbackOutcome};
use crate::errors::RelayError;

use super::frame::InboundFrame;
use super::transport::FrameHandler;

/// What happened to an inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Tagged frame matched a pending request.
    Correlated { correlation_id: String },
    /// Tagged frame, but nothing was pending under that id.
    UnknownId { correlation_id: String },
    /// Untagged frame completed the oldest pending request.
    Fallback { correlation_id: String },
    /// Untagged frame and nothing pending; discarded.
    Unrouted,
}

pub struct Demultiplexer {
    registry: Arc<CorrelationRegistry>,
}

impl Demultiplexer {
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }

    pub fn route(&self, raw: &str) -> RouteOutcome {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(error = %e, "inbound frame is not structured; routing as untagged");
                InboundFrame::untagged(raw)
            }
        };

        match frame.task_id.clone() {
            Some(correlation_id) => {
                if self.complete(&correlation_id, frame) {
                    RouteOutcome::Correlated { correlation_id }
                } else {
                    tracing::warn!(
                        correlation_id = %correlation_id,
                        "response for unknown or already completed request"
                    );
                    RouteOutcome::UnknownId { correlation_id }
                }
            }
            None => match self.registry.resolve_fallback(frame.into_resolution()) {
                FallbackOutcome::Resolved { correlation_id } => {
                    tracing::debug!(correlation_id = %correlation_id, "untagged response routed to oldest pending request");
                    RouteOutcome::Fallback { correlation_id }
                }
                FallbackOutcome::Unrouted => {
                    tracing::warn!(
                        unrouted_total = self.registry.unrouted_count(),
                        "untagged response with no pending request; discarded"
                    );
                    RouteOutcome::Unrouted
                }
            },
        }
    }

    fn complete(&self, correlation_id: &str, frame: InboundFrame) -> bool {
        match frame.into_resolution() {
            Ok(value) => self.registry.resolve(correlation_id, value),
            Err(error) => self.registry.fail(correlation_id, error),
        }
    }
}

impl FrameHandler for Demultiplexer {
    fn on_frame(&self, raw: &str) {
        self.route(raw);
    }

    fn on_close(&self, reason: &str) {
        let failed = self.registry.fail_all(RelayError::ChannelClosed);
        if failed > 0 {
            tracing::warn!(failed, reason, "channel closed with requests still pending");
        }
    }
}

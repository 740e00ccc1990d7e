//! In-process backend double for unit tests.
//!
//! `ScriptedBackend` implements `FrameSink`: every sent frame is recorded and
//! the scripted reply (if any) is routed straight back through a real
//! `Demultiplexer`, so tests exercise the same correlation path as the
//! WebSocket transport without a network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::channel::{Demultiplexer, FrameHandler, FrameSink, OutboundFrame};
use crate::correlation::CorrelationRegistry;
use crate::errors::RelayError;

type ReplyFn = Box<dyn Fn(&OutboundFrame, usize) -> Option<String> + Send + Sync>;

pub(crate) struct ScriptedBackend {
    demux: Demultiplexer,
    sent: Mutex<Vec<OutboundFrame>>,
    /// 1-based send number that fails; 0 = never
    fail_on: AtomicUsize,
    reply: ReplyFn,
}

impl ScriptedBackend {
    /// Replies with raw text chosen by `reply(frame, send_number)`; `None` = stay silent.
    pub(crate) fn raw<F>(reply: F) -> Arc<Self>
    where
        F: Fn(&OutboundFrame, usize) -> Option<String> + Send + Sync + 'static,
    {
        Arc::new(Self {
            demux: Demultiplexer::new(Arc::new(CorrelationRegistry::new())),
            sent: Mutex::new(Vec::new()),
            fail_on: AtomicUsize::new(0),
            reply: Box::new(reply),
        })
    }

    /// Replies `{"taskId": <id>, "response": <answer>}`.
    pub(crate) fn tagged<F>(answer: F) -> Arc<Self>
    where
        F: Fn(&OutboundFrame, usize) -> String + Send + Sync + 'static,
    {
        Self::raw(move |frame, n| {
            let body = serde_json::json!({
                "taskId": frame.task_id,
                "response": answer(frame, n),
            });
            Some(body.to_string())
        })
    }

    /// Never replies.
    pub(crate) fn silent() -> Arc<Self> {
        Self::raw(|_, _| None)
    }

    pub(crate) fn failing_on(self: Arc<Self>, send_number: usize) -> Arc<Self> {
        self.fail_on.store(send_number, Ordering::SeqCst);
        self
    }

    pub(crate) fn registry(&self) -> &Arc<CorrelationRegistry> {
        self.demux.registry()
    }

    pub(crate) fn sent(&self) -> Vec<OutboundFrame> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn close(&self) {
        self.demux.on_close("scripted backend closed");
    }
}

#[async_trait]
impl FrameSink for ScriptedBackend {
    async fn send(&self, frame: String) -> Result<(), RelayError> {
        let frame: OutboundFrame =
            serde_json::from_str(&frame).map_err(|e| RelayError::SendFailure(e.to_string()))?;
        let send_number = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(frame.clone());
            sent.len()
        };

        if self.fail_on.load(Ordering::SeqCst) == send_number {
            return Err(RelayError::SendFailure("scripted send failure".to_string()));
        }

        if let Some(reply) = (self.reply)(&frame, send_number) {
            self.demux.on_frame(&reply);
        }
        Ok(())
    }
}

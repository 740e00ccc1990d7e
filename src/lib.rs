//! Correlated request/response relay over a persistent WebSocket channel,
//! plus a chunked multi-stage repository migration pipeline built on it.

pub mod channel;
pub mod chunk;
pub mod client;
pub mod config;
pub mod correlation;
pub mod errors;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod service;
pub mod task_log;

#[cfg(test)]
pub(crate) mod testing;

//! Duplex channel to the backend.
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `frame`     | Outbound/inbound wire frames and their parsing          |
//! | `transport` | `DuplexChannel` (WebSocket), `FrameHandler`, `FrameSink` |
//! | `demux`     | `Demultiplexer`, inbound frame → registry entry        |

pub mod demux;
pub mod frame;
pub mod transport;

pub use demux::{Demultiplexer, RouteOutcome};
pub use frame::{InboundFrame, OutboundFrame};
pub use transport::{ChannelState, DuplexChannel, FrameHandler, FrameSink};

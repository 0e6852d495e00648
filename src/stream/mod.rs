//! Stream module - multiplexing many calls over one transaction stream.
//!
//! - [`RequestQueue`] / [`RequestReceiver`]: closeable outbound queue
//! - [`RequestTransmitter`] / [`Dispatcher`]: batching of outbound requests
//! - [`ResponseCollector`] / [`ResponseQueue`]: routing of inbound messages by id
//! - [`BidiStream`]: the orchestrator exposing `single` and `stream`
//! - [`ResponsePartIterator`]: pagination of streamed replies

mod bidi;
mod collector;
mod iterator;
mod queue;
mod transmitter;

pub use bidi::{BidiStream, SingleResponse};
pub use collector::{ResponseCollector, ResponseQueue};
pub use iterator::ResponsePartIterator;
pub use queue::{request_queue, OutboundFailure, RequestQueue, RequestReceiver};
pub use transmitter::{
    Dispatcher, RequestTransmitter, TransmitterConfig, DEFAULT_BATCH_WINDOW_LARGE,
    DEFAULT_BATCH_WINDOW_SMALL, DEFAULT_PARALLELISATION,
};

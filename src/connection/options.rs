//! Per-session, per-transaction and per-query options.
//!
//! Every field is optional; an unset field is left to the server default.
//!
//! # Example
//!
//! ```
//! use typedb_client::Options;
//!
//! let options = Options::new().infer(true).prefetch_size(50);
//! assert_eq!(options.infer, Some(true));
//! ```

use serde::{Deserialize, Serialize};

/// Options sent along with session open, transaction open and queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub infer: Option<bool>,
    pub trace_inference: Option<bool>,
    pub explain: Option<bool>,
    pub parallel: Option<bool>,
    pub prefetch: Option<bool>,
    pub prefetch_size: Option<u32>,
    pub session_idle_timeout_millis: Option<u32>,
    pub transaction_timeout_millis: Option<u32>,
    pub schema_lock_acquire_timeout_millis: Option<u32>,
    /// Cluster only: allow the session on a secondary replica.
    pub read_any_replica: Option<bool>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn infer(mut self, infer: bool) -> Self {
        self.infer = Some(infer);
        self
    }

    pub fn trace_inference(mut self, trace_inference: bool) -> Self {
        self.trace_inference = Some(trace_inference);
        self
    }

    pub fn explain(mut self, explain: bool) -> Self {
        self.explain = Some(explain);
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = Some(parallel);
        self
    }

    pub fn prefetch(mut self, prefetch: bool) -> Self {
        self.prefetch = Some(prefetch);
        self
    }

    pub fn prefetch_size(mut self, prefetch_size: u32) -> Self {
        self.prefetch_size = Some(prefetch_size);
        self
    }

    pub fn session_idle_timeout_millis(mut self, millis: u32) -> Self {
        self.session_idle_timeout_millis = Some(millis);
        self
    }

    pub fn transaction_timeout_millis(mut self, millis: u32) -> Self {
        self.transaction_timeout_millis = Some(millis);
        self
    }

    pub fn schema_lock_acquire_timeout_millis(mut self, millis: u32) -> Self {
        self.schema_lock_acquire_timeout_millis = Some(millis);
        self
    }

    pub fn read_any_replica(mut self, read_any_replica: bool) -> Self {
        self.read_any_replica = Some(read_any_replica);
        self
    }

    /// Whether a cluster session may be served by a secondary replica.
    pub fn allows_any_replica(&self) -> bool {
        self.read_any_replica.unwrap_or(false)
    }
}

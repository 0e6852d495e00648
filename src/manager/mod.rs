//! Manager module - typed operations issued through a transaction's stream.
//!
//! Each manager borrows the transaction's [`BidiStream`](crate::stream::BidiStream)
//! and sends exactly one request per operation.

mod concept;
mod logic;
mod query;

pub use concept::ConceptManager;
pub use logic::LogicManager;
pub use query::QueryManager;

//! Connection module - clients, databases, sessions and transactions.

mod client;
mod database;
mod options;
mod session;
mod transaction;

pub use client::{Client, ClientBuilder};
pub use database::{Database, DatabaseManager};
pub use options::Options;
pub use session::{Session, PULSE_INTERVAL};
pub use transaction::Transaction;

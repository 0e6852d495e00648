//! # typedb-client
//!
//! Async Rust client for TypeDB servers and clusters.
//!
//! ## Architecture
//!
//! - **Unary calls**: database management, sessions, cluster discovery
//! - **Transaction streams**: one duplex call per transaction carrying every
//!   query, concept and logic request of that transaction, batched on the way
//!   out and routed back to each caller by request id
//!
//! ## Example
//!
//! ```ignore
//! use futures_util::TryStreamExt;
//! use typedb_client::{Client, Options, SessionType, TransactionType};
//!
//! #[tokio::main]
//! async fn main() -> typedb_client::Result<()> {
//!     let client = Client::connect("127.0.0.1:1729").await?;
//!     let session = client.session("social", SessionType::Data, Options::new()).await?;
//!     let transaction = session.transaction(TransactionType::Read, Options::new()).await?;
//!
//!     let people: Vec<_> = transaction
//!         .query()
//!         .match_("match $p isa person;")?
//!         .try_collect()
//!         .await?;
//!     println!("{} people", people.len());
//!     Ok(())
//! }
//! ```

pub mod answer;
pub mod cluster;
pub mod codec;
pub mod concept;
pub mod connection;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod stream;
pub mod transport;

pub use answer::{ConceptMap, ConceptMapGroup, Numeric, NumericGroup, Rule};
pub use cluster::{ClusterClient, ClusterConfig, ClusterSession};
pub use concept::{Concept, Iid, Label, Value, ValueType};
pub use connection::{Client, ClientBuilder, Database, DatabaseManager, Options, Session, Transaction};
pub use error::{Result, TypeDBError};
pub use protocol::{SessionType, TransactionType};
pub use stream::{RequestTransmitter, TransmitterConfig};

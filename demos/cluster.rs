//! Cluster - talk to a replicated deployment through the failover wrapper.
//!
//! This example demonstrates:
//! - Discovering cluster members from a list of seed addresses
//! - Reading the replica set of a database
//! - Sessions that follow the primary replica across elections
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=typedb_client=debug cargo run --example cluster -- 127.0.0.1:11729 127.0.0.1:21729
//! ```

use tracing_subscriber::EnvFilter;
use typedb_client::{ClusterClient, Options, SessionType, TransactionType};

const DATABASE: &str = "social";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut seeds: Vec<String> = std::env::args().skip(1).collect();
    if seeds.is_empty() {
        seeds.push("127.0.0.1:11729".to_string());
    }

    let cluster = ClusterClient::connect(seeds).await?;
    println!("Members: {:?}", cluster.members());

    let databases = cluster.databases();
    if !databases.contains(DATABASE).await? {
        databases.create(DATABASE).await?;
    }
    let database = databases.get(DATABASE).await?;
    for replica in database.replicas().replicas() {
        println!(
            "{} term={} primary={} preferred={}",
            replica.address, replica.term, replica.is_primary, replica.is_preferred
        );
    }

    // Reads may be served by any replica; writes always go to the primary.
    let session = cluster
        .session(DATABASE, SessionType::Data, Options::new().read_any_replica(true))
        .await?;
    let transaction = session
        .transaction(TransactionType::Read, Options::new())
        .await?;
    let count = transaction
        .query()
        .match_aggregate("match $x isa thing; get; count;")
        .await?;
    println!("Things: {:?}", count);

    transaction.close();
    session.close().await?;
    cluster.close();
    Ok(())
}

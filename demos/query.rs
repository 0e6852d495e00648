//! Query - define a schema, insert data and read it back.
//!
//! This example demonstrates:
//! - Connecting to a single TypeDB server
//! - Schema and data sessions with their transactions
//! - Streamed `match` answers alongside single-response queries
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=typedb_client=debug cargo run --example query -- 127.0.0.1:1729
//! ```

use futures_util::TryStreamExt;
use tracing_subscriber::EnvFilter;
use typedb_client::{Client, Options, SessionType, TransactionType};

const DATABASE: &str = "social";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:1729".to_string());
    let client = Client::builder()
        .batch_windows(
            std::time::Duration::from_millis(1),
            std::time::Duration::from_millis(3),
        )
        .connect(address)
        .await?;

    if !client.databases().contains(DATABASE).await? {
        client.databases().create(DATABASE).await?;
    }

    {
        let session = client
            .session(DATABASE, SessionType::Schema, Options::new())
            .await?;
        let transaction = session
            .transaction(TransactionType::Write, Options::new())
            .await?;
        transaction
            .query()
            .define("define name sub attribute, value string; person sub entity, owns name;")
            .await?;
        transaction.commit().await?;
        session.close().await?;
    }

    let session = client
        .session(DATABASE, SessionType::Data, Options::new())
        .await?;

    let transaction = session
        .transaction(TransactionType::Write, Options::new())
        .await?;
    let inserted: Vec<_> = transaction
        .query()
        .insert("insert $p isa person, has name \"Alice\";")?
        .try_collect()
        .await?;
    println!("Inserted {} answers", inserted.len());
    transaction.commit().await?;

    let transaction = session
        .transaction(TransactionType::Read, Options::new().infer(true))
        .await?;
    let query = transaction.query();
    let count = query.match_aggregate("match $p isa person; get; count;").await?;
    println!("People: {:?}", count);

    let mut names = query.match_("match $p isa person, has name $n;")?;
    while let Some(answer) = names.try_next().await? {
        if let Some(name) = answer.get("n") {
            println!("{}", name.label());
        }
    }

    transaction.close();
    session.close().await?;
    client.close();
    Ok(())
}

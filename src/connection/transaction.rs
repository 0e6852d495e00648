//! Transactions: one [`BidiStream`] each.
//!
//! Every manager call of a transaction is multiplexed over that stream.
//! Dropping a transaction closes the stream; in-flight calls then fail with
//! `TransactionClosed`.

use super::Options;
use crate::error::{Result, TypeDBError};
use crate::manager::{ConceptManager, LogicManager, QueryManager};
use crate::protocol::{RequestPayload, ResponsePayload, SessionId, TransactionType};
use crate::stream::{BidiStream, RequestTransmitter};
use crate::transport::Transport;

/// An open transaction.
#[derive(Debug)]
pub struct Transaction {
    stream: BidiStream,
    transaction_type: TransactionType,
    options: Options,
}

impl Transaction {
    pub(crate) async fn open(
        transport: &dyn Transport,
        transmitter: &RequestTransmitter,
        session_id: SessionId,
        transaction_type: TransactionType,
        options: Options,
        network_latency_millis: u32,
    ) -> Result<Self> {
        let stream = BidiStream::open(transport, transmitter).await?;
        let open = RequestPayload::Open {
            session_id,
            transaction_type,
            options: options.clone(),
            network_latency_millis,
        };

        let opened = match stream.single(open, false) {
            Ok(response) => response.get().await,
            Err(e) => Err(e),
        };
        match opened {
            Ok(ResponsePayload::Opened) => Ok(Self {
                stream,
                transaction_type,
                options,
            }),
            Ok(other) => {
                stream.close(None);
                Err(TypeDBError::unexpected_response("transaction open", other))
            }
            Err(e) => {
                stream.close(None);
                Err(e)
            }
        }
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_open()
    }

    pub fn query(&self) -> QueryManager<'_> {
        QueryManager::new(&self.stream)
    }

    pub fn concepts(&self) -> ConceptManager<'_> {
        ConceptManager::new(&self.stream)
    }

    pub fn logic(&self) -> LogicManager<'_> {
        LogicManager::new(&self.stream)
    }

    /// Commit and close the transaction.
    pub async fn commit(self) -> Result<()> {
        let result = self.stream.single(RequestPayload::Commit, false)?.get().await;
        self.stream.close(None);
        match result? {
            ResponsePayload::Committed => Ok(()),
            other => Err(TypeDBError::unexpected_response("commit", other)),
        }
    }

    /// Discard the writes made so far; the transaction stays open.
    pub async fn rollback(&self) -> Result<()> {
        match self
            .stream
            .single(RequestPayload::Rollback, false)?
            .get()
            .await?
        {
            ResponsePayload::RolledBack => Ok(()),
            other => Err(TypeDBError::unexpected_response("rollback", other)),
        }
    }

    /// Close the stream; pending calls fail with `TransactionClosed`.
    pub fn close(&self) {
        self.stream.close(None);
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.stream.close(None);
    }
}

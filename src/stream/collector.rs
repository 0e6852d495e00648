//! Response collector: request id to per-call inbound queue.
//!
//! The stream's reader task is the only producer; every caller owns the
//! receiving end of its own queue. A terminal message (a `Response`, or a
//! `Done` part) removes the entry.
//!
//! Ids are handed out in increasing order, so the collector only remembers
//! the highest id it issued. A message for an id at or below it that is no
//! longer registered belongs to a finished or abandoned call (a second
//! `Done` after a prefetch overshoot, parts for a dropped iterator) and is
//! discarded. An id above it was never issued and is a protocol violation.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{Result, TypeDBError};
use crate::protocol::{PartPayload, RequestId, ServerMessage, StreamState};

type Delivery = Result<ServerMessage>;

#[derive(Default)]
struct State {
    queues: HashMap<RequestId, mpsc::UnboundedSender<Delivery>>,
    highest_issued: Option<RequestId>,
    is_closed: bool,
}

impl State {
    fn was_issued(&self, id: RequestId) -> bool {
        self.highest_issued.map_or(false, |highest| id <= highest)
    }
}

fn is_terminal(message: &ServerMessage) -> bool {
    match message {
        ServerMessage::Response(_) => true,
        ServerMessage::ResponsePart(part) => {
            matches!(part.payload, PartPayload::StreamState(StreamState::Done))
        }
    }
}

/// Registry of in-flight calls on one transaction stream.
#[derive(Default)]
pub struct ResponseCollector {
    state: Mutex<State>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a queue for a request that is about to be dispatched.
    pub fn new_queue(&self, id: RequestId) -> Result<ResponseQueue> {
        let mut state = self.state.lock();
        if state.is_closed {
            return Err(TypeDBError::TransactionClosed);
        }
        if state.queues.contains_key(&id) {
            return Err(TypeDBError::Protocol(format!(
                "Request {} is already in flight",
                id
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.queues.insert(id, tx);
        state.highest_issued = state.highest_issued.max(Some(id));
        Ok(ResponseQueue {
            id,
            rx,
            terminal: None,
        })
    }

    /// Drop the entry of a call nobody waits on any more.
    pub fn remove(&self, id: RequestId) {
        self.state.lock().queues.remove(&id);
    }

    pub fn is_registered(&self, id: RequestId) -> bool {
        self.state.lock().queues.contains_key(&id)
    }

    /// Route one inbound message to its caller's queue.
    ///
    /// # Errors
    ///
    /// [`TypeDBError::UnknownRequestId`] when the message's id was never
    /// issued. The caller must treat this as fatal for the stream.
    pub fn route(&self, message: ServerMessage) -> Result<()> {
        let id = message.request_id();
        let mut state = self.state.lock();
        if state.is_closed {
            tracing::trace!("Collector closed, discarding message for {}", id);
            return Ok(());
        }

        let tx = if is_terminal(&message) {
            state.queues.remove(&id)
        } else {
            state.queues.get(&id).cloned()
        };
        let Some(tx) = tx else {
            if state.was_issued(id) {
                tracing::trace!("Call {} already finished, discarding message", id);
                return Ok(());
            }
            return Err(TypeDBError::UnknownRequestId(id));
        };

        if tx.send(Ok(message)).is_err() {
            tracing::trace!("Caller of {} is gone, discarding message", id);
        }
        Ok(())
    }

    /// Close every queue. With an error, each waiter receives a copy of it;
    /// without one, waiters see [`TypeDBError::TransactionClosed`].
    pub fn close_all(&self, error: Option<TypeDBError>) {
        let queues = {
            let mut state = self.state.lock();
            state.is_closed = true;
            std::mem::take(&mut state.queues)
        };

        if let Some(error) = error {
            for tx in queues.values() {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().is_closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Receiving end of one call's queue.
#[derive(Debug)]
pub struct ResponseQueue {
    id: RequestId,
    rx: mpsc::UnboundedReceiver<Delivery>,
    terminal: Option<TypeDBError>,
}

impl ResponseQueue {
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the next message.
    ///
    /// Once the queue is closed every call fails with the closing error, or
    /// [`TypeDBError::TransactionClosed`] after a clean close.
    pub async fn get(&mut self) -> Result<ServerMessage> {
        if let Some(error) = &self.terminal {
            return Err(error.clone());
        }
        let delivery = self.rx.recv().await;
        self.settle(delivery)
    }

    /// Pop without waiting; `None` when nothing has arrived yet.
    pub fn try_get(&mut self) -> Option<Result<ServerMessage>> {
        if let Some(error) = &self.terminal {
            return Some(Err(error.clone()));
        }
        match self.rx.try_recv() {
            Ok(delivery) => Some(self.settle(Some(delivery))),
            Err(mpsc::error::TryRecvError::Empty) => None,
            Err(mpsc::error::TryRecvError::Disconnected) => Some(self.settle(None)),
        }
    }

    fn settle(&mut self, delivery: Option<Delivery>) -> Result<ServerMessage> {
        match delivery {
            Some(Ok(message)) => Ok(message),
            Some(Err(error)) => {
                self.terminal = Some(error.clone());
                Err(error)
            }
            None => {
                self.terminal = Some(TypeDBError::TransactionClosed);
                Err(TypeDBError::TransactionClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        Response, ResponsePart, ResponsePayload, ServerError, ServerErrorCode, StreamState,
    };

    fn opened(id: u32) -> ServerMessage {
        ServerMessage::Response(Response::ok(RequestId(id), ResponsePayload::Opened))
    }

    fn part(id: u32, state: StreamState) -> ServerMessage {
        ServerMessage::ResponsePart(ResponsePart::state(RequestId(id), state))
    }

    #[tokio::test]
    async fn test_routes_by_request_id() {
        let collector = ResponseCollector::new();
        let mut a = collector.new_queue(RequestId(1)).unwrap();
        let mut b = collector.new_queue(RequestId(2)).unwrap();

        collector.route(opened(2)).unwrap();
        collector.route(opened(1)).unwrap();

        assert_eq!(a.get().await.unwrap().request_id(), RequestId(1));
        assert_eq!(b.get().await.unwrap().request_id(), RequestId(2));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_unknown_id_is_protocol_error() {
        let collector = ResponseCollector::new();
        let error = collector.route(opened(99)).unwrap_err();
        assert!(matches!(error, TypeDBError::UnknownRequestId(RequestId(99))));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let collector = ResponseCollector::new();
        let _queue = collector.new_queue(RequestId(1)).unwrap();
        assert!(collector.new_queue(RequestId(1)).is_err());
    }

    #[tokio::test]
    async fn test_done_removes_stream_entry() {
        let collector = ResponseCollector::new();
        let mut queue = collector.new_queue(RequestId(5)).unwrap();

        collector.route(part(5, StreamState::Continue)).unwrap();
        assert!(collector.is_registered(RequestId(5)));
        collector.route(part(5, StreamState::Done)).unwrap();
        assert!(!collector.is_registered(RequestId(5)));

        // The late second DONE of a finished stream is discarded.
        collector.route(part(5, StreamState::Done)).unwrap();

        assert!(queue.get().await.is_ok());
        assert!(queue.get().await.is_ok());
        assert!(matches!(
            queue.try_get(),
            Some(Err(TypeDBError::TransactionClosed))
        ));
        assert!(collector.is_empty());
    }

    #[test]
    fn test_unissued_id_after_finished_calls_is_still_unknown() {
        let collector = ResponseCollector::new();
        drop(collector.new_queue(RequestId(1)).unwrap());
        drop(collector.new_queue(RequestId(2)).unwrap());
        collector.remove(RequestId(1));
        collector.remove(RequestId(2));

        assert!(collector.route(part(1, StreamState::Continue)).is_ok());
        assert!(collector.route(opened(2)).is_ok());
        assert!(matches!(
            collector.route(opened(3)),
            Err(TypeDBError::UnknownRequestId(RequestId(3)))
        ));
    }

    #[tokio::test]
    async fn test_dropped_caller_is_not_an_error() {
        let collector = ResponseCollector::new();
        drop(collector.new_queue(RequestId(3)).unwrap());
        assert!(collector.route(part(3, StreamState::Continue)).is_ok());
    }

    #[tokio::test]
    async fn test_close_all_with_error_fans_out() {
        let collector = ResponseCollector::new();
        let mut x = collector.new_queue(RequestId(1)).unwrap();
        let mut y = collector.new_queue(RequestId(2)).unwrap();

        let error: TypeDBError = ServerError::new(ServerErrorCode::Internal, "stream reset").into();
        collector.close_all(Some(error));

        for queue in [&mut x, &mut y] {
            let error = queue.get().await.unwrap_err();
            assert_eq!(error.to_string(), "Server error: stream reset");
            assert!(queue.get().await.is_err());
        }
        assert!(matches!(
            collector.new_queue(RequestId(3)),
            Err(TypeDBError::TransactionClosed)
        ));
    }

    #[tokio::test]
    async fn test_clean_close_reports_transaction_closed() {
        let collector = ResponseCollector::new();
        let mut queue = collector.new_queue(RequestId(1)).unwrap();
        collector.close_all(None);

        assert!(matches!(
            queue.get().await,
            Err(TypeDBError::TransactionClosed)
        ));
        assert!(matches!(
            queue.try_get(),
            Some(Err(TypeDBError::TransactionClosed))
        ));
        assert!(collector.route(opened(1)).is_ok());
    }

    #[tokio::test]
    async fn test_blocked_waiter_wakes_on_close() {
        let collector = std::sync::Arc::new(ResponseCollector::new());
        let mut queue = collector.new_queue(RequestId(1)).unwrap();
        let waiter = tokio::spawn(async move { queue.get().await });

        tokio::task::yield_now().await;
        collector.close_all(Some(TypeDBError::ClientClosed));

        assert!(matches!(
            waiter.await.unwrap(),
            Err(TypeDBError::ClientClosed)
        ));
    }
}

//! Outbound request queue feeding a transport's duplex call.
//!
//! ```text
//! Dispatcher ─► RequestQueue::put ─► mpsc ─► RequestReceiver ─► transport writer
//!                 close() drops the sender: the receiver yields None (end of stream)
//!                 RequestReceiver::fail ─► OutboundFailure ─► stream reader task
//! ```
//!
//! Dropping the sender is the end-of-stream sentinel: once every buffered
//! message has been pulled, the receiver reports end of iteration and the
//! transport finishes the outbound half of the call.
//!
//! A transport that can no longer write hands its error back through
//! [`RequestReceiver::fail`], so requests it already pulled are not lost
//! silently.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, TypeDBError};
use crate::protocol::ClientMessage;

/// Create a connected queue / receiver pair.
pub fn request_queue() -> (RequestQueue, RequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (failure_tx, failure_rx) = oneshot::channel();
    (
        RequestQueue {
            tx: Mutex::new(Some(tx)),
            failure: Mutex::new(Some(OutboundFailure { rx: failure_rx })),
        },
        RequestReceiver {
            rx,
            failure: Some(failure_tx),
        },
    )
}

/// Producer side. `put` never blocks.
#[derive(Debug)]
pub struct RequestQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<ClientMessage>>>,
    failure: Mutex<Option<OutboundFailure>>,
}

impl RequestQueue {
    /// Enqueue one client message.
    ///
    /// Fails with [`TypeDBError::ClientClosed`] once the queue is closed, and
    /// with a broken-pipe I/O error once the transport stopped pulling.
    pub fn put(&self, message: ClientMessage) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(TypeDBError::ClientClosed)?;
        tx.send(message).map_err(|_| {
            TypeDBError::from(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "transport stopped pulling requests",
            ))
        })
    }

    /// Signal end of stream. Safe to call any number of times.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Take the handle that resolves when the transport reports a failure.
    ///
    /// Only the first call returns `Some`.
    pub fn outbound_failure(&self) -> Option<OutboundFailure> {
        self.failure.lock().take()
    }
}

/// Resolves with the error a transport reported through
/// [`RequestReceiver::fail`].
#[derive(Debug)]
pub struct OutboundFailure {
    rx: oneshot::Receiver<TypeDBError>,
}

impl OutboundFailure {
    /// Wait for the failure. Never resolves if the receiver ends without one.
    pub async fn wait(self) -> TypeDBError {
        match self.rx.await {
            Ok(error) => error,
            Err(_) => std::future::pending().await,
        }
    }
}

/// Consumer side, pulled by the transport.
#[derive(Debug)]
pub struct RequestReceiver {
    rx: mpsc::UnboundedReceiver<ClientMessage>,
    failure: Option<oneshot::Sender<TypeDBError>>,
}

impl RequestReceiver {
    /// Wait for the next message; `None` once the queue is closed and drained.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.rx.recv().await
    }

    /// Take an already-queued message without waiting.
    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        self.rx.try_recv().ok()
    }

    /// Stop pulling and report why. Later puts fail and the owning stream
    /// is closed with `error`.
    pub fn fail(mut self, error: TypeDBError) {
        if let Some(failure) = self.failure.take() {
            let _ = failure.send(error);
        }
    }
}

impl Stream for RequestReceiver {
    type Item = ClientMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Request, RequestId, RequestPayload};

    fn message(id: u32) -> ClientMessage {
        ClientMessage::single(Request::new(RequestId(id), RequestPayload::Commit))
    }

    #[tokio::test]
    async fn test_put_then_recv_in_order() {
        let (queue, mut receiver) = request_queue();
        queue.put(message(1)).unwrap();
        queue.put(message(2)).unwrap();

        assert_eq!(receiver.recv().await, Some(message(1)));
        assert_eq!(receiver.try_recv(), Some(message(2)));
        assert_eq!(receiver.try_recv(), None);
    }

    #[tokio::test]
    async fn test_close_ends_receiver_after_drain() {
        let (queue, mut receiver) = request_queue();
        queue.put(message(1)).unwrap();
        queue.close();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(receiver.recv().await, Some(message(1)));
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_put_after_close_fails() {
        let (queue, _receiver) = request_queue();
        queue.close();
        assert!(matches!(
            queue.put(message(1)),
            Err(TypeDBError::ClientClosed)
        ));
    }

    #[tokio::test]
    async fn test_put_after_receiver_dropped_fails() {
        let (queue, receiver) = request_queue();
        drop(receiver);
        assert!(queue.is_closed());
        assert!(matches!(queue.put(message(1)), Err(TypeDBError::Io(_))));
    }

    #[tokio::test]
    async fn test_fail_reaches_the_producer() {
        let (queue, receiver) = request_queue();
        let failure = queue.outbound_failure().unwrap();
        assert!(queue.outbound_failure().is_none());

        receiver.fail(TypeDBError::Protocol("socket gone".to_string()));

        assert!(matches!(failure.wait().await, TypeDBError::Protocol(_)));
        assert!(matches!(queue.put(message(1)), Err(TypeDBError::Io(_))));
    }

    #[tokio::test]
    async fn test_clean_end_reports_no_failure() {
        let (queue, mut receiver) = request_queue();
        let failure = queue.outbound_failure().unwrap();
        queue.close();
        assert_eq!(receiver.recv().await, None);
        drop(receiver);

        let waited =
            tokio::time::timeout(std::time::Duration::from_millis(20), failure.wait()).await;
        assert!(waited.is_err());
    }

    #[tokio::test]
    async fn test_recv_waits_for_put() {
        let (queue, mut receiver) = request_queue();
        let reader = tokio::spawn(async move { receiver.recv().await });

        tokio::task::yield_now().await;
        queue.put(message(9)).unwrap();

        assert_eq!(reader.await.unwrap(), Some(message(9)));
    }
}

//! Pagination over a streamed reply.
//!
//! The server sends data parts, then either `Continue` (ask again) or `Done`.
//! `Continue` is answered here with a `StreamContinue` request under the same
//! id, so callers only ever see data parts and the end.
//!
//! The first `Done` deregisters the call. A second `Done` for the same id can
//! arrive when the server's prefetch overshoots; the collector discards it.
//! Dropping an unfinished iterator deregisters its call as well.

use futures_util::stream::{self, BoxStream, StreamExt};

use super::bidi::BidiStream;
use super::collector::ResponseQueue;
use crate::error::{Result, TypeDBError};
use crate::protocol::{PartPayload, RequestId, ServerMessage, StreamState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Done,
}

/// Data parts of one streamed reply, in arrival order.
#[derive(Debug)]
pub struct ResponsePartIterator {
    id: RequestId,
    queue: ResponseQueue,
    stream: BidiStream,
    state: State,
}

impl ResponsePartIterator {
    pub(crate) fn new(id: RequestId, queue: ResponseQueue, stream: BidiStream) -> Self {
        Self {
            id,
            queue,
            stream,
            state: State::Streaming,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Done
    }

    /// Next data part; `None` once the reply is complete.
    ///
    /// After an error the iterator is finished.
    pub async fn next(&mut self) -> Option<Result<PartPayload>> {
        while self.state == State::Streaming {
            let message = match self.queue.get().await {
                Ok(message) => message,
                Err(e) => return self.fail(e),
            };

            match message {
                ServerMessage::ResponsePart(part) => match part.payload {
                    PartPayload::StreamState(StreamState::Continue) => {
                        if let Err(e) = self.stream.dispatch_continue(self.id) {
                            return self.fail(e);
                        }
                    }
                    PartPayload::StreamState(StreamState::Done) => {
                        self.state = State::Done;
                    }
                    payload => return Some(Ok(payload)),
                },
                ServerMessage::Response(response) => {
                    let error = match response.result {
                        Err(error) => error.into(),
                        Ok(_) => TypeDBError::Protocol(format!(
                            "Received a single response for streamed request {}",
                            self.id
                        )),
                    };
                    return self.fail(error);
                }
            }
        }
        None
    }

    fn fail(&mut self, error: TypeDBError) -> Option<Result<PartPayload>> {
        self.state = State::Done;
        Some(Err(error))
    }

    /// Adapt into a `Stream` of data parts.
    pub fn into_stream(self) -> BoxStream<'static, Result<PartPayload>> {
        stream::unfold(self, |mut parts| async move {
            let next = parts.next().await?;
            Some((next, parts))
        })
        .boxed()
    }

    /// Flatten every part into items with `extract`.
    ///
    /// `extract` fails on a part of the wrong shape for this request.
    pub fn items<T, F>(self, mut extract: F) -> BoxStream<'static, Result<T>>
    where
        T: Send + 'static,
        F: FnMut(PartPayload) -> Result<Vec<T>> + Send + 'static,
    {
        self.into_stream()
            .flat_map(move |part| {
                let items: Vec<Result<T>> = match part.and_then(&mut extract) {
                    Ok(items) => items.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed()
    }
}

impl Drop for ResponsePartIterator {
    fn drop(&mut self) {
        self.stream.forget(self.id);
    }
}

//! Batching request transmitter.
//!
//! # Architecture
//!
//! ```text
//! Transaction 1 ─► Dispatcher ─┐
//! Transaction 2 ─► Dispatcher ─┼─► Executor 0 (worker task) ─► flush ─► RequestQueue
//! Transaction 3 ─► Dispatcher ─┘
//! Transaction 4 ─► Dispatcher ───► Executor 1 (worker task) ─► ...
//! ```
//!
//! Dispatchers are bound round-robin to a fixed pool of executors. A worker
//! sleeps until one of its dispatchers receives a request, waits the small
//! window, then flushes every dispatcher's buffer as one [`ClientMessage`]
//! per dispatcher and keeps flushing every large window until no dispatcher
//! is registered.
//!
//! Dispatch and flush take the transmitter's read lock; shutdown takes the
//! write lock, so no dispatch can slip past a close.
//!
//! A flush the queue refuses is never dropped quietly: the dispatcher's
//! failure hook receives the error, and the owning stream closes with it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::queue::RequestQueue;
use crate::error::{Result, TypeDBError};
use crate::protocol::{ClientMessage, Request};

/// Default number of batching workers.
pub const DEFAULT_PARALLELISATION: usize = 2;

/// Default wait before the first flush after a worker wakes up.
pub const DEFAULT_BATCH_WINDOW_SMALL: Duration = Duration::from_millis(1);

/// Default wait between subsequent flushes.
pub const DEFAULT_BATCH_WINDOW_LARGE: Duration = Duration::from_millis(3);

/// Configuration for the batching workers.
///
/// While at least one dispatcher is bound to a worker, that worker wakes every
/// `batch_window_large` whether or not anything was dispatched. Long-lived idle
/// transactions therefore cost one timer tick per window per worker; raise
/// the large window to trade dispatch latency for fewer wakeups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransmitterConfig {
    /// Number of worker tasks dispatchers are spread across.
    pub parallelisation: usize,
    /// First wait after a worker is signalled.
    pub batch_window_small: Duration,
    /// Wait between flushes while dispatchers are registered.
    pub batch_window_large: Duration,
}

impl Default for TransmitterConfig {
    fn default() -> Self {
        Self {
            parallelisation: DEFAULT_PARALLELISATION,
            batch_window_small: DEFAULT_BATCH_WINDOW_SMALL,
            batch_window_large: DEFAULT_BATCH_WINDOW_LARGE,
        }
    }
}

/// Connection-scoped pool of batching workers.
///
/// Must be created inside a tokio runtime; the workers are spawned eagerly and
/// aborted by [`close`](Self::close) or on drop.
pub struct RequestTransmitter {
    executors: Vec<Arc<Executor>>,
    next_executor: AtomicUsize,
    next_dispatcher_id: AtomicU64,
    is_open: Arc<RwLock<bool>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl RequestTransmitter {
    pub fn new(config: TransmitterConfig) -> Self {
        let parallelisation = config.parallelisation.max(1);
        let mut executors = Vec::with_capacity(parallelisation);
        let mut tasks = Vec::with_capacity(parallelisation);

        for _ in 0..parallelisation {
            let executor = Arc::new(Executor::new(
                config.batch_window_small,
                config.batch_window_large,
            ));
            tasks.push(tokio::spawn(executor.clone().run()));
            executors.push(executor);
        }

        Self {
            executors,
            next_executor: AtomicUsize::new(0),
            next_dispatcher_id: AtomicU64::new(0),
            is_open: Arc::new(RwLock::new(true)),
            tasks: Mutex::new(tasks),
        }
    }

    /// Bind a new dispatcher feeding `queue` to the next worker in turn.
    pub fn dispatcher(&self, queue: RequestQueue) -> Result<Dispatcher> {
        let is_open = self.is_open.read();
        if !*is_open {
            return Err(TypeDBError::ClientClosed);
        }

        let slot = self.next_executor.fetch_add(1, Ordering::Relaxed) % self.executors.len();
        let executor = self.executors[slot].clone();
        let id = self.next_dispatcher_id.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::new(DispatcherShared {
            buffer: Mutex::new(Vec::new()),
            queue,
            is_closed: AtomicBool::new(false),
            on_failure: Mutex::new(None),
        });
        executor.register(id, shared.clone());

        Ok(Dispatcher {
            id,
            shared,
            executor,
            transmitter_open: self.is_open.clone(),
        })
    }

    pub fn is_open(&self) -> bool {
        *self.is_open.read()
    }

    /// Close every dispatcher and stop the workers. Idempotent.
    pub fn close(&self) {
        let mut is_open = self.is_open.write();
        if !*is_open {
            return;
        }
        *is_open = false;

        for executor in &self.executors {
            for dispatcher in executor.drain() {
                dispatcher.close();
            }
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        tracing::debug!("Request transmitter closed");
    }

    /// Number of dispatchers bound to each worker, in worker order.
    pub fn dispatcher_counts(&self) -> Vec<usize> {
        self.executors
            .iter()
            .map(|executor| executor.dispatchers.lock().len())
            .collect()
    }
}

impl Drop for RequestTransmitter {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RequestTransmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestTransmitter")
            .field("parallelisation", &self.executors.len())
            .field("is_open", &self.is_open())
            .finish()
    }
}

struct Executor {
    dispatchers: Mutex<HashMap<u64, Arc<DispatcherShared>>>,
    is_running: AtomicBool,
    signal: Notify,
    small_window: Duration,
    large_window: Duration,
}

impl Executor {
    fn new(small_window: Duration, large_window: Duration) -> Self {
        Self {
            dispatchers: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(false),
            signal: Notify::new(),
            small_window,
            large_window,
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.signal.notified().await;
            tokio::time::sleep(self.small_window).await;
            while self.flush_all() {
                tokio::time::sleep(self.large_window).await;
            }
        }
    }

    /// Flush every registered dispatcher; `false` (and idle) when none is left.
    ///
    /// Failure hooks run after the registry lock is released, since they may
    /// close the dispatcher and deregister it.
    fn flush_all(&self) -> bool {
        let failed: Vec<(Arc<DispatcherShared>, TypeDBError)> = {
            let dispatchers = self.dispatchers.lock();
            if dispatchers.is_empty() {
                self.is_running.store(false, Ordering::Release);
                return false;
            }
            dispatchers
                .values()
                .filter_map(|dispatcher| {
                    dispatcher
                        .flush()
                        .err()
                        .map(|e| (dispatcher.clone(), e))
                })
                .collect()
        };

        for (dispatcher, e) in failed {
            dispatcher.fail(e);
        }
        true
    }

    fn may_start_running(&self) {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.signal.notify_one();
        }
    }

    fn register(&self, id: u64, dispatcher: Arc<DispatcherShared>) {
        self.dispatchers.lock().insert(id, dispatcher);
    }

    fn deregister(&self, id: u64) {
        self.dispatchers.lock().remove(&id);
    }

    fn drain(&self) -> Vec<Arc<DispatcherShared>> {
        self.dispatchers.lock().drain().map(|(_, d)| d).collect()
    }
}

/// Called with the error of a batch the queue refused.
type FailureHook = Arc<dyn Fn(TypeDBError) + Send + Sync>;

struct DispatcherShared {
    buffer: Mutex<Vec<Request>>,
    queue: RequestQueue,
    is_closed: AtomicBool,
    on_failure: Mutex<Option<FailureHook>>,
}

impl DispatcherShared {
    /// Send the buffered requests as one batch.
    ///
    /// The buffer lock is held across the put so concurrent flushes keep
    /// batches in dispatch order.
    fn flush(&self) -> Result<()> {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return Ok(());
        }
        let requests = std::mem::take(&mut *buffer);
        self.queue.put(ClientMessage::batch(requests))
    }

    /// Hand a refused batch's error to the hook. No lock may be held.
    fn fail(&self, error: TypeDBError) {
        tracing::warn!("Outbound batch refused: {}", error);
        let hook = self.on_failure.lock().clone();
        match hook {
            Some(hook) => hook(error),
            None => tracing::debug!("No failure hook registered, batch dropped"),
        }
    }

    fn close(&self) {
        if self.is_closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Err(e) = self.flush() {
            self.fail(e);
        }
        self.queue.close();
    }
}

/// Per-transaction handle onto the transmitter.
pub struct Dispatcher {
    id: u64,
    shared: Arc<DispatcherShared>,
    executor: Arc<Executor>,
    transmitter_open: Arc<RwLock<bool>>,
}

impl Dispatcher {
    /// Buffer a request for the next batch. Never blocks.
    pub fn dispatch(&self, request: Request) -> Result<()> {
        let is_open = self.transmitter_open.read();
        self.ensure_open(*is_open)?;
        self.shared.buffer.lock().push(request);
        self.executor.may_start_running();
        Ok(())
    }

    /// Buffer a request and flush the buffer right away as one batch.
    ///
    /// A refused flush is returned and also reported to the failure hook.
    pub fn dispatch_now(&self, request: Request) -> Result<()> {
        let flushed = {
            let is_open = self.transmitter_open.read();
            self.ensure_open(*is_open)?;
            self.shared.buffer.lock().push(request);
            self.shared.flush()
        };
        if let Err(e) = &flushed {
            self.shared.fail(e.clone());
        }
        flushed
    }

    /// Register the callback that receives the error of any batch the queue
    /// refuses. Replaces an earlier hook.
    pub fn on_failure<F>(&self, hook: F)
    where
        F: Fn(TypeDBError) + Send + Sync + 'static,
    {
        *self.shared.on_failure.lock() = Some(Arc::new(hook));
    }

    fn ensure_open(&self, transmitter_open: bool) -> Result<()> {
        if !transmitter_open || self.shared.is_closed.load(Ordering::Acquire) {
            return Err(TypeDBError::ClientClosed);
        }
        Ok(())
    }

    /// Flush what is buffered, end the outbound queue and leave the worker.
    pub fn close(&self) {
        self.executor.deregister(self.id);
        self.shared.close();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed.load(Ordering::Acquire)
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("id", &self.id)
            .field("is_closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{RequestId, RequestPayload};
    use crate::stream::queue::request_queue;

    fn request(id: u32) -> Request {
        Request::new(RequestId(id), RequestPayload::StreamContinue)
    }

    fn ids(message: &ClientMessage) -> Vec<u32> {
        message.requests.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn test_config_default() {
        let config = TransmitterConfig::default();
        assert_eq!(config.parallelisation, DEFAULT_PARALLELISATION);
        assert_eq!(config.batch_window_small, Duration::from_millis(1));
        assert_eq!(config.batch_window_large, Duration::from_millis(3));
    }

    #[tokio::test]
    async fn test_dispatches_within_window_share_one_batch() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, mut receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();

        dispatcher.dispatch(request(1)).unwrap();
        dispatcher.dispatch(request(2)).unwrap();
        dispatcher.dispatch(request(3)).unwrap();

        let message = receiver.recv().await.unwrap();
        assert_eq!(ids(&message), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dispatch_now_skips_the_window() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, mut receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();

        dispatcher.dispatch(request(1)).unwrap();
        dispatcher.dispatch_now(request(2)).unwrap();

        let message = receiver.try_recv().expect("flushed synchronously");
        assert_eq!(ids(&message), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_close_flushes_and_ends_queue() {
        let transmitter = RequestTransmitter::new(TransmitterConfig {
            batch_window_small: Duration::from_secs(60),
            ..TransmitterConfig::default()
        });
        let (queue, mut receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();

        dispatcher.dispatch(request(7)).unwrap();
        dispatcher.close();
        dispatcher.close();

        assert_eq!(ids(&receiver.recv().await.unwrap()), vec![7]);
        assert!(receiver.recv().await.is_none());
        assert!(matches!(
            dispatcher.dispatch(request(8)),
            Err(TypeDBError::ClientClosed)
        ));
        assert_eq!(transmitter.dispatcher_counts().iter().sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_closed_transmitter_rejects_dispatch() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, mut receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();

        transmitter.close();
        transmitter.close();

        assert!(!transmitter.is_open());
        assert!(matches!(
            dispatcher.dispatch(request(1)),
            Err(TypeDBError::ClientClosed)
        ));
        assert!(matches!(
            dispatcher.dispatch_now(request(1)),
            Err(TypeDBError::ClientClosed)
        ));
        assert!(receiver.recv().await.is_none());

        let (queue, _receiver) = request_queue();
        assert!(matches!(
            transmitter.dispatcher(queue),
            Err(TypeDBError::ClientClosed)
        ));
    }

    #[tokio::test]
    async fn test_dispatchers_round_robin() {
        let transmitter = RequestTransmitter::new(TransmitterConfig {
            parallelisation: 3,
            ..TransmitterConfig::default()
        });

        let dispatchers: Vec<Dispatcher> = (0..7)
            .map(|_| transmitter.dispatcher(request_queue().0).unwrap())
            .collect();

        assert_eq!(transmitter.dispatcher_counts(), vec![3, 2, 2]);
        drop(dispatchers);
    }

    fn failure_sink(dispatcher: &Dispatcher) -> Arc<Mutex<Vec<TypeDBError>>> {
        let failures = Arc::new(Mutex::new(Vec::new()));
        let sink = failures.clone();
        dispatcher.on_failure(move |e| sink.lock().push(e));
        failures
    }

    #[tokio::test]
    async fn test_refused_batch_reaches_failure_hook() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();
        let failures = failure_sink(&dispatcher);
        drop(receiver);

        dispatcher.dispatch(request(1)).unwrap();
        for _ in 0..100 {
            if !failures.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(matches!(failures.lock().as_slice(), [TypeDBError::Io(_)]));
    }

    #[tokio::test]
    async fn test_refused_dispatch_now_fails_and_reports() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();
        let failures = failure_sink(&dispatcher);
        drop(receiver);

        assert!(matches!(
            dispatcher.dispatch_now(request(1)),
            Err(TypeDBError::Io(_))
        ));
        assert_eq!(failures.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_hook_may_close_its_dispatcher() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, receiver) = request_queue();
        let dispatcher = Arc::new(transmitter.dispatcher(queue).unwrap());
        let weak = Arc::downgrade(&dispatcher);
        dispatcher.on_failure(move |_| {
            if let Some(dispatcher) = weak.upgrade() {
                dispatcher.close();
            }
        });
        drop(receiver);

        dispatcher.dispatch(request(1)).unwrap();
        for _ in 0..100 {
            if dispatcher.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(dispatcher.is_closed());
        assert_eq!(transmitter.dispatcher_counts().iter().sum::<usize>(), 0);
    }

    #[tokio::test]
    async fn test_worker_keeps_flushing_later_dispatches() {
        let transmitter = RequestTransmitter::new(TransmitterConfig::default());
        let (queue, mut receiver) = request_queue();
        let dispatcher = transmitter.dispatcher(queue).unwrap();

        dispatcher.dispatch(request(1)).unwrap();
        assert_eq!(ids(&receiver.recv().await.unwrap()), vec![1]);

        dispatcher.dispatch(request(2)).unwrap();
        assert_eq!(ids(&receiver.recv().await.unwrap()), vec![2]);
    }
}

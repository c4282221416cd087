use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use crate::catalog::domain::CatalogService;
use crate::core::domain::{BackpressurePolicy, Configuration};
use crate::core::library::{LibraryError, LibraryResult};
use crate::reservation::domain::model::{ReservationOutcome, ReservationRequest};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum WorkerSignal {
    Running,
    // stop accepting, finish what is queued
    Drain,
    // stop accepting, report what is queued as cancelled
    Cancel,
}

/// Submit side of the reservation pipeline. Clones share the same worker queues.
#[derive(Clone)]
pub struct ReservationQueue {
    senders: Arc<Vec<mpsc::Sender<ReservationRequest>>>,
    backpressure: BackpressurePolicy,
    signal: watch::Receiver<WorkerSignal>,
}

impl ReservationQueue {
    /// Enqueues a request on the worker that owns its book. With [`BackpressurePolicy::Block`]
    /// this waits for room; with [`BackpressurePolicy::FailFast`] a full queue is reported as
    /// `QueueFull`. Once the workers are shutting down every submit fails with `Cancelled`.
    pub async fn submit(&self, request: ReservationRequest) -> LibraryResult<()> {
        if *self.signal.borrow() != WorkerSignal::Running {
            return Err(LibraryError::cancelled("reservation workers are shutting down"));
        }
        let sender = &self.senders[self.route(request.book_id)];
        match self.backpressure {
            BackpressurePolicy::Block => {
                sender.send(request).await.map_err(|_| LibraryError::cancelled(
                    format!("reservation queue closed, dropping book {}", request.book_id).as_str()))
            }
            BackpressurePolicy::FailFast => {
                sender.try_send(request).map_err(|err| match err {
                    TrySendError::Full(_) => LibraryError::queue_full(
                        format!("reservation queue full for book {}", request.book_id).as_str()),
                    TrySendError::Closed(_) => LibraryError::cancelled(
                        format!("reservation queue closed, dropping book {}", request.book_id).as_str()),
                })
            }
        }
    }

    // every request for a book lands on the same worker, so its requests stay in submit order
    pub fn route(&self, book_id: i64) -> usize {
        (book_id.unsigned_abs() % self.senders.len() as u64) as usize
    }
}

/// ReservationWorker owns the consumer tasks that apply queued reservations to the catalog.
pub struct ReservationWorker {
    signal: watch::Sender<WorkerSignal>,
    handles: Vec<JoinHandle<()>>,
}

impl ReservationWorker {
    /// Spawns `config.reservation_workers` consumers, each behind its own bounded queue. Outcomes
    /// of every request taken off a queue are sent to the returned receiver.
    pub fn start(service: Arc<dyn CatalogService>, config: &Configuration)
                 -> (Self, ReservationQueue, mpsc::UnboundedReceiver<ReservationOutcome>) {
        let workers = config.reservation_workers.max(1);
        let (signal_tx, signal_rx) = watch::channel(WorkerSignal::Running);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(consume(worker_id, service.clone(), rx,
                                              signal_rx.clone(), outcome_tx.clone())));
        }
        info!(workers, queue_capacity = config.queue_capacity, backpressure = ?config.backpressure,
            "reservation workers started");
        let queue = ReservationQueue {
            senders: Arc::new(senders),
            backpressure: config.backpressure,
            signal: signal_rx,
        };
        (Self { signal: signal_tx, handles }, queue, outcome_rx)
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Stops accepting requests, processes everything already queued and waits for the workers.
    pub async fn shutdown(self) -> LibraryResult<()> {
        self.stop(WorkerSignal::Drain).await
    }

    /// Stops accepting requests and waits for the workers. Queued requests are not applied; each
    /// one is reported as a `Cancelled` outcome. A request already being applied completes.
    pub async fn cancel(self) -> LibraryResult<()> {
        self.stop(WorkerSignal::Cancel).await
    }

    async fn stop(self, signal: WorkerSignal) -> LibraryResult<()> {
        // fails only when every worker already exited
        let _ = self.signal.send(signal);
        for handle in self.handles {
            handle.await.map_err(|err| LibraryError::cancelled(
                format!("reservation worker failed to stop {}", err).as_str()))?;
        }
        info!(signal = ?signal, "reservation workers stopped");
        Ok(())
    }
}

async fn consume(worker_id: usize, service: Arc<dyn CatalogService>,
                 mut requests: mpsc::Receiver<ReservationRequest>,
                 mut signal: watch::Receiver<WorkerSignal>,
                 outcomes: mpsc::UnboundedSender<ReservationOutcome>) {
    debug!(worker_id, "reservation worker running");
    loop {
        tokio::select! {
            biased;
            changed = signal.changed() => {
                // a dropped controller drains like a shutdown
                let next = if changed.is_ok() { *signal.borrow() } else { WorkerSignal::Drain };
                match next {
                    WorkerSignal::Running => continue,
                    WorkerSignal::Drain => {
                        requests.close();
                        while let Some(request) = requests.recv().await {
                            apply(worker_id, service.as_ref(), request, &outcomes).await;
                        }
                    }
                    WorkerSignal::Cancel => {
                        requests.close();
                        while let Some(request) = requests.recv().await {
                            warn!(worker_id, book_id = request.book_id, patron_id = request.patron_id,
                                "reservation dropped on cancel");
                            let _ = outcomes.send(ReservationOutcome {
                                request,
                                result: Err(LibraryError::cancelled(
                                    format!("reservation worker {} cancelled", worker_id).as_str())),
                            });
                        }
                    }
                }
                break;
            }
            request = requests.recv() => {
                match request {
                    Some(request) => apply(worker_id, service.as_ref(), request, &outcomes).await,
                    None => break,
                }
            }
        }
    }
    debug!(worker_id, "reservation worker exited");
}

// a failed reservation is reported and never stops the worker
async fn apply(worker_id: usize, service: &dyn CatalogService, request: ReservationRequest,
               outcomes: &mpsc::UnboundedSender<ReservationOutcome>) {
    let result = service.reserve_book(request.book_id, request.patron_id).await;
    match &result {
        Ok(token) => info!(worker_id, book_id = request.book_id, patron_id = request.patron_id,
            token = %token, "reservation applied"),
        Err(err) => warn!(worker_id, book_id = request.book_id, patron_id = request.patron_id,
            error = %err, "reservation failed"),
    }
    let _ = outcomes.send(ReservationOutcome { request, result });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use crate::books::dto::BookDto;
    use crate::catalog::domain::CatalogService;
    use crate::catalog::domain::service::CatalogServiceImpl;
    use crate::catalog::factory::build_catalog_service;
    use crate::core::domain::{BackpressurePolicy, Configuration};
    use crate::core::library::LibraryError;
    use crate::gateway::memory::publisher::MemoryPublisher;
    use crate::patrons::dto::PatronDto;
    use crate::reservation::domain::model::{ReservationOutcome, ReservationRequest};
    use crate::reservation::worker::ReservationWorker;

    async fn catalog(config: &Configuration) -> Arc<CatalogServiceImpl> {
        let svc = build_catalog_service(config, Box::new(MemoryPublisher::new()));
        svc.add_book(&BookDto::new(1, "Go Concurrency", "John Doe")).await;
        svc.add_book(&BookDto::new(2, "Parallel Programming", "Alice")).await;
        for (id, name) in [(101, "Abebe"), (102, "Sara"), (103, "Liya")] {
            let _ = svc.add_patron(&PatronDto::new(id, name)).await.expect("should add patron");
        }
        svc
    }

    async fn collect(mut outcomes: mpsc::UnboundedReceiver<ReservationOutcome>) -> Vec<ReservationOutcome> {
        let mut all = vec![];
        while let Some(outcome) = outcomes.recv().await {
            all.push(outcome);
        }
        all
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_reserve_through_worker() {
        let config = Configuration::new("test");
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);

        let mut handles = vec![];
        for (book_id, patron_id) in [(1, 101), (1, 102), (2, 103)] {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue.submit(ReservationRequest::new(book_id, patron_id)).await
            }));
        }
        for handle in handles {
            handle.await.expect("should join").expect("should submit");
        }
        worker.shutdown().await.expect("should shutdown");

        let outcomes = collect(outcomes).await;
        assert_eq!(3, outcomes.len());
        let first_book: Vec<&ReservationOutcome> = outcomes.iter().filter(|o| o.request.book_id == 1).collect();
        assert_eq!(1, first_book.iter().filter(|o| o.is_reserved()).count());
        assert!(first_book.iter().any(|o| matches!(o.result, Err(LibraryError::AlreadyUnavailable { .. }))));
        assert!(outcomes.iter().any(|o| o.request.book_id == 2 && o.is_reserved()));
        assert!(svc.list_available().await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_should_reserve_through_worker_pool() {
        let config = Configuration::new("test").with_workers(3);
        for _ in 0..20 {
            let svc = catalog(&config).await;
            let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);
            assert_eq!(3, worker.workers());

            let mut handles = vec![];
            for (book_id, patron_id) in [(1, 101), (1, 102), (2, 103)] {
                let queue = queue.clone();
                handles.push(tokio::spawn(async move {
                    queue.submit(ReservationRequest::new(book_id, patron_id)).await
                }));
            }
            for handle in handles {
                handle.await.expect("should join").expect("should submit");
            }
            worker.shutdown().await.expect("should shutdown");

            let outcomes = collect(outcomes).await;
            assert_eq!(3, outcomes.len());
            assert_eq!(1, outcomes.iter().filter(|o| o.request.book_id == 1 && o.is_reserved()).count());
            assert!(outcomes.iter().any(|o| o.request.book_id == 2 && o.is_reserved()));
            assert!(svc.list_available().await.is_empty());
        }
    }

    #[tokio::test]
    async fn test_should_continue_after_failed_reservation() {
        let config = Configuration::new("test");
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);
        queue.submit(ReservationRequest::new(9, 101)).await.expect("should submit");
        queue.submit(ReservationRequest::new(1, 101)).await.expect("should submit");
        worker.shutdown().await.expect("should shutdown");

        let outcomes = collect(outcomes).await;
        assert_eq!(2, outcomes.len());
        assert!(matches!(outcomes[0].result, Err(LibraryError::ItemNotFound { .. })));
        assert!(outcomes[1].is_reserved());
    }

    #[tokio::test]
    async fn test_should_route_book_to_same_worker() {
        let config = Configuration::new("test").with_workers(4);
        let svc = catalog(&config).await;
        let (worker, queue, _outcomes) = ReservationWorker::start(svc, &config);
        assert_eq!(4, worker.workers());
        assert_eq!(queue.route(1), queue.route(5));
        assert_eq!(queue.route(-3), queue.route(3));
        assert_ne!(queue.route(1), queue.route(2));
        worker.shutdown().await.expect("should shutdown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fail_fast_when_queue_full() {
        let config = Configuration::new("test").with_queue(1, BackpressurePolicy::FailFast);
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);

        // hold the catalog so the worker stalls on its first request
        let guard = svc.state().lock().await;
        queue.submit(ReservationRequest::new(1, 101)).await.expect("should submit");
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(ReservationRequest::new(2, 102)).await.expect("should submit");
        let res = queue.submit(ReservationRequest::new(1, 103)).await;
        assert!(matches!(res, Err(LibraryError::QueueFull { retryable: true, .. })));
        drop(guard);

        worker.shutdown().await.expect("should shutdown");
        let outcomes = collect(outcomes).await;
        assert_eq!(2, outcomes.len());
        assert!(outcomes.iter().all(|o| o.is_reserved()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_block_submit_when_queue_full() {
        let config = Configuration::new("test").with_queue(1, BackpressurePolicy::Block);
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);

        let guard = svc.state().lock().await;
        queue.submit(ReservationRequest::new(1, 101)).await.expect("should submit");
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(ReservationRequest::new(2, 102)).await.expect("should submit");
        let blocked = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.submit(ReservationRequest::new(1, 103)).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!blocked.is_finished());

        drop(guard);
        blocked.await.expect("should join").expect("should submit once room frees up");
        worker.shutdown().await.expect("should shutdown");

        let outcomes = collect(outcomes).await;
        assert_eq!(3, outcomes.len());
        assert!(outcomes[0].is_reserved());
        assert!(outcomes[1].is_reserved());
        assert!(matches!(outcomes[2].result, Err(LibraryError::AlreadyUnavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_drain_queued_on_shutdown() {
        let config = Configuration::new("test");
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);

        let guard = svc.state().lock().await;
        queue.submit(ReservationRequest::new(1, 101)).await.expect("should submit");
        queue.submit(ReservationRequest::new(2, 102)).await.expect("should submit");
        queue.submit(ReservationRequest::new(1, 103)).await.expect("should submit");
        tokio::time::sleep(Duration::from_millis(10)).await;
        let stopping = tokio::spawn(worker.shutdown());
        tokio::time::sleep(Duration::from_millis(10)).await;

        let res = queue.submit(ReservationRequest::new(2, 101)).await;
        assert!(matches!(res, Err(LibraryError::Cancelled { .. })));
        drop(guard);
        stopping.await.expect("should join").expect("should shutdown");

        let outcomes = collect(outcomes).await;
        assert_eq!(3, outcomes.len());
        assert!(outcomes[0].is_reserved());
        assert!(outcomes[1].is_reserved());
        assert!(matches!(outcomes[2].result, Err(LibraryError::AlreadyUnavailable { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_report_queued_requests_on_cancel() {
        let config = Configuration::new("test");
        let svc = catalog(&config).await;
        let (worker, queue, outcomes) = ReservationWorker::start(svc.clone(), &config);

        let guard = svc.state().lock().await;
        queue.submit(ReservationRequest::new(1, 101)).await.expect("should submit");
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.submit(ReservationRequest::new(2, 102)).await.expect("should submit");
        queue.submit(ReservationRequest::new(2, 103)).await.expect("should submit");
        let stopping = tokio::spawn(worker.cancel());
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(guard);
        stopping.await.expect("should join").expect("should cancel");

        let outcomes = collect(outcomes).await;
        assert_eq!(3, outcomes.len());
        // the request already inside the catalog completes
        assert!(outcomes[0].is_reserved());
        assert_eq!(1, outcomes[0].request.book_id);
        assert!(outcomes[1..].iter().all(|o| matches!(o.result, Err(LibraryError::Cancelled { .. }))));
        assert!(svc.find_reservation(2).await.is_none());
    }
}

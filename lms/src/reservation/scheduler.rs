use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::sync::Weak;
use std::time::Duration;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};
use crate::core::library::{LibraryError, LibraryResult};
use crate::reservation::domain::model::ReservationToken;

// ExpiryHandler is implemented by whoever owns the reservations; expire must revert the book only
// if `token` is still its current reservation and report whether it did.
#[async_trait]
pub trait ExpiryHandler: Sync + Send {
    async fn expire(&self, book_id: i64, token: ReservationToken) -> bool;
}

#[derive(Debug)]
enum ExpiryCommand {
    Schedule {
        book_id: i64,
        token: ReservationToken,
        deadline: Instant,
    },
    Cancel {
        book_id: i64,
        token: ReservationToken,
    },
}

#[derive(Debug)]
struct Timer {
    deadline: Instant,
    seq: u64,
    book_id: i64,
    token: ReservationToken,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline.cmp(&other.deadline).then(self.seq.cmp(&other.seq))
    }
}

/// Handle used by the catalog to arm and disarm reservation timers.
#[derive(Debug, Clone)]
pub struct ExpiryHandle {
    commands: mpsc::UnboundedSender<ExpiryCommand>,
}

impl ExpiryHandle {
    pub fn schedule(&self, book_id: i64, token: ReservationToken, ttl: Duration) -> LibraryResult<()> {
        let deadline = Instant::now() + ttl;
        self.commands.send(ExpiryCommand::Schedule { book_id, token, deadline })
            .map_err(|_| LibraryError::cancelled(
                format!("expiry scheduler stopped, cannot schedule book {}", book_id).as_str()))
    }

    // Best effort: a timer that already fired is not affected, the token check covers that case.
    pub fn cancel(&self, book_id: i64, token: ReservationToken) {
        let _ = self.commands.send(ExpiryCommand::Cancel { book_id, token });
    }
}

/// Single loop that owns every pending reservation timer, ordered by deadline.
///
/// Only one timer per book is armed at a time; scheduling a new token for a book disarms the
/// previous one. When a timer fires the handler is asked to revert the book, and the handler
/// compares tokens under its own lock, so a timer that races with a borrow is harmless.
pub struct ExpiryScheduler {
    commands: mpsc::UnboundedReceiver<ExpiryCommand>,
    timers: BinaryHeap<Reverse<Timer>>,
    armed: HashMap<i64, ReservationToken>,
    seq: u64,
}

impl ExpiryScheduler {
    pub fn new() -> (Self, ExpiryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = ExpiryScheduler {
            commands: rx,
            timers: BinaryHeap::new(),
            armed: HashMap::new(),
            seq: 0,
        };
        (scheduler, ExpiryHandle { commands: tx })
    }

    /// Runs until every handle is dropped or the handler is gone.
    pub async fn run(mut self, handler: Weak<dyn ExpiryHandler>) {
        debug!("expiry scheduler starting");
        loop {
            self.prune();
            let next_deadline = self.timers.peek().map(|Reverse(timer)| timer.deadline);
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(cmd) => self.apply(cmd),
                        None => break,
                    }
                }
                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    if !self.fire_due(&handler).await {
                        break;
                    }
                }
            }
        }
        debug!(pending = self.armed.len(), "expiry scheduler stopped");
    }

    fn apply(&mut self, cmd: ExpiryCommand) {
        match cmd {
            ExpiryCommand::Schedule { book_id, token, deadline } => {
                self.seq += 1;
                self.armed.insert(book_id, token);
                self.timers.push(Reverse(Timer { deadline, seq: self.seq, book_id, token }));
            }
            ExpiryCommand::Cancel { book_id, token } => {
                if self.armed.get(&book_id) == Some(&token) {
                    self.armed.remove(&book_id);
                    debug!(book_id, %token, "reservation timer cancelled");
                }
            }
        }
    }

    // drops disarmed or superseded timers from the top so the loop never sleeps on them
    fn prune(&mut self) {
        while let Some(Reverse(timer)) = self.timers.peek() {
            if self.armed.get(&timer.book_id) == Some(&timer.token) {
                return;
            }
            self.timers.pop();
        }
    }

    // returns false once the handler has been dropped
    async fn fire_due(&mut self, handler: &Weak<dyn ExpiryHandler>) -> bool {
        let now = Instant::now();
        loop {
            match self.timers.peek() {
                Some(Reverse(timer)) if timer.deadline <= now => {}
                _ => return true,
            }
            let Some(Reverse(timer)) = self.timers.pop() else {
                return true;
            };
            // disarmed or superseded timers are skipped without touching the catalog
            if self.armed.get(&timer.book_id) != Some(&timer.token) {
                continue;
            }
            self.armed.remove(&timer.book_id);
            let Some(handler) = handler.upgrade() else {
                return false;
            };
            if handler.expire(timer.book_id, timer.token).await {
                info!(book_id = timer.book_id, token = %timer.token, "reservation expired");
            } else {
                debug!(book_id = timer.book_id, token = %timer.token, "stale reservation timer ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cmp::Reverse;
    use std::sync::{Arc, Weak};
    use std::time::Duration;
    use async_trait::async_trait;
    use tokio::sync::Mutex;
    use tokio::time::Instant;
    use crate::reservation::domain::model::ReservationToken;
    use crate::reservation::scheduler::{ExpiryCommand, ExpiryHandler, ExpiryScheduler};

    #[derive(Default)]
    struct RecordingHandler {
        fired: Mutex<Vec<(i64, ReservationToken)>>,
    }

    #[async_trait]
    impl ExpiryHandler for RecordingHandler {
        async fn expire(&self, book_id: i64, token: ReservationToken) -> bool {
            self.fired.lock().await.push((book_id, token));
            true
        }
    }

    fn start() -> (Arc<RecordingHandler>, crate::reservation::scheduler::ExpiryHandle) {
        let recorder = Arc::new(RecordingHandler::default());
        let handler: Arc<dyn ExpiryHandler> = recorder.clone();
        let weak: Weak<dyn ExpiryHandler> = Arc::downgrade(&handler);
        let (scheduler, handle) = ExpiryScheduler::new();
        tokio::spawn(scheduler.run(weak));
        (recorder, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fire_after_ttl() {
        let (recorder, handle) = start();
        let token = ReservationToken::mint();
        handle.schedule(1, token, Duration::from_secs(5)).expect("should schedule");

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(recorder.fired.lock().await.is_empty());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(vec![(1, token)], *recorder.fired.lock().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_not_fire_cancelled_timer() {
        let (recorder, handle) = start();
        let token = ReservationToken::mint();
        handle.schedule(1, token, Duration::from_secs(5)).expect("should schedule");
        handle.cancel(1, token);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(recorder.fired.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_ignore_cancel_of_other_token() {
        let (recorder, handle) = start();
        let token = ReservationToken::mint();
        handle.schedule(1, token, Duration::from_secs(1)).expect("should schedule");
        handle.cancel(1, ReservationToken::mint());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(vec![(1, token)], *recorder.fired.lock().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fire_only_newest_token_per_book() {
        let (recorder, handle) = start();
        let first = ReservationToken::mint();
        let second = ReservationToken::mint();
        handle.schedule(1, first, Duration::from_secs(1)).expect("should schedule");
        handle.schedule(1, second, Duration::from_secs(3)).expect("should schedule");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(vec![(1, second)], *recorder.fired.lock().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_fire_in_deadline_order() {
        let (recorder, handle) = start();
        let late = ReservationToken::mint();
        let early = ReservationToken::mint();
        handle.schedule(1, late, Duration::from_secs(3)).expect("should schedule");
        handle.schedule(2, early, Duration::from_secs(1)).expect("should schedule");

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(vec![(2, early), (1, late)], *recorder.fired.lock().await);
    }

    #[tokio::test]
    async fn test_should_discard_cancelled_timers() {
        let (mut scheduler, _handle) = ExpiryScheduler::new();
        let now = Instant::now();
        let first = ReservationToken::mint();
        let second = ReservationToken::mint();
        let third = ReservationToken::mint();
        scheduler.apply(ExpiryCommand::Schedule { book_id: 1, token: first, deadline: now + Duration::from_secs(1) });
        scheduler.apply(ExpiryCommand::Schedule { book_id: 2, token: second, deadline: now + Duration::from_secs(2) });
        scheduler.apply(ExpiryCommand::Schedule { book_id: 2, token: third, deadline: now + Duration::from_secs(3) });
        scheduler.apply(ExpiryCommand::Cancel { book_id: 1, token: first });

        scheduler.prune();
        // the superseded timer for book 2 goes once it reaches the top
        let top = scheduler.timers.peek().map(|Reverse(timer)| timer.token);
        assert_eq!(Some(third), top);
        assert_eq!(1, scheduler.timers.len());

        scheduler.apply(ExpiryCommand::Cancel { book_id: 2, token: third });
        scheduler.prune();
        assert!(scheduler.timers.is_empty());
        assert!(scheduler.armed.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_stop_when_handler_dropped() {
        let (recorder, handle) = start();
        drop(recorder);
        handle.schedule(1, ReservationToken::mint(), Duration::from_millis(10)).expect("should schedule");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let res = handle.schedule(2, ReservationToken::mint(), Duration::from_millis(10));
        assert!(res.is_err());
    }
}

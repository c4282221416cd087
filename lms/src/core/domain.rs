use std::time::Duration;
use config::{Config, Environment};
use serde::{Deserialize, Serialize};
use crate::core::library::LibraryResult;

// Identifiable defines common traits that can be shared by catalog records
pub trait Identifiable: Sync + Send {
    fn id(&self) -> i64;
    fn version(&self) -> i64;
}

// BackpressurePolicy decides what a submitter sees when the reservation queue is full
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Copy)]
pub enum BackpressurePolicy {
    // wait until the owning worker has room
    Block,
    // reject immediately with QueueFull
    FailFast,
}

// Configuration abstracts config options for the lending engine
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Configuration {
    pub branch_id: String,
    pub reservation_ttl_ms: u64,
    pub queue_capacity: usize,
    pub reservation_workers: usize,
    pub backpressure: BackpressurePolicy,
}

impl Configuration {
    pub fn new(branch_id: &str) -> Self {
        Configuration {
            branch_id: branch_id.to_string(),
            reservation_ttl_ms: 5_000,
            queue_capacity: 10,
            reservation_workers: 1,
            backpressure: BackpressurePolicy::Block,
        }
    }

    /// Loads the configuration from `LMS_*` environment variables, e.g. `LMS_RESERVATION_TTL_MS`
    /// or `LMS_BACKPRESSURE=FailFast`. Anything not set keeps the value from [`Configuration::new`].
    pub fn from_env() -> LibraryResult<Self> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("LMS").try_parsing(true))
            .build()?;
        let mut loaded: Configuration = config.try_deserialize()?;
        // zero workers or a zero sized queue would wedge every submitter
        loaded.reservation_workers = loaded.reservation_workers.max(1);
        loaded.queue_capacity = loaded.queue_capacity.max(1);
        Ok(loaded)
    }

    pub fn reservation_ttl(&self) -> Duration {
        Duration::from_millis(self.reservation_ttl_ms)
    }

    pub fn with_reservation_ttl(mut self, ttl: Duration) -> Self {
        self.reservation_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.reservation_workers = workers.max(1);
        self
    }

    pub fn with_queue(mut self, capacity: usize, backpressure: BackpressurePolicy) -> Self {
        self.queue_capacity = capacity.max(1);
        self.backpressure = backpressure;
        self
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration::new("main")
    }
}

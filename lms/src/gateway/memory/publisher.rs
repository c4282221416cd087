use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;
use crate::core::events::{DomainEvent, DomainEventType};
use crate::core::library::LibraryResult;
use crate::gateway::events::EventPublisher;

// MemoryPublisher keeps published events in process; clones share the same buffer so a caller
// can hand one clone to the catalog and read events back from another.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(vec![])),
        }
    }

    pub async fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().await.clone()
    }

    pub async fn count(&self, kind: DomainEventType) -> usize {
        self.events.lock().await.iter().filter(|e| e.kind == kind).count()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &DomainEvent) -> LibraryResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

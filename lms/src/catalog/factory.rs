use std::sync::Arc;
use crate::catalog::domain::CatalogService;
use crate::catalog::domain::service::CatalogServiceImpl;
use crate::core::domain::Configuration;
use crate::gateway::events::EventPublisher;
use crate::gateway::factory::create_publisher;
use crate::gateway::GatewayPublisherVia;
use crate::reservation::scheduler::{ExpiryHandler, ExpiryScheduler};

// builds the catalog and spawns the expiry loop that reverts its reservations; the loop only
// holds a weak reference, so it stops once the last catalog handle is dropped.
pub(crate) fn build_catalog_service(config: &Configuration, publisher: Box<dyn EventPublisher>) -> Arc<CatalogServiceImpl> {
    let (scheduler, expiry) = ExpiryScheduler::new();
    let svc = Arc::new(CatalogServiceImpl::new(config, expiry, publisher));
    let handler: Arc<dyn ExpiryHandler> = svc.clone();
    tokio::spawn(scheduler.run(Arc::downgrade(&handler)));
    svc
}

pub async fn create_catalog_service(config: &Configuration, via: GatewayPublisherVia) -> Arc<dyn CatalogService> {
    build_catalog_service(config, create_publisher(via))
}

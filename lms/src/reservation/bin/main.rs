use std::time::Duration;
use tracing::{error, info};
use lms_lending::books::dto::BookDto;
use lms_lending::catalog::domain::CatalogService;
use lms_lending::catalog::factory::create_catalog_service;
use lms_lending::core::domain::Configuration;
use lms_lending::core::library::LibraryResult;
use lms_lending::gateway::GatewayPublisherVia;
use lms_lending::patrons::dto::PatronDto;
use lms_lending::reservation::domain::model::ReservationRequest;
use lms_lending::reservation::worker::ReservationWorker;
use lms_lending::utils::logs::setup_tracing;

// Seeds a small catalog, pushes competing reservations through the workers and waits for the
// ones that were never checked out to expire.
#[tokio::main]
async fn main() {
    setup_tracing();
    if let Err(err) = run().await {
        error!(error = %err, "reservation demo failed");
        std::process::exit(1);
    }
}

async fn run() -> LibraryResult<()> {
    let config = Configuration::from_env()?;
    info!(branch_id = %config.branch_id, ttl_ms = config.reservation_ttl_ms, "starting reservations");
    let catalog = create_catalog_service(&config, GatewayPublisherVia::Logs).await;

    catalog.add_book(&BookDto::new(1, "Go Concurrency", "John Doe")).await;
    catalog.add_book(&BookDto::new(2, "Parallel Programming", "Alice")).await;
    for (id, name) in [(101, "Abebe"), (102, "Sara"), (103, "Liya")] {
        let _ = catalog.add_patron(&PatronDto::new(id, name)).await?;
    }

    let (worker, queue, mut outcomes) = ReservationWorker::start(catalog.clone(), &config);
    info!(workers = worker.workers(), "submitting reservations");
    let mut submitters = vec![];
    for (book_id, patron_id) in [(1, 101), (1, 102), (2, 103)] {
        let queue = queue.clone();
        submitters.push(tokio::spawn(async move {
            queue.submit(ReservationRequest::new(book_id, patron_id)).await
        }));
    }
    for submitter in submitters {
        if let Ok(Err(err)) = submitter.await {
            error!(error = %err, "failed to submit reservation");
        }
    }
    worker.shutdown().await?;

    while let Some(outcome) = outcomes.recv().await {
        match outcome.result {
            Ok(token) => println!("book {} reserved by patron {} ({})",
                                  outcome.request.book_id, outcome.request.patron_id, token),
            Err(err) => println!("book {} not reserved for patron {}: {}",
                                 outcome.request.book_id, outcome.request.patron_id, err),
        }
    }
    let available: Vec<i64> = catalog.list_available().await.iter().map(|b| b.book_id).collect();
    println!("available while reserved: {:?}", available);

    tokio::time::sleep(config.reservation_ttl() + Duration::from_millis(100)).await;
    let available: Vec<i64> = catalog.list_available().await.iter().map(|b| b.book_id).collect();
    println!("available after expiry: {:?}", available);
    Ok(())
}

use esoarchive_service::{ArchiveRequest, ArchiveService};
use tower::Service;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    // Archive credentials from the environment
    let username = std::env::var("ESO_USERNAME")
        .expect("ESO_USERNAME environment variable not set");
    let password = std::env::var("ESO_PASSWORD")
        .expect("ESO_PASSWORD environment variable not set");

    let request = ArchiveRequest::new()
        .with_credentials(&username, &password)
        .with_option("instrument", "VIRCAM")
        .with_option("nightobs", "20170101")
        .with_option("output", "./data/{nightobs}")
        .with_option("max_workers", "4")
        .with_option("headless", "false"); // visible browser for debugging

    let mut service = ArchiveService::new();

    println!("=== Archive Request Demo ===");

    match service.call(request).await {
        Ok(outcome) => {
            println!(
                "Done: {} files in {}",
                outcome.files.len(),
                outcome.output.display()
            );
        }
        Err(e) => {
            eprintln!("error: {e}");
        }
    }
}

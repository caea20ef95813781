//! Basic OCI registry server example
//!
//! Run with: cargo run -p registry --example basic_server

use registry::{MemoryManifestStore, RegistryBuilder};
use storage::MemoryStorage;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Create in-memory backends
    let storage = MemoryStorage::with_buckets(&["registry"]);

    // Build the registry service
    let app = RegistryBuilder::new()
        .storage(storage.into(), "registry")
        .manifests(MemoryManifestStore::new())
        .build();

    // Bind to address
    let addr = "127.0.0.1:5000";
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("OCI Registry listening on http://{}", addr);
    tracing::info!("Try: curl http://{}/v2/", addr);

    // Serve the registry
    axum::serve(listener, app).await?;

    Ok(())
}

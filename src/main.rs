use std::sync::Arc;

use emberoom::blob::{BlobStore, FsBlobStore};
use emberoom::config::Config;
use emberoom::store::RoomStore;
use emberoom::{AppState, reaper, rooms};
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("emberoom=debug,info")),
        )
        .init();

    let config = Config::from_env();

    let blobs: Arc<dyn BlobStore> =
        Arc::new(FsBlobStore::new(config.upload_dir.clone()).expect("upload dir"));
    let store = Arc::new(RoomStore::with_grace(config.ttl, config.empty_room_grace));

    reaper::spawn(store.clone(), blobs.clone(), config.sweep_interval);

    let app = rooms::router()
        .with_state(AppState {
            store,
            blobs,
            limits: config.limits,
        })
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("bind");
    tracing::info!(addr = %config.bind_addr, "emberoom listening");
    axum::serve(listener, app).await.expect("serve");
}

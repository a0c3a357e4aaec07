use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod error;
mod store;
mod tts;

use api::routes::{create_router, AppState};
use store::SpreadsheetStore;
use tts::TtsService;

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Configuration from environment
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .expect("PORT must be a number");
    let model_dir: PathBuf = std::env::var("MODEL_DIR")
        .unwrap_or_else(|_| "./models".to_string())
        .into();
    let model_id = std::env::var("MODEL_ID").unwrap_or_else(|_| "xtts-multilingual".to_string());
    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid address");

    tracing::info!("Mnemo TTS Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Model: {}/{}.onnx", model_dir.display(), model_id);
    tracing::info!("Data directory: {}", data_dir);

    // Model loading blocks startup; the server only starts listening once
    // loading has finished (or failed, leaving /tts unavailable).
    tracing::info!("Loading synthesis model...");
    let tts = TtsService::load(&model_dir, &model_id);

    let store = SpreadsheetStore::new(data_dir);

    let state = Arc::new(AppState { tts, store });
    let app = create_router(state);

    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .await
        .expect("Server error");
}

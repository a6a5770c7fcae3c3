//! The HTTP layer: a thin axum front over the translation engine.
//!
//! The model registry and table collection are built synchronously before
//! the listener starts; request handlers only ever read them. Without a
//! configured [`Store`](crate::persistence::Store) the server answers with
//! the translated statements instead of rows, which keeps it useful as a
//! translation service and in tests.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::config::{PersistenceSettings, ServerConfig};
use crate::model::{id_manager_for, IdManager, ModelConfig, ModelRegistry};
use crate::persistence::Store;
use crate::sql::TableCollection;

use handlers::{delete_handler, get_handler, health_check};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ModelRegistry>,
    pub tables: Arc<TableCollection>,
    pub settings: PersistenceSettings,
    pub id_manager: &'static dyn IdManager,
    pub store: Option<Arc<dyn Store>>,
    pub config: ServerConfig,
}

pub async fn run() {
    dotenv().ok();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    run_with_config(config, None).await;
}

pub async fn run_with_config(config: ServerConfig, store: Option<Arc<dyn Store>>) {
    dotenv().ok();

    log::info!(
        "Server configuration: http={}:{}, ids={:?}",
        config.http_host,
        config.http_port,
        config.id_kind
    );

    // Two-phase startup: all metadata is built here, before any request is
    // accepted; afterwards it is read-only.
    let model_config = match &config.model_path {
        Some(path) => match ModelConfig::from_yaml_file(path) {
            Ok(model) => model,
            Err(e) => {
                log::error!("Failed to load model declaration: {}", e);
                std::process::exit(1);
            }
        },
        None => ModelConfig::sensorthings(),
    };
    let registry = match ModelRegistry::build(&model_config) {
        Ok(registry) => registry,
        Err(e) => {
            log::error!("Invalid model declaration: {}", e);
            std::process::exit(1);
        }
    };
    let tables = match TableCollection::build(&registry) {
        Ok(tables) => tables,
        Err(e) => {
            log::error!("Failed to build table metadata: {}", e);
            std::process::exit(1);
        }
    };

    let state = AppState {
        registry: Arc::new(registry),
        tables: Arc::new(tables),
        settings: config.settings(),
        id_manager: id_manager_for(config.id_kind),
        store,
        config: config.clone(),
    };

    let app = build_router(state);

    let address = format!("{}:{}", config.http_host, config.http_port);
    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind {}: {}", address, e);
            std::process::exit(1);
        }
    };
    log::info!("Listening on http://{}", address);

    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {}", e);
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/v1.1/{*path}", get(get_handler).delete(delete_handler))
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(Arc::new(state))
}

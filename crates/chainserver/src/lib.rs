//! HTTP surface for the chain engine.
//!
//! `POST /query` runs a node chain; `/api/nodes` and the `/api/events`
//! WebSocket expose the registry and live execution events.

mod config;
mod handlers;

pub use config::ServerConfig;

use actix_web::{error::InternalError, web, HttpResponse};
use chainnodes::NodeOptions;
use chainruntime::{ChainRuntime, RuntimeConfig};
use serde_json::json;
use std::sync::Arc;

/// Application state shared across handlers
pub struct AppState {
    pub runtime: Arc<ChainRuntime>,
    pub config: ServerConfig,
}

impl AppState {
    /// Runtime over the standard node library, file output confined to
    /// `config.output_dir`
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let registry = chainnodes::standard_registry_with(&NodeOptions {
            output_dir: Some(config.output_dir.clone()),
        })?;
        let runtime = ChainRuntime::with_registry(
            Arc::new(registry),
            RuntimeConfig {
                soft_failure: config.soft_failure,
                ..RuntimeConfig::default()
            },
        );
        Ok(Self::with_runtime(Arc::new(runtime), config))
    }

    pub fn with_runtime(runtime: Arc<ChainRuntime>, config: ServerConfig) -> Self {
        Self { runtime, config }
    }
}

/// Register every route; malformed JSON bodies answer 400 `{detail}`
pub fn configure(cfg: &mut web::ServiceConfig) {
    let json_config = web::JsonConfig::default().error_handler(|err, _req| {
        let detail = err.to_string();
        InternalError::from_response(err, HttpResponse::BadRequest().json(json!({ "detail": detail })))
            .into()
    });

    cfg.app_data(json_config)
        .service(handlers::index)
        .service(handlers::health_check)
        .service(handlers::run_query)
        .service(handlers::list_node_types)
        .service(handlers::websocket_events)
        .service(handlers::chat);
}

// Copyright 2025 R4U Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! HTTP entry point wiring every `r4u-*` crate together (spec.md §6).
//! Generalizes the teacher's `run_server`
//! (`agentreplay-server/src/lib.rs`) down to the one store, one ingestion
//! actor and one bearer gate this workspace needs, dropping its vector
//! index, semantic governor, OTLP/MCP side-servers and per-project storage
//! manager — none of those have a spec.md counterpart.

pub mod api;
pub mod auth;
pub mod config;

use anyhow::Result;
use axum::middleware as axum_middleware;
use axum::routing::{get, patch, post};
use axum::Router;
use r4u_executor::OpenAiCapability;
use r4u_ingest::IngestionActorHandle;
use r4u_optimizer::ConversationMemory;
use r4u_providers::ParserRegistry;
use r4u_storage::Storage;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::AppState;
use config::ServerConfig;

pub async fn run_server(config: ServerConfig) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "r4u_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(?config, "starting r4u-server");
    config.validate()?;

    let storage = Arc::new(match &config.storage.data_dir {
        Some(dir) => Storage::open(dir.clone())?,
        None => Storage::in_memory(),
    });
    let registry = Arc::new(ParserRegistry::with_defaults());
    let ingestion_actor = IngestionActorHandle::spawn(storage.clone());

    let mut capability = OpenAiCapability::new(config.llm.openai_api_key.clone().unwrap_or_default());
    if let Some(base_url) = &config.llm.openai_base_url {
        capability = capability.with_base_url(base_url.clone());
    }
    let capability: Arc<dyn r4u_executor::LlmCapability> = Arc::new(capability);

    let optimizer_memory = Arc::new(ConversationMemory::new());
    let config = Arc::new(config);

    let state = AppState {
        storage,
        registry,
        ingestion_actor,
        capability,
        optimizer_memory,
        config: config.clone(),
    };

    let gated_routes = Router::new()
        .route("/http-traces", post(api::ingest::ingest))
        .route("/traces", get(api::traces::list_traces).post(api::traces::create_trace))
        .route("/traces/{id}", get(api::traces::get_trace))
        .route("/v1/tasks", get(api::tasks::list_tasks).post(api::tasks::create_task))
        .route("/v1/tasks/{id}", get(api::tasks::get_task))
        .route("/v1/tasks/{id}/optimize", post(api::optimize::optimize))
        .route(
            "/test-cases/tasks/{task_id}/test-cases",
            get(api::test_cases::list).post(api::test_cases::create),
        )
        .route(
            "/test-cases/tasks/{task_id}/test-cases/{id}",
            get(api::test_cases::get)
                .patch(api::test_cases::update)
                .delete(api::test_cases::delete),
        )
        .route("/v1/graders", get(api::graders::list).post(api::graders::create))
        .route(
            "/v1/graders/{id}",
            get(api::graders::get).patch(api::graders::update).delete(api::graders::delete),
        )
        .route("/v1/grades", get(api::grades::list).post(api::grades::create))
        .route(
            "/v1/grades/{id}",
            get(api::grades::get).delete(api::grades::delete),
        )
        .route(
            "/v1/evaluations/tasks/{task_id}/config",
            get(api::evaluations::get_config)
                .post(api::evaluations::upsert_config)
                .patch(api::evaluations::upsert_config),
        )
        .route("/v1/evaluations", get(api::evaluations::list).post(api::evaluations::create))
        .route(
            "/v1/evaluations/{id}",
            get(api::evaluations::get).delete(api::evaluations::delete),
        )
        .route(
            "/executions/implementations/{id}/execute",
            post(api::executions::execute_implementation),
        )
        .route(
            "/executions/tasks/{id}/execute",
            post(api::executions::execute_task),
        )
        .route_layer(axum_middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    let app = Router::new()
        .route("/health", get(api::health::health))
        .route("/health/detailed", get(api::health::health_detailed))
        .merge(gated_routes)
        .with_state(state)
        .layer(if config.server.enable_cors {
            CorsLayer::new().allow_methods(Any).allow_headers(Any).allow_origin(Any)
        } else {
            CorsLayer::new()
        })
        .layer(TraceLayer::new_for_http());

    let addr = config.socket_addr()?;
    tracing::info!("listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

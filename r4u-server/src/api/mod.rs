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

//! HTTP handlers (spec.md §6). `ApiError`/`AppState` generalize the
//! teacher's `agentreplay-server/src/api/query.rs::{ApiError, AppState}`
//! pattern onto `r4u_core::CoreError` (spec.md §7).

pub mod evaluations;
pub mod executions;
pub mod graders;
pub mod grades;
pub mod health;
pub mod ingest;
pub mod optimize;
pub mod tasks;
pub mod test_cases;
pub mod traces;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use r4u_core::CoreError;
use r4u_ingest::IngestionActorHandle;
use r4u_optimizer::ConversationMemory;
use r4u_providers::ParserRegistry;
use r4u_storage::Storage;
use serde::Serialize;
use std::sync::Arc;

use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub registry: Arc<ParserRegistry>,
    pub ingestion_actor: IngestionActorHandle,
    pub capability: Arc<dyn r4u_executor::LlmCapability>,
    pub optimizer_memory: Arc<ConversationMemory>,
    pub config: Arc<ServerConfig>,
}

/// Maps `r4u_core::CoreError` onto HTTP status codes per spec.md §6/§7,
/// exactly like the teacher's `impl IntoResponse for ApiError`.
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            CoreError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            CoreError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            CoreError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            CoreError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        tracing::warn!(error = %self.0, "request failed");
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

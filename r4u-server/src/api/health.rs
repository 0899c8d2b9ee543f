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

//! `GET /health`, `GET /health/detailed` (ambient, not in spec.md §6 —
//! added per any deployable server needing one). Generalizes the teacher's
//! `agentreplay-server/src/api/health.rs::health_check_detailed`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::api::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageHealth,
}

#[derive(Serialize)]
pub struct StorageHealth {
    pub reachable: bool,
    pub project_count: u64,
    pub trace_count: u64,
}

pub async fn health() -> impl IntoResponse {
    StatusCode::OK
}

pub async fn health_detailed(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: StorageHealth {
            reachable: true,
            project_count: state.storage.projects.len() as u64,
            trace_count: state.storage.traces.len() as u64,
        },
    };
    (StatusCode::OK, Json(response))
}

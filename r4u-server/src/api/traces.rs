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

//! `POST /traces` (pre-parsed form), `GET /traces?project=…`,
//! `GET /traces/{id}` (spec.md §6 "Trace CRUD").

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{CoreError, Trace};
use serde::Deserialize;

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct TraceListParams {
    pub project: Option<String>,
}

pub async fn create_trace(
    State(state): State<AppState>,
    Json(mut trace): Json<Trace>,
) -> Result<impl IntoResponse, ApiError> {
    let id = state.storage.traces.next_id();
    trace.id = id;
    state.storage.traces.insert(id, trace.clone());
    Ok((StatusCode::CREATED, Json(trace)))
}

pub async fn list_traces(
    State(state): State<AppState>,
    Query(params): Query<TraceListParams>,
) -> impl IntoResponse {
    let project_id = params
        .project
        .and_then(|name| state.storage.projects.iter().into_iter().find(|p| p.name == name))
        .map(|p| p.id);

    let traces: Vec<Trace> = state
        .storage
        .traces
        .iter()
        .into_iter()
        .filter(|t| project_id.map(|id| t.project_id == id).unwrap_or(true))
        .collect();
    Json(traces)
}

pub async fn get_trace(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let trace = state
        .storage
        .traces
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("trace {id} not found")))?;
    Ok(Json(trace))
}

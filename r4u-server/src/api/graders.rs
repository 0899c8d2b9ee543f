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

//! `POST/GET /v1/graders?project_id=…`, `GET/PATCH/DELETE /v1/graders/{id}`
//! (spec.md §6 "Graders"). List entries carry `grade_count`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{CoreError, ScoreType};
use r4u_grading::{create_grader, delete_grader, list_graders, update_grader, GraderUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct ProjectIdParam {
    pub project_id: u64,
}

#[derive(Deserialize)]
pub struct CreateGraderRequest {
    pub name: String,
    pub prompt: String,
    pub score_type: ScoreType,
    pub model: String,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub temperature: Option<f64>,
    pub reasoning: Option<Value>,
    pub response_schema: Option<Value>,
}

fn default_max_output_tokens() -> u32 {
    500
}

pub async fn create(
    State(state): State<AppState>,
    Query(params): Query<ProjectIdParam>,
    Json(request): Json<CreateGraderRequest>,
) -> impl IntoResponse {
    let grader = create_grader(
        &state.storage,
        params.project_id,
        request.name,
        request.prompt,
        request.score_type,
        request.model,
        request.max_output_tokens,
        request.temperature,
        request.reasoning,
        request.response_schema,
    );
    (StatusCode::CREATED, Json(grader))
}

#[derive(Serialize)]
pub struct GraderListEntry {
    #[serde(flatten)]
    pub grader: r4u_core::Grader,
    pub grade_count: usize,
}

pub async fn list(State(state): State<AppState>, Query(params): Query<ProjectIdParam>) -> impl IntoResponse {
    let entries: Vec<GraderListEntry> = list_graders(&state.storage, params.project_id)
        .into_iter()
        .map(|(grader, grade_count)| GraderListEntry { grader, grade_count })
        .collect();
    Json(entries)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let grader = state
        .storage
        .graders
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("grader {id} not found")))?;
    Ok(Json(grader))
}

#[derive(Deserialize)]
pub struct UpdateGraderRequest {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub is_active: Option<bool>,
}

pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateGraderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let grader = update_grader(
        &state.storage,
        id,
        GraderUpdate {
            name: request.name,
            prompt: request.prompt,
            model: request.model,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            is_active: request.is_active,
        },
    )?;
    Ok(Json(grader))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    delete_grader(&state.storage, id)?;
    Ok(StatusCode::NO_CONTENT)
}

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

//! `POST /v1/grades`, `GET /v1/grades[?trace_id|execution_result_id|grader_id]`,
//! `GET/DELETE /v1/grades/{id}` (spec.md §6 "Grades"). XOR of
//! `trace_id`/`execution_result_id` is enforced by `Storage::insert_grade`,
//! which maps the violation onto `CoreError::Validation` (422).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{CoreError, Grade};
use serde::Deserialize;

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateGradeRequest {
    pub grader_id: u64,
    pub trace_id: Option<u64>,
    pub execution_result_id: Option<u64>,
    pub score_float: Option<f64>,
    pub score_boolean: Option<bool>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateGradeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = r4u_core::time::now_micros();
    let grade = Grade {
        id: 0,
        grader_id: request.grader_id,
        trace_id: request.trace_id,
        execution_result_id: request.execution_result_id,
        score_float: request.score_float,
        score_boolean: request.score_boolean,
        reasoning: request.reasoning,
        confidence: request.confidence,
        prompt_tokens: None,
        completion_tokens: None,
        total_tokens: None,
        grading_started_at: now,
        grading_completed_at: now,
        error: None,
    };
    let grade = state.storage.insert_grade(grade)?;
    Ok((StatusCode::CREATED, Json(grade)))
}

#[derive(Deserialize)]
pub struct GradeListParams {
    pub trace_id: Option<u64>,
    pub execution_result_id: Option<u64>,
    pub grader_id: Option<u64>,
}

pub async fn list(State(state): State<AppState>, Query(params): Query<GradeListParams>) -> impl IntoResponse {
    let grades: Vec<Grade> = state
        .storage
        .grades
        .iter()
        .into_iter()
        .filter(|g| params.trace_id.map(|id| g.trace_id == Some(id)).unwrap_or(true))
        .filter(|g| {
            params
                .execution_result_id
                .map(|id| g.execution_result_id == Some(id))
                .unwrap_or(true)
        })
        .filter(|g| params.grader_id.map(|id| g.grader_id == id).unwrap_or(true))
        .collect();
    Json(grades)
}

pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let grade = state
        .storage
        .grades
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("grade {id} not found")))?;
    Ok(Json(grade))
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    if state.storage.grades.get(id).is_none() {
        return Err(CoreError::NotFound(format!("grade {id} not found")).into());
    }
    state.storage.grades.remove(id);
    Ok(StatusCode::NO_CONTENT)
}

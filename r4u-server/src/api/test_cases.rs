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

//! `POST/GET/PATCH/DELETE /test-cases/tasks/{task_id}/test-cases[/{id}]`
//! (spec.md §6 "Test cases").

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::ConversationItem;
use r4u_evaluation::{
    create_test_case, delete_test_case, get_test_case, list_test_cases, update_test_case, TestCaseUpdate,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateTestCaseRequest {
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: HashMap<String, Value>,
    #[serde(default)]
    pub expected_output: Vec<ConversationItem>,
}

pub async fn create(
    State(state): State<AppState>,
    Path(task_id): Path<u64>,
    Json(request): Json<CreateTestCaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let test_case = create_test_case(
        &state.storage,
        task_id,
        request.description,
        request.arguments,
        request.expected_output,
    )?;
    Ok((StatusCode::CREATED, Json(test_case)))
}

pub async fn list(State(state): State<AppState>, Path(task_id): Path<u64>) -> impl IntoResponse {
    Json(list_test_cases(&state.storage, task_id))
}

pub async fn get(
    State(state): State<AppState>,
    Path((_task_id, test_case_id)): Path<(u64, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    let test_case = get_test_case(&state.storage, test_case_id)?;
    Ok(Json(test_case))
}

#[derive(Deserialize)]
pub struct UpdateTestCaseRequest {
    pub description: Option<String>,
    pub arguments: Option<HashMap<String, Value>>,
    pub expected_output: Option<Vec<ConversationItem>>,
}

pub async fn update(
    State(state): State<AppState>,
    Path((_task_id, test_case_id)): Path<(u64, u64)>,
    Json(request): Json<UpdateTestCaseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let test_case = update_test_case(
        &state.storage,
        test_case_id,
        TestCaseUpdate {
            description: request.description,
            arguments: request.arguments,
            expected_output: request.expected_output,
        },
    )?;
    Ok(Json(test_case))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((_task_id, test_case_id)): Path<(u64, u64)>,
) -> Result<impl IntoResponse, ApiError> {
    delete_test_case(&state.storage, test_case_id)?;
    Ok(StatusCode::NO_CONTENT)
}

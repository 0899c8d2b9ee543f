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

//! `POST /executions/implementations/{id}/execute`,
//! `POST /executions/tasks/{id}/execute` (spec.md §6 "Executions"). The
//! task-level route carries per-call overrides, materialized as a `temp`
//! Implementation (version suffixed `-temp`) so the override never becomes
//! a task's `production_version_id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{CoreError, ExecutionResult, Implementation};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::api::{ApiError, AppState};

#[derive(Deserialize, Default)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub variables: HashMap<String, Value>,
}

fn to_string_variables(variables: &HashMap<String, Value>) -> HashMap<String, String> {
    variables
        .iter()
        .map(|(k, v)| {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), rendered)
        })
        .collect()
}

pub async fn execute_implementation(
    State(state): State<AppState>,
    Path(implementation_id): Path<u64>,
    Json(request): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let implementation = state
        .storage
        .implementations
        .get(implementation_id)
        .ok_or_else(|| CoreError::NotFound(format!("implementation {implementation_id} not found")))?;

    let result = run_and_persist(&state, &implementation, &request.variables).await;
    Ok((StatusCode::CREATED, Json(result)))
}

#[derive(Deserialize)]
pub struct ExecuteTaskRequest {
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
}

pub async fn execute_task(
    State(state): State<AppState>,
    Path(task_id): Path<u64>,
    Json(request): Json<ExecuteTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .storage
        .tasks
        .get(task_id)
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;
    let production_id = task
        .production_version_id
        .ok_or_else(|| CoreError::BadRequest(format!("task {task_id} has no production implementation")))?;
    let base = state
        .storage
        .implementations
        .get(production_id)
        .ok_or_else(|| CoreError::NotFound(format!("implementation {production_id} not found")))?;

    let temp_id = state.storage.implementations.next_id();
    let temp_implementation = Implementation {
        id: temp_id,
        task_id,
        version: format!("{}-temp", base.version),
        prompt: base.prompt.clone(),
        model: request.model.unwrap_or(base.model),
        temperature: request.temperature.or(base.temperature),
        reasoning: base.reasoning,
        tools: base.tools,
        tool_choice: base.tool_choice,
        max_output_tokens: request.max_output_tokens.unwrap_or(base.max_output_tokens),
        response_schema: base.response_schema,
        temp: true,
    };
    state
        .storage
        .implementations
        .insert(temp_id, temp_implementation.clone());

    let result = run_and_persist(&state, &temp_implementation, &request.variables).await;
    Ok((StatusCode::CREATED, Json(result)))
}

async fn run_and_persist(
    state: &AppState,
    implementation: &Implementation,
    variables: &HashMap<String, Value>,
) -> ExecutionResult {
    let variables = to_string_variables(variables);
    let mut result = r4u_executor::execute(state.capability.as_ref(), implementation, Some(&variables), vec![]).await;

    if let (Some(prompt_tokens), Some(completion_tokens)) = (result.prompt_tokens, result.completion_tokens) {
        result.cost = r4u_pricing::calculate_cost(
            &implementation.model,
            prompt_tokens,
            completion_tokens,
            result.cached_tokens,
        );
    }

    let id = state.storage.execution_results.next_id();
    result.id = id;
    state.storage.execution_results.insert(id, result.clone());
    result
}

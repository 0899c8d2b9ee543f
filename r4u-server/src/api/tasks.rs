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

//! `POST /v1/tasks`, `GET /v1/tasks[?percentile=95&half_life_hours=168]`,
//! `GET /v1/tasks/{id}` (spec.md §6 "Task & Implementation"). Listings carry
//! `cost_percentile`/`latency_percentile`/`last_activity`, computed with the
//! time-decay-weighted percentile from §4.G rather than a flat one, so
//! recent `ExecutionResult`s count more than stale ones.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{time::now_micros, CoreError, Implementation, Task};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub project: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub path: Option<String>,
    pub response_schema: Option<serde_json::Value>,
    /// Optional initial Implementation — Task and Implementation are one
    /// creation group at the HTTP boundary (spec.md §6 groups them under
    /// one route pair), though every later Implementation version is
    /// produced by the matcher, executor overrides, or the optimizer.
    pub implementation: Option<CreateImplementationRequest>,
}

#[derive(Deserialize)]
pub struct CreateImplementationRequest {
    pub version: String,
    pub prompt: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub reasoning: Option<serde_json::Value>,
    pub tools: Option<serde_json::Value>,
    pub tool_choice: Option<serde_json::Value>,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    pub response_schema: Option<serde_json::Value>,
}

fn default_max_output_tokens() -> u32 {
    1024
}

#[derive(Serialize)]
pub struct TaskResponse {
    #[serde(flatten)]
    pub task: Task,
    pub implementation: Option<Implementation>,
}

pub async fn create_task(
    State(state): State<AppState>,
    Json(request): Json<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project = state.storage.ensure_project(&request.project);

    let id = state.storage.tasks.next_id();
    let task = Task {
        id,
        project_id: project.id,
        name: request.name,
        description: request.description,
        path: request.path,
        production_version_id: None,
        response_schema: request.response_schema,
    };
    state.storage.tasks.insert(id, task.clone());

    let implementation = match request.implementation {
        Some(spec) => {
            let impl_id = state.storage.implementations.next_id();
            let implementation = Implementation {
                id: impl_id,
                task_id: id,
                version: spec.version,
                prompt: spec.prompt,
                model: spec.model,
                temperature: spec.temperature,
                reasoning: spec.reasoning,
                tools: spec.tools,
                tool_choice: spec.tool_choice,
                max_output_tokens: spec.max_output_tokens,
                response_schema: spec.response_schema,
                temp: false,
            };
            state.storage.implementations.insert(impl_id, implementation.clone());
            state.storage.tasks.update(id, |t| t.production_version_id = Some(impl_id));
            Some(implementation)
        }
        None => None,
    };

    let task = state.storage.tasks.get(id).unwrap_or(task);
    Ok((StatusCode::CREATED, Json(TaskResponse { task, implementation })))
}

#[derive(Deserialize)]
pub struct TaskListParams {
    pub project: Option<String>,
    #[serde(default = "default_percentile")]
    pub percentile: f64,
    #[serde(default = "default_half_life_hours")]
    pub half_life_hours: f64,
}

fn default_percentile() -> f64 {
    95.0
}

fn default_half_life_hours() -> f64 {
    168.0
}

#[derive(Serialize)]
pub struct TaskListEntry {
    #[serde(flatten)]
    pub task: Task,
    pub cost_percentile: Option<f64>,
    pub latency_percentile: Option<f64>,
    pub last_activity: Option<i64>,
}

pub async fn list_tasks(State(state): State<AppState>, Query(params): Query<TaskListParams>) -> impl IntoResponse {
    let project_id = params
        .project
        .and_then(|name| state.storage.projects.iter().into_iter().find(|p| p.name == name))
        .map(|p| p.id);

    let now = now_micros();
    let entries: Vec<TaskListEntry> = state
        .storage
        .tasks
        .iter()
        .into_iter()
        .filter(|t| project_id.map(|id| t.project_id == id).unwrap_or(true))
        .map(|task| {
            let results = state.storage.execution_results_for_task(task.id);
            let (cost_percentile, latency_percentile, last_activity) =
                weighted_task_metrics(&results, now, params.half_life_hours, params.percentile);
            TaskListEntry {
                task,
                cost_percentile,
                latency_percentile,
                last_activity,
            }
        })
        .collect();
    Json(entries)
}

fn weighted_task_metrics(
    results: &[r4u_core::ExecutionResult],
    now: i64,
    half_life_hours: f64,
    percentile: f64,
) -> (Option<f64>, Option<f64>, Option<i64>) {
    if results.is_empty() {
        return (None, None, None);
    }

    let last_activity = results.iter().map(|r| r.completed_at).max();

    let weights: Vec<f64> = results
        .iter()
        .map(|r| r4u_pricing::time_decay_weight(r.completed_at, now, half_life_hours))
        .collect();

    let cost_rows: Vec<(f64, f64)> = results
        .iter()
        .zip(&weights)
        .filter_map(|(r, w)| r.cost.map(|c| (c, *w)))
        .collect();
    let cost_percentile = weighted_percentile_or_none(&cost_rows, percentile / 100.0);

    let latency_rows: Vec<(f64, f64)> = results.iter().zip(&weights).map(|(r, w)| (r.duration_ms(), *w)).collect();
    let latency_percentile = weighted_percentile_or_none(&latency_rows, percentile / 100.0);

    (cost_percentile, latency_percentile, last_activity)
}

fn weighted_percentile_or_none(rows: &[(f64, f64)], p: f64) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    let values: Vec<f64> = rows.iter().map(|(v, _)| *v).collect();
    let weights: Vec<f64> = rows.iter().map(|(_, w)| *w).collect();
    r4u_pricing::weighted_percentile(&values, &weights, p).ok()
}

pub async fn get_task(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let task = state
        .storage
        .tasks
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("task {id} not found")))?;
    let implementations = state.storage.implementations_for_task(id);
    Ok(Json(serde_json::json!({
        "task": task,
        "implementations": implementations,
    })))
}

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

//! `POST /v1/tasks/{id}/optimize`. Not named in spec.md §6, but the
//! overview's `operator ▶ optimize` arrow has to reach `r4u_optimizer::run`
//! somehow, and this is the workspace's only binary (see DESIGN.md Open
//! Question Decision 6). Runs in the background like evaluation creation;
//! the response only carries the id of the best implementation chosen by
//! the time the run was scheduled, not by the time it finishes — poll
//! `GET /v1/tasks/{id}` for the eventual `production_version_id`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::CoreError;
use r4u_optimizer::ChangeableField;
use serde::Deserialize;

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct OptimizeRequest {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_changeable_fields")]
    pub changeable_fields: Vec<String>,
    #[serde(default = "default_max_consecutive_no_improvements")]
    pub max_consecutive_no_improvements: u32,
}

fn default_max_iterations() -> u32 {
    5
}

fn default_changeable_fields() -> Vec<String> {
    vec!["prompt".to_string()]
}

fn default_max_consecutive_no_improvements() -> u32 {
    2
}

fn parse_changeable_field(name: &str) -> Result<ChangeableField, ApiError> {
    match name {
        "prompt" => Ok(ChangeableField::Prompt),
        "model" => Ok(ChangeableField::Model),
        "temperature" => Ok(ChangeableField::Temperature),
        "max_output_tokens" => Ok(ChangeableField::MaxOutputTokens),
        other => Err(CoreError::BadRequest(format!("unknown changeable field {other}")).into()),
    }
}

pub async fn optimize(
    State(state): State<AppState>,
    Path(task_id): Path<u64>,
    Json(request): Json<OptimizeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .storage
        .tasks
        .get(task_id)
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;

    let changeable_fields = request
        .changeable_fields
        .iter()
        .map(|f| parse_changeable_field(f))
        .collect::<Result<Vec<_>, _>>()?;

    let storage = state.storage.clone();
    let capability = state.capability.clone();
    let memory = state.optimizer_memory.clone();
    let max_iterations = request.max_iterations;
    let max_consecutive_no_improvements = request.max_consecutive_no_improvements;

    tokio::spawn(async move {
        r4u_optimizer::run(
            &storage,
            capability.as_ref(),
            &memory,
            task_id,
            max_iterations,
            &changeable_fields,
            max_consecutive_no_improvements,
        )
        .await;
    });

    Ok(StatusCode::ACCEPTED)
}

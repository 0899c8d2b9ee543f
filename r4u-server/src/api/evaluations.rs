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

//! `POST/GET/PATCH /v1/evaluations/tasks/{task_id}/config` and
//! `POST/GET/DELETE /v1/evaluations[/{id}]` (spec.md §6 "Evaluation config",
//! "Evaluations"). Config writes surface weight-sum violations as 422 via
//! `CoreError::Validation`; evaluation reads compute `cost_efficiency`,
//! `time_efficiency` and `final_score` on the fly from `TargetTaskMetrics`.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_core::{CoreError, Evaluation, TargetTaskMetrics};
use r4u_evaluation::create_or_update_evaluation_config;
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, AppState};

#[derive(Deserialize)]
pub struct EvaluationConfigRequest {
    pub weight_quality: Option<f64>,
    pub weight_cost: Option<f64>,
    pub weight_time: Option<f64>,
    pub grader_ids: Option<Vec<u64>>,
}

pub async fn upsert_config(
    State(state): State<AppState>,
    Path(task_id): Path<u64>,
    Json(request): Json<EvaluationConfigRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let weights = match (request.weight_quality, request.weight_cost, request.weight_time) {
        (None, None, None) => None,
        (q, c, t) => {
            let existing = state.storage.evaluation_configs.get(task_id);
            let (dq, dc, dt) = existing
                .map(|c| (c.weight_quality, c.weight_cost, c.weight_time))
                .unwrap_or((0.5, 0.3, 0.2));
            Some((q.unwrap_or(dq), c.unwrap_or(dc), t.unwrap_or(dt)))
        }
    };
    let config = create_or_update_evaluation_config(&state.storage, task_id, weights, request.grader_ids)?;
    Ok(Json(config))
}

pub async fn get_config(State(state): State<AppState>, Path(task_id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let config = state
        .storage
        .evaluation_configs
        .get(task_id)
        .ok_or_else(|| CoreError::NotFound(format!("evaluation config for task {task_id} not found")))?;
    Ok(Json(config))
}

#[derive(Deserialize)]
pub struct CreateEvaluationRequest {
    pub implementation_id: u64,
}

pub async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateEvaluationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let evaluation = r4u_evaluation::create_evaluation(&state.storage, request.implementation_id)?;

    let storage = state.storage.clone();
    let capability = state.capability.clone();
    let evaluation_id = evaluation.id;
    tokio::spawn(async move {
        r4u_evaluation::execute_in_background(&storage, capability.as_ref(), evaluation_id).await;
    });

    Ok((StatusCode::CREATED, Json(evaluation)))
}

#[derive(Serialize)]
pub struct EvaluationDetail {
    #[serde(flatten)]
    pub evaluation: Evaluation,
    pub cost_efficiency: Option<f64>,
    pub time_efficiency: Option<f64>,
    pub final_score: Option<f64>,
}

pub async fn get(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    let evaluation = state
        .storage
        .evaluations
        .get(id)
        .ok_or_else(|| CoreError::NotFound(format!("evaluation {id} not found")))?;
    let target = state
        .storage
        .target_metrics
        .get(evaluation.task_id)
        .unwrap_or_else(|| TargetTaskMetrics {
            task_id: evaluation.task_id,
            ..Default::default()
        });
    let config = state.storage.evaluation_configs.get(evaluation.task_id);

    let detail = EvaluationDetail {
        cost_efficiency: evaluation.cost_efficiency(&target),
        time_efficiency: evaluation.time_efficiency(&target),
        final_score: evaluation.final_score(config.as_ref(), &target),
        evaluation,
    };
    Ok(Json(detail))
}

#[derive(Deserialize)]
pub struct EvaluationListParams {
    pub implementation_id: Option<u64>,
    pub task_id: Option<u64>,
}

pub async fn list(State(state): State<AppState>, Query(params): Query<EvaluationListParams>) -> impl IntoResponse {
    let evaluations: Vec<Evaluation> = state
        .storage
        .evaluations
        .iter()
        .into_iter()
        .filter(|e| {
            params
                .implementation_id
                .map(|id| e.implementation_id == id)
                .unwrap_or(true)
        })
        .filter(|e| params.task_id.map(|id| e.task_id == id).unwrap_or(true))
        .collect();
    Json(evaluations)
}

pub async fn delete(State(state): State<AppState>, Path(id): Path<u64>) -> Result<impl IntoResponse, ApiError> {
    if state.storage.evaluations.get(id).is_none() {
        return Err(CoreError::NotFound(format!("evaluation {id} not found")).into());
    }
    state.storage.evaluations.remove(id);
    Ok(StatusCode::NO_CONTENT)
}

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

//! `POST /http-traces` (spec.md §6, §4.J, §4.K). Doubles as the SDK
//! exporter's wire endpoint: the body is exactly `r4u_sdk::HttpTracePayload`,
//! so the same type is shared by both sides of the wire instead of
//! duplicating a DTO.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use r4u_ingest::{ingest_http_trace, IngestRequest};
use r4u_sdk::HttpTracePayload;
use serde::Serialize;

use crate::api::{ApiError, AppState};

#[derive(Serialize)]
pub struct IngestResponse {
    pub id: u64,
    pub trace_id: u64,
    pub matched: bool,
}

pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<HttpTracePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let request = IngestRequest {
        project: payload.project,
        url: payload.url,
        method: payload.method,
        started_at: payload.started_at,
        completed_at: payload.completed_at,
        status_code: payload.status_code,
        error: payload.error,
        request: payload.request,
        request_headers: payload.request_headers,
        response: payload.response,
        response_headers: payload.response_headers,
        metadata: payload.metadata,
        path: payload.path,
        is_streaming: payload.is_streaming,
        streaming_response: payload.streaming_response,
        implementation_id: payload.implementation_id,
    };

    let outcome = ingest_http_trace(&state.storage, &state.registry, request);

    if outcome.needs_clustering {
        let project_id = state
            .storage
            .traces
            .get(outcome.trace_id)
            .map(|t| t.project_id)
            .ok_or_else(|| r4u_core::CoreError::Internal("trace vanished after insert".to_string()))?;
        state.ingestion_actor.enqueue_cluster_job(project_id).await;
    }

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            id: outcome.http_trace_id,
            trace_id: outcome.trace_id,
            matched: outcome.matched,
        }),
    ))
}

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

//! SDK Trace Exporter (spec §4.K).
//!
//! In-process client library: applications wrap their own outbound LLM HTTP
//! calls with [`TraceBuilder`], then hand the finished [`HttpTracePayload`]
//! to an [`Exporter`], which owns the background batching worker. Modeled on
//! the original Python client's queue-plus-worker-thread shape
//! (`original_source/sdks/python/src/r4u/client.py::R4UClient`), generalized
//! to a Tokio task over an unbounded mpsc channel.

mod exporter;
mod types;

pub use exporter::{Exporter, ExporterConfig};
pub use types::{HttpTracePayload, ProviderHint};

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Accumulates the fields of one outbound call as the instrumented call
/// site observes them, then builds the wire payload. Callers that already
/// have their own timing/byte capture can construct `HttpTracePayload`
/// directly instead.
pub struct TraceBuilder {
    project: String,
    url: String,
    method: String,
    started_at: i64,
    request: Vec<u8>,
    request_headers: HashMap<String, String>,
    path: Option<String>,
    provider_hint: Option<ProviderHint>,
}

impl TraceBuilder {
    pub fn start(project: impl Into<String>, method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            url: url.into(),
            method: method.into(),
            started_at: now_micros(),
            request: Vec::new(),
            request_headers: HashMap::new(),
            path: None,
            provider_hint: None,
        }
    }

    pub fn request_body(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.request = bytes.into();
        self
    }

    pub fn request_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn provider_hint(mut self, hint: ProviderHint) -> Self {
        self.provider_hint = Some(hint);
        self
    }

    /// Finish the call: record the response and build the payload ready for
    /// [`Exporter::submit`].
    pub fn finish(
        self,
        status_code: Option<u16>,
        error: Option<String>,
        response: impl Into<Vec<u8>>,
        response_headers: HashMap<String, String>,
    ) -> HttpTracePayload {
        let mut metadata = serde_json::json!({});
        if let Some(hint) = self.provider_hint {
            metadata["provider_hint"] = serde_json::json!(hint);
        }
        HttpTracePayload {
            project: self.project,
            url: self.url,
            method: self.method,
            started_at: self.started_at,
            completed_at: now_micros(),
            status_code,
            error,
            request: self.request,
            request_headers: self.request_headers,
            response: response.into(),
            response_headers,
            metadata,
            path: self.path,
            is_streaming: false,
            streaming_response: None,
            implementation_id: None,
        }
    }

    /// Finish a streaming call: `transcript` is the buffered SSE text
    /// accumulated while the caller consumed the stream (spec §4.K "wraps
    /// streaming responses to buffer the SSE transcript").
    pub fn finish_streaming(self, status_code: Option<u16>, error: Option<String>, transcript: String, response_headers: HashMap<String, String>) -> HttpTracePayload {
        let mut payload = self.finish(status_code, error, Vec::new(), response_headers);
        payload.is_streaming = true;
        payload.streaming_response = Some(transcript);
        payload
    }
}

fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_stamps_completed_at_no_earlier_than_started_at() {
        let builder = TraceBuilder::start("acme", "POST", "https://api.openai.com/v1/chat/completions");
        let payload = builder.finish(Some(200), None, b"{}".to_vec(), HashMap::new());
        assert!(payload.completed_at >= payload.started_at);
    }

    #[test]
    fn streaming_finish_sets_transcript_and_flag() {
        let builder = TraceBuilder::start("acme", "POST", "https://api.openai.com/v1/chat/completions").provider_hint(ProviderHint::OpenAi);
        let payload = builder.finish_streaming(Some(200), None, "data: {}\n\n".to_string(), HashMap::new());
        assert!(payload.is_streaming);
        assert_eq!(payload.streaming_response.as_deref(), Some("data: {}\n\n"));
        assert_eq!(payload.metadata["provider_hint"], serde_json::json!("open_ai"));
    }
}

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

use r4u_core::{time::now_micros, HttpTrace};
use r4u_providers::{ParseRequest, ParserRegistry};
use r4u_storage::Storage;
use std::collections::HashMap;

/// One POSTed `HTTPTrace` (spec §4.J, §6 `POST /http-traces`). `project` is
/// the app-supplied project name — [`Storage::ensure_project`] resolves or
/// creates the row (spec §3 "Project" lifecycle: "created on first
/// reference").
pub struct IngestRequest {
    pub project: String,
    pub url: String,
    pub method: String,
    pub started_at: i64,
    pub completed_at: i64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub request: Vec<u8>,
    pub request_headers: HashMap<String, String>,
    pub response: Vec<u8>,
    pub response_headers: HashMap<String, String>,
    pub metadata: serde_json::Value,
    pub path: Option<String>,
    pub is_streaming: bool,
    pub streaming_response: Option<String>,
    /// If the submitter already knows which Implementation this call
    /// realizes, matching is skipped entirely (spec §4.J step 3).
    pub implementation_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub http_trace_id: u64,
    pub trace_id: u64,
    pub matched: bool,
    /// True when the trace is still unmatched and should be handed to the
    /// clusterer (spec §4.J step 5).
    pub needs_clustering: bool,
}

/// Run the synchronous portion of the Trace Ingest Pipeline (spec §4.J
/// steps 1-4). Callers that get `needs_clustering: true` back should enqueue
/// [`crate::IngestionActorHandle::enqueue_cluster_job`] for the trace's
/// project.
pub fn ingest_http_trace(storage: &Storage, registry: &ParserRegistry, req: IngestRequest) -> IngestOutcome {
    let project = storage.ensure_project(&req.project);

    // Step 1: persist the raw HTTPTrace verbatim. Optional dedup by
    // (project, started_at, url, method): a matching row already present is
    // reused rather than duplicated.
    let http_trace_id = match find_duplicate_http_trace(storage, project.id, &req) {
        Some(existing_id) => existing_id,
        None => {
            let id = storage.http_traces.next_id();
            storage.http_traces.insert(
                id,
                HttpTrace {
                    id,
                    project_id: project.id,
                    url: req.url.clone(),
                    method: req.method.clone(),
                    started_at: req.started_at,
                    completed_at: req.completed_at,
                    status_code: req.status_code,
                    error: req.error.clone(),
                    request: req.request.clone(),
                    request_headers: req.request_headers.clone(),
                    response: req.response.clone(),
                    response_headers: req.response_headers.clone(),
                    metadata: req.metadata.clone(),
                },
            );
            id
        }
    };

    // Step 2: parse into a normalized Trace. Parser failures never abort
    // ingest (spec §7 ParserFailed); the registry's fallback parser always
    // returns *a* Trace, so this path cannot fail outright — a parser bug
    // surfaces as `error` on the Trace instead of a panic.
    let parse_request = ParseRequest {
        project_id: project.id,
        url: &req.url,
        request_bytes: &req.request,
        response_bytes: &req.response,
        started_at: req.started_at,
        completed_at: req.completed_at,
        error: req.error.clone(),
        path: req.path.clone(),
        is_streaming: req.is_streaming,
        streaming_response: req.streaming_response.as_deref(),
    };
    let mut trace = registry.parse(&parse_request);
    let trace_id = storage.traces.next_id();
    trace.id = trace_id;
    storage.traces.insert(trace_id, trace.clone());

    // Step 3/4: either trust the submitter's implementation_id, or try to
    // match against every Implementation in this project.
    let (matched, needs_clustering) = if let Some(implementation_id) = req.implementation_id {
        storage.traces.update(trace_id, |t| t.implementation_id = Some(implementation_id));
        (true, false)
    } else {
        match try_match(storage, project.id, trace_id) {
            true => (true, false),
            false => (false, true),
        }
    };

    IngestOutcome {
        http_trace_id,
        trace_id,
        matched,
        needs_clustering,
    }
}

fn find_duplicate_http_trace(storage: &Storage, project_id: u64, req: &IngestRequest) -> Option<u64> {
    storage
        .http_traces
        .iter()
        .into_iter()
        .find(|existing| {
            existing.project_id == project_id
                && existing.started_at == req.started_at
                && existing.url == req.url
                && existing.method == req.method
        })
        .map(|existing| existing.id)
}

/// Template Matcher dispatch (spec §4.J step 4): try every Implementation in
/// `project_id` whose model matches the trace's model, lowest id first,
/// stopping at the first literal match. Traces with no first message can
/// never match (there's nothing to bind placeholders against).
fn try_match(storage: &Storage, project_id: u64, trace_id: u64) -> bool {
    let Some(trace) = storage.traces.get(trace_id) else {
        return false;
    };
    let Some(first_message) = trace.first_message_text().map(str::to_string) else {
        return false;
    };

    let mut candidates: Vec<_> = storage
        .implementations
        .iter()
        .into_iter()
        .filter(|implementation| {
            storage
                .tasks
                .get(implementation.task_id)
                .map(|task| task.project_id == project_id)
                .unwrap_or(false)
                && implementation.model.eq_ignore_ascii_case(&trace.model)
        })
        .collect();
    candidates.sort_by_key(|implementation| implementation.id);

    for implementation in candidates {
        let result = r4u_matcher::match_template(&implementation.prompt, &first_message);
        if result.matched {
            let implementation_id = implementation.id;
            storage.traces.update(trace_id, |t| {
                t.implementation_id = Some(implementation_id);
                t.prompt_variables = Some(result.variables.clone());
            });
            tracing::debug!(trace_id, implementation_id, "trace matched by template");
            return true;
        }
    }
    false
}

/// Stamps `now_micros()` into `started_at`/`completed_at` when a caller
/// wants "now" semantics without importing `r4u_core::time` directly (used
/// by `r4u-server`'s ingest handler when the SDK didn't carry timestamps).
pub fn now() -> i64 {
    now_micros()
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::{Implementation, Task};

    fn base_request(url: &str, body_model: &str, content: &str) -> IngestRequest {
        let body = serde_json::json!({
            "model": body_model,
            "messages": [{"role": "system", "content": content}]
        });
        IngestRequest {
            project: "acme".to_string(),
            url: url.to_string(),
            method: "POST".to_string(),
            started_at: 0,
            completed_at: 1,
            status_code: Some(200),
            error: None,
            request: serde_json::to_vec(&body).unwrap(),
            request_headers: HashMap::new(),
            response: br#"{"id":"r1","model":"gpt-4","choices":[{"message":{"role":"assistant","content":"hi"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":2,"total_tokens":7}}"#.to_vec(),
            response_headers: HashMap::new(),
            metadata: serde_json::json!({}),
            path: Some("/api/greet".to_string()),
            is_streaming: false,
            streaming_response: None,
            implementation_id: None,
        }
    }

    #[test]
    fn unmatched_trace_requests_clustering() {
        let storage = Storage::in_memory();
        let registry = ParserRegistry::with_defaults();
        let outcome = ingest_http_trace(
            &storage,
            &registry,
            base_request("https://api.openai.com/v1/chat/completions", "gpt-4", "Greet user Alice politely."),
        );
        assert!(!outcome.matched);
        assert!(outcome.needs_clustering);
        assert!(storage.traces.get(outcome.trace_id).unwrap().implementation_id.is_none());
    }

    #[test]
    fn trace_matches_existing_implementation_by_template() {
        let storage = Storage::in_memory();
        let registry = ParserRegistry::with_defaults();

        let task_id = storage.tasks.next_id();
        storage.tasks.insert(
            task_id,
            Task {
                id: task_id,
                project_id: 1,
                name: "greet".into(),
                description: String::new(),
                path: Some("/api/greet".into()),
                production_version_id: None,
                response_schema: None,
            },
        );
        let impl_id = storage.implementations.next_id();
        storage.implementations.insert(
            impl_id,
            Implementation {
                id: impl_id,
                task_id,
                version: "0.1".into(),
                prompt: "Greet user {{name}} politely.".into(),
                model: "gpt-4".into(),
                temperature: None,
                reasoning: None,
                tools: None,
                tool_choice: None,
                max_output_tokens: 256,
                response_schema: None,
                temp: false,
            },
        );
        // ensure_project("acme") will be assigned id 1 as the first project.
        storage.ensure_project("acme");

        let outcome = ingest_http_trace(
            &storage,
            &registry,
            base_request("https://api.openai.com/v1/chat/completions", "gpt-4", "Greet user Dave politely."),
        );
        assert!(outcome.matched);
        assert!(!outcome.needs_clustering);
        let trace = storage.traces.get(outcome.trace_id).unwrap();
        assert_eq!(trace.implementation_id, Some(impl_id));
        assert_eq!(trace.prompt_variables.unwrap().get("name"), Some(&"Dave".to_string()));
    }

    #[test]
    fn duplicate_http_trace_is_deduplicated() {
        let storage = Storage::in_memory();
        let registry = ParserRegistry::with_defaults();
        let req_a = base_request("https://api.openai.com/v1/chat/completions", "gpt-4", "Greet user Alice politely.");
        let req_b = base_request("https://api.openai.com/v1/chat/completions", "gpt-4", "Greet user Bob politely.");
        let a = ingest_http_trace(&storage, &registry, req_a);
        let b = ingest_http_trace(&storage, &registry, req_b);
        assert_eq!(a.http_trace_id, b.http_trace_id);
        assert_eq!(storage.http_traces.len(), 1);
    }

    #[test]
    fn submitter_supplied_implementation_id_skips_matching() {
        let storage = Storage::in_memory();
        let registry = ParserRegistry::with_defaults();
        let mut req = base_request("https://api.openai.com/v1/chat/completions", "gpt-4", "Greet user Alice politely.");
        req.implementation_id = Some(42);
        let outcome = ingest_http_trace(&storage, &registry, req);
        assert!(outcome.matched);
        assert!(!outcome.needs_clustering);
        assert_eq!(storage.traces.get(outcome.trace_id).unwrap().implementation_id, Some(42));
    }
}

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

use crate::cluster::ClusterCandidate;
use r4u_core::{Implementation, Task};
use r4u_storage::Storage;

const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Task Auto-Creator (§4.D). Returns the bound/created task id, or `None` if
/// the cluster had no inferred template and no existing task to fall back
/// to.
///
/// The whole operation runs under `storage.tx_lock`, which both gives the
/// create path its "one transaction" and resolves the idempotence
/// requirement: two concurrent calls for the same cluster key serialize on
/// the lock, so the second call always observes the first call's newly
/// created Task and falls through to the bind-only path.
pub fn auto_create(storage: &Storage, candidate: &ClusterCandidate) -> Option<u64> {
    let _guard = storage.tx_lock.lock();

    if let Some(task) = storage.task_by_project_and_path(candidate.project_id, candidate.path.as_deref()) {
        let implementations = storage.implementations_for_task(task.id);
        if !implementations.is_empty() {
            bind_traces_to_best_implementation(storage, candidate, &implementations);
            return Some(task.id);
        }
    }

    let template = candidate.template.clone()?;

    let task_id = storage.tasks.next_id();
    let task = Task {
        id: task_id,
        project_id: candidate.project_id,
        name: format!(
            "auto: {}",
            candidate.path.clone().unwrap_or_else(|| "(no path)".to_string())
        ),
        description: "auto-created from a trace cluster".to_string(),
        path: candidate.path.clone(),
        production_version_id: None,
        response_schema: None,
    };
    storage.tasks.insert(task_id, task);

    let impl_id = storage.implementations.next_id();
    let implementation = Implementation {
        id: impl_id,
        task_id,
        version: "0.1".to_string(),
        prompt: template.clone(),
        model: candidate.model.clone(),
        temperature: None,
        reasoning: None,
        tools: None,
        tool_choice: None,
        max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        response_schema: None,
        temp: false,
    };
    storage.implementations.insert(impl_id, implementation);
    storage.tasks.update(task_id, |t| t.production_version_id = Some(impl_id));

    for trace_id in &candidate.trace_ids {
        let Some(trace) = storage.traces.get(*trace_id) else {
            continue;
        };
        let Some(text) = trace.first_message_text().map(str::to_string) else {
            continue;
        };
        let result = r4u_matcher::match_template(&template, &text);
        storage.traces.update(*trace_id, |t| {
            t.implementation_id = Some(impl_id);
            t.prompt_variables = Some(result.variables.clone());
        });
    }

    tracing::info!(task_id, impl_id, "auto-created task and implementation from trace cluster");
    Some(task_id)
}

fn bind_traces_to_best_implementation(
    storage: &Storage,
    candidate: &ClusterCandidate,
    implementations: &[Implementation],
) {
    for trace_id in &candidate.trace_ids {
        let Some(trace) = storage.traces.get(*trace_id) else {
            continue;
        };
        if trace.implementation_id.is_some() {
            continue;
        }
        let Some(text) = trace.first_message_text().map(str::to_string) else {
            continue;
        };
        for implementation in implementations {
            if !implementation.model.eq_ignore_ascii_case(&trace.model) {
                continue;
            }
            let result = r4u_matcher::match_template(&implementation.prompt, &text);
            if result.matched {
                let impl_id = implementation.id;
                storage.traces.update(*trace_id, |t| {
                    t.implementation_id = Some(impl_id);
                    t.prompt_variables = Some(result.variables.clone());
                });
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::Trace;

    fn make_trace(store: &Storage, project_id: u64, model: &str, text: &str) -> u64 {
        let id = store.traces.next_id();
        store.traces.insert(
            id,
            Trace {
                id,
                project_id,
                model: model.to_string(),
                path: Some("/api/greet".to_string()),
                input_items: vec![r4u_core::ConversationItem::message("system", text)],
                output_items: vec![],
                tools: None,
                response_schema: None,
                temperature: None,
                max_tokens: None,
                finish_reason: None,
                prompt_tokens: None,
                completion_tokens: None,
                cached_tokens: None,
                reasoning_tokens: None,
                total_tokens: None,
                system_fingerprint: None,
                started_at: 0,
                completed_at: 1,
                error: None,
                implementation_id: None,
                prompt_variables: None,
            },
        );
        id
    }

    #[test]
    fn auto_creates_task_and_implementation_from_cluster() {
        let store = Storage::in_memory();
        let id_a = make_trace(&store, 1, "gpt-4", "Greet user Alice politely.");
        let id_b = make_trace(&store, 1, "gpt-4", "Greet user Bob politely.");
        let id_c = make_trace(&store, 1, "gpt-4", "Greet user Charlie politely.");

        let candidate = ClusterCandidate {
            project_id: 1,
            path: Some("/api/greet".to_string()),
            model: "gpt-4".to_string(),
            trace_ids: vec![id_a, id_b, id_c],
            template: Some("Greet user {{var_1}} politely.".to_string()),
        };

        let task_id = auto_create(&store, &candidate).unwrap();
        let implementations = store.implementations_for_task(task_id);
        assert_eq!(implementations.len(), 1);
        assert!(implementations[0].prompt.contains("{{var_1}}"));

        let trace_a = store.traces.get(id_a).unwrap();
        assert_eq!(trace_a.implementation_id, Some(implementations[0].id));
        assert_eq!(
            trace_a.prompt_variables.unwrap().get("var_1"),
            Some(&"Alice".to_string())
        );
    }

    #[test]
    fn second_call_falls_through_to_bind_only_path() {
        let store = Storage::in_memory();
        let id_a = make_trace(&store, 1, "gpt-4", "Greet user Alice politely.");
        let candidate = ClusterCandidate {
            project_id: 1,
            path: Some("/api/greet".to_string()),
            model: "gpt-4".to_string(),
            trace_ids: vec![id_a],
            template: Some("Greet user {{var_1}} politely.".to_string()),
        };
        let first = auto_create(&store, &candidate).unwrap();
        let second = auto_create(&store, &candidate).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.tasks.len(), 1);
    }
}

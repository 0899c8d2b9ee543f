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

use crate::conversation::ConversationMemory;
use crate::select::{append_baseline, append_evaluation_feedback, build_evaluation_summary, is_improved, select_best, EvaluationSummary};
use crate::variant::{generate_variant, ChangeableField, VariantSpec};
use r4u_core::TargetTaskMetrics;
use r4u_executor::LlmCapability;
use r4u_storage::Storage;
use std::collections::HashMap;

/// Per-iteration record, mirroring spec §4.I "Record a per-iteration
/// detail".
#[derive(Debug, Clone)]
pub struct IterationDetail {
    pub iteration: u32,
    pub proposed_changes: Option<VariantSpec>,
    pub candidate_implementation_id: Option<u64>,
    pub evaluation: Option<EvaluationSummary>,
}

#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub best_implementation_id: Option<u64>,
    pub best_score: Option<f64>,
    pub iterations_run: u32,
    pub iterations: Vec<IterationDetail>,
}

/// Highest `avg_final_evaluation_score` implementation for the task, tied
/// by implementation id, falling back to `task.production_version_id` with
/// a null score when nothing has been evaluated yet (spec §4.I "Initial
/// state").
fn load_baseline(storage: &Storage, task_id: u64) -> (Option<u64>, Option<f64>) {
    let Some(task) = storage.tasks.get(task_id) else {
        return (None, None);
    };

    let mut best_id = None;
    let mut best_score: Option<f64> = None;

    for implementation in storage.implementations_for_task(task_id) {
        let evaluations: Vec<_> = storage
            .evaluations
            .iter()
            .into_iter()
            .filter(|e| e.implementation_id == implementation.id)
            .collect();
        if evaluations.is_empty() {
            continue;
        }

        let target = storage.target_metrics.get(task_id).unwrap_or_default();
        let config = storage.evaluation_configs.get(task_id);
        let scores: Vec<f64> = evaluations
            .iter()
            .filter_map(|e| e.final_score(config.as_ref(), &target))
            .collect();
        if scores.is_empty() {
            continue;
        }
        let avg = scores.iter().sum::<f64>() / scores.len() as f64;

        if best_score.is_none() || avg > best_score.unwrap() || (avg == best_score.unwrap() && implementation.id < best_id.unwrap_or(u64::MAX)) {
            best_id = Some(implementation.id);
            best_score = Some(avg);
        }
    }

    if best_id.is_none() {
        return (task.production_version_id, None);
    }
    (best_id, best_score)
}

fn available_model_names() -> Vec<String> {
    r4u_pricing::list_models().into_iter().map(str::to_string).collect()
}

/// Run iterative optimization for a task (spec §4.I `run`). Conversation
/// memory for `task_id` is reset at the start; `max_consecutive_no_improvements`
/// consecutive non-improving iterations stop the loop early.
pub async fn run(
    storage: &Storage,
    capability: &dyn LlmCapability,
    memory: &ConversationMemory,
    task_id: u64,
    max_iterations: u32,
    changeable_fields: &[ChangeableField],
    max_consecutive_no_improvements: u32,
) -> OptimizationResult {
    memory.reset(task_id);

    let (mut current_best_id, mut current_best_score) = load_baseline(storage, task_id);
    if let Some(id) = current_best_id {
        append_baseline(storage, memory, task_id, id);
    }

    let mut iterations = Vec::new();
    let mut iterations_run = 0;
    let mut consecutive_no_improvements = 0;

    for iteration_index in 0..max_iterations {
        let available_models = available_model_names();
        let config = storage.evaluation_configs.get(task_id);
        let history = memory.history(task_id);

        let candidate_spec = generate_variant(capability, changeable_fields, &available_models, config.as_ref(), &history).await;
        if let Some(spec) = &candidate_spec {
            memory.push(
                task_id,
                r4u_core::ConversationItem::message("assistant", serde_json::json!({"proposed_change": variant_json(spec)}).to_string()),
            );
        }

        let candidate_impl_id = crate::persist::persist_variant(storage, task_id, current_best_id, candidate_spec.as_ref());

        let mut candidate_scores: HashMap<u64, Option<f64>> = HashMap::new();
        if let Some(impl_id) = candidate_impl_id {
            let score = evaluate_candidate(storage, capability, impl_id).await;
            candidate_scores.insert(impl_id, score);
        }

        let (next_best_id, next_best_score) = select_best(current_best_id, current_best_score, &candidate_scores);

        let summary_ids: Vec<u64> = candidate_impl_id.into_iter().collect();
        let summaries = build_evaluation_summary(storage, &summary_ids);
        append_evaluation_feedback(memory, task_id, &summaries, next_best_id);

        iterations_run = iteration_index + 1;
        iterations.push(IterationDetail {
            iteration: iterations_run,
            proposed_changes: candidate_spec,
            candidate_implementation_id: candidate_impl_id,
            evaluation: summaries.into_iter().next(),
        });

        if is_improved(current_best_score, next_best_score) {
            consecutive_no_improvements = 0;
            if next_best_id != current_best_id {
                if let Some(id) = next_best_id {
                    append_baseline(storage, memory, task_id, id);
                }
            }
            current_best_id = next_best_id;
            current_best_score = next_best_score;
        } else {
            consecutive_no_improvements += 1;
            if consecutive_no_improvements >= max_consecutive_no_improvements {
                tracing::info!(task_id, consecutive_no_improvements, "stopping optimization, no improvement");
                break;
            }
        }
    }

    OptimizationResult {
        best_implementation_id: current_best_id,
        best_score: current_best_score,
        iterations_run,
        iterations,
    }
}

fn variant_json(spec: &VariantSpec) -> serde_json::Value {
    serde_json::json!({
        "prompt": spec.prompt,
        "model": spec.model,
        "temperature": spec.temperature,
        "max_output_tokens": spec.max_output_tokens,
        "explanation": spec.explanation,
    })
}

/// Create and run an evaluation for the candidate inline, returning its
/// final score (spec §4.I step 3 "reuses §4.H").
async fn evaluate_candidate(storage: &Storage, capability: &dyn LlmCapability, implementation_id: u64) -> Option<f64> {
    let evaluation = r4u_evaluation::create_evaluation(storage, implementation_id).ok()?;
    r4u_evaluation::execute_in_background(storage, capability, evaluation.id).await;
    let completed = storage.evaluations.get(evaluation.id)?;
    let task_id = storage.implementations.get(implementation_id)?.task_id;
    let target: TargetTaskMetrics = storage.target_metrics.get(task_id).unwrap_or_default();
    let config = storage.evaluation_configs.get(task_id);
    completed.final_score(config.as_ref(), &target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use r4u_core::{Implementation, Task, TestCase};
    use r4u_executor::{LlmRequest, LlmResponse};
    use std::collections::HashMap as StdHashMap;

    struct StubCapability;

    #[async_trait]
    impl LlmCapability for StubCapability {
        async fn complete(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
            if request.response_schema.is_some() {
                return Ok(LlmResponse {
                    result_text: Some(r#"{"temperature": 0.2, "explanation": "reduce variance"}"#.to_string()),
                    prompt_tokens: Some(50),
                    completion_tokens: Some(10),
                    ..Default::default()
                });
            }
            Ok(LlmResponse {
                result_text: Some("Pass: correct".to_string()),
                prompt_tokens: Some(100),
                completion_tokens: Some(20),
                ..Default::default()
            })
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn seed_task(storage: &Storage) -> (u64, u64) {
        let task_id = storage.tasks.next_id();
        storage.tasks.insert(
            task_id,
            Task {
                id: task_id,
                project_id: 1,
                name: "t".into(),
                description: String::new(),
                path: None,
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
                prompt: "Answer: {{question}}".into(),
                model: "gpt-4o".into(),
                temperature: Some(0.8),
                reasoning: None,
                tools: None,
                tool_choice: None,
                max_output_tokens: 256,
                response_schema: None,
                temp: false,
            },
        );
        storage.tasks.update(task_id, |t| t.production_version_id = Some(impl_id));

        let tc_id = storage.test_cases.next_id();
        let mut arguments = StdHashMap::new();
        arguments.insert("question".to_string(), serde_json::Value::String("q0".to_string()));
        storage.test_cases.insert(
            tc_id,
            TestCase {
                id: tc_id,
                task_id,
                description: None,
                arguments,
                expected_output: vec![],
            },
        );
        (task_id, impl_id)
    }

    #[tokio::test]
    async fn runs_to_max_iterations_and_tracks_best_implementation() {
        let storage = Storage::in_memory();
        let (task_id, baseline_id) = seed_task(&storage);
        let capability = StubCapability;
        let memory = ConversationMemory::new();

        let result = run(&storage, &capability, &memory, task_id, 2, &[ChangeableField::Temperature], 3).await;

        assert_eq!(result.iterations_run, 2);
        assert!(result.best_implementation_id.is_some());
        // the baseline had no prior evaluation, so any scored candidate becomes best
        assert_ne!(result.best_implementation_id, Some(baseline_id));
    }

    #[tokio::test]
    async fn stops_after_consecutive_no_improvement_limit() {
        let storage = Storage::in_memory();
        let (task_id, _) = seed_task(&storage);
        let capability = StubCapability;
        let memory = ConversationMemory::new();

        // Every candidate grades identically, so only the very first
        // iteration (no prior score to beat) counts as an improvement.
        let result = run(&storage, &capability, &memory, task_id, 5, &[ChangeableField::Temperature], 2).await;
        assert_eq!(result.iterations_run, 3);
    }

    #[tokio::test]
    async fn conversation_is_reset_at_the_start_of_each_run() {
        let storage = Storage::in_memory();
        let (task_id, _) = seed_task(&storage);
        let capability = StubCapability;
        let memory = ConversationMemory::new();

        run(&storage, &capability, &memory, task_id, 1, &[ChangeableField::Temperature], 3).await;
        let first_run_len = memory.history(task_id).len();

        run(&storage, &capability, &memory, task_id, 1, &[ChangeableField::Temperature], 3).await;
        let second_run_len = memory.history(task_id).len();

        // Had reset() not run, the second call would carry over the first
        // run's messages on top of its own.
        assert_eq!(first_run_len, second_run_len);
    }
}

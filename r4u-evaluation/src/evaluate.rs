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

use crate::config::get_all_project_graders;
use crate::target_metrics::calculate_target_metrics;
use r4u_core::{time::now_micros, CoreError, CoreResult, Evaluation, EvaluationConfig, EvaluationStatus, ScoreType};
use r4u_executor::LlmCapability;
use r4u_grading::GradingTarget;
use r4u_storage::Storage;
use serde_json::Value;
use std::collections::HashMap;

/// **create_evaluation** (spec §4.H): loads implementation+task, ensures an
/// EvaluationConfig exists (creating the `{0.5,0.3,0.2}` default and, if
/// needed, a default grader), requires at least one test case, then writes
/// a RUNNING record and returns immediately — the caller is responsible for
/// scheduling [`execute_in_background`].
pub fn create_evaluation(storage: &Storage, implementation_id: u64) -> CoreResult<Evaluation> {
    let implementation = storage
        .implementations
        .get(implementation_id)
        .ok_or_else(|| CoreError::NotFound(format!("implementation {implementation_id} not found")))?;
    let task = storage
        .tasks
        .get(implementation.task_id)
        .ok_or_else(|| CoreError::NotFound(format!("task {} not found", implementation.task_id)))?;

    let mut config = storage
        .evaluation_configs
        .get(task.id)
        .unwrap_or_else(|| EvaluationConfig::default_for_task(task.id));

    if config.grader_ids.is_empty() {
        let grader_ids = get_all_project_graders(storage, task.project_id);
        if grader_ids.is_empty() {
            return Err(CoreError::BadRequest(
                "no graders available for evaluation".to_string(),
            ));
        }
        config.grader_ids = grader_ids;
        storage.evaluation_configs.insert(task.id, config.clone());
    }

    let test_cases = storage.test_cases_for_task(task.id);
    if test_cases.is_empty() {
        return Err(CoreError::BadRequest(format!(
            "no test cases found for task {}",
            task.id
        )));
    }

    let id = storage.evaluations.next_id();
    let mut evaluation = Evaluation::new_running(id, task.id, implementation_id, now_micros());
    evaluation.test_case_count = test_cases.len();
    storage.evaluations.insert(id, evaluation.clone());
    Ok(evaluation)
}

struct RunSummary {
    grader_scores: HashMap<u64, f64>,
    quality_score: Option<f64>,
    avg_cost: Option<f64>,
    avg_execution_time_ms: Option<f64>,
}

/// **execute_in_background** (spec §4.H): runs test cases, grades the
/// results, aggregates quality/cost/time, and refreshes target metrics.
/// Any failure in that pipeline moves the evaluation to FAILED with the
/// error recorded; a missing evaluation id is a silent no-op, matching the
/// original service's "if not found, return".
pub async fn execute_in_background(storage: &Storage, capability: &dyn LlmCapability, evaluation_id: u64) {
    let Some(mut evaluation) = storage.evaluations.get(evaluation_id) else {
        tracing::warn!(evaluation_id, "evaluation not found for background execution");
        return;
    };

    match run_once(storage, capability, &evaluation).await {
        Ok(summary) => {
            evaluation.grader_scores = summary.grader_scores;
            evaluation.quality_score = summary.quality_score;
            evaluation.avg_cost = summary.avg_cost;
            evaluation.avg_execution_time_ms = summary.avg_execution_time_ms;
            evaluation.status = EvaluationStatus::Completed;
            evaluation.completed_at = Some(now_micros());
        }
        Err(err) => {
            tracing::warn!(evaluation_id, error = %err, "evaluation failed");
            evaluation.status = EvaluationStatus::Failed;
            evaluation.completed_at = Some(now_micros());
            evaluation.error = Some(err.to_string());
        }
    }

    storage.evaluations.insert(evaluation_id, evaluation);
}

async fn run_once(storage: &Storage, capability: &dyn LlmCapability, evaluation: &Evaluation) -> CoreResult<RunSummary> {
    let implementation = storage
        .implementations
        .get(evaluation.implementation_id)
        .ok_or_else(|| CoreError::NotFound(format!("implementation {} not found", evaluation.implementation_id)))?;
    let config = storage.evaluation_configs.get(evaluation.task_id);
    let test_cases = storage.test_cases_for_task(evaluation.task_id);

    let mut execution_results = Vec::with_capacity(test_cases.len());
    for test_case in &test_cases {
        let variables = arguments_to_variables(&test_case.arguments);
        let mut result = r4u_executor::execute(capability, &implementation, Some(&variables), vec![]).await;

        if let (Some(prompt_tokens), Some(completion_tokens)) = (result.prompt_tokens, result.completion_tokens) {
            result.cost = r4u_pricing::calculate_cost(
                &implementation.model,
                prompt_tokens,
                completion_tokens,
                result.cached_tokens,
            );
        }
        result.evaluation_id = Some(evaluation.id);
        result.test_case_id = Some(test_case.id);

        let id = storage.execution_results.next_id();
        result.id = id;
        storage.execution_results.insert(id, result.clone());
        execution_results.push(result);
    }

    // Commit point: ExecutionResults are visible to graders before any
    // grading begins (spec §4.H step 3).

    let grader_ids = config.as_ref().map(|c| c.grader_ids.clone()).unwrap_or_default();
    let mut grader_scores = HashMap::new();

    for grader_id in &grader_ids {
        let Some(grader) = storage.graders.get(*grader_id) else {
            continue;
        };
        let mut scores = Vec::new();
        for result in &execution_results {
            let grade = r4u_grading::execute_grading(capability, &grader, GradingTarget::ExecutionResult(result)).await?;
            let grade = storage.insert_grade(grade)?;
            match grader.score_type {
                ScoreType::Float => {
                    if let Some(v) = grade.score_float {
                        scores.push(v);
                    }
                }
                ScoreType::Boolean => {
                    if let Some(v) = grade.score_boolean {
                        scores.push(if v { 1.0 } else { 0.0 });
                    }
                }
            }
        }
        if !scores.is_empty() {
            grader_scores.insert(*grader_id, mean(&scores));
        }
    }

    let quality_score = if grader_scores.is_empty() {
        None
    } else {
        Some(mean(&grader_scores.values().copied().collect::<Vec<_>>()))
    };

    let costs: Vec<f64> = execution_results.iter().filter_map(|r| r.cost).collect();
    let avg_cost = if costs.is_empty() { None } else { Some(mean(&costs)) };

    let times: Vec<f64> = execution_results.iter().map(|r| r.duration_ms()).collect();
    let avg_execution_time_ms = if times.is_empty() { None } else { Some(mean(&times)) };

    calculate_target_metrics(storage, evaluation.task_id)?;

    Ok(RunSummary {
        grader_scores,
        quality_score,
        avg_cost,
        avg_execution_time_ms,
    })
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn arguments_to_variables(arguments: &HashMap<String, Value>) -> HashMap<String, String> {
    arguments
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

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use r4u_core::{Implementation, Task, TestCase};
    use r4u_executor::{LlmRequest, LlmResponse};

    struct StubCapability;

    #[async_trait]
    impl LlmCapability for StubCapability {
        async fn complete(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
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

    fn task_with_implementation_and_test_cases(storage: &Storage, n: usize) -> (u64, u64) {
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
                temperature: None,
                reasoning: None,
                tools: None,
                tool_choice: None,
                max_output_tokens: 256,
                response_schema: None,
                temp: false,
            },
        );
        for i in 0..n {
            let id = storage.test_cases.next_id();
            let mut arguments = HashMap::new();
            arguments.insert("question".to_string(), Value::String(format!("q{i}")));
            storage.test_cases.insert(
                id,
                TestCase {
                    id,
                    task_id,
                    description: None,
                    arguments,
                    expected_output: vec![],
                },
            );
        }
        (task_id, impl_id)
    }

    #[test]
    fn create_evaluation_rejects_missing_test_cases() {
        let storage = Storage::in_memory();
        let (_, impl_id) = task_with_implementation_and_test_cases(&storage, 0);
        let result = create_evaluation(&storage, impl_id);
        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn full_pipeline_completes_with_aggregated_scores() {
        let storage = Storage::in_memory();
        let (_, impl_id) = task_with_implementation_and_test_cases(&storage, 2);
        let evaluation = create_evaluation(&storage, impl_id).unwrap();

        let capability = StubCapability;
        execute_in_background(&storage, &capability, evaluation.id).await;

        let completed = storage.evaluations.get(evaluation.id).unwrap();
        assert_eq!(completed.status, EvaluationStatus::Completed);
        assert_eq!(completed.quality_score, Some(1.0));
        assert!(completed.avg_cost.is_some());
        assert_eq!(completed.test_case_count, 2);
    }
}

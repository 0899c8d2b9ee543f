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

use r4u_core::{time::now_micros, CoreError, CoreResult, TargetTaskMetrics};
use r4u_storage::Storage;

const OUTLIER_DETECTION_MIN_SAMPLES: usize = 5;
const IQR_MULTIPLIER: f64 = 1.5;

/// Recompute `(best_cost, best_time_ms)` for a task over all its
/// ExecutionResults and upsert `TargetTaskMetrics` (spec §4.H
/// `calculate_target_metrics`).
pub fn calculate_target_metrics(storage: &Storage, task_id: u64) -> CoreResult<TargetTaskMetrics> {
    storage
        .tasks
        .get(task_id)
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;

    let results = storage.execution_results_for_task(task_id);
    let costs: Vec<f64> = results.iter().filter_map(|r| r.cost).collect();
    let times: Vec<f64> = results.iter().map(|r| r.duration_ms()).collect();

    let metrics = TargetTaskMetrics {
        task_id,
        best_cost: best_robust_minimum(&costs),
        best_time_ms: best_robust_minimum(&times),
        last_updated_at: now_micros(),
    };
    storage.target_metrics.insert(task_id, metrics.clone());
    Ok(metrics)
}

/// Plain minimum under 5 samples; above that, an IQR-bounded minimum so a
/// single pathological run can't anchor the target forever (spec §4.H,
/// §8 "Outlier bounds").
fn best_robust_minimum(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    if values.len() < OUTLIER_DETECTION_MIN_SAMPLES {
        return values.iter().copied().reduce(f64::min);
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let q1 = r4u_pricing::percentile(&sorted, 25.0);
    let q3 = r4u_pricing::percentile(&sorted, 75.0);
    let iqr = q3 - q1;
    let lower = q1 - IQR_MULTIPLIER * iqr;
    let upper = q3 + IQR_MULTIPLIER * iqr;

    let within_bounds: Vec<f64> = sorted
        .iter()
        .copied()
        .filter(|&v| v >= lower && v <= upper)
        .collect();

    within_bounds
        .into_iter()
        .reduce(f64::min)
        .or_else(|| sorted.first().copied())
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::{ExecutionResult, Task};

    fn task(storage: &Storage) -> u64 {
        let id = storage.tasks.next_id();
        storage.tasks.insert(
            id,
            Task {
                id,
                project_id: 1,
                name: "t".into(),
                description: String::new(),
                path: None,
                production_version_id: None,
                response_schema: None,
            },
        );
        id
    }

    fn result_with_cost(storage: &Storage, task_id: u64, cost: f64) -> u64 {
        let id = storage.execution_results.next_id();
        storage.execution_results.insert(
            id,
            ExecutionResult {
                id,
                task_id,
                implementation_id: 1,
                started_at: 0,
                completed_at: 1_000,
                prompt_rendered: None,
                variables: None,
                result_text: None,
                result_json: None,
                tool_calls: None,
                error: None,
                prompt_tokens: None,
                completion_tokens: None,
                cached_tokens: None,
                reasoning_tokens: None,
                total_tokens: None,
                cost: Some(cost),
                evaluation_id: None,
                test_case_id: None,
            },
        );
        id
    }

    #[test]
    fn under_five_samples_uses_simple_minimum() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        for cost in [0.05, 0.01, 0.03] {
            result_with_cost(&storage, task_id, cost);
        }
        let metrics = calculate_target_metrics(&storage, task_id).unwrap();
        assert_eq!(metrics.best_cost, Some(0.01));
    }

    #[test]
    fn outlier_cost_does_not_move_the_target() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        for i in 1..=10 {
            result_with_cost(&storage, task_id, i as f64 / 100.0);
        }
        let baseline = calculate_target_metrics(&storage, task_id).unwrap();
        assert_eq!(baseline.best_cost, Some(0.01));

        result_with_cost(&storage, task_id, 100.0);
        let with_outlier = calculate_target_metrics(&storage, task_id).unwrap();
        assert_eq!(with_outlier.best_cost, Some(0.01));
    }

    #[test]
    fn unknown_task_is_not_found() {
        let storage = Storage::in_memory();
        assert!(matches!(
            calculate_target_metrics(&storage, 999),
            Err(CoreError::NotFound(_))
        ));
    }
}

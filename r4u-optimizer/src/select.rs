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

use r4u_core::{ConversationItem, Evaluation, TargetTaskMetrics};
use r4u_storage::Storage;
use serde_json::json;
use std::collections::HashMap;

/// Per-grader aggregate used in evaluation feedback (spec §4.I step 4).
#[derive(Debug, Clone)]
pub struct GraderSummary {
    pub score: Option<f64>,
    pub reasonings: Vec<String>,
}

/// One implementation's evaluation outcome, as reported back to the
/// optimizer agent.
#[derive(Debug, Clone)]
pub struct EvaluationSummary {
    pub implementation_id: u64,
    pub version: Option<String>,
    pub avg_cost: Option<f64>,
    pub avg_execution_time_ms: Option<f64>,
    pub final_score: Option<f64>,
    pub graders: Vec<GraderSummary>,
}

fn latest_evaluation_for_implementation(storage: &Storage, implementation_id: u64) -> Option<Evaluation> {
    storage
        .evaluations
        .iter()
        .into_iter()
        .filter(|e| e.implementation_id == implementation_id)
        .max_by_key(|e| e.completed_at.unwrap_or(i64::MIN))
}

/// Average score + up to 5 reasonings per grader, sorted by descending
/// average score with ungraded graders last (spec §4.I step 4).
fn grader_details(storage: &Storage, evaluation: &Evaluation) -> Vec<GraderSummary> {
    let result_ids: Vec<u64> = storage
        .execution_results
        .iter()
        .into_iter()
        .filter(|r| r.evaluation_id == Some(evaluation.id))
        .map(|r| r.id)
        .collect();

    let mut by_grader: HashMap<u64, (Vec<f64>, Vec<String>)> = HashMap::new();
    for grade in storage.grades.iter() {
        let Some(execution_result_id) = grade.execution_result_id else {
            continue;
        };
        if !result_ids.contains(&execution_result_id) {
            continue;
        }
        let bucket = by_grader.entry(grade.grader_id).or_default();
        if let Some(score) = grade.scalar_score() {
            bucket.0.push(score);
        }
        if let Some(reasoning) = &grade.reasoning {
            if !reasoning.trim().is_empty() {
                bucket.1.push(reasoning.clone());
            }
        }
    }

    let mut details: Vec<GraderSummary> = by_grader
        .into_values()
        .map(|(scores, mut reasonings)| {
            let score = if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            };
            reasonings.truncate(5);
            GraderSummary { score, reasonings }
        })
        .collect();

    details.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap(),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    details
}

/// Build the feedback summary for a set of implementations, one entry per
/// id (spec §4.I step 4).
pub fn build_evaluation_summary(storage: &Storage, implementation_ids: &[u64]) -> Vec<EvaluationSummary> {
    implementation_ids
        .iter()
        .map(|&implementation_id| {
            let implementation = storage.implementations.get(implementation_id);
            let evaluation = latest_evaluation_for_implementation(storage, implementation_id);

            let config = implementation
                .as_ref()
                .and_then(|i| storage.evaluation_configs.get(i.task_id));
            let target = implementation
                .as_ref()
                .and_then(|i| storage.target_metrics.get(i.task_id))
                .unwrap_or_default();

            let final_score = evaluation.as_ref().and_then(|e| e.final_score(config.as_ref(), &target));

            EvaluationSummary {
                implementation_id,
                version: implementation.map(|i| i.version),
                avg_cost: evaluation.as_ref().and_then(|e| e.avg_cost),
                avg_execution_time_ms: evaluation.as_ref().and_then(|e| e.avg_execution_time_ms),
                final_score,
                graders: evaluation.as_ref().map(|e| grader_details(storage, e)).unwrap_or_default(),
            }
        })
        .collect()
}

/// Append the evaluation summary to the per-task conversation as a
/// user-role message (spec §4.I step 4).
pub fn append_evaluation_feedback(memory: &crate::conversation::ConversationMemory, task_id: u64, summary: &[EvaluationSummary], chosen_id: Option<u64>) {
    let graders_json = |g: &GraderSummary| json!({"score": g.score, "reasonings": g.reasonings});
    let entries: Vec<_> = summary
        .iter()
        .map(|s| {
            json!({
                "implementation_id": s.implementation_id,
                "version": s.version,
                "avg_cost": s.avg_cost,
                "avg_execution_time_ms": s.avg_execution_time_ms,
                "final_score": s.final_score,
                "graders": s.graders.iter().map(graders_json).collect::<Vec<_>>(),
            })
        })
        .collect();
    let payload = json!({
        "evaluation_feedback": entries,
        "chosen_implementation_id": chosen_id,
    });
    memory.push(task_id, ConversationItem::message("user", payload.to_string()));
}

/// Append the current best implementation as context for the agent (spec
/// §4.I "append new baseline context").
pub fn append_baseline(storage: &Storage, memory: &crate::conversation::ConversationMemory, task_id: u64, implementation_id: u64) {
    let Some(implementation) = storage.implementations.get(implementation_id) else {
        return;
    };
    let payload = json!({
        "implementation_id": implementation_id,
        "version": implementation.version,
        "prompt": implementation.prompt,
        "model": implementation.model,
        "temperature": implementation.temperature,
        "max_output_tokens": implementation.max_output_tokens,
    });
    let content = format!("Current best implementation: {payload}");
    memory.push(task_id, ConversationItem::message("user", content));
}

/// Pick the best of `current` and `candidates` by final score, favoring
/// `current` on ties (spec §4.I step 5 "stability").
pub fn select_best(current_best_id: Option<u64>, current_best_score: Option<f64>, candidate_scores: &HashMap<u64, Option<f64>>) -> (Option<u64>, Option<f64>) {
    let scored: Vec<(u64, f64)> = candidate_scores.iter().filter_map(|(&id, &score)| score.map(|s| (id, s))).collect();

    let Some(&(best_candidate_id, best_candidate_score)) = scored
        .iter()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
    else {
        return (current_best_id, current_best_score);
    };

    if let Some(current) = current_best_score {
        if current >= best_candidate_score {
            return (current_best_id, current_best_score);
        }
    }
    (Some(best_candidate_id), Some(best_candidate_score))
}

/// Strictly-greater comparison, treating "no new score" as not improved and
/// "no previous score" as any new score being an improvement (spec §4.I
/// step 5).
pub fn is_improved(previous_score: Option<f64>, new_score: Option<f64>) -> bool {
    match (previous_score, new_score) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(prev), Some(new)) => new > prev,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_favor_the_current_implementation() {
        let mut candidates = HashMap::new();
        candidates.insert(2u64, Some(0.8));
        let (id, score) = select_best(Some(1), Some(0.8), &candidates);
        assert_eq!(id, Some(1));
        assert_eq!(score, Some(0.8));
    }

    #[test]
    fn strictly_better_candidate_wins() {
        let mut candidates = HashMap::new();
        candidates.insert(2u64, Some(0.9));
        let (id, score) = select_best(Some(1), Some(0.8), &candidates);
        assert_eq!(id, Some(2));
        assert_eq!(score, Some(0.9));
    }

    #[test]
    fn unscored_candidates_keep_the_current_best() {
        let mut candidates = HashMap::new();
        candidates.insert(2u64, None);
        let (id, score) = select_best(Some(1), Some(0.5), &candidates);
        assert_eq!(id, Some(1));
        assert_eq!(score, Some(0.5));
    }

    #[test]
    fn no_previous_score_means_any_score_improves() {
        assert!(is_improved(None, Some(0.1)));
        assert!(!is_improved(Some(0.5), None));
        assert!(!is_improved(Some(0.5), Some(0.5)));
        assert!(is_improved(Some(0.5), Some(0.51)));
    }
}

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

use r4u_core::{CoreError, CoreResult, EvaluationConfig, ScoreType};
use r4u_storage::Storage;

const DEFAULT_ACCURACY_PROMPT: &str =
    "You are grading whether an LLM response was accurate and correct for the \
     request it was given. Respond with JSON {\"score\": true|false, \"reasoning\": \
     \"...\"}.\n\n{{context}}";
const DEFAULT_GRADER_MODEL: &str = "gpt-4o-mini";
const DEFAULT_GRADER_MAX_OUTPUT_TOKENS: u32 = 500;

pub fn get_evaluation_config(storage: &Storage, task_id: u64) -> Option<EvaluationConfig> {
    storage.evaluation_configs.get(task_id)
}

/// Create (or overwrite) the EvaluationConfig for a task. `weights` defaults
/// to `{0.5, 0.3, 0.2}` when absent (spec §4.H).
pub fn create_or_update_evaluation_config(
    storage: &Storage,
    task_id: u64,
    weights: Option<(f64, f64, f64)>,
    grader_ids: Option<Vec<u64>>,
) -> CoreResult<EvaluationConfig> {
    let mut config = storage
        .evaluation_configs
        .get(task_id)
        .unwrap_or_else(|| EvaluationConfig::default_for_task(task_id));

    if let Some((quality, cost, time)) = weights {
        config.weight_quality = quality;
        config.weight_cost = cost;
        config.weight_time = time;
    }
    if let Some(grader_ids) = grader_ids {
        config.grader_ids = grader_ids;
    }

    if !config.weights_valid() {
        return Err(CoreError::Validation(
            "evaluation config weights must sum to 1.0 (±0.01)".to_string(),
        ));
    }

    storage.evaluation_configs.insert(task_id, config.clone());
    Ok(config)
}

/// Active graders for a project, creating a default accuracy grader the
/// first time a project has none (spec §4.H "if no graders configured").
pub fn get_all_project_graders(storage: &Storage, project_id: u64) -> Vec<u64> {
    let active: Vec<u64> = storage
        .graders
        .iter()
        .into_iter()
        .filter(|g| g.project_id == project_id && g.is_active)
        .map(|g| g.id)
        .collect();

    if !active.is_empty() {
        return active;
    }

    let default_grader = r4u_grading::create_grader(
        storage,
        project_id,
        "Accuracy".to_string(),
        DEFAULT_ACCURACY_PROMPT.to_string(),
        ScoreType::Boolean,
        DEFAULT_GRADER_MODEL.to_string(),
        DEFAULT_GRADER_MAX_OUTPUT_TOKENS,
        None,
        None,
        None,
    );
    vec![default_grader.id]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_weights_are_rejected() {
        let storage = Storage::in_memory();
        let result = create_or_update_evaluation_config(&storage, 1, Some((0.5, 0.5, 0.5)), None);
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn no_graders_creates_a_default_accuracy_grader() {
        let storage = Storage::in_memory();
        let ids = get_all_project_graders(&storage, 1);
        assert_eq!(ids.len(), 1);
        let grader = storage.graders.get(ids[0]).unwrap();
        assert_eq!(grader.name, "Accuracy");
        assert_eq!(grader.score_type, ScoreType::Boolean);
    }

    #[test]
    fn existing_active_graders_are_reused_without_creating_a_default() {
        let storage = Storage::in_memory();
        r4u_grading::create_grader(
            &storage,
            1,
            "custom".into(),
            "{{context}}".into(),
            ScoreType::Float,
            "gpt-4o".into(),
            256,
            None,
            None,
            None,
        );
        let ids = get_all_project_graders(&storage, 1);
        assert_eq!(ids.len(), 1);
        assert_eq!(storage.graders.get(ids[0]).unwrap().name, "custom");
    }
}

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

use r4u_core::{CoreError, CoreResult, Grader, ScoreType};
use r4u_storage::Storage;
use serde_json::Value;

pub fn create_grader(
    storage: &Storage,
    project_id: u64,
    name: String,
    prompt: String,
    score_type: ScoreType,
    model: String,
    max_output_tokens: u32,
    temperature: Option<f64>,
    reasoning: Option<Value>,
    response_schema: Option<Value>,
) -> Grader {
    let id = storage.graders.next_id();
    let grader = Grader {
        id,
        project_id,
        name,
        prompt,
        score_type,
        model,
        temperature,
        reasoning,
        response_schema,
        max_output_tokens,
        is_active: true,
    };
    storage.graders.insert(id, grader.clone());
    grader
}

/// Per-field patch for [`update_grader`]; `None` leaves the field
/// untouched, matching the original service's "only set non-null updates"
/// rule.
#[derive(Default)]
pub struct GraderUpdate {
    pub name: Option<String>,
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub is_active: Option<bool>,
}

pub fn update_grader(storage: &Storage, grader_id: u64, update: GraderUpdate) -> CoreResult<Grader> {
    let mut grader = storage
        .graders
        .get(grader_id)
        .ok_or_else(|| CoreError::NotFound(format!("grader {grader_id} not found")))?;

    if let Some(name) = update.name {
        grader.name = name;
    }
    if let Some(prompt) = update.prompt {
        grader.prompt = prompt;
    }
    if let Some(model) = update.model {
        grader.model = model;
    }
    if let Some(temperature) = update.temperature {
        grader.temperature = Some(temperature);
    }
    if let Some(max_output_tokens) = update.max_output_tokens {
        grader.max_output_tokens = max_output_tokens;
    }
    if let Some(is_active) = update.is_active {
        grader.is_active = is_active;
    }

    storage.graders.insert(grader_id, grader.clone());
    Ok(grader)
}

/// Delete a grader and cascade its grades (spec §3 "cascaded on grader
/// delete").
pub fn delete_grader(storage: &Storage, grader_id: u64) -> CoreResult<()> {
    if storage.graders.get(grader_id).is_none() {
        return Err(CoreError::NotFound(format!("grader {grader_id} not found")));
    }
    storage.delete_grader_cascade(grader_id);
    Ok(())
}

/// List a project's graders with how many grades each has produced.
pub fn list_graders(storage: &Storage, project_id: u64) -> Vec<(Grader, usize)> {
    storage
        .graders
        .iter()
        .into_iter()
        .filter(|g| g.project_id == project_id)
        .map(|grader| {
            let count = storage
                .grades
                .iter()
                .into_iter()
                .filter(|grade| grade.grader_id == grader.id)
                .count();
            (grader, count)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grader(storage: &Storage) -> Grader {
        create_grader(
            storage,
            1,
            "exactness".into(),
            "Judge: {{context}}".into(),
            ScoreType::Float,
            "gpt-4o".into(),
            256,
            None,
            None,
            None,
        )
    }

    #[test]
    fn update_only_touches_supplied_fields() {
        let storage = Storage::in_memory();
        let g = grader(&storage);
        let updated = update_grader(
            &storage,
            g.id,
            GraderUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.prompt, g.prompt);
    }

    #[test]
    fn delete_cascades_grades() {
        let storage = Storage::in_memory();
        let g = grader(&storage);
        let grade = r4u_core::Grade {
            id: 0,
            grader_id: g.id,
            trace_id: Some(1),
            execution_result_id: None,
            score_float: Some(1.0),
            score_boolean: None,
            reasoning: None,
            confidence: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            grading_started_at: 0,
            grading_completed_at: 0,
            error: None,
        };
        storage.insert_grade(grade).unwrap();

        delete_grader(&storage, g.id).unwrap();
        assert!(storage.graders.get(g.id).is_none());
        assert_eq!(list_graders(&storage, 1).len(), 0);
    }
}

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

use r4u_core::{ConversationItem, CoreError, CoreResult, TestCase};
use r4u_storage::Storage;
use serde_json::Value;
use std::collections::HashMap;

pub fn create_test_case(
    storage: &Storage,
    task_id: u64,
    description: Option<String>,
    arguments: HashMap<String, Value>,
    expected_output: Vec<ConversationItem>,
) -> CoreResult<TestCase> {
    storage
        .tasks
        .get(task_id)
        .ok_or_else(|| CoreError::NotFound(format!("task {task_id} not found")))?;

    let id = storage.test_cases.next_id();
    let test_case = TestCase {
        id,
        task_id,
        description,
        arguments,
        expected_output,
    };
    storage.test_cases.insert(id, test_case.clone());
    Ok(test_case)
}

pub fn get_test_case(storage: &Storage, test_case_id: u64) -> CoreResult<TestCase> {
    storage
        .test_cases
        .get(test_case_id)
        .ok_or_else(|| CoreError::NotFound(format!("test case {test_case_id} not found")))
}

pub fn list_test_cases(storage: &Storage, task_id: u64) -> Vec<TestCase> {
    storage.test_cases_for_task(task_id)
}

/// Per-field patch for [`update_test_case`]; `None` leaves the field
/// untouched.
#[derive(Default)]
pub struct TestCaseUpdate {
    pub description: Option<String>,
    pub arguments: Option<HashMap<String, Value>>,
    pub expected_output: Option<Vec<ConversationItem>>,
}

pub fn update_test_case(storage: &Storage, test_case_id: u64, update: TestCaseUpdate) -> CoreResult<TestCase> {
    let mut test_case = get_test_case(storage, test_case_id)?;

    if let Some(description) = update.description {
        test_case.description = Some(description);
    }
    if let Some(arguments) = update.arguments {
        test_case.arguments = arguments;
    }
    if let Some(expected_output) = update.expected_output {
        test_case.expected_output = expected_output;
    }

    storage.test_cases.insert(test_case_id, test_case.clone());
    Ok(test_case)
}

pub fn delete_test_case(storage: &Storage, test_case_id: u64) -> CoreResult<()> {
    get_test_case(storage, test_case_id)?;
    storage.test_cases.remove(test_case_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::Task;

    fn task(storage: &Storage) -> Task {
        let id = storage.tasks.next_id();
        let task = Task {
            id,
            project_id: 1,
            name: "t".into(),
            description: String::new(),
            path: None,
            production_version_id: None,
            response_schema: None,
        };
        storage.tasks.insert(id, task.clone());
        task
    }

    #[test]
    fn create_rejects_unknown_task() {
        let storage = Storage::in_memory();
        let result = create_test_case(&storage, 42, None, HashMap::new(), vec![]);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn update_only_touches_supplied_fields() {
        let storage = Storage::in_memory();
        let t = task(&storage);
        let tc = create_test_case(&storage, t.id, Some("d".into()), HashMap::new(), vec![]).unwrap();
        let updated = update_test_case(
            &storage,
            tc.id,
            TestCaseUpdate {
                description: Some("updated".into()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.description, Some("updated".to_string()));
        assert_eq!(updated.arguments, tc.arguments);
    }
}

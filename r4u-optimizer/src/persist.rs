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

use crate::variant::VariantSpec;
use r4u_core::Implementation;
use r4u_storage::Storage;

fn parse_major_version(version: Option<&str>) -> u64 {
    version
        .and_then(|v| v.split('.').next())
        .and_then(|p| p.parse().ok())
        .unwrap_or(0)
}

fn parse_minor_version(version: &str, expected_major: u64) -> Option<u64> {
    let mut parts = version.split('.');
    let major: u64 = parts.next()?.parse().ok()?;
    if major != expected_major {
        return None;
    }
    parts.next()?.parse().ok()
}

/// `1 + max(existing minor under `major`)` across all implementations of the
/// task (spec §4.I step 2).
fn calculate_next_minor_version(storage: &Storage, task_id: u64, major: u64) -> u64 {
    let max_minor = storage
        .implementations_for_task(task_id)
        .iter()
        .filter_map(|i| parse_minor_version(&i.version, major))
        .max()
        .unwrap_or(0);
    max_minor + 1
}

/// Build the new Implementation row from a variant spec, inheriting any
/// field the spec left unset from `current`. Returns `None` when
/// `prompt`/`model`/`max_output_tokens` cannot be resolved even after
/// inheritance (spec §4.I step 2 "skip variant").
fn build_implementation(spec: &VariantSpec, current: Option<&Implementation>, task_id: u64, version: String) -> Option<Implementation> {
    let prompt = spec.prompt.clone().or_else(|| current.map(|c| c.prompt.clone()))?;
    let model = spec.model.clone().or_else(|| current.map(|c| c.model.clone()))?;
    let max_output_tokens = spec.max_output_tokens.or_else(|| current.map(|c| c.max_output_tokens))?;

    Some(Implementation {
        id: 0,
        task_id,
        version,
        prompt,
        model,
        temperature: spec.temperature.or_else(|| current.and_then(|c| c.temperature)),
        reasoning: current.and_then(|c| c.reasoning.clone()),
        tools: current.and_then(|c| c.tools.clone()),
        tool_choice: current.and_then(|c| c.tool_choice.clone()),
        max_output_tokens,
        response_schema: current.and_then(|c| c.response_schema.clone()),
        temp: false,
    })
}

/// Persist `spec` as a new Implementation for `task_id`, returning its id.
/// `None` in, `None` out (no variant to persist); `None` out also when
/// required fields cannot be resolved.
pub fn persist_variant(storage: &Storage, task_id: u64, current_implementation_id: Option<u64>, spec: Option<&VariantSpec>) -> Option<u64> {
    let spec = spec?;
    let current = current_implementation_id.and_then(|id| storage.implementations.get(id));

    let major = parse_major_version(current.as_ref().map(|c| c.version.as_str()));
    let next_minor = calculate_next_minor_version(storage, task_id, major);
    let version = format!("{major}.{next_minor}");

    let implementation = build_implementation(spec, current.as_ref(), task_id, version)?;
    let id = storage.implementations.next_id();
    let mut implementation = implementation;
    implementation.id = id;
    storage.implementations.insert(id, implementation);
    Some(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use r4u_core::Task;

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

    fn implementation(storage: &Storage, task_id: u64, version: &str) -> u64 {
        let id = storage.implementations.next_id();
        storage.implementations.insert(
            id,
            Implementation {
                id,
                task_id,
                version: version.to_string(),
                prompt: "baseline prompt".into(),
                model: "gpt-4o".into(),
                temperature: Some(0.5),
                reasoning: None,
                tools: None,
                tool_choice: None,
                max_output_tokens: 200,
                response_schema: None,
                temp: false,
            },
        );
        id
    }

    #[test]
    fn inherits_unspecified_fields_and_bumps_minor_version() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        let baseline_id = implementation(&storage, task_id, "0.1");

        let spec = VariantSpec {
            temperature: Some(0.2),
            ..Default::default()
        };
        let new_id = persist_variant(&storage, task_id, Some(baseline_id), Some(&spec)).unwrap();
        let created = storage.implementations.get(new_id).unwrap();
        assert_eq!(created.version, "0.2");
        assert_eq!(created.prompt, "baseline prompt");
        assert_eq!(created.model, "gpt-4o");
        assert_eq!(created.temperature, Some(0.2));
    }

    #[test]
    fn no_baseline_and_missing_required_field_is_skipped() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        let spec = VariantSpec {
            temperature: Some(0.3),
            ..Default::default()
        };
        assert!(persist_variant(&storage, task_id, None, Some(&spec)).is_none());
    }

    #[test]
    fn none_spec_persists_nothing() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        assert!(persist_variant(&storage, task_id, None, None).is_none());
    }

    #[test]
    fn next_minor_scans_all_implementations_under_the_same_major() {
        let storage = Storage::in_memory();
        let task_id = task(&storage);
        implementation(&storage, task_id, "0.1");
        implementation(&storage, task_id, "0.3");
        let spec = VariantSpec {
            temperature: Some(0.1),
            ..Default::default()
        };
        let baseline_id = implementation(&storage, task_id, "0.3");
        let new_id = persist_variant(&storage, task_id, Some(baseline_id), Some(&spec)).unwrap();
        assert_eq!(storage.implementations.get(new_id).unwrap().version, "0.4");
    }
}

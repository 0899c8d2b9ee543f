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

use r4u_core::{ConversationItem, ExecutionResult, Trace};

/// What a grader is being asked to judge — exactly one of a raw `Trace` or
/// an `ExecutionResult` produced by the executor (spec §4.F step 1).
pub enum GradingTarget<'a> {
    Trace(&'a Trace),
    ExecutionResult(&'a ExecutionResult),
}

/// Flatten a target into the text a grading prompt's `{{context}}`
/// placeholder is substituted with (spec §4.F step 2).
pub fn build_context(target: &GradingTarget<'_>) -> String {
    match target {
        GradingTarget::Trace(trace) => build_trace_context(trace),
        GradingTarget::ExecutionResult(result) => build_execution_result_context(result),
    }
}

fn build_trace_context(trace: &Trace) -> String {
    let mut parts = vec![
        format!("Model: {}", trace.model),
        format!("Path: {}", trace.path.as_deref().unwrap_or("N/A")),
    ];

    if let Some(error) = &trace.error {
        parts.push(format!("Error: {error}"));
    }

    if !trace.input_items.is_empty() {
        parts.push("\nInput History:".to_string());
        for item in &trace.input_items {
            if let ConversationItem::Message { role, content } = item {
                parts.push(format!("  [{role}]: {content}"));
            }
        }
    }

    if !trace.output_items.is_empty() {
        parts.push("\nOutput:".to_string());
        for item in &trace.output_items {
            parts.push(format!("  {}", item.as_text()));
        }
    }

    parts.join("\n")
}

fn build_execution_result_context(result: &ExecutionResult) -> String {
    let mut parts = vec![
        format!("Task ID: {}", result.task_id),
        format!("Implementation ID: {}", result.implementation_id),
        format!(
            "Rendered Prompt: {}",
            result.prompt_rendered.as_deref().unwrap_or("N/A")
        ),
    ];

    if let Some(text) = &result.result_text {
        parts.push(format!("Result: {text}"));
    }

    if let Some(json) = &result.result_json {
        parts.push(format!("Result JSON: {json}"));
    }

    if let Some(error) = &result.error {
        parts.push(format!("Error: {error}"));
    }

    if let Some(variables) = &result.variables {
        if let Ok(json) = serde_json::to_string(variables) {
            parts.push(format!("Variables: {json}"));
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace() -> Trace {
        Trace {
            id: 1,
            project_id: 1,
            model: "gpt-4o".into(),
            path: Some("/chat".into()),
            input_items: vec![ConversationItem::message("user", "hello")],
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
            completed_at: 0,
            error: None,
            implementation_id: None,
            prompt_variables: None,
        }
    }

    #[test]
    fn trace_context_includes_input_messages() {
        let t = trace();
        let ctx = build_context(&GradingTarget::Trace(&t));
        assert!(ctx.contains("Model: gpt-4o"));
        assert!(ctx.contains("[user]: hello"));
    }

    #[test]
    fn trace_context_without_error_omits_error_line() {
        let t = trace();
        let ctx = build_context(&GradingTarget::Trace(&t));
        assert!(!ctx.contains("Error:"));
    }
}

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

use crate::capability::{LlmCapability, LlmRequest};
use crate::template::placeholder_names;
use r4u_core::{time::now_micros, ConversationItem, ExecutionResult, Implementation};
use std::collections::HashMap;

/// Run one Implementation against `capability`. Never returns `Err` — every
/// failure (missing variable, provider error) is recorded on the returned
/// `ExecutionResult.error` instead, per the "no partial-success hiding"
/// policy: callers always get a row to persist.
///
/// `id`/`evaluation_id`/`test_case_id` are left at their defaults; the
/// caller assigns `id` from storage and fills the other two when this run
/// is part of an evaluation.
pub async fn execute(
    capability: &dyn LlmCapability,
    implementation: &Implementation,
    variables: Option<&HashMap<String, String>>,
    input_items: Vec<ConversationItem>,
) -> ExecutionResult {
    let started_at = now_micros();
    let empty = HashMap::new();
    let variables = variables.unwrap_or(&empty);

    if let Some(missing) = first_missing_variable(&implementation.prompt, variables) {
        return ExecutionResult {
            id: 0,
            task_id: implementation.task_id,
            implementation_id: implementation.id,
            started_at,
            completed_at: now_micros(),
            prompt_rendered: None,
            variables: Some(variables.clone()),
            result_text: None,
            result_json: None,
            tool_calls: None,
            error: Some(format!("missing variable {missing}")),
            prompt_tokens: None,
            completion_tokens: None,
            cached_tokens: None,
            reasoning_tokens: None,
            total_tokens: None,
            cost: None,
            evaluation_id: None,
            test_case_id: None,
        };
    }

    let prompt_rendered = r4u_matcher::render(&implementation.prompt, variables);

    let request = LlmRequest {
        model: implementation.model.clone(),
        system_prompt: prompt_rendered.clone(),
        input_items,
        temperature: implementation.temperature,
        max_output_tokens: implementation.max_output_tokens,
        reasoning: implementation.reasoning.clone(),
        tools: implementation.tools.clone(),
        tool_choice: implementation.tool_choice.clone(),
        response_schema: implementation.response_schema.clone(),
    };

    let mut result = ExecutionResult {
        id: 0,
        task_id: implementation.task_id,
        implementation_id: implementation.id,
        started_at,
        completed_at: started_at,
        prompt_rendered: Some(prompt_rendered),
        variables: Some(variables.clone()),
        result_text: None,
        result_json: None,
        tool_calls: None,
        error: None,
        prompt_tokens: None,
        completion_tokens: None,
        cached_tokens: None,
        reasoning_tokens: None,
        total_tokens: None,
        cost: None,
        evaluation_id: None,
        test_case_id: None,
    };

    match capability.complete(request).await {
        Ok(response) => {
            result.result_text = response.result_text;
            result.result_json = response.result_json;
            result.tool_calls = response.tool_calls;
            result.prompt_tokens = response.prompt_tokens;
            result.completion_tokens = response.completion_tokens;
            result.cached_tokens = response.cached_tokens;
            result.reasoning_tokens = response.reasoning_tokens;
            result.total_tokens = response
                .total_tokens
                .or_else(|| match (response.prompt_tokens, response.completion_tokens) {
                    (Some(p), Some(c)) => Some(p + c),
                    _ => None,
                });
        }
        Err(err) => {
            tracing::warn!(provider = capability.name(), error = %err, "llm call failed");
            result.error = Some(err.to_string());
        }
    }

    result.completed_at = now_micros();
    result
}

fn first_missing_variable(prompt: &str, variables: &HashMap<String, String>) -> Option<String> {
    placeholder_names(prompt)
        .into_iter()
        .find(|name| !variables.contains_key(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::LlmResponse;
    use async_trait::async_trait;

    struct StubCapability {
        response: anyhow::Result<LlmResponse>,
    }

    #[async_trait]
    impl LlmCapability for StubCapability {
        async fn complete(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            match &self.response {
                Ok(r) => Ok(r.clone()),
                Err(e) => Err(anyhow::anyhow!(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn implementation(prompt: &str) -> Implementation {
        Implementation {
            id: 1,
            task_id: 1,
            version: "0.1".into(),
            prompt: prompt.to_string(),
            model: "gpt-4".into(),
            temperature: None,
            reasoning: None,
            tools: None,
            tool_choice: None,
            max_output_tokens: 256,
            response_schema: None,
            temp: false,
        }
    }

    #[tokio::test]
    async fn missing_variable_skips_the_call() {
        let capability = StubCapability {
            response: Ok(LlmResponse::default()),
        };
        let impl_ = implementation("Hello {{name}}");
        let result = execute(&capability, &impl_, None, vec![]).await;
        assert_eq!(result.error, Some("missing variable name".to_string()));
        assert!(result.prompt_rendered.is_none());
    }

    #[tokio::test]
    async fn successful_call_populates_result_and_tokens() {
        let capability = StubCapability {
            response: Ok(LlmResponse {
                result_text: Some("hi Alice".to_string()),
                prompt_tokens: Some(10),
                completion_tokens: Some(5),
                ..Default::default()
            }),
        };
        let impl_ = implementation("Hello {{name}}");
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Alice".to_string());
        let result = execute(&capability, &impl_, Some(&vars), vec![]).await;
        assert!(result.error.is_none());
        assert_eq!(result.prompt_rendered, Some("Hello Alice".to_string()));
        assert_eq!(result.total_tokens, Some(15));
    }

    #[tokio::test]
    async fn provider_error_is_recorded_not_raised() {
        let capability = StubCapability {
            response: Err(anyhow::anyhow!("rate limited")),
        };
        let impl_ = implementation("Hello");
        let result = execute(&capability, &impl_, None, vec![]).await;
        assert_eq!(result.error, Some("rate limited".to_string()));
        assert!(result.result_text.is_none());
    }
}

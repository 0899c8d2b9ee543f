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

use crate::context::{build_context, GradingTarget};
use crate::parse::parse_grading_response;
use crate::render::render_grading_prompt;
use r4u_core::{time::now_micros, CoreError, CoreResult, Grade, Grader, Implementation};
use r4u_executor::LlmCapability;

/// Grade `target` with `grader` (spec §4.F). Rejects an inactive grader
/// up front; every failure past that point (prompt rendering, the LLM call
/// itself) is recorded on the returned `Grade.error` rather than raised, so
/// the caller always has a row to persist.
pub async fn execute_grading(
    capability: &dyn LlmCapability,
    grader: &Grader,
    target: GradingTarget<'_>,
) -> CoreResult<Grade> {
    if !grader.is_active {
        return Err(CoreError::BadRequest(format!(
            "grader {} is not active",
            grader.id
        )));
    }

    let (trace_id, execution_result_id) = match &target {
        GradingTarget::Trace(t) => (Some(t.id), None),
        GradingTarget::ExecutionResult(r) => (None, Some(r.id)),
    };

    let started_at = now_micros();
    let context = build_context(&target);

    let rendered_prompt = match render_grading_prompt(&grader.prompt, &context) {
        Ok(p) => p,
        Err(err) => {
            return Ok(Grade {
                id: 0,
                grader_id: grader.id,
                trace_id,
                execution_result_id,
                score_float: None,
                score_boolean: None,
                reasoning: None,
                confidence: None,
                prompt_tokens: None,
                completion_tokens: None,
                total_tokens: None,
                grading_started_at: started_at,
                grading_completed_at: now_micros(),
                error: Some(err),
            });
        }
    };

    // A grader has no task of its own; `task_id: 0` mirrors the throwaway
    // value the original service stamped on its ephemeral implementation.
    let synthetic_implementation = Implementation {
        id: 0,
        task_id: 0,
        version: "grader".to_string(),
        prompt: rendered_prompt,
        model: grader.model.clone(),
        temperature: grader.temperature,
        reasoning: grader.reasoning.clone(),
        tools: None,
        tool_choice: None,
        max_output_tokens: grader.max_output_tokens,
        response_schema: grader.response_schema.clone(),
        temp: true,
    };

    let execution = r4u_executor::execute(capability, &synthetic_implementation, None, vec![]).await;
    let completed_at = now_micros();

    let (score_float, score_boolean, reasoning, confidence) = if execution.error.is_none() {
        parse_grading_response(
            grader.score_type,
            execution.result_text.as_deref(),
            execution.result_json.as_ref(),
        )
    } else {
        (None, None, None, None)
    };

    Ok(Grade {
        id: 0,
        grader_id: grader.id,
        trace_id,
        execution_result_id,
        score_float,
        score_boolean,
        reasoning,
        confidence,
        prompt_tokens: execution.prompt_tokens,
        completion_tokens: execution.completion_tokens,
        total_tokens: execution.total_tokens,
        grading_started_at: started_at,
        grading_completed_at: completed_at,
        error: execution.error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use r4u_core::{ScoreType, Trace};
    use r4u_executor::{LlmRequest, LlmResponse};

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

    fn grader() -> Grader {
        Grader {
            id: 1,
            project_id: 1,
            name: "exactness".into(),
            prompt: "Judge the following: {{context}}".into(),
            score_type: ScoreType::Boolean,
            model: "gpt-4o".into(),
            temperature: None,
            reasoning: None,
            response_schema: None,
            max_output_tokens: 256,
            is_active: true,
        }
    }

    fn trace() -> Trace {
        Trace {
            id: 7,
            project_id: 1,
            model: "gpt-4o".into(),
            path: None,
            input_items: vec![r4u_core::ConversationItem::message("user", "2+2?")],
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

    #[tokio::test]
    async fn inactive_grader_is_rejected() {
        let mut g = grader();
        g.is_active = false;
        let capability = StubCapability {
            response: Ok(LlmResponse::default()),
        };
        let t = trace();
        let result = execute_grading(&capability, &g, GradingTarget::Trace(&t)).await;
        assert!(matches!(result, Err(CoreError::BadRequest(_))));
    }

    #[tokio::test]
    async fn successful_grade_persists_trace_target_and_score() {
        let g = grader();
        let capability = StubCapability {
            response: Ok(LlmResponse {
                result_text: Some("Pass, the answer is correct".to_string()),
                prompt_tokens: Some(20),
                completion_tokens: Some(8),
                ..Default::default()
            }),
        };
        let t = trace();
        let grade = execute_grading(&capability, &g, GradingTarget::Trace(&t))
            .await
            .unwrap();
        assert_eq!(grade.trace_id, Some(7));
        assert_eq!(grade.execution_result_id, None);
        assert_eq!(grade.score_boolean, Some(true));
        assert!(grade.error.is_none());
        assert_eq!(grade.total_tokens, Some(28));
    }

    #[tokio::test]
    async fn provider_failure_is_recorded_on_the_grade_not_raised() {
        let g = grader();
        let capability = StubCapability {
            response: Err(anyhow::anyhow!("rate limited")),
        };
        let t = trace();
        let grade = execute_grading(&capability, &g, GradingTarget::Trace(&t))
            .await
            .unwrap();
        assert_eq!(grade.error, Some("rate limited".to_string()));
        assert!(grade.score_boolean.is_none());
    }
}

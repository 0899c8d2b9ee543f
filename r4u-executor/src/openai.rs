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

//! HTTP-backed [`LlmCapability`] against an OpenAI-compatible chat
//! completions endpoint (spec §4.E notes), generalizing the teacher's
//! `LLMProvider`/`OpenAIProvider` (`agentreplay-server/src/llm/providers.rs`)
//! into a plain `reqwest` JSON client rather than the typed `async-openai`
//! client the teacher uses — this workspace has many provider-shaped callers
//! (executor, grader, optimizer agent) that all want the same
//! any-compatible-endpoint request/response shape, not just OpenAI's own API.

use crate::capability::{LlmCapability, LlmRequest, LlmResponse};
use r4u_core::ConversationItem;
use serde_json::{json, Value};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiCapability {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCapability {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_body(&self, request: &LlmRequest) -> Value {
        let mut messages = vec![json!({"role": "system", "content": request.system_prompt})];
        messages.extend(request.input_items.iter().map(message_json));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_output_tokens,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = tools.clone();
        }
        if let Some(tool_choice) = &request.tool_choice {
            body["tool_choice"] = tool_choice.clone();
        }
        if let Some(schema) = &request.response_schema {
            body["response_format"] = json!({"type": "json_schema", "json_schema": {"name": "response", "schema": schema}});
        }
        body
    }
}

fn message_json(item: &ConversationItem) -> Value {
    match item {
        ConversationItem::Message { role, content } => json!({"role": role, "content": content}),
        ConversationItem::ToolResult { call_id, result, .. } => {
            json!({"role": "tool", "tool_call_id": call_id, "content": result})
        }
        other => json!({"role": "assistant", "content": other.as_text()}),
    }
}

#[async_trait::async_trait]
impl LlmCapability for OpenAiCapability {
    async fn complete(&self, request: LlmRequest) -> anyhow::Result<LlmResponse> {
        let body = self.build_body(&request);
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let payload: Value = response.json().await?;
        if !status.is_success() {
            anyhow::bail!("openai-compatible endpoint returned {status}: {payload}");
        }

        let choice = &payload["choices"][0];
        let message = &choice["message"];
        let result_text = message["content"].as_str().map(str::to_string);
        let usage = &payload["usage"];

        Ok(LlmResponse {
            result_text,
            result_json: None,
            tool_calls: None,
            prompt_tokens: usage["prompt_tokens"].as_u64().map(|v| v as u32),
            completion_tokens: usage["completion_tokens"].as_u64().map(|v| v as u32),
            cached_tokens: usage["prompt_tokens_details"]["cached_tokens"].as_u64().map(|v| v as u32),
            reasoning_tokens: usage["completion_tokens_details"]["reasoning_tokens"].as_u64().map(|v| v as u32),
            total_tokens: usage["total_tokens"].as_u64().map(|v| v as u32),
            system_fingerprint: payload["system_fingerprint"].as_str().map(str::to_string),
        })
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_body_carries_schema_as_json_schema_response_format() {
        let capability = OpenAiCapability::new("sk-test");
        let request = LlmRequest {
            model: "gpt-4o".to_string(),
            system_prompt: "be terse".to_string(),
            input_items: vec![ConversationItem::message("user", "hi")],
            temperature: Some(0.2),
            max_output_tokens: 128,
            reasoning: None,
            tools: None,
            tool_choice: None,
            response_schema: Some(json!({"type": "object"})),
        };
        let body = capability.build_body(&request);
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}

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

use r4u_core::ConversationItem;
use serde_json::Value;

/// Everything the executor sends to a model, already rendered.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub model: String,
    pub system_prompt: String,
    pub input_items: Vec<ConversationItem>,
    pub temperature: Option<f64>,
    pub max_output_tokens: u32,
    pub reasoning: Option<Value>,
    pub tools: Option<Value>,
    pub tool_choice: Option<Value>,
    pub response_schema: Option<Value>,
}

/// What a provider call reports back. `total_tokens` is the provider's own
/// figure when present; callers fall back to summing prompt+completion.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub result_text: Option<String>,
    pub result_json: Option<Value>,
    pub tool_calls: Option<Vec<ConversationItem>>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub system_fingerprint: Option<String>,
}

/// A callable external model. One impl per provider (OpenAI, Anthropic, …)
/// sits behind this, the same shape as a plugin registry entry — the
/// executor itself never branches on provider identity.
#[async_trait::async_trait]
pub trait LlmCapability: Send + Sync {
    async fn complete(&self, request: LlmRequest) -> anyhow::Result<LlmResponse>;

    fn name(&self) -> &str;
}

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

//! OpenAI-family parsing: discriminates Chat Completions from the Responses
//! API, unifies their divergent usage/tool-call shapes, and reconstructs a
//! synthetic response body from an SSE transcript when streaming.

use crate::registry::{ParseRequest, ProviderParser};
use crate::sse::{parse_sse_stream, SseEvent};
use r4u_core::{ContentPart, ConversationItem, Trace};
use serde_json::Value;

pub struct OpenAiParser;

impl ProviderParser for OpenAiParser {
    fn claims(&self, url: &str) -> bool {
        url.contains("openai.com")
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn parse(&self, request: &ParseRequest<'_>) -> Trace {
        let req_json: Value =
            serde_json::from_slice(request.request_bytes).unwrap_or(Value::Null);
        let is_responses_api = req_json.get("input").is_some() && req_json.get("messages").is_none();

        let model = req_json
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let temperature = req_json.get("temperature").and_then(Value::as_f64);
        let max_tokens = req_json
            .get("max_tokens")
            .or_else(|| req_json.get("max_output_tokens"))
            .and_then(Value::as_u64)
            .map(|v| v as u32);

        let input_items = if is_responses_api {
            parse_responses_input(&req_json)
        } else {
            parse_chat_completions_input(&req_json)
        };

        let mut trace = Trace {
            id: 0,
            project_id: request.project_id,
            model,
            path: request.path.clone(),
            input_items,
            output_items: Vec::new(),
            tools: req_json.get("tools").cloned(),
            response_schema: req_json
                .get("response_format")
                .or_else(|| req_json.get("text").and_then(|t| t.get("format")))
                .cloned(),
            temperature,
            max_tokens,
            finish_reason: None,
            prompt_tokens: None,
            completion_tokens: None,
            cached_tokens: None,
            reasoning_tokens: None,
            total_tokens: None,
            system_fingerprint: None,
            started_at: request.started_at,
            completed_at: request.completed_at,
            error: request.error.clone(),
            implementation_id: None,
            prompt_variables: None,
        };

        if trace.error.is_some() {
            return trace;
        }

        let resp_json = if request.is_streaming {
            let transcript = request.streaming_response.unwrap_or("");
            let events = parse_sse_stream(transcript);
            if events.is_empty() {
                trace.error = Some("empty stream".to_string());
                return trace;
            }
            if is_responses_api {
                reconstruct_responses_from_stream(&events)
            } else {
                reconstruct_chat_completions_from_stream(&events)
            }
        } else {
            serde_json::from_slice(request.response_bytes).unwrap_or(Value::Null)
        };

        if is_responses_api {
            apply_responses_output(&resp_json, &mut trace);
        } else {
            apply_chat_completions_output(&resp_json, &mut trace);
        }

        trace
    }
}

fn parse_chat_completions_input(req: &Value) -> Vec<ConversationItem> {
    let Some(messages) = req.get("messages").and_then(Value::as_array) else {
        return Vec::new();
    };
    messages
        .iter()
        .map(|m| {
            let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
            if role == "tool" {
                ConversationItem::ToolResult {
                    call_id: m
                        .get("tool_call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    tool_name: m.get("name").and_then(Value::as_str).map(str::to_string),
                    result: value_as_text(m.get("content")),
                }
            } else {
                ConversationItem::Message {
                    role: role.to_string(),
                    content: value_as_text(m.get("content")),
                }
            }
        })
        .collect()
}

fn parse_responses_input(req: &Value) -> Vec<ConversationItem> {
    let Some(input) = req.get("input") else {
        return Vec::new();
    };
    // `input` may be a bare string (single user message) or an item array.
    if let Some(s) = input.as_str() {
        return vec![ConversationItem::message("user", s)];
    }
    let Some(items) = input.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let item_type = item.get("type").and_then(Value::as_str);
            match item_type {
                Some("function_call_output") => Some(ConversationItem::ToolResult {
                    call_id: item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    tool_name: None,
                    result: value_as_text(item.get("output")),
                }),
                Some("function_call") => Some(ConversationItem::FunctionCall {
                    call_id: item
                        .get("call_id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    name: item
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    arguments: item
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                }),
                _ => {
                    let role = item.get("role").and_then(Value::as_str).unwrap_or("user");
                    Some(ConversationItem::Message {
                        role: role.to_string(),
                        content: value_as_text(item.get("content")),
                    })
                }
            }
        })
        .collect()
}

fn apply_chat_completions_output(resp: &Value, trace: &mut Trace) {
    if let Some(id) = resp.get("model").and_then(Value::as_str) {
        if trace.model.is_empty() {
            trace.model = id.to_string();
        }
    }
    trace.system_fingerprint = resp
        .get("system_fingerprint")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut output_items = Vec::new();
    if let Some(choice) = resp.get("choices").and_then(Value::as_array).and_then(|c| c.first()) {
        trace.finish_reason = choice
            .get("finish_reason")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(message) = choice.get("message") {
            if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
                for call in tool_calls {
                    let func = call.get("function");
                    output_items.push(ConversationItem::FunctionToolCall {
                        call_id: call
                            .get("id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: func
                            .and_then(|f| f.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: func
                            .and_then(|f| f.get("arguments"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
            }
            let text = value_as_text(message.get("content"));
            if !text.is_empty() {
                output_items.push(ConversationItem::OutputMessage {
                    content: vec![ContentPart {
                        kind: "text".to_string(),
                        text,
                    }],
                });
            }
        }
    }
    trace.output_items = output_items;

    apply_usage(resp.get("usage"), trace, UsageShape::ChatCompletions);
}

fn apply_responses_output(resp: &Value, trace: &mut Trace) {
    trace.system_fingerprint = resp
        .get("system_fingerprint")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut output_items = Vec::new();
    if let Some(items) = resp.get("output").and_then(Value::as_array) {
        for item in items {
            match item.get("type").and_then(Value::as_str) {
                Some("function_call") => {
                    output_items.push(ConversationItem::FunctionToolCall {
                        call_id: item
                            .get("call_id")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: item
                            .get("name")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        arguments: item
                            .get("arguments")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                Some("message") | None => {
                    let text = item
                        .get("content")
                        .and_then(Value::as_array)
                        .map(|parts| {
                            parts
                                .iter()
                                .filter_map(|p| p.get("text").and_then(Value::as_str))
                                .collect::<Vec<_>>()
                                .join("")
                        })
                        .unwrap_or_default();
                    if !text.is_empty() {
                        output_items.push(ConversationItem::OutputMessage {
                            content: vec![ContentPart {
                                kind: "text".to_string(),
                                text,
                            }],
                        });
                    }
                }
                _ => {}
            }
        }
    } else if let Some(text) = resp.get("output_text").and_then(Value::as_str) {
        output_items.push(ConversationItem::OutputMessage {
            content: vec![ContentPart {
                kind: "text".to_string(),
                text: text.to_string(),
            }],
        });
    }
    trace.output_items = output_items;
    trace.finish_reason = resp
        .get("status")
        .and_then(Value::as_str)
        .map(str::to_string);

    apply_usage(resp.get("usage"), trace, UsageShape::ResponsesApi);
}

enum UsageShape {
    ChatCompletions,
    ResponsesApi,
}

fn apply_usage(usage: Option<&Value>, trace: &mut Trace, shape: UsageShape) {
    let Some(usage) = usage else { return };
    let (prompt_key, completion_key, prompt_details_key, completion_details_key) = match shape {
        UsageShape::ChatCompletions => (
            "prompt_tokens",
            "completion_tokens",
            "prompt_tokens_details",
            "completion_tokens_details",
        ),
        UsageShape::ResponsesApi => (
            "input_tokens",
            "output_tokens",
            "input_tokens_details",
            "output_tokens_details",
        ),
    };
    trace.prompt_tokens = usage.get(prompt_key).and_then(Value::as_u64).map(|v| v as u32);
    trace.completion_tokens = usage
        .get(completion_key)
        .and_then(Value::as_u64)
        .map(|v| v as u32);
    trace.total_tokens = usage
        .get("total_tokens")
        .and_then(Value::as_u64)
        .map(|v| v as u32)
        .or_else(|| match (trace.prompt_tokens, trace.completion_tokens) {
            (Some(p), Some(c)) => Some(p + c),
            _ => None,
        });
    trace.cached_tokens = usage
        .get(prompt_details_key)
        .and_then(|d| d.get("cached_tokens"))
        .and_then(Value::as_u64)
        .map(|v| v as u32);
    trace.reasoning_tokens = usage
        .get(completion_details_key)
        .and_then(|d| d.get("reasoning_tokens"))
        .and_then(Value::as_u64)
        .map(|v| v as u32);
}

fn value_as_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str).or_else(|| p.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Accumulate `choices[0].delta.content` across chunks, keep the latest
/// `finish_reason`, and merge `usage` from whichever chunk carries it
/// (normally only the final one).
fn reconstruct_chat_completions_from_stream(events: &[SseEvent]) -> Value {
    let mut content = String::new();
    let mut finish_reason: Option<String> = None;
    let mut usage: Option<Value> = None;
    let mut model: Option<String> = None;
    let mut system_fingerprint: Option<String> = None;

    for event in events {
        let Ok(chunk) = serde_json::from_str::<Value>(&event.data) else {
            continue; // malformed chunk: skip, don't abort the stream
        };
        if model.is_none() {
            model = chunk.get("model").and_then(Value::as_str).map(str::to_string);
        }
        if let Some(fp) = chunk.get("system_fingerprint").and_then(Value::as_str) {
            system_fingerprint = Some(fp.to_string());
        }
        if let Some(choice) = chunk.get("choices").and_then(Value::as_array).and_then(|c| c.first()) {
            if let Some(delta_content) = choice
                .get("delta")
                .and_then(|d| d.get("content"))
                .and_then(Value::as_str)
            {
                content.push_str(delta_content);
            }
            if let Some(fr) = choice.get("finish_reason").and_then(Value::as_str) {
                finish_reason = Some(fr.to_string());
            }
        }
        if let Some(u) = chunk.get("usage") {
            if !u.is_null() {
                usage = Some(u.clone());
            }
        }
    }

    serde_json::json!({
        "model": model,
        "system_fingerprint": system_fingerprint,
        "choices": [{
            "message": {"role": "assistant", "content": content},
            "finish_reason": finish_reason,
        }],
        "usage": usage,
    })
}

/// Prefer the terminal `response.completed` event's full payload; fall back
/// to concatenating `response.output_text.done` deltas for the text alone.
fn reconstruct_responses_from_stream(events: &[SseEvent]) -> Value {
    for event in events.iter().rev() {
        if event.event.as_deref() == Some("response.completed") {
            if let Ok(payload) = serde_json::from_str::<Value>(&event.data) {
                if let Some(response) = payload.get("response") {
                    return response.clone();
                }
                return payload;
            }
        }
    }
    let mut text = String::new();
    for event in events {
        if event.event.as_deref() == Some("response.output_text.done") {
            if let Ok(payload) = serde_json::from_str::<Value>(&event.data) {
                if let Some(t) = payload.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
        }
    }
    serde_json::json!({ "output_text": text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ParseRequest;

    fn base_request<'a>(is_streaming: bool, streaming_response: Option<&'a str>) -> ParseRequest<'a> {
        ParseRequest {
            project_id: 1,
            url: "https://api.openai.com/v1/chat/completions",
            request_bytes: br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#,
            response_bytes: br#"{"model":"gpt-4","choices":[{"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":3,"total_tokens":8}}"#,
            started_at: 0,
            completed_at: 1000,
            error: None,
            path: None,
            is_streaming,
            streaming_response,
        }
    }

    #[test]
    fn chat_completions_token_counters_preserved() {
        let parser = OpenAiParser;
        let trace = parser.parse(&base_request(false, None));
        assert_eq!(trace.prompt_tokens, Some(5));
        assert_eq!(trace.completion_tokens, Some(3));
        assert_eq!(trace.total_tokens, Some(8));
    }

    #[test]
    fn discriminates_responses_api_from_chat_completions() {
        let parser = OpenAiParser;
        let mut req = base_request(false, None);
        req.request_bytes = br#"{"model":"gpt-4","input":"hi there"}"#;
        req.response_bytes = br#"{"output_text":"hello"}"#;
        let trace = parser.parse(&req);
        assert_eq!(trace.input_items.len(), 1);
        assert_eq!(trace.output_items.len(), 1);
    }

    #[test]
    fn streaming_reconstruction_matches_non_streaming_text() {
        let parser = OpenAiParser;
        let transcript = "data: {\"model\":\"gpt-4\",\"choices\":[{\"delta\":{\"content\":\"hel\"}}]}\n\n\
                           data: {\"model\":\"gpt-4\",\"choices\":[{\"delta\":{\"content\":\"lo\"},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":5,\"completion_tokens\":3,\"total_tokens\":8}}\n\n\
                           data: [DONE]\n";
        let trace = parser.parse(&base_request(true, Some(transcript)));
        assert_eq!(trace.output_items[0].as_text(), "hello");
        assert_eq!(trace.total_tokens, Some(8));
    }

    #[test]
    fn empty_stream_is_marked_as_error() {
        let parser = OpenAiParser;
        let trace = parser.parse(&base_request(true, Some("")));
        assert_eq!(trace.error.as_deref(), Some("empty stream"));
    }

    #[test]
    fn malformed_chunk_is_skipped_not_fatal() {
        let parser = OpenAiParser;
        let transcript = "data: not json\n\n\
                           data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\n\n";
        let trace = parser.parse(&base_request(true, Some(transcript)));
        assert_eq!(trace.output_items[0].as_text(), "ok");
    }
}

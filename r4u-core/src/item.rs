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

//! Tagged-variant modeling of LLM conversation items.
//!
//! Parsers (`r4u-providers`) produce these variants directly; storage
//! persists their canonical JSON form. No provider-specific nested shape
//! (OpenAI `tool_calls[].function`, Responses `input[].content[]`, …) should
//! survive past the parser boundary — everything is flattened into one of
//! the variants below.

use serde::{Deserialize, Serialize};

/// One entry of a `Trace`'s `input_items` or `output_items` list.
///
/// `Vec` order is the item's position; callers must keep it dense
/// (`0..n-1`) — no explicit index field is carried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    /// A plain chat message (`role` ∈ system/user/assistant/tool).
    Message { role: String, content: String },

    /// An assistant-issued tool/function call, input side.
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },

    /// An assistant-issued tool/function call, output side (Responses API
    /// shape differs from Chat Completions on the wire; both collapse here).
    FunctionToolCall {
        call_id: String,
        name: String,
        arguments: String,
    },

    /// The result of executing a previously requested tool call.
    ToolResult {
        call_id: String,
        tool_name: Option<String>,
        result: String,
    },

    /// Assistant free-text output, potentially multi-part.
    OutputMessage { content: Vec<ContentPart> },
}

impl ConversationItem {
    /// Convenience constructor for a single-part text message.
    pub fn message(role: impl Into<String>, content: impl Into<String>) -> Self {
        ConversationItem::Message {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Flattened text content, used by the grader runtime to build context
    /// strings without re-deriving provider-specific shapes.
    pub fn as_text(&self) -> String {
        match self {
            ConversationItem::Message { content, .. } => content.clone(),
            ConversationItem::FunctionCall {
                name, arguments, ..
            } => format!("call {name}({arguments})"),
            ConversationItem::FunctionToolCall {
                name, arguments, ..
            } => format!("call {name}({arguments})"),
            ConversationItem::ToolResult {
                tool_name, result, ..
            } => format!("result[{}] = {result}", tool_name.as_deref().unwrap_or("?")),
            ConversationItem::OutputMessage { content } => content
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default = "default_content_kind")]
    pub kind: String,
    pub text: String,
}

fn default_content_kind() -> String {
    "text".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_through_json() {
        let item = ConversationItem::message("user", "hello");
        let json = serde_json::to_string(&item).unwrap();
        let back: ConversationItem = serde_json::from_str(&json).unwrap();
        assert_eq!(item, back);
    }

    #[test]
    fn as_text_flattens_output_message() {
        let item = ConversationItem::OutputMessage {
            content: vec![
                ContentPart {
                    kind: "text".into(),
                    text: "hello ".into(),
                },
                ContentPart {
                    kind: "text".into(),
                    text: "world".into(),
                },
            ],
        };
        assert_eq!(item.as_text(), "hello world");
    }
}

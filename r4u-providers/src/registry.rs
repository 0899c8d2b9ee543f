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

use r4u_core::Trace;
use std::sync::Arc;

/// Everything a parser needs, decoded from the ingest request.
pub struct ParseRequest<'a> {
    pub project_id: u64,
    pub url: &'a str,
    pub request_bytes: &'a [u8],
    pub response_bytes: &'a [u8],
    pub started_at: i64,
    pub completed_at: i64,
    pub error: Option<String>,
    pub path: Option<String>,
    pub is_streaming: bool,
    /// Raw SSE transcript text, present only when `is_streaming`.
    pub streaming_response: Option<&'a str>,
}

/// A parser that claims traffic by URL host and decodes it into a `Trace`.
///
/// `id` on the returned `Trace` is left at `0`; the ingest pipeline assigns
/// the real id at insert time.
pub trait ProviderParser: Send + Sync {
    /// True if this parser can decode requests to `url`.
    fn claims(&self, url: &str) -> bool;

    fn name(&self) -> &str;

    fn parse(&self, request: &ParseRequest<'_>) -> Trace;
}

/// Parsers are tried in registration order; the first claim wins. The
/// registry itself always ends with a generic fallback so every trace gets
/// *a* `Trace` record, even for unrecognized hosts.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ProviderParser>>,
    fallback: Arc<dyn ProviderParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
            fallback: Arc::new(crate::generic::GenericParser),
        }
    }

    pub fn register(&mut self, parser: Arc<dyn ProviderParser>) {
        self.parsers.push(parser);
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::openai::OpenAiParser));
        registry
    }

    pub fn parse(&self, request: &ParseRequest<'_>) -> Trace {
        let parser = self
            .parsers
            .iter()
            .find(|p| p.claims(request.url))
            .unwrap_or(&self.fallback);
        tracing::debug!(parser = parser.name(), url = request.url, "claimed trace");
        parser.parse(request)
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unclaimed_url_falls_back_to_generic() {
        let registry = ParserRegistry::with_defaults();
        let req = ParseRequest {
            project_id: 1,
            url: "https://example.internal/v1/chat",
            request_bytes: b"{}",
            response_bytes: b"{}",
            started_at: 0,
            completed_at: 1,
            error: None,
            path: None,
            is_streaming: false,
            streaming_response: None,
        };
        let trace = registry.parse(&req);
        assert!(trace.input_items.is_empty());
    }

    #[test]
    fn openai_host_is_claimed() {
        let registry = ParserRegistry::with_defaults();
        let req = ParseRequest {
            project_id: 1,
            url: "https://api.openai.com/v1/chat/completions",
            request_bytes: br#"{"model":"gpt-4","messages":[{"role":"user","content":"hi"}]}"#,
            response_bytes: br#"{"id":"r1","model":"gpt-4","choices":[{"message":{"role":"assistant","content":"hello"},"finish_reason":"stop"}],"usage":{"prompt_tokens":5,"completion_tokens":3,"total_tokens":8}}"#,
            started_at: 0,
            completed_at: 1,
            error: None,
            path: None,
            is_streaming: false,
            streaming_response: None,
        };
        let trace = registry.parse(&req);
        assert_eq!(trace.model, "gpt-4");
        assert_eq!(trace.prompt_tokens, Some(5));
    }
}

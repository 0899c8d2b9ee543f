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

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One captured outbound HTTP call, wire-shaped for `POST /http-traces`
/// (spec §4.K, §6). Byte fields serialize as base64 strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTracePayload {
    /// App-supplied project name; the server resolves or creates the row
    /// on first reference (spec §3 "Project" lifecycle).
    pub project: String,
    pub url: String,
    pub method: String,
    pub started_at: i64,
    pub completed_at: i64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    #[serde(with = "base64_bytes")]
    pub request: Vec<u8>,
    pub request_headers: HashMap<String, String>,
    #[serde(with = "base64_bytes")]
    pub response: Vec<u8>,
    pub response_headers: HashMap<String, String>,
    pub metadata: serde_json::Value,
    pub path: Option<String>,
    pub is_streaming: bool,
    pub streaming_response: Option<String>,
    pub implementation_id: Option<u64>,
}

mod base64_bytes {
    use super::{Engine, STANDARD};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded.as_bytes()).map_err(serde::de::Error::custom)
    }
}

/// Which provider client library wrapped the call, used only to pick a
/// default host hint when the request URL itself is ambiguous — e.g. a
/// proxy in front of multiple providers (spec supplement: SDK multi-provider
/// adapters, generalized from `original_source/sdks/python/.../integrations/
/// {openai,anthropic,google_genai,grok}.py`). Actual request capture stays
/// transport-level; this never substitutes for parsing the real payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderHint {
    OpenAi,
    Anthropic,
    GoogleGenAi,
    Grok,
    Generic,
}

impl ProviderHint {
    /// Host hint used when the caller's URL doesn't already disambiguate
    /// the provider (e.g. requests routed through an internal proxy).
    pub fn default_host_hint(self) -> &'static str {
        match self {
            ProviderHint::OpenAi => "api.openai.com",
            ProviderHint::Anthropic => "api.anthropic.com",
            ProviderHint::GoogleGenAi => "generativelanguage.googleapis.com",
            ProviderHint::Grok => "api.x.ai",
            ProviderHint::Generic => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_bytes_round_trip_through_base64() {
        let payload = HttpTracePayload {
            project: "acme".into(),
            url: "https://api.openai.com/v1/chat/completions".into(),
            method: "POST".into(),
            started_at: 0,
            completed_at: 1,
            status_code: Some(200),
            error: None,
            request: b"{\"model\":\"gpt-4\"}".to_vec(),
            request_headers: HashMap::new(),
            response: b"{}".to_vec(),
            response_headers: HashMap::new(),
            metadata: serde_json::json!({}),
            path: None,
            is_streaming: false,
            streaming_response: None,
            implementation_id: None,
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"request\":\""));
        let decoded: HttpTracePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.request, payload.request);
    }

    #[test]
    fn provider_hint_host_hints_are_distinct() {
        let hints = [
            ProviderHint::OpenAi,
            ProviderHint::Anthropic,
            ProviderHint::GoogleGenAi,
            ProviderHint::Grok,
        ];
        let mut seen = std::collections::HashSet::new();
        for hint in hints {
            assert!(seen.insert(hint.default_host_hint()));
        }
    }
}

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

use crate::registry::{ParseRequest, ProviderParser};
use r4u_core::Trace;

/// Claims nothing on its own; used by the registry only as the last-resort
/// fallback. Records timing + raw bytes only, per spec §4.A.
pub struct GenericParser;

impl ProviderParser for GenericParser {
    fn claims(&self, _url: &str) -> bool {
        false
    }

    fn name(&self) -> &str {
        "generic"
    }

    fn parse(&self, request: &ParseRequest<'_>) -> Trace {
        Trace {
            id: 0,
            project_id: request.project_id,
            model: String::new(),
            path: request.path.clone(),
            input_items: Vec::new(),
            output_items: Vec::new(),
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
            started_at: request.started_at,
            completed_at: request.completed_at,
            error: request.error.clone(),
            implementation_id: None,
            prompt_variables: None,
        }
    }
}

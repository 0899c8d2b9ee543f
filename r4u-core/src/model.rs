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

//! Entities of the data model (spec §3).
//!
//! IDs are server-assigned `u64`s, matching the teacher's `edge_id`/`tenant_id`
//! convention rather than client-generated UUIDs. Timestamps are
//! microseconds since the Unix epoch (`r4u_core::time::now_micros`).

use crate::item::ConversationItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: u64,
    pub name: String,
}

/// Verbatim captured HTTP call. Immutable after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpTrace {
    pub id: u64,
    pub project_id: u64,
    pub url: String,
    pub method: String,
    pub started_at: i64,
    pub completed_at: i64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub request: Vec<u8>,
    pub request_headers: HashMap<String, String>,
    pub response: Vec<u8>,
    pub response_headers: HashMap<String, String>,
    pub metadata: serde_json::Value,
}

/// Decoded LLM call. Patched exactly once by the matcher to set
/// `implementation_id` + `prompt_variables`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub id: u64,
    pub project_id: u64,
    pub model: String,
    pub path: Option<String>,
    pub input_items: Vec<ConversationItem>,
    pub output_items: Vec<ConversationItem>,
    pub tools: Option<serde_json::Value>,
    pub response_schema: Option<serde_json::Value>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub finish_reason: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub system_fingerprint: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
    pub error: Option<String>,
    pub implementation_id: Option<u64>,
    pub prompt_variables: Option<HashMap<String, String>>,
}

impl Trace {
    /// First message's text content, used as the clustering/matching key.
    pub fn first_message_text(&self) -> Option<&str> {
        self.input_items.iter().find_map(|item| match item {
            ConversationItem::Message { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }

    pub fn has_system_prompt(&self) -> bool {
        self.input_items
            .iter()
            .any(|item| matches!(item, ConversationItem::Message { role, .. } if role == "system"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub description: String,
    pub path: Option<String>,
    pub production_version_id: Option<u64>,
    pub response_schema: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Implementation {
    pub id: u64,
    pub task_id: u64,
    pub version: String,
    pub prompt: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub reasoning: Option<serde_json::Value>,
    pub tools: Option<serde_json::Value>,
    pub tool_choice: Option<serde_json::Value>,
    pub max_output_tokens: u32,
    pub response_schema: Option<serde_json::Value>,
    /// True for ephemeral, not-user-visible implementations (e.g. execute
    /// overrides, optimizer candidates before they are selected).
    pub temp: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u64,
    pub task_id: u64,
    pub description: Option<String>,
    pub arguments: HashMap<String, serde_json::Value>,
    pub expected_output: Vec<ConversationItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScoreType {
    Float,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grader {
    pub id: u64,
    pub project_id: u64,
    pub name: String,
    pub prompt: String,
    pub score_type: ScoreType,
    pub model: String,
    pub temperature: Option<f64>,
    pub reasoning: Option<serde_json::Value>,
    pub response_schema: Option<serde_json::Value>,
    pub max_output_tokens: u32,
    pub is_active: bool,
}

/// Exactly one of `trace_id` / `execution_result_id` is set — enforced by
/// `r4u_storage` at insert time (`Grade XOR` invariant, spec §8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grade {
    pub id: u64,
    pub grader_id: u64,
    pub trace_id: Option<u64>,
    pub execution_result_id: Option<u64>,
    pub score_float: Option<f64>,
    pub score_boolean: Option<bool>,
    pub reasoning: Option<String>,
    pub confidence: Option<f64>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub grading_started_at: i64,
    pub grading_completed_at: i64,
    pub error: Option<String>,
}

impl Grade {
    pub fn target_is_valid(&self) -> bool {
        self.trace_id.is_some() ^ self.execution_result_id.is_some()
    }

    /// Scalar value used in grader-score aggregation, per score_type.
    pub fn scalar_score(&self) -> Option<f64> {
        match self.score_type_hint() {
            ScoreType::Float => self.score_float,
            ScoreType::Boolean => self.score_boolean.map(|b| if b { 1.0 } else { 0.0 }),
        }
    }

    fn score_type_hint(&self) -> ScoreType {
        if self.score_boolean.is_some() {
            ScoreType::Boolean
        } else {
            ScoreType::Float
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub id: u64,
    pub task_id: u64,
    pub implementation_id: u64,
    pub started_at: i64,
    pub completed_at: i64,
    pub prompt_rendered: Option<String>,
    pub variables: Option<HashMap<String, String>>,
    pub result_text: Option<String>,
    pub result_json: Option<serde_json::Value>,
    pub tool_calls: Option<Vec<ConversationItem>>,
    pub error: Option<String>,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub cached_tokens: Option<u32>,
    pub reasoning_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
    pub cost: Option<f64>,
    pub evaluation_id: Option<u64>,
    pub test_case_id: Option<u64>,
}

impl ExecutionResult {
    pub fn duration_ms(&self) -> f64 {
        ((self.completed_at - self.started_at) as f64) / 1000.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub task_id: u64,
    pub weight_quality: f64,
    pub weight_cost: f64,
    pub weight_time: f64,
    pub grader_ids: Vec<u64>,
}

impl EvaluationConfig {
    pub fn default_for_task(task_id: u64) -> Self {
        Self {
            task_id,
            weight_quality: 0.5,
            weight_cost: 0.3,
            weight_time: 0.2,
            grader_ids: Vec::new(),
        }
    }

    /// Weight-validity invariant (spec §8): `|Σw − 1| ≤ 0.01`.
    pub fn weights_valid(&self) -> bool {
        (self.weight_quality + self.weight_cost + self.weight_time - 1.0).abs() <= 0.01
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EvaluationStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub id: u64,
    pub task_id: u64,
    pub implementation_id: u64,
    pub status: EvaluationStatus,
    pub grader_scores: HashMap<u64, f64>,
    pub quality_score: Option<f64>,
    pub avg_cost: Option<f64>,
    pub avg_execution_time_ms: Option<f64>,
    pub test_case_count: usize,
    pub error: Option<String>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl Evaluation {
    pub fn new_running(id: u64, task_id: u64, implementation_id: u64, now: i64) -> Self {
        Self {
            id,
            task_id,
            implementation_id,
            status: EvaluationStatus::Running,
            grader_scores: HashMap::new(),
            quality_score: None,
            avg_cost: None,
            avg_execution_time_ms: None,
            test_case_count: 0,
            error: None,
            created_at: now,
            completed_at: None,
        }
    }

    /// On-demand efficiency/final-score computation (spec §4.H read path).
    pub fn cost_efficiency(&self, target: &TargetTaskMetrics) -> Option<f64> {
        match (target.best_cost, self.avg_cost) {
            (Some(best), Some(avg)) if avg > 0.0 => Some((best / avg).min(1.0)),
            (Some(_), Some(avg)) if avg == 0.0 => Some(1.0),
            _ => None,
        }
    }

    pub fn time_efficiency(&self, target: &TargetTaskMetrics) -> Option<f64> {
        match (target.best_time_ms, self.avg_execution_time_ms) {
            (Some(best), Some(avg)) if avg > 0.0 => Some((best / avg).min(1.0)),
            (Some(_), Some(avg)) if avg == 0.0 => Some(1.0),
            _ => None,
        }
    }

    pub fn final_score(&self, config: Option<&EvaluationConfig>, target: &TargetTaskMetrics) -> Option<f64> {
        let quality = self.quality_score?;
        let Some(config) = config else {
            return Some(quality);
        };
        let cost_eff = self.cost_efficiency(target).unwrap_or(0.0);
        let time_eff = self.time_efficiency(target).unwrap_or(0.0);
        let has_cost = self.cost_efficiency(target).is_some();
        let has_time = self.time_efficiency(target).is_some();
        let weight_cost = if has_cost { config.weight_cost } else { 0.0 };
        let weight_time = if has_time { config.weight_time } else { 0.0 };
        Some(config.weight_quality * quality + weight_cost * cost_eff + weight_time * time_eff)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetTaskMetrics {
    pub task_id: u64,
    pub best_cost: Option<f64>,
    pub best_time_ms: Option<f64>,
    pub last_updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grade_xor_validates() {
        let mut g = Grade {
            id: 1,
            grader_id: 1,
            trace_id: Some(1),
            execution_result_id: None,
            score_float: Some(0.5),
            score_boolean: None,
            reasoning: None,
            confidence: None,
            prompt_tokens: None,
            completion_tokens: None,
            total_tokens: None,
            grading_started_at: 0,
            grading_completed_at: 0,
            error: None,
        };
        assert!(g.target_is_valid());
        g.execution_result_id = Some(2);
        assert!(!g.target_is_valid());
    }

    #[test]
    fn weights_valid_within_tolerance() {
        let cfg = EvaluationConfig::default_for_task(1);
        assert!(cfg.weights_valid());
        let bad = EvaluationConfig {
            weight_quality: 0.5,
            weight_cost: 0.5,
            weight_time: 0.5,
            ..cfg
        };
        assert!(!bad.weights_valid());
    }

    #[test]
    fn final_score_is_quality_when_config_missing() {
        let eval = Evaluation {
            quality_score: Some(0.8),
            ..Evaluation::new_running(1, 1, 1, 0)
        };
        let target = TargetTaskMetrics::default();
        assert_eq!(eval.final_score(None, &target), Some(0.8));
    }
}

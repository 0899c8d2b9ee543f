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

use r4u_core::{ConversationItem, EvaluationConfig, Implementation};
use r4u_executor::LlmCapability;
use serde_json::{json, Map, Value};

const DEFAULT_OPTIMIZER_TEMPERATURE: f64 = 0.7;
const DEFAULT_OPTIMIZER_MAX_TOKENS: u32 = 1024;
const DEFAULT_OPTIMIZER_MODEL: &str = "gpt-4.1";
const OPTIMIZER_META_VERSION: &str = "optimizer-meta";
/// Retry budget for one variant call (spec §4.I step 1).
const MAX_VARIANT_ATTEMPTS: u32 = 4;

/// The implementation fields an optimization run is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeableField {
    Prompt,
    Model,
    Temperature,
    MaxOutputTokens,
}

impl ChangeableField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeableField::Prompt => "prompt",
            ChangeableField::Model => "model",
            ChangeableField::Temperature => "temperature",
            ChangeableField::MaxOutputTokens => "max_output_tokens",
        }
    }
}

/// Fields the agent proposed changing, plus its (optional) rationale. Only
/// keys present in the `changeable_fields` allow-list ever reach here.
#[derive(Debug, Clone, Default)]
pub struct VariantSpec {
    pub prompt: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub explanation: Option<String>,
}

impl VariantSpec {
    fn has_any_change(&self) -> bool {
        self.prompt.is_some() || self.model.is_some() || self.temperature.is_some() || self.max_output_tokens.is_some()
    }

    /// Comparable subset used for duplicate detection: allowed fields only,
    /// `explanation` excluded (spec §4.I step 1 "ignoring explanation").
    fn comparison_key(&self) -> Value {
        let mut map = Map::new();
        if let Some(p) = &self.prompt {
            map.insert("prompt".to_string(), json!(p));
        }
        if let Some(m) = &self.model {
            map.insert("model".to_string(), json!(m));
        }
        if let Some(t) = self.temperature {
            map.insert("temperature".to_string(), json!(t));
        }
        if let Some(m) = self.max_output_tokens {
            map.insert("max_output_tokens".to_string(), json!(m));
        }
        Value::Object(map)
    }
}

/// True when `variant`'s allowed-field subset matches one already seen
/// (spec §4.I step 1 duplicate-of-a-prior-variant retry condition).
pub fn is_duplicate_variant(variant: &VariantSpec, existing: &[VariantSpec]) -> bool {
    let key = variant.comparison_key();
    existing.iter().any(|v| v.comparison_key() == key)
}

fn meta_prompt(changeable_fields: &[ChangeableField]) -> String {
    let fields_csv = changeable_fields
        .iter()
        .map(|f| f.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You are an optimizer agent improving a task implementation. You are given the current \
         baseline implementation and, after the first iteration, feedback from evaluating prior \
         variants. Weigh quality, cost, and execution time according to the evaluation weights \
         you are given.\n\n\
         Respond with a JSON object containing only the fields you want to change, chosen from: \
         {fields_csv}. Omit any field you are leaving unchanged. Always include a short \
         \"explanation\" string describing your reasoning.\n\n\
         Available models with pricing:\n{{{{available_models}}}}\n\n\
         Evaluation weights:\n{{{{evaluation_weights}}}}\n"
    )
}

fn response_schema_for_fields(changeable_fields: &[ChangeableField], available_models: &[String]) -> Value {
    let mut properties = Map::new();
    for field in changeable_fields {
        let schema = match field {
            ChangeableField::Prompt => json!({"type": "string"}),
            ChangeableField::Model => json!({"type": "string", "enum": available_models}),
            ChangeableField::Temperature => json!({"type": "number", "minimum": 0, "maximum": 1}),
            ChangeableField::MaxOutputTokens => json!({"type": "integer", "minimum": 1}),
        };
        properties.insert(field.as_str().to_string(), schema);
    }
    properties.insert("explanation".to_string(), json!({"type": "string"}));

    json!({
        "type": "object",
        "properties": Value::Object(properties),
        "required": ["explanation"],
    })
}

fn meta_implementation(changeable_fields: &[ChangeableField], available_models: &[String]) -> Implementation {
    Implementation {
        id: 0,
        task_id: 0,
        version: OPTIMIZER_META_VERSION.to_string(),
        prompt: meta_prompt(changeable_fields),
        model: DEFAULT_OPTIMIZER_MODEL.to_string(),
        temperature: Some(DEFAULT_OPTIMIZER_TEMPERATURE),
        reasoning: None,
        tools: None,
        tool_choice: None,
        max_output_tokens: DEFAULT_OPTIMIZER_MAX_TOKENS,
        response_schema: Some(response_schema_for_fields(changeable_fields, available_models)),
        temp: true,
    }
}

fn variables_for_meta_call(available_models: &[String], config: Option<&EvaluationConfig>) -> std::collections::HashMap<String, String> {
    let mut variables = std::collections::HashMap::new();
    variables.insert(
        "available_models".to_string(),
        serde_json::to_string(available_models).unwrap_or_default(),
    );
    let weights = config.map(|c| {
        json!({
            "quality_weight": c.weight_quality,
            "cost_weight": c.weight_cost,
            "time_weight": c.weight_time,
        })
    });
    variables.insert(
        "evaluation_weights".to_string(),
        weights.map(|w| w.to_string()).unwrap_or_else(|| "null".to_string()),
    );
    variables
}

fn extract_variant(result_json: Option<&Value>, result_text: Option<&str>, changeable_fields: &[ChangeableField]) -> Option<VariantSpec> {
    let object = result_json
        .and_then(|v| v.as_object())
        .cloned()
        .or_else(|| result_text.and_then(|t| serde_json::from_str::<Value>(t).ok()).and_then(|v| v.as_object().cloned()))?;

    let allowed = |field: ChangeableField| changeable_fields.contains(&field);
    let mut spec = VariantSpec::default();
    if allowed(ChangeableField::Prompt) {
        spec.prompt = object.get("prompt").and_then(|v| v.as_str()).map(str::to_string);
    }
    if allowed(ChangeableField::Model) {
        spec.model = object.get("model").and_then(|v| v.as_str()).map(str::to_string);
    }
    if allowed(ChangeableField::Temperature) {
        spec.temperature = object.get("temperature").and_then(|v| v.as_f64());
    }
    if allowed(ChangeableField::MaxOutputTokens) {
        spec.max_output_tokens = object.get("max_output_tokens").and_then(|v| v.as_u64()).map(|v| v as u32);
    }
    spec.explanation = object
        .get("explanation")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if !spec.has_any_change() {
        return None;
    }
    Some(spec)
}

/// Call the optimizer agent for one variant, retrying on parse failure or a
/// no-op response (spec §4.I step 1). Gives up and returns `None` after
/// [`MAX_VARIANT_ATTEMPTS`] attempts — the iteration still counts.
pub async fn generate_variant(
    capability: &dyn LlmCapability,
    changeable_fields: &[ChangeableField],
    available_models: &[String],
    config: Option<&EvaluationConfig>,
    conversation: &[ConversationItem],
) -> Option<VariantSpec> {
    let meta_impl = meta_implementation(changeable_fields, available_models);
    let variables = variables_for_meta_call(available_models, config);

    for _ in 0..MAX_VARIANT_ATTEMPTS {
        let execution = r4u_executor::execute(capability, &meta_impl, Some(&variables), conversation.to_vec()).await;
        if execution.error.is_some() {
            continue;
        }
        if let Some(spec) = extract_variant(execution.result_json.as_ref(), execution.result_text.as_deref(), changeable_fields) {
            return Some(spec);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use r4u_executor::{LlmRequest, LlmResponse};

    struct ScriptedCapability {
        responses: std::sync::Mutex<Vec<anyhow::Result<LlmResponse>>>,
    }

    #[async_trait]
    impl LlmCapability for ScriptedCapability {
        async fn complete(&self, _request: LlmRequest) -> anyhow::Result<LlmResponse> {
            self.responses.lock().unwrap().remove(0)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn generates_a_variant_on_the_first_valid_response() {
        let capability = ScriptedCapability {
            responses: std::sync::Mutex::new(vec![Ok(LlmResponse {
                result_text: Some(r#"{"temperature": 0.4, "explanation": "lower variance"}"#.to_string()),
                ..Default::default()
            })]),
        };
        let variant = generate_variant(
            &capability,
            &[ChangeableField::Temperature],
            &["gpt-4o".to_string()],
            None,
            &[],
        )
        .await
        .unwrap();
        assert_eq!(variant.temperature, Some(0.4));
        assert_eq!(variant.explanation.as_deref(), Some("lower variance"));
    }

    #[tokio::test]
    async fn retries_past_a_no_op_response_then_succeeds() {
        let capability = ScriptedCapability {
            responses: std::sync::Mutex::new(vec![
                Ok(LlmResponse {
                    result_text: Some(r#"{"explanation": "nothing to change"}"#.to_string()),
                    ..Default::default()
                }),
                Ok(LlmResponse {
                    result_text: Some(r#"{"model": "gpt-4o-mini", "explanation": "cheaper"}"#.to_string()),
                    ..Default::default()
                }),
            ]),
        };
        let variant = generate_variant(
            &capability,
            &[ChangeableField::Model],
            &["gpt-4o-mini".to_string()],
            None,
            &[],
        )
        .await
        .unwrap();
        assert_eq!(variant.model.as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn persistent_failure_returns_none_after_budget_is_exhausted() {
        let capability = ScriptedCapability {
            responses: std::sync::Mutex::new(
                (0..MAX_VARIANT_ATTEMPTS)
                    .map(|_| {
                        Ok(LlmResponse {
                            result_text: Some("not json".to_string()),
                            ..Default::default()
                        })
                    })
                    .collect(),
            ),
        };
        let variant = generate_variant(&capability, &[ChangeableField::Prompt], &[], None, &[]).await;
        assert!(variant.is_none());
    }

    #[test]
    fn duplicate_detection_ignores_explanation() {
        let a = VariantSpec {
            model: Some("gpt-4o".to_string()),
            explanation: Some("try a bigger model".to_string()),
            ..Default::default()
        };
        let b = VariantSpec {
            model: Some("gpt-4o".to_string()),
            explanation: Some("different wording".to_string()),
            ..Default::default()
        };
        assert!(is_duplicate_variant(&b, &[a]));
    }
}

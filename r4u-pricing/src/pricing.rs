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

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-million-token rates for one model. Gemini-style models carry a second
/// tier switched on a long-context threshold over prompt tokens (spec §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPricing {
    pub provider: &'static str,
    pub model_name: &'static str,
    pub input_price_per_1m: f64,
    pub output_price_per_1m: f64,
    pub cached_input_price_per_1m: Option<f64>,
    /// Prompt-token count above which the long-context tier applies.
    pub long_context_threshold: Option<u32>,
    pub long_context_input_price_per_1m: Option<f64>,
    pub long_context_output_price_per_1m: Option<f64>,
}

fn flat(provider: &'static str, model: &'static str, input: f64, output: f64, cached: Option<f64>) -> ModelPricing {
    ModelPricing {
        provider,
        model_name: model,
        input_price_per_1m: input,
        output_price_per_1m: output,
        cached_input_price_per_1m: cached,
        long_context_threshold: None,
        long_context_input_price_per_1m: None,
        long_context_output_price_per_1m: None,
    }
}

fn gemini_tiered(
    model: &'static str,
    input: f64,
    output: f64,
    threshold: u32,
    long_input: f64,
    long_output: f64,
) -> ModelPricing {
    ModelPricing {
        provider: "google",
        model_name: model,
        input_price_per_1m: input,
        output_price_per_1m: output,
        cached_input_price_per_1m: None,
        long_context_threshold: Some(threshold),
        long_context_input_price_per_1m: Some(long_input),
        long_context_output_price_per_1m: Some(long_output),
    }
}

/// Pricing table, keyed by the normalized model name ([`normalize_model_name`]).
static PRICING_DB: Lazy<HashMap<&'static str, ModelPricing>> = Lazy::new(|| {
    let mut db = HashMap::new();

    db.insert("gpt-4o", flat("openai", "gpt-4o", 2.50, 10.00, None));
    db.insert("gpt-4o-mini", flat("openai", "gpt-4o-mini", 0.15, 0.60, None));
    db.insert("gpt-4-turbo", flat("openai", "gpt-4-turbo", 10.00, 30.00, None));
    db.insert("gpt-4", flat("openai", "gpt-4", 30.00, 60.00, None));
    db.insert("gpt-3.5-turbo", flat("openai", "gpt-3.5-turbo", 0.50, 1.50, None));
    db.insert("gpt-4.1", flat("openai", "gpt-4.1", 2.00, 8.00, Some(0.50)));
    db.insert("o1", flat("openai", "o1", 15.00, 60.00, Some(7.50)));
    db.insert("o3-mini", flat("openai", "o3-mini", 1.10, 4.40, Some(0.55)));

    db.insert(
        "claude-opus-4",
        flat("anthropic", "claude-opus-4", 15.00, 75.00, Some(1.50)),
    );
    db.insert(
        "claude-sonnet-4",
        flat("anthropic", "claude-sonnet-4", 3.00, 15.00, Some(0.30)),
    );
    db.insert(
        "claude-haiku-4",
        flat("anthropic", "claude-haiku-4", 0.25, 1.25, Some(0.025)),
    );
    db.insert(
        "claude-3-5-sonnet",
        flat("anthropic", "claude-3-5-sonnet", 3.00, 15.00, Some(0.30)),
    );

    db.insert(
        "gemini-1.5-pro",
        gemini_tiered("gemini-1.5-pro", 1.25, 5.00, 128_000, 2.50, 10.00),
    );
    db.insert(
        "gemini-1.5-flash",
        gemini_tiered("gemini-1.5-flash", 0.075, 0.30, 128_000, 0.15, 0.60),
    );
    db.insert(
        "gemini-2.0-flash",
        gemini_tiered("gemini-2.0-flash", 0.10, 0.40, 1_000_000, 0.20, 0.80),
    );

    db.insert("command-r-plus", flat("cohere", "command-r-plus", 3.00, 15.00, None));
    db.insert("command-r", flat("cohere", "command-r", 0.50, 1.50, None));

    db
});

const KNOWN_PROVIDER_PREFIXES: &[&str] = &["openai", "anthropic", "google", "cohere", "azure", "vertex_ai", "bedrock"];

/// Normalize a raw model identifier for pricing-table lookup: strip a
/// leading `provider/` prefix, then strip a trailing date suffix
/// (`-YYYY-MM-DD` or `-YYYYMMDD`), per spec §4.G.
pub fn normalize_model_name(model: &str) -> String {
    let mut name = model.trim();

    if let Some((prefix, rest)) = name.split_once('/') {
        if KNOWN_PROVIDER_PREFIXES
            .iter()
            .any(|p| p.eq_ignore_ascii_case(prefix))
        {
            name = rest;
        }
    }

    strip_date_suffix(name).to_lowercase()
}

/// Strip a trailing `-YYYY-MM-DD` or `-YYYYMMDD` date suffix, if present.
fn strip_date_suffix(name: &str) -> &str {
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() >= 4 && is_digits(parts[parts.len() - 3], 4) && is_digits(parts[parts.len() - 2], 2) && is_digits(parts[parts.len() - 1], 2) {
        // "...-YYYY-MM-DD"
        let cut = name.len() - (parts[parts.len() - 3].len() + parts[parts.len() - 2].len() + parts[parts.len() - 1].len() + 3);
        return &name[..cut];
    }
    if parts.len() >= 2 && is_digits(parts[parts.len() - 1], 8) {
        // "...-YYYYMMDD"
        let cut = name.len() - (parts[parts.len() - 1].len() + 1);
        return &name[..cut];
    }
    name
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.chars().all(|c| c.is_ascii_digit())
}

/// Cost in USD for one call, or `None` when the (normalized) model is
/// unknown (spec §4.G: "Returns `null` on unknown model").
pub fn calculate_cost(
    model: &str,
    prompt_tokens: u32,
    completion_tokens: u32,
    cached_tokens: Option<u32>,
) -> Option<f64> {
    let normalized = normalize_model_name(model);
    let pricing = PRICING_DB.get(normalized.as_str())?;

    let (input_rate, output_rate) = match pricing.long_context_threshold {
        Some(threshold) if prompt_tokens > threshold => (
            pricing.long_context_input_price_per_1m.unwrap_or(pricing.input_price_per_1m),
            pricing.long_context_output_price_per_1m.unwrap_or(pricing.output_price_per_1m),
        ),
        _ => (pricing.input_price_per_1m, pricing.output_price_per_1m),
    };

    let cached = cached_tokens.unwrap_or(0).min(prompt_tokens);
    let uncached_prompt = prompt_tokens - cached;

    let mut cost = (uncached_prompt as f64 / 1_000_000.0) * input_rate;
    if let Some(cached_rate) = pricing.cached_input_price_per_1m {
        cost += (cached as f64 / 1_000_000.0) * cached_rate;
    } else {
        cost += (cached as f64 / 1_000_000.0) * input_rate;
    }
    cost += (completion_tokens as f64 / 1_000_000.0) * output_rate;

    Some(cost)
}

pub fn list_models() -> Vec<&'static str> {
    PRICING_DB.keys().copied().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_provider_prefix_and_date_suffix() {
        assert_eq!(normalize_model_name("openai/gpt-4o-2024-08-06"), "gpt-4o");
        assert_eq!(normalize_model_name("gpt-4o-mini"), "gpt-4o-mini");
        assert_eq!(normalize_model_name("anthropic/claude-opus-4"), "claude-opus-4");
    }

    #[test]
    fn calculates_cost_for_known_model() {
        let cost = calculate_cost("gpt-4o", 1000, 1000, None).unwrap();
        assert!((cost - 0.0125).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_returns_none() {
        assert!(calculate_cost("some-made-up-model", 1, 1, None).is_none());
    }

    #[test]
    fn cached_tokens_use_the_cached_rate() {
        let full = calculate_cost("claude-opus-4", 1000, 0, None).unwrap();
        let cached = calculate_cost("claude-opus-4", 1000, 0, Some(1000)).unwrap();
        assert!(cached < full);
    }

    #[test]
    fn gemini_long_context_switches_tier() {
        let short = calculate_cost("gemini-1.5-pro", 1000, 1000, None).unwrap();
        let long = calculate_cost("gemini-1.5-pro", 200_000, 1000, None).unwrap();
        // Per-token input rate roughly doubles past the long-context threshold.
        assert!(long / 200.0 > short);
    }
}

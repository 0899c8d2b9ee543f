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

use r4u_core::ScoreType;
use serde_json::Value;

/// `(score_float, score_boolean, reasoning, confidence)`.
pub type ParsedGrade = (Option<f64>, Option<bool>, Option<String>, Option<f64>);

/// Extract score/reasoning/confidence from a grader's raw output (spec §4.F
/// step 5). Structured JSON wins when available; otherwise the text is
/// parsed as JSON, and failing that, a best-effort heuristic looks for
/// pass/fail words. Never errors — an output this function can't make sense
/// of just yields all `None`s, with the raw text kept as `reasoning`.
pub fn parse_grading_response(
    score_type: ScoreType,
    result_text: Option<&str>,
    result_json: Option<&Value>,
) -> ParsedGrade {
    if let Some(json) = result_json {
        return extract_from_json(score_type, json);
    }

    let Some(text) = result_text else {
        return (None, None, None, None);
    };

    if let Ok(parsed) = serde_json::from_str::<Value>(text) {
        return extract_from_json(score_type, &parsed);
    }

    let score_boolean = match score_type {
        ScoreType::Boolean => boolean_heuristic(text),
        ScoreType::Float => None,
    };

    (None, score_boolean, Some(text.to_string()), None)
}

fn extract_from_json(score_type: ScoreType, json: &Value) -> ParsedGrade {
    let score_float = match score_type {
        ScoreType::Float => json.get("score").and_then(Value::as_f64),
        ScoreType::Boolean => None,
    };
    let score_boolean = match score_type {
        ScoreType::Boolean => json.get("score").and_then(Value::as_bool),
        ScoreType::Float => None,
    };
    let reasoning = json
        .get("reasoning")
        .and_then(Value::as_str)
        .map(str::to_string);
    let confidence = json.get("confidence").and_then(Value::as_f64);

    (score_float, score_boolean, reasoning, confidence)
}

/// Case-insensitive, whole-word search for pass/fail vocabulary. Pass words
/// are checked first, matching the original service's `if/elif` order.
fn boolean_heuristic(text: &str) -> Option<bool> {
    const TRUE_WORDS: &[&str] = &["true", "pass", "yes"];
    const FALSE_WORDS: &[&str] = &["false", "fail", "no"];

    let words: Vec<String> = text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect();

    if words.iter().any(|w| TRUE_WORDS.contains(&w.as_str())) {
        return Some(true);
    }
    if words.iter().any(|w| FALSE_WORDS.contains(&w.as_str())) {
        return Some(false);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_json_wins_over_text() {
        let json = serde_json::json!({"score": 0.9, "reasoning": "good", "confidence": 0.8});
        let (score, _, reasoning, confidence) =
            parse_grading_response(ScoreType::Float, Some("ignored"), Some(&json));
        assert_eq!(score, Some(0.9));
        assert_eq!(reasoning, Some("good".to_string()));
        assert_eq!(confidence, Some(0.8));
    }

    #[test]
    fn text_that_parses_as_json_is_used() {
        let (score, _, _, _) =
            parse_grading_response(ScoreType::Float, Some(r#"{"score": 0.5}"#), None);
        assert_eq!(score, Some(0.5));
    }

    #[test]
    fn boolean_heuristic_matches_whole_words_case_insensitively() {
        let (_, score, reasoning, _) =
            parse_grading_response(ScoreType::Boolean, Some("The answer PASSES the bar."), None);
        assert_eq!(score, None, "PASSES is not the whole word pass");
        assert_eq!(reasoning, Some("The answer PASSES the bar.".to_string()));

        let (_, score, _, _) =
            parse_grading_response(ScoreType::Boolean, Some("Verdict: Pass."), None);
        assert_eq!(score, Some(true));
    }

    #[test]
    fn no_recognizable_vocabulary_yields_none() {
        let (_, score, reasoning, _) =
            parse_grading_response(ScoreType::Boolean, Some("inconclusive output"), None);
        assert_eq!(score, None);
        assert_eq!(reasoning, Some("inconclusive output".to_string()));
    }
}

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

//! Template Matcher (spec §4.B).
//!
//! Templates use `{{var_name}}` placeholders. Matching segments the
//! template into literal fragments and placeholders, then scans the
//! candidate left-to-right requiring every literal to appear in order; the
//! substring between consecutive literals binds to the placeholder between
//! them. Matching is plain substring search, not a regex engine — literals
//! are therefore always matched verbatim without an escaping step.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    pub variables: HashMap<String, String>,
}

fn segment(template: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut literal_buf = String::new();
    loop {
        match rest.find("{{") {
            None => {
                literal_buf.push_str(rest);
                break;
            }
            Some(start) => {
                literal_buf.push_str(&rest[..start]);
                let after_open = &rest[start + 2..];
                match after_open.find("}}") {
                    None => {
                        // Unterminated placeholder: treat the rest as literal.
                        literal_buf.push_str(&rest[start..]);
                        break;
                    }
                    Some(end) => {
                        if !literal_buf.is_empty() {
                            segments.push(Segment::Literal(std::mem::take(&mut literal_buf)));
                        }
                        segments.push(Segment::Placeholder(after_open[..end].trim().to_string()));
                        rest = &after_open[end + 2..];
                    }
                }
            }
        }
    }
    if !literal_buf.is_empty() {
        segments.push(Segment::Literal(literal_buf));
    }
    segments
}

/// Match `candidate` against `template`, returning the bound variables.
pub fn match_template(template: &str, candidate: &str) -> MatchResult {
    let segments = segment(template);
    if segments.is_empty() {
        return MatchResult {
            matched: candidate.is_empty(),
            variables: HashMap::new(),
        };
    }

    let mut variables = HashMap::new();
    let mut pos = 0usize;
    let mut i = 0usize;

    while i < segments.len() {
        match &segments[i] {
            Segment::Literal(lit) => match candidate[pos..].find(lit.as_str()) {
                Some(offset) => {
                    pos += offset + lit.len();
                    i += 1;
                }
                None => {
                    return MatchResult {
                        matched: false,
                        variables: HashMap::new(),
                    }
                }
            },
            Segment::Placeholder(_) => {
                // Collect the run of consecutive placeholders.
                let run_start = i;
                let mut run_end = i;
                while run_end < segments.len() && matches!(segments[run_end], Segment::Placeholder(_)) {
                    run_end += 1;
                }
                let region_end = match segments.get(run_end) {
                    Some(Segment::Literal(lit)) => match candidate[pos..].find(lit.as_str()) {
                        Some(offset) => pos + offset,
                        None => {
                            return MatchResult {
                                matched: false,
                                variables: HashMap::new(),
                            }
                        }
                    },
                    _ => candidate.len(),
                };
                bind_placeholder_run(
                    &segments[run_start..run_end],
                    &candidate[pos..region_end],
                    region_end == candidate.len() && run_end == segments.len(),
                    &mut variables,
                );
                pos = region_end;
                i = run_end;
            }
        }
    }

    MatchResult {
        matched: true,
        variables,
    }
}

/// Bind a run of adjacent placeholders (no literal between them) over
/// `region`. `region_is_open_ended` is true when there is no following
/// literal at all (end of template), which flips the split policy per
/// spec §4.B.
fn bind_placeholder_run(
    run: &[Segment],
    region: &str,
    region_is_open_ended: bool,
    variables: &mut HashMap<String, String>,
) {
    let names: Vec<&str> = run
        .iter()
        .map(|s| match s {
            Segment::Placeholder(n) => n.as_str(),
            _ => unreachable!(),
        })
        .collect();

    if names.len() == 1 {
        variables.insert(names[0].to_string(), region.to_string());
        return;
    }

    if region_is_open_ended {
        // All but the last bind to empty; the last takes the full remainder.
        for name in &names[..names.len() - 1] {
            variables.insert(name.to_string(), String::new());
        }
        variables.insert(names[names.len() - 1].to_string(), region.to_string());
        return;
    }

    // All but the last take a minimal one-char, non-empty prefix in order;
    // the last takes whatever remains of the region.
    let mut chars = region.char_indices().peekable();
    let mut consumed = 0usize;
    for name in &names[..names.len() - 1] {
        let taken = match chars.next() {
            Some((_, c)) => {
                consumed += c.len_utf8();
                c.to_string()
            }
            None => String::new(),
        };
        variables.insert(name.to_string(), taken);
    }
    variables.insert(names[names.len() - 1].to_string(), region[consumed..].to_string());
}

/// Render a template by substituting `{{name}}` with `variables[name]`.
/// Missing variables render as an empty string. Used by tests to exercise
/// the template-inverse property and by the optimizer/executor to build the
/// rendered prompt (§4.E uses the same substitution rule).
pub fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let segments = segment(template);
    let mut out = String::new();
    for seg in segments {
        match seg {
            Segment::Literal(lit) => out.push_str(&lit),
            Segment::Placeholder(name) => {
                if let Some(value) = variables.get(&name) {
                    out.push_str(value);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_simple_placeholder() {
        let result = match_template(
            "Hello, {{name}}! You are user #{{user_id}}.",
            "Hello, Alice! You are user #42.",
        );
        assert!(result.matched);
        assert_eq!(result.variables.get("name"), Some(&"Alice".to_string()));
        assert_eq!(result.variables.get("user_id"), Some(&"42".to_string()));
    }

    #[test]
    fn literal_not_found_fails_to_match() {
        let result = match_template("Hello, {{name}}!", "Goodbye, Alice!");
        assert!(!result.matched);
    }

    #[test]
    fn empty_template_matches_only_empty_candidate() {
        assert!(match_template("", "").matched);
        assert!(!match_template("", "x").matched);
    }

    #[test]
    fn adjacent_placeholders_with_trailing_literal() {
        let result = match_template("{{a}}{{b}} end", "xy end");
        assert!(result.matched);
        assert_eq!(result.variables.get("a"), Some(&"x".to_string()));
        assert_eq!(result.variables.get("b"), Some(&"y".to_string()));
    }

    #[test]
    fn adjacent_placeholders_open_ended() {
        let result = match_template("prefix {{a}}{{b}}", "prefix hello world");
        assert!(result.matched);
        assert_eq!(result.variables.get("a"), Some(&"".to_string()));
        assert_eq!(result.variables.get("b"), Some(&"hello world".to_string()));
    }

    #[test]
    fn template_inverse_round_trips_for_non_colliding_values() {
        let template = "Hello, {{name}}! You are user #{{user_id}}.";
        let mut vars = HashMap::new();
        vars.insert("name".to_string(), "Bob".to_string());
        vars.insert("user_id".to_string(), "7".to_string());
        let rendered = render(template, &vars);
        let result = match_template(template, &rendered);
        assert!(result.matched);
        assert_eq!(result.variables, vars);
    }
}

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

/// Render a grader prompt against `context`, substituting the single
/// `{{context}}` placeholder (spec §4.F step 3).
///
/// `{{` and `}}` are an escape for a literal `{`/`}` — same convention as
/// Python's `str.format`, which the original service leaned on directly.
/// Any other single-brace run is an error rather than being silently
/// dropped, since a template author who wrote it almost certainly meant a
/// placeholder.
pub fn render_grading_prompt(prompt: &str, context: &str) -> Result<String, String> {
    let mut out = String::with_capacity(prompt.len() + context.len());
    let mut chars = prompt.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' => {
                if chars.peek() == Some(&'{') {
                    chars.next();
                    out.push('{');
                    continue;
                }
                let name: String = chars.by_ref().take_while(|&c| c != '}').collect();
                if name == "context" {
                    out.push_str(context);
                } else {
                    return Err(format!("unknown placeholder {{{name}}} in grading prompt"));
                }
            }
            '}' => {
                if chars.peek() == Some(&'}') {
                    chars.next();
                    out.push('}');
                } else {
                    return Err("unmatched '}' in grading prompt".to_string());
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_context_placeholder() {
        let rendered = render_grading_prompt("Judge this: {{context}}", "it was fine").unwrap();
        assert_eq!(rendered, "Judge this: it was fine");
    }

    #[test]
    fn double_braces_escape_to_literal() {
        let rendered = render_grading_prompt("literal {{braces}}", "ctx").unwrap();
        assert_eq!(rendered, "literal {braces}");
    }

    #[test]
    fn unknown_placeholder_is_an_error() {
        assert!(render_grading_prompt("{unknown}", "ctx").is_err());
    }
}

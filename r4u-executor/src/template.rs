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

/// Names of every `{{name}}` placeholder in `template`, in encounter order
/// (duplicates kept — the caller only cares about presence). Unterminated
/// `{{` is ignored, same as `r4u_matcher::segment`'s literal fallback.
pub fn placeholder_names(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            None => break,
            Some(end) => {
                names.push(after_open[..end].trim().to_string());
                rest = &after_open[end + 2..];
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_names_in_order() {
        assert_eq!(
            placeholder_names("Hello {{name}}, ticket #{{ticket_id}}"),
            vec!["name".to_string(), "ticket_id".to_string()]
        );
    }

    #[test]
    fn ignores_unterminated_placeholder() {
        assert_eq!(placeholder_names("Hello {{name"), Vec::<String>::new());
    }
}

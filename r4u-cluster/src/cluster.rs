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
use std::collections::{HashMap, HashSet};

pub const MIN_CLUSTER_SIZE: usize = 3;
const MIN_FIRST_MESSAGE_LEN: usize = 8;
const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Exact grouping key: `(project_id, path_or_null, model_normalized,
/// has_system_prompt)`. `None` paths group with each other, never with a
/// concrete path (a tuple `(proj, None, ...)` never equals `(proj, Some(p),
/// ...)`, which falls out of plain `HashMap` key equality already).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    project_id: u64,
    path: Option<String>,
    model: String,
    has_system_prompt: bool,
}

fn group_key(trace: &Trace) -> GroupKey {
    GroupKey {
        project_id: trace.project_id,
        path: trace.path.clone(),
        model: normalize_model(&trace.model),
        has_system_prompt: trace.has_system_prompt(),
    }
}

fn normalize_model(model: &str) -> String {
    model.trim().to_lowercase()
}

/// A group of traces found similar enough to infer a template from.
pub struct ClusterCandidate {
    pub project_id: u64,
    pub path: Option<String>,
    pub model: String,
    pub trace_ids: Vec<u64>,
    pub template: Option<String>,
}

/// Token-set Jaccard similarity over whitespace-split tokens. Case is
/// preserved: callers comparing first-message text rely on exact wording,
/// only [`normalize_model`] lowercases.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let set_a: HashSet<&str> = a.split_whitespace().collect();
    let set_b: HashSet<&str> = b.split_whitespace().collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Group `traces` (already filtered to `implementation_id.is_none()` by the
/// caller) by exact key, require ≥ [`MIN_CLUSTER_SIZE`] qualifying members
/// with pairwise similarity ≥ 0.6, and infer a template for each surviving
/// group.
pub fn cluster_candidates(traces: &[Trace]) -> Vec<ClusterCandidate> {
    let mut groups: HashMap<GroupKey, Vec<&Trace>> = HashMap::new();
    for trace in traces {
        groups.entry(group_key(trace)).or_default().push(trace);
    }

    let mut candidates = Vec::new();
    for (key, members) in groups {
        if !key.has_system_prompt {
            // "if a cluster has no system prompt in any member, inference is skipped"
            continue;
        }
        let qualifying: Vec<&&Trace> = members
            .iter()
            .filter(|t| {
                t.first_message_text()
                    .map(|s| s.len() >= MIN_FIRST_MESSAGE_LEN)
                    .unwrap_or(false)
            })
            .collect();
        if qualifying.len() < MIN_CLUSTER_SIZE {
            continue;
        }
        let texts: Vec<&str> = qualifying
            .iter()
            .filter_map(|t| t.first_message_text())
            .collect();
        if !all_pairs_similar(&texts) {
            continue;
        }
        let template = infer_template(&texts);
        candidates.push(ClusterCandidate {
            project_id: key.project_id,
            path: key.path.clone(),
            model: key.model.clone(),
            trace_ids: qualifying.iter().map(|t| t.id).collect(),
            template,
        });
    }
    candidates
}

fn all_pairs_similar(texts: &[&str]) -> bool {
    for i in 0..texts.len() {
        for j in (i + 1)..texts.len() {
            if jaccard_similarity(texts[i], texts[j]) < SIMILARITY_THRESHOLD {
                return false;
            }
        }
    }
    true
}

/// Infer a `{{var_k}}` template from N sample strings by aligning them
/// against their common token subsequence (a generalization of pairwise LCS
/// to N sequences via sequential intersection). Runs of tokens absent from
/// the common subsequence collapse into one placeholder, numbered in
/// encounter order. Returns `None` only if the sample list is empty.
pub fn infer_template(samples: &[&str]) -> Option<String> {
    if samples.is_empty() {
        return None;
    }
    let token_lists: Vec<Vec<&str>> = samples.iter().map(|s| s.split_whitespace().collect()).collect();

    if samples.iter().all(|s| *s == samples[0]) {
        return Some(samples[0].to_string());
    }

    let mut common = token_lists[0].clone();
    for tokens in &token_lists[1..] {
        common = lcs_tokens(&common, tokens);
    }

    let reference = &token_lists[0];
    let mut template_parts: Vec<String> = Vec::new();
    let mut placeholder_run: Vec<&str> = Vec::new();
    let mut common_idx = 0usize;
    let mut placeholder_count = 0usize;

    let flush_run = |run: &mut Vec<&str>, parts: &mut Vec<String>, count: &mut usize| {
        if !run.is_empty() {
            *count += 1;
            parts.push(format!("{{{{var_{count}}}}}"));
            run.clear();
        }
    };

    for token in reference {
        if common_idx < common.len() && *token == common[common_idx] {
            flush_run(&mut placeholder_run, &mut template_parts, &mut placeholder_count);
            template_parts.push((*token).to_string());
            common_idx += 1;
        } else {
            placeholder_run.push(token);
        }
    }
    flush_run(&mut placeholder_run, &mut template_parts, &mut placeholder_count);

    Some(template_parts.join(" "))
}

/// Classic LCS over token slices, returned as the matched token values.
fn lcs_tokens<'a>(a: &[&'a str], b: &[&str]) -> Vec<&'a str> {
    let (n, m) = (a.len(), b.len());
    let mut dp = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            dp[i][j] = if a[i] == b[j] {
                dp[i + 1][j + 1] + 1
            } else {
                dp[i + 1][j].max(dp[i][j + 1])
            };
        }
    }
    let mut result = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            result.push(a[i]);
            i += 1;
            j += 1;
        } else if dp[i + 1][j] >= dp[i][j + 1] {
            i += 1;
        } else {
            j += 1;
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_identical_strings_is_one() {
        assert_eq!(jaccard_similarity("hello world", "hello world"), 1.0);
    }

    #[test]
    fn infers_single_placeholder_across_three_greetings() {
        let samples = vec![
            "Greet user Alice politely.",
            "Greet user Bob politely.",
            "Greet user Charlie politely.",
        ];
        let template = infer_template(&samples).unwrap();
        assert_eq!(template, "Greet user {{var_1}} politely.");
    }

    #[test]
    fn identical_samples_yield_no_placeholders() {
        let samples = vec!["same text", "same text", "same text"];
        let template = infer_template(&samples).unwrap();
        assert_eq!(template, "same text");
    }
}

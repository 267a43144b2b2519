// SPDX-FileCopyrightText: 2026 Mnemo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alias-table query expansion.
//!
//! A recall query fans out into a small ordered set of expansion
//! strings: the query itself, each alias of any query token, and the
//! query suffixed with that alias. Expansions are deduplicated in
//! insertion order so the original query always embeds first.

use std::collections::HashSet;

/// Static alias table keyed by lowercase query token.
const ALIASES: &[(&str, &[&str])] = &[
    ("db", &["database", "sqlite", "storage"]),
    ("database", &["db", "sqlite"]),
    ("llm", &["language model", "completion model"]),
    ("config", &["configuration", "settings"]),
    ("configuration", &["config"]),
    ("repo", &["repository", "git"]),
    ("auth", &["authentication", "login"]),
    ("docs", &["documentation", "reference"]),
    ("bug", &["defect", "issue"]),
    ("perf", &["performance", "latency"]),
    ("k8s", &["kubernetes"]),
    ("mem", &["memory"]),
];

/// True for CJK unified ideographs, which tokenize one char at a time.
fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fa5}').contains(&c)
}

/// Lowercased word tokens: Unicode letter/digit runs plus individual
/// CJK characters.
pub fn word_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_cjk(c) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            tokens.push(c.to_string());
        } else if c.is_alphanumeric() {
            current.extend(c.to_lowercase());
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Expand a raw query into an ordered, deduplicated set of strings.
///
/// Empty (or whitespace-only) input expands to nothing.
pub fn expand_query(query: &str) -> Vec<String> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut expansions: Vec<String> = Vec::new();
    let mut push = |s: String, seen: &mut HashSet<String>, out: &mut Vec<String>| {
        if seen.insert(s.clone()) {
            out.push(s);
        }
    };

    push(query.to_string(), &mut seen, &mut expansions);
    for token in word_tokens(query) {
        let Some((_, aliases)) = ALIASES.iter().find(|(key, _)| *key == token) else {
            continue;
        };
        for alias in *aliases {
            push((*alias).to_string(), &mut seen, &mut expansions);
            push(format!("{query} {alias}"), &mut seen, &mut expansions);
        }
    }
    expansions
}

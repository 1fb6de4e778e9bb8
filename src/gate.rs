use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use regex::Regex;

/// Compiled wildcard patterns, shared process-wide so repeated gates for
/// the same settings never recompile.
static COMPILED: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Decides whether a data category is enabled, from a list of wildcard
/// patterns like `"maps-*"` or `"stats"`. An empty list enables every
/// category; gating is opt-in.
#[derive(Debug, Clone, Default)]
pub struct FeatureGate {
    patterns: Vec<String>,
}

impl FeatureGate {
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self, category: &str) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        self.patterns.iter().any(|p| pattern_matches(p, category))
    }
}

fn pattern_matches(pattern: &str, category: &str) -> bool {
    let mut compiled = COMPILED.lock().unwrap();
    let regex = compiled
        .entry(pattern.to_string())
        .or_insert_with(|| compile(pattern));
    regex.is_match(category)
}

fn compile(pattern: &str) -> Regex {
    let escaped = regex::escape(pattern).replace("\\*", ".*");
    // escaping leaves nothing the regex parser can reject
    Regex::new(&format!("^{escaped}$")).expect("escaped wildcard pattern")
}

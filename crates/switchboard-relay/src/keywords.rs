use std::sync::{Arc, Mutex};

use regex::{Regex, RegexBuilder};

/// Case-insensitive search for operator-configured disable keywords
///
/// The compiled alternation is cached and rebuilt only when the keyword
/// list handed in differs from the one it was built from.
#[derive(Debug, Default)]
pub struct KeywordMatcher {
    compiled: Mutex<Option<Compiled>>,
}

#[derive(Debug)]
struct Compiled {
    keywords: Vec<String>,
    pattern: Option<Arc<Regex>>,
}

impl KeywordMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `message` contains any of `keywords`
    pub fn matches(&self, keywords: &[String], message: &str) -> bool {
        if message.is_empty() {
            return false;
        }

        self.pattern(keywords).is_some_and(|pattern| pattern.is_match(message))
    }

    fn pattern(&self, keywords: &[String]) -> Option<Arc<Regex>> {
        let mut compiled = self.compiled.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(current) = compiled.as_ref()
            && current.keywords == keywords
        {
            return current.pattern.clone();
        }

        let pattern = build(keywords).map(Arc::new);
        *compiled = Some(Compiled {
            keywords: keywords.to_vec(),
            pattern: pattern.clone(),
        });

        pattern
    }
}

fn build(keywords: &[String]) -> Option<Regex> {
    let alternation = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("|");

    if alternation.is_empty() {
        return None;
    }

    match RegexBuilder::new(&alternation).case_insensitive(true).build() {
        Ok(regex) => Some(regex),
        Err(e) => {
            tracing::warn!(error = %e, "disable keywords could not be compiled, keyword matching is off");
            None
        }
    }
}

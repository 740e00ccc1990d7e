//! Keyword-based intent classification for single-task submissions.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// What kind of answer a single task is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Refactoring / architecture / microservice migration
    Microservice,
    /// Code generation in a named programming language
    Generate,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Microservice => "microservice",
            Intent::Generate => "generate",
            Intent::General => "general",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

static ARCHITECTURE_KEYWORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:refactor\w*|micro-?services?|architect\w*|monolith\w*|decompos\w*|migrat\w*|moderni[sz]\w*)\b",
    )
    .unwrap()
});

// Plain "go" is left out: too common as an English word.
static LANGUAGE_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:java|python|rust|javascript|typescript|kotlin|scala|golang|ruby|php|swift|haskell|elixir)\b|\bc(?:\+\+|#)",
    )
    .unwrap()
});

/// Architecture keywords win over language names.
pub fn classify_intent(task: &str) -> Intent {
    if ARCHITECTURE_KEYWORDS.is_match(task) {
        Intent::Microservice
    } else if LANGUAGE_NAMES.is_match(task) {
        Intent::Generate
    } else {
        Intent::General
    }
}

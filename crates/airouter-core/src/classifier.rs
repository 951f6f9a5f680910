//! Content-based request classification
//!
//! Maps the text of the last message to a [`Category`] with an ordered list
//! of pattern rules. The first rule that matches wins, so the order of
//! [`RULES`] is part of the routing behavior: regional-language text that
//! also mentions "code" or "physics" must still reach the regional route.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Routing category derived from a prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// Turkmen-language content
    RegionalLanguage,
    /// Programming / software requests
    Coding,
    /// Science or math, answered by two providers side by side
    ScienceDual,
    /// Everything else
    General,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RegionalLanguage => write!(f, "regional-language"),
            Self::Coding => write!(f, "coding"),
            Self::ScienceDual => write!(f, "science-dual"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Turkmen letters outside ASCII. Any one of them is enough.
pub const REGIONAL_ALPHABET: &str = "ÄäŇňÖöŞşÜüÝýŽž";

/// Common Turkmen words matched as whole words
pub const REGIONAL_WORDS: &[&str] = &[
    "salam", "sagbol", "haýr", "gowy", "ýagşy", "bolýar", "näme", "bilen", "üçin", "gerek",
];

pub const CODING_KEYWORDS: &[&str] = &[
    "code",
    "app",
    "function",
    "program",
    "website",
    "api",
    "algorithm",
    "debug",
    "software",
    "develop",
];

/// Verb-then-"app" phrases, e.g. "create a todo app"
pub const CODING_PHRASES: &[&str] = &[r"create.*app", r"build.*app", r"make.*app"];

pub const SCIENCE_KEYWORDS: &[&str] = &[
    "chemistry", "physics", "math", "science", "equation", "formula", "theorem", "atom",
    "molecule", "calculate", "solve",
];

/// Build a whole-word alternation over escaped keywords plus raw fragments.
///
/// Word boundaries are ASCII-only: a non-ASCII letter next to a keyword
/// counts as a boundary, so "appé" still matches `app`.
fn word_pattern(words: &[&str], raw: &[&str]) -> Regex {
    let alternatives: Vec<String> = words
        .iter()
        .map(|w| regex::escape(w))
        .chain(raw.iter().map(|r| (*r).to_string()))
        .collect();
    Regex::new(&format!(r"(?-u:\b)(?:{})(?-u:\b)", alternatives.join("|")))
        .expect("static keyword pattern")
}

// -- Patterns compiled once via LazyLock. Inputs are lower-cased first. --

static REGIONAL_WORDS_RE: LazyLock<Regex> = LazyLock::new(|| word_pattern(REGIONAL_WORDS, &[]));

static CODING_RE: LazyLock<Regex> = LazyLock::new(|| word_pattern(CODING_KEYWORDS, CODING_PHRASES));

static SCIENCE_RE: LazyLock<Regex> = LazyLock::new(|| word_pattern(SCIENCE_KEYWORDS, &[]));

fn is_regional(original: &str, lower: &str) -> bool {
    original.chars().any(|c| REGIONAL_ALPHABET.contains(c)) || REGIONAL_WORDS_RE.is_match(lower)
}

fn is_coding(_original: &str, lower: &str) -> bool {
    CODING_RE.is_match(lower)
}

fn is_science(_original: &str, lower: &str) -> bool {
    SCIENCE_RE.is_match(lower)
}

/// One classification rule: a predicate over (original, lower-cased) text
struct Rule {
    category: Category,
    matches: fn(&str, &str) -> bool,
}

/// Evaluated top to bottom; `General` is the fall-through
static RULES: &[Rule] = &[
    Rule {
        category: Category::RegionalLanguage,
        matches: is_regional,
    },
    Rule {
        category: Category::Coding,
        matches: is_coding,
    },
    Rule {
        category: Category::ScienceDual,
        matches: is_science,
    },
];

/// Classify prompt text. Total and deterministic.
pub fn classify(text: &str) -> Category {
    let lower = text.to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.matches)(text, &lower))
        .map_or(Category::General, |rule| rule.category)
}

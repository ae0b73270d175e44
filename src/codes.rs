use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Code used when neither the reply nor its rationale yields one.
pub const DEFAULT_CODE: &str = "52000";
pub const DEFAULT_DESCRIPTION: &str = "Basic cystoscopy (cystourethroscopy)";

// Five-digit code with an optional one- or two-digit modifier suffix.
static CODE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5}(?:-\d{1,2})?\b").expect("static code pattern"));

/// Code-shaped tokens in `text`, first-seen order, without repeats.
pub fn extract_code_tokens(text: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for m in CODE_TOKEN.find_iter(text) {
        let token = m.as_str();
        if !out.iter().any(|t| t == token) {
            out.push(token.to_string());
        }
    }
    out
}

pub fn join_codes(codes: &[String]) -> String {
    codes.join(", ")
}

pub fn split_codes(codes: &str) -> Vec<String> {
    codes
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    /// Reads the leading word of a `Confidence` value, e.g. "High - clear documentation".
    pub fn parse_leading(value: &str) -> Option<Self> {
        let word: String = value
            .trim_start_matches(|c: char| !c.is_ascii_alphabetic())
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .collect();
        match word.to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" | "moderate" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        };
        f.write_str(s)
    }
}

//! Line-oriented parser for the labelled replies the oracle is asked to produce.
//!
//! A reply looks like
//!
//! ```text
//! CPT Code(s): 51725, 51797-51
//! Description: Simple cystometrogram; Voiding pressure studies
//! Explanation: The patient underwent ...
//! which continues over as many lines as the model likes.
//! Confidence: High
//! ```
//!
//! Parsing never fails. Missing fields stay empty and are filled in later by
//! the stage's fallback policy.

use crate::codes::Confidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Code,
    Description,
    Explanation,
    Confidence,
}

impl Label {
    fn prefixes(self) -> &'static [&'static str] {
        match self {
            Label::Code => &["CPT Code", "CPT code"],
            Label::Description => &["Description"],
            Label::Explanation => &["Explanation"],
            Label::Confidence => &["Confidence"],
        }
    }

    /// Returns the field value when `line` starts with this label.
    fn value_of(self, line: &str) -> Option<&str> {
        let line = line.trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#');
        let rest = self
            .prefixes()
            .iter()
            .find_map(|prefix| line.strip_prefix(prefix))?;
        let rest = rest
            .strip_prefix("(s)")
            .or_else(|| rest.strip_prefix('s'))
            .unwrap_or(rest);
        let rest = rest.trim_start_matches(|c: char| {
            c.is_whitespace() || matches!(c, ':' | '-' | '*' | '.' | '=')
        });
        Some(rest.trim_end_matches(|c: char| c.is_whitespace() || c == '*'))
    }
}

/// Which labels a stage recognizes, and which of them end an Explanation
/// block instead of being absorbed into it.
#[derive(Debug, Clone, Copy)]
pub struct Grammar {
    pub labels: &'static [Label],
    pub explanation_breaks: &'static [Label],
}

pub const SUGGESTION_GRAMMAR: Grammar = Grammar {
    labels: &[Label::Code, Label::Description, Label::Explanation],
    explanation_breaks: &[],
};

pub const VERDICT_GRAMMAR: Grammar = Grammar {
    labels: &[
        Label::Code,
        Label::Description,
        Label::Explanation,
        Label::Confidence,
    ],
    explanation_breaks: &[Label::Confidence],
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeLabels,
    InCode,
    InDescription,
    InExplanation,
    InConfidence,
}

impl State {
    fn after(label: Label) -> Self {
        match label {
            Label::Code => State::InCode,
            Label::Description => State::InDescription,
            Label::Explanation => State::InExplanation,
            Label::Confidence => State::InConfidence,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    pub codes: String,
    pub description: String,
    pub rationale: String,
    pub confidence: Option<Confidence>,
}

impl Grammar {
    pub fn parse(&self, reply: &str) -> ParsedReply {
        let mut out = ParsedReply::default();
        let mut seen: Vec<Label> = Vec::with_capacity(self.labels.len());
        let mut state = State::BeforeLabels;

        for line in reply.trim().lines() {
            let candidates = if state == State::InExplanation {
                self.explanation_breaks
            } else {
                self.labels
            };
            let hit = candidates
                .iter()
                .find_map(|&label| label.value_of(line).map(|value| (label, value)));

            if let Some((label, value)) = hit {
                // First occurrence wins; repeats are dropped.
                if seen.contains(&label) {
                    continue;
                }
                seen.push(label);
                match label {
                    Label::Code => out.codes = value.to_string(),
                    Label::Description => out.description = value.to_string(),
                    Label::Explanation => out.rationale = value.to_string(),
                    Label::Confidence => out.confidence = Confidence::parse_leading(value),
                }
                state = State::after(label);
                continue;
            }

            if state == State::InExplanation {
                let line = line.trim_end();
                if line.trim().is_empty() {
                    continue;
                }
                if !out.rationale.is_empty() {
                    out.rationale.push(' ');
                }
                out.rationale.push_str(line);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_labelled_fields() {
        let reply = "CPT Code(s): 51725, 51797-51\nDescription: A; B\nExplanation: because of X and Y";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "51725, 51797-51");
        assert_eq!(parsed.description, "A; B");
        assert_eq!(parsed.rationale, "because of X and Y");
        assert_eq!(parsed.confidence, None);
    }

    #[test]
    fn accepts_lowercase_code_label_and_markdown_emphasis() {
        let reply = "**CPT code:** 52000\n**Description:** Cystourethroscopy\nExplanation: diagnostic only";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52000");
        assert_eq!(parsed.description, "Cystourethroscopy");
    }

    #[test]
    fn plural_code_label_is_not_part_of_the_value() {
        let reply = "CPT Codes: 52000, 52332-51\nDescription: A; B\nExplanation: both";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52000, 52332-51");
    }

    #[test]
    fn trailing_emphasis_is_dropped_from_values() {
        let reply = "**CPT Code: 52000**\n**Description: Cystourethroscopy**\nExplanation: ok";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52000");
        assert_eq!(parsed.description, "Cystourethroscopy");
    }

    #[test]
    fn ignores_preamble_and_unknown_labels() {
        let reply = "Sure, here is my analysis.\nNotes: none\nCPT Code: 52000\nModifier: n/a\nDescription: Cystoscopy\nExplanation: short";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52000");
        assert_eq!(parsed.description, "Cystoscopy");
        assert_eq!(parsed.rationale, "short");
    }

    #[test]
    fn explanation_absorbs_following_lines_in_order() {
        let reply = "CPT Code: 52000\nDescription: Cystoscopy\nExplanation: first\nsecond line\n\nthird line\nCPT Code: 99999";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52000");
        assert_eq!(parsed.rationale, "first second line third line CPT Code: 99999");
    }

    #[test]
    fn confidence_line_ends_explanation_in_verdicts() {
        let reply = "CPT Code: 52332\nDescription: Stent\nExplanation: stent placed\nunilateral\nConfidence: High - clear op note\ntrailing chatter";
        let parsed = VERDICT_GRAMMAR.parse(reply);
        assert_eq!(parsed.codes, "52332");
        assert_eq!(parsed.rationale, "stent placed unilateral");
        assert_eq!(parsed.confidence, Some(Confidence::High));
    }

    #[test]
    fn suggestion_grammar_keeps_confidence_text_in_rationale() {
        let reply = "CPT Code: 52000\nExplanation: basic\nConfidence: High";
        let parsed = SUGGESTION_GRAMMAR.parse(reply);
        assert_eq!(parsed.rationale, "basic Confidence: High");
        assert_eq!(parsed.confidence, None);
    }

    #[test]
    fn first_occurrence_of_a_label_wins() {
        let reply = "Description: first\nDescription: second\nCPT Code: 52000";
        let parsed = VERDICT_GRAMMAR.parse(reply);
        assert_eq!(parsed.description, "first");
        assert_eq!(parsed.codes, "52000");
    }

    #[test]
    fn missing_labels_leave_fields_empty() {
        let parsed = VERDICT_GRAMMAR.parse("Description: none\nExplanation: unclear");
        assert!(parsed.codes.is_empty());
        assert_eq!(parsed.description, "none");
        assert_eq!(parsed.rationale, "unclear");
        assert_eq!(parsed.confidence, None);

        assert_eq!(VERDICT_GRAMMAR.parse(""), ParsedReply::default());
    }

    #[test]
    fn unrecognized_confidence_value_reads_as_absent() {
        let parsed = VERDICT_GRAMMAR.parse("CPT Code: 52000\nConfidence: somewhat");
        assert_eq!(parsed.confidence, None);
    }
}

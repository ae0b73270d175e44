use std::fmt;

use crate::codes::{DEFAULT_CODE, DEFAULT_DESCRIPTION};
use crate::oracle::{Oracle, OracleError, OracleRequest};
use crate::reply::{Grammar, ParsedReply};
use crate::table::CodeTable;

pub const DEFAULT_CODE_NOTE: &str = "Note: Default code 52000 (basic cystoscopy) was used due to insufficient detail in the scenario.";

#[derive(Debug, Clone)]
pub struct StageSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[cfg(test)]
impl StageSettings {
    pub fn suggest_defaults() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            temperature: 0.1,
            max_tokens: 500,
        }
    }

    pub fn validate_defaults() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            temperature: 0.1,
            max_tokens: 800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Suggest,
    Validate,
}

impl StageKind {
    fn failure_prefix(self) -> &'static str {
        match self {
            StageKind::Suggest => "Error analyzing scenario",
            StageKind::Validate => "Error validating CPT code",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageKind::Suggest => "suggest",
            StageKind::Validate => "validate",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("CPT data could not be loaded")]
    DataUnavailable,
    #[error("{}: {source}", .stage.failure_prefix())]
    Oracle {
        stage: StageKind,
        #[source]
        source: OracleError,
    },
}

/// One oracle round-trip grounded in the reference table: build the request,
/// call the oracle once, parse the reply with the stage's grammar.
pub(crate) struct GroundedQuery<'a> {
    pub stage: StageKind,
    pub system: &'static str,
    pub prompt: String,
    pub grammar: Grammar,
    pub settings: &'a StageSettings,
}

impl GroundedQuery<'_> {
    pub async fn ask(self, oracle: &dyn Oracle) -> Result<ParsedReply, StageError> {
        let request = OracleRequest {
            model: self.settings.model.clone(),
            system: self.system.to_string(),
            user: self.prompt,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };
        tracing::debug!(
            stage = %self.stage,
            model = %request.model,
            prompt_len = request.user.len(),
            "calling oracle"
        );

        let reply = oracle
            .complete(&request)
            .await
            .map_err(|source| StageError::Oracle {
                stage: self.stage,
                source,
            })?;
        tracing::debug!(stage = %self.stage, reply_len = reply.len(), "oracle replied");

        Ok(self.grammar.parse(&reply))
    }
}

pub(crate) fn require_table(table: Option<&CodeTable>) -> Result<&CodeTable, StageError> {
    table.ok_or(StageError::DataUnavailable)
}

pub(crate) fn append_note(rationale: &mut String, note: &str) {
    if !rationale.trim().is_empty() {
        rationale.push(' ');
    }
    rationale.push_str(note);
}

/// Fills in the fixed default code, its description when none was given,
/// and the audit note explaining why.
pub(crate) fn apply_default_code(
    codes: &mut String,
    description: &mut String,
    rationale: &mut String,
    table: &CodeTable,
) {
    *codes = DEFAULT_CODE.to_string();
    if description.trim().is_empty() {
        *description = table
            .description_for(DEFAULT_CODE)
            .unwrap_or(DEFAULT_DESCRIPTION)
            .to_string();
    }
    append_note(rationale, DEFAULT_CODE_NOTE);
}

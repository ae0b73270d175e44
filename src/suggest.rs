use std::sync::Arc;

use serde::Serialize;

use crate::codes::{extract_code_tokens, join_codes, split_codes};
use crate::oracle::Oracle;
use crate::prompts::{SUGGEST_SYSTEM, suggestion_prompt};
use crate::reply::{ParsedReply, SUGGESTION_GRAMMAR};
use crate::stage::{
    GroundedQuery, StageError, StageKind, StageSettings, apply_default_code, require_table,
};
use crate::table::CodeTable;

/// First-pass coding suggestion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    /// Comma-joined codes, most significant first, e.g. "52332, 52000-51".
    #[serde(rename = "cpt_code")]
    pub codes: String,
    pub description: String,
    #[serde(rename = "explanation")]
    pub rationale: String,
}

impl Suggestion {
    pub fn code_list(&self) -> Vec<String> {
        split_codes(&self.codes)
    }
}

pub struct SuggestionStage {
    oracle: Arc<dyn Oracle>,
    settings: StageSettings,
    table: Option<Arc<CodeTable>>,
}

impl SuggestionStage {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        settings: StageSettings,
        table: Option<Arc<CodeTable>>,
    ) -> Self {
        Self {
            oracle,
            settings,
            table,
        }
    }

    pub async fn suggest(&self, scenario: &str) -> Result<Suggestion, StageError> {
        let table = require_table(self.table.as_deref())?;
        tracing::info!(model = %self.settings.model, "suggest stage started");

        let parsed = GroundedQuery {
            stage: StageKind::Suggest,
            system: SUGGEST_SYSTEM,
            prompt: suggestion_prompt(scenario, &table.render()),
            grammar: SUGGESTION_GRAMMAR,
            settings: &self.settings,
        }
        .ask(self.oracle.as_ref())
        .await?;

        let suggestion = resolve_suggestion(parsed, table);
        tracing::info!(codes = %suggestion.codes, "suggest stage finished");
        Ok(suggestion)
    }
}

/// Guarantees a non-empty code list: codes named in the rationale first,
/// then the fixed default.
pub fn resolve_suggestion(parsed: ParsedReply, table: &CodeTable) -> Suggestion {
    let ParsedReply {
        mut codes,
        mut description,
        mut rationale,
        ..
    } = parsed;

    if codes.trim().is_empty() {
        let found = extract_code_tokens(&rationale);
        if found.is_empty() {
            tracing::warn!("suggestion reply had no codes; using default code");
            apply_default_code(&mut codes, &mut description, &mut rationale, table);
        } else {
            tracing::warn!(count = found.len(), "suggestion codes recovered from explanation");
            codes = join_codes(&found);
        }
    }

    Suggestion {
        codes,
        description,
        rationale,
    }
}

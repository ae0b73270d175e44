use std::sync::Arc;

use serde::Serialize;

use crate::codes::{Confidence, extract_code_tokens, join_codes, split_codes};
use crate::oracle::Oracle;
use crate::prompts::{VALIDATE_SYSTEM, validation_prompt};
use crate::reply::{ParsedReply, VERDICT_GRAMMAR};
use crate::stage::{
    GroundedQuery, StageError, StageKind, StageSettings, append_note, apply_default_code,
    require_table,
};
use crate::suggest::Suggestion;
use crate::table::CodeTable;

pub const RETAINED_NOTE: &str =
    "Note: No better alternative was found, so the original suggestion was retained.";

/// Reviewed, confidence-rated coding decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    #[serde(rename = "cpt_code")]
    pub codes: String,
    pub description: String,
    #[serde(rename = "explanation")]
    pub rationale: String,
    pub confidence: Confidence,
}

impl Verdict {
    pub fn code_list(&self) -> Vec<String> {
        split_codes(&self.codes)
    }
}

pub struct ValidationStage {
    oracle: Arc<dyn Oracle>,
    settings: StageSettings,
    table: Option<Arc<CodeTable>>,
}

impl ValidationStage {
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

    pub async fn validate(
        &self,
        scenario: &str,
        suggestion: &Suggestion,
    ) -> Result<Verdict, StageError> {
        let table = require_table(self.table.as_deref())?;
        tracing::info!(
            model = %self.settings.model,
            suggested = %suggestion.codes,
            "validate stage started"
        );

        let parsed = GroundedQuery {
            stage: StageKind::Validate,
            system: VALIDATE_SYSTEM,
            prompt: validation_prompt(scenario, suggestion, &table.render()),
            grammar: VERDICT_GRAMMAR,
            settings: &self.settings,
        }
        .ask(self.oracle.as_ref())
        .await?;

        let verdict = resolve_verdict(parsed, suggestion, table);
        tracing::info!(
            codes = %verdict.codes,
            confidence = %verdict.confidence,
            "validate stage finished"
        );
        Ok(verdict)
    }
}

/// Layered fallback for an empty code field: keep the upstream suggestion,
/// else codes named in the rationale, else the fixed default at Low
/// confidence. Confidence nobody set ends up Medium.
pub fn resolve_verdict(parsed: ParsedReply, upstream: &Suggestion, table: &CodeTable) -> Verdict {
    let ParsedReply {
        mut codes,
        mut description,
        mut rationale,
        mut confidence,
    } = parsed;

    if codes.trim().is_empty() {
        if !upstream.codes.trim().is_empty() {
            tracing::warn!("verdict reply had no codes; retaining suggestion");
            codes = upstream.codes.clone();
            if description.trim().is_empty() {
                description = upstream.description.clone();
            }
            confidence.get_or_insert(Confidence::Low);
            append_note(&mut rationale, RETAINED_NOTE);
        } else {
            let found = extract_code_tokens(&rationale);
            if found.is_empty() {
                tracing::warn!("verdict reply had no codes; using default code");
                apply_default_code(&mut codes, &mut description, &mut rationale, table);
                confidence = Some(Confidence::Low);
            } else {
                tracing::warn!(count = found.len(), "verdict codes recovered from explanation");
                codes = join_codes(&found);
            }
        }
    }

    Verdict {
        codes,
        description,
        rationale,
        confidence: confidence.unwrap_or(Confidence::Medium),
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use serde::Serialize;

use crate::cli::{MAX_TEMPERATURE, OracleArgs, TableArgs};
use crate::codes::Confidence;
use crate::oracle::{OpenAiOracle, Oracle};
use crate::stage::{StageError, StageSettings};
use crate::suggest::{Suggestion, SuggestionStage};
use crate::table::TableSource;
use crate::validate::{ValidationStage, Verdict};

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("No scenario provided")]
    EmptyScenario,
    #[error(transparent)]
    Stage(#[from] StageError),
}

/// Combined result of both stages plus the flattened final fields.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub analyzer_result: Suggestion,
    pub validator_result: Verdict,
    pub final_cpt_code: String,
    pub final_description: String,
    pub final_explanation: String,
    pub confidence: Confidence,
    pub has_multiple_codes: bool,
    pub cpt_codes: Vec<String>,
}

impl Analysis {
    fn new(suggestion: Suggestion, verdict: Verdict) -> Self {
        let cpt_codes = verdict.code_list();
        Self {
            final_cpt_code: verdict.codes.clone(),
            final_description: verdict.description.clone(),
            final_explanation: verdict.rationale.clone(),
            confidence: verdict.confidence,
            has_multiple_codes: cpt_codes.len() > 1,
            cpt_codes,
            analyzer_result: suggestion,
            validator_result: verdict,
        }
    }
}

/// Runs suggestion then validation for each scenario. Both stages load
/// their own copy of the reference table for every request.
pub struct Pipeline {
    source: TableSource,
    suggest_oracle: Arc<dyn Oracle>,
    validate_oracle: Arc<dyn Oracle>,
    suggest_settings: StageSettings,
    validate_settings: StageSettings,
}

impl Pipeline {
    pub fn new(
        source: TableSource,
        suggest_oracle: Arc<dyn Oracle>,
        validate_oracle: Arc<dyn Oracle>,
        suggest_settings: StageSettings,
        validate_settings: StageSettings,
    ) -> Self {
        Self {
            source,
            suggest_oracle,
            validate_oracle,
            suggest_settings,
            validate_settings,
        }
    }

    /// Wires both stages to one OpenAI-compatible endpoint.
    pub fn from_args(table: &TableArgs, oracle: &OracleArgs) -> anyhow::Result<Self> {
        if !(0.0..=MAX_TEMPERATURE).contains(&oracle.temperature) {
            bail!(
                "temperature {} is outside 0.0..={MAX_TEMPERATURE}; replies must stay in the labelled format",
                oracle.temperature
            );
        }

        let client: Arc<dyn Oracle> = Arc::new(OpenAiOracle::new(
            &oracle.api_base_url,
            &oracle.api_key,
            Duration::from_secs(oracle.request_timeout_secs),
        )?);

        Ok(Self::new(
            TableSource::new(&table.table_path),
            Arc::clone(&client),
            client,
            StageSettings {
                model: oracle.suggest_model.clone(),
                temperature: oracle.temperature,
                max_tokens: oracle.suggest_max_tokens,
            },
            StageSettings {
                model: oracle.validate_model.clone(),
                temperature: oracle.temperature,
                max_tokens: oracle.validate_max_tokens,
            },
        ))
    }

    pub fn source(&self) -> &TableSource {
        &self.source
    }

    pub fn suggest_settings(&self) -> &StageSettings {
        &self.suggest_settings
    }

    pub fn validate_settings(&self) -> &StageSettings {
        &self.validate_settings
    }

    pub async fn analyze(&self, scenario: &str) -> Result<Analysis, AnalyzeError> {
        if scenario.trim().is_empty() {
            return Err(AnalyzeError::EmptyScenario);
        }

        let suggester = SuggestionStage::new(
            Arc::clone(&self.suggest_oracle),
            self.suggest_settings.clone(),
            self.source.load_for_stage("suggest"),
        );
        let suggestion = suggester.suggest(scenario).await?;
        tracing::debug!(count = suggestion.code_list().len(), "suggested codes");

        let validator = ValidationStage::new(
            Arc::clone(&self.validate_oracle),
            self.validate_settings.clone(),
            self.source.load_for_stage("validate"),
        );
        let verdict = validator.validate(scenario, &suggestion).await?;

        Ok(Analysis::new(suggestion, verdict))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{pipeline, table_file};
    use super::*;
    use crate::oracle::testing::ScriptedOracle;

    #[tokio::test]
    async fn runs_both_stages_in_order() {
        let table = table_file();
        let suggest = Arc::new(ScriptedOracle::replying(&[
            "CPT Code: 51725\nDescription: CMG\nExplanation: cystometrogram only",
        ]));
        let validate = Arc::new(ScriptedOracle::replying(&[
            "CPT Code: 51725, 51797-51\nDescription: CMG; Voiding pressure\nExplanation: pressures were also recorded\nConfidence: High",
        ]));
        let p = pipeline(table.path(), suggest.clone(), validate.clone());

        let analysis = p.analyze("Urodynamics with voiding pressures.").await.unwrap();

        assert_eq!(analysis.analyzer_result.codes, "51725");
        assert_eq!(analysis.final_cpt_code, "51725, 51797-51");
        assert_eq!(analysis.final_description, "CMG; Voiding pressure");
        assert_eq!(analysis.final_explanation, "pressures were also recorded");
        assert_eq!(analysis.confidence, Confidence::High);
        assert!(analysis.has_multiple_codes);
        assert_eq!(analysis.cpt_codes, vec!["51725", "51797-51"]);

        assert_eq!(suggest.calls(), 1);
        assert_eq!(validate.calls(), 1);
        assert!(validate.request(0).user.contains("CPT Code: 51725\n"));
    }

    #[tokio::test]
    async fn empty_scenario_is_rejected_before_any_stage() {
        let table = table_file();
        let suggest = Arc::new(ScriptedOracle::default());
        let validate = Arc::new(ScriptedOracle::default());
        let p = pipeline(table.path(), suggest.clone(), validate.clone());

        for scenario in ["", "   \n"] {
            let err = p.analyze(scenario).await.unwrap_err();
            assert!(matches!(err, AnalyzeError::EmptyScenario));
            assert_eq!(err.to_string(), "No scenario provided");
        }
        assert_eq!(suggest.calls(), 0);
        assert_eq!(validate.calls(), 0);
    }

    #[tokio::test]
    async fn suggestion_failure_skips_validation() {
        let table = table_file();
        let suggest = Arc::new(ScriptedOracle::failing(500));
        let validate = Arc::new(ScriptedOracle::default());
        let p = pipeline(table.path(), suggest, validate.clone());

        let err = p.analyze("scenario").await.unwrap_err();
        assert!(err.to_string().starts_with("Error analyzing scenario:"));
        assert_eq!(validate.calls(), 0);
    }

    #[tokio::test]
    async fn missing_table_is_a_data_error() {
        let dir = tempfile::tempdir().unwrap();
        let suggest = Arc::new(ScriptedOracle::default());
        let validate = Arc::new(ScriptedOracle::default());
        let p = pipeline(&dir.path().join("missing.csv"), suggest.clone(), validate);

        let err = p.analyze("scenario").await.unwrap_err();
        assert!(matches!(err, AnalyzeError::Stage(StageError::DataUnavailable)));
        assert_eq!(err.to_string(), "CPT data could not be loaded");
        assert_eq!(suggest.calls(), 0);
    }

    #[test]
    fn rejects_high_temperature() {
        let table = TableArgs {
            table_path: "t.csv".into(),
        };
        let mut oracle = OracleArgs {
            api_base_url: "http://localhost:1".to_string(),
            api_key: "k".to_string(),
            request_timeout_secs: 5,
            suggest_model: "gpt-3.5-turbo".to_string(),
            suggest_max_tokens: 500,
            validate_model: "gpt-4o".to_string(),
            validate_max_tokens: 800,
            temperature: 0.9,
        };
        assert!(Pipeline::from_args(&table, &oracle).is_err());

        oracle.temperature = 0.1;
        let p = Pipeline::from_args(&table, &oracle).unwrap();
        assert_eq!(p.validate_settings().max_tokens, 800);
        assert_eq!(p.suggest_settings().model, "gpt-3.5-turbo");
    }

    #[tokio::test]
    async fn unusable_replies_still_produce_an_answer() {
        let table = table_file();
        let suggest = Arc::new(ScriptedOracle::replying(&["I cannot determine this."]));
        let validate = Arc::new(ScriptedOracle::replying(&[""]));
        let p = pipeline(table.path(), suggest, validate);

        let analysis = p.analyze("Patient seen in clinic.").await.unwrap();
        assert_eq!(analysis.analyzer_result.codes, "52000");
        assert_eq!(analysis.final_cpt_code, "52000");
        assert_eq!(analysis.confidence, Confidence::Low);
        assert!(!analysis.has_multiple_codes);
    }
}

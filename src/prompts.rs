//! Prompt templates for the two advisory stages.

use crate::suggest::Suggestion;

pub const SUGGEST_SYSTEM: &str =
    "You are a medical coding expert specializing in CPT codes for urinary system procedures.";

pub const VALIDATE_SYSTEM: &str = "You are a senior medical coding expert specializing in CPT codes for urinary system procedures. You review another coder's work and either confirm or correct it.";

/// Identification, modifier and sequencing rules shared by both stages.
const CODING_GUIDELINES: &str = r#"Follow these guidelines:
1. Identify every distinct procedure performed, using the procedural terminology and action verbs in the scenario (e.g. "inserted", "removed", "fragmented", "dilated", "biopsied").
2. Match each procedure to its anatomical location and to the most specific code in the table above.
3. When more than one procedure is performed in the same session, list the most resource-intensive procedure first without a modifier, and append modifier -51 to every other procedure.
4. Append modifier -59 when procedures are performed independently on distinct anatomical sites or in distinct sessions.
5. Append modifier -50 when an inherently unilateral procedure is repeated bilaterally.
6. Always order codes from most to least significant.
7. You MUST return at least one specific code, even if the scenario is ambiguous or incomplete. Choose the closest match and say in the explanation what detail was missing."#;

const SUGGEST_FORMAT: &str = r#"Provide your response in exactly this format:
CPT Code: [code or comma-separated codes with modifiers, e.g. 52332, 52000-51]
Description: [short description; separate multiple descriptions with semicolons]
Explanation: [detailed explanation of why these codes and modifiers apply]"#;

const VALIDATE_FORMAT: &str = r#"Provide your response in exactly this format:
CPT Code: [code or comma-separated codes with modifiers, e.g. 52332, 52000-51]
Description: [short description; separate multiple descriptions with semicolons]
Explanation: [detailed explanation of why these codes and modifiers apply, and what you changed, if anything]
Confidence: [High/Medium/Low] - your confidence in these codes being correct"#;

pub fn suggestion_prompt(scenario: &str, table: &str) -> String {
    format!(
        "MEDICAL SCENARIO:\n{scenario}\n\n\
         AVAILABLE CPT CODES FROM DATABASE:\n{table}\n\
         Based on the medical scenario and the available CPT codes, determine the most appropriate CPT code or codes.\n\n\
         {CODING_GUIDELINES}\n\n\
         {SUGGEST_FORMAT}\n"
    )
}

pub fn validation_prompt(scenario: &str, first: &Suggestion, table: &str) -> String {
    let codes = or_not_provided(&first.codes);
    let description = or_not_provided(&first.description);
    let rationale = or_not_provided(&first.rationale);
    format!(
        "Your task is to validate the CPT codes provided by another agent.\n\n\
         MEDICAL SCENARIO:\n{scenario}\n\n\
         FIRST AGENT'S ANALYSIS:\n\
         CPT Code: {codes}\n\
         Description: {description}\n\
         Explanation: {rationale}\n\n\
         AVAILABLE CPT CODES FROM DATABASE:\n{table}\n\
         Carefully review the scenario and the first agent's analysis. If the codes, modifiers and ordering are correct, confirm them. If anything is wrong or missing, provide the corrected codes.\n\n\
         {CODING_GUIDELINES}\n\n\
         {VALIDATE_FORMAT}\n"
    )
}

fn or_not_provided(value: &str) -> &str {
    if value.trim().is_empty() {
        "Not provided"
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggestion_prompt_embeds_scenario_table_and_rules() {
        let prompt = suggestion_prompt(
            "Cystoscopy with stent placement.",
            "code  description\n52332  Stent\n",
        );
        assert!(prompt.contains("MEDICAL SCENARIO:\nCystoscopy with stent placement."));
        assert!(prompt.contains("52332  Stent"));
        assert!(prompt.contains("-51"));
        assert!(prompt.contains("-59"));
        assert!(prompt.contains("-50"));
        assert!(prompt.contains("MUST return at least one specific code"));
        assert!(prompt.contains("CPT Code:"));
        assert!(!prompt.contains("Confidence:"));
    }

    #[test]
    fn validation_prompt_embeds_first_analysis_and_confidence_line() {
        let first = Suggestion {
            codes: "52332, 52000-51".to_string(),
            description: "Stent; Cystoscopy".to_string(),
            rationale: String::new(),
        };
        let prompt = validation_prompt("Scenario text", &first, "table");
        assert!(prompt.contains("FIRST AGENT'S ANALYSIS:\nCPT Code: 52332, 52000-51"));
        assert!(prompt.contains("Description: Stent; Cystoscopy"));
        assert!(prompt.contains("Explanation: Not provided"));
        assert!(prompt.contains("Confidence: [High/Medium/Low]"));
    }
}

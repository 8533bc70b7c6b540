//! Prompt templates for question-set generation.
//!
//! Templates are versioned constants so a prompt change is reviewable and
//! revertable on its own. The JSON-only contract mirrors what the
//! normalizer downstream is prepared to clean up: the model is told to
//! emit bare JSON, and anything it wraps around that is stripped, not
//! trusted.

/// Template version, bumped on any change to prompt structure.
pub const PROMPT_TEMPLATE_VERSION: &str = "3.2.0";

const BATCH_RULES: &str = r#"Rules:
- "questionText" is a factual statement, NOT a question (write "Paris is the capital of France.", never "What is the capital of France?")
- "choices" has exactly 4 entries; exactly one of them is correct
- "answer" must repeat the correct choice text exactly
- "tags" has exactly 3 distinct entries ordered broad to specific (e.g. ["science", "astronomy", "planets"])
- every answer in the batch must be different from every other answer
- no two records may cover the same fact
- output JSON only: no markdown fences, no commentary, no trailing text

Return only valid JSON."#;

/// Build the prompt for a full themed batch of records.
#[must_use]
pub fn build_batch_prompt(theme: &str, count: usize) -> String {
    format!(
        r#"You are writing multiple-choice trivia for a daily quiz.

Produce a JSON array of exactly {count} records about the theme "{theme}".
Each record has this schema:
{{"questionText": "...", "choices": ["...", "...", "...", "..."], "answer": "...", "tags": ["...", "...", "..."]}}

{BATCH_RULES}"#
    )
}

/// Build the prompt for a single replacement record, carrying the
/// operator's feedback and the answers the new record must not duplicate.
#[must_use]
pub fn build_replacement_prompt(theme: &str, feedback: &str, taken_answers: &[String]) -> String {
    let taken = if taken_answers.is_empty() {
        String::from("(none)")
    } else {
        taken_answers
            .iter()
            .map(|answer| format!("- {answer}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"You are replacing one multiple-choice trivia record in a daily quiz about "{theme}".

The operator rejected the previous attempt with this feedback:
{feedback}

The replacement's answer must NOT duplicate any of these already-used answers:
{taken}

Produce a single JSON object with this schema:
{{"questionText": "...", "choices": ["...", "...", "...", "..."], "answer": "...", "tags": ["...", "...", "..."]}}

{BATCH_RULES}"#
    )
}

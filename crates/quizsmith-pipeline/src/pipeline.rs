//! Generation flows: a full themed batch, and single-record replacement.

use quizsmith_core::{
    extract_payload, reconcile_record, validate_set, DailyQuestionSet, ExpectedShape,
    PipelineError, QuestionRecord, QuizDate, RecordDraft, Repair,
};
use ulid::Ulid;

use crate::llm::{CompletionError, TextCompletion};
use crate::prompts::{build_batch_prompt, build_replacement_prompt};

/// A generation attempt fails either at the completion collaborator or in
/// the validation chain; the two are distinguished so the caller can pick
/// the right retry.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Invalid(#[from] PipelineError),
}

/// A validated batch plus what it took to get there.
#[derive(Debug, Clone)]
pub struct GeneratedSet {
    /// Correlation id for this generation run, for logs only.
    pub run_id: Ulid,
    pub set: DailyQuestionSet,
    /// Repairs the reconciler performed on near-miss records.
    pub repairs: Vec<Repair>,
}

/// A validated single replacement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegeneratedRecord {
    pub draft: RecordDraft,
    pub repair: Option<Repair>,
}

/// Drives the completion collaborator through the full parse -> validate
/// -> repair chain. One completion call per pass, no side effects until
/// the caller commits.
pub struct Generator<C> {
    completion: C,
}

impl<C: TextCompletion> Generator<C> {
    #[must_use]
    pub fn new(completion: C) -> Self {
        Self { completion }
    }

    /// Generate a full themed set of `count` records for `date`.
    ///
    /// # Errors
    /// Returns [`GenerationError::Completion`] when the collaborator
    /// fails, or [`GenerationError::Invalid`] with the taxonomy variant
    /// from the first stage the output could not clear.
    pub fn generate_set(
        &self,
        theme: &str,
        date: QuizDate,
        count: usize,
    ) -> Result<GeneratedSet, GenerationError> {
        let run_id = Ulid::new();
        let prompt = build_batch_prompt(theme, count);
        tracing::debug!(%run_id, theme, count, "requesting question batch");

        let response = self.completion.complete(&prompt)?;
        let payload = extract_payload(&response.text, ExpectedShape::Array)?;
        let raw_records = payload.as_array().cloned().unwrap_or_default();

        let mut drafts = Vec::with_capacity(raw_records.len());
        let mut repairs = Vec::new();
        for (index, raw) in raw_records.iter().enumerate() {
            let position = index + 1;
            let mut draft = quizsmith_core::validate_record(raw, position)?;
            if let Some(repair) = reconcile_record(&mut draft, position)? {
                tracing::debug!(
                    %run_id,
                    position,
                    rule = repair.rule.as_str(),
                    reported = %repair.reported,
                    resolved = %repair.resolved,
                    "repaired near-miss answer"
                );
                repairs.push(repair);
            }
            drafts.push(draft);
        }

        let set = validate_set(&drafts, date, count)?;
        tracing::info!(%run_id, date = %date, count = set.len(), repairs = repairs.len(), "question batch validated");

        Ok(GeneratedSet { run_id, set, repairs })
    }

    /// Generate one replacement for the record at `position` (0-based)
    /// within `accepted`, honoring the operator's feedback.
    ///
    /// The answers of every other accepted record are forbidden: a
    /// replacement that collides with one of them fails like any other
    /// unreconcilable answer. Clearing the position's approval mark is
    /// the caller's responsibility.
    ///
    /// # Errors
    /// As [`Generator::generate_set`], plus an
    /// [`PipelineError::AnswerMismatch`] when the regenerated answer
    /// duplicates an accepted one.
    pub fn regenerate(
        &self,
        theme: &str,
        feedback: &str,
        accepted: &[QuestionRecord],
        position: usize,
    ) -> Result<RegeneratedRecord, GenerationError> {
        let run_id = Ulid::new();
        let taken: Vec<String> = accepted
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != position)
            .map(|(_, record)| record.answer.clone())
            .collect();

        let prompt = build_replacement_prompt(theme, feedback, &taken);
        tracing::debug!(%run_id, theme, position, "requesting replacement record");

        let response = self.completion.complete(&prompt)?;
        let payload = extract_payload(&response.text, ExpectedShape::Object)?;

        let display_position = position + 1;
        let mut draft = quizsmith_core::validate_record(&payload, display_position)?;
        let repair = reconcile_record(&mut draft, display_position)?;

        if let Some(collision) = taken
            .iter()
            .position(|answer| answer.to_lowercase() == draft.answer.to_lowercase())
        {
            return Err(GenerationError::Invalid(PipelineError::AnswerMismatch {
                position: display_position,
                answer: draft.answer,
                choices: draft.choices.to_vec(),
                reason: format!(
                    "duplicates the answer of another accepted record ({:?})",
                    taken[collision]
                ),
            }));
        }

        tracing::info!(%run_id, position, "replacement record validated");
        Ok(RegeneratedRecord { draft, repair })
    }
}

#[cfg(test)]
mod tests {
    use quizsmith_core::{MatchRule, SET_SIZE};

    use super::*;
    use crate::llm::CompletionResponse;

    /// Completion stub that replays a fixed script.
    struct Scripted {
        text: String,
    }

    impl TextCompletion for Scripted {
        fn complete(&self, _prompt: &str) -> Result<CompletionResponse, CompletionError> {
            Ok(CompletionResponse { text: self.text.clone() })
        }
    }

    struct Unreachable;

    impl TextCompletion for Unreachable {
        fn complete(&self, _prompt: &str) -> Result<CompletionResponse, CompletionError> {
            Err(CompletionError::Transport("connection refused".to_string()))
        }
    }

    fn fixture_date() -> QuizDate {
        match QuizDate::parse("2025-03-14") {
            Ok(date) => date,
            Err(err) => panic!("fixture date must parse: {err}"),
        }
    }

    fn record_json(answer: &str, shuffle: bool, suffix: usize) -> String {
        // With `shuffle` the correct answer is NOT first, so the
        // reconciler has work to do.
        let choices = if shuffle {
            format!(r#"["decoy-a", "{answer}", "decoy-b", "decoy-c"]"#)
        } else {
            format!(r#"["{answer}", "decoy-a", "decoy-b", "decoy-c"]"#)
        };
        format!(
            r#"{{"questionText": "{answer} is the subject of statement {suffix}.",
                "choices": {choices},
                "answer": "{answer}",
                "tags": ["general", "category-{suffix}", "topic-{suffix}"]}}"#
        )
    }

    fn batch_text(answers: &[&str], shuffle_first: bool) -> String {
        let records: Vec<String> = answers
            .iter()
            .enumerate()
            .map(|(index, answer)| record_json(answer, shuffle_first && index == 0, index))
            .collect();
        format!("```json\n[{}]\n```", records.join(",\n"))
    }

    const PLANETS: [&str; SET_SIZE] = [
        "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune", "Pluto",
        "Ceres",
    ];

    #[test]
    fn a_clean_batch_passes_unchanged_except_for_reordering() -> Result<(), GenerationError> {
        let generator = Generator::new(Scripted { text: batch_text(&PLANETS, true) });
        let generated = generator.generate_set("astronomy", fixture_date(), SET_SIZE)?;

        assert_eq!(generated.set.len(), SET_SIZE);
        assert_eq!(generated.repairs.len(), 1, "only the shuffled record needed repair");
        assert_eq!(generated.repairs[0].position, 1);
        assert_eq!(generated.repairs[0].rule, MatchRule::Exact);

        for (index, record) in generated.set.records().iter().enumerate() {
            assert_eq!(record.answer, PLANETS[index]);
            assert_eq!(record.answer, record.choices[0]);
            assert_eq!(usize::from(record.difficulty_rank), index + 1);
        }
        Ok(())
    }

    #[test]
    fn transport_failures_are_not_validation_failures() {
        let generator = Generator::new(Unreachable);
        let outcome = generator.generate_set("astronomy", fixture_date(), SET_SIZE);
        assert!(matches!(outcome, Err(GenerationError::Completion(_))));
    }

    #[test]
    fn prose_only_output_surfaces_as_parse_failure() {
        let generator = Generator::new(Scripted {
            text: "I am sorry, I cannot help with trivia today.".to_string(),
        });
        let outcome = generator.generate_set("astronomy", fixture_date(), SET_SIZE);
        assert!(matches!(
            outcome,
            Err(GenerationError::Invalid(PipelineError::ParseFailure { .. }))
        ));
    }

    #[test]
    fn a_short_batch_fails_set_validation() {
        let generator = Generator::new(Scripted { text: batch_text(&PLANETS[..9], false) });
        let outcome = generator.generate_set("astronomy", fixture_date(), SET_SIZE);
        assert!(matches!(
            outcome,
            Err(GenerationError::Invalid(PipelineError::SetValidation(_)))
        ));
    }

    #[test]
    fn schema_violations_carry_the_one_indexed_position() {
        let mut records: Vec<String> = PLANETS
            .iter()
            .enumerate()
            .map(|(index, answer)| record_json(answer, false, index))
            .collect();
        records[4] = r#"{"questionText": "Broken record.", "answer": "x", "tags": ["a","b","c"]}"#
            .to_string();
        let generator = Generator::new(Scripted { text: format!("[{}]", records.join(",")) });

        let outcome = generator.generate_set("astronomy", fixture_date(), SET_SIZE);
        let Err(GenerationError::Invalid(PipelineError::SchemaViolation { position, field, .. })) =
            outcome
        else {
            panic!("missing choices must fail schema validation");
        };
        assert_eq!(position, 5);
        assert_eq!(field, "choices");
    }

    fn accepted_records() -> Vec<QuestionRecord> {
        let drafts: Vec<RecordDraft> = PLANETS
            .iter()
            .enumerate()
            .map(|(index, answer)| RecordDraft {
                question_text: format!("{answer} is the subject of statement {index}."),
                choices: [
                    (*answer).to_string(),
                    "decoy-a".to_string(),
                    "decoy-b".to_string(),
                    "decoy-c".to_string(),
                ],
                answer: (*answer).to_string(),
                tags: [
                    "general".to_string(),
                    format!("category-{index}"),
                    format!("topic-{index}"),
                ],
            })
            .collect();
        match validate_set(&drafts, fixture_date(), SET_SIZE) {
            Ok(set) => set.records().to_vec(),
            Err(err) => panic!("fixture set must validate: {err}"),
        }
    }

    #[test]
    fn regeneration_accepts_a_fresh_answer() -> Result<(), GenerationError> {
        let generator = Generator::new(Scripted { text: record_json("Eris", true, 99) });
        let regenerated =
            generator.regenerate("astronomy", "Pluto is contested", &accepted_records(), 8)?;

        assert_eq!(regenerated.draft.answer, "Eris");
        assert_eq!(regenerated.draft.answer, regenerated.draft.choices[0]);
        assert!(matches!(
            regenerated.repair,
            Some(Repair { rule: MatchRule::Exact, .. })
        ));
        Ok(())
    }

    #[test]
    fn regeneration_rejects_answers_already_in_the_set() {
        // "JUPITER" collides case-insensitively with position 4's answer.
        let generator = Generator::new(Scripted { text: record_json("JUPITER", false, 99) });
        let outcome =
            generator.regenerate("astronomy", "make it harder", &accepted_records(), 8);

        let Err(GenerationError::Invalid(PipelineError::AnswerMismatch { reason, .. })) = outcome
        else {
            panic!("duplicate answer must be rejected");
        };
        assert!(reason.contains("duplicates"));
    }

    #[test]
    fn regeneration_may_reuse_the_replaced_answer() -> Result<(), GenerationError> {
        // Regenerating position 8 with answer "Pluto" is allowed: only the
        // OTHER records' answers are forbidden.
        let generator = Generator::new(Scripted { text: record_json("Pluto", false, 99) });
        let regenerated =
            generator.regenerate("astronomy", "reword the statement", &accepted_records(), 8)?;
        assert_eq!(regenerated.draft.answer, "Pluto");
        Ok(())
    }
}

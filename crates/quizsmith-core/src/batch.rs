use std::collections::BTreeMap;

use crate::date::QuizDate;
use crate::error::{PipelineError, SetViolation};
use crate::record::{DailyQuestionSet, QuestionRecord, RecordDraft};

/// Validate a full ordered batch and assemble the committed set for one
/// target date.
///
/// Unlike the per-record stages this collects every violation it finds -
/// wrong cardinality, case-insensitive duplicate answers (both positions
/// named), and per-record invariants re-checked after reconciliation - so
/// the operator gets one complete correction list. On success each record
/// receives `difficulty_rank = position` (1-indexed input order), the
/// target date, and an empty `lastUsedAt`.
///
/// # Errors
/// Returns [`PipelineError::SetValidation`] carrying all violations.
pub fn validate_set(
    drafts: &[RecordDraft],
    date: QuizDate,
    expected_count: usize,
) -> Result<DailyQuestionSet, PipelineError> {
    let mut violations = Vec::new();

    if drafts.len() != expected_count {
        violations.push(SetViolation::WrongCount {
            expected: expected_count,
            actual: drafts.len(),
        });
    }

    let mut first_seen: BTreeMap<String, usize> = BTreeMap::new();
    for (index, draft) in drafts.iter().enumerate() {
        let position = index + 1;

        match first_seen.get(&draft.answer.to_lowercase()) {
            Some(&first) => violations.push(SetViolation::DuplicateAnswer {
                first,
                second: position,
                answer: draft.answer.clone(),
            }),
            None => {
                first_seen.insert(draft.answer.to_lowercase(), position);
            }
        }

        if let Err(violation) = draft_invariants(draft, position) {
            violations.push(violation);
        }
    }

    if !violations.is_empty() {
        return Err(PipelineError::SetValidation(violations));
    }

    let records = drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| QuestionRecord {
            question_text: draft.question_text.clone(),
            choices: draft.choices.clone(),
            answer: draft.answer.clone(),
            tags: draft.tags.clone(),
            date,
            difficulty_rank: u8::try_from(index + 1).unwrap_or(u8::MAX),
            last_used_at: String::new(),
        })
        .collect();

    Ok(DailyQuestionSet::assemble(date, records))
}

/// Re-verify an assembled set immediately before commit (defense in
/// depth): cardinality, answer uniqueness, per-record invariants, and
/// that every record is filed under the set's own date.
///
/// # Errors
/// Returns [`PipelineError::SetValidation`] carrying all violations.
pub fn verify_set(set: &DailyQuestionSet) -> Result<(), PipelineError> {
    let mut violations = Vec::new();

    if set.len() != crate::record::SET_SIZE {
        violations.push(SetViolation::WrongCount {
            expected: crate::record::SET_SIZE,
            actual: set.len(),
        });
    }

    let mut first_seen: BTreeMap<String, usize> = BTreeMap::new();
    for (index, record) in set.records().iter().enumerate() {
        let position = index + 1;

        match first_seen.get(&record.answer.to_lowercase()) {
            Some(&first) => violations.push(SetViolation::DuplicateAnswer {
                first,
                second: position,
                answer: record.answer.clone(),
            }),
            None => {
                first_seen.insert(record.answer.to_lowercase(), position);
            }
        }

        if let Err(violation) = record.validate(position) {
            violations.push(violation);
        }

        if record.date != set.date() {
            violations.push(SetViolation::DateMismatch {
                expected: set.date().to_string(),
                actual: record.date.to_string(),
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::SetValidation(violations))
    }
}

fn draft_invariants(draft: &RecordDraft, position: usize) -> Result<(), SetViolation> {
    let invalid = |reason: String| SetViolation::InvalidRecord { position, reason };

    if draft.question_text.trim().is_empty() {
        return Err(invalid("questionText must be non-empty".to_string()));
    }
    for choice in &draft.choices {
        if choice.trim().is_empty() {
            return Err(invalid("choices must all be non-empty".to_string()));
        }
    }
    if draft.answer != draft.choices[0] {
        return Err(invalid(format!(
            "answer {:?} must equal the first choice {:?} after reconciliation",
            draft.answer, draft.choices[0]
        )));
    }
    for (index, tag) in draft.tags.iter().enumerate() {
        if tag.trim().is_empty() {
            return Err(invalid("tags must all be non-empty".to_string()));
        }
        if draft.tags[..index].contains(tag) {
            return Err(invalid(format!("tag {tag:?} appears more than once")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::fixtures::{fixture_date, mk_draft};
    use crate::record::SET_SIZE;

    fn ten_distinct_drafts() -> Vec<RecordDraft> {
        [
            "Mercury", "Venus", "Earth", "Mars", "Jupiter", "Saturn", "Uranus", "Neptune",
            "Pluto", "Ceres",
        ]
        .iter()
        .enumerate()
        .map(|(index, answer)| mk_draft(answer, ["alpha", "beta", "gamma"], &index.to_string()))
        .collect()
    }

    #[test]
    fn assigns_ranks_by_input_order() -> Result<(), PipelineError> {
        let set = validate_set(&ten_distinct_drafts(), fixture_date(), SET_SIZE)?;
        assert_eq!(set.len(), SET_SIZE);
        for (index, record) in set.records().iter().enumerate() {
            assert_eq!(usize::from(record.difficulty_rank), index + 1);
            assert_eq!(record.date, fixture_date());
            assert!(record.last_used_at.is_empty());
        }
        Ok(())
    }

    #[test]
    fn duplicate_answers_name_both_positions() {
        let mut drafts = ten_distinct_drafts();
        drafts[2] = mk_draft("Thor", ["Loki", "Odin", "Freya"], "2");
        drafts[6] = mk_draft("Thor", ["Loki", "Odin", "Freya"], "6");

        let Err(PipelineError::SetValidation(violations)) =
            validate_set(&drafts, fixture_date(), SET_SIZE)
        else {
            panic!("duplicate answers must fail");
        };
        assert_eq!(
            violations,
            vec![SetViolation::DuplicateAnswer {
                first: 3,
                second: 7,
                answer: "Thor".to_string(),
            }]
        );
    }

    #[test]
    fn answer_uniqueness_is_case_insensitive() {
        let mut drafts = ten_distinct_drafts();
        drafts[4] = mk_draft("THOR", ["Loki", "Odin", "Freya"], "4");
        drafts[8] = mk_draft("thor", ["Loki", "Odin", "Freya"], "8");

        assert!(matches!(
            validate_set(&drafts, fixture_date(), SET_SIZE),
            Err(PipelineError::SetValidation(violations))
                if violations.iter().any(|violation| matches!(
                    violation,
                    SetViolation::DuplicateAnswer { first: 5, second: 9, .. }
                ))
        ));
    }

    #[test]
    fn collects_every_violation_not_just_the_first() {
        let mut drafts = ten_distinct_drafts();
        drafts.truncate(9);
        drafts[1] = mk_draft("Mercury", ["alpha", "beta", "gamma"], "dup");
        drafts[3].answer = "Somewhere else".to_string();

        let Err(PipelineError::SetValidation(violations)) =
            validate_set(&drafts, fixture_date(), SET_SIZE)
        else {
            panic!("broken batch must fail");
        };

        assert!(violations
            .iter()
            .any(|violation| matches!(violation, SetViolation::WrongCount { expected: 10, actual: 9 })));
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, SetViolation::DuplicateAnswer { .. })));
        assert!(violations
            .iter()
            .any(|violation| matches!(violation, SetViolation::InvalidRecord { position: 4, .. })));
        assert_eq!(violations.len(), 3);
    }

    #[test]
    fn unreconciled_draft_fails_defense_in_depth() {
        let mut drafts = ten_distinct_drafts();
        // answer present among the choices but not at index 0
        drafts[0].choices = ["alpha", "Mercury", "beta", "gamma"].map(str::to_string);

        assert!(matches!(
            validate_set(&drafts, fixture_date(), SET_SIZE),
            Err(PipelineError::SetValidation(_))
        ));
    }

    #[test]
    fn verify_set_round_trips_an_assembled_set() -> Result<(), PipelineError> {
        let set = validate_set(&ten_distinct_drafts(), fixture_date(), SET_SIZE)?;
        verify_set(&set)
    }
}

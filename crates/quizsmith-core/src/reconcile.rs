use serde::Serialize;

use crate::error::PipelineError;
use crate::record::RecordDraft;

/// Words this short carry no signal for the overlap tier.
const MIN_SIGNIFICANT_WORD_LEN: usize = 3;

/// Which matching tier resolved a reported answer to a choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    Exact,
    Substring,
    WordOverlap,
}

impl MatchRule {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Substring => "substring",
            Self::WordOverlap => "word_overlap",
        }
    }
}

/// A repair the reconciler performed on a near-miss record: the reported
/// answer was resolved to a choice and the record rewritten around it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repair {
    /// 1-indexed record position in the batch.
    pub position: usize,
    pub rule: MatchRule,
    /// The answer string as the model reported it.
    pub reported: String,
    /// The choice text the answer was resolved to.
    pub resolved: String,
}

/// Reconcile a schema-valid draft so its answer is one of its choices.
///
/// Tiers run in order: exact case-insensitive equality, substring
/// containment in either direction, then shared-significant-word overlap.
/// The first tier with exactly one matching choice wins; a tier matching
/// more than one choice is a hard failure, never a guess. On success the
/// matched choice is moved to index 0 (preserving the relative order of
/// the others) and `answer` is overwritten to equal it verbatim, so
/// re-running reconciliation is a no-op.
///
/// # Errors
/// Returns [`PipelineError::AnswerMismatch`] when no tier matches or a
/// tier matches ambiguously.
pub fn reconcile_record(
    draft: &mut RecordDraft,
    position: usize,
) -> Result<Option<Repair>, PipelineError> {
    let (index, rule) = match match_answer(&draft.answer, &draft.choices) {
        Ok(hit) => hit,
        Err(MatchFailure::NoMatch) => {
            return Err(mismatch(draft, position, "does not match any choice"));
        }
        Err(MatchFailure::Ambiguous(rule)) => {
            return Err(mismatch(
                draft,
                position,
                match rule {
                    MatchRule::Exact => "matches more than one choice exactly",
                    MatchRule::Substring => "matches more than one choice by containment",
                    MatchRule::WordOverlap => "shares significant words with more than one choice",
                },
            ));
        }
    };

    if index == 0 && draft.choices[0] == draft.answer {
        // Already reconciled; nothing to repair.
        return Ok(None);
    }

    let reported = draft.answer.clone();
    draft.choices[..=index].rotate_right(1);
    draft.answer = draft.choices[0].clone();

    Ok(Some(Repair { position, rule, reported, resolved: draft.answer.clone() }))
}

enum MatchFailure {
    NoMatch,
    Ambiguous(MatchRule),
}

/// The isolated three-tier matcher: returns the index of the unique
/// matching choice and the tier that found it.
fn match_answer(answer: &str, choices: &[String]) -> Result<(usize, MatchRule), MatchFailure> {
    for rule in [MatchRule::Exact, MatchRule::Substring, MatchRule::WordOverlap] {
        let hits = tier_hits(answer, choices, rule);
        match hits.as_slice() {
            [] => {}
            [index] => return Ok((*index, rule)),
            _ => return Err(MatchFailure::Ambiguous(rule)),
        }
    }
    Err(MatchFailure::NoMatch)
}

fn tier_hits(answer: &str, choices: &[String], rule: MatchRule) -> Vec<usize> {
    let needle = answer.trim().to_lowercase();
    let answer_words = significant_words(answer);

    choices
        .iter()
        .enumerate()
        .filter(|(_, choice)| {
            let haystack = choice.trim().to_lowercase();
            match rule {
                MatchRule::Exact => haystack == needle,
                MatchRule::Substring => {
                    !haystack.is_empty()
                        && !needle.is_empty()
                        && (haystack.contains(&needle) || needle.contains(&haystack))
                }
                MatchRule::WordOverlap => {
                    let choice_words = significant_words(choice);
                    answer_words.iter().any(|word| choice_words.contains(word))
                }
            }
        })
        .map(|(index, _)| index)
        .collect()
}

fn significant_words(text: &str) -> Vec<String> {
    let mut words: Vec<String> = text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| word.chars().count() >= MIN_SIGNIFICANT_WORD_LEN)
        .map(str::to_lowercase)
        .collect();
    words.sort();
    words.dedup();
    words
}

fn mismatch(draft: &RecordDraft, position: usize, reason: &str) -> PipelineError {
    PipelineError::AnswerMismatch {
        position,
        answer: draft.answer.clone(),
        choices: draft.choices.to_vec(),
        reason: reason.to_string(),
    }
}

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::date::QuizDate;
use crate::error::SetViolation;

/// Every record carries exactly this many choices; index 0 is correct.
pub const CHOICE_COUNT: usize = 4;
/// Every record carries exactly this many tags, ordered broad to specific.
pub const TAG_COUNT: usize = 3;
/// A committed daily set holds exactly this many records.
pub const SET_SIZE: usize = 10;
/// Difficulty ranks run 1 (easiest) through this value, by set position.
pub const MAX_DIFFICULTY_RANK: u8 = 10;

/// A schema-valid record as it leaves the per-record validation stage.
///
/// Still unverified against set-level rules, and `answer` may not yet
/// equal `choices[0]` until the reconciler has run. The fixed-length
/// arrays make the 4-choice / 3-tag shape unrepresentable to get wrong
/// after this point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDraft {
    pub question_text: String,
    pub choices: [String; CHOICE_COUNT],
    pub answer: String,
    pub tags: [String; TAG_COUNT],
}

/// One committed trivia record, in the shared-store document shape.
///
/// `question_text` is a factual statement, not an interrogative. The
/// camelCase field names are the wire format other store writers expect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionRecord {
    pub question_text: String,
    pub choices: [String; CHOICE_COUNT],
    pub answer: String,
    pub tags: [String; TAG_COUNT],
    pub date: QuizDate,
    pub difficulty_rank: u8,
    /// Empty at creation; mutated by the serving collaborator, never here.
    #[serde(default)]
    pub last_used_at: String,
}

impl QuestionRecord {
    /// Check the invariants every committed record must satisfy.
    /// `position` is the record's 1-indexed place in its set, used only
    /// for error reporting.
    ///
    /// # Errors
    /// Returns the first violated invariant.
    pub fn validate(&self, position: usize) -> Result<(), SetViolation> {
        let invalid = |reason: String| SetViolation::InvalidRecord { position, reason };

        if self.question_text.trim().is_empty() {
            return Err(invalid("questionText must be non-empty".to_string()));
        }
        for choice in &self.choices {
            if choice.trim().is_empty() {
                return Err(invalid("choices must all be non-empty".to_string()));
            }
        }
        if self.answer != self.choices[0] {
            return Err(invalid(format!(
                "answer {:?} must equal the first choice {:?}",
                self.answer, self.choices[0]
            )));
        }
        let mut seen_tags = BTreeSet::new();
        for tag in &self.tags {
            if tag.trim().is_empty() {
                return Err(invalid("tags must all be non-empty".to_string()));
            }
            if !seen_tags.insert(tag.as_str()) {
                return Err(invalid(format!("tag {tag:?} appears more than once")));
            }
        }
        if self.difficulty_rank == 0 || self.difficulty_rank > MAX_DIFFICULTY_RANK {
            return Err(invalid(format!(
                "difficultyRank {} is outside 1..={MAX_DIFFICULTY_RANK}",
                self.difficulty_rank
            )));
        }

        Ok(())
    }
}

/// Storage identity of a question document: `{date}-q{index}`, 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QuestionId(String);

impl QuestionId {
    #[must_use]
    pub fn new(date: QuizDate, index: usize) -> Self {
        Self(format!("{date}-q{index}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for QuestionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Denormalized pointer filed at `tags/{tag}/questions/{question_id}`.
/// Derived solely from the authoritative record's tags; regenerated on
/// every (re)commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagIndexEntry {
    pub question_id: String,
}

/// A validated, rank-assigned set of records for one calendar day.
///
/// Construction goes through [`crate::batch::validate_set`]; the fields
/// stay private so an unchecked set cannot reach the commit path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyQuestionSet {
    date: QuizDate,
    records: Vec<QuestionRecord>,
}

impl DailyQuestionSet {
    pub(crate) fn assemble(date: QuizDate, records: Vec<QuestionRecord>) -> Self {
        Self { date, records }
    }

    #[must_use]
    pub fn date(&self) -> QuizDate {
        self.date
    }

    #[must_use]
    pub fn records(&self) -> &[QuestionRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Storage identity of the record at `index` (0-based).
    #[must_use]
    pub fn question_id(&self, index: usize) -> QuestionId {
        QuestionId::new(self.date, index)
    }
}

/// Ephemeral review state: which ordinal positions the operator has
/// approved. Never persisted; must reach full cardinality before a set
/// may be committed. Discarded on successful commit or on "start over".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalSet {
    approved: BTreeSet<usize>,
    size: usize,
}

impl ApprovalSet {
    /// An empty approval set for a run of `size` records.
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self { approved: BTreeSet::new(), size }
    }

    /// Mark a 0-based position approved. Out-of-range positions are
    /// ignored and reported as `false`.
    pub fn approve(&mut self, position: usize) -> bool {
        if position >= self.size {
            return false;
        }
        self.approved.insert(position);
        true
    }

    /// Withdraw approval, e.g. when a record is regenerated.
    pub fn revoke(&mut self, position: usize) {
        self.approved.remove(&position);
    }

    #[must_use]
    pub fn is_approved(&self, position: usize) -> bool {
        self.approved.contains(&position)
    }

    #[must_use]
    pub fn approved_count(&self) -> usize {
        self.approved.len()
    }

    /// True once every position has been approved.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.approved.len() == self.size
    }

    /// Start over: drop every approval.
    pub fn clear(&mut self) {
        self.approved.clear();
    }
}

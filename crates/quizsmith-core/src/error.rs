use crate::store::StoreError;

/// Unified error taxonomy for one pipeline pass.
///
/// Every variant is terminal for the current pass and carries enough
/// context (record position, field, reported vs expected value) to let an
/// operator correct the specific offending record without re-deriving the
/// whole batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Completion output could not be recovered into JSON. Carries the
    /// original raw text for diagnostics.
    #[error("completion output is not parseable JSON: {reason}")]
    ParseFailure { raw: String, reason: String },

    /// A record is missing a required field or a field is malformed.
    #[error("record {position}: field {field:?} {reason}")]
    SchemaViolation {
        position: usize,
        field: &'static str,
        reason: String,
    },

    /// The reported answer cannot be reconciled to a unique choice.
    #[error("record {position}: answer {answer:?} {reason}; choices: {choices:?}")]
    AnswerMismatch {
        position: usize,
        answer: String,
        choices: Vec<String>,
        reason: String,
    },

    /// Batch-level invariants were violated. All detected violations are
    /// listed, not just the first.
    #[error("set validation failed: {}", render_violations(.0))]
    SetValidation(Vec<SetViolation>),

    /// The caller lacks elevated access at commit time.
    #[error("elevated access is required to commit question sets")]
    PermissionDenied,

    /// The target date string is not canonical `YYYY-MM-DD`.
    #[error("invalid date: {0}")]
    InvalidDateFormat(String),

    /// The target date already holds records; sets are never merged.
    #[error("date {date} already holds {existing} question(s)")]
    DateConflict { date: String, existing: usize },

    /// Transient store failure. The identical commit is safe to retry
    /// because the batch is all-or-nothing.
    #[error("document store unavailable: {0}")]
    StoreUnavailable(String),

    /// Opaque store failure passed through unclassified.
    #[error("document store error: {0}")]
    Store(String),
}

impl PipelineError {
    /// Whether the caller may retry the same operation (possibly with a
    /// fresh target date). Permission and format failures never are.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DateConflict { .. } | Self::StoreUnavailable(_))
    }
}

impl From<StoreError> for PipelineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(message) => Self::StoreUnavailable(message),
            StoreError::PermissionDenied(_) => Self::PermissionDenied,
            StoreError::Rejected(message) => Self::Store(message),
        }
    }
}

/// One batch-level rule violation. Positions are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SetViolation {
    #[error("expected exactly {expected} records, got {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error("records {first} and {second} share the answer {answer:?}")]
    DuplicateAnswer {
        first: usize,
        second: usize,
        answer: String,
    },

    #[error("record {position}: {reason}")]
    InvalidRecord { position: usize, reason: String },

    #[error("set is built for {actual} but the commit targets {expected}")]
    DateMismatch { expected: String, actual: String },
}

fn render_violations(violations: &[SetViolation]) -> String {
    let rendered: Vec<String> = violations.iter().map(ToString::to_string).collect();
    rendered.join("; ")
}

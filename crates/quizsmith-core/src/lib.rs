//! Core boundary pipeline for QuizSmith.
//!
//! Everything in this crate is pure: it turns the untrusted free-form text
//! of an LLM completion into typed, invariant-checked daily trivia sets
//! through an explicit parse -> validate -> repair chain, and defines the
//! document-store seam the commit path writes through. Each stage fails
//! with a distinguishable error variant and never substitutes defaults.

pub mod batch;
pub mod date;
pub mod error;
pub mod normalize;
pub mod reconcile;
pub mod record;
pub mod schema;
pub mod slot;
pub mod store;

pub use batch::{validate_set, verify_set};
pub use date::QuizDate;
pub use error::{PipelineError, SetViolation};
pub use normalize::{extract_payload, ExpectedShape};
pub use reconcile::{reconcile_record, MatchRule, Repair};
pub use record::{
    ApprovalSet, DailyQuestionSet, QuestionId, QuestionRecord, RecordDraft, TagIndexEntry,
    CHOICE_COUNT, MAX_DIFFICULTY_RANK, SET_SIZE, TAG_COUNT,
};
pub use schema::validate_record;
pub use slot::{find_open_date, DEFAULT_PROBE_LIMIT};
pub use store::{
    tag_index_collection, DocumentWrite, MemoryStore, QuestionStore, StoreError,
    QUESTION_COLLECTION,
};

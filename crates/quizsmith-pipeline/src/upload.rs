//! The commit path: permission-gated, duplicate-checked, atomic.

use quizsmith_core::{
    tag_index_collection, verify_set, DailyQuestionSet, DocumentWrite, PipelineError,
    QuestionStore, QuizDate, TagIndexEntry, QUESTION_COLLECTION,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Proof of a successful commit, with the operator-facing confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    pub date: String,
    pub committed_questions: usize,
    pub tag_index_entries: usize,
    /// SHA-256 over the serialized batch, for audit trails.
    pub batch_digest: String,
    pub confirmation: String,
}

/// Lay out the atomic batch for a validated set: one question document
/// per record keyed `{date}-q{index}`, plus one tag-index pointer per tag
/// per record keyed `{tag}/questions/{question_id}`.
///
/// # Errors
/// Returns [`PipelineError::Store`] when a record fails to serialize.
pub fn plan_writes(set: &DailyQuestionSet) -> Result<Vec<DocumentWrite>, PipelineError> {
    let mut writes = Vec::with_capacity(set.len() * 4);

    for (index, record) in set.records().iter().enumerate() {
        let question_id = set.question_id(index);
        let value = serde_json::to_value(record)
            .map_err(|err| PipelineError::Store(format!("record failed to serialize: {err}")))?;
        writes.push(DocumentWrite {
            collection_path: QUESTION_COLLECTION.to_string(),
            document_id: question_id.to_string(),
            value,
        });

        for tag in &record.tags {
            let entry = TagIndexEntry { question_id: question_id.to_string() };
            let value = serde_json::to_value(&entry).map_err(|err| {
                PipelineError::Store(format!("tag index entry failed to serialize: {err}"))
            })?;
            writes.push(DocumentWrite {
                collection_path: tag_index_collection(tag),
                document_id: question_id.to_string(),
                value,
            });
        }
    }

    Ok(writes)
}

/// Commit a validated set under the full precondition ladder.
///
/// In order: the resolved permission boolean, strict canonical-date
/// parsing, set re-validation (defense in depth), and a fresh duplicate
/// check against the store - the slot finder's earlier read may be stale,
/// and losing that race surfaces here as a retriable [`PipelineError::DateConflict`].
/// Only then is the batch built and handed to the store in one
/// all-or-nothing write.
///
/// # Errors
/// Each precondition is a distinct variant; store failures are classified
/// into `PermissionDenied`, retryable `StoreUnavailable`, or an opaque
/// passthrough.
pub fn upload_set<S: QuestionStore + ?Sized>(
    store: &mut S,
    elevated: bool,
    set: &DailyQuestionSet,
    target_date: &str,
) -> Result<UploadReceipt, PipelineError> {
    if !elevated {
        return Err(PipelineError::PermissionDenied);
    }

    let date = QuizDate::parse(target_date)?;
    if date != set.date() {
        return Err(PipelineError::SetValidation(vec![
            quizsmith_core::SetViolation::DateMismatch {
                expected: date.to_string(),
                actual: set.date().to_string(),
            },
        ]));
    }

    verify_set(set)?;

    let existing = store.count_records_for_date(date)?;
    if existing > 0 {
        return Err(PipelineError::DateConflict { date: date.to_string(), existing });
    }

    let writes = plan_writes(set)?;
    let batch_digest = digest_batch(&writes);

    store.commit_batch(&writes)?;

    let committed_questions = set.len();
    let tag_index_entries = writes.len() - committed_questions;
    tracing::info!(
        date = %date,
        committed_questions,
        tag_index_entries,
        batch_digest = %batch_digest,
        "question set committed"
    );

    let confirmation = format!(
        "Committed {committed_questions} questions and {tag_index_entries} tag index entries for {date}."
    );
    Ok(UploadReceipt {
        date: date.to_string(),
        committed_questions,
        tag_index_entries,
        batch_digest,
        confirmation,
    })
}

fn digest_batch(writes: &[DocumentWrite]) -> String {
    let mut hasher = Sha256::new();
    for write in writes {
        hasher.update(write.collection_path.as_bytes());
        hasher.update(b"\n");
        hasher.update(write.document_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(write.value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

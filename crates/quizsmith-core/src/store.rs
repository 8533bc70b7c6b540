use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::date::QuizDate;
use crate::record::QuestionRecord;

/// Collection holding the authoritative question documents.
pub const QUESTION_COLLECTION: &str = "questions";

/// Collection holding the tag-index pointers for one tag.
#[must_use]
pub fn tag_index_collection(tag: &str) -> String {
    format!("tags/{tag}/questions")
}

/// One document in an atomic commit batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentWrite {
    pub collection_path: String,
    pub document_id: String,
    pub value: Value,
}

/// Failures surfaced by a document store implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Transient failure; the identical all-or-nothing commit may be
    /// retried.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store itself refused the caller's credentials.
    #[error("store denied access: {0}")]
    PermissionDenied(String),

    /// The store rejected the request for any other reason.
    #[error("store rejected the request: {0}")]
    Rejected(String),
}

/// The shared document store the pipeline reads capacity from and commits
/// batches into. Implementations must make `commit_batch` atomic: either
/// every write lands or none is observable to readers.
pub trait QuestionStore {
    /// How many question documents exist for `date`.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when the store cannot be read.
    fn count_records_for_date(&self, date: QuizDate) -> Result<usize, StoreError>;

    /// Apply every write or none.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when any write is rejected; no partial
    /// state may remain.
    fn commit_batch(&mut self, writes: &[DocumentWrite]) -> Result<(), StoreError>;

    /// Every committed question record, for statistics consumers.
    ///
    /// # Errors
    /// Returns a [`StoreError`] when the store cannot be read or holds a
    /// document that no longer decodes as a question record.
    fn list_all_records(&self) -> Result<Vec<QuestionRecord>, StoreError>;
}

/// In-process store used by tests and by callers that stage a commit
/// before pointing at real storage. Batches are checked up front and only
/// then applied, so a rejected batch leaves the map untouched.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: BTreeMap<(String, String), Value>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn document(&self, collection_path: &str, document_id: &str) -> Option<&Value> {
        self.documents
            .get(&(collection_path.to_string(), document_id.to_string()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn check_write(write: &DocumentWrite) -> Result<(), StoreError> {
        if write.collection_path.trim().is_empty() {
            return Err(StoreError::Rejected("collection path must be non-empty".to_string()));
        }
        if write.document_id.trim().is_empty() {
            return Err(StoreError::Rejected("document id must be non-empty".to_string()));
        }
        Ok(())
    }
}

impl QuestionStore for MemoryStore {
    fn count_records_for_date(&self, date: QuizDate) -> Result<usize, StoreError> {
        let date = date.to_string();
        Ok(self
            .documents
            .iter()
            .filter(|((collection, _), value)| {
                collection == QUESTION_COLLECTION
                    && value.get("date").and_then(Value::as_str) == Some(date.as_str())
            })
            .count())
    }

    fn commit_batch(&mut self, writes: &[DocumentWrite]) -> Result<(), StoreError> {
        // Validate the whole batch before touching the map; a failure in
        // any write must leave nothing behind.
        for write in writes {
            Self::check_write(write)?;
            let key = (write.collection_path.clone(), write.document_id.clone());
            if self.documents.contains_key(&key) {
                return Err(StoreError::Rejected(format!(
                    "document {}/{} already exists",
                    write.collection_path, write.document_id
                )));
            }
        }

        let mut staged = BTreeMap::new();
        for write in writes {
            let key = (write.collection_path.clone(), write.document_id.clone());
            if staged.insert(key, write.value.clone()).is_some() {
                return Err(StoreError::Rejected(format!(
                    "batch writes document {}/{} twice",
                    write.collection_path, write.document_id
                )));
            }
        }

        self.documents.append(&mut staged);
        Ok(())
    }

    fn list_all_records(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        self.documents
            .iter()
            .filter(|((collection, _), _)| collection == QUESTION_COLLECTION)
            .map(|((_, document_id), value)| {
                serde_json::from_value(value.clone()).map_err(|err| {
                    StoreError::Rejected(format!(
                        "document {QUESTION_COLLECTION}/{document_id} is not a question record: {err}"
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::record::fixtures::{fixture_date, mk_record};

    fn question_write(record: &QuestionRecord, index: usize) -> DocumentWrite {
        DocumentWrite {
            collection_path: QUESTION_COLLECTION.to_string(),
            document_id: format!("{}-q{index}", record.date),
            value: match serde_json::to_value(record) {
                Ok(value) => value,
                Err(err) => panic!("record must serialize: {err}"),
            },
        }
    }

    #[test]
    fn commit_then_count_and_list() -> Result<(), StoreError> {
        let mut store = MemoryStore::new();
        let first = mk_record("Paris", 1, "a");
        let second = mk_record("Rome", 2, "b");
        store.commit_batch(&[question_write(&first, 0), question_write(&second, 1)])?;

        assert_eq!(store.count_records_for_date(fixture_date())?, 2);
        let listed = store.list_all_records()?;
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first));
        Ok(())
    }

    #[test]
    fn rejected_batch_leaves_no_documents() {
        let mut store = MemoryStore::new();
        let record = mk_record("Paris", 1, "a");
        let bad = DocumentWrite {
            collection_path: QUESTION_COLLECTION.to_string(),
            document_id: String::new(),
            value: json!({}),
        };

        let outcome = store.commit_batch(&[question_write(&record, 0), bad]);
        assert!(matches!(outcome, Err(StoreError::Rejected(_))));
        assert!(store.is_empty(), "a failed batch must be invisible");
    }

    #[test]
    fn existing_documents_are_never_overwritten() -> Result<(), StoreError> {
        let mut store = MemoryStore::new();
        let record = mk_record("Paris", 1, "a");
        store.commit_batch(&[question_write(&record, 0)])?;

        let replay = store.commit_batch(&[question_write(&record, 0)]);
        assert!(matches!(replay, Err(StoreError::Rejected(_))));
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn duplicate_ids_within_one_batch_are_rejected() {
        let mut store = MemoryStore::new();
        let record = mk_record("Paris", 1, "a");
        let outcome =
            store.commit_batch(&[question_write(&record, 0), question_write(&record, 0)]);
        assert!(matches!(outcome, Err(StoreError::Rejected(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn tag_documents_do_not_count_as_questions() -> Result<(), StoreError> {
        let mut store = MemoryStore::new();
        let record = mk_record("Paris", 1, "a");
        let tag_write = DocumentWrite {
            collection_path: tag_index_collection(&record.tags[0]),
            document_id: format!("{}-q0", record.date),
            value: json!({ "questionId": format!("{}-q0", record.date) }),
        };
        store.commit_batch(&[question_write(&record, 0), tag_write])?;

        assert_eq!(store.count_records_for_date(fixture_date())?, 1);
        assert_eq!(store.list_all_records()?.len(), 1);
        assert_eq!(store.len(), 2);
        Ok(())
    }

    #[test]
    fn corrupt_question_document_is_reported_on_list() {
        let mut store = MemoryStore::new();
        let outcome = store.commit_batch(&[DocumentWrite {
            collection_path: QUESTION_COLLECTION.to_string(),
            document_id: "2025-03-14-q0".to_string(),
            value: json!({ "unexpected": true }),
        }]);
        assert!(outcome.is_ok());
        assert!(matches!(store.list_all_records(), Err(StoreError::Rejected(_))));
    }
}

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use quizsmith_core::{
    DocumentWrite, QuestionRecord, QuestionStore, QuizDate, StoreError, QUESTION_COLLECTION,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const LATEST_SCHEMA_VERSION: i64 = 1;

const CREATE_SCHEMA_MIGRATIONS_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);
";

const MIGRATION_001_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
  collection_path TEXT NOT NULL CHECK (length(collection_path) > 0),
  document_id TEXT NOT NULL CHECK (length(document_id) > 0),
  doc_json TEXT NOT NULL,
  written_at TEXT NOT NULL,
  PRIMARY KEY (collection_path, document_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_path);
";

/// SQLite-backed document store. One `documents` row per document, keyed
/// by `(collection_path, document_id)`; batches commit inside a single
/// transaction so a failure anywhere rolls every row back.
pub struct SqliteStore {
    conn: Connection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
}

impl SqliteStore {
    /// Open the store and configure required runtime pragmas.
    ///
    /// # Errors
    /// Returns an error when the database cannot be opened or pragmas
    /// cannot be applied.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Report current and target schema versions plus pending migrations.
    ///
    /// # Errors
    /// Returns an error when schema metadata cannot be read or initialized.
    pub fn schema_status(&self) -> Result<SchemaStatus> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;
        let current_version = current_schema_version(&self.conn)?;
        let pending_versions = if current_version < LATEST_SCHEMA_VERSION {
            ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect::<Vec<_>>()
        } else {
            Vec::new()
        };

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions,
        })
    }

    /// Apply all forward migrations up to the latest supported version.
    ///
    /// # Errors
    /// Returns an error when migration bootstrapping or any step fails.
    pub fn migrate(&mut self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_SCHEMA_MIGRATIONS_SQL)
            .context("failed to apply schema_migrations table")?;

        let mut version = current_schema_version(&self.conn)?;

        if version < 1 {
            self.conn
                .execute_batch(MIGRATION_001_SQL)
                .context("failed to apply migration v1")?;
            record_schema_version(&self.conn, 1)?;
            version = 1;
        }

        if version != LATEST_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported schema version {version}; expected {LATEST_SCHEMA_VERSION}"
            ));
        }

        Ok(())
    }

    /// Fetch one document by collection path and id.
    ///
    /// # Errors
    /// Returns an error when the row cannot be read or its JSON decoded.
    pub fn document(
        &self,
        collection_path: &str,
        document_id: &str,
    ) -> Result<Option<serde_json::Value>> {
        let mut stmt = self.conn.prepare(
            "SELECT doc_json FROM documents WHERE collection_path = ?1 AND document_id = ?2",
        )?;
        let raw = stmt
            .query_row(params![collection_path, document_id], |row| row.get::<_, String>(0))
            .optional()?;

        match raw {
            Some(json) => {
                let value = serde_json::from_str(&json)
                    .context("failed to deserialize stored document")?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Total number of documents across all collections.
    ///
    /// # Errors
    /// Returns an error when the count query fails.
    pub fn count_documents(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn apply_batch(&mut self, writes: &[DocumentWrite]) -> Result<(), rusqlite::Error> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO documents(collection_path, document_id, doc_json, written_at)
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            let now = now_rfc3339();
            for write in writes {
                stmt.execute(params![
                    write.collection_path,
                    write.document_id,
                    write.value.to_string(),
                    now,
                ])?;
            }
        }
        tx.commit()
    }
}

impl QuestionStore for SqliteStore {
    fn count_records_for_date(&self, date: QuizDate) -> Result<usize, StoreError> {
        // Question documents are keyed `{date}-q{index}`, and `date` is
        // already canonical, so a prefix match is exact.
        let pattern = format!("{date}-q%");
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM documents
                 WHERE collection_path = ?1 AND document_id LIKE ?2",
                params![QUESTION_COLLECTION, pattern],
                |row| row.get(0),
            )
            .map_err(classify_sqlite_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn commit_batch(&mut self, writes: &[DocumentWrite]) -> Result<(), StoreError> {
        self.apply_batch(writes).map_err(classify_sqlite_error)
    }

    fn list_all_records(&self) -> Result<Vec<QuestionRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT document_id, doc_json FROM documents
                 WHERE collection_path = ?1
                 ORDER BY document_id ASC",
            )
            .map_err(classify_sqlite_error)?;

        let rows = stmt
            .query_map(params![QUESTION_COLLECTION], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(classify_sqlite_error)?;

        let mut records = Vec::new();
        for row in rows {
            let (document_id, json) = row.map_err(classify_sqlite_error)?;
            let record: QuestionRecord = serde_json::from_str(&json).map_err(|err| {
                StoreError::Rejected(format!(
                    "document {QUESTION_COLLECTION}/{document_id} is not a question record: {err}"
                ))
            })?;
            records.push(record);
        }

        Ok(records)
    }
}

fn classify_sqlite_error(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &err {
        match failure.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::DiskFull => {
                return StoreError::Unavailable(err.to_string());
            }
            ErrorCode::PermissionDenied
            | ErrorCode::ReadOnly
            | ErrorCode::AuthorizationForStatementDenied => {
                return StoreError::PermissionDenied(err.to_string());
            }
            _ => {}
        }
    }
    StoreError::Rejected(err.to_string())
}

fn current_schema_version(conn: &Connection) -> Result<i64> {
    let version = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_migrations", [], |row| {
            row.get::<_, i64>(0)
        })
        .context("failed to read current schema version")?;
    Ok(version)
}

fn record_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
        params![version, now_rfc3339()],
    )
    .with_context(|| format!("failed to record migration version {version}"))?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

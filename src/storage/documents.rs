//! Document Record Store
//!
//! One record per (owner user, repository, branch, document kind) holding
//! the last generated body and where it was last published. Runs write
//! them; `docs publish` commits a stored body again and updates the
//! record's status and locators.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use crate::pipeline::PipelineOutcome;
use crate::types::{DocumentKind, PublishResult, RepodocError, RepositoryRef, Result, ResultExt};

use super::database::SharedDatabase;

/// Remote state of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStatus {
    /// Body was committed to the repository
    Published,
    /// Body was generated but could not be committed
    Unpublished,
    /// Run failed; body is a placeholder or an earlier generation
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Unpublished => "unpublished",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublishStatus {
    type Err = RepodocError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "published" => Ok(Self::Published),
            "unpublished" => Ok(Self::Unpublished),
            "failed" => Ok(Self::Failed),
            other => Err(RepodocError::Storage(format!(
                "Unknown publish status in database: {}",
                other
            ))),
        }
    }
}

/// Natural key of a document record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentKey {
    pub owner_user: String,
    /// `owner/name`
    pub repository: String,
    pub branch: String,
    pub kind: DocumentKind,
}

impl DocumentKey {
    pub fn new(owner_user: impl Into<String>, repository: &RepositoryRef, kind: DocumentKind) -> Self {
        Self {
            owner_user: owner_user.into(),
            repository: repository.full_name(),
            branch: repository.reference.clone(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentRecord {
    pub id: String,
    pub owner_user: String,
    pub repository: String,
    pub branch: String,
    pub kind: DocumentKind,
    pub title: String,
    pub body: String,
    pub placeholder: bool,
    pub status: PublishStatus,
    pub target_path: String,
    pub file_locator: Option<String>,
    pub commit_locator: Option<String>,
    pub revision_marker: Option<String>,
    pub last_error: Option<String>,
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, owner_user, repository, branch, kind, title, body, placeholder, \
     status, target_path, file_locator, commit_locator, revision_marker, last_error, run_id, \
     created_at, updated_at";

/// Column values as stored, before parsing enums and timestamps
struct RawRecord {
    id: String,
    owner_user: String,
    repository: String,
    branch: String,
    kind: String,
    title: String,
    body: String,
    placeholder: bool,
    status: String,
    target_path: String,
    file_locator: Option<String>,
    commit_locator: Option<String>,
    revision_marker: Option<String>,
    last_error: Option<String>,
    run_id: String,
    created_at: String,
    updated_at: String,
}

impl RawRecord {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner_user: row.get(1)?,
            repository: row.get(2)?,
            branch: row.get(3)?,
            kind: row.get(4)?,
            title: row.get(5)?,
            body: row.get(6)?,
            placeholder: row.get(7)?,
            status: row.get(8)?,
            target_path: row.get(9)?,
            file_locator: row.get(10)?,
            commit_locator: row.get(11)?,
            revision_marker: row.get(12)?,
            last_error: row.get(13)?,
            run_id: row.get(14)?,
            created_at: row.get(15)?,
            updated_at: row.get(16)?,
        })
    }

    fn into_record(self) -> Result<DocumentRecord> {
        Ok(DocumentRecord {
            kind: self.kind.parse().map_err(RepodocError::Storage)?,
            status: self.status.parse()?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            id: self.id,
            owner_user: self.owner_user,
            repository: self.repository,
            branch: self.branch,
            title: self.title,
            body: self.body,
            placeholder: self.placeholder,
            target_path: self.target_path,
            file_locator: self.file_locator,
            commit_locator: self.commit_locator,
            revision_marker: self.revision_marker,
            last_error: self.last_error,
            run_id: self.run_id,
        })
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(format!("Invalid timestamp '{}'", value))
}

/// Persists pipeline outcomes as document records
pub struct DocumentStore {
    db: SharedDatabase,
}

impl DocumentStore {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Record the outcome of a run for `owner_user`.
    ///
    /// Generated documents (published or not) replace the stored body. A
    /// failed run's placeholder is stored only when no record exists yet;
    /// an existing body is kept and only its status and error change. A
    /// failure without a placeholder writes nothing and returns `None`.
    pub fn record_outcome(
        &self,
        owner_user: &str,
        target_path: &str,
        outcome: &PipelineOutcome,
    ) -> Result<Option<DocumentRecord>> {
        let Some(document) = outcome.document() else {
            return Ok(None);
        };
        let key = DocumentKey::new(owner_user, &document.source, document.kind);
        let now = Utc::now().to_rfc3339();
        let run_id = outcome.report().run_id.as_str();

        let (status, publish, last_error) = match outcome {
            PipelineOutcome::FullSuccess { publish, .. } => {
                (PublishStatus::Published, Some(publish), None)
            }
            PipelineOutcome::PartialSuccess { publish, .. } => (
                PublishStatus::Unpublished,
                Some(publish),
                publish.error.as_ref().map(|e| e.to_string()),
            ),
            PipelineOutcome::Failure { error, .. } => {
                (PublishStatus::Failed, None, Some(error.to_string()))
            }
        };

        let keep_existing_body = document.placeholder;
        self.db.transaction(|conn| {
            let sql = if keep_existing_body {
                "INSERT INTO documents (id, owner_user, repository, branch, kind, title, body, \
                     placeholder, status, target_path, file_locator, commit_locator, \
                     revision_marker, last_error, run_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16) \
                 ON CONFLICT (owner_user, repository, branch, kind) DO UPDATE SET \
                     status = excluded.status, \
                     last_error = excluded.last_error, \
                     run_id = excluded.run_id, \
                     updated_at = excluded.updated_at"
            } else {
                "INSERT INTO documents (id, owner_user, repository, branch, kind, title, body, \
                     placeholder, status, target_path, file_locator, commit_locator, \
                     revision_marker, last_error, run_id, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?16) \
                 ON CONFLICT (owner_user, repository, branch, kind) DO UPDATE SET \
                     title = excluded.title, \
                     body = excluded.body, \
                     placeholder = excluded.placeholder, \
                     status = excluded.status, \
                     target_path = excluded.target_path, \
                     file_locator = COALESCE(excluded.file_locator, documents.file_locator), \
                     commit_locator = COALESCE(excluded.commit_locator, documents.commit_locator), \
                     revision_marker = COALESCE(excluded.revision_marker, documents.revision_marker), \
                     last_error = excluded.last_error, \
                     run_id = excluded.run_id, \
                     updated_at = excluded.updated_at"
            };

            conn.execute(
                sql,
                params![
                    Uuid::new_v4().to_string(),
                    key.owner_user,
                    key.repository,
                    key.branch,
                    key.kind.as_str(),
                    document.title,
                    document.body,
                    document.placeholder,
                    status.as_str(),
                    target_path,
                    publish.and_then(|p| p.remote_locator.clone()),
                    publish.and_then(|p| p.commit_locator.clone()),
                    publish.and_then(|p| p.new_revision_marker.clone()),
                    last_error,
                    run_id,
                    now,
                ],
            )
            .with_context("Failed to upsert document record")?;
            Ok(())
        })?;

        tracing::debug!(
            repository = %key.repository,
            kind = %key.kind,
            status = %status,
            "Recorded document outcome"
        );
        self.get(&key)
    }

    /// Apply a publish of the stored body. A commit marks the record
    /// published and replaces its locators; a failed publish keeps the old
    /// locators and leaves it unpublished. Returns `None` when no record
    /// exists under `key`.
    pub fn record_publish(
        &self,
        key: &DocumentKey,
        publish: &PublishResult,
    ) -> Result<Option<DocumentRecord>> {
        let status = if publish.success {
            PublishStatus::Published
        } else {
            PublishStatus::Unpublished
        };
        let updated = self.db.transaction(|conn| {
            conn.execute(
                "UPDATE documents SET \
                     status = ?5, \
                     file_locator = COALESCE(?6, file_locator), \
                     commit_locator = COALESCE(?7, commit_locator), \
                     revision_marker = COALESCE(?8, revision_marker), \
                     last_error = ?9, \
                     updated_at = ?10 \
                 WHERE owner_user = ?1 AND repository = ?2 AND branch = ?3 AND kind = ?4",
                params![
                    key.owner_user,
                    key.repository,
                    key.branch,
                    key.kind.as_str(),
                    status.as_str(),
                    publish.remote_locator,
                    publish.commit_locator,
                    publish.new_revision_marker,
                    publish.error.as_ref().map(|e| e.to_string()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context("Failed to update document publish state")
        })?;

        if updated == 0 {
            return Ok(None);
        }
        tracing::debug!(
            repository = %key.repository,
            kind = %key.kind,
            status = %status,
            "Recorded document publish"
        );
        self.get(key)
    }

    pub fn get(&self, key: &DocumentKey) -> Result<Option<DocumentRecord>> {
        let conn = self.db.connection()?;
        let sql = format!(
            "SELECT {} FROM documents \
             WHERE owner_user = ?1 AND repository = ?2 AND branch = ?3 AND kind = ?4",
            SELECT_COLUMNS
        );
        let raw = conn
            .query_row(
                &sql,
                params![key.owner_user, key.repository, key.branch, key.kind.as_str()],
                RawRecord::from_row,
            )
            .optional()
            .with_context("Failed to read document record")?;
        raw.map(RawRecord::into_record).transpose()
    }

    /// Records of one user (or all users), most recently updated first
    pub fn list(&self, owner_user: Option<&str>) -> Result<Vec<DocumentRecord>> {
        let conn = self.db.connection()?;
        let sql = format!(
            "SELECT {} FROM documents \
             WHERE (?1 IS NULL OR owner_user = ?1) \
             ORDER BY updated_at DESC, repository, kind",
            SELECT_COLUMNS
        );
        let mut stmt = conn
            .prepare(&sql)
            .with_context("Failed to prepare document listing")?;
        let rows = stmt
            .query_map(params![owner_user], RawRecord::from_row)
            .with_context("Failed to list document records")?;

        let mut records = Vec::new();
        for row in rows {
            let raw = row.with_context("Failed to read document row")?;
            records.push(raw.into_record()?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RunReport;
    use crate::storage::Database;
    use crate::types::{PublishResult, SynthesizedDocument};
    use std::sync::Arc;

    fn store() -> DocumentStore {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        DocumentStore::new(Arc::new(db))
    }

    fn repo() -> RepositoryRef {
        RepositoryRef::new("octo", "widgets", "main")
    }

    fn document(body: &str) -> SynthesizedDocument {
        SynthesizedDocument {
            title: "Widgets Manual".to_string(),
            body: body.to_string(),
            source: repo(),
            kind: DocumentKind::UserManual,
            placeholder: false,
        }
    }

    fn report(run_id: &str) -> RunReport {
        RunReport {
            run_id: run_id.to_string(),
            ..Default::default()
        }
    }

    fn published(body: &str) -> PipelineOutcome {
        PipelineOutcome::FullSuccess {
            document: document(body),
            publish: PublishResult::committed(
                "rev-1".to_string(),
                Some("https://example.test/blob/main/USER_MANUAL.md".to_string()),
                Some("https://example.test/commit/abc".to_string()),
                1,
            ),
            report: report("run-1"),
        }
    }

    #[test]
    fn test_full_success_is_published() {
        let store = store();
        let record = store
            .record_outcome("alice", "USER_MANUAL.md", &published("# Manual\n"))
            .unwrap()
            .unwrap();

        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.body, "# Manual\n");
        assert_eq!(record.revision_marker.as_deref(), Some("rev-1"));
        assert_eq!(record.repository, "octo/widgets");
        assert_eq!(record.run_id, "run-1");
    }

    #[test]
    fn test_partial_success_keeps_last_locator() {
        let store = store();
        let first = store
            .record_outcome("alice", "USER_MANUAL.md", &published("# Old\n"))
            .unwrap()
            .unwrap();

        let conflict = RepodocError::PublishConflict {
            path: "USER_MANUAL.md".to_string(),
            attempts: 3,
        };
        let partial = PipelineOutcome::PartialSuccess {
            document: document("# New\n"),
            publish: PublishResult::failed(&conflict, 3),
            report: report("run-2"),
        };
        let record = store
            .record_outcome("alice", "USER_MANUAL.md", &partial)
            .unwrap()
            .unwrap();

        assert_eq!(record.id, first.id);
        assert_eq!(record.status, PublishStatus::Unpublished);
        assert_eq!(record.body, "# New\n");
        assert_eq!(record.file_locator, first.file_locator);
        assert!(record.last_error.unwrap().contains("PUBLISH_CONFLICT"));
    }

    #[test]
    fn test_placeholder_never_replaces_a_body() {
        let store = store();
        store
            .record_outcome("alice", "USER_MANUAL.md", &published("# Real\n"))
            .unwrap();

        let failed = PipelineOutcome::Failure {
            error: RepodocError::SelectionEmpty { considered: 4 },
            placeholder: Some(SynthesizedDocument::placeholder(
                &repo(),
                DocumentKind::UserManual,
                "Nothing eligible.",
            )),
            report: report("run-3"),
        };
        let record = store
            .record_outcome("alice", "USER_MANUAL.md", &failed)
            .unwrap()
            .unwrap();
        assert_eq!(record.body, "# Real\n");
        assert_eq!(record.status, PublishStatus::Failed);
        assert!(!record.placeholder);

        // Stored as-is for a user without a previous record
        let record = store
            .record_outcome("bob", "USER_MANUAL.md", &failed)
            .unwrap()
            .unwrap();
        assert!(record.placeholder);
        assert!(record.body.contains("Nothing eligible."));
    }

    #[test]
    fn test_failure_without_document_writes_nothing() {
        let store = store();
        let failed = PipelineOutcome::Failure {
            error: RepodocError::Cancelled("run".to_string()),
            placeholder: None,
            report: report("run-4"),
        };
        assert!(
            store
                .record_outcome("alice", "USER_MANUAL.md", &failed)
                .unwrap()
                .is_none()
        );
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_publish_marks_unpublished_record_published() {
        let store = store();
        let conflict = RepodocError::PublishConflict {
            path: "USER_MANUAL.md".to_string(),
            attempts: 3,
        };
        let partial = PipelineOutcome::PartialSuccess {
            document: document("# Draft\n"),
            publish: PublishResult::failed(&conflict, 3),
            report: report("run-5"),
        };
        store
            .record_outcome("alice", "USER_MANUAL.md", &partial)
            .unwrap();
        let key = DocumentKey::new("alice", &repo(), DocumentKind::UserManual);

        let still_failing = store
            .record_publish(&key, &PublishResult::failed(&conflict, 1))
            .unwrap()
            .unwrap();
        assert_eq!(still_failing.status, PublishStatus::Unpublished);
        assert!(still_failing.file_locator.is_none());

        let committed = PublishResult::committed(
            "rev-9".to_string(),
            Some("https://example.test/blob/main/USER_MANUAL.md".to_string()),
            Some("https://example.test/commit/def".to_string()),
            1,
        );
        let record = store.record_publish(&key, &committed).unwrap().unwrap();
        assert_eq!(record.status, PublishStatus::Published);
        assert_eq!(record.body, "# Draft\n");
        assert_eq!(record.revision_marker.as_deref(), Some("rev-9"));
        assert!(record.last_error.is_none());

        let missing = DocumentKey::new("carol", &repo(), DocumentKind::UserManual);
        assert!(store.record_publish(&missing, &committed).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_by_user() {
        let store = store();
        store
            .record_outcome("alice", "USER_MANUAL.md", &published("a"))
            .unwrap();
        store
            .record_outcome("bob", "USER_MANUAL.md", &published("b"))
            .unwrap();

        assert_eq!(store.list(None).unwrap().len(), 2);
        let alice = store.list(Some("alice")).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].owner_user, "alice");

        let key = DocumentKey::new("bob", &repo(), DocumentKind::UserManual);
        assert_eq!(store.get(&key).unwrap().unwrap().body, "b");
        let missing = DocumentKey::new("carol", &repo(), DocumentKind::UserManual);
        assert!(store.get(&missing).unwrap().is_none());
    }
}

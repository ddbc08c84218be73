//! The ingestion service: file-level validation, session checks, and the
//! per-session exclusion guard around the merge and log pipelines.

use crate::activity;
use crate::error::{IngestError, Result};
use crate::merge;
use crate::session::SessionLocks;
use crate::sheet;
use crate::storage::Storage;
use crate::types::{SessionPhase, UploadStats};
use std::path::Path;
use std::sync::Arc;

pub struct IngestService {
    storage: Arc<dyn Storage>,
    locks: SessionLocks,
}

impl IngestService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            locks: SessionLocks::new(),
        }
    }

    async fn ensure_session(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(IngestError::Validation(
                "Session ID is required".to_string(),
            ));
        }
        if !self.storage.session_exists(session_id).await? {
            return Err(IngestError::NotFound(session_id.to_string()));
        }
        Ok(())
    }

    /// Registers a session id ahead of ingestion.
    pub async fn create_session(&self, session_id: &str) -> Result<()> {
        if session_id.trim().is_empty() {
            return Err(IngestError::Validation(
                "Session ID is required".to_string(),
            ));
        }
        self.storage.create_session(session_id).await
    }

    /// Removes a session and everything it owns (external cleanup operation).
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(session_id).await;
        self.ensure_session(session_id).await?;
        self.storage.delete_session(session_id).await
    }

    /// Header pass of the change-document merge. Returns records created.
    pub async fn ingest_header_file(&self, session_id: &str, path: &Path) -> Result<usize> {
        let _guard = self.locks.acquire(session_id).await;
        self.ensure_session(session_id).await?;
        let rows = sheet::read_rows(path, "CDHDR")?;
        merge::ingest_headers(self.storage.as_ref(), session_id, &rows).await
    }

    /// Detail pass of the change-document merge. Returns rows matched.
    pub async fn ingest_detail_file(&self, session_id: &str, path: &Path) -> Result<usize> {
        let _guard = self.locks.acquire(session_id).await;
        self.ensure_session(session_id).await?;
        let rows = sheet::read_rows(path, "CDPOS")?;
        merge::ingest_details(self.storage.as_ref(), session_id, &rows).await
    }

    /// Stores the SM20 security audit log. Returns rows stored.
    pub async fn ingest_activity_file(&self, session_id: &str, path: &Path) -> Result<usize> {
        let _guard = self.locks.acquire(session_id).await;
        self.ensure_session(session_id).await?;
        let rows = sheet::read_rows(path, "SM20")?;
        activity::ingest_activity_log(self.storage.as_ref(), session_id, &rows).await
    }

    /// Stores the transaction usage log. Returns rows stored.
    pub async fn ingest_usage_file(&self, session_id: &str, path: &Path) -> Result<usize> {
        let _guard = self.locks.acquire(session_id).await;
        self.ensure_session(session_id).await?;
        let rows = sheet::read_rows(path, "usage log")?;
        activity::ingest_usage_log(self.storage.as_ref(), session_id, &rows).await
    }

    /// Summary counts over the session's change-document set.
    pub async fn upload_stats(&self, session_id: &str) -> Result<UploadStats> {
        self.ensure_session(session_id).await?;
        merge::upload_stats(self.storage.as_ref(), session_id).await
    }

    /// Where the session sits in the header/merge protocol.
    pub async fn session_phase(&self, session_id: &str) -> Result<SessionPhase> {
        self.ensure_session(session_id).await?;
        let records = self.storage.change_docs_for_session(session_id).await?;
        Ok(SessionPhase::classify(&records))
    }

    /// The canonical executed transaction-code set, recomputed per request.
    pub async fn executed_set(&self, session_id: &str) -> Result<Vec<String>> {
        self.ensure_session(session_id).await?;
        activity::canonical_executed_set(self.storage.as_ref(), session_id).await
    }
}

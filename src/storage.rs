use crate::error::{IngestError, Result};
use crate::types::{ActivityLogEntry, ChangeDocumentRecord, TransactionUsageEntry};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Storage trait for persisting session-scoped audit data.
///
/// Insertion order of change-document records must be preserved by
/// `change_docs_for_session`: the merge pass's first-wins join semantics
/// depend on it.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations
    async fn create_session(&self, session_id: &str) -> Result<()>;
    async fn session_exists(&self, session_id: &str) -> Result<bool>;
    /// Removes the session and every row it owns.
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    // Change-document operations
    async fn insert_change_docs(&self, records: &mut [ChangeDocumentRecord]) -> Result<()>;
    async fn change_docs_for_session(&self, session_id: &str)
        -> Result<Vec<ChangeDocumentRecord>>;
    /// Atomically persists the final merged batch and deletes the retired
    /// header-only records. Both happen or neither does.
    async fn commit_merge(
        &self,
        new_records: &mut [ChangeDocumentRecord],
        retired: &[Uuid],
    ) -> Result<()>;

    // Activity / usage log operations
    async fn insert_activity_entries(&self, entries: &mut [ActivityLogEntry]) -> Result<()>;
    async fn activity_for_session(&self, session_id: &str) -> Result<Vec<ActivityLogEntry>>;
    async fn insert_usage_entries(&self, entries: &mut [TransactionUsageEntry]) -> Result<()>;
    async fn usage_for_session(&self, session_id: &str) -> Result<Vec<TransactionUsageEntry>>;
}

/// In-memory storage implementation for development/testing.
pub struct InMemoryStorage {
    sessions: Arc<Mutex<HashSet<String>>>,
    change_docs: Arc<Mutex<Vec<ChangeDocumentRecord>>>,
    activity: Arc<Mutex<Vec<ActivityLogEntry>>>,
    usage: Arc<Mutex<Vec<TransactionUsageEntry>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(Mutex::new(HashSet::new())),
            change_docs: Arc::new(Mutex::new(Vec::new())),
            activity: Arc::new(Mutex::new(Vec::new())),
            usage: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_session(&self, session_id: &str) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if !sessions.insert(session_id.to_string()) {
            return Err(IngestError::Validation(format!(
                "Session already exists: {session_id}"
            )));
        }
        debug!("Created session: {}", session_id);
        Ok(())
    }

    async fn session_exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.sessions.lock().unwrap().contains(session_id))
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions.lock().unwrap().remove(session_id);
        self.change_docs
            .lock()
            .unwrap()
            .retain(|r| r.session_id != session_id);
        self.activity
            .lock()
            .unwrap()
            .retain(|e| e.session_id != session_id);
        self.usage
            .lock()
            .unwrap()
            .retain(|e| e.session_id != session_id);
        debug!("Deleted session and owned rows: {}", session_id);
        Ok(())
    }

    async fn insert_change_docs(&self, records: &mut [ChangeDocumentRecord]) -> Result<()> {
        let mut docs = self.change_docs.lock().unwrap();
        for record in records.iter_mut() {
            record.id = Some(Uuid::new_v4());
            docs.push(record.clone());
        }
        debug!("Inserted {} change-document records", records.len());
        Ok(())
    }

    async fn change_docs_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChangeDocumentRecord>> {
        let docs = self.change_docs.lock().unwrap();
        Ok(docs
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn commit_merge(
        &self,
        new_records: &mut [ChangeDocumentRecord],
        retired: &[Uuid],
    ) -> Result<()> {
        // Single lock scope keeps the insert and the delete atomic.
        let mut docs = self.change_docs.lock().unwrap();
        for record in new_records.iter_mut() {
            record.id = Some(Uuid::new_v4());
            docs.push(record.clone());
        }
        let retired_set: HashSet<&Uuid> = retired.iter().collect();
        docs.retain(|r| match &r.id {
            Some(id) => !retired_set.contains(id),
            None => true,
        });
        debug!(
            "Committed merge: {} new records, {} retired",
            new_records.len(),
            retired.len()
        );
        Ok(())
    }

    async fn insert_activity_entries(&self, entries: &mut [ActivityLogEntry]) -> Result<()> {
        let mut activity = self.activity.lock().unwrap();
        for entry in entries.iter_mut() {
            entry.id = Some(Uuid::new_v4());
            activity.push(entry.clone());
        }
        Ok(())
    }

    async fn activity_for_session(&self, session_id: &str) -> Result<Vec<ActivityLogEntry>> {
        let activity = self.activity.lock().unwrap();
        Ok(activity
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn insert_usage_entries(&self, entries: &mut [TransactionUsageEntry]) -> Result<()> {
        let mut usage = self.usage.lock().unwrap();
        for entry in entries.iter_mut() {
            entry.id = Some(Uuid::new_v4());
            usage.push(entry.clone());
        }
        Ok(())
    }

    async fn usage_for_session(&self, session_id: &str) -> Result<Vec<TransactionUsageEntry>> {
        let usage = self.usage.lock().unwrap();
        Ok(usage
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}

use crate::domain::ports::PaymentSessionStore;
use crate::domain::session::{PaymentSession, StateBlob};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Sessions {
    by_id: HashMap<String, PaymentSession>,
    by_correlation: HashMap<String, String>,
}

/// A thread-safe in-memory store for payment sessions.
///
/// Uses `Arc<RwLock<..>>` to allow shared concurrent access. The version check
/// and the write happen under the same write guard, which makes
/// `replace_state` a compare-and-swap.
#[derive(Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<Sessions>>,
}

impl InMemorySessionStore {
    /// Creates a new, empty in-memory session store.
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentSessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<PaymentSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.by_id.get(session_id).cloned())
    }

    async fn find_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<Option<PaymentSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .by_correlation
            .get(correlation_id)
            .and_then(|id| sessions.by_id.get(id))
            .cloned())
    }

    async fn replace_state(
        &self,
        session_id: &str,
        expected_version: u64,
        state_blob: StateBlob,
    ) -> Result<PaymentSession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .by_id
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_owned()))?;

        if session.version != expected_version {
            return Err(PaymentError::VersionConflict(session_id.to_owned()));
        }

        session.state_blob = state_blob;
        session.version += 1;
        Ok(session.clone())
    }

    async fn insert(&self, session: PaymentSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        // One session per correlation id.
        let previous = sessions
            .by_correlation
            .insert(session.correlation_id.clone(), session.id.clone());
        if let Some(previous) = previous
            && previous != session.id
        {
            sessions.by_id.remove(&previous);
        }
        sessions.by_id.insert(session.id.clone(), session);
        Ok(())
    }

    async fn mark_completed(&self, session_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .by_id
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_owned()))?;
        session.completed_at = Some(at);
        session.version += 1;
        Ok(())
    }
}

//! In-memory audit log for tests and single-instance deployments.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tokio::sync::RwLock;

use super::{AuditError, Session, SessionAuditLog, SessionId, SessionRecord, SessionStatus};
use crate::types::{ModelId, UserId};

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[async_trait::async_trait]
impl SessionAuditLog for MemoryAuditLog {
    async fn create(
        &self,
        user_id: &UserId,
        model_id: &ModelId,
        model_name: &str,
        unit_count: u64,
    ) -> Result<SessionId, AuditError> {
        let session = Session::new(
            user_id.clone(),
            model_id.clone(),
            model_name.to_string(),
            unit_count,
        );
        let id = session.id.clone();
        self.sessions.write().await.insert(id.clone(), session);
        Ok(id)
    }

    async fn record_cost(&self, id: &SessionId, cost: Decimal) -> Result<(), AuditError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| AuditError::NotFound { id: id.clone() })?;
        session.cost = Some(cost);
        Ok(())
    }

    async fn transition(&self, id: &SessionId, status: SessionStatus) -> Result<(), AuditError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| AuditError::NotFound { id: id.clone() })?;
        session.apply_transition(status)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>, AuditError> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn history(&self, user_id: &UserId) -> Result<Vec<SessionRecord>, AuditError> {
        let sessions = self.sessions.read().await;
        let mut records: Vec<SessionRecord> = sessions
            .values()
            .filter(|s| &s.user_id == user_id)
            .map(SessionRecord::from)
            .collect();
        records.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(records)
    }
}

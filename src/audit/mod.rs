//! Session audit log - the durable trail of every billing transaction.
//!
//! Each saga run creates one [`Session`] and drives it through the status
//! state machine. Transitions are validated here, not in the orchestrator,
//! so an illegal transition is a programming error surfaced as
//! [`AuditError::InvalidTransition`] no matter who calls.

mod jsonl;
mod memory;

pub use jsonl::JsonlAuditLog;
pub use memory::MemoryAuditLog;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ModelId, UserId};

/// Unique billing-session identifier.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Billing-session lifecycle status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created; cost computed but nothing charged yet.
    Started,
    /// Debit applied.
    Paid,
    /// Provider call in flight.
    Predicting,
    /// Debit applied, predictions returned.
    Completed,
    /// Nothing owed: either the debit never succeeded, or the refund itself
    /// failed and the discrepancy was escalated.
    Failed,
    /// Debit reversed by a compensating credit after inference failed.
    Refunded,
}

impl SessionStatus {
    /// Terminal sessions are immutable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Refunded
        )
    }

    /// Legal next hops in the state machine.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        match self {
            Started => matches!(next, Paid | Failed),
            Paid => matches!(next, Predicting | Completed | Refunded | Failed),
            Predicting => matches!(next, Completed | Refunded | Failed),
            Completed | Failed | Refunded => false,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Started => "started",
            SessionStatus::Paid => "paid",
            SessionStatus::Predicting => "predicting",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Refunded => "refunded",
        };
        write!(f, "{s}")
    }
}

/// One billing transaction.
///
/// `ended_at` is set exactly once, iff the status is terminal. `cost` is
/// fixed when first recorded and never recomputed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub model_id: ModelId,
    pub model_name: String,
    pub unit_count: u64,
    pub cost: Option<Decimal>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user_id: UserId, model_id: ModelId, model_name: String, unit_count: u64) -> Self {
        Self {
            id: SessionId::new(),
            user_id,
            model_id,
            model_name,
            unit_count,
            cost: None,
            status: SessionStatus::Started,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Apply a status transition, stamping `ended_at` on terminal entry.
    pub fn apply_transition(&mut self, next: SessionStatus) -> Result<(), AuditError> {
        if !self.status.can_transition_to(next) {
            return Err(AuditError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Per-user history row, newest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub cost: Decimal,
}

impl From<&Session> for SessionRecord {
    fn from(session: &Session) -> Self {
        Self {
            model_name: session.model_name.clone(),
            started_at: session.started_at,
            ended_at: session.ended_at,
            status: session.status,
            cost: session.cost.unwrap_or(Decimal::ZERO),
        }
    }
}

/// Errors from the audit log.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The requested transition is not reachable from the current status.
    #[error("invalid transition for session {id}: {from} -> {to}")]
    InvalidTransition {
        id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },

    /// Unknown session id.
    #[error("session not found: {id}")]
    NotFound { id: SessionId },

    /// Backend could not persist or read.
    #[error("audit storage error: {message}")]
    Storage { message: String },

    #[error("audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Durable record of billing-transaction lifecycles.
///
/// Implementations must make each write durable before returning, so a crash
/// mid-saga leaves an inspectable trail up to the last completed step.
#[async_trait::async_trait]
pub trait SessionAuditLog: Send + Sync {
    /// Open a new session in `Started` and return its id.
    async fn create(
        &self,
        user_id: &UserId,
        model_id: &ModelId,
        model_name: &str,
        unit_count: u64,
    ) -> Result<SessionId, AuditError>;

    /// Fix the session's cost. Recorded once, before any debit attempt.
    async fn record_cost(&self, id: &SessionId, cost: Decimal) -> Result<(), AuditError>;

    /// Advance the session's status, enforcing the state machine.
    async fn transition(&self, id: &SessionId, status: SessionStatus) -> Result<(), AuditError>;

    /// Fetch one session.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, AuditError>;

    /// A user's sessions, ordered by `started_at` descending.
    async fn history(&self, user_id: &UserId) -> Result<Vec<SessionRecord>, AuditError>;
}

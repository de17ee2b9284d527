//! Append-only JSONL audit log.
//!
//! Every lifecycle event is appended as one JSON line and fsynced before the
//! call returns, so the saga never advances past a step that is not on disk.
//! Reopening the file replays the events back into session state.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{AuditError, Session, SessionAuditLog, SessionId, SessionRecord, SessionStatus};
use crate::types::{ModelId, UserId};

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum AuditEvent {
    Created { session: Session },
    CostRecorded { id: SessionId, cost: Decimal },
    Transitioned {
        id: SessionId,
        status: SessionStatus,
        at: DateTime<Utc>,
    },
}

fn append_event_sync(path: &Path, event: &AuditEvent) -> Result<(), AuditError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| AuditError::Storage {
            message: format!("failed to create directory {}: {}", parent.display(), e),
        })?;
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AuditError::Storage {
            message: format!("failed to open {} for writing: {}", path.display(), e),
        })?;

    // One write call per event so concurrent appenders never tear a line.
    let mut line = serde_json::to_vec(event)?;
    line.push(b'\n');
    file.write_all(&line).map_err(|e| AuditError::Storage {
        message: format!("write failed: {e}"),
    })?;

    file.sync_all().map_err(|e| AuditError::Storage {
        message: format!("sync failed: {e}"),
    })
}

fn replay(path: &Path) -> Result<HashMap<SessionId, Session>, AuditError> {
    let mut sessions = HashMap::new();
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(sessions),
        Err(e) => {
            return Err(AuditError::Storage {
                message: format!("failed to read {}: {}", path.display(), e),
            });
        }
    };

    for (lineno, line) in data.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = match serde_json::from_str(line) {
            Ok(event) => event,
            Err(e) => {
                // A torn tail line from a crash is expected; anything else
                // in the middle of the file is worth a warning either way.
                tracing::warn!(line = lineno + 1, error = %e, "skipping unreadable audit line");
                continue;
            }
        };
        match event {
            AuditEvent::Created { session } => {
                sessions.insert(session.id.clone(), session);
            }
            AuditEvent::CostRecorded { id, cost } => {
                if let Some(session) = sessions.get_mut(&id) {
                    session.cost = Some(cost);
                }
            }
            AuditEvent::Transitioned { id, status, at } => {
                if let Some(session) = sessions.get_mut(&id) {
                    session.status = status;
                    if status.is_terminal() {
                        session.ended_at = Some(at);
                    }
                }
            }
        }
    }

    Ok(sessions)
}

/// Durable audit log backed by an append-only JSONL file.
pub struct JsonlAuditLog {
    path: PathBuf,
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl JsonlAuditLog {
    /// Open (or create) the log at `path`, replaying any existing events.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuditError> {
        let path = path.into();
        let sessions = replay(&path)?;
        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    async fn append(&self, event: AuditEvent) -> Result<(), AuditError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_event_sync(&path, &event))
            .await
            .map_err(|e| AuditError::Storage {
                message: format!("audit writer task failed: {e}"),
            })?
    }
}

#[async_trait::async_trait]
impl SessionAuditLog for JsonlAuditLog {
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

        // The write lock is held across the append so validation, disk
        // order and in-memory order can never disagree. Durable before
        // visible: a session the saga can act on is already on disk.
        let mut sessions = self.sessions.write().await;
        self.append(AuditEvent::Created {
            session: session.clone(),
        })
        .await?;
        sessions.insert(id.clone(), session);
        Ok(id)
    }

    async fn record_cost(&self, id: &SessionId, cost: Decimal) -> Result<(), AuditError> {
        let mut sessions = self.sessions.write().await;
        if !sessions.contains_key(id) {
            return Err(AuditError::NotFound { id: id.clone() });
        }
        self.append(AuditEvent::CostRecorded {
            id: id.clone(),
            cost,
        })
        .await?;
        if let Some(session) = sessions.get_mut(id) {
            session.cost = Some(cost);
        }
        Ok(())
    }

    async fn transition(&self, id: &SessionId, status: SessionStatus) -> Result<(), AuditError> {
        let mut sessions = self.sessions.write().await;

        // Validate against current state first; only legal transitions are
        // ever written to disk.
        let current = sessions
            .get(id)
            .ok_or_else(|| AuditError::NotFound { id: id.clone() })?
            .status;
        if !current.can_transition_to(status) {
            return Err(AuditError::InvalidTransition {
                id: id.clone(),
                from: current,
                to: status,
            });
        }

        let at = Utc::now();
        self.append(AuditEvent::Transitioned {
            id: id.clone(),
            status,
            at,
        })
        .await?;

        if let Some(session) = sessions.get_mut(id) {
            session.status = status;
            if status.is_terminal() {
                session.ended_at = Some(at);
            }
        }
        Ok(())
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

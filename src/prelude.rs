//! Prelude module for convenient imports.
//!
//! Re-exports the types and traits most callers need to wire up a billed
//! inference transaction.
//!
//! # Usage
//!
//! ```rust
//! use textbill::prelude::*;
//! ```

// Core
pub use crate::Error;
pub use crate::ErrorCategory;
pub use crate::Result;

// Saga
pub use crate::saga::{AnalysisResult, BillingError, BillingSaga};

// Identifiers
pub use crate::types::{ModelId, UserId};

// Catalog
pub use crate::catalog::{Catalog, ModelEntry, TaskKind};

// Wallet
pub use crate::wallet::WalletGateway;

// Inference
pub use crate::inference::{Engine, EngineLoader, InferenceGateway, ModelPool, Prediction};

// Audit
pub use crate::audit::{Session, SessionAuditLog, SessionId, SessionRecord, SessionStatus};

// Config
pub use crate::config::BillingConfig;

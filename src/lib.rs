//! # textbill
//!
//! Billing-orchestrated text classification: a user submits texts, is billed
//! per character against a catalog price, and receives labeled predictions.
//! The crate is the coordination core - cost calculation, wallet debit with
//! failure compensation, a concurrent pool of loaded inference engines, and
//! a durable per-session audit trail. Credential issuance, wallet storage
//! and the model catalog are external collaborators reached through the
//! gateway traits.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use textbill::audit::MemoryAuditLog;
//! use textbill::catalog::StaticCatalog;
//! use textbill::saga::BillingSaga;
//! use textbill::types::{ModelId, UserId};
//! use textbill::wallet::MemoryWallet;
//! # use textbill::inference::InferenceGateway;
//!
//! # async fn example(catalog: StaticCatalog, gateway: Arc<dyn InferenceGateway>) -> Result<(), textbill::Error> {
//! let saga = BillingSaga::new(
//!     Arc::new(catalog),
//!     Arc::new(MemoryWallet::new()),
//!     gateway,
//!     Arc::new(MemoryAuditLog::new()),
//! );
//!
//! let result = saga
//!     .execute(
//!         UserId::from("u1"),
//!         ModelId::from("sentiment-small"),
//!         vec!["great product".into()],
//!     )
//!     .await?;
//! println!("cost {} for {} predictions", result.cost, result.predictions.len());
//! # Ok(())
//! # }
//! ```

#![deny(rustdoc::broken_intra_doc_links)]

pub mod audit;
pub mod catalog;
pub mod config;
pub mod inference;
pub mod prelude;
pub mod pricing;
pub mod saga;
pub mod types;
pub mod wallet;

// Re-exports for convenience
pub use audit::{
    AuditError, JsonlAuditLog, MemoryAuditLog, Session, SessionAuditLog, SessionId, SessionRecord,
    SessionStatus,
};
pub use catalog::{Catalog, CatalogError, HttpCatalog, ModelEntry, StaticCatalog, TaskKind};
pub use config::{BillingConfig, ConfigError};
pub use inference::{
    Engine, EngineLoader, HttpInferenceGateway, InferenceError, InferenceGateway, ModelPool,
    PoolInferenceGateway, Prediction,
};
pub use saga::{AnalysisResult, BillingError, BillingSaga, CompensationTrigger};
pub use types::{ModelId, UserId};
pub use wallet::{HttpWalletGateway, MemoryWallet, WalletError, WalletGateway};

/// Crate-level error aggregating every component's failure modes.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Billing(#[from] saga::BillingError),

    #[error(transparent)]
    Catalog(#[from] catalog::CatalogError),

    #[error(transparent)]
    Wallet(#[from] wallet::WalletError),

    #[error(transparent)]
    Inference(#[from] inference::InferenceError),

    #[error(transparent)]
    Audit(#[from] audit::AuditError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

/// Error category for unified handling at the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad input: unknown model, unusable request.
    Request,
    /// The user's funds or wallet state blocked the transaction.
    Payment,
    /// Collaborator unreachable or failing; a new attempt may succeed.
    Transient,
    /// Money charged without delivered work; needs manual reconciliation.
    Reconciliation,
    /// Programming or storage errors (illegal transition, audit I/O, config).
    Internal,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Billing(e) => match e {
                saga::BillingError::ModelNotFound { .. }
                | saga::BillingError::ModelNotLoaded { .. } => ErrorCategory::Request,
                saga::BillingError::PaymentFailed { source, .. } => {
                    if source.is_transient() {
                        ErrorCategory::Transient
                    } else {
                        ErrorCategory::Payment
                    }
                }
                saga::BillingError::InferenceFailed { .. } => ErrorCategory::Transient,
                saga::BillingError::CompensationFailed { .. } => ErrorCategory::Reconciliation,
                saga::BillingError::Catalog(_) => ErrorCategory::Transient,
                saga::BillingError::Audit(_) | saga::BillingError::Aborted { .. } => {
                    ErrorCategory::Internal
                }
            },
            Error::Catalog(catalog::CatalogError::NotFound { .. }) => ErrorCategory::Request,
            Error::Catalog(_) => ErrorCategory::Transient,
            Error::Wallet(e) => {
                if e.is_transient() {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Payment
                }
            }
            Error::Inference(inference::InferenceError::ModelNotLoaded { .. }) => {
                ErrorCategory::Request
            }
            Error::Inference(_) => ErrorCategory::Transient,
            Error::Audit(_) | Error::Config(_) => ErrorCategory::Internal,
        }
    }

    /// True when the failure left money charged for undelivered work.
    pub fn requires_reconciliation(&self) -> bool {
        self.category() == ErrorCategory::Reconciliation
    }

    /// True when an independent new attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! Billing saga - the orchestrated inference transaction.
//!
//! One `execute` call sequences: catalog lookup, cost calculation, audit
//! session creation, wallet debit, inference, and completion - with a
//! compensating credit when any step after the debit fails. There is no
//! shared transaction across the wallet and the audit log; consistency comes
//! only from this compensation protocol, so every step is recorded durably
//! before the next one runs.

use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::audit::{AuditError, SessionAuditLog, SessionId, SessionStatus};
use crate::catalog::{Catalog, CatalogError};
use crate::inference::{InferenceError, InferenceGateway, Prediction};
use crate::pricing;
use crate::types::{ModelId, UserId};
use crate::wallet::{WalletError, WalletGateway};

/// Caller-facing result of a successful transaction.
#[derive(Clone, Debug)]
pub struct AnalysisResult {
    pub session_id: SessionId,
    pub texts: Vec<String>,
    /// One prediction per input text, in input order.
    pub predictions: Vec<Prediction>,
    pub cost: Decimal,
}

/// Saga-level failures, each final for the attempt that produced it.
///
/// Retrying means starting a new, independent session: the saga performs a
/// debit as a side effect and is not idempotent as a whole.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Catalog has no row for the model.
    #[error("model not found: {id}")]
    ModelNotFound { id: ModelId },

    /// Model exists in the catalog but no engine is loaded for it. Raised
    /// before any debit.
    #[error("model not loaded: {id}")]
    ModelNotLoaded { id: ModelId },

    /// Debit failed; nothing was charged.
    #[error("payment failed for session {session_id}: {source}")]
    PaymentFailed {
        session_id: SessionId,
        #[source]
        source: WalletError,
    },

    /// Inference failed after a successful debit; the debit was reversed.
    #[error("inference failed for session {session_id} (debit refunded): {source}")]
    InferenceFailed {
        session_id: SessionId,
        #[source]
        source: InferenceError,
    },

    /// The saga had to unwind a committed debit and the compensating credit
    /// also failed. The user has been charged for work that never happened:
    /// an unresolved financial discrepancy requiring manual reconciliation,
    /// not a retryable user-facing error.
    #[error(
        "compensation failed for session {session_id}: {amount} charged but not refunded \
         (cause: {cause}; refund: {refund})"
    )]
    CompensationFailed {
        session_id: SessionId,
        amount: Decimal,
        cause: CompensationTrigger,
        refund: WalletError,
    },

    /// Catalog collaborator failed for a reason other than a missing row.
    #[error("catalog error: {0}")]
    Catalog(CatalogError),

    /// Audit log could not record a required step. When this happened after
    /// the debit, the debit was reversed first.
    #[error("audit error: {0}")]
    Audit(#[from] AuditError),

    /// The shielded orchestration task itself died (panic/runtime shutdown).
    #[error("billing task aborted: {message}")]
    Aborted { message: String },
}

impl BillingError {
    /// Session the failure belongs to, where one was created.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            BillingError::PaymentFailed { session_id, .. }
            | BillingError::InferenceFailed { session_id, .. }
            | BillingError::CompensationFailed { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    /// True when money was charged and not returned.
    pub fn requires_reconciliation(&self) -> bool {
        matches!(self, BillingError::CompensationFailed { .. })
    }

    /// True when a fresh attempt (new session) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BillingError::PaymentFailed { source, .. } => source.is_transient(),
            BillingError::InferenceFailed { .. } => true,
            BillingError::Catalog(CatalogError::Unavailable { .. }) => true,
            _ => false,
        }
    }
}

impl From<CatalogError> for BillingError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound { id } => BillingError::ModelNotFound { id },
            other => BillingError::Catalog(other),
        }
    }
}

/// What forced the saga to unwind a committed debit.
///
/// Once money has been taken, an audit write failure is handled exactly like
/// a provider failure: the saga will not hold a charge it could not record.
#[derive(Debug, Error)]
pub enum CompensationTrigger {
    /// The provider failed to deliver predictions.
    #[error(transparent)]
    Inference(InferenceError),
    /// The audit log could not record a post-debit step.
    #[error(transparent)]
    Audit(AuditError),
}

/// Orchestrates one billed inference transaction per [`execute`] call.
///
/// [`execute`]: BillingSaga::execute
#[derive(Clone)]
pub struct BillingSaga {
    catalog: Arc<dyn Catalog>,
    wallet: Arc<dyn WalletGateway>,
    inference: Arc<dyn InferenceGateway>,
    audit: Arc<dyn SessionAuditLog>,
}

impl BillingSaga {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        wallet: Arc<dyn WalletGateway>,
        inference: Arc<dyn InferenceGateway>,
        audit: Arc<dyn SessionAuditLog>,
    ) -> Self {
        Self {
            catalog,
            wallet,
            inference,
            audit,
        }
    }

    /// The audit log, for history queries alongside `execute`.
    pub fn audit(&self) -> &Arc<dyn SessionAuditLog> {
        &self.audit
    }

    /// Run one billed inference transaction.
    ///
    /// The orchestration runs in a spawned task: dropping the returned
    /// future abandons only the caller's wait, never a debit or credit
    /// mid-flight. The session always reaches a terminal status.
    pub async fn execute(
        &self,
        user_id: UserId,
        model_id: ModelId,
        texts: Vec<String>,
    ) -> Result<AnalysisResult, BillingError> {
        let saga = self.clone();
        let handle = tokio::spawn(async move { saga.run(user_id, model_id, texts).await });
        handle.await.map_err(|e| BillingError::Aborted {
            message: e.to_string(),
        })?
    }

    async fn run(
        &self,
        user_id: UserId,
        model_id: ModelId,
        texts: Vec<String>,
    ) -> Result<AnalysisResult, BillingError> {
        // 1. Resolve the model and its price.
        let entry = self.catalog.get_model(&model_id).await?;
        entry.validate()?;

        // 2. Fail fast on a missing engine before anything is billed.
        if self.inference.is_loaded(&model_id).await == Some(false) {
            return Err(BillingError::ModelNotLoaded { id: model_id });
        }

        // 3. Fix units and cost. Both are immutable from here on.
        let units = pricing::billed_units(&texts);
        let cost = pricing::cost_for_units(units, entry.price_per_char);

        // 4. Open the audit trail.
        let session_id = self
            .audit
            .create(&user_id, &model_id, &entry.name, units)
            .await?;
        self.audit.record_cost(&session_id, cost).await?;

        tracing::info!(
            session_id = %session_id,
            user_id = %user_id,
            model_id = %model_id,
            units,
            %cost,
            "billing session started"
        );

        // 5. Debit. A zero cost still goes through the wallet so every
        // session leaves the same trail.
        if let Err(source) = self.wallet.adjust(&user_id, -cost).await {
            tracing::warn!(session_id = %session_id, error = %source, "debit failed");
            self.finish(&session_id, SessionStatus::Failed).await;
            return Err(BillingError::PaymentFailed { session_id, source });
        }

        // 6. Inference. The debit is committed now: any failure past this
        // point, audit writes included, must reverse it before surfacing.
        let predictions = match self.paid_steps(&session_id, &model_id, &texts).await {
            Ok(predictions) => predictions,
            Err(cause) => return self.compensate(session_id, &user_id, cost, cause).await,
        };

        // 7. Complete. The work was delivered and the charge stands, so a
        // failed terminal write is logged rather than surfaced.
        self.finish(&session_id, SessionStatus::Completed).await;
        tracing::info!(session_id = %session_id, %cost, "billing session completed");
        Ok(AnalysisResult {
            session_id,
            texts,
            predictions,
            cost,
        })
    }

    /// The post-debit steps whose failure triggers a compensating credit.
    async fn paid_steps(
        &self,
        session_id: &SessionId,
        model_id: &ModelId,
        texts: &[String],
    ) -> Result<Vec<Prediction>, CompensationTrigger> {
        self.audit
            .transition(session_id, SessionStatus::Paid)
            .await
            .map_err(CompensationTrigger::Audit)?;
        self.audit
            .transition(session_id, SessionStatus::Predicting)
            .await
            .map_err(CompensationTrigger::Audit)?;
        self.inference
            .predict(model_id, texts)
            .await
            .map_err(CompensationTrigger::Inference)
    }

    /// Reverse the debit after a post-debit failure.
    async fn compensate(
        &self,
        session_id: SessionId,
        user_id: &UserId,
        cost: Decimal,
        cause: CompensationTrigger,
    ) -> Result<AnalysisResult, BillingError> {
        tracing::warn!(
            session_id = %session_id,
            error = %cause,
            "post-debit step failed, issuing compensating credit"
        );

        match self.wallet.adjust(user_id, cost).await {
            Ok(_) => {
                // An audit-triggered unwind may have left the session in any
                // pre-terminal state; Failed is reachable from all of them.
                let terminal = match &cause {
                    CompensationTrigger::Inference(_) => SessionStatus::Refunded,
                    CompensationTrigger::Audit(_) => SessionStatus::Failed,
                };
                self.finish(&session_id, terminal).await;
                Err(match cause {
                    CompensationTrigger::Inference(source) => {
                        BillingError::InferenceFailed { session_id, source }
                    }
                    CompensationTrigger::Audit(source) => BillingError::Audit(source),
                })
            }
            Err(refund_err) => {
                // Money is charged with no work delivered and no refund.
                // Surface loudly; this is what reconciliation runs on.
                tracing::error!(
                    session_id = %session_id,
                    user_id = %user_id,
                    %cost,
                    cause = %cause,
                    refund_error = %refund_err,
                    "compensating credit failed, manual reconciliation required"
                );
                self.finish(&session_id, SessionStatus::Failed).await;
                Err(BillingError::CompensationFailed {
                    session_id,
                    amount: cost,
                    cause,
                    refund: refund_err,
                })
            }
        }
    }

    /// Terminal transition on an error path.
    ///
    /// Best effort: the primary failure is already decided, and masking it
    /// with an audit write error would lose the caller the real cause.
    async fn finish(&self, session_id: &SessionId, status: SessionStatus) {
        if let Err(e) = self.audit.transition(session_id, status).await {
            tracing::error!(
                session_id = %session_id,
                %status,
                error = %e,
                "failed to record terminal session status"
            );
        }
    }
}

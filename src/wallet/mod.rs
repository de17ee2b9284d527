//! Wallet gateway - balance check, debit and credit.
//!
//! The wallet service owns the ledger; the core only asks it to apply a
//! signed delta. A negative delta debits, a positive one credits, and each
//! call is atomic from the wallet's point of view. There is no two-phase
//! reservation here: check-then-adjust cannot guarantee no-overdraft under
//! concurrent spenders, which is a documented limitation of the collaborator
//! contract, not of this client.

use std::collections::HashMap;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use url::Url;

use crate::types::UserId;

/// Errors from wallet operations.
#[derive(Debug, Error)]
pub enum WalletError {
    /// Balance too low to cover the requested debit.
    #[error("insufficient funds for {user_id}: balance {balance}, needed {needed}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Decimal,
        needed: Decimal,
    },

    /// No wallet exists for the user.
    #[error("no wallet for user {user_id}")]
    NotFound { user_id: UserId },

    /// Wallet service rejected the adjustment.
    #[error("wallet rejected adjustment: {message}")]
    Rejected { message: String },

    /// Wallet service unreachable or returned a server error.
    #[error("wallet unavailable: {message}")]
    Unavailable { message: String },
}

impl WalletError {
    /// Transient failures may succeed on a later, independent attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, WalletError::Unavailable { .. })
    }
}

/// Balance check and signed adjustment against the wallet collaborator.
#[async_trait::async_trait]
pub trait WalletGateway: Send + Sync {
    /// Current balance; a single read, never cached by the core.
    async fn check_balance(&self, user_id: &UserId) -> Result<Decimal, WalletError>;

    /// Apply a signed delta (negative = debit, positive = credit) and
    /// return the new balance.
    async fn adjust(&self, user_id: &UserId, delta: Decimal) -> Result<Decimal, WalletError>;
}

#[derive(Serialize)]
struct TopupRequest {
    amount: Decimal,
}

#[derive(Deserialize)]
struct WalletResponse {
    balance: Decimal,
}

/// HTTP wallet client.
///
/// Wire shape follows the wallet service: `GET {base}/wallet/{user_id}` for
/// the balance, `POST {base}/wallet/{user_id}/topup` with a signed amount
/// for both debit and credit.
pub struct HttpWalletGateway {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpWalletGateway {
    pub fn new(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            token: None,
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    fn url(&self, path: &str) -> Result<Url, WalletError> {
        self.base_url
            .join(path)
            .map_err(|e| WalletError::Unavailable {
                message: format!("bad wallet url: {e}"),
            })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token.expose_secret()),
            None => req,
        }
    }

    async fn parse_balance(
        response: reqwest::Response,
        user_id: &UserId,
    ) -> Result<Decimal, WalletError> {
        match response.status() {
            s if s.is_success() => {
                let body: WalletResponse =
                    response.json().await.map_err(|e| WalletError::Unavailable {
                        message: format!("malformed wallet response: {e}"),
                    })?;
                Ok(body.balance)
            }
            reqwest::StatusCode::NOT_FOUND => Err(WalletError::NotFound {
                user_id: user_id.clone(),
            }),
            s if s.is_client_error() => {
                let message = response.text().await.unwrap_or_default();
                Err(WalletError::Rejected { message })
            }
            s => Err(WalletError::Unavailable {
                message: format!("wallet returned HTTP {s}"),
            }),
        }
    }
}

#[async_trait::async_trait]
impl WalletGateway for HttpWalletGateway {
    async fn check_balance(&self, user_id: &UserId) -> Result<Decimal, WalletError> {
        let url = self.url(&format!("wallet/{}", urlencoding::encode(user_id.as_str())))?;
        let response = self
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| WalletError::Unavailable {
                message: e.to_string(),
            })?;
        Self::parse_balance(response, user_id).await
    }

    async fn adjust(&self, user_id: &UserId, delta: Decimal) -> Result<Decimal, WalletError> {
        let url = self.url(&format!(
            "wallet/{}/topup",
            urlencoding::encode(user_id.as_str())
        ))?;
        let response = self
            .authorize(self.http.post(url))
            .json(&TopupRequest { amount: delta })
            .send()
            .await
            .map_err(|e| WalletError::Unavailable {
                message: e.to_string(),
            })?;
        Self::parse_balance(response, user_id).await
    }
}

/// In-memory wallet for tests and single-process use.
///
/// Enforces no-overdraft on debit and supports injecting a failure on the
/// next credit, which is how the compensation-failure path gets exercised.
#[derive(Debug, Default)]
pub struct MemoryWallet {
    inner: Mutex<MemoryWalletState>,
}

#[derive(Debug, Default)]
struct MemoryWalletState {
    balances: HashMap<UserId, Decimal>,
    fail_next_credit: bool,
    adjustments: Vec<(UserId, Decimal)>,
}

impl MemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn deposit(&self, user_id: &UserId, amount: Decimal) {
        let mut state = self.inner.lock().await;
        *state.balances.entry(user_id.clone()).or_default() += amount;
    }

    /// Make the next positive adjustment fail as `Unavailable`.
    pub async fn fail_next_credit(&self) {
        self.inner.lock().await.fail_next_credit = true;
    }

    /// Every applied adjustment, in order. Test observability only.
    pub async fn adjustments(&self) -> Vec<(UserId, Decimal)> {
        self.inner.lock().await.adjustments.clone()
    }
}

#[async_trait::async_trait]
impl WalletGateway for MemoryWallet {
    async fn check_balance(&self, user_id: &UserId) -> Result<Decimal, WalletError> {
        let state = self.inner.lock().await;
        state
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| WalletError::NotFound {
                user_id: user_id.clone(),
            })
    }

    async fn adjust(&self, user_id: &UserId, delta: Decimal) -> Result<Decimal, WalletError> {
        let mut state = self.inner.lock().await;

        if delta > Decimal::ZERO && state.fail_next_credit {
            state.fail_next_credit = false;
            return Err(WalletError::Unavailable {
                message: "injected credit failure".into(),
            });
        }

        let balance = state.balances.get(user_id).copied().ok_or_else(|| {
            WalletError::NotFound {
                user_id: user_id.clone(),
            }
        })?;

        let new_balance = balance + delta;
        if new_balance < Decimal::ZERO {
            return Err(WalletError::InsufficientFunds {
                user_id: user_id.clone(),
                balance,
                needed: -delta,
            });
        }

        state.balances.insert(user_id.clone(), new_balance);
        state.adjustments.push((user_id.clone(), delta));
        Ok(new_balance)
    }
}

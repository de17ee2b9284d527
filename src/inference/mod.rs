//! Inference gateway and the in-process model pool.
//!
//! The saga talks to an [`InferenceGateway`]; whether that is a remote
//! inference service ([`HttpInferenceGateway`]) or a pool of engines loaded
//! into this process ([`ModelPool`] behind [`PoolInferenceGateway`]) is a
//! deployment choice the orchestrator never sees.

mod pool;

pub use pool::{Engine, EngineLoader, ModelPool, PoolInferenceGateway};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::ModelId;

/// One labeled prediction for one input text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Confidence in `[0, 1]`. Not money, so it stays a float.
    pub score: f64,
}

/// Errors from prediction.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// No engine installed for this model id. Callers probe before billing
    /// so this should be caught before any debit.
    #[error("model not loaded: {id}")]
    ModelNotLoaded { id: ModelId },

    /// The engine or remote provider failed while classifying.
    #[error("inference failed for {id}: {message}")]
    Engine { id: ModelId, message: String },

    /// Inference service unreachable. Treated the same as an engine failure
    /// by the saga; the distinction only matters for logs.
    #[error("inference service unavailable: {message}")]
    Unavailable { message: String },
}

/// Ordered text classification.
///
/// `predict` returns exactly one prediction per input text, in input order.
#[async_trait::async_trait]
pub trait InferenceGateway: Send + Sync {
    async fn predict(
        &self,
        id: &ModelId,
        texts: &[String],
    ) -> Result<Vec<Prediction>, InferenceError>;

    /// Cheap existence probe, where the backend supports one.
    ///
    /// `Some(false)` lets the saga fail fast before touching the wallet;
    /// `None` means the backend cannot answer without doing the work.
    async fn is_loaded(&self, _id: &ModelId) -> Option<bool> {
        None
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    texts: &'a [String],
}

#[derive(Deserialize)]
struct PredictResponse {
    result: Vec<Prediction>,
}

/// HTTP client against the remote inference service.
///
/// Wire shape: `POST {base}/predict/{model_id}` with `{"texts": [...]}`,
/// answering `{"result": [{"label": ..., "score": ...}]}`; 404 means the
/// service has no engine for that id.
pub struct HttpInferenceGateway {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpInferenceGateway {
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
}

#[async_trait::async_trait]
impl InferenceGateway for HttpInferenceGateway {
    async fn predict(
        &self,
        id: &ModelId,
        texts: &[String],
    ) -> Result<Vec<Prediction>, InferenceError> {
        let url = self
            .base_url
            .join(&format!("predict/{}", urlencoding::encode(id.as_str())))
            .map_err(|e| InferenceError::Unavailable {
                message: format!("bad inference url: {e}"),
            })?;

        let mut req = self.http.post(url).json(&PredictRequest { texts });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token.expose_secret());
        }

        let response = req.send().await.map_err(|e| InferenceError::Unavailable {
            message: e.to_string(),
        })?;

        match response.status() {
            s if s.is_success() => {
                let body: PredictResponse =
                    response
                        .json()
                        .await
                        .map_err(|e| InferenceError::Unavailable {
                            message: format!("malformed prediction response: {e}"),
                        })?;
                if body.result.len() != texts.len() {
                    return Err(InferenceError::Engine {
                        id: id.clone(),
                        message: format!(
                            "expected {} predictions, got {}",
                            texts.len(),
                            body.result.len()
                        ),
                    });
                }
                Ok(body.result)
            }
            reqwest::StatusCode::NOT_FOUND => {
                Err(InferenceError::ModelNotLoaded { id: id.clone() })
            }
            s => {
                let message = response.text().await.unwrap_or_default();
                Err(InferenceError::Engine {
                    id: id.clone(),
                    message: format!("HTTP {s}: {message}"),
                })
            }
        }
    }
}

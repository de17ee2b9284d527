//! Model catalog collaborator.
//!
//! The catalog owns the model rows (name, task, per-character price); the
//! core consumes them read-only for pricing and for populating the
//! [`ModelPool`](crate::inference::ModelPool).

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::types::ModelId;

/// Task a catalog model performs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    TextClassification,
    SentimentAnalysis,
    /// Task string the core does not recognize; passed through to the
    /// engine loader untouched.
    #[serde(untagged)]
    Other(String),
}

impl TaskKind {
    pub fn as_str(&self) -> &str {
        match self {
            TaskKind::TextClassification => "text-classification",
            TaskKind::SentimentAnalysis => "sentiment-analysis",
            TaskKind::Other(s) => s,
        }
    }
}

/// One catalog row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub name: String,
    pub task: TaskKind,
    pub price_per_char: Decimal,
}

impl ModelEntry {
    /// Rows with a negative price are catalog corruption, never billable.
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.price_per_char < Decimal::ZERO {
            return Err(CatalogError::InvalidPrice {
                id: self.id.clone(),
                price: self.price_per_char,
            });
        }
        Ok(())
    }
}

/// Errors from catalog lookups.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// No row for the requested model id.
    #[error("model not found: {id}")]
    NotFound { id: ModelId },

    /// Row exists but carries an unusable price.
    #[error("model {id} has invalid price {price}")]
    InvalidPrice { id: ModelId, price: Decimal },

    /// Catalog service unreachable or returned an error response.
    #[error("catalog unavailable: {message}")]
    Unavailable { message: String },
}

/// Read-only catalog access.
#[async_trait::async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve one model row; `CatalogError::NotFound` if absent.
    async fn get_model(&self, id: &ModelId) -> Result<ModelEntry, CatalogError>;

    /// All rows, used to populate the model pool.
    async fn list_models(&self) -> Result<Vec<ModelEntry>, CatalogError>;
}

/// In-memory catalog for tests and single-process deployments.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: Arc<HashMap<ModelId, ModelEntry>>,
}

impl StaticCatalog {
    pub fn new(entries: impl IntoIterator<Item = ModelEntry>) -> Self {
        Self {
            entries: Arc::new(
                entries
                    .into_iter()
                    .map(|e| (e.id.clone(), e))
                    .collect(),
            ),
        }
    }
}

#[async_trait::async_trait]
impl Catalog for StaticCatalog {
    async fn get_model(&self, id: &ModelId) -> Result<ModelEntry, CatalogError> {
        self.entries
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound { id: id.clone() })
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>, CatalogError> {
        Ok(self.entries.values().cloned().collect())
    }
}

/// HTTP catalog client against the model service.
///
/// Wire shape: `GET {base}/models` returns the full row list,
/// `GET {base}/models/{id}` one row or 404.
pub struct HttpCatalog {
    http: reqwest::Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl HttpCatalog {
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

    fn request(&self, path: &str) -> Result<reqwest::RequestBuilder, CatalogError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| CatalogError::Unavailable {
                message: format!("bad catalog url: {e}"),
            })?;
        let mut req = self.http.get(url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token.expose_secret());
        }
        Ok(req)
    }
}

#[async_trait::async_trait]
impl Catalog for HttpCatalog {
    async fn get_model(&self, id: &ModelId) -> Result<ModelEntry, CatalogError> {
        let response = self
            .request(&format!("models/{}", urlencoding::encode(id.as_str())))?
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable {
                message: e.to_string(),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound { id: id.clone() });
        }
        if !response.status().is_success() {
            return Err(CatalogError::Unavailable {
                message: format!("catalog returned HTTP {}", response.status()),
            });
        }

        let entry: ModelEntry =
            response
                .json()
                .await
                .map_err(|e| CatalogError::Unavailable {
                    message: format!("malformed catalog row: {e}"),
                })?;
        entry.validate()?;
        Ok(entry)
    }

    async fn list_models(&self) -> Result<Vec<ModelEntry>, CatalogError> {
        let response =
            self.request("models")?
                .send()
                .await
                .map_err(|e| CatalogError::Unavailable {
                    message: e.to_string(),
                })?;

        if !response.status().is_success() {
            return Err(CatalogError::Unavailable {
                message: format!("catalog returned HTTP {}", response.status()),
            });
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Unavailable {
                message: format!("malformed catalog listing: {e}"),
            })
    }
}

//! Concurrent pool of loaded inference engines.
//!
//! Engines are immutable once installed and held behind `Arc`, so a
//! `refresh` swapping an id's engine never tears a `predict` already running
//! against the old one - the old `Arc` stays alive until the last reader
//! drops it.

use std::sync::Arc;

use dashmap::DashMap;

use super::{InferenceError, InferenceGateway, Prediction};
use crate::catalog::ModelEntry;
use crate::types::ModelId;

/// A ready-to-use text classifier.
///
/// Implementations must be safe for concurrent read-only use; the pool does
/// not serialize predictions on the same engine.
pub trait Engine: Send + Sync {
    fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, String>;
}

/// Builds an engine from a catalog row.
#[async_trait::async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self, entry: &ModelEntry) -> Result<Arc<dyn Engine>, String>;
}

/// Mapping from model id to installed engine.
pub struct ModelPool {
    engines: DashMap<ModelId, Arc<dyn Engine>>,
    loader: Arc<dyn EngineLoader>,
}

impl ModelPool {
    pub fn new(loader: Arc<dyn EngineLoader>) -> Self {
        Self {
            engines: DashMap::new(),
            loader,
        }
    }

    /// Load an engine for every catalog row, replacing per key.
    ///
    /// A row that fails to load is logged and skipped; any engine already
    /// installed for that id stays in place. Returns how many engines were
    /// installed by this call.
    pub async fn refresh(&self, rows: &[ModelEntry]) -> usize {
        let mut installed = 0;
        for entry in rows {
            match self.loader.load(entry).await {
                Ok(engine) => {
                    tracing::info!(
                        model_id = %entry.id,
                        model_name = %entry.name,
                        task = entry.task.as_str(),
                        "engine installed"
                    );
                    self.engines.insert(entry.id.clone(), engine);
                    installed += 1;
                }
                Err(message) => {
                    tracing::warn!(
                        model_id = %entry.id,
                        model_name = %entry.name,
                        %message,
                        "engine load failed, row skipped"
                    );
                }
            }
        }
        installed
    }

    /// Classify `texts` with the engine installed for `id`.
    ///
    /// The engine `Arc` is cloned out before classifying, so the map shard
    /// lock is never held across the engine call.
    pub async fn predict(
        &self,
        id: &ModelId,
        texts: &[String],
    ) -> Result<Vec<Prediction>, InferenceError> {
        let engine = self
            .engines
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| InferenceError::ModelNotLoaded { id: id.clone() })?;

        engine
            .classify(texts)
            .map_err(|message| InferenceError::Engine {
                id: id.clone(),
                message,
            })
    }

    pub fn has(&self, id: &ModelId) -> bool {
        self.engines.contains_key(id)
    }

    pub fn loaded_ids(&self) -> Vec<ModelId> {
        self.engines.iter().map(|e| e.key().clone()).collect()
    }
}

/// [`InferenceGateway`] over an in-process [`ModelPool`].
#[derive(Clone)]
pub struct PoolInferenceGateway {
    pool: Arc<ModelPool>,
}

impl PoolInferenceGateway {
    pub fn new(pool: Arc<ModelPool>) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl InferenceGateway for PoolInferenceGateway {
    async fn predict(
        &self,
        id: &ModelId,
        texts: &[String],
    ) -> Result<Vec<Prediction>, InferenceError> {
        self.pool.predict(id, texts).await
    }

    async fn is_loaded(&self, id: &ModelId) -> Option<bool> {
        Some(self.pool.has(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TaskKind;
    use rust_decimal_macros::dec;

    /// Engine that labels every text with a fixed tag; the tag doubles as a
    /// version marker in the swap-consistency test.
    struct FixedEngine {
        label: String,
    }

    impl Engine for FixedEngine {
        fn classify(&self, texts: &[String]) -> Result<Vec<Prediction>, String> {
            Ok(texts
                .iter()
                .map(|_| Prediction {
                    label: self.label.clone(),
                    score: 0.99,
                })
                .collect())
        }
    }

    /// Loads a `FixedEngine` labeled after the row name, failing for rows
    /// whose name contains "broken".
    struct TestLoader;

    #[async_trait::async_trait]
    impl EngineLoader for TestLoader {
        async fn load(&self, entry: &ModelEntry) -> Result<Arc<dyn Engine>, String> {
            if entry.name.contains("broken") {
                return Err(format!("cannot load {}", entry.name));
            }
            Ok(Arc::new(FixedEngine {
                label: entry.name.clone(),
            }))
        }
    }

    fn row(id: &str, name: &str) -> ModelEntry {
        ModelEntry {
            id: ModelId::from(id),
            name: name.to_string(),
            task: TaskKind::TextClassification,
            price_per_char: dec!(0.1),
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_refresh_skips_bad_rows() {
        let pool = ModelPool::new(Arc::new(TestLoader));
        let installed = pool
            .refresh(&[row("m1", "good"), row("m2", "broken"), row("m3", "fine")])
            .await;

        assert_eq!(installed, 2);
        assert!(pool.has(&ModelId::from("m1")));
        assert!(!pool.has(&ModelId::from("m2")));
        assert!(pool.has(&ModelId::from("m3")));
        assert_eq!(pool.loaded_ids().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_previous_engine() {
        let pool = ModelPool::new(Arc::new(TestLoader));
        pool.refresh(&[row("m1", "v1")]).await;

        // Second refresh fails for the same id; v1 must survive.
        pool.refresh(&[row("m1", "broken-v2")]).await;

        let preds = pool
            .predict(&ModelId::from("m1"), &texts(&["x"]))
            .await
            .unwrap();
        assert_eq!(preds[0].label, "v1");
    }

    #[tokio::test]
    async fn test_predict_unloaded_model() {
        let pool = ModelPool::new(Arc::new(TestLoader));
        let err = pool
            .predict(&ModelId::from("ghost"), &texts(&["x"]))
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ModelNotLoaded { .. }));
    }

    #[tokio::test]
    async fn test_predict_preserves_order_and_length() {
        let pool = ModelPool::new(Arc::new(TestLoader));
        pool.refresh(&[row("m1", "tag")]).await;

        let input = texts(&["a", "bb", "ccc"]);
        let preds = pool.predict(&ModelId::from("m1"), &input).await.unwrap();
        assert_eq!(preds.len(), input.len());
        assert!(preds.iter().all(|p| p.label == "tag"));
    }

    #[tokio::test]
    async fn test_pool_gateway_probe() {
        let pool = Arc::new(ModelPool::new(Arc::new(TestLoader)));
        pool.refresh(&[row("m1", "tag")]).await;
        let gateway = PoolInferenceGateway::new(Arc::clone(&pool));

        assert_eq!(gateway.is_loaded(&ModelId::from("m1")).await, Some(true));
        assert_eq!(gateway.is_loaded(&ModelId::from("m2")).await, Some(false));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_and_predict() {
        let pool = Arc::new(ModelPool::new(Arc::new(TestLoader)));
        pool.refresh(&[row("m1", "v0")]).await;

        let mut handles = Vec::new();

        // N refreshers swapping the engine version.
        for i in 0..5 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                for j in 0..50 {
                    pool.refresh(&[row("m1", &format!("v{}-{}", i, j))]).await;
                }
            }));
        }

        // M predictors; every answer must come from one fully installed
        // engine: correct length, single consistent label.
        for _ in 0..5 {
            let pool = Arc::clone(&pool);
            handles.push(tokio::spawn(async move {
                let input = texts(&["a", "b", "c"]);
                for _ in 0..100 {
                    let preds = pool.predict(&ModelId::from("m1"), &input).await.unwrap();
                    assert_eq!(preds.len(), 3);
                    assert!(preds.iter().all(|p| p.label == preds[0].label));
                    assert!(preds[0].label.starts_with('v'));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
    }
}

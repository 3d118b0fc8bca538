//! Model training with capability-gated backends.
//!
//! The trainer keeps a registry of fitted models keyed by name. Fitting is
//! delegated to a [`Trainable`] backend; when no backend is available (or a
//! backend declines the samples) training reports `false` instead of
//! erroring, so agents without the capability keep working.

mod backend;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::experience::LearningData;

pub use backend::{FittedModel, NullBackend, Prediction, StatsBackend, Trainable};

/// What a registered model does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Predicts a label for a feature vector.
    Classifier,
    /// Assigns a feature vector to a cluster.
    Clusterer,
}

impl ModelKind {
    /// String form used in logs and stats.
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::Classifier => "classifier",
            ModelKind::Clusterer => "clusterer",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about a registered model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Registry key.
    pub name: String,
    /// Classifier or clusterer.
    pub kind: ModelKind,
    /// When the model was fitted.
    pub trained_at: DateTime<Utc>,
    /// Number of training samples used.
    pub sample_count: usize,
    /// Feature vector dimension.
    pub feature_count: usize,
}

/// Summary counts for stats reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerStats {
    /// Whether a real backend is attached.
    pub backend_available: bool,
    /// Number of registered models.
    pub model_count: usize,
    /// Names of registered models, sorted.
    pub model_names: Vec<String>,
}

struct TrainedModel {
    fitted: FittedModel,
    info: ModelInfo,
}

/// Named-model registry over a pluggable training backend.
pub struct ModelTrainer {
    backend: Option<Arc<dyn Trainable>>,
    models: RwLock<HashMap<String, TrainedModel>>,
}

impl ModelTrainer {
    /// Create a trainer with an explicit backend.
    pub fn new(backend: Arc<dyn Trainable>) -> Self {
        Self {
            backend: Some(backend),
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Create a trainer with the built-in statistics backend.
    pub fn with_default_backend() -> Self {
        Self::new(Arc::new(StatsBackend))
    }

    /// Create a trainer with no backend; every training call returns false.
    pub fn without_backend() -> Self {
        Self {
            backend: None,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Whether a training backend is attached.
    pub fn backend_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Fit and register a classifier from labelled learning data.
    ///
    /// Labels are read from `output_data[target_field]` as strings; records
    /// without features or a string label are skipped. Returns false when no
    /// backend is attached or no usable samples remain.
    pub async fn train_classifier(
        &self,
        name: &str,
        records: &[LearningData],
        target_field: &str,
    ) -> bool {
        let Some(backend) = &self.backend else {
            debug!(model = name, "No training backend, skipping classifier fit");
            return false;
        };

        let samples: Vec<(Vec<f64>, String)> = records
            .iter()
            .filter(|r| !r.features.is_empty())
            .filter_map(|r| {
                let label = r.output_data.get(target_field)?.as_str()?;
                Some((r.features.clone(), label.to_string()))
            })
            .collect();

        if samples.is_empty() {
            warn!(model = name, target_field, "No usable classifier samples");
            return false;
        }

        let feature_count = samples[0].0.len();
        let sample_count = samples.len();
        match backend.fit_classifier(&samples) {
            Some(fitted) => {
                self.register(name, fitted, ModelKind::Classifier, sample_count, feature_count)
                    .await;
                true
            }
            None => {
                warn!(model = name, "Backend declined classifier samples");
                false
            }
        }
    }

    /// Fit and register a k-cluster model from the records' feature vectors.
    pub async fn train_clusterer(&self, name: &str, records: &[LearningData], k: usize) -> bool {
        let Some(backend) = &self.backend else {
            debug!(model = name, "No training backend, skipping clusterer fit");
            return false;
        };

        let samples: Vec<Vec<f64>> = records
            .iter()
            .filter(|r| !r.features.is_empty())
            .map(|r| r.features.clone())
            .collect();

        if samples.is_empty() {
            warn!(model = name, "No usable clusterer samples");
            return false;
        }

        let feature_count = samples[0].len();
        let sample_count = samples.len();
        match backend.fit_clusterer(&samples, k) {
            Some(fitted) => {
                self.register(name, fitted, ModelKind::Clusterer, sample_count, feature_count)
                    .await;
                true
            }
            None => {
                warn!(model = name, k, "Backend declined clusterer samples");
                false
            }
        }
    }

    async fn register(
        &self,
        name: &str,
        fitted: FittedModel,
        kind: ModelKind,
        sample_count: usize,
        feature_count: usize,
    ) {
        let info = ModelInfo {
            name: name.to_string(),
            kind,
            trained_at: Utc::now(),
            sample_count,
            feature_count,
        };
        self.models
            .write()
            .await
            .insert(name.to_string(), TrainedModel { fitted, info });
        debug!(model = name, kind = %kind, sample_count, "Model registered");
    }

    /// Run a registered model against a feature vector.
    pub async fn predict(&self, name: &str, features: &[f64]) -> Option<Prediction> {
        let models = self.models.read().await;
        models.get(name)?.fitted.predict(features)
    }

    /// Names of registered models, sorted.
    pub async fn list_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Metadata for one registered model.
    pub async fn get_model_info(&self, name: &str) -> Option<ModelInfo> {
        self.models.read().await.get(name).map(|m| m.info.clone())
    }

    /// Remove a model; returns whether it existed.
    pub async fn delete_model(&self, name: &str) -> bool {
        self.models.write().await.remove(name).is_some()
    }

    /// Number of registered models.
    pub async fn model_count(&self) -> usize {
        self.models.read().await.len()
    }

    /// Summary counts for stats reporting.
    pub async fn statistics(&self) -> TrainerStats {
        TrainerStats {
            backend_available: self.backend.is_some(),
            model_count: self.model_count().await,
            model_names: self.list_models().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experience::LearningType;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn labelled(features: Vec<f64>, label: &str) -> LearningData {
        LearningData::new(
            "agent_test",
            LearningType::Supervised,
            json!({}),
            json!({ "outcome": label }),
        )
        .with_features(features)
    }

    #[tokio::test]
    async fn trains_and_predicts_classifier() {
        let trainer = ModelTrainer::with_default_backend();
        let records = vec![
            labelled(vec![0.0, 0.0], "fail"),
            labelled(vec![0.1, 0.2], "fail"),
            labelled(vec![1.0, 1.0], "pass"),
            labelled(vec![0.9, 1.1], "pass"),
        ];

        assert!(trainer.train_classifier("outcomes", &records, "outcome").await);
        assert_eq!(
            trainer.predict("outcomes", &[0.95, 1.0]).await,
            Some(Prediction::Label("pass".to_string()))
        );

        let info = trainer.get_model_info("outcomes").await.unwrap();
        assert_eq!(info.kind, ModelKind::Classifier);
        assert_eq!(info.sample_count, 4);
        assert_eq!(info.feature_count, 2);
    }

    #[tokio::test]
    async fn skips_records_without_labels_or_features() {
        let trainer = ModelTrainer::with_default_backend();
        let records = vec![
            // no features
            LearningData::new(
                "agent_test",
                LearningType::Supervised,
                json!({}),
                json!({ "outcome": "pass" }),
            ),
            labelled(vec![1.0], "pass"),
        ];
        // Only the second record survives filtering, which is enough to fit
        assert!(trainer.train_classifier("m", &records, "outcome").await);
        let info = trainer.get_model_info("m").await.unwrap();
        assert_eq!(info.sample_count, 1);
    }

    #[tokio::test]
    async fn training_fails_without_usable_samples() {
        let trainer = ModelTrainer::with_default_backend();
        assert!(!trainer.train_classifier("m", &[], "outcome").await);
        assert!(!trainer.train_clusterer("m", &[], 2).await);
        assert_eq!(trainer.model_count().await, 0);
    }

    #[tokio::test]
    async fn no_backend_degrades_to_false() {
        let trainer = ModelTrainer::without_backend();
        let records = vec![labelled(vec![1.0], "pass")];
        assert!(!trainer.train_classifier("m", &records, "outcome").await);
        assert!(!trainer.backend_available());
        assert!(trainer.predict("m", &[1.0]).await.is_none());
    }

    #[tokio::test]
    async fn delete_and_list_models() {
        let trainer = ModelTrainer::with_default_backend();
        let records = vec![
            labelled(vec![0.0], "a"),
            labelled(vec![1.0], "b"),
        ];
        assert!(trainer.train_classifier("first", &records, "outcome").await);
        assert!(trainer.train_clusterer("second", &records, 2).await);

        assert_eq!(trainer.list_models().await, vec!["first", "second"]);
        assert!(trainer.delete_model("first").await);
        assert!(!trainer.delete_model("first").await);
        assert_eq!(trainer.model_count().await, 1);
    }
}

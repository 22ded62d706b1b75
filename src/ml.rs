//! Lifecycle of the four ML inference models used by ingestion and text analysis.

use crate::{config::Config, elastic::ModelAdmin};
use serde_json::{Value, json};
use std::fmt;

/// The role a trained model plays in the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelRole {
    /// Learned-sparse text expansion used by ingest pipelines and semantic search.
    Elser,
    /// Named entity recognition.
    Ner,
    /// Sentiment classification.
    Sentiment,
    /// Zero-shot classification.
    ZeroShot,
}

impl ModelRole {
    /// Every role, in deployment order.
    pub const ALL: [ModelRole; 4] = [
        ModelRole::Elser,
        ModelRole::Ner,
        ModelRole::Sentiment,
        ModelRole::ZeroShot,
    ];

    /// Upper-case label used in log and console messages.
    pub fn label(self) -> &'static str {
        match self {
            ModelRole::Elser => "ELSER",
            ModelRole::Ner => "NER",
            ModelRole::Sentiment => "SENTIMENT",
            ModelRole::ZeroShot => "ZERO_SHOT",
        }
    }

    /// Inference task type registered with the model.
    pub fn task_type(self) -> &'static str {
        match self {
            ModelRole::Elser => "text_expansion",
            ModelRole::Ner => "ner",
            ModelRole::Sentiment => "text_classification",
            ModelRole::ZeroShot => "zero_shot_classification",
        }
    }

    /// Configured model id for this role.
    pub fn model_id(self, config: &Config) -> &str {
        match self {
            ModelRole::Elser => &config.elser_model,
            ModelRole::Ner => &config.ner_model,
            ModelRole::Sentiment => &config.sentiment_model,
            ModelRole::ZeroShot => &config.zero_shot_model,
        }
    }

    /// Body of the trained-model registration request.
    pub fn registration_body(self) -> Value {
        json!({
            "inference_config": { self.task_type(): {} },
            "input": { "field_names": ["text_field"] },
            "description": format!("{} model", self.label()),
        })
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-model results of a deploy or remove pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LifecycleReport {
    /// Models handled successfully.
    pub succeeded: Vec<ModelRole>,
    /// Models that failed, with the error message.
    pub failed: Vec<(ModelRole, String)>,
}

/// Installation state of every model.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ModelStatus {
    /// Models found on the cluster.
    pub installed: Vec<ModelRole>,
    /// Models missing or not retrievable.
    pub missing: Vec<ModelRole>,
}

/// Deploys, removes, and checks the configured models.
pub struct ModelManager<'a, A: ModelAdmin + ?Sized> {
    admin: &'a A,
    models: Vec<(ModelRole, String)>,
}

impl<'a, A: ModelAdmin + ?Sized> ModelManager<'a, A> {
    /// Manage every role with the ids from `config`.
    pub fn new(admin: &'a A, config: &Config) -> Self {
        let models = ModelRole::ALL
            .iter()
            .map(|role| (*role, role.model_id(config).to_string()))
            .collect();
        Self { admin, models }
    }

    /// Register and start every model. Failures are logged and the loop continues.
    pub async fn deploy_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for (role, model_id) in &self.models {
            tracing::info!(model = %model_id, "Deploying {role} model...");
            let result = async {
                self.admin
                    .put_trained_model(model_id, &role.registration_body())
                    .await?;
                self.admin.start_deployment(model_id).await
            }
            .await;
            match result {
                Ok(()) => {
                    tracing::info!(model = %model_id, "{role} model deployed successfully.");
                    report.succeeded.push(*role);
                }
                Err(err) => {
                    tracing::error!(model = %model_id, error = %err, "Error deploying {role} model: {err}");
                    report.failed.push((*role, err.to_string()));
                }
            }
        }
        report
    }

    /// Stop and delete every model. Failures are logged and the loop continues.
    pub async fn remove_all(&self) -> LifecycleReport {
        let mut report = LifecycleReport::default();
        for (role, model_id) in &self.models {
            tracing::info!(model = %model_id, "Removing {role} model...");
            let result = async {
                self.admin.stop_deployment(model_id).await?;
                self.admin.delete_trained_model(model_id).await
            }
            .await;
            match result {
                Ok(()) => {
                    tracing::info!(model = %model_id, "{role} model removed successfully.");
                    report.succeeded.push(*role);
                }
                Err(err) => {
                    tracing::error!(model = %model_id, error = %err, "Error removing {role} model: {err}");
                    report.failed.push((*role, err.to_string()));
                }
            }
        }
        report
    }

    /// Report which models are installed. Lookup errors count as missing.
    pub async fn check(&self) -> ModelStatus {
        let mut status = ModelStatus::default();
        for (role, model_id) in &self.models {
            match self.admin.trained_model_exists(model_id).await {
                Ok(true) => status.installed.push(*role),
                Ok(false) => status.missing.push(*role),
                Err(err) => {
                    tracing::warn!(model = %model_id, error = %err, "Model lookup failed");
                    status.missing.push(*role);
                }
            }
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use crate::elastic::ElasticError;
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Model API double that rejects one model id and records every call.
    #[derive(Default)]
    struct FakeModels {
        broken: Option<String>,
        installed: Mutex<HashSet<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeModels {
        fn fail_for(&self, model_id: &str) -> Result<(), ElasticError> {
            if self.broken.as_deref() == Some(model_id) {
                return Err(ElasticError::UnexpectedStatus {
                    status: StatusCode::BAD_REQUEST,
                    body: "resource_not_found_exception".into(),
                });
            }
            Ok(())
        }

        fn record(&self, call: String) {
            self.calls.lock().expect("lock").push(call);
        }
    }

    #[async_trait]
    impl ModelAdmin for FakeModels {
        async fn put_trained_model(&self, model_id: &str, body: &Value) -> Result<(), ElasticError> {
            self.record(format!("put {model_id} {}", body["inference_config"]));
            self.fail_for(model_id)?;
            self.installed
                .lock()
                .expect("lock")
                .insert(model_id.to_string());
            Ok(())
        }

        async fn start_deployment(&self, model_id: &str) -> Result<(), ElasticError> {
            self.record(format!("start {model_id}"));
            Ok(())
        }

        async fn stop_deployment(&self, model_id: &str) -> Result<(), ElasticError> {
            self.record(format!("stop {model_id}"));
            self.fail_for(model_id)
        }

        async fn delete_trained_model(&self, model_id: &str) -> Result<(), ElasticError> {
            self.record(format!("delete {model_id}"));
            self.installed.lock().expect("lock").remove(model_id);
            Ok(())
        }

        async fn trained_model_exists(&self, model_id: &str) -> Result<bool, ElasticError> {
            Ok(self.installed.lock().expect("lock").contains(model_id))
        }
    }

    #[test]
    fn registration_uses_task_specific_config() {
        let body = ModelRole::ZeroShot.registration_body();
        assert_eq!(
            body["inference_config"],
            json!({ "zero_shot_classification": {} })
        );
        assert_eq!(body["input"]["field_names"], json!(["text_field"]));
        assert_eq!(body["description"], "ZERO_SHOT model");
    }

    #[tokio::test]
    async fn deploy_continues_past_a_failing_model() {
        let config = test_config("http://127.0.0.1:9200");
        let admin = FakeModels {
            broken: Some("ner-model".into()),
            ..FakeModels::default()
        };
        let manager = ModelManager::new(&admin, &config);

        let report = manager.deploy_all().await;

        assert_eq!(
            report.succeeded,
            [ModelRole::Elser, ModelRole::Sentiment, ModelRole::ZeroShot]
        );
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ModelRole::Ner);
        let calls = admin.calls.lock().expect("lock");
        assert!(!calls.contains(&"start ner-model".to_string()));
        assert!(calls.contains(&"start zero-shot-model".to_string()));

        let status = manager.check().await;
        assert_eq!(status.missing, [ModelRole::Ner]);
        assert_eq!(status.installed.len(), 3);
    }

    #[tokio::test]
    async fn remove_stops_before_deleting() {
        let config = test_config("http://127.0.0.1:9200");
        let admin = FakeModels::default();
        let manager = ModelManager::new(&admin, &config);
        manager.deploy_all().await;
        admin.calls.lock().expect("lock").clear();

        let report = manager.remove_all().await;

        assert_eq!(report.succeeded.len(), 4);
        assert!(manager.check().await.installed.is_empty());
        let calls = admin.calls.lock().expect("lock");
        assert_eq!(calls[0], format!("stop {}", config.elser_model));
        assert_eq!(calls[1], format!("delete {}", config.elser_model));
    }
}

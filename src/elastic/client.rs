//! HTTP client wrapper for interacting with Elasticsearch.

use crate::config::Config;
use crate::elastic::{
    backend::{BulkWriter, IndexAdmin, ModelAdmin, SearchBackend},
    bulk::{BulkAction, encode_ndjson},
    types::{
        BulkOutcome, ElasticError, InferResponse, RawBulkResponse, Removal, SearchResponse,
        SqlResponse,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use std::time::Duration;

const BULK_TIMEOUT: Duration = Duration::from_secs(300);

/// Lightweight HTTP client for Elasticsearch operations.
pub struct ElasticService {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
}

impl ElasticService {
    /// Construct a new client from the loaded configuration.
    pub fn new(config: &Config) -> Result<Self, ElasticError> {
        let client = Client::builder().user_agent("insightmed/0.1").build()?;

        let base_url = normalize_base_url(&config.elastic_url).map_err(ElasticError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            has_api_key = config.api_key.as_deref().is_some_and(|value| !value.is_empty()),
            "Initialized Elasticsearch HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, ElasticError> {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("Authorization", format!("ApiKey {api_key}"));
        }
        Ok(req)
    }

    async fn check(
        &self,
        response: reqwest::Response,
        context: &'static str,
    ) -> Result<reqwest::Response, ElasticError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = ElasticError::UnexpectedStatus { status, body };
            if status != StatusCode::NOT_FOUND {
                tracing::error!(error = %error, "{context}");
            }
            Err(error)
        }
    }

    async fn exists(&self, method: Method, path: &str) -> Result<bool, ElasticError> {
        let response = self.request(method, path)?.send().await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = ElasticError::UnexpectedStatus { status, body };
                tracing::error!(path, error = %error, "Existence check failed");
                Err(error)
            }
        }
    }

    async fn delete(&self, path: &str) -> Result<Removal, ElasticError> {
        let response = self.request(Method::DELETE, path)?.send().await?;
        match self.check(response, "Delete request failed").await {
            Ok(_) => Ok(Removal::Deleted),
            Err(error) if error.is_not_found() => Ok(Removal::NotFound),
            Err(error) => Err(error),
        }
    }

    async fn send_json(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        context: &'static str,
    ) -> Result<(), ElasticError> {
        let mut req = self.request(method, path)?;
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await?;
        self.check(response, context).await.map(|_| ())
    }
}

#[async_trait]
impl IndexAdmin for ElasticService {
    async fn index_exists(&self, index: &str) -> Result<bool, ElasticError> {
        self.exists(Method::HEAD, index).await
    }

    async fn create_index(&self, index: &str, body: &Value) -> Result<(), ElasticError> {
        self.send_json(Method::PUT, index, Some(body), "Index creation failed")
            .await?;
        tracing::debug!(index, "Index created");
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> Result<Removal, ElasticError> {
        self.delete(index).await
    }

    async fn pipeline_exists(&self, id: &str) -> Result<bool, ElasticError> {
        self.exists(Method::GET, &format!("_ingest/pipeline/{id}"))
            .await
    }

    async fn put_pipeline(&self, id: &str, body: &Value) -> Result<(), ElasticError> {
        self.send_json(
            Method::PUT,
            &format!("_ingest/pipeline/{id}"),
            Some(body),
            "Pipeline creation failed",
        )
        .await?;
        tracing::debug!(pipeline = id, "Pipeline stored");
        Ok(())
    }

    async fn delete_pipeline(&self, id: &str) -> Result<Removal, ElasticError> {
        self.delete(&format!("_ingest/pipeline/{id}")).await
    }
}

#[async_trait]
impl BulkWriter for ElasticService {
    async fn bulk(&self, actions: &[BulkAction]) -> Result<BulkOutcome, ElasticError> {
        if actions.is_empty() {
            return Ok(BulkOutcome::default());
        }

        let body = encode_ndjson(actions)?;
        let response = self
            .request(Method::POST, "_bulk")?
            .timeout(BULK_TIMEOUT)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let response = self.check(response, "Bulk request failed").await?;

        let raw: RawBulkResponse = response.json().await?;
        let outcome = raw.into_outcome();
        tracing::debug!(
            submitted = actions.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failures.len(),
            "Bulk request completed"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl SearchBackend for ElasticService {
    async fn search(&self, index: &str, body: &Value) -> Result<SearchResponse, ElasticError> {
        let response = self
            .request(Method::POST, &format!("{index}/_search"))?
            .json(body)
            .send()
            .await?;
        let response = self.check(response, "Search failed").await?;
        Ok(response.json().await?)
    }

    async fn sql_query(&self, query: &str) -> Result<SqlResponse, ElasticError> {
        let response = self
            .request(Method::POST, "_sql")?
            .query(&[("format", "json")])
            .json(&json!({ "query": query }))
            .send()
            .await?;
        let response = self.check(response, "SQL query failed").await?;
        Ok(response.json().await?)
    }

    async fn infer(
        &self,
        model_id: &str,
        text: &str,
        inference_config: Option<Value>,
    ) -> Result<Value, ElasticError> {
        let mut body = json!({ "docs": [ { "text_field": text } ] });
        if let (Some(config), Some(object)) = (inference_config, body.as_object_mut()) {
            object.insert("inference_config".into(), config);
        }

        let response = self
            .request(Method::POST, &format!("_ml/trained_models/{model_id}/_infer"))?
            .json(&body)
            .send()
            .await?;
        let response = self.check(response, "Inference request failed").await?;
        let payload: InferResponse = response.json().await?;
        payload.inference_results.into_iter().next().ok_or_else(|| {
            ElasticError::MalformedResponse("inference_results was empty".to_string())
        })
    }
}

#[async_trait]
impl ModelAdmin for ElasticService {
    async fn put_trained_model(&self, model_id: &str, body: &Value) -> Result<(), ElasticError> {
        self.send_json(
            Method::PUT,
            &format!("_ml/trained_models/{model_id}"),
            Some(body),
            "Trained model registration failed",
        )
        .await
    }

    async fn start_deployment(&self, model_id: &str) -> Result<(), ElasticError> {
        self.send_json(
            Method::POST,
            &format!("_ml/trained_models/{model_id}/deployment/_start"),
            None,
            "Model deployment start failed",
        )
        .await
    }

    async fn stop_deployment(&self, model_id: &str) -> Result<(), ElasticError> {
        self.send_json(
            Method::POST,
            &format!("_ml/trained_models/{model_id}/deployment/_stop"),
            None,
            "Model deployment stop failed",
        )
        .await
    }

    async fn delete_trained_model(&self, model_id: &str) -> Result<(), ElasticError> {
        self.send_json(
            Method::DELETE,
            &format!("_ml/trained_models/{model_id}"),
            None,
            "Trained model deletion failed",
        )
        .await
    }

    async fn trained_model_exists(&self, model_id: &str) -> Result<bool, ElasticError> {
        self.exists(Method::GET, &format!("_ml/trained_models/{model_id}"))
            .await
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

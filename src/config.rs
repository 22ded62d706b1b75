use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_INDEX_NAME: &str = "healthcare";
const DEFAULT_ELSER_MODEL: &str = ".elser_model_2";
const DEFAULT_NER_MODEL: &str = "elastic__distilbert-base-uncased-finetuned-conll03-english";
const DEFAULT_SENTIMENT_MODEL: &str = "distilbert-base-uncased-finetuned-sst-2-english";
const DEFAULT_ZERO_SHOT_MODEL: &str = "typeform__mobilebert-uncased-mnli";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
const DEFAULT_RANDOM_USER_URL: &str = "https://randomuser.me/api/?nat=nz";
const DEFAULT_BULK_BATCH_SIZE: usize = 10;
const DEFAULT_BULK_BACKOFF_SECONDS: u64 = 5;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration shared by the dashboard and the command-line tools.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Elasticsearch deployment, resolved from `ELASTIC_URL` or `CLOUD_ID`.
    pub elastic_url: String,
    /// Optional API key sent as `Authorization: ApiKey <key>`.
    pub api_key: Option<String>,
    /// Index holding uploaded blood reports.
    pub index_name: String,
    /// Ingest pipeline applied to uploaded blood reports.
    pub pipeline_name: String,
    /// Learned-sparse (ELSER) model used for text expansion.
    pub elser_model: String,
    /// Named entity recognition model.
    pub ner_model: String,
    /// Sentiment classification model.
    pub sentiment_model: String,
    /// Zero-shot classification model.
    pub zero_shot_model: String,
    /// Optional key for the chat-completion API.
    pub openai_api_key: Option<String>,
    /// Base URL of the chat-completion API.
    pub openai_url: String,
    /// Chat model identifier.
    pub openai_model: String,
    /// Endpoint returning one synthetic identity per request.
    pub random_user_url: String,
    /// Optional override for the dashboard HTTP port.
    pub server_port: Option<u16>,
    /// Number of files submitted per bulk request.
    pub bulk_batch_size: usize,
    /// Base delay of the bulk retry backoff, in seconds.
    pub bulk_backoff_seconds: u64,
    /// Idle time after which a dashboard session is dropped, in seconds.
    pub session_ttl_seconds: u64,
    /// Most dashboard sessions kept in memory at once.
    pub max_sessions: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let elastic_url = match (load_env_optional("ELASTIC_URL"), load_env_optional("CLOUD_ID")) {
            (Some(url), _) => url,
            (None, Some(cloud_id)) => cloud_id_to_url(&cloud_id)?,
            (None, None) => {
                return Err(ConfigError::MissingVariable(
                    "ELASTIC_URL or CLOUD_ID".to_string(),
                ));
            }
        };
        let index_name =
            load_env_optional("INDEX_NAME").unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string());
        let pipeline_name =
            load_env_optional("PIPELINE_NAME").unwrap_or_else(|| format!("pipeline-{index_name}"));

        Ok(Self {
            elastic_url,
            api_key: load_env_optional("API_KEY"),
            index_name,
            pipeline_name,
            elser_model: load_env_or("ELSER_MODEL", DEFAULT_ELSER_MODEL),
            ner_model: load_env_or("NER_MODEL", DEFAULT_NER_MODEL),
            sentiment_model: load_env_or("SENTIMENT_MODEL", DEFAULT_SENTIMENT_MODEL),
            zero_shot_model: load_env_or("ZERO_SHOT_MODEL", DEFAULT_ZERO_SHOT_MODEL),
            openai_api_key: load_env_optional("OPENAI_API_KEY")
                .or_else(|| load_env_optional("OPEN_AI_KEY")),
            openai_url: load_env_or("OPENAI_URL", DEFAULT_OPENAI_URL),
            openai_model: load_env_or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            random_user_url: load_env_or("RANDOM_USER_URL", DEFAULT_RANDOM_USER_URL),
            server_port: parse_optional("SERVER_PORT")?,
            bulk_batch_size: parse_optional("BULK_BATCH_SIZE")?
                .filter(|size: &usize| *size > 0)
                .unwrap_or(DEFAULT_BULK_BATCH_SIZE),
            bulk_backoff_seconds: parse_optional("BULK_BACKOFF_SECONDS")?
                .unwrap_or(DEFAULT_BULK_BACKOFF_SECONDS),
            session_ttl_seconds: parse_optional("SESSION_TTL_SECONDS")?
                .filter(|seconds: &u64| *seconds > 0)
                .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
            max_sessions: parse_optional("MAX_SESSIONS")?
                .filter(|count: &usize| *count > 0)
                .unwrap_or(DEFAULT_MAX_SESSIONS),
        })
    }

    /// Index holding synthetic clinical notes.
    pub fn notes_index_name(&self) -> String {
        format!("notes-{}", self.index_name)
    }

    /// Ingest pipeline applied to synthetic clinical notes.
    pub fn notes_pipeline_name(&self) -> String {
        format!("pipeline-{}", self.notes_index_name())
    }
}

/// Decode an Elastic Cloud identifier into the HTTPS endpoint of its Elasticsearch cluster.
///
/// A cloud id has the shape `name:base64(host[:port]$es_uuid$kibana_uuid)`; the resulting URL is
/// `https://<es_uuid>.<host>[:port]`.
pub fn cloud_id_to_url(cloud_id: &str) -> Result<String, ConfigError> {
    let invalid = || ConfigError::InvalidValue("CLOUD_ID".to_string());
    let encoded = cloud_id
        .split_once(':')
        .map(|(_, encoded)| encoded)
        .unwrap_or(cloud_id);
    let decoded = STANDARD.decode(encoded.trim()).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;

    let mut parts = decoded.split('$');
    let host = parts.next().filter(|value| !value.is_empty()).ok_or_else(invalid)?;
    let es_uuid = parts.next().filter(|value| !value.is_empty()).ok_or_else(invalid)?;

    let url = match host.split_once(':') {
        Some((host, port)) => format!("https://{es_uuid}.{host}:{port}"),
        None => format!("https://{es_uuid}.{host}"),
    };
    Ok(url)
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_or(key: &str, default: &str) -> String {
    load_env_optional(key).unwrap_or_else(|| default.to_string())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

/// Random-person endpoint for tools that run without a cluster, read from `RANDOM_USER_URL`
/// (and `.env`).
pub fn random_user_url() -> String {
    dotenvy::dotenv().ok();
    load_env_or("RANDOM_USER_URL", DEFAULT_RANDOM_USER_URL)
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment (and `.env`) and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        elastic_url = %config.elastic_url,
        index = %config.index_name,
        pipeline = %config.pipeline_name,
        elser_model = %config.elser_model,
        server_port = ?config.server_port,
        has_api_key = config.api_key.is_some(),
        has_openai_key = config.openai_api_key.is_some(),
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    Ok(get_config())
}

#[cfg(test)]
pub(crate) fn test_config(elastic_url: &str) -> Config {
    Config {
        elastic_url: elastic_url.to_string(),
        api_key: Some("test-key".into()),
        index_name: "healthcare".into(),
        pipeline_name: "pipeline-healthcare".into(),
        elser_model: DEFAULT_ELSER_MODEL.into(),
        ner_model: "ner-model".into(),
        sentiment_model: "sentiment-model".into(),
        zero_shot_model: "zero-shot-model".into(),
        openai_api_key: Some("sk-test".into()),
        openai_url: "http://127.0.0.1:9".into(),
        openai_model: DEFAULT_OPENAI_MODEL.into(),
        random_user_url: "http://127.0.0.1:9/api".into(),
        server_port: None,
        bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        bulk_backoff_seconds: DEFAULT_BULK_BACKOFF_SECONDS,
        session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        max_sessions: DEFAULT_MAX_SESSIONS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_cloud_id_without_port() {
        let payload = STANDARD.encode("us-east-1.aws.found.io$abc123$kib456");
        let url = cloud_id_to_url(&format!("deployment:{payload}")).expect("cloud id");
        assert_eq!(url, "https://abc123.us-east-1.aws.found.io");
    }

    #[test]
    fn decodes_cloud_id_with_port() {
        let payload = STANDARD.encode("eu-west-1.aws.found.io:9243$esuuid$kbuuid");
        let url = cloud_id_to_url(&format!("demo:{payload}")).expect("cloud id");
        assert_eq!(url, "https://esuuid.eu-west-1.aws.found.io:9243");
    }

    #[test]
    fn rejects_malformed_cloud_id() {
        let error = cloud_id_to_url("demo:!!not-base64!!").expect_err("invalid");
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "CLOUD_ID"));

        let missing_uuid = STANDARD.encode("host.example");
        assert!(cloud_id_to_url(&format!("demo:{missing_uuid}")).is_err());
    }

    #[test]
    fn derives_notes_names_from_index() {
        let config = test_config("http://localhost:9200");
        assert_eq!(config.notes_index_name(), "notes-healthcare");
        assert_eq!(config.notes_pipeline_name(), "pipeline-notes-healthcare");
    }
}

//! Text analysis through deployed NLP models: entities, sentiment, and zero-shot topics.

use crate::{
    config::Config,
    elastic::{ElasticError, SearchBackend},
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Candidate labels for zero-shot classification.
pub const ZERO_SHOT_LABELS: [&str; 4] = ["Healthcare", "Technology", "Finance", "Education"];

static ENTITY_MARKUP: LazyLock<[(Regex, &'static str); 3]> = LazyLock::new(|| {
    [
        (Regex::new(r"\[([^\]]+)\]\(PER&[^)]+\)").expect("valid regex"), "👤"),
        (Regex::new(r"\[([^\]]+)\]\(LOC&[^)]+\)").expect("valid regex"), "🌎"),
        (Regex::new(r"\[([^\]]+)\]\(ORG&[^)]+\)").expect("valid regex"), "🏢"),
    ]
});

/// Analyses offered by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisKind {
    /// Named entity recognition.
    #[serde(rename = "Named Entity Recognition")]
    NamedEntities,
    /// Sentiment classification.
    #[serde(rename = "Sentiment Analysis")]
    Sentiment,
    /// Zero-shot topic classification.
    #[serde(rename = "Zero Shot Recognition")]
    ZeroShot,
}

impl AnalysisKind {
    /// Every analysis, in menu order.
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::NamedEntities,
        AnalysisKind::Sentiment,
        AnalysisKind::ZeroShot,
    ];

    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            AnalysisKind::NamedEntities => "Named Entity Recognition",
            AnalysisKind::Sentiment => "Sentiment Analysis",
            AnalysisKind::ZeroShot => "Zero Shot Recognition",
        }
    }

    /// Parse a menu label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.label() == label)
    }

    fn model_id(self, config: &Config) -> &str {
        match self {
            AnalysisKind::NamedEntities => &config.ner_model,
            AnalysisKind::Sentiment => &config.sentiment_model,
            AnalysisKind::ZeroShot => &config.zero_shot_model,
        }
    }
}

/// Runs analyses against the `_infer` endpoint of the configured models.
pub struct TextAnalyzer<'a, B: SearchBackend + ?Sized> {
    backend: &'a B,
    config: &'a Config,
}

impl<'a, B: SearchBackend + ?Sized> TextAnalyzer<'a, B> {
    /// Bind the analyzer to a backend and model configuration.
    pub fn new(backend: &'a B, config: &'a Config) -> Self {
        Self { backend, config }
    }

    /// Run `kind` over `text`, returning display text. Failures become an error sentence.
    pub async fn analyze(&self, kind: AnalysisKind, text: &str) -> String {
        let model_id = kind.model_id(self.config);
        let result = match kind {
            AnalysisKind::NamedEntities => self
                .backend
                .infer(model_id, text, None)
                .await
                .map(|result| format_entities(&result)),
            AnalysisKind::Sentiment => self
                .backend
                .infer(model_id, text, None)
                .await
                .map(|result| format_sentiment(&result)),
            AnalysisKind::ZeroShot => self
                .backend
                .infer(model_id, text, Some(zero_shot_config()))
                .await
                .map(|result| format_zero_shot(&result)),
        };
        result.unwrap_or_else(|err: ElasticError| {
            tracing::warn!(analysis = kind.label(), error = %err, "Text analysis failed");
            format!("Error performing {}: {err}", kind.label())
        })
    }
}

fn zero_shot_config() -> Value {
    json!({
        "zero_shot_classification": {
            "labels": ZERO_SHOT_LABELS,
            "multi_label": false
        }
    })
}

/// Replace `[text](PER&…)`-style entity markup with the text and an icon.
pub fn replace_entity_markup(predicted: &str) -> String {
    let mut text = predicted.to_string();
    for (pattern, icon) in ENTITY_MARKUP.iter() {
        text = pattern
            .replace_all(&text, format!("$1 {icon}").as_str())
            .into_owned();
    }
    text
}

fn format_entities(result: &Value) -> String {
    let predicted = result
        .get("predicted_value")
        .and_then(Value::as_str)
        .unwrap_or_default();
    format!("Named Entities:\n{}", replace_entity_markup(predicted))
}

fn format_sentiment(result: &Value) -> String {
    let label = result
        .get("predicted_value")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let probability = result
        .get("prediction_probability")
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let emoji = match label.to_lowercase().as_str() {
        "positive" => "😊",
        "negative" => "😞",
        "neutral" => "😐",
        _ => "",
    };
    format!("Sentiment: {label} {emoji}\nConfidence: {probability:.2}")
}

fn format_zero_shot(result: &Value) -> String {
    let mut scores = class_scores(result);
    scores.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut text = String::from("Zero-shot Classification Results:\n");
    for (label, score) in scores {
        text.push_str(&format!("{label}: {score:.2}\n"));
    }
    text
}

fn class_scores(result: &Value) -> Vec<(String, f64)> {
    if let Some(classes) = result.get("top_classes").and_then(Value::as_array) {
        return classes
            .iter()
            .filter_map(|class| {
                let label = class.get("class_name")?.as_str()?;
                let score = class
                    .get("class_score")
                    .or_else(|| class.get("class_probability"))?
                    .as_f64()?;
                Some((label.to_string(), score))
            })
            .collect();
    }
    result
        .get("prediction")
        .and_then(Value::as_array)
        .map(|predictions| {
            predictions
                .iter()
                .filter_map(|p| Some((p.get("label")?.as_str()?.to_string(), p.get("score")?.as_f64()?)))
                .collect()
        })
        .unwrap_or_default()
}

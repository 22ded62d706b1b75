//! Routing of blood-test chat messages into chart requests and general questions.

use crate::llm::ChatRequest;
use serde::{Deserialize, Serialize};
use std::fmt;

const SYSTEM: &str = "You are a helpful assistant that classifies medical queries.";

/// Chart style requested by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Line graph over test dates.
    #[default]
    Line,
    /// Bar chart over test dates.
    Bar,
    /// Stacked area chart over test dates.
    Area,
    /// Scatter plot over test dates.
    Scatter,
    /// Plain table of the returned rows.
    Table,
}

impl ChartKind {
    /// Parse a chart name; unknown names are `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "line" => Some(ChartKind::Line),
            "bar" => Some(ChartKind::Bar),
            "area" => Some(ChartKind::Area),
            "scatter" => Some(ChartKind::Scatter),
            "table" => Some(ChartKind::Table),
            _ => None,
        }
    }

    /// Lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            ChartKind::Line => "line",
            ChartKind::Bar => "bar",
            ChartKind::Area => "area",
            ChartKind::Scatter => "scatter",
            ChartKind::Table => "table",
        }
    }
}

impl fmt::Display for ChartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of classifying a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    /// The user wants a chart or table of their results.
    Visualization(ChartKind),
    /// Anything else; answered from retrieved documents.
    General,
}

/// Completion request asking the model to classify `query`.
pub fn classification_request(query: &str) -> ChatRequest {
    let prompt = format!(
        "Classify the following query into one of these categories:\n\
         1. Asking for generating graph, visuals, or table\n\
         2. Other query\n\n\
         If category 1, also specify the visualization type (line, bar, area, scatter, or table).\n\n\
         Query: {query}\n\n\
         Respond with the category number followed by the visualization type if applicable, \
         e.g., \"1 line\", \"1 table\", or \"2\""
    );
    ChatRequest::new(SYSTEM, prompt, 10, 0.3)
}

/// Parse the model's answer. Anything other than a leading `1` is a general question; a
/// missing or unknown chart name defaults to a line chart.
pub fn parse_classification(answer: &str) -> QueryClass {
    let mut tokens = answer
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()));
    match tokens.next() {
        Some("1") => {
            let kind = tokens.next().and_then(ChartKind::parse).unwrap_or_default();
            QueryClass::Visualization(kind)
        }
        _ => QueryClass::General,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visualisation_answers_carry_their_chart_kind() {
        assert_eq!(
            parse_classification("1 table"),
            QueryClass::Visualization(ChartKind::Table)
        );
        assert_eq!(
            parse_classification(" 1 Bar\n"),
            QueryClass::Visualization(ChartKind::Bar)
        );
    }

    #[test]
    fn missing_or_unknown_chart_defaults_to_line() {
        assert_eq!(
            parse_classification("1"),
            QueryClass::Visualization(ChartKind::Line)
        );
        assert_eq!(
            parse_classification("1 pie"),
            QueryClass::Visualization(ChartKind::Line)
        );
    }

    #[test]
    fn everything_else_is_general() {
        assert_eq!(parse_classification("2"), QueryClass::General);
        assert_eq!(parse_classification(""), QueryClass::General);
        assert_eq!(parse_classification("Category 1"), QueryClass::General);
    }

    #[test]
    fn request_uses_short_low_temperature_completion() {
        let request = classification_request("plot Jane's haemoglobin");
        assert_eq!(request.max_tokens, 10);
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
        assert!(request.user.contains("Query: plot Jane's haemoglobin"));
    }
}

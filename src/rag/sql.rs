//! SQL generation for chart requests and its execution.

use super::extract::PatientQuery;
use crate::{
    elastic::{SearchBackend, SqlResponse},
    llm::ChatRequest,
};

const SYSTEM: &str = "You are an expert in generating E|SQL queries for Elasticsearch. Only return \
                      the query, nothing else. Do not include semicolons. Always use the provided \
                      index name in the FROM clause.";

/// Completion request asking the model for the SQL that fetches `patient`'s history.
pub fn sql_request(patient: &PatientQuery, index: &str) -> ChatRequest {
    let parameters = patient.parameters.join(", ");
    let prompt = format!(
        "Generate an E|SQL query to fetch historical blood count data for a patient with the \
         following information:\n\
         Patient Info: name: {}, nhi: {}\n\
         Blood Parameters: {parameters}\n\
         Index Name: {index}\n\
         The query should:\n\
         1. Use the specified index name in the FROM clause.\n\
         2. Select patient_name, nhi, test_date, and all the specified blood parameters.\n\
         3. Include a WHERE clause to filter using: {}\n\
         4. Order the results by test_date.\n\
         5. Use lowercase for all column names except NHI.\n\
         6. Do not use 'AS' aliases for column names.\n\
         IMPORTANT: Only return the E|SQL query, nothing else. Do not include any explanations, \
         additional text, or semicolons at the end.",
        patient.name.as_deref().unwrap_or("None"),
        patient.nhi.as_deref().unwrap_or("None"),
        patient.filter_clause(),
    );
    ChatRequest::new(SYSTEM, prompt, 200, 0.7)
}

/// Clean up generated SQL.
///
/// Prefixes `SELECT` when missing and strips trailing semicolons. Every token before `FROM`
/// except a bare `NHI` is lower-cased, keywords included, and whitespace is collapsed.
pub fn normalize_sql(generated: &str) -> String {
    let trimmed = generated.trim();
    let mut query = if trimmed.to_ascii_uppercase().starts_with("SELECT") {
        trimmed.to_string()
    } else {
        format!("SELECT {trimmed}")
    };
    query = query.trim_end_matches(';').trim_end().to_string();

    let mut before_from = true;
    query
        .split_whitespace()
        .map(|token| {
            let upper = token.to_ascii_uppercase();
            if upper == "FROM" {
                before_from = false;
            }
            if before_from && upper != "NHI" {
                token.to_lowercase()
            } else {
                token.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Execute `query`, returning `None` on failure.
///
/// When the failure names an unknown column, one `SELECT * FROM <index> LIMIT 1` is run purely
/// to log the available columns; the original query is not retried.
pub async fn execute_sql<B: SearchBackend + ?Sized>(
    backend: &B,
    query: &str,
    index: &str,
) -> Option<SqlResponse> {
    match backend.sql_query(query).await {
        Ok(response) => Some(response),
        Err(err) => {
            tracing::error!(query, error = %err, "Error executing E|SQL query");
            if err.to_string().contains("Unknown column") {
                log_available_columns(backend, index).await;
            }
            None
        }
    }
}

async fn log_available_columns<B: SearchBackend + ?Sized>(backend: &B, index: &str) {
    let sample = format!("SELECT * FROM {index} LIMIT 1");
    match backend.sql_query(&sample).await {
        Ok(response) if !response.rows.is_empty() => {
            let columns: Vec<&str> = response.columns.iter().map(|c| c.name.as_str()).collect();
            tracing::info!(index, ?columns, "Available columns");
        }
        Ok(_) => tracing::info!(index, "No rows available to list columns"),
        Err(err) => {
            tracing::error!(index, error = %err, "Error while trying to fetch available columns");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::{ElasticError, SearchResponse, SqlColumn};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct UnknownColumnSql {
        queries: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SearchBackend for UnknownColumnSql {
        async fn search(&self, _: &str, _: &Value) -> Result<SearchResponse, ElasticError> {
            Ok(SearchResponse::default())
        }

        async fn sql_query(&self, query: &str) -> Result<SqlResponse, ElasticError> {
            self.queries.lock().expect("lock").push(query.to_string());
            if query.contains("LIMIT 1") {
                return Ok(SqlResponse {
                    columns: vec![SqlColumn {
                        name: "haemoglobin".into(),
                        kind: "float".into(),
                    }],
                    rows: vec![vec![json!(140.0)]],
                });
            }
            Err(ElasticError::UnexpectedStatus {
                status: StatusCode::BAD_REQUEST,
                body: "Unknown column [hemoglobin]".into(),
            })
        }

        async fn infer(&self, _: &str, _: &str, _: Option<Value>) -> Result<Value, ElasticError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn normalisation_lowercases_every_projected_token() {
        assert_eq!(
            normalize_sql("patient_name, NHI, Test_Date, HAEMOGLOBIN FROM healthcare WHERE MATCH(patient_name, 'Jane Doe');"),
            "select patient_name, nhi, test_date, haemoglobin FROM healthcare WHERE MATCH(patient_name, 'Jane Doe')"
        );
    }

    #[test]
    fn normalisation_keeps_a_bare_nhi_column() {
        assert_eq!(
            normalize_sql("SELECT NHI FROM healthcare WHERE NHI = 'ABC1234'"),
            "select NHI FROM healthcare WHERE NHI = 'ABC1234'"
        );
        assert_eq!(
            normalize_sql("Patient_Name NHI Test_Date FROM healthcare"),
            "select patient_name NHI test_date FROM healthcare"
        );
    }

    #[test]
    fn normalisation_collapses_whitespace_and_strips_semicolons() {
        assert_eq!(
            normalize_sql("  select   WBC\n FROM healthcare   ORDER BY test_date ;;"),
            "select wbc FROM healthcare ORDER BY test_date"
        );
    }

    #[test]
    fn request_embeds_filter_clause_and_index() {
        let patient = PatientQuery {
            name: None,
            nhi: Some("ABC1234".into()),
            parameters: vec!["wbc".into()],
        };
        let request = sql_request(&patient, "healthcare");
        assert!(request.user.contains("filter using: nhi = 'ABC1234'"));
        assert!(request.user.contains("Index Name: healthcare"));
        assert_eq!(request.max_tokens, 200);
    }

    #[tokio::test]
    async fn unknown_column_runs_one_diagnostic_query_without_retry() {
        let backend = UnknownColumnSql {
            queries: Mutex::new(Vec::new()),
        };

        let result = execute_sql(&backend, "SELECT hemoglobin FROM healthcare", "healthcare").await;

        assert!(result.is_none());
        let queries = backend.queries.lock().expect("lock");
        assert_eq!(
            *queries,
            [
                "SELECT hemoglobin FROM healthcare".to_string(),
                "SELECT * FROM healthcare LIMIT 1".to_string()
            ]
        );
    }
}

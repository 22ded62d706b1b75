//! Retrieval-augmented chat over blood reports and clinical notes.
//!
//! Blood-test messages are first classified. Chart requests are answered by asking the model
//! for SQL over the report index and describing the rows as a [`ChartSpec`]; everything else is
//! answered from the top retrieved reports. Clinical-note messages always take the retrieval
//! route through [`NotesAssistant`].

pub mod classify;
pub mod extract;
pub mod notes;
pub mod sql;
pub mod visualize;

pub use classify::{ChartKind, QueryClass};
pub use extract::{DEFAULT_PARAMETERS, PatientQuery};
pub use notes::NotesAssistant;
pub use visualize::ChartSpec;

use crate::{
    elastic::{ElasticError, SearchBackend, SearchResponse},
    llm::{ChatClient, ChatClientError, ChatRequest},
    search::text_expansion,
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

const RETRIEVED_REPORTS: u32 = 5;
const REPHRASE: &str = "I'm sorry, but I couldn't identify a patient name or NHI in your \
                        request. Could you please rephrase your question and include the \
                        patient's name or NHI?";
const TABLE_REPLY: &str = "I've generated a table with the requested blood test results.";
const GENERAL_SYSTEM: &str = "You are a helpful assistant that answers questions based on the \
                              given context.";

/// Errors raised while answering a chat message.
#[derive(Debug, Error)]
pub enum RagError {
    /// The chat-completion call failed.
    #[error(transparent)]
    Chat(#[from] ChatClientError),
    /// Retrieval from Elasticsearch failed.
    #[error(transparent)]
    Search(#[from] ElasticError),
}

/// Assistant reply to one chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// Text shown in the conversation.
    pub content: String,
    /// SQL executed for chart requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Chart or table to render alongside the text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSpec>,
}

impl ChatReply {
    /// Plain text reply.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            query: None,
            chart: None,
        }
    }
}

/// Chat assistant for the blood report index.
pub struct BloodTestAssistant<'a, B: SearchBackend + ?Sized, C: ChatClient + ?Sized> {
    backend: &'a B,
    chat: &'a C,
    index: &'a str,
    elser_model: &'a str,
}

impl<'a, B: SearchBackend + ?Sized, C: ChatClient + ?Sized> BloodTestAssistant<'a, B, C> {
    /// Bind the assistant to its clients and the report index.
    pub fn new(backend: &'a B, chat: &'a C, index: &'a str, elser_model: &'a str) -> Self {
        Self {
            backend,
            chat,
            index,
            elser_model,
        }
    }

    /// Answer `message`, routing chart requests to SQL and the rest to retrieval.
    pub async fn reply(&self, message: &str) -> Result<ChatReply, RagError> {
        let answer = self
            .chat
            .complete(classify::classification_request(message))
            .await?;
        let class = classify::parse_classification(&answer);
        tracing::debug!(?class, "Classified chat message");
        match class {
            QueryClass::Visualization(kind) => self.visualize(message, kind).await,
            QueryClass::General => self.answer(message).await.map(ChatReply::text),
        }
    }

    async fn visualize(&self, message: &str, kind: ChartKind) -> Result<ChatReply, RagError> {
        let extracted = self
            .chat
            .complete(extract::extraction_request(message))
            .await?;
        let patient = extract::parse_extraction(&extracted);
        let Some(identifier) = patient.identifier() else {
            return Ok(ChatReply::text(REPHRASE));
        };

        let generated = self
            .chat
            .complete(sql::sql_request(&patient, self.index))
            .await?;
        let query = sql::normalize_sql(&generated);
        tracing::debug!(query = %query, "Generated SQL");

        let result = sql::execute_sql(self.backend, &query, self.index)
            .await
            .filter(|result| !result.rows.is_empty());
        let Some(result) = result else {
            return Ok(ChatReply {
                content: format!(
                    "I'm sorry, but I couldn't find any blood count data for {identifier}."
                ),
                query: Some(query),
                chart: None,
            });
        };

        let content = match kind {
            ChartKind::Table => TABLE_REPLY.to_string(),
            _ => format!(
                "I've generated a historical {kind} graph of blood count for the patient. The \
                 visualization shows the trends for {} over time.",
                patient.parameters.join(", ")
            ),
        };
        Ok(ChatReply {
            content,
            query: Some(query),
            chart: Some(ChartSpec::from_sql(kind, result)),
        })
    }

    async fn answer(&self, message: &str) -> Result<String, RagError> {
        let body = retrieval_body(self.elser_model, message);
        let response = self.backend.search(self.index, &body).await?;
        let context = report_context(&response);
        let prompt = format!("Context: {context}\n\nQuestion: {message}");
        Ok(self
            .chat
            .complete(ChatRequest::new(GENERAL_SYSTEM, prompt, 150, 0.7))
            .await?)
    }
}

fn retrieval_body(elser_model: &str, query: &str) -> Value {
    let mut fields = vec!["patient_name^2", "nhi", "lab", "address"];
    fields.extend(DEFAULT_PARAMETERS);
    fields.extend(["test_date", "*"]);
    json!({
        "size": RETRIEVED_REPORTS,
        "query": {
            "bool": {
                "should": [
                    text_expansion(elser_model, query),
                    {
                        "multi_match": {
                            "query": query,
                            "fields": fields,
                            "type": "best_fields",
                            "fuzziness": "AUTO"
                        }
                    }
                ]
            }
        }
    })
}

/// Every non-empty source field of each hit as `key: value`, one paragraph per hit.
pub fn report_context(response: &SearchResponse) -> String {
    response
        .hits
        .hits
        .iter()
        .map(|hit| {
            hit.source
                .iter()
                .filter(|(_, value)| is_present(value))
                .map(|(key, value)| match value {
                    Value::String(text) => format!("{key}: {text}"),
                    other => format!("{key}: {other}"),
                })
                .collect::<Vec<_>>()
                .join(". ")
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::{SearchHit, SqlColumn, SqlResponse};
    use crate::llm::tests::ScriptedChat;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ReportIndex {
        sql_rows: Vec<Vec<Value>>,
        sql_queries: Mutex<Vec<String>>,
        search_bodies: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl SearchBackend for ReportIndex {
        async fn search(&self, _: &str, body: &Value) -> Result<SearchResponse, ElasticError> {
            self.search_bodies.lock().expect("lock").push(body.clone());
            let source: Map<String, Value> = serde_json::from_value(json!({
                "patient_name": "Jane Doe",
                "nhi": "ABC1234",
                "haemoglobin": 141.2,
                "address": "",
                "attachment": null
            }))
            .expect("object");
            let mut response = SearchResponse::default();
            response.hits.hits = vec![SearchHit {
                source,
                ..SearchHit::default()
            }];
            Ok(response)
        }

        async fn sql_query(&self, query: &str) -> Result<SqlResponse, ElasticError> {
            self.sql_queries.lock().expect("lock").push(query.to_string());
            let column = |name: &str| SqlColumn {
                name: name.into(),
                kind: "keyword".into(),
            };
            Ok(SqlResponse {
                columns: vec![
                    column("patient_name"),
                    column("nhi"),
                    column("test_date"),
                    column("haemoglobin"),
                ],
                rows: self.sql_rows.clone(),
            })
        }

        async fn infer(&self, _: &str, _: &str, _: Option<Value>) -> Result<Value, ElasticError> {
            Ok(Value::Null)
        }
    }

    fn jane_rows() -> Vec<Vec<Value>> {
        vec![vec![
            json!("Jane Doe"),
            json!("ABC1234"),
            json!("2023-04-01"),
            json!(141.2),
        ]]
    }

    #[tokio::test]
    async fn chart_request_runs_normalised_sql() {
        let backend = ReportIndex {
            sql_rows: jane_rows(),
            ..ReportIndex::default()
        };
        let chat = ScriptedChat::replying(&[
            "1 bar",
            "Patient Name: Jane Doe\nNHI: None\nBlood Parameters: haemoglobin",
            "patient_name, NHI, test_date, HAEMOGLOBIN FROM healthcare WHERE MATCH(patient_name, 'Jane Doe') ORDER BY test_date;",
        ]);

        let reply = BloodTestAssistant::new(&backend, &chat, "healthcare", "m")
            .reply("Show a bar chart of Jane Doe's haemoglobin")
            .await
            .expect("reply");

        assert_eq!(
            reply.content,
            "I've generated a historical bar graph of blood count for the patient. The \
             visualization shows the trends for haemoglobin over time."
        );
        let query = reply.query.as_deref().expect("query");
        assert!(query.starts_with("select patient_name, nhi, test_date, haemoglobin FROM healthcare"));
        assert!(!query.ends_with(';'));
        let chart = reply.chart.expect("chart");
        assert_eq!(chart.kind, ChartKind::Bar);
        assert_eq!(chart.series, ["haemoglobin"]);
        assert_eq!(backend.sql_queries.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn table_request_uses_table_reply() {
        let backend = ReportIndex {
            sql_rows: jane_rows(),
            ..ReportIndex::default()
        };
        let chat = ScriptedChat::replying(&[
            "1 table",
            "Patient Name: None\nNHI: ABC1234\nBlood Parameters: All",
            "SELECT patient_name, nhi, test_date, haemoglobin FROM healthcare WHERE nhi = 'ABC1234'",
        ]);

        let reply = BloodTestAssistant::new(&backend, &chat, "healthcare", "m")
            .reply("Table of results for ABC1234")
            .await
            .expect("reply");

        assert_eq!(reply.content, TABLE_REPLY);
        assert_eq!(reply.chart.map(|chart| chart.kind), Some(ChartKind::Table));
    }

    #[tokio::test]
    async fn missing_patient_asks_to_rephrase_without_sql() {
        let backend = ReportIndex::default();
        let chat = ScriptedChat::replying(&[
            "1 line",
            "Patient Name: None\nNHI: None\nBlood Parameters: All",
        ]);

        let reply = BloodTestAssistant::new(&backend, &chat, "healthcare", "m")
            .reply("Plot the haemoglobin trend")
            .await
            .expect("reply");

        assert_eq!(reply.content, REPHRASE);
        assert!(reply.query.is_none());
        assert!(backend.sql_queries.lock().expect("lock").is_empty());
        assert_eq!(chat.requests.lock().expect("lock").len(), 2);
    }

    #[tokio::test]
    async fn empty_result_reports_no_data_for_identifier() {
        let backend = ReportIndex::default();
        let chat = ScriptedChat::replying(&[
            "1",
            "Patient Name: None\nNHI: XYZ9876\nBlood Parameters: wbc",
            "SELECT wbc FROM healthcare WHERE nhi = 'XYZ9876'",
        ]);

        let reply = BloodTestAssistant::new(&backend, &chat, "healthcare", "m")
            .reply("Graph wbc for XYZ9876")
            .await
            .expect("reply");

        assert_eq!(
            reply.content,
            "I'm sorry, but I couldn't find any blood count data for XYZ9876."
        );
        assert!(reply.chart.is_none());
        assert!(reply.query.is_some());
    }

    #[tokio::test]
    async fn general_question_answers_from_flattened_reports() {
        let backend = ReportIndex::default();
        let chat = ScriptedChat::replying(&["2", "Jane's haemoglobin is normal."]);

        let reply = BloodTestAssistant::new(&backend, &chat, "healthcare", ".elser_model_2")
            .reply("Is Jane's haemoglobin normal?")
            .await
            .expect("reply");

        assert_eq!(reply, ChatReply::text("Jane's haemoglobin is normal."));
        let bodies = backend.search_bodies.lock().expect("lock");
        let should = &bodies[0]["query"]["bool"]["should"];
        assert_eq!(bodies[0]["size"], 5);
        assert!(should[0].get("text_expansion").is_some());
        assert_eq!(should[1]["multi_match"]["fields"][0], "patient_name^2");
        assert_eq!(should[1]["multi_match"]["fields"].as_array().map(Vec::len), Some(15));

        let requests = chat.requests.lock().expect("lock");
        let prompt = &requests[1].user;
        assert!(prompt.starts_with("Context: "));
        assert!(prompt.ends_with("\n\nQuestion: Is Jane's haemoglobin normal?"));
        for pair in ["patient_name: Jane Doe", "nhi: ABC1234", "haemoglobin: 141.2"] {
            assert!(prompt.contains(pair), "missing {pair}");
        }
        assert!(!prompt.contains("address"));
        assert!(!prompt.contains("attachment"));
        assert_eq!(requests[1].max_tokens, 150);
    }

    #[test]
    fn falsy_values_are_skipped() {
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!(false)));
        assert!(!is_present(&json!([])));
        assert!(is_present(&json!(0.5)));
        assert!(is_present(&json!("x")));
    }
}

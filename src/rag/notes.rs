//! Question answering over clinical notes.

use super::RagError;
use crate::{
    elastic::{SearchBackend, SearchResponse},
    llm::{ChatClient, ChatRequest},
    search::text_expansion,
};
use serde_json::{Value, json};

const RETRIEVED_NOTES: u32 = 5;

const SYSTEM: &str = "You are an AI assistant specializing in medical information. Your task is to \
provide concise, accurate summaries or answers based on the given clinical notes. Each note may \
represent a different case. Focus on the medical aspects and avoid mentioning any specific \
patient details.

Guidelines:
1. Summarize key medical information from the notes relevant to the query.
2. If multiple conditions are mentioned, address them separately if relevant.
3. Provide general medical insights based on the information given.
4. Do not invent or assume information not present in the notes.
5. If the query cannot be answered based on the given information, state this clearly.
6. Maintain a professional and empathetic tone.";

/// Answers questions from the most relevant clinical notes without exposing patient details.
pub struct NotesAssistant<'a, B: SearchBackend + ?Sized, C: ChatClient + ?Sized> {
    backend: &'a B,
    chat: &'a C,
    index: &'a str,
    elser_model: &'a str,
}

impl<'a, B: SearchBackend + ?Sized, C: ChatClient + ?Sized> NotesAssistant<'a, B, C> {
    /// Bind the assistant to its clients and the notes index.
    pub fn new(backend: &'a B, chat: &'a C, index: &'a str, elser_model: &'a str) -> Self {
        Self {
            backend,
            chat,
            index,
            elser_model,
        }
    }

    /// Retrieve notes relevant to `query` and summarise them.
    pub async fn answer(&self, query: &str) -> Result<String, RagError> {
        let body = retrieval_body(self.elser_model, query);
        let response = self.backend.search(self.index, &body).await?;
        let context = anonymised_context(&response);
        tracing::debug!(index = self.index, chars = context.len(), "Retrieved note context");
        Ok(self.chat.complete(answer_request(&context, query)).await?)
    }
}

fn retrieval_body(elser_model: &str, query: &str) -> Value {
    json!({
        "size": RETRIEVED_NOTES,
        "query": {
            "bool": {
                "should": [text_expansion(elser_model, query)]
            }
        }
    })
}

/// Condition and note text of each hit, one paragraph per note.
pub fn anonymised_context(response: &SearchResponse) -> String {
    response
        .hits
        .hits
        .iter()
        .map(|hit| {
            let field = |name: &str| {
                hit.source
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or("N/A")
                    .to_string()
            };
            format!(
                "Condition: {}. Clinical note: {}",
                field("condition"),
                field("clinical_note")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_request(context: &str, query: &str) -> ChatRequest {
    let prompt = format!(
        "Clinical Notes:\n{context}\n\n\
         Query: {query}\n\n\
         Please provide a concise and informative response based on the relevant information in \
         these clinical notes. Focus on medical aspects and avoid referencing specific patients."
    );
    ChatRequest::new(SYSTEM, prompt, 250, 0.5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::{ElasticError, SearchHit, SqlResponse};
    use crate::llm::tests::ScriptedChat;
    use async_trait::async_trait;
    use serde_json::Map;
    use std::sync::Mutex;

    struct NotesIndex {
        bodies: Mutex<Vec<Value>>,
    }

    fn hit(source: Value) -> SearchHit {
        let source: Map<String, Value> = serde_json::from_value(source).expect("object");
        SearchHit {
            source,
            ..SearchHit::default()
        }
    }

    #[async_trait]
    impl SearchBackend for NotesIndex {
        async fn search(&self, _: &str, body: &Value) -> Result<SearchResponse, ElasticError> {
            self.bodies.lock().expect("lock").push(body.clone());
            let mut response = SearchResponse::default();
            response.hits.hits = vec![
                hit(json!({
                    "patient_name": "Jane Doe",
                    "condition": "Asthma",
                    "clinical_note": "Wheeze improved with inhaler."
                })),
                hit(json!({ "patient_name": "John Roe" })),
            ];
            Ok(response)
        }

        async fn sql_query(&self, _: &str) -> Result<SqlResponse, ElasticError> {
            Ok(SqlResponse::default())
        }

        async fn infer(&self, _: &str, _: &str, _: Option<Value>) -> Result<Value, ElasticError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn answers_from_anonymised_notes() {
        let backend = NotesIndex {
            bodies: Mutex::new(Vec::new()),
        };
        let chat = ScriptedChat::replying(&["Asthma is well controlled."]);

        let answer = NotesAssistant::new(&backend, &chat, "notes-healthcare", ".elser_model_2")
            .answer("How is asthma managed?")
            .await
            .expect("answer");

        assert_eq!(answer, "Asthma is well controlled.");
        let bodies = backend.bodies.lock().expect("lock");
        assert_eq!(bodies[0]["size"], 5);
        assert_eq!(
            bodies[0]["query"]["bool"]["should"][0]["text_expansion"]["text_embedding"]["model_text"],
            "How is asthma managed?"
        );

        let requests = chat.requests.lock().expect("lock");
        let request = &requests[0];
        assert_eq!(request.max_tokens, 250);
        assert!(request.user.starts_with(
            "Clinical Notes:\nCondition: Asthma. Clinical note: Wheeze improved with inhaler.\n\n\
             Condition: N/A. Clinical note: N/A\n\nQuery: How is asthma managed?"
        ));
        assert!(!request.user.contains("Jane Doe"));
    }

    #[tokio::test]
    async fn chat_failures_propagate() {
        let backend = NotesIndex {
            bodies: Mutex::new(Vec::new()),
        };
        let chat = ScriptedChat::failing("quota exceeded");

        let error = NotesAssistant::new(&backend, &chat, "notes-healthcare", "m")
            .answer("anything")
            .await
            .expect_err("error");

        assert!(matches!(error, RagError::Chat(_)));
    }
}

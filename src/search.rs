//! Clinical-note search: query bodies for each search mode, hit reshaping, sorting, and the
//! selectable date range.

use crate::elastic::{ElasticError, SearchBackend, SearchResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use time::{Date, OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const RESULT_SIZE: u32 = 20;
const MISSING: &str = "N/A";
const HIGHLIGHT_FIELDS: [&str; 4] = ["clinical_note", "condition", "patient_name", "gp_name"];

/// Retrieval strategy selected in the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    /// Phrase, fuzzy, and weighted multi-field lexical matching.
    #[serde(rename = "Text Search")]
    Text,
    /// Reciprocal rank fusion of a lexical and an ELSER retriever.
    #[serde(rename = "RRF Search")]
    Rrf,
    /// ELSER text expansion only.
    #[serde(rename = "ELSER Search")]
    Elser,
    /// Lexical match or ELSER text expansion.
    #[serde(rename = "Hybrid Search")]
    Hybrid,
}

impl SearchMode {
    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            SearchMode::Text => "Text Search",
            SearchMode::Rrf => "RRF Search",
            SearchMode::Elser => "ELSER Search",
            SearchMode::Hybrid => "Hybrid Search",
        }
    }
}

/// Inclusive range of note dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// First day.
    pub start: Date,
    /// Last day.
    pub end: Date,
}

impl DateRange {
    /// Range covering only today (UTC).
    pub fn today() -> Self {
        let today = OffsetDateTime::now_utc().date();
        Self {
            start: today,
            end: today,
        }
    }

    fn filter(&self) -> Value {
        json!({
            "range": {
                "note_date": {
                    "gte": format_date(self.start),
                    "lte": format_date(self.end)
                }
            }
        })
    }
}

fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_else(|_| date.to_string())
}

/// `text_expansion` clause over the `text_embedding` field.
pub fn text_expansion(model_id: &str, text: &str) -> Value {
    json!({
        "text_expansion": {
            "text_embedding": {
                "model_id": model_id,
                "model_text": text
            }
        }
    })
}

fn highlight() -> Value {
    let fields: Map<String, Value> = HIGHLIGHT_FIELDS
        .iter()
        .map(|field| (field.to_string(), json!({})))
        .collect();
    json!({ "fields": fields })
}

/// Build the `_search` body for `mode`.
pub fn build_query(mode: SearchMode, query: &str, elser_model: &str, range: &DateRange) -> Value {
    let range_filter = range.filter();
    match mode {
        SearchMode::Text => json!({
            "size": RESULT_SIZE,
            "query": {
                "bool": {
                    "should": [
                        { "match_phrase": { "clinical_note": { "query": query, "slop": 3 } } },
                        { "match": { "clinical_note": { "query": query, "fuzziness": "AUTO" } } },
                        {
                            "multi_match": {
                                "query": query,
                                "fields": ["clinical_note^3", "condition^2", "patient_name", "gp_name"],
                                "type": "best_fields",
                                "fuzziness": "AUTO"
                            }
                        }
                    ],
                    "must": [range_filter],
                    "minimum_should_match": 1
                }
            },
            "highlight": highlight()
        }),
        SearchMode::Rrf => json!({
            "size": RESULT_SIZE,
            "retriever": {
                "rrf": {
                    "retrievers": [
                        {
                            "standard": {
                                "query": {
                                    "bool": {
                                        "must": [{ "match": { "clinical_note": query } }],
                                        "filter": [range_filter]
                                    }
                                }
                            }
                        },
                        {
                            "standard": {
                                "query": {
                                    "bool": {
                                        "must": [text_expansion(elser_model, query)],
                                        "filter": [range_filter]
                                    }
                                }
                            }
                        }
                    ]
                }
            },
            "highlight": highlight()
        }),
        SearchMode::Elser => json!({
            "query": {
                "bool": {
                    "must": [text_expansion(elser_model, query), range_filter]
                }
            },
            "highlight": highlight()
        }),
        SearchMode::Hybrid => json!({
            "query": {
                "bool": {
                    "must": [
                        {
                            "bool": {
                                "should": [
                                    { "match": { "clinical_note": query } },
                                    text_expansion(elser_model, query)
                                ]
                            }
                        },
                        range_filter
                    ]
                }
            },
            "highlight": highlight()
        }),
    }
}

/// One search hit reshaped for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRow {
    /// Patient name.
    #[serde(rename = "Patient name")]
    pub patient_name: String,
    /// National Health Index identifier.
    #[serde(rename = "NHI")]
    pub nhi: String,
    /// Date of birth.
    #[serde(rename = "Date of Birth")]
    pub date_of_birth: String,
    /// General practitioner.
    #[serde(rename = "GP")]
    pub gp: String,
    /// Condition.
    #[serde(rename = "Condition")]
    pub condition: String,
    /// Visit date.
    #[serde(rename = "Note Date")]
    pub note_date: String,
    /// Note text.
    #[serde(rename = "Clinical Notes")]
    pub clinical_notes: String,
    /// Highlighted fragments across all highlighted fields, when any.
    #[serde(rename = "Highlights", skip_serializing_if = "Option::is_none", default)]
    pub highlights: Option<Vec<String>>,
}

/// Reshape hits into display rows, substituting `N/A` for missing fields.
pub fn process_results(response: &SearchResponse) -> Vec<SearchRow> {
    response
        .hits
        .hits
        .iter()
        .map(|hit| {
            let field = |name: &str| display_value(hit.source.get(name));
            SearchRow {
                patient_name: field("patient_name"),
                nhi: field("nhi"),
                date_of_birth: field("dob"),
                gp: field("gp_name"),
                condition: field("condition"),
                note_date: field("note_date"),
                clinical_notes: field("clinical_note"),
                highlights: hit
                    .highlight
                    .as_ref()
                    .map(|fields| fields.values().flatten().cloned().collect()),
            }
        })
        .collect()
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => MISSING.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Column rows can be sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortField {
    /// Patient name.
    #[serde(rename = "Patient name")]
    PatientName,
    /// Visit date.
    #[serde(rename = "Note Date")]
    NoteDate,
    /// NHI.
    #[serde(rename = "NHI")]
    Nhi,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Smallest first.
    #[default]
    Ascending,
    /// Largest first.
    Descending,
}

/// Sort rows in place; the sort is stable.
pub fn sort_rows(rows: &mut [SearchRow], field: SortField, order: SortOrder) {
    let key = |row: &SearchRow| -> String {
        match field {
            SortField::PatientName => row.patient_name.clone(),
            SortField::NoteDate => row.note_date.clone(),
            SortField::Nhi => row.nhi.clone(),
        }
    };
    rows.sort_by(|a, b| {
        let ordering: Ordering = key(a).cmp(&key(b));
        match order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    });
}

/// Run a search and reshape its hits.
pub async fn run_search<B: SearchBackend + ?Sized>(
    backend: &B,
    index: &str,
    elser_model: &str,
    mode: SearchMode,
    query: &str,
    range: &DateRange,
) -> Result<Vec<SearchRow>, ElasticError> {
    let body = build_query(mode, query, elser_model, range);
    let response = backend.search(index, &body).await?;
    let rows = process_results(&response);
    tracing::debug!(mode = mode.label(), index, hits = rows.len(), "Search completed");
    Ok(rows)
}

/// Aggregation-only body requesting the min and max `note_date`.
pub fn date_range_body() -> Value {
    json!({
        "size": 0,
        "aggs": {
            "min_date": { "min": { "field": "note_date" } },
            "max_date": { "max": { "field": "note_date" } }
        }
    })
}

/// Extract the note date bounds from a [`date_range_body`] response.
pub fn parse_date_range(response: &SearchResponse) -> Option<DateRange> {
    let aggregations = response.aggregations.as_ref()?;
    let bound = |name: &str| -> Option<Date> {
        let text = aggregations.get(name)?.get("value_as_string")?.as_str()?;
        let day = text.split('T').next()?;
        Date::parse(day, DATE_FORMAT).ok()
    };
    Some(DateRange {
        start: bound("min_date")?,
        end: bound("max_date")?,
    })
}

/// Fetch the selectable date range of `index`, falling back to today on any error.
pub async fn fetch_date_range<B: SearchBackend + ?Sized>(backend: &B, index: &str) -> DateRange {
    match backend.search(index, &date_range_body()).await {
        Ok(response) => parse_date_range(&response).unwrap_or_else(|| {
            tracing::warn!(index, "Date range aggregations missing, using today");
            DateRange::today()
        }),
        Err(err) => {
            tracing::warn!(index, error = %err, "Error getting date range");
            DateRange::today()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elastic::{SearchHit, SqlResponse};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use time::macros::date;

    fn range() -> DateRange {
        DateRange {
            start: date!(2024 - 01 - 01),
            end: date!(2024 - 06 - 30),
        }
    }

    struct RecordingSearch {
        response: Option<SearchResponse>,
        bodies: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl SearchBackend for RecordingSearch {
        async fn search(&self, _index: &str, body: &Value) -> Result<SearchResponse, ElasticError> {
            self.bodies.lock().expect("lock").push(body.clone());
            self.response
                .clone()
                .ok_or_else(|| ElasticError::MalformedResponse("no response".into()))
        }

        async fn sql_query(&self, _query: &str) -> Result<SqlResponse, ElasticError> {
            Ok(SqlResponse::default())
        }

        async fn infer(&self, _: &str, _: &str, _: Option<Value>) -> Result<Value, ElasticError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn text_query_combines_should_clauses_with_date_filter() {
        let body = build_query(SearchMode::Text, "asthma", ".elser_model_2", &range());

        assert_eq!(body["size"], 20);
        assert_eq!(body["query"]["bool"]["minimum_should_match"], 1);
        assert_eq!(body["query"]["bool"]["should"].as_array().map(Vec::len), Some(3));
        assert_eq!(
            body["query"]["bool"]["must"][0]["range"]["note_date"],
            json!({ "gte": "2024-01-01", "lte": "2024-06-30" })
        );
        assert!(body["highlight"]["fields"].get("gp_name").is_some());
    }

    #[test]
    fn rrf_query_fuses_two_filtered_retrievers() {
        let body = build_query(SearchMode::Rrf, "asthma", ".elser_model_2", &range());
        let retrievers = body["retriever"]["rrf"]["retrievers"]
            .as_array()
            .expect("retrievers");

        assert_eq!(retrievers.len(), 2);
        let semantic = &retrievers[1]["standard"]["query"]["bool"];
        assert_eq!(
            semantic["must"][0]["text_expansion"]["text_embedding"]["model_id"],
            ".elser_model_2"
        );
        assert!(semantic["filter"][0].get("range").is_some());
    }

    #[test]
    fn elser_and_hybrid_queries_use_text_expansion() {
        let elser = build_query(SearchMode::Elser, "cough", "m", &range());
        assert!(elser["query"]["bool"]["must"][0].get("text_expansion").is_some());

        let hybrid = build_query(SearchMode::Hybrid, "cough", "m", &range());
        let should = &hybrid["query"]["bool"]["must"][0]["bool"]["should"];
        assert_eq!(should[0]["match"]["clinical_note"], "cough");
        assert!(should[1].get("text_expansion").is_some());
    }

    #[test]
    fn hits_become_rows_with_defaults_and_highlights() {
        let mut source = Map::new();
        source.insert("patient_name".into(), json!("Tama Rangi"));
        source.insert("age".into(), json!(40));
        source.insert("gp_name".into(), json!("Dr. Lee"));
        let mut highlight = BTreeMap::new();
        highlight.insert("clinical_note".into(), vec!["<em>wheeze</em>".to_string()]);
        highlight.insert("condition".into(), vec!["<em>Asthma</em>".to_string()]);
        let response = SearchResponse {
            hits: crate::elastic::types::SearchHits {
                hits: vec![SearchHit {
                    id: "1".into(),
                    score: Some(1.0),
                    source,
                    highlight: Some(highlight),
                }],
            },
            aggregations: None,
        };

        let rows = process_results(&response);

        assert_eq!(rows[0].patient_name, "Tama Rangi");
        assert_eq!(rows[0].gp, "Dr. Lee");
        assert_eq!(rows[0].nhi, "N/A");
        assert_eq!(
            rows[0].highlights.as_deref(),
            Some(&["<em>wheeze</em>".to_string(), "<em>Asthma</em>".to_string()][..])
        );
        let json = serde_json::to_value(&rows[0]).expect("json");
        assert_eq!(json["Patient name"], "Tama Rangi");
        assert_eq!(json["Clinical Notes"], "N/A");
    }

    #[test]
    fn rows_sort_by_field_and_direction() {
        let row = |name: &str, date: &str| SearchRow {
            patient_name: name.into(),
            nhi: MISSING.into(),
            date_of_birth: MISSING.into(),
            gp: MISSING.into(),
            condition: MISSING.into(),
            note_date: date.into(),
            clinical_notes: MISSING.into(),
            highlights: None,
        };
        let mut rows = vec![row("B", "2024-02-01"), row("A", "2024-03-01"), row("C", "2024-01-01")];

        sort_rows(&mut rows, SortField::NoteDate, SortOrder::Descending);
        let names: Vec<&str> = rows.iter().map(|r| r.patient_name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);

        sort_rows(&mut rows, SortField::PatientName, SortOrder::Ascending);
        assert_eq!(rows[0].patient_name, "A");
    }

    #[tokio::test]
    async fn date_range_reads_aggregations_and_falls_back_to_today() {
        let mut aggregations = Map::new();
        aggregations.insert(
            "min_date".into(),
            json!({ "value": 1.0, "value_as_string": "2023-02-11T00:00:00.000Z" }),
        );
        aggregations.insert(
            "max_date".into(),
            json!({ "value": 2.0, "value_as_string": "2024-05-09" }),
        );
        let backend = RecordingSearch {
            response: Some(SearchResponse {
                aggregations: Some(aggregations),
                ..SearchResponse::default()
            }),
            bodies: Mutex::new(Vec::new()),
        };

        let range = fetch_date_range(&backend, "notes-healthcare").await;
        assert_eq!(range.start, date!(2023 - 02 - 11));
        assert_eq!(range.end, date!(2024 - 05 - 09));
        assert_eq!(backend.bodies.lock().expect("lock")[0]["size"], 0);

        let failing = RecordingSearch {
            response: None,
            bodies: Mutex::new(Vec::new()),
        };
        assert_eq!(fetch_date_range(&failing, "x").await, DateRange::today());
    }

    #[test]
    fn date_range_serializes_as_iso_days() {
        let json = serde_json::to_value(range()).expect("json");
        assert_eq!(json, json!({ "start": "2024-01-01", "end": "2024-06-30" }));
    }
}

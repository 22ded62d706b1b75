//! HTTP surface for the InsightMed dashboard.
//!
//! The router exposes the dashboard operations as JSON endpoints:
//!
//! - `POST /analyze` – Run named entity recognition, sentiment, or zero-shot classification.
//! - `POST /search` – Search a category with one of the four search modes inside a date range.
//! - `GET /date-range` – Selectable note-date range of a category, cached per session.
//! - `POST /sessions/:id/date-range/reset` – Forget a session's cached date range.
//! - `POST /chat` – Ask the blood-test or clinical-notes assistant a question.
//! - `GET /sessions/:id/messages` – Chat history of a session.
//! - `GET /categories` – Use-case groups, their categories, and backing indices.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::{
    analysis::AnalysisKind,
    dashboard::{
        Category, ChatTurn, DashboardApi, DashboardError, SearchOutcome, SearchParams,
        SessionDateRange, UseCaseView,
    },
    llm::ChatMessage,
};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Build the HTTP router exposing the dashboard API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: DashboardApi + 'static,
{
    Router::new()
        .route("/analyze", post(analyze::<S>))
        .route("/search", post(search::<S>))
        .route("/date-range", get(date_range::<S>))
        .route(
            "/sessions/:id/date-range/reset",
            post(reset_date_range::<S>),
        )
        .route("/chat", post(chat::<S>))
        .route("/sessions/:id/messages", get(messages::<S>))
        .route("/categories", get(categories::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for `POST /analyze`.
#[derive(Deserialize)]
struct AnalyzeRequest {
    /// Menu label of the analysis.
    analysis: AnalysisKind,
    /// Text to analyse.
    text: String,
}

/// Response body for `POST /analyze`.
#[derive(Serialize)]
struct AnalyzeResponse {
    result: String,
}

async fn analyze<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<AnalyzeRequest>,
) -> Json<AnalyzeResponse>
where
    S: DashboardApi,
{
    let result = service.analyze(request.analysis, &request.text).await;
    Json(AnalyzeResponse { result })
}

async fn search<S>(
    State(service): State<Arc<S>>,
    Json(params): Json<SearchParams>,
) -> Json<SearchOutcome>
where
    S: DashboardApi,
{
    let outcome = service.search(params).await;
    tracing::info!(
        session = ?outcome.session_id,
        mode = outcome.mode,
        rows = outcome.rows.len(),
        failed = outcome.error.is_some(),
        "Search request completed"
    );
    Json(outcome)
}

/// Query string for `GET /date-range`.
#[derive(Deserialize)]
struct DateRangeQuery {
    #[serde(default)]
    session_id: Option<Uuid>,
    category: Category,
}

async fn date_range<S>(
    State(service): State<Arc<S>>,
    Query(query): Query<DateRangeQuery>,
) -> Json<SessionDateRange>
where
    S: DashboardApi,
{
    Json(service.date_range(query.session_id, query.category).await)
}

async fn reset_date_range<S>(
    State(service): State<Arc<S>>,
    Path(session): Path<Uuid>,
) -> Result<StatusCode, AppError>
where
    S: DashboardApi,
{
    service.reset_date_range(session).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Request body for `POST /chat`.
#[derive(Deserialize)]
struct ChatRequestBody {
    #[serde(default)]
    session_id: Option<Uuid>,
    category: Category,
    message: String,
}

async fn chat<S>(State(service): State<Arc<S>>, Json(body): Json<ChatRequestBody>) -> Json<ChatTurn>
where
    S: DashboardApi,
{
    let turn = service
        .chat(body.session_id, body.category, &body.message)
        .await;
    tracing::info!(
        session = %turn.session_id,
        category = body.category.label(),
        has_query = turn.reply.query.is_some(),
        has_chart = turn.reply.chart.is_some(),
        "Chat request completed"
    );
    Json(turn)
}

/// Response body for `GET /sessions/:id/messages`.
#[derive(Serialize)]
struct MessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn messages<S>(
    State(service): State<Arc<S>>,
    Path(session): Path<Uuid>,
) -> Result<Json<MessagesResponse>, AppError>
where
    S: DashboardApi,
{
    let messages = service.messages(session).await?;
    Ok(Json(MessagesResponse { messages }))
}

/// Response body for `GET /categories`.
#[derive(Serialize)]
struct CategoriesResponse {
    use_cases: Vec<UseCaseView>,
}

async fn categories<S>(State(service): State<Arc<S>>) -> Json<CategoriesResponse>
where
    S: DashboardApi,
{
    Json(CategoriesResponse {
        use_cases: service.categories(),
    })
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "analyze",
                method: "POST",
                path: "/analyze",
                description: "Run a text analysis with a deployed model and return display text.",
                request_example: Some(json!({
                    "analysis": "Sentiment Analysis",
                    "text": "The patient is recovering well."
                })),
            },
            CommandDescriptor {
                name: "search",
                method: "POST",
                path: "/search",
                description: "Search a category's clinical notes with Text, RRF, ELSER, or Hybrid search inside a note-date range.",
                request_example: Some(json!({
                    "category": "GP",
                    "mode": "Hybrid Search",
                    "query": "persistent cough",
                    "start": "2023-01-01",
                    "end": "2023-12-31",
                    "sort_field": "Note Date",
                    "sort_order": "Descending"
                })),
            },
            CommandDescriptor {
                name: "date_range",
                method: "GET",
                path: "/date-range?category=GP",
                description: "Return the selectable note-date range of a category, cached per session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "reset_date_range",
                method: "POST",
                path: "/sessions/:id/date-range/reset",
                description: "Forget the session's cached date range so the next request refetches it.",
                request_example: None,
            },
            CommandDescriptor {
                name: "chat",
                method: "POST",
                path: "/chat",
                description: "Ask the Blood Tests or GP assistant a question. Chart requests return the executed SQL and a chart description.",
                request_example: Some(json!({
                    "category": "Blood Tests",
                    "message": "Show a line graph of haemoglobin for Jane Doe"
                })),
            },
            CommandDescriptor {
                name: "messages",
                method: "GET",
                path: "/sessions/:id/messages",
                description: "Return the chat history of a session.",
                request_example: None,
            },
            CommandDescriptor {
                name: "categories",
                method: "GET",
                path: "/categories",
                description: "List use-case groups with their categories, backing indices, and chat availability.",
                request_example: None,
            },
        ],
    })
}

struct AppError(DashboardError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            DashboardError::UnknownSession(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<DashboardError> for AppError {
    fn from(inner: DashboardError) -> Self {
        Self(inner)
    }
}

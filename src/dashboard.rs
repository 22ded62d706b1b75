//! Dashboard backend: categories, per-session state, and the operations behind the HTTP routes.
//!
//! The service owns the Elasticsearch and chat clients for the lifetime of the process and is
//! shared with the router through an `Arc`. Session state (chat history and the cached date
//! range) lives in an in-memory store guarded by an async mutex. Sessions idle for longer than
//! `SESSION_TTL_SECONDS` are dropped, and the least recently used one is evicted once
//! `MAX_SESSIONS` are live. Only the server issues session ids.

use crate::{
    analysis::{AnalysisKind, TextAnalyzer},
    config::Config,
    elastic::{ElasticError, ElasticService, SearchBackend},
    llm::{ChatClient, ChatClientError, ChatMessage, OpenAiChatClient},
    rag::{BloodTestAssistant, ChatReply, NotesAssistant},
    search::{self, DateRange, SearchMode, SearchRow, SortField, SortOrder},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use time::Date;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

/// Errors surfaced by the dashboard service.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Elasticsearch client could not be created.
    #[error("Elasticsearch client unavailable: {0}")]
    Elastic(#[from] ElasticError),
    /// Chat client could not be created.
    #[error("Chat client unavailable: {0}")]
    Chat(#[from] ChatClientError),
    /// No session exists with the given id.
    #[error("Unknown session: {0}")]
    UnknownSession(Uuid),
}

/// Data category selectable in the dashboard menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Uploaded blood reports.
    #[serde(rename = "Blood Tests")]
    BloodTests,
    /// Clinical notes written by general practitioners.
    #[serde(rename = "GP")]
    Gp,
    /// Radiology reports.
    #[serde(rename = "Radiology")]
    Radiology,
    /// Drug trial records.
    #[serde(rename = "Drug Trials")]
    DrugTrials,
    /// Disease study records.
    #[serde(rename = "Disease Studies")]
    DiseaseStudies,
    /// Patient administration records.
    #[serde(rename = "Patient Records")]
    PatientRecords,
    /// Billing records.
    #[serde(rename = "Billing")]
    Billing,
}

impl Category {
    /// Menu label.
    pub fn label(self) -> &'static str {
        match self {
            Category::BloodTests => "Blood Tests",
            Category::Gp => "GP",
            Category::Radiology => "Radiology",
            Category::DrugTrials => "Drug Trials",
            Category::DiseaseStudies => "Disease Studies",
            Category::PatientRecords => "Patient Records",
            Category::Billing => "Billing",
        }
    }

    /// Index backing the category.
    pub fn index_name(self, config: &Config) -> String {
        let base = &config.index_name;
        match self {
            Category::BloodTests => base.clone(),
            Category::Gp => config.notes_index_name(),
            Category::Radiology => format!("{base}-radiology"),
            Category::DrugTrials => format!("{base}-drugtrials"),
            Category::DiseaseStudies => format!("{base}-diseasestudies"),
            Category::PatientRecords => format!("{base}-patientrecords"),
            Category::Billing => format!("{base}-billing"),
        }
    }

    /// Whether the chat assistant can answer questions about this category.
    pub fn supports_chat(self) -> bool {
        matches!(self, Category::BloodTests | Category::Gp)
    }
}

/// Use-case groups shown in the menu, each with its categories.
pub const USE_CASES: [(&str, &[Category]); 3] = [
    (
        "Clinical Data",
        &[Category::BloodTests, Category::Gp, Category::Radiology],
    ),
    (
        "Medical Research",
        &[Category::DrugTrials, Category::DiseaseStudies],
    ),
    (
        "Healthcare Administration",
        &[Category::PatientRecords, Category::Billing],
    ),
];

/// Category as listed by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryView {
    /// Category.
    pub category: Category,
    /// Backing index.
    pub index: String,
    /// Whether chat is available.
    pub chat: bool,
}

/// Use-case group as listed by the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UseCaseView {
    /// Group name.
    pub name: &'static str,
    /// Categories in menu order.
    pub categories: Vec<CategoryView>,
}

/// Parameters of a search issued from the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchParams {
    /// Session whose cached date range bounds the search; sessionless searches fetch the range
    /// without caching it.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Category to search.
    pub category: Category,
    /// Retrieval strategy.
    pub mode: SearchMode,
    /// Free-text query.
    pub query: String,
    /// First note date; defaults to the start of the session's range.
    #[serde(default)]
    pub start: Option<Date>,
    /// Last note date; defaults to the end of the session's range.
    #[serde(default)]
    pub end: Option<Date>,
    /// Column to sort by; hits keep their ranking order when absent.
    #[serde(default)]
    pub sort_field: Option<SortField>,
    /// Sort direction.
    #[serde(default)]
    pub sort_order: SortOrder,
}

/// Rows returned for a search, or the error text shown instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchOutcome {
    /// Session used for the search, when one was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    /// Mode label, used as the results heading.
    pub mode: &'static str,
    /// Reshaped hits.
    pub rows: Vec<SearchRow>,
    /// Error text when the search failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Date range cached for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionDateRange {
    /// Session holding the range.
    pub session_id: Uuid,
    /// Selectable range.
    pub range: DateRange,
}

/// Assistant reply together with the session it was recorded in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    /// Session holding the conversation.
    pub session_id: Uuid,
    /// Assistant reply.
    pub reply: ChatReply,
}

#[derive(Debug)]
struct Session {
    messages: Vec<ChatMessage>,
    date_range: Option<DateRange>,
    last_seen: Instant,
}

impl Session {
    fn new(now: Instant) -> Self {
        Self {
            messages: Vec::new(),
            date_range: None,
            last_seen: now,
        }
    }
}

/// Live sessions with idle expiry and a size cap.
#[derive(Debug)]
struct SessionStore {
    sessions: HashMap<Uuid, Session>,
    ttl: Duration,
    capacity: usize,
}

impl SessionStore {
    fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    fn sweep(&mut self, now: Instant) {
        let ttl = self.ttl;
        let before = self.sessions.len();
        self.sessions
            .retain(|_, state| now.duration_since(state.last_seen) < ttl);
        let expired = before - self.sessions.len();
        if expired > 0 {
            tracing::debug!(expired, "Dropped idle dashboard sessions");
        }
    }

    /// Refresh a live session, or open a new one under a fresh id when `requested` is absent
    /// or no longer live.
    fn open(&mut self, requested: Option<Uuid>) -> Uuid {
        let now = Instant::now();
        self.sweep(now);
        if let Some(id) = requested
            && let Some(state) = self.sessions.get_mut(&id)
        {
            state.last_seen = now;
            return id;
        }

        if self.sessions.len() >= self.capacity
            && let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, state)| state.last_seen)
                .map(|(id, _)| *id)
        {
            self.sessions.remove(&oldest);
            tracing::debug!(session = %oldest, "Evicted least recently used dashboard session");
        }

        let id = Uuid::new_v4();
        match requested {
            Some(stale) => {
                tracing::debug!(requested = %stale, session = %id, "Replaced unknown dashboard session");
            }
            None => tracing::debug!(session = %id, "Opened dashboard session"),
        }
        self.sessions.insert(id, Session::new(now));
        id
    }

    /// Live session by id; touching it refreshes its idle timer.
    fn get_mut(&mut self, id: Uuid) -> Option<&mut Session> {
        let now = Instant::now();
        self.sweep(now);
        let state = self.sessions.get_mut(&id)?;
        state.last_seen = now;
        Some(state)
    }
}

/// Operations exposed over HTTP.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// Run a text analysis, returning display text.
    async fn analyze(&self, kind: AnalysisKind, text: &str) -> String;

    /// Search a category within a date range.
    async fn search(&self, params: SearchParams) -> SearchOutcome;

    /// Selectable date range of a category, cached per session.
    async fn date_range(&self, session: Option<Uuid>, category: Category) -> SessionDateRange;

    /// Drop a session's cached date range so the next request refetches it.
    async fn reset_date_range(&self, session: Uuid) -> Result<(), DashboardError>;

    /// Answer a chat message and record both sides in the session history.
    async fn chat(&self, session: Option<Uuid>, category: Category, message: &str) -> ChatTurn;

    /// Conversation history of a session.
    async fn messages(&self, session: Uuid) -> Result<Vec<ChatMessage>, DashboardError>;

    /// Menu of use-case groups and their categories.
    fn categories(&self) -> Vec<UseCaseView>;
}

/// Dashboard service backed by Elasticsearch and a chat-completion API.
pub struct DashboardService<B = ElasticService, C = OpenAiChatClient> {
    backend: B,
    chat: C,
    config: Config,
    sessions: Mutex<SessionStore>,
}

impl DashboardService {
    /// Build the service and its clients from the loaded configuration.
    pub fn connect(config: &Config) -> Result<Self, DashboardError> {
        let backend = ElasticService::new(config)?;
        let chat = OpenAiChatClient::new(config)?;
        Ok(Self::with_clients(backend, chat, config.clone()))
    }
}

impl<B: SearchBackend, C: ChatClient> DashboardService<B, C> {
    /// Build the service around existing clients.
    pub fn with_clients(backend: B, chat: C, config: Config) -> Self {
        let sessions = SessionStore::new(
            Duration::from_secs(config.session_ttl_seconds),
            config.max_sessions,
        );
        Self {
            backend,
            chat,
            config,
            sessions: Mutex::new(sessions),
        }
    }

    async fn open_session(&self, session: Option<Uuid>) -> Uuid {
        self.sessions.lock().await.open(session)
    }

    async fn cached_range(&self, session: Option<Uuid>, category: Category) -> DateRange {
        if let Some(id) = session
            && let Some(range) = self
                .sessions
                .lock()
                .await
                .get_mut(id)
                .and_then(|state| state.date_range)
        {
            return range;
        }
        let index = category.index_name(&self.config);
        let range = search::fetch_date_range(&self.backend, &index).await;
        if let Some(id) = session
            && let Some(state) = self.sessions.lock().await.get_mut(id)
        {
            state.date_range = Some(range);
        }
        range
    }

    async fn answer(&self, category: Category, message: &str) -> ChatReply {
        let index = category.index_name(&self.config);
        let elser_model = self.config.elser_model.as_str();
        let result = match category {
            Category::BloodTests => {
                BloodTestAssistant::new(&self.backend, &self.chat, &index, elser_model)
                    .reply(message)
                    .await
            }
            Category::Gp => NotesAssistant::new(&self.backend, &self.chat, &index, elser_model)
                .answer(message)
                .await
                .map(ChatReply::text),
            other => {
                tracing::warn!(
                    category = other.label(),
                    index = %index,
                    "Chat requested for unsupported category"
                );
                return ChatReply::text(format!("Invalid INDEX_NAME: {index}"));
            }
        };
        result.unwrap_or_else(|err| {
            tracing::error!(category = category.label(), error = %err, "Chat request failed");
            ChatReply::text(format!("Error generating a response: {err}"))
        })
    }
}

#[async_trait]
impl<B: SearchBackend, C: ChatClient> DashboardApi for DashboardService<B, C> {
    async fn analyze(&self, kind: AnalysisKind, text: &str) -> String {
        TextAnalyzer::new(&self.backend, &self.config)
            .analyze(kind, text)
            .await
    }

    async fn search(&self, params: SearchParams) -> SearchOutcome {
        let session_id = match params.session_id {
            Some(requested) => Some(self.open_session(Some(requested)).await),
            None => None,
        };
        let cached = self.cached_range(session_id, params.category).await;
        let range = DateRange {
            start: params.start.unwrap_or(cached.start),
            end: params.end.unwrap_or(cached.end),
        };
        let index = params.category.index_name(&self.config);
        let result = search::run_search(
            &self.backend,
            &index,
            &self.config.elser_model,
            params.mode,
            &params.query,
            &range,
        )
        .await;

        let (rows, error) = match result {
            Ok(mut rows) => {
                if let Some(field) = params.sort_field {
                    search::sort_rows(&mut rows, field, params.sort_order);
                }
                (rows, None)
            }
            Err(err) => {
                tracing::error!(mode = params.mode.label(), index = %index, error = %err, "Search failed");
                (
                    Vec::new(),
                    Some(format!("Error performing {}: {err}", params.mode.label())),
                )
            }
        };
        SearchOutcome {
            session_id,
            mode: params.mode.label(),
            rows,
            error,
        }
    }

    async fn date_range(&self, session: Option<Uuid>, category: Category) -> SessionDateRange {
        let session_id = self.open_session(session).await;
        let range = self.cached_range(Some(session_id), category).await;
        SessionDateRange { session_id, range }
    }

    async fn reset_date_range(&self, session: Uuid) -> Result<(), DashboardError> {
        let mut sessions = self.sessions.lock().await;
        let state = sessions
            .get_mut(session)
            .ok_or(DashboardError::UnknownSession(session))?;
        state.date_range = None;
        Ok(())
    }

    async fn chat(&self, session: Option<Uuid>, category: Category, message: &str) -> ChatTurn {
        let session_id = self.open_session(session).await;
        let reply = self.answer(category, message).await;
        match self.sessions.lock().await.get_mut(session_id) {
            Some(state) => {
                state.messages.push(ChatMessage::user(message));
                state
                    .messages
                    .push(ChatMessage::assistant(reply.content.clone()));
            }
            None => tracing::warn!(session = %session_id, "Session expired before the reply was recorded"),
        }
        ChatTurn { session_id, reply }
    }

    async fn messages(&self, session: Uuid) -> Result<Vec<ChatMessage>, DashboardError> {
        self.sessions
            .lock()
            .await
            .get_mut(session)
            .map(|state| state.messages.clone())
            .ok_or(DashboardError::UnknownSession(session))
    }

    fn categories(&self) -> Vec<UseCaseView> {
        USE_CASES
            .iter()
            .map(|&(name, categories)| UseCaseView {
                name,
                categories: categories
                    .iter()
                    .map(|&category| CategoryView {
                        category,
                        index: category.index_name(&self.config),
                        chat: category.supports_chat(),
                    })
                    .collect(),
            })
            .collect()
    }
}

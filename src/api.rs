use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    app_state::{AppState, Status},
    conversation::{self, ChatMessage, Conversation},
    error::DocError,
    highlight::extract_fragments,
    location::Location,
    models::{Answer, CitationRecord, HighlightText},
    navigator::{NavigatorSnapshot, ViewUpdate},
    preferences::Preferences,
    preview::{self, PreviewView},
    qa_client::{AnswerSource, QaClient},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl std::fmt::Display) -> ApiError {
    (status, Json(json!({ "error": message.to_string() })))
}

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct OpenFolderPayload {
    prefix: String,
}

#[derive(Deserialize)]
pub struct AskPayload {
    question: String,
}

#[derive(Deserialize)]
pub struct OpenPreviewPayload {
    source_index: Option<usize>,
    document_key: Option<String>,
    page: Option<u32>,
    highlight: Option<HighlightText>,
}

#[derive(Deserialize)]
pub struct MarkSpansPayload {
    session: Uuid,
    spans: Vec<String>,
}

#[derive(Serialize)]
pub struct MarkSpansResponse {
    highlighted: Vec<bool>,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    key: String,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    key: String,
    summary: Option<String>,
    notice: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/navigator", get(navigator_handler))
        .route("/api/navigator/open", post(open_folder_handler))
        .route("/api/navigator/up", post(go_up_handler))
        .route("/api/navigator/refresh", post(refresh_handler))
        .route("/api/navigator/home", post(home_handler))
        .route("/api/navigator/view", post(view_handler))
        .route("/api/known-prefixes", get(known_prefixes_handler))
        .route(
            "/api/preferences",
            get(get_preferences_handler).post(save_preferences_handler),
        )
        .route("/api/ask", post(ask_handler))
        .route("/api/conversation", get(conversation_handler))
        .route("/api/preview/open", post(open_preview_handler))
        .route("/api/preview/spans", post(mark_spans_handler))
        .route("/api/preview/close", post(close_preview_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/status", get(status_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers del navegador ---

fn snapshot(state: &AppState) -> Json<NavigatorSnapshot> {
    Json(state.navigator.snapshot())
}

#[axum::debug_handler]
async fn navigator_handler(State(state): State<AppState>) -> Json<NavigatorSnapshot> {
    snapshot(&state)
}

#[axum::debug_handler]
async fn open_folder_handler(
    State(state): State<AppState>,
    Json(payload): Json<OpenFolderPayload>,
) -> Json<NavigatorSnapshot> {
    let target = Location::new(&payload.prefix);
    state.set_status(true, format!("Listando {target}..."));
    state.navigator.navigate_to(target).await;
    state.set_status(false, "Listo.");
    snapshot(&state)
}

#[axum::debug_handler]
async fn go_up_handler(State(state): State<AppState>) -> Json<NavigatorSnapshot> {
    state.navigator.go_up().await;
    snapshot(&state)
}

#[axum::debug_handler]
async fn refresh_handler(State(state): State<AppState>) -> Json<NavigatorSnapshot> {
    state.navigator.refresh().await;
    snapshot(&state)
}

#[axum::debug_handler]
async fn home_handler(State(state): State<AppState>) -> Json<NavigatorSnapshot> {
    state.navigator.go_to_default().await;
    snapshot(&state)
}

#[axum::debug_handler]
async fn view_handler(
    State(state): State<AppState>,
    Json(payload): Json<ViewUpdate>,
) -> Json<NavigatorSnapshot> {
    state.navigator.update_view(payload);
    snapshot(&state)
}

#[axum::debug_handler]
async fn known_prefixes_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.navigator.memory().fallback())
}

// --- Preferencias ---

#[axum::debug_handler]
async fn get_preferences_handler(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.preferences.load_or_default())
}

#[axum::debug_handler]
async fn save_preferences_handler(
    State(state): State<AppState>,
    Json(payload): Json<Preferences>,
) -> Result<Json<Preferences>, ApiError> {
    // Los prefijos conocidos los gestiona la memoria, no el formulario.
    let saved = state
        .preferences
        .update(|prefs| {
            let known = std::mem::take(&mut prefs.known_prefixes);
            *prefs = Preferences {
                known_prefixes: known,
                ..payload
            };
        })
        .map_err(|e| {
            error!("Error guardando preferencias: {e:#}");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, "No se pudieron guardar las preferencias.")
        })?;

    state.navigator.apply_preferences(&saved);
    Ok(Json(saved))
}

// --- Conversación ---

/// Informa de los estados intermedios del stream en `/api/status`.
struct StatusReportingSource<'a> {
    qa: &'a QaClient,
    status: &'a Mutex<Status>,
}

#[async_trait]
impl<'a> AnswerSource for StatusReportingSource<'a> {
    async fn ask(&self, question: &str, session_id: &str) -> Result<Answer, DocError> {
        self.qa
            .ask_with_progress(question, session_id, |message| {
                let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
                status.message = message.to_string();
            })
            .await
    }
}

#[axum::debug_handler]
async fn ask_handler(
    State(state): State<AppState>,
    Json(payload): Json<AskPayload>,
) -> Result<Json<ChatMessage>, ApiError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "La pregunta está vacía."));
    }

    state.set_status(true, "Consultando...");
    let source = StatusReportingSource {
        qa: &state.qa,
        status: &state.status,
    };
    let message = conversation::ask(&state.conversation, &source, &state.preview, question).await;
    state.set_status(false, "Listo.");
    Ok(Json(message))
}

#[axum::debug_handler]
async fn conversation_handler(State(state): State<AppState>) -> Json<Conversation> {
    Json(
        state
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    )
}

// --- Vista previa ---

#[axum::debug_handler]
async fn open_preview_handler(
    State(state): State<AppState>,
    Json(payload): Json<OpenPreviewPayload>,
) -> Result<Json<PreviewView>, ApiError> {
    let record = match payload.source_index {
        Some(index) => state
            .conversation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .source(index)
            .cloned()
            .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "La fuente indicada no existe."))?,
        None => CitationRecord {
            document_key: payload.document_key,
            page: payload.page,
            highlight: payload.highlight.unwrap_or_default(),
            source: None,
        },
    };

    let key = record.resolved_key().ok_or_else(|| {
        api_error(StatusCode::BAD_REQUEST, "No se pudo determinar el documento a abrir.")
    })?;

    let view = preview::open_document(
        &state.preview,
        &state.http,
        &state.qa,
        state.config.object_store_public_url.as_str(),
        key,
        record.resolved_page(),
        extract_fragments(&record),
    )
    .await;
    Ok(Json(view))
}

#[axum::debug_handler]
async fn mark_spans_handler(
    State(state): State<AppState>,
    Json(payload): Json<MarkSpansPayload>,
) -> Json<MarkSpansResponse> {
    Json(MarkSpansResponse {
        highlighted: state.preview.mark(payload.session, &payload.spans),
    })
}

#[axum::debug_handler]
async fn close_preview_handler(State(state): State<AppState>) -> StatusCode {
    state.preview.close();
    StatusCode::NO_CONTENT
}

#[axum::debug_handler]
async fn summary_handler(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Json<SummaryResponse> {
    let (summary, notice) = match state.qa.fetch_summary(&query.key).await {
        Ok(summary) => (Some(summary), None),
        Err(err) => (None, Some(err.to_string())),
    };
    Json(SummaryResponse {
        key: query.key,
        summary,
        notice,
    })
}

// --- Estado y apagado ---

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(
        state
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone(),
    )
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        listing::ObjectLister,
        models::Listing,
        navigator::{Navigator, NavigatorService},
        preferences::PreferencesStore,
        prefix_memory::{PrefixMemory, PrefixRepository},
        preview::PreviewPane,
        view::{SortDirection, SortKey},
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::oneshot;

    struct EmptyLister;

    #[async_trait]
    impl ObjectLister for EmptyLister {
        async fn list(&self, _location: &Location) -> Result<Listing, DocError> {
            Ok(Listing::default())
        }
    }

    fn test_state(dir: &TempDir) -> AppState {
        let prefs_path = dir.path().join("prefs.json").display().to_string();
        let config = AppConfig::from_lookup(|key| match key {
            "OBJECT_STORE_URL" => Some("http://127.0.0.1:9/meddoc-raw".to_string()),
            "QA_SERVICE_URL" => Some("http://127.0.0.1:9".to_string()),
            "PREFERENCES_PATH" => Some(prefs_path.clone()),
            _ => None,
        })
        .unwrap();

        let preferences = Arc::new(PreferencesStore::new(config.preferences_path.clone()));
        let memory = Arc::new(PrefixMemory::new(preferences.clone(), &config.known_folders));
        let navigator = Arc::new(NavigatorService::new(
            Navigator::from_preferences(&preferences.load_or_default(), config.listing_failure_policy),
            Arc::new(EmptyLister),
            memory,
            Some(preferences.clone()),
        ));
        let http = reqwest::Client::new();
        let (shutdown_tx, _shutdown_rx) = oneshot::channel();

        AppState {
            qa: Arc::new(QaClient::new(http.clone(), config.qa_service_url.clone())),
            config,
            http,
            navigator,
            preferences,
            conversation: Arc::new(Mutex::new(Conversation::new())),
            preview: Arc::new(PreviewPane::default()),
            status: Arc::new(Mutex::new(Status::default())),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_tx))),
        }
    }

    #[tokio::test]
    async fn view_update_with_only_one_sort_field_keeps_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);

        view_handler(
            State(state.clone()),
            Json(ViewUpdate {
                sort_key: Some(SortKey::Size),
                sort_direction: Some(SortDirection::Desc),
                ..ViewUpdate::default()
            }),
        )
        .await;

        let payload: ViewUpdate = serde_json::from_str(r#"{"sort_key": "date"}"#).unwrap();
        let Json(snapshot) = view_handler(State(state.clone()), Json(payload)).await;
        assert_eq!(snapshot.view.sort_key, SortKey::Date);
        assert_eq!(snapshot.view.sort_direction, SortDirection::Desc);

        let payload: ViewUpdate = serde_json::from_str(r#"{"sort_direction": "asc"}"#).unwrap();
        let Json(snapshot) = view_handler(State(state), Json(payload)).await;
        assert_eq!(snapshot.view.sort_key, SortKey::Date);
        assert_eq!(snapshot.view.sort_direction, SortDirection::Asc);
    }

    #[tokio::test]
    async fn saved_preferences_keep_known_prefixes_and_reach_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        PrefixRepository::save(state.preferences.as_ref(), &["patients/".to_string()]).unwrap();

        let payload = Preferences {
            rows_per_page: 25,
            show_sizes: false,
            ..Preferences::default()
        };
        let Json(saved) = save_preferences_handler(State(state.clone()), Json(payload))
            .await
            .unwrap_or_else(|(status, _)| panic!("guardado rechazado: {status}"));
        assert_eq!(saved.known_prefixes, vec!["patients/"]);

        let Json(snapshot) = navigator_handler(State(state)).await;
        assert!(!snapshot.show_sizes);
        assert_eq!(snapshot.view.page_size, 25);
    }

    #[tokio::test]
    async fn blank_question_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        let status = ask_handler(
            State(state.clone()),
            Json(AskPayload {
                question: "   ".to_string(),
            }),
        )
        .await
        .err()
        .map(|(status, _)| status);
        assert_eq!(status, Some(StatusCode::BAD_REQUEST));
        assert!(state.conversation.lock().unwrap().source(0).is_none());
    }

    #[tokio::test]
    async fn spans_for_unknown_session_are_not_marked() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir);
        state
            .preview
            .open("patients/ana.pdf".into(), None, crate::highlight::extract_from_text("fever"));

        let Json(response) = mark_spans_handler(
            State(state),
            Json(MarkSpansPayload {
                session: Uuid::new_v4(),
                spans: vec!["fever".to_string()],
            }),
        )
        .await;
        assert_eq!(response.highlighted, vec![false]);
    }
}

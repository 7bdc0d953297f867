use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Request, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    serve, Json, Router,
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::completion::CompletionClient;
use crate::config::{ApiKey, Config};
use crate::dashboard::Dashboard;
use crate::error::AdvisorError;
use crate::prompt::Category;
use crate::render::Renderer;
use crate::reveal::reveal_stream;
use crate::session::{Message, Session, SessionStore};

/// Shared application state. The client carries the secret-store key, if
/// any; keys typed into the page live in their session.
#[derive(Clone)]
pub struct AppState {
    renderer: Arc<Renderer>,
    client: CompletionClient,
    sessions: Arc<SessionStore>,
    config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, client: CompletionClient) -> Result<Self, AdvisorError> {
        Ok(Self {
            renderer: Arc::new(Renderer::new()?),
            client,
            sessions: Arc::new(SessionStore::new()),
            config: Arc::new(config),
        })
    }
}

/// Handler errors, mapped to status codes.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<AdvisorError> for ApiError {
    fn from(e: AdvisorError) -> Self {
        match e {
            AdvisorError::Configuration(_) => ApiError::BadRequest(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => {
                error!("Internal error: {}", m);
                (StatusCode::INTERNAL_SERVER_ERROR, m)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewSession {
    pub mode: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct KeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub mode: String,
    pub query: String,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub mode: Category,
    pub messages: Vec<Message>,
    pub messages_html: Vec<String>,
    pub dashboard: Dashboard,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(flatten)]
    pub session: SessionView,
}

// Events pushed to the page over the WebSocket
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WsEvent {
    Frame { html: String },
    Done { dashboard: Dashboard },
    Error { message: String },
}

fn session_view(renderer: &Renderer, session: &Session) -> Result<SessionView, AdvisorError> {
    let messages_html = session
        .messages()
        .iter()
        .map(|m| renderer.bubble(m))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(SessionView {
        id: session.id,
        mode: session.mode,
        messages: session.messages().to_vec(),
        messages_html,
        dashboard: Dashboard::from_record(session.chart()),
    })
}

async fn view(state: &AppState, id: Uuid) -> Result<SessionView, ApiError> {
    let renderer = state.renderer.clone();
    state
        .sessions
        .with_session(id, |s| session_view(&renderer, s))
        .await
        .ok_or(ApiError::NotFound)?
        .map_err(ApiError::from)
}

/// One turn against a stored session. The store lock is not held while the
/// completion service answers; the session's turn lock is, so turns on one
/// session run one after another.
async fn run_turn(state: &AppState, id: Uuid, request: &ChatRequest) -> Result<String, ApiError> {
    let category: Category = request.mode.parse()?;
    let turn_lock = state
        .sessions
        .with_session(id, |s| s.turn_lock())
        .await
        .ok_or(ApiError::NotFound)?;
    let _turn_guard = turn_lock.lock().await;

    let turn = state
        .sessions
        .with_session(id, |s| {
            s.set_mode(category);
            s.begin_turn(&request.query)
        })
        .await
        .ok_or(ApiError::NotFound)?;

    let raw = state
        .client
        .for_session(turn.api_key.clone())
        .generate_response(turn.mode, &request.query)
        .await;

    state
        .sessions
        .with_session(id, |s| s.finish_turn(turn, &raw))
        .await
        .ok_or(ApiError::NotFound)?
        .ok_or_else(|| ApiError::Conflict("session was cleared before the reply arrived".to_string()))
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let page = state
        .renderer
        .index(state.client.model(), !state.client.has_credential())?;
    Ok(Html(page))
}

async fn create_session_handler(
    State(state): State<AppState>,
    Json(body): Json<NewSession>,
) -> Result<Json<SessionCreated>, ApiError> {
    let mode = match body.mode {
        Some(mode) => mode.parse()?,
        None => Category::Strategy,
    };
    let id = state.sessions.create(mode).await;
    let active = state.sessions.len().await;
    info!(active, "Sessions open");
    Ok(Json(SessionCreated { id }))
}

async fn get_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(view(&state, id).await?))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

// The secret-store key applies to every session; a typed key is only
// accepted when there is none.
async fn set_key_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<KeyRequest>,
) -> Result<StatusCode, ApiError> {
    if state.client.has_credential() {
        return Err(ApiError::Conflict(
            "an API key is already configured for this server".to_string(),
        ));
    }
    state
        .sessions
        .with_session(id, |s| s.set_api_key(ApiKey::new(body.api_key)))
        .await
        .ok_or(ApiError::NotFound)?;
    info!(session = %id, "API key entered for session");
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .with_session(id, |s| s.clear())
        .await
        .ok_or(ApiError::NotFound)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn chat_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let reply = run_turn(&state, id, &body).await?;
    let session = view(&state, id).await?;
    Ok(Json(ChatResponse { reply, session }))
}

// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state
        .sessions
        .with_session(id, |_| ())
        .await
        .ok_or(ApiError::NotFound)?;
    info!(session = %id, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, id)))
}

async fn send_event(socket: &mut WebSocket, event: &WsEvent) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(WsMessage::Text(json)).await.is_ok(),
        Err(e) => {
            error!("Failed to serialize WebSocket event: {}", e);
            true
        }
    }
}

// Each text message is one turn; the reply is streamed back frame by frame.
async fn handle_socket(mut socket: WebSocket, state: AppState, id: Uuid) {
    info!(session = %id, "WebSocket connection established");

    while let Some(msg) = socket.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => {
                info!("Client requested WebSocket close");
                break;
            }
            Ok(WsMessage::Binary(_)) => {
                warn!("Received unexpected binary message from client");
                continue;
            }
            // Axum answers pings itself
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
        };

        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(r) => r,
            Err(e) => {
                let event = WsEvent::Error {
                    message: format!("invalid chat message: {}", e),
                };
                if !send_event(&mut socket, &event).await {
                    break;
                }
                continue;
            }
        };

        let prose = match run_turn(&state, id, &request).await {
            Ok(prose) => prose,
            Err(e) => {
                let message = match e {
                    ApiError::NotFound => "session not found".to_string(),
                    ApiError::BadRequest(m) | ApiError::Conflict(m) | ApiError::Internal(m) => m,
                };
                if !send_event(&mut socket, &WsEvent::Error { message }).await {
                    break;
                }
                continue;
            }
        };

        let mut frames = reveal_stream(prose, state.config.reveal_step, state.config.reveal_delay);
        let mut connected = true;
        while let Some(frame) = frames.recv().await {
            let html = match state.renderer.typing_bubble(&frame) {
                Ok(html) => html,
                Err(e) => {
                    error!("Failed to render frame: {}", e);
                    break;
                }
            };
            if !send_event(&mut socket, &WsEvent::Frame { html }).await {
                connected = false;
                break;
            }
        }
        if !connected {
            warn!("WebSocket client disconnected mid-reply");
            break;
        }

        let dashboard = state
            .sessions
            .with_session(id, |s| Dashboard::from_record(s.chart()))
            .await;
        if let Some(dashboard) = dashboard {
            if !send_event(&mut socket, &WsEvent::Done { dashboard }).await {
                break;
            }
        }
    }
    // The page opens one socket per session; when it goes, so does the session.
    state.sessions.remove(id).await;
    info!(session = %id, "WebSocket connection closed");
}

pub fn router(state: AppState) -> Router {
    // Serve static files from the `static` directory
    let static_files_service = ServeDir::new("static").not_found_service(tower::service_fn(
        |_req: Request| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        },
    ));

    Router::new()
        .route("/", get(index_handler))
        .route("/api/session", post(create_session_handler))
        .route(
            "/api/session/:id",
            get(get_session_handler).delete(delete_session_handler),
        )
        .route("/api/session/:id/key", post(set_key_handler))
        .route("/api/session/:id/clear", post(clear_handler))
        .route("/api/session/:id/chat", post(chat_handler))
        .route("/ws/:id", get(ws_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, state: AppState) -> Result<()> {
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}

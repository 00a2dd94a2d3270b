//! HTTP surface for the loaded agents.

use crate::agent::LlmAgent;
use crate::config::{ConfigError, ModelBackendConfig, ServerConfig};
use crate::gemini::GeminiClient;
use crate::loader::{AgentLoader, LoaderError};
use crate::runner::{Runner, RunnerError};
use crate::session::{self, Content, Session, SessionError, SessionService};
use crate::web;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{
        sse::{Event as SseEvent, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Runner(#[from] RunnerError),
    #[error("Failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
    #[error("App {0} not found")]
    AppNotFound(String),
    #[error("Invalid request body: {0}")]
    BadRequest(String),
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::AppNotFound(_)
            | AppError::Session(SessionError::NotFound(_))
            | AppError::Runner(RunnerError::Session(SessionError::NotFound(_))) => {
                StatusCode::NOT_FOUND
            }
            AppError::Session(SessionError::AlreadyExists(_)) => StatusCode::CONFLICT,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Runner(RunnerError::Model(_)) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self, "Request failed");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Parameters for [`build_app`].
#[derive(Debug, Clone)]
pub struct AppOptions {
    pub agents_dir: PathBuf,
    pub session_service_uri: String,
    pub allow_origins: Vec<String>,
    pub web: bool,
    pub model_backend: ModelBackendConfig,
}

#[derive(Clone)]
struct AppState {
    runners: Arc<BTreeMap<String, Runner>>,
    sessions: Arc<dyn SessionService>,
}

impl AppState {
    fn runner(&self, app_name: &str) -> Result<&Runner, AppError> {
        self.runners
            .get(app_name)
            .ok_or_else(|| AppError::AppNotFound(app_name.to_string()))
    }
}

/// Reads the server settings after applying the agents' `.env` files, so
/// backend values kept next to an agent are seen too.
pub fn load_server_config(agents_dir: &FsPath) -> Result<ServerConfig, AppError> {
    AgentLoader::with_builtin_agents(agents_dir).apply_env_files()?;
    Ok(ServerConfig::from_env()?)
}

/// Discovers the agents under `options.agents_dir` and builds the application.
///
/// Fails before anything is served if an agent is misconfigured.
pub fn build_app(options: &AppOptions) -> Result<Router, AppError> {
    let loader = AgentLoader::with_builtin_agents(&options.agents_dir);
    let agents = loader.load_all()?;
    if agents.is_empty() {
        warn!(dir = %options.agents_dir.display(), "No agents found");
    }
    build_app_with_agents(options, agents)
}

pub fn build_app_with_agents(options: &AppOptions, agents: Vec<LlmAgent>) -> Result<Router, AppError> {
    let sessions = session::session_service_from_uri(&options.session_service_uri)?;
    let model = GeminiClient::new(options.model_backend.clone());

    let runners: BTreeMap<String, Runner> = agents
        .into_iter()
        .map(|agent| {
            let name = agent.name.clone();
            let runner = Runner::new(Arc::new(agent), sessions.clone(), model.clone());
            (name, runner)
        })
        .collect();

    let state = AppState {
        runners: Arc::new(runners),
        sessions,
    };

    let mut app = Router::new()
        .route("/list-apps", get(list_apps))
        .route(
            "/apps/{app_name}/users/{user_id}/sessions",
            get(list_sessions).post(create_session),
        )
        .route(
            "/apps/{app_name}/users/{user_id}/sessions/{session_id}",
            get(get_session)
                .post(create_session_with_id)
                .delete(delete_session),
        )
        .route("/run", post(run))
        .route("/run_sse", post(run_sse));

    if options.web {
        app = app
            .route("/", get(web::redirect_to_ui))
            .route("/dev-ui/", get(web::index));
    }

    Ok(app
        .layer(cors_layer(&options.allow_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// A `*` entry allows every origin by echoing the request's `Origin`, which
/// stays valid with credentials enabled.
fn cors_layer(origins: &[String]) -> Result<CorsLayer, AppError> {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let values = origins
            .iter()
            .map(|o| HeaderValue::from_str(o).map_err(|_| AppError::InvalidOrigin(o.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(values)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

pub async fn serve(app: Router, port: u16) -> Result<(), AppError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| AppError::Bind { addr, source })?;
    info!(%addr, "Server listening");

    axum::serve(listener, app).await.map_err(AppError::Serve)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    #[serde(default)]
    state: Option<Map<String, Value>>,
    #[serde(default)]
    session_id: Option<String>,
}

impl CreateSessionRequest {
    fn parse(body: &Bytes) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        parse_json(body)
    }
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::BadRequest(e.to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub app_name: String,
    pub user_id: String,
    pub session_id: String,
    pub new_message: Content,
}

async fn list_apps(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.runners.keys().cloned().collect())
}

async fn list_sessions(
    State(state): State<AppState>,
    Path((app_name, user_id)): Path<(String, String)>,
) -> Result<Json<Vec<Session>>, AppError> {
    state.runner(&app_name)?;
    Ok(Json(state.sessions.list_sessions(&app_name, &user_id).await?))
}

async fn create_session(
    State(state): State<AppState>,
    Path((app_name, user_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Session>, AppError> {
    state.runner(&app_name)?;
    let request = CreateSessionRequest::parse(&body)?;
    let session = state
        .sessions
        .create_session(&app_name, &user_id, request.state, request.session_id)
        .await?;
    info!(app = app_name.as_str(), session = session.id.as_str(), "Created session");
    Ok(Json(session))
}

async fn create_session_with_id(
    State(state): State<AppState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
    body: Bytes,
) -> Result<Json<Session>, AppError> {
    state.runner(&app_name)?;
    let request = CreateSessionRequest::parse(&body)?;
    let session = state
        .sessions
        .create_session(&app_name, &user_id, request.state, Some(session_id))
        .await?;
    info!(app = app_name.as_str(), session = session.id.as_str(), "Created session");
    Ok(Json(session))
}

async fn get_session(
    State(state): State<AppState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Result<Json<Session>, AppError> {
    state.runner(&app_name)?;
    state
        .sessions
        .get_session(&app_name, &user_id, &session_id)
        .await?
        .map(Json)
        .ok_or(AppError::Session(SessionError::NotFound(session_id)))
}

async fn delete_session(
    State(state): State<AppState>,
    Path((app_name, user_id, session_id)): Path<(String, String, String)>,
) -> Result<StatusCode, AppError> {
    state.runner(&app_name)?;
    state
        .sessions
        .delete_session(&app_name, &user_id, &session_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn run(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<session::Event>>, AppError> {
    let request: RunRequest = parse_json(&body)?;
    let runner = state.runner(&request.app_name)?;
    let events = runner
        .run(&request.user_id, &request.session_id, request.new_message)
        .await?;
    Ok(Json(events))
}

/// Same as `/run` but delivers each new event as a server-sent event. Failures
/// after the stream opens are reported as an `{"error": ...}` frame.
async fn run_sse(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, AppError> {
    let request: RunRequest = parse_json(&body)?;
    let runner = state.runner(&request.app_name)?;
    let frames = match runner
        .run(&request.user_id, &request.session_id, request.new_message)
        .await
    {
        Ok(events) => events
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?,
        Err(e) => {
            warn!(error = %e, "Streaming run failed");
            vec![json!({ "error": e.to_string() }).to_string()]
        }
    };

    Ok(Sse::new(stream::iter(
        frames
            .into_iter()
            .map(|data| Ok(SseEvent::default().data(data))),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_origin_is_accepted_with_credentials() {
        let origins = vec![
            "http://localhost".to_string(),
            "http://localhost:8080".to_string(),
            "*".to_string(),
        ];
        assert!(cors_layer(&origins).is_ok());
    }

    #[test]
    fn invalid_origin_is_rejected() {
        let origins = vec!["http://bad\norigin".to_string()];
        assert!(matches!(cors_layer(&origins), Err(AppError::InvalidOrigin(_))));
    }

    #[test]
    fn error_statuses() {
        assert_eq!(
            AppError::AppNotFound("x".to_string()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Session(SessionError::AlreadyExists("s".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Runner(RunnerError::Model(crate::gemini::GeminiError::EmptyResponse)).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn incomplete_run_body_is_a_bad_request() {
        let result: Result<RunRequest, _> =
            parse_json(&Bytes::from_static(br#"{"appName": "asrr_agent"}"#));
        assert!(matches!(result, Err(AppError::BadRequest(_))));
        assert_eq!(result.unwrap_err().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn empty_create_body_means_defaults() {
        let request = CreateSessionRequest::parse(&Bytes::from_static(b"")).unwrap();
        assert!(request.state.is_none());
        assert!(request.session_id.is_none());

        let request =
            CreateSessionRequest::parse(&Bytes::from_static(br#"{"state": {"k": 1}}"#)).unwrap();
        assert_eq!(request.state.unwrap()["k"], 1);
    }
}

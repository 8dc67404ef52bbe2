// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::application::settings::{Identity, SettingsService};
use crate::application::transport::{Caller, InboundMessage, InboundResponse, InboundTransport};
use crate::domain::action::Origin;
use crate::domain::policy::PolicyRecord;
use crate::domain::prompt::{PromptError, PromptResolutionMessage};
use crate::domain::relay::{RelayList, RelayPolicy};
use crate::domain::repository::StoreError;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::prompt_service::{HumanPromptService, PendingPromptInfo};
use crate::presentation::dto::{
    ClosePrompt, KeyImport, NotificationsUpdate, PolicyQuery, PolicyRevocation, PromptHandled,
    ProtocolHandlerUpdate, RelayRemoval, RelayUpdate, Removed, SettingsView,
};

pub struct AppState {
    pub transport: Arc<InboundTransport>,
    pub prompts: Arc<HumanPromptService>,
    pub settings: Arc<SettingsService>,
    pub event_bus: EventBus,
    pub start_time: Instant,
    pub allowed_hosts: HostAllowList,
}

/// `Host` values the internal routes answer to: the loopback names and the
/// configured listen host, each with the listen port. A request naming any
/// other host reached the listener through a foreign DNS name.
#[derive(Debug, Clone)]
pub struct HostAllowList {
    hosts: Vec<String>,
}

impl HostAllowList {
    pub fn new(listen_host: &str, port: u16) -> Self {
        let mut hosts = Vec::new();
        for name in ["127.0.0.1", "localhost", "::1", listen_host] {
            let name = name.to_ascii_lowercase();
            let name = if name.contains(':') && !name.starts_with('[') {
                format!("[{}]", name)
            } else {
                name
            };
            if port == 80 {
                hosts.push(name.clone());
            }
            hosts.push(format!("{}:{}", name, port));
        }
        Self { hosts }
    }

    pub fn allows(&self, host: &str) -> bool {
        let host = host.to_ascii_lowercase();
        self.hosts.iter().any(|allowed| *allowed == host)
    }
}

/// Full HTTP surface. `/api/request` is the only route meant for browsers;
/// everything else refuses requests carrying an `Origin` header or naming a
/// host outside [`HostAllowList`].
pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);

    let external = Router::new().route("/api/request", post(external_request)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::POST])
            .allow_headers([header::CONTENT_TYPE]),
    );

    let internal = Router::new()
        .route("/api/internal/request", post(internal_request))
        .route("/api/prompts", get(list_prompts))
        .route("/api/prompts/resolve", post(resolve_prompt))
        .route("/api/prompts/close", post(close_prompt))
        .route("/api/events", get(stream_events))
        .route("/api/internal/identity", get(get_identity))
        .route("/api/internal/key/generate", post(generate_key))
        .route("/api/internal/key/import", post(import_key))
        .route("/api/internal/key/clear", post(clear_key))
        .route("/api/internal/relays", get(list_relays).post(set_relay))
        .route("/api/internal/relays/remove", post(remove_relay))
        .route("/api/internal/policies", get(list_policies))
        .route("/api/internal/policies/revoke", post(revoke_policies))
        .route("/api/internal/settings", get(get_settings))
        .route("/api/internal/settings/notifications", post(set_notifications))
        .route("/api/internal/settings/protocol-handler", post(set_protocol_handler))
        .route_layer(middleware::from_fn(reject_browser_origins))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_local_host));

    Router::new()
        .route("/health", get(health_handler))
        .merge(external)
        .merge(internal)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body `{"error": message}` with a status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        let status = if e.chain().any(|cause| cause.is::<StoreError>()) {
            StatusCode::INTERNAL_SERVER_ERROR
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::new(status, format!("{:#}", e))
    }
}

impl From<PromptError> for ApiError {
    fn from(e: PromptError) -> Self {
        let status = match e {
            PromptError::NoMatchingPrompt => StatusCode::NOT_FOUND,
            PromptError::AlreadyPending(_) => StatusCode::CONFLICT,
            PromptError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self::new(status, e.to_string())
    }
}

async fn reject_browser_origins(request: Request, next: Next) -> Response {
    if request.headers().contains_key(header::ORIGIN) {
        debug!(path = %request.uri().path(), "Refusing cross-origin request to internal route");
        return ApiError::new(StatusCode::FORBIDDEN, "internal routes do not accept cross-origin requests")
            .into_response();
    }
    next.run(request).await
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

async fn external_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Json<InboundResponse> {
    let Json(message) = match payload {
        Ok(message) => message,
        Err(rejection) => return Json(InboundResponse::invalid_request(rejection.body_text())),
    };

    // Browsers send "null" for opaque origins, which carries no host
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| Origin::from_url(raw).ok());

    Json(state.transport.handle(Caller::External, origin, message).await)
}

async fn internal_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Json<InboundResponse> {
    match payload {
        Ok(Json(message)) => Json(state.transport.handle(Caller::Trusted, None, message).await),
        Err(rejection) => Json(InboundResponse::invalid_request(rejection.body_text())),
    }
}

async fn list_prompts(State(state): State<Arc<AppState>>) -> Json<Vec<PendingPromptInfo>> {
    Json(state.prompts.pending().into_iter().collect())
}

async fn resolve_prompt(
    State(state): State<Arc<AppState>>,
    Json(message): Json<PromptResolutionMessage>,
) -> Result<Json<PromptHandled>, ApiError> {
    let id = state.prompts.resolve(&message)?;
    Ok(Json(PromptHandled { id }))
}

async fn close_prompt(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ClosePrompt>, JsonRejection>,
) -> Result<Json<PromptHandled>, ApiError> {
    // An empty body closes whatever is pending
    let ClosePrompt { id } = body.map(|Json(body)| body).unwrap_or_default();
    let id = state.prompts.close_surface(id)?;
    Ok(Json(PromptHandled { id }))
}

async fn stream_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.event_bus.subscribe().into_inner()).filter_map(|item| match item {
        Ok(event) => Event::default().json_data(&event).ok().map(Ok),
        Err(BroadcastStreamRecvError::Lagged(n)) => {
            warn!("SSE subscriber lagged by {} events", n);
            None
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

async fn get_identity(State(state): State<Arc<AppState>>) -> Result<Json<Option<Identity>>, ApiError> {
    Ok(Json(state.settings.identity().await?))
}

async fn generate_key(State(state): State<Arc<AppState>>) -> Result<Json<Identity>, ApiError> {
    Ok(Json(state.settings.generate_key().await?))
}

async fn require_local_host(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().authority().map(|authority| authority.as_str()));
    let allowed = host.is_some_and(|host| state.allowed_hosts.allows(host));
    if !allowed {
        warn!(host = ?host, path = %request.uri().path(), "Refusing internal request for a foreign host");
        return ApiError::new(StatusCode::FORBIDDEN, "internal routes only answer on the local address")
            .into_response();
    }
    next.run(request).await
}

async fn import_key(
    State(state): State<Arc<AppState>>,
    Json(body): Json<KeyImport>,
) -> Result<Json<Identity>, ApiError> {
    Ok(Json(state.settings.import_key(&body.key).await?))
}

async fn clear_key(State(state): State<Arc<AppState>>) -> Result<StatusCode, ApiError> {
    state.settings.clear_key().await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_relays(State(state): State<Arc<AppState>>) -> Result<Json<RelayList>, ApiError> {
    Ok(Json(state.settings.relays().await?))
}

async fn set_relay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelayUpdate>,
) -> Result<Json<RelayList>, ApiError> {
    let policy = RelayPolicy {
        read: body.read,
        write: body.write,
    };
    Ok(Json(state.settings.set_relay(&body.url, policy).await?))
}

async fn remove_relay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelayRemoval>,
) -> Result<Json<Removed>, ApiError> {
    let removed = state.settings.remove_relay(&body.url).await?;
    Ok(Json(Removed {
        removed: usize::from(removed),
    }))
}

async fn list_policies(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PolicyQuery>,
) -> Result<Json<Vec<PolicyRecord>>, ApiError> {
    Ok(Json(state.settings.list_policies(&query.into()).await?))
}

async fn revoke_policies(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PolicyRevocation>,
) -> Result<Json<Removed>, ApiError> {
    let removed = state
        .settings
        .revoke_policies(&body.host, body.decision, body.action)
        .await?;
    Ok(Json(Removed { removed }))
}

async fn get_settings(State(state): State<Arc<AppState>>) -> Result<Json<SettingsView>, ApiError> {
    Ok(Json(SettingsView {
        notifications: state.settings.notifications().await?,
        protocol_handler: state.settings.protocol_handler().await?,
    }))
}

async fn set_notifications(
    State(state): State<Arc<AppState>>,
    Json(body): Json<NotificationsUpdate>,
) -> Result<StatusCode, ApiError> {
    state.settings.set_notifications(body.enabled).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_protocol_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ProtocolHandlerUpdate>,
) -> Result<StatusCode, ApiError> {
    state.settings.set_protocol_handler(body.template).await?;
    Ok(StatusCode::NO_CONTENT)
}

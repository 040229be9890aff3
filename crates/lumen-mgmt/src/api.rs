use crate::listener::ListenerControl;
use crate::security::{append_cookie, expired_session_cookie, session_cookie};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, State},
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use lumen_config::dto::*;
use lumen_config::record::{
    AdvancedConfig, GeneralConfig, StorageConfig, UserRecordingConfig,
};
use lumen_config::{ConfigError, ConfigMutationService};
use std::sync::Arc;

pub const PORT_CHANGED_HEADER: &str = "x-lumen-port-changed";

/// Error body: `{"error": <kind>, "message": <text>}`
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Body missing, not JSON, or not the expected shape
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Config(e) => match e {
                ConfigError::VersionConflict { .. } => {
                    (StatusCode::PRECONDITION_FAILED, "version_conflict")
                }
                ConfigError::CurrentSecretIncorrect => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "current_password_incorrect")
                }
                ConfigError::SecretAlreadyEnabled => (StatusCode::BAD_REQUEST, "password_already_enabled"),
                ConfigError::InvalidAccessState(_) => (StatusCode::BAD_REQUEST, "invalid_access_state"),
                ConfigError::MalformedSecretIntent(_) => {
                    (StatusCode::BAD_REQUEST, "malformed_secret_intent")
                }
                ConfigError::InvalidField { .. } => (StatusCode::BAD_REQUEST, "invalid_field"),
                ConfigError::UnknownDomain(_) => (StatusCode::NOT_FOUND, "unknown_domain"),
                ConfigError::Mail(_) => (StatusCode::BAD_GATEWAY, "mail_error"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            },
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::InvalidRequest(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the API error body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        (
            status,
            Json(serde_json::json!({
                "error": kind,
                "message": self.to_string(),
            })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Run a service call on the blocking pool
async fn blocking<T, F>(api: &AdminApi, call: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ConfigMutationService) -> Result<T, ConfigError> + Send + 'static,
{
    let service = Arc::clone(&api.service);
    let result = tokio::task::spawn_blocking(move || call(&service))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(result?)
}

#[derive(Clone)]
pub struct AdminApi {
    service: Arc<ConfigMutationService>,
    listener: Arc<ListenerControl>,
}

impl AdminApi {
    pub fn new(service: Arc<ConfigMutationService>, listener: Arc<ListenerControl>) -> Self {
        Self { service, listener }
    }

    fn server_status(&self, port_change_failed: bool) -> ServerStatus {
        ServerStatus {
            active_port: self.listener.active_port(),
            port_change_failed,
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        let config = Router::new()
            .route("/backend/config/general", get(get_general).post(update_general))
            .route("/backend/config/ui", get(get_ui).post(update_ui))
            .route("/backend/config/storage", get(get_storage).post(update_storage))
            .route("/backend/config/smtp", get(get_smtp).post(update_smtp))
            .route(
                "/backend/config/user-recording",
                get(get_user_recording).post(update_user_recording),
            )
            .route("/backend/config/advanced", get(get_advanced).post(update_advanced))
            .route("/backend/config/plugins", get(list_plugins))
            .route("/backend/config/plugin/:id", get(get_plugin).post(update_plugin))
            .route("/backend/config/send-test-email", post(send_test_email));

        let public = Router::new()
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler));

        Router::new()
            .merge(config)
            .merge(public)
            .layer(axum::middleware::from_fn(
                crate::security::security_headers_middleware,
            ))
            .with_state(self)
    }
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn ready_handler(State(api): State<Arc<AdminApi>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "domains": api.service.store().domains().len(),
    }))
}

async fn get_general(State(api): State<Arc<AdminApi>>) -> ApiResult<VersionedView<GeneralConfig>> {
    Ok(Json(api.service.get_general()?))
}

async fn update_general(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<GeneralUpdate>,
) -> ApiResult<VersionedView<GeneralConfig>> {
    Ok(Json(blocking(&api, move |service| service.update_general(&update)).await?))
}

async fn get_ui(State(api): State<Arc<AdminApi>>) -> ApiResult<UserInterfaceResponse> {
    Ok(Json(api.service.get_user_interface(api.server_status(false))?))
}

async fn update_ui(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<UserInterfaceUpdate>,
) -> Result<Response, ApiError> {
    let outcome = blocking(&api, move |service| service.update_user_interface(&update)).await?;

    let mut port_changed = false;
    let mut port_change_failed = false;
    if outcome.port_changed() {
        match api.listener.change_port(outcome.port) {
            Ok(_) => port_changed = true,
            Err(e) => {
                tracing::error!("Failed to move listener to port {}: {}", outcome.port, e);
                port_change_failed = true;
            }
        }
    }

    let body = UserInterfaceResponse::new(outcome.view.clone(), api.server_status(port_change_failed));
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    if port_changed {
        headers.insert(
            HeaderName::from_static(PORT_CHANGED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    if let Some(token) = &outcome.session {
        append_cookie(headers, &session_cookie(token.as_str()));
    } else if outcome.sessions_invalidated {
        append_cookie(headers, &expired_session_cookie());
    }
    Ok(response)
}

async fn get_storage(State(api): State<Arc<AdminApi>>) -> ApiResult<VersionedView<StorageConfig>> {
    Ok(Json(api.service.get_storage()?))
}

async fn update_storage(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<StorageUpdate>,
) -> ApiResult<VersionedView<StorageConfig>> {
    Ok(Json(blocking(&api, move |service| service.update_storage(&update)).await?))
}

async fn get_smtp(State(api): State<Arc<AdminApi>>) -> ApiResult<SmtpResponse> {
    Ok(Json(api.service.get_smtp()?))
}

async fn update_smtp(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<SmtpUpdate>,
) -> ApiResult<SmtpResponse> {
    Ok(Json(blocking(&api, move |service| service.update_smtp(&update)).await?))
}

async fn send_test_email(
    State(api): State<Arc<AdminApi>>,
    ApiJson(request): ApiJson<SendTestEmailRequest>,
) -> Result<StatusCode, ApiError> {
    api.service.send_test_message(&request).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_user_recording(
    State(api): State<Arc<AdminApi>>,
) -> ApiResult<VersionedView<UserRecordingConfig>> {
    Ok(Json(api.service.get_user_recording()?))
}

async fn update_user_recording(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<UserRecordingUpdate>,
) -> ApiResult<VersionedView<UserRecordingConfig>> {
    Ok(Json(
        blocking(&api, move |service| service.update_user_recording(&update)).await?,
    ))
}

async fn get_advanced(State(api): State<Arc<AdminApi>>) -> ApiResult<AdvancedResponse<AdvancedConfig>> {
    Ok(Json(api.service.get_advanced()?))
}

async fn update_advanced(
    State(api): State<Arc<AdminApi>>,
    ApiJson(update): ApiJson<AdvancedUpdate>,
) -> ApiResult<AdvancedResponse<AdvancedConfig>> {
    Ok(Json(blocking(&api, move |service| service.update_advanced(&update)).await?))
}

async fn list_plugins(State(api): State<Arc<AdminApi>>) -> ApiResult<Vec<PluginSummary>> {
    Ok(Json(api.service.list_plugins()?))
}

async fn get_plugin(
    State(api): State<Arc<AdminApi>>,
    Path(id): Path<String>,
) -> ApiResult<PluginResponse> {
    Ok(Json(api.service.get_plugin(&id)?))
}

async fn update_plugin(
    State(api): State<Arc<AdminApi>>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<PluginUpdate>,
) -> ApiResult<PluginResponse> {
    Ok(Json(
        blocking(&api, move |service| service.update_plugin(&id, &update)).await?,
    ))
}

//! HTTP API handlers using axum.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /` | `index_handler` |
//! | `GET /services` | `list_handler` |
//! | `POST /services` | `register_handler` |
//! | `GET /services/:name` | `find_by_name_handler` |
//! | `POST /services/:id` | `heartbeat_handler` |
//! | `DELETE /services/:id` | `deregister_handler` |
//!
//! The last three share one path segment, so they are mounted on a single
//! `/services/:key` route and each handler interprets the key itself.
//!
//! # Rust Learning Note
//!
//! ## Optional extractors
//!
//! `Option<ConnectInfo<SocketAddr>>` never rejects a request: it is `Some`
//! when the listener recorded the peer address and `None` otherwise. The
//! plain listener records it through `into_make_service_with_connect_info`,
//! the TLS listener through an `Extension` layer per connection, and tests
//! through `MockConnectInfo`. The handler does not care which.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequest, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use svcreg_common::{
    ApiIndex, DeregisterResponse, Error, ErrorResponse, HeartbeatAck, Instance, InstanceId,
    RegisterRequest,
};
use tracing::{debug, error, info};

use crate::{registration, storage::Registry};

/// Message returned when an id names no instance.
pub const NO_SUCH_INSTANCE: &str = "No such instance";

/// Creates the API router.
pub fn create_router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/services", get(list_handler).post(register_handler))
        .route("/services/", post(register_handler))
        .route(
            "/services/:key",
            get(find_by_name_handler)
                .post(heartbeat_handler)
                .delete(deregister_handler),
        )
        .with_state(registry)
}

/// Returns the index of available resource paths.
async fn index_handler() -> Json<ApiIndex> {
    Json(ApiIndex::default())
}

/// Lists all registered instances.
async fn list_handler(State(registry): State<Arc<Registry>>) -> Json<Vec<Instance>> {
    debug!("Listing all instances");
    Json(registry.find_all())
}

/// Registers a new instance.
///
/// When the body carries no `host`, the remote address of the connection is
/// used instead. Requests served without connection info (e.g. in-process
/// tests without `MockConnectInfo`) must supply the host explicitly.
async fn register_handler(
    State(registry): State<Arc<Registry>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    RegisterBody(req): RegisterBody,
) -> Result<(StatusCode, Json<Instance>), ApiError> {
    let remote = connect_info.map(|ConnectInfo(addr)| addr.ip());

    let instance = registration::register(&registry, req, remote)?;

    Ok((StatusCode::CREATED, Json(instance)))
}

/// Finds instances by canonical name, optionally filtered by `?version=`.
///
/// The query string is read leniently: unknown or repeated parameters never
/// fail the lookup. A repeated `version` keeps its last value.
async fn find_by_name_handler(
    State(registry): State<Arc<Registry>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Vec<Instance>> {
    let version = params.get("version").map(String::as_str).filter(|v| !v.is_empty());
    debug!("Finding instances of {} (version: {:?})", name, version);

    Json(registry.find_by_name(&name, version))
}

/// Refreshes the heartbeat of an instance.
async fn heartbeat_handler(
    State(registry): State<Arc<Registry>>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<HeartbeatAck>), ApiError> {
    let id = parse_id(&key)?;
    let doc = registry.heartbeat(id)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(HeartbeatAck {
            success: true,
            message: "heartbeat accepted".to_string(),
            doc,
        }),
    ))
}

/// Deletes an instance.
///
/// Unknown ids are 404. A known id whose removal fails internally still
/// answers 200, with `success: false`. The lookup and the removal happen
/// under one lock, so a concurrent delete of the same id is a 404 here.
async fn deregister_handler(
    State(registry): State<Arc<Registry>>,
    Path(key): Path<String>,
) -> Result<Json<DeregisterResponse>, ApiError> {
    let id = parse_id(&key)?;

    let success = registry.deregister(id)?;
    info!("Deregister instance {}: success={}", id, success);

    Ok(Json(DeregisterResponse { success }))
}

fn parse_id(key: &str) -> Result<InstanceId, ApiError> {
    key.parse::<InstanceId>()
        .map_err(|_| ApiError::NotFound(NO_SUCH_INSTANCE.to_string()))
}

/// Registration body, accepted as JSON or as a URL-encoded form.
///
/// Malformed bodies are reported as 400 with the parser's message.
#[derive(Debug)]
pub struct RegisterBody(pub RegisterRequest);

#[async_trait]
impl<S> FromRequest<S> for RegisterBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

        if is_form {
            let Form(body) = Form::<RegisterRequest>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            Ok(Self(body))
        } else {
            let Json(body) = Json::<RegisterRequest>::from_request(req, state)
                .await
                .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
            Ok(Self(body))
        }
    }
}

/// API error type.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_validation() {
            ApiError::BadRequest(err.to_string())
        } else if err.is_not_found() {
            ApiError::NotFound(NO_SUCH_INSTANCE.to_string())
        } else {
            ApiError::Internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            error!("API error: {} - {}", status, message);
        } else {
            debug!("API error: {} - {}", status, message);
        }

        let body = Json(ErrorResponse { message });
        (status, body).into_response()
    }
}

//! Web UI and JSON API.
//!
//! | Method | Path               | Response                                |
//! |--------|--------------------|-----------------------------------------|
//! | GET    | `/`                | status page with the current time       |
//! | GET    | `/profiles`        | HTML table of records                   |
//! | GET    | `/api/rfid`        | the record collection as JSON           |
//! | POST   | `/api/updateName`  | `{"success": bool}`                     |
//! | GET    | `/exportData`      | `/api/rfid` as a download               |
//! | GET    | `/favicon.ico`     | 204                                     |
//!
//! Anything else is a 404.

pub mod error;
pub mod html;

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::context::AppContext;
use crate::identifier::CardId;
use crate::reader::StopHandle;

pub use error::ApiError;

/// File name offered by `/exportData`.
pub const EXPORT_FILE_NAME: &str = "rfid_data.json";

/// State shared by all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    context: Arc<AppContext>,
}

impl AppState {
    /// Wrap a context for the router.
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }
}

/// Build the router over `context`.
#[must_use]
pub fn app_router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/profiles", get(profiles))
        .route("/api/rfid", get(api_rfid))
        .route("/api/updateName", post(update_name))
        .route("/exportData", get(export_data))
        .route("/favicon.ico", get(favicon))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState::new(context))
}

/// Serve `router` on `listener` until `stop` is signalled.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    stop: StopHandle,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("Web server started on http://{}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(async move { stop.stopped().await })
        .await
}

async fn root(State(state): State<AppState>) -> Html<String> {
    Html(html::status_page(&state.context.formatted_time()))
}

async fn profiles(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let profiles = state.context.profiles().await?;
    Ok(Html(html::profiles_page(&profiles)))
}

async fn api_rfid(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(state.context.read_all().await?))
}

#[derive(Debug, Deserialize)]
struct RenameRequest {
    uid: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct RenameResponse {
    success: bool,
}

async fn update_name(
    State(state): State<AppState>,
    payload: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<RenameResponse>, ApiError> {
    let Json(request) = payload?;
    if request.uid.trim().is_empty() {
        return Err(ApiError::bad_request("uid is required"));
    }
    let id = CardId::parse(&request.uid)?;
    state.context.rename(&id, &request.name).await?;
    Ok(Json(RenameResponse { success: true }))
}

async fn export_data(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let document = state.context.read_all().await?;
    let body = serde_json::to_string_pretty(&document)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILE_NAME}\""),
            ),
        ],
        body,
    ))
}

async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "404: Not Found")
}

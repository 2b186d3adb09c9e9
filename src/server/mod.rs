//! HTTP surface of the library.
//!
//! A thin axum layer: handlers parse the request, call one library
//! operation and map [`LibraryError`] onto a status code with a JSON
//! `{ "error": ... }` body.

mod handlers;
pub mod stream;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::header::{ACCEPT_RANGES, CONTENT_RANGE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::DEFAULT_PAGE_SIZE;
use crate::library::{Library, LibraryError};

/// Shared state handed to every handler
pub struct AppState {
    pub library: Library,

    /// Default page size of the home feed and library view
    pub page_size: usize,
}

impl AppState {
    pub fn new(library: Library) -> Self {
        Self {
            library,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,

    /// File size reported with a 416
    unsatisfiable_size: Option<u64>,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
            unsatisfiable_size: None,
        }
    }

    fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::NotFound(message) => Self::new(StatusCode::NOT_FOUND, message),
            LibraryError::Conflict(message) => Self::new(StatusCode::CONFLICT, message),
            LibraryError::InvalidInput(message) => Self::bad_request(message),
            LibraryError::RangeNotSatisfiable { size } => Self {
                status: StatusCode::RANGE_NOT_SATISFIABLE,
                message: "Requested range not satisfiable".to_string(),
                unsatisfiable_size: Some(size),
            },
            other => {
                error!("Request failed: {}", other);
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        let mut response = (self.status, payload).into_response();

        if let Some(size) = self.unsatisfiable_size {
            let headers = response.headers_mut();
            headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
            if let Ok(value) = HeaderValue::try_from(format!("bytes */{}", size)) {
                headers.insert(CONTENT_RANGE, value);
            }
        }
        response
    }
}

pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!("Serving video library on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .await
        .context("HTTP server terminated unexpectedly")
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind HTTP listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/files", get(handlers::files))
        .route("/allfiles", get(handlers::all_files))
        .route("/random", get(handlers::random))
        .route("/search", get(handlers::search))
        .route("/tag/:tag_name", get(handlers::by_tag))
        .route("/libraryfiles", get(handlers::library_files))
        .route("/videos/:encoded", get(handlers::stream_video))
        .route("/previews/:encoded", get(handlers::stream_preview))
        .route("/thumbnails/:encoded", get(handlers::stream_thumbnail))
        .route("/api/video-manifest", get(handlers::video_manifest))
        .route("/api/videoDetails", get(handlers::video_details))
        .route("/api/updateVideo", post(handlers::update_video))
        .route("/api/updateTitle", post(handlers::update_title))
        .route("/api/tagCategories", get(handlers::tag_categories))
        .route("/api/addCategory", post(handlers::add_category))
        .route(
            "/api/folders",
            get(handlers::list_folders)
                .post(handlers::add_folder)
                .put(handlers::set_active_folders),
        )
        .route("/api/folders/import-json", post(handlers::import_json))
        .route("/api/folders/:id", delete(handlers::delete_folder))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

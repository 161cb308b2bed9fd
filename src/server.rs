//! HTTP front end.
//!
//! The routes are thin: they parse the form, run one [`Desk`] operation on a
//! blocking thread and render the result.

mod form;
mod handlers;
mod views;

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::desk::{Desk, DeskError};

/// Largest accepted request body, attachments included.
const MAX_BODY: usize = 20 * 1024 * 1024;

/// Shared state of the HTTP server.
///
/// Desk operations run one at a time.
#[derive(Clone)]
pub struct AppState {
    desk: Arc<Mutex<Desk>>,
    organisation: Arc<str>,
}

impl AppState {
    /// Wraps `desk` for use by the router.
    #[must_use]
    pub fn new(desk: Desk) -> Self {
        let organisation = Arc::from(desk.config().organisation.as_str());
        Self {
            desk: Arc::new(Mutex::new(desk)),
            organisation,
        }
    }

    /// Run a desk operation on the blocking thread pool.
    async fn run<T, F>(&self, operation: F) -> Result<T, AppError>
    where
        F: FnOnce(&Desk) -> Result<T, DeskError> + Send + 'static,
        T: Send + 'static,
    {
        let desk = Arc::clone(&self.desk);
        let result = tokio::task::spawn_blocking(move || {
            let desk = desk.blocking_lock();
            operation(&desk)
        })
        .await?;
        Ok(result?)
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::form_page).post(handlers::submit))
        .route("/admin", get(handlers::admin_page).post(handlers::admin_action))
        .route(
            "/admin/:id/attachments/:key/delete",
            post(handlers::remove_attachment),
        )
        .route("/imprimer/:id", get(handlers::print_view))
        .route("/email/:id", get(handlers::email_preview))
        .route("/uploads/:key", get(handlers::download))
        .route("/archives", get(handlers::archive_page))
        .route("/api/requests", get(handlers::api_requests))
        .layer(DefaultBodyLimit::max(MAX_BODY))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `desk` on `listen` until the process is stopped.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn serve(desk: Desk, listen: &str) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(AppState::new(desk))).await
}

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The desk operation failed.
    #[error(transparent)]
    Desk(#[from] DeskError),
    /// The blocking task panicked or was cancelled.
    #[error("desk task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    /// The multipart body could not be read.
    #[error(transparent)]
    Multipart(#[from] axum::extract::multipart::MultipartError),
    /// The form is missing a field or has an unusable value.
    #[error("{0}")]
    BadRequest(String),
    /// No request, attachment or file matches the path.
    #[error("not found")]
    NotFound,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Desk(_) | Self::Join(_) => {
                tracing::error!("{self}");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Multipart(e) => e.status(),
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        };
        let message = match &self {
            Self::Desk(_) | Self::Join(_) => "Erreur interne du serveur".to_string(),
            Self::NotFound => "Page introuvable".to_string(),
            other => other.to_string(),
        };
        (status, Html(views::error_page(status, &message))).into_response()
    }
}

use crate::handlers;
use crate::state::AppState;
use crate::storage::MAX_BLOB_BYTES;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post, put},
};

/// Oversized images within this slack get the handler's 400; beyond it axum answers 413.
const UPLOAD_BODY_LIMIT: usize = MAX_BLOB_BYTES + 1_048_576;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/categories", get(handlers::list_categories))
        .route("/api/register", post(handlers::register))
        .route("/api/login", post(handlers::login))
        .route("/api/logout", post(handlers::logout))
        .route("/api/session", get(handlers::get_session))
        .route("/api/me/badge", put(handlers::select_badge))
        .route("/api/me/dashboard", get(handlers::get_dashboard))
        .route(
            "/api/me/habits",
            get(handlers::list_personal_habits).post(handlers::create_personal_habit),
        )
        .route("/api/me/habits/:id", delete(handlers::delete_personal_habit))
        .route(
            "/api/me/habits/:id/complete",
            post(handlers::complete_personal_habit),
        )
        .route(
            "/api/me/habits/:id/evidence",
            post(handlers::attach_personal_evidence),
        )
        .route(
            "/api/me/reports",
            get(handlers::list_personal_reports).post(handlers::file_personal_report),
        )
        .route(
            "/api/me/reports/:id",
            delete(handlers::withdraw_personal_report),
        )
        .route("/api/feed", get(handlers::get_feed))
        .route(
            "/api/habits",
            get(handlers::list_habits).post(handlers::create_habit),
        )
        .route("/api/habits/:id", delete(handlers::delete_habit))
        .route("/api/habits/:id/checks", post(handlers::check_habit))
        .route("/api/habits/:id/comments", post(handlers::comment_habit))
        .route("/api/reports", get(handlers::list_reports))
        .route("/api/reports/:id/checks", post(handlers::check_report))
        .route("/api/reports/:id/comments", post(handlers::comment_report))
        .route(
            "/api/reports/:id/evidence",
            post(handlers::add_report_evidence),
        )
        .route(
            "/api/reports/:id/evidence/:index/checks",
            post(handlers::check_report_evidence),
        )
        .route(
            "/api/blobs",
            post(handlers::upload_blob).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/blobs/:name", get(handlers::get_blob))
        .with_state(state)
}

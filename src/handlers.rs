use crate::accounts;
use crate::client::NewHabit;
use crate::comments::{self, CommentOutcome, CommentTarget};
use crate::dashboard::{self, DashboardResponse};
use crate::errors::AppError;
use crate::models::{
    Category, CategoryInfo, CommentRequest, EvidenceRequest, FeedResponse, Habit, LoginRequest,
    NewHabitRequest, NewPersonalHabitRequest, NewReportRequest, PersonalHabit, PersonalReport,
    RegisterRequest, Report, ResolutionEvidence, SelectBadgeRequest, UploadQuery, UploadResponse,
    UserSummary,
};
use crate::personal;
use crate::session::Session;
use crate::state::AppState;
use crate::storage::{Collection, MAX_BLOB_BYTES};
use crate::verification::{self, CheckOutcome};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

pub const SESSION_HEADER: &str = "x-session-token";

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub session: Session,
}

/// Resolves the caller's session from the `x-session-token` header.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(String, Session), AppError> {
    let token = headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::unauthorized("missing session token"))?;
    let session = state
        .sessions
        .get(token)
        .await
        .ok_or_else(|| AppError::unauthorized("unknown or expired session"))?;
    Ok((token.to_string(), session))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "time": Utc::now().to_rfc3339() }))
}

pub async fn list_categories() -> Json<Vec<CategoryInfo>> {
    Json(Category::ALL.into_iter().map(CategoryInfo::from).collect())
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserSummary>), AppError> {
    let user = accounts::register(&state.client, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let (token, session) = accounts::login(
        &state.client,
        &state.sessions,
        &payload.nickname,
        &payload.password,
    )
    .await?;
    Ok(Json(LoginResponse { token, session }))
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    let (token, _) = authenticate(&state, &headers).await?;
    accounts::logout(&state.sessions, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Session>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    Ok(Json(session))
}

pub async fn select_badge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<SelectBadgeRequest>,
) -> Result<Json<Session>, AppError> {
    let (token, session) = authenticate(&state, &headers).await?;
    let updated = accounts::select_badge(
        &state.client,
        &state.sessions,
        &token,
        &session.user_id,
        payload.badge_id,
    )
    .await?;
    Ok(Json(updated))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DashboardResponse>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let response = dashboard::refresh(
        &state.client,
        &state.sessions,
        &session.user_id,
        state.config.poll_interval_secs,
    )
    .await?;
    Ok(Json(response))
}

pub async fn list_personal_habits(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PersonalHabit>>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let user = personal::load_user(&state.client, &session.user_id).await?;
    Ok(Json(user.habits))
}

pub async fn create_personal_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewPersonalHabitRequest>,
) -> Result<(StatusCode, Json<PersonalHabit>), AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let habit = personal::create_habit(
        &state.client,
        &session.user_id,
        payload,
        Utc::now().date_naive(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(habit)))
}

pub async fn delete_personal_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    if personal::delete_habit(&state.client, &session.user_id, &habit_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("habit not found"))
    }
}

pub async fn complete_personal_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
) -> Result<Json<PersonalHabit>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    personal::complete_habit(
        &state.client,
        &session.user_id,
        &habit_id,
        Utc::now().date_naive(),
    )
    .await?
    .map(Json)
    .ok_or_else(|| AppError::not_found("habit not found"))
}

#[derive(Debug, Serialize)]
pub struct SharedEvidenceResponse {
    pub habit: PersonalHabit,
    pub shared: Habit,
}

pub async fn attach_personal_evidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
    Json(payload): Json<EvidenceRequest>,
) -> Result<(StatusCode, Json<SharedEvidenceResponse>), AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let (habit, shared) = personal::attach_evidence(&state.client, &session, &habit_id, payload)
        .await?
        .ok_or_else(|| AppError::not_found("habit not found"))?;
    Ok((
        StatusCode::CREATED,
        Json(SharedEvidenceResponse { habit, shared }),
    ))
}

pub async fn list_personal_reports(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PersonalReport>>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let user = personal::load_user(&state.client, &session.user_id).await?;
    Ok(Json(user.reports))
}

#[derive(Debug, Serialize)]
pub struct FiledReportResponse {
    pub report: PersonalReport,
    pub shared: Report,
}

pub async fn file_personal_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewReportRequest>,
) -> Result<(StatusCode, Json<FiledReportResponse>), AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let (report, shared) = personal::file_report(&state.client, &session, payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(FiledReportResponse { report, shared }),
    ))
}

pub async fn withdraw_personal_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    if personal::withdraw_report(&state.client, &session.user_id, &report_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("report not found"))
    }
}

pub async fn get_feed(State(state): State<AppState>) -> Result<Json<FeedResponse>, AppError> {
    let habits = state.client.habits().await?;
    let reports = active_reports(state.client.reports().await?);
    Ok(Json(FeedResponse {
        habits,
        reports,
        poll_interval_secs: state.config.poll_interval_secs,
    }))
}

pub async fn list_habits(State(state): State<AppState>) -> Result<Json<Vec<Habit>>, AppError> {
    Ok(Json(state.client.habits().await?))
}

pub async fn create_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<NewHabitRequest>,
) -> Result<(StatusCode, Json<Habit>), AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let description = payload
        .description
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| payload.category.action_description().to_string());
    let habit = state
        .client
        .create_habit(NewHabit {
            user_id: session.user_id,
            user_nickname: session.nickname,
            user_avatar: session.avatar,
            category: payload.category,
            description: Some(description),
            image_url: payload.image_url.filter(|url| !url.trim().is_empty()),
        })
        .await?;
    Ok((StatusCode::CREATED, Json(habit)))
}

pub async fn delete_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let removed = state
        .client
        .delete(Collection::SharedHabits, &habit_id, Some(&session.user_id))
        .await?;
    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::not_found("habit not found"))
    }
}

pub async fn check_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
) -> Result<Json<CheckOutcome>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let outcome = verification::check_habit(&state.client, &habit_id, &session.nickname).await?;
    Ok(Json(outcome))
}

pub async fn comment_habit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(habit_id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> Result<Json<CommentOutcome>, AppError> {
    comment_on(state, headers, CommentTarget::Habit, habit_id, payload).await
}

pub async fn list_reports(State(state): State<AppState>) -> Result<Json<Vec<Report>>, AppError> {
    Ok(Json(active_reports(state.client.reports().await?)))
}

pub async fn check_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
) -> Result<Json<CheckOutcome>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let outcome = verification::check_report(&state.client, &report_id, &session.nickname).await?;
    Ok(Json(outcome))
}

pub async fn comment_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
    Json(payload): Json<CommentRequest>,
) -> Result<Json<CommentOutcome>, AppError> {
    comment_on(state, headers, CommentTarget::Report, report_id, payload).await
}

#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EvidenceOutcome {
    Added { evidence: ResolutionEvidence },
    Gone,
}

pub async fn add_report_evidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(report_id): Path<String>,
    Json(payload): Json<EvidenceRequest>,
) -> Result<Json<EvidenceOutcome>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let image_url = payload.image_url.trim();
    if image_url.is_empty() {
        return Err(AppError::bad_request("evidence requires an image"));
    }
    let outcome = verification::add_resolution_evidence(
        &state.client,
        &report_id,
        &session.nickname,
        image_url,
        payload.description,
    )
    .await?
    .map_or(EvidenceOutcome::Gone, |evidence| EvidenceOutcome::Added {
        evidence,
    });
    Ok(Json(outcome))
}

pub async fn check_report_evidence(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((report_id, index)): Path<(String, usize)>,
) -> Result<Json<CheckOutcome>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let outcome =
        verification::check_evidence(&state.client, &report_id, index, &session.nickname).await?;
    Ok(Json(outcome))
}

pub async fn upload_blob(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    authenticate(&state, &headers).await?;
    if body.is_empty() {
        return Err(AppError::bad_request("image body is empty"));
    }
    if body.len() > MAX_BLOB_BYTES {
        return Err(AppError::bad_request("image must be smaller than 10MB"));
    }
    let extension = query.ext.unwrap_or_else(|| "jpg".to_string());
    let url = state.client.upload_image(&body, &extension).await?;
    Ok((StatusCode::CREATED, Json(UploadResponse { url })))
}

pub async fn get_blob(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state
        .client
        .store()
        .fetch_blob(&name)
        .await?
        .ok_or_else(|| AppError::not_found("blob not found"))?;
    Ok(([(header::CONTENT_TYPE, content_type(&name))], bytes))
}

async fn comment_on(
    state: AppState,
    headers: HeaderMap,
    target: CommentTarget,
    target_id: String,
    payload: CommentRequest,
) -> Result<Json<CommentOutcome>, AppError> {
    let (_, session) = authenticate(&state, &headers).await?;
    let text = comments::normalize_text(&payload.text).map_err(AppError::bad_request)?;
    let outcome =
        comments::add_comment(&state.client, target, &target_id, &session.nickname, text).await?;
    Ok(Json(outcome))
}

/// Reports whose resolution has not been confirmed yet.
fn active_reports(reports: Vec<Report>) -> Vec<Report> {
    reports
        .into_iter()
        .filter(|report| !report.has_confirmed_resolution())
        .collect()
}

fn content_type(name: &str) -> &'static str {
    match name.rsplit('.').next().unwrap_or_default() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        _ => "application/octet-stream",
    }
}

//! services/api/src/web/readings.rs
//!
//! Reading attempts: submission, review, statistics and recording upload.
//! Completing a reading refreshes the weekly progress and the poem statistics.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    response::IntoResponse,
    Extension,
};
use chrono::{Duration, Utc};
use reading_practice_core::domain::{
    Mistake, NewReading, PageRequest, Reading, ReadingFilter, ReadingUpdate, TimeRange, User,
};
use reading_practice_core::policy::ensure_owner_or_admin;
use reading_practice_core::ports::DatabaseService;
use reading_practice_core::progress::{reading_improvement, ReadingStats};
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::response::{created, ok, PageResponse};
use crate::web::state::AppState;
use crate::web::validation::Validator;
use crate::web::views::{
    MistakeInput, ProgressView, ReadingStatsView, ReadingView, SessionPayload,
};

const RECORDINGS_DIR: &str = "recordings";

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct ReadingQuery {
    pub poem_id: Option<Uuid>,
    pub completed: Option<bool>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Restrict to the last N days. All time when absent.
    pub days: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateReadingRequest {
    pub poem_id: Option<Uuid>,
    pub score: Option<f64>,
    /// Seconds.
    pub duration: Option<u32>,
    #[serde(default)]
    pub completed: bool,
    pub feedback: Option<String>,
    #[serde(default)]
    pub mistakes: Vec<MistakeInput>,
    pub session_data: Option<SessionPayload>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReadingRequest {
    pub score: Option<f64>,
    pub duration: Option<u32>,
    pub completed: Option<bool>,
    pub feedback: Option<String>,
    pub mistakes: Option<Vec<MistakeInput>>,
    pub session_data: Option<SessionPayload>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReadingResult {
    pub reading: ReadingView,
    /// Change against the previous completed reading of the same poem, in percent.
    pub improvement_percentage: f64,
    /// The refreshed week, present when the reading is completed.
    pub progress: Option<ProgressView>,
}

fn parse_mistakes(v: &mut Validator, inputs: &[MistakeInput]) -> Vec<Mistake> {
    let mut mistakes = Vec::with_capacity(inputs.len());
    for (i, input) in inputs.iter().enumerate() {
        match input.parse() {
            Some(m) if !m.word.is_empty() => mistakes.push(m),
            _ => {
                v.check(
                    false,
                    &format!("mistakes[{}]", i),
                    "a mistake needs a word, a position >= 0, a type \
                     (pronunciation, fluency, accuracy) and a severity (low, medium, high)",
                );
            }
        }
    }
    mistakes
}

fn check_session(v: &mut Validator, session: Option<&SessionPayload>) {
    if let Some(s) = session {
        v.check(
            s.end_time.map_or(true, |end| end >= s.start_time),
            "sessionData.endTime",
            "endTime must not precede startTime",
        );
    }
}

/// Progress refresh after a completion, plus the per-poem improvement figure.
async fn settle_completion(
    state: &AppState,
    reading: &Reading,
) -> Result<(f64, Option<ProgressView>), ApiError> {
    if !reading.completed {
        return Ok((0.0, None));
    }
    let previous = state
        .db
        .previous_completed_reading(reading.user_id, reading.poem_id, reading.created_at)
        .await?;
    let improvement = reading_improvement(reading, previous.as_ref());
    let progress = state.progress.record_completion(reading).await?;
    Ok((improvement, Some(progress.into())))
}

async fn owned_reading(state: &AppState, user: &User, reading_id: Uuid) -> Result<Reading, ApiError> {
    let reading = state.db.get_reading(reading_id).await?;
    ensure_owner_or_admin(user, reading.user_id)?;
    Ok(reading)
}

/// The signed-in user's readings, newest first.
#[utoipa::path(
    get,
    path = "/api/readings",
    params(ReadingQuery),
    responses((status = 200, description = "A page of readings", body = [ReadingView])),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn list_readings_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<ReadingQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ReadingFilter {
        poem_id: query.poem_id,
        completed: query.completed,
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));
    let readings = state.db.list_readings(user.id, &filter, page).await?;
    Ok(ok(
        "Readings loaded",
        PageResponse::from_page(readings, ReadingView::from),
    ))
}

/// Submit a reading attempt.
#[utoipa::path(
    post,
    path = "/api/readings",
    request_body = CreateReadingRequest,
    responses(
        (status = 201, description = "Reading recorded", body = ReadingResult),
        (status = 400, description = "Invalid data"),
        (status = 404, description = "Poem not found")
    ),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn create_reading_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<CreateReadingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.check(payload.poem_id.is_some(), "poemId", "poemId is required")
        .check(payload.score.is_some(), "score", "score is required")
        .check(payload.duration.is_some(), "duration", "duration is required")
        .range(payload.score, "score", 0.0, 100.0)
        .range(payload.duration, "duration", 1, u32::MAX)
        .length(payload.feedback.as_deref(), "feedback", 0, 1000);
    let mistakes = parse_mistakes(&mut v, &payload.mistakes);
    check_session(&mut v, payload.session_data.as_ref());
    v.finish()?;

    let (Some(poem_id), Some(score), Some(duration)) =
        (payload.poem_id, payload.score, payload.duration)
    else {
        return Err(ApiError::BadRequest("Missing reading fields".to_string()));
    };

    let poem = state.db.get_poem(poem_id).await?;
    if !poem.is_active {
        return Err(ApiError::not_found("Poem"));
    }

    let reading = state
        .db
        .create_reading(NewReading {
            user_id: user.id,
            poem_id,
            score,
            duration_seconds: duration,
            completed: payload.completed,
            feedback: payload
                .feedback
                .map(|f| f.trim().to_string())
                .filter(|f| !f.is_empty()),
            mistakes,
            session: payload.session_data.map(Into::into),
        })
        .await?;
    let (improvement_percentage, progress) = settle_completion(&state, &reading).await?;

    info!(reading_id = %reading.id, poem_id = %poem_id, completed = reading.completed, "Reading recorded");
    Ok(created(
        "Reading recorded",
        ReadingResult {
            reading: reading.into(),
            improvement_percentage,
            progress,
        },
    ))
}

/// Totals over the signed-in user's completed readings.
#[utoipa::path(
    get,
    path = "/api/readings/stats",
    params(StatsQuery),
    responses((status = 200, description = "Reading statistics", body = ReadingStatsView)),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn reading_stats_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    v.range(query.days, "days", 1, 3650);
    v.finish()?;

    let range = TimeRange {
        from: query
            .days
            .map(|days| Utc::now() - Duration::days(i64::from(days))),
        until: None,
    };
    let readings = state.db.completed_readings(user.id, range).await?;
    let stats = ReadingStats::from_readings(&readings);
    Ok(ok("Statistics loaded", ReadingStatsView::from(stats)))
}

#[utoipa::path(
    get,
    path = "/api/readings/{reading_id}",
    params(("reading_id" = Uuid, Path, description = "Reading id")),
    responses(
        (status = 200, description = "The reading", body = ReadingView),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Reading not found")
    ),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn get_reading_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(reading_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let reading = owned_reading(&state, &user, reading_id).await?;
    Ok(ok("Reading loaded", ReadingView::from(reading)))
}

/// Update a reading. Once completed only the feedback may change.
#[utoipa::path(
    put,
    path = "/api/readings/{reading_id}",
    params(("reading_id" = Uuid, Path, description = "Reading id")),
    request_body = UpdateReadingRequest,
    responses(
        (status = 200, description = "Reading updated", body = ReadingResult),
        (status = 400, description = "Invalid data or reading already completed"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Reading not found")
    ),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn update_reading_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(reading_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateReadingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let existing = owned_reading(&state, &user, reading_id).await?;

    let mut v = Validator::new();
    v.range(payload.score, "score", 0.0, 100.0)
        .range(payload.duration, "duration", 1, u32::MAX)
        .length(payload.feedback.as_deref(), "feedback", 0, 1000);
    let mistakes = payload
        .mistakes
        .as_deref()
        .map(|inputs| parse_mistakes(&mut v, inputs));
    check_session(&mut v, payload.session_data.as_ref());
    v.finish()?;

    let update = ReadingUpdate {
        score: payload.score,
        duration_seconds: payload.duration,
        completed: payload.completed,
        feedback: payload.feedback.map(|f| f.trim().to_string()),
        recording_url: None,
        mistakes,
        session: payload.session_data.map(Into::into),
    };
    if existing.completed && !update.touches_only_derived_fields() {
        return Err(ApiError::BadRequest(
            "A completed reading can only have its feedback updated".to_string(),
        ));
    }

    let updated = state.db.update_reading(reading_id, update).await?;
    let (improvement_percentage, progress) = if !existing.completed && updated.completed {
        settle_completion(&state, &updated).await?
    } else {
        (0.0, None)
    };

    Ok(ok(
        "Reading updated",
        ReadingResult {
            reading: updated.into(),
            improvement_percentage,
            progress,
        },
    ))
}

/// Attach an audio recording to one of the caller's readings.
///
/// Accepts a multipart/form-data request with a single file part.
#[utoipa::path(
    post,
    path = "/api/readings/{reading_id}/recording",
    params(("reading_id" = Uuid, Path, description = "Reading id")),
    request_body(content_type = "multipart/form-data", description = "The audio file to upload."),
    responses(
        (status = 200, description = "Recording stored", body = ReadingView),
        (status = 400, description = "Missing, oversized or unsupported file"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Reading not found")
    ),
    security(("bearer" = [])),
    tag = "readings"
)]
pub async fn upload_recording_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(reading_id): AppPath<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let reading = state.db.get_reading(reading_id).await?;
    if reading.user_id != user.id {
        return Err(ApiError::Forbidden(
            "Only the owner may upload a recording".to_string(),
        ));
    }

    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
        .ok_or_else(|| ApiError::field("recording", "Multipart form must include a file"))?;

    let upload = &state.config.upload;
    let content_type = field.content_type().unwrap_or_default().to_string();
    if !upload.allowed_types.iter().any(|t| t == &content_type) {
        return Err(ApiError::field(
            "recording",
            format!("Unsupported file type '{}'", content_type),
        ));
    }
    let extension = field
        .file_name()
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("audio")
        .to_ascii_lowercase();

    let data = field
        .bytes()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if data.is_empty() {
        return Err(ApiError::field("recording", "The uploaded file is empty"));
    }
    if data.len() > upload.max_file_size {
        return Err(ApiError::field(
            "recording",
            format!("File exceeds the {} byte limit", upload.max_file_size),
        ));
    }

    let updated =
        store_recording(state.db.as_ref(), &upload.path, reading_id, &extension, &data).await?;
    Ok(ok("Recording uploaded", ReadingView::from(updated)))
}

/// Writes the file under `upload_dir` and points the reading at it.
/// The file is removed again if the reading cannot be updated.
async fn store_recording(
    db: &dyn DatabaseService,
    upload_dir: &FsPath,
    reading_id: Uuid,
    extension: &str,
    data: &[u8],
) -> Result<Reading, ApiError> {
    let dir = upload_dir.join(RECORDINGS_DIR);
    tokio::fs::create_dir_all(&dir).await?;
    let file_name = format!("{}-{}.{}", reading_id, Uuid::new_v4(), extension);
    let file_path = dir.join(&file_name);
    tokio::fs::write(&file_path, data).await?;
    debug!(reading_id = %reading_id, bytes = data.len(), "Recording stored");

    let update = ReadingUpdate {
        recording_url: Some(format!("/uploads/{}/{}", RECORDINGS_DIR, file_name)),
        ..Default::default()
    };
    match db.update_reading(reading_id, update).await {
        Ok(reading) => Ok(reading),
        Err(e) => {
            if let Err(remove_err) = tokio::fs::remove_file(&file_path).await {
                warn!(
                    path = %file_path.display(),
                    error = %remove_err,
                    "Failed to remove orphaned recording"
                );
            }
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryDatabase;
    use reading_practice_core::ports::PortError;
    use tempfile::tempdir;

    fn recordings(dir: &FsPath) -> usize {
        std::fs::read_dir(dir.join(RECORDINGS_DIR))
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn failed_update_leaves_no_file_behind() {
        let db = InMemoryDatabase::new();
        let dir = tempdir().unwrap();

        let result = store_recording(&db, dir.path(), Uuid::new_v4(), "webm", b"audio").await;
        assert!(matches!(result, Err(ApiError::Port(PortError::NotFound(_)))));
        assert_eq!(recordings(dir.path()), 0);
    }
}

//! services/api/src/web/poems.rs
//!
//! The poem catalogue. Anyone signed in may browse; teachers and admins curate.

use axum::{extract::State, response::IntoResponse, Extension, Json};
use reading_practice_core::domain::{
    Difficulty, Level, NewPoem, PageRequest, Poem, PoemFilter, PoemUpdate, Role, User,
};
use reading_practice_core::policy::ensure_owner_or_admin;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::response::{created, ok, ApiResponse, PageResponse};
use crate::web::state::AppState;
use crate::web::validation::{names, Validator};
use crate::web::views::PoemView;

const MAX_TAGS: usize = 20;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct PoemQuery {
    pub level: Option<String>,
    pub difficulty: Option<String>,
    pub theme: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePoemRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub theme: Option<String>,
    pub level: Option<String>,
    pub difficulty: Option<String>,
    /// Minutes.
    pub duration: Option<u32>,
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePoemRequest {
    pub title: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub theme: Option<String>,
    pub level: Option<String>,
    pub difficulty: Option<String>,
    pub duration: Option<u32>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    trimmed(value).filter(|v| !v.is_empty())
}

/// Length and range rules shared by create and update. Absent fields pass.
struct PoemFields<'a> {
    title: Option<&'a str>,
    author: Option<&'a str>,
    content: Option<&'a str>,
    theme: Option<&'a str>,
    description: Option<&'a str>,
    duration: Option<u32>,
    tags: Option<&'a [String]>,
}

impl PoemFields<'_> {
    fn check(&self, v: &mut Validator) {
        v.length(self.title, "title", 1, 200)
            .length(self.author, "author", 1, 100)
            .length(self.content, "content", 1, 10_000)
            .length(self.theme, "theme", 1, 50)
            .length(self.description, "description", 0, 500)
            .range(self.duration, "duration", 1, 60);
        if let Some(tags) = self.tags {
            v.check(
                tags.len() <= MAX_TAGS,
                "tags",
                format!("at most {} tags are allowed", MAX_TAGS),
            );
            v.check(
                tags.iter().all(|t| t.trim().chars().count() <= 30),
                "tags",
                "each tag must be at most 30 characters",
            );
        }
    }
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Inactive poems stay visible to their creator and to admins only.
async fn visible_poem(state: &AppState, user: &User, poem_id: Uuid) -> Result<Poem, ApiError> {
    let poem = state.db.get_poem(poem_id).await?;
    if !poem.is_active && user.role != Role::Admin && poem.created_by != user.id {
        return Err(ApiError::not_found("Poem"));
    }
    Ok(poem)
}

/// Browse the catalogue.
#[utoipa::path(
    get,
    path = "/api/poems",
    params(PoemQuery),
    responses(
        (status = 200, description = "A page of poems", body = [PoemView]),
        (status = 400, description = "Invalid filter")
    ),
    security(("bearer" = [])),
    tag = "poems"
)]
pub async fn list_poems_handler(
    State(state): State<Arc<AppState>>,
    AppQuery(query): AppQuery<PoemQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    let level = v.parse::<Level>(
        query.level.as_deref(),
        "level",
        &names(Level::ALL, Level::as_str),
    );
    let difficulty = v.parse::<Difficulty>(
        query.difficulty.as_deref(),
        "difficulty",
        &names(Difficulty::ALL, Difficulty::as_str),
    );
    v.finish()?;

    let filter = PoemFilter {
        level,
        difficulty,
        theme: non_blank(query.theme),
        search: non_blank(query.search),
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));
    let poems = state.db.list_poems(&filter, page).await?;
    Ok(ok("Poems loaded", PageResponse::from_page(poems, PoemView::from)))
}

#[utoipa::path(
    get,
    path = "/api/poems/{poem_id}",
    params(("poem_id" = Uuid, Path, description = "Poem id")),
    responses(
        (status = 200, description = "The poem", body = PoemView),
        (status = 404, description = "Poem not found")
    ),
    security(("bearer" = [])),
    tag = "poems"
)]
pub async fn get_poem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(poem_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let poem = visible_poem(&state, &user, poem_id).await?;
    Ok(ok("Poem loaded", PoemView::from(poem)))
}

/// Add a poem to the catalogue. Teachers and admins only.
#[utoipa::path(
    post,
    path = "/api/poems",
    request_body = CreatePoemRequest,
    responses(
        (status = 201, description = "Poem created", body = PoemView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Role not allowed")
    ),
    security(("bearer" = [])),
    tag = "poems"
)]
pub async fn create_poem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<CreatePoemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    for (value, field) in [
        (&payload.title, "title"),
        (&payload.author, "author"),
        (&payload.content, "content"),
        (&payload.theme, "theme"),
        (&payload.level, "level"),
        (&payload.difficulty, "difficulty"),
    ] {
        v.required(value.as_deref(), field);
    }
    v.check(payload.duration.is_some(), "duration", "duration is required");
    PoemFields {
        title: payload.title.as_deref(),
        author: payload.author.as_deref(),
        content: payload.content.as_deref(),
        theme: payload.theme.as_deref(),
        description: payload.description.as_deref(),
        duration: payload.duration,
        tags: Some(&payload.tags),
    }
    .check(&mut v);
    let level = v.parse::<Level>(
        payload.level.as_deref(),
        "level",
        &names(Level::ALL, Level::as_str),
    );
    let difficulty = v.parse::<Difficulty>(
        payload.difficulty.as_deref(),
        "difficulty",
        &names(Difficulty::ALL, Difficulty::as_str),
    );
    v.finish()?;

    let (Some(level), Some(difficulty), Some(duration)) = (level, difficulty, payload.duration)
    else {
        return Err(ApiError::BadRequest("Missing poem fields".to_string()));
    };

    let poem = state
        .db
        .create_poem(NewPoem {
            title: trimmed(payload.title).unwrap_or_default(),
            author: trimmed(payload.author).unwrap_or_default(),
            content: trimmed(payload.content).unwrap_or_default(),
            theme: trimmed(payload.theme).unwrap_or_default(),
            level,
            difficulty,
            duration_minutes: duration,
            description: non_blank(payload.description),
            tags: clean_tags(payload.tags),
            created_by: user.id,
        })
        .await?;

    info!(poem_id = %poem.id, created_by = %user.id, "Poem created");
    Ok(created("Poem created", PoemView::from(poem)))
}

/// Edit a poem. Only its creator or an admin may do so.
#[utoipa::path(
    put,
    path = "/api/poems/{poem_id}",
    params(("poem_id" = Uuid, Path, description = "Poem id")),
    request_body = UpdatePoemRequest,
    responses(
        (status = 200, description = "Poem updated", body = PoemView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Not the creator"),
        (status = 404, description = "Poem not found")
    ),
    security(("bearer" = [])),
    tag = "poems"
)]
pub async fn update_poem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(poem_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdatePoemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let poem = state.db.get_poem(poem_id).await?;
    ensure_owner_or_admin(&user, poem.created_by)?;

    let mut v = Validator::new();
    PoemFields {
        title: payload.title.as_deref(),
        author: payload.author.as_deref(),
        content: payload.content.as_deref(),
        theme: payload.theme.as_deref(),
        description: payload.description.as_deref(),
        duration: payload.duration,
        tags: payload.tags.as_deref(),
    }
    .check(&mut v);
    let level = v.parse::<Level>(
        payload.level.as_deref(),
        "level",
        &names(Level::ALL, Level::as_str),
    );
    let difficulty = v.parse::<Difficulty>(
        payload.difficulty.as_deref(),
        "difficulty",
        &names(Difficulty::ALL, Difficulty::as_str),
    );
    v.finish()?;

    let updated = state
        .db
        .update_poem(
            poem_id,
            PoemUpdate {
                title: trimmed(payload.title),
                author: trimmed(payload.author),
                content: trimmed(payload.content),
                theme: trimmed(payload.theme),
                level,
                difficulty,
                duration_minutes: payload.duration,
                description: trimmed(payload.description),
                tags: payload.tags.map(clean_tags),
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(ok("Poem updated", PoemView::from(updated)))
}

/// Withdraw a poem from the catalogue. Readings that reference it are kept.
#[utoipa::path(
    delete,
    path = "/api/poems/{poem_id}",
    params(("poem_id" = Uuid, Path, description = "Poem id")),
    responses(
        (status = 200, description = "Poem withdrawn"),
        (status = 403, description = "Not the creator"),
        (status = 404, description = "Poem not found")
    ),
    security(("bearer" = [])),
    tag = "poems"
)]
pub async fn delete_poem_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(poem_id): AppPath<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let poem = state.db.get_poem(poem_id).await?;
    ensure_owner_or_admin(&user, poem.created_by)?;
    state
        .db
        .update_poem(
            poem_id,
            PoemUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    info!(poem_id = %poem_id, "Poem withdrawn");
    Ok(ApiResponse::done("Poem deleted"))
}

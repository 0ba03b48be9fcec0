//! services/api/src/web/favorites.rs
//!
//! Per-user favorite poems. Adding is a toggle: posting a favorite twice
//! leaves the user where they started.

use axum::{extract::State, response::IntoResponse, Extension};
use reading_practice_core::domain::{PageRequest, User};
use reading_practice_core::ports::PortError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::response::{ok, PageResponse};
use crate::web::state::AppState;
use crate::web::views::{FavoriteStatus, FavoriteView};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FavoriteQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleFavoriteRequest {
    pub poem_id: Option<Uuid>,
}

#[utoipa::path(
    get,
    path = "/api/favorites",
    params(FavoriteQuery),
    responses((status = 200, description = "A page of favorite poems", body = [FavoriteView])),
    security(("bearer" = [])),
    tag = "favorites"
)]
pub async fn list_favorites_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<FavoriteQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));
    let favorites = state.db.list_favorites(user.id, page).await?;
    Ok(ok(
        "Favorites loaded",
        PageResponse::from_page(favorites, FavoriteView::from),
    ))
}

/// Add the poem to favorites, or remove it if it is already there.
#[utoipa::path(
    post,
    path = "/api/favorites",
    request_body = ToggleFavoriteRequest,
    responses(
        (status = 200, description = "New favorite state", body = FavoriteStatus),
        (status = 400, description = "poemId missing"),
        (status = 404, description = "Poem not found")
    ),
    security(("bearer" = [])),
    tag = "favorites"
)]
pub async fn toggle_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<ToggleFavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let poem_id = payload
        .poem_id
        .ok_or_else(|| ApiError::field("poemId", "poemId is required"))?;
    state.db.get_poem(poem_id).await?;

    let (is_favorite, message) = if state.db.find_favorite(user.id, poem_id).await?.is_some() {
        state.db.remove_favorite(user.id, poem_id).await?;
        (false, "Removed from favorites")
    } else {
        match state.db.add_favorite(user.id, poem_id).await {
            // A concurrent toggle already inserted it.
            Ok(_) | Err(PortError::Conflict(_)) => (true, "Added to favorites"),
            Err(e) => return Err(e.into()),
        }
    };
    debug!(user_id = %user.id, poem_id = %poem_id, is_favorite, "Favorite toggled");
    Ok(ok(
        message,
        FavoriteStatus {
            poem_id,
            is_favorite,
        },
    ))
}

#[utoipa::path(
    delete,
    path = "/api/favorites/{poem_id}",
    params(("poem_id" = Uuid, Path, description = "Poem id")),
    responses(
        (status = 200, description = "Removed", body = FavoriteStatus),
        (status = 404, description = "Not a favorite")
    ),
    security(("bearer" = [])),
    tag = "favorites"
)]
pub async fn remove_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(poem_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.db.remove_favorite(user.id, poem_id).await? {
        return Err(ApiError::not_found("Favorite"));
    }
    Ok(ok(
        "Removed from favorites",
        FavoriteStatus {
            poem_id,
            is_favorite: false,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/api/favorites/check/{poem_id}",
    params(("poem_id" = Uuid, Path, description = "Poem id")),
    responses((status = 200, description = "Favorite state", body = FavoriteStatus)),
    security(("bearer" = [])),
    tag = "favorites"
)]
pub async fn check_favorite_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(poem_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let is_favorite = state.db.find_favorite(user.id, poem_id).await?.is_some();
    Ok(ok(
        "Favorite state loaded",
        FavoriteStatus {
            poem_id,
            is_favorite,
        },
    ))
}

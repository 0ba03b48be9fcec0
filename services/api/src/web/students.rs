//! services/api/src/web/students.rs
//!
//! Roster management. Teachers act on the students of their own class,
//! admins on every student.

use axum::{extract::State, response::IntoResponse, Extension};
use reading_practice_core::domain::{
    Level, NewUser, PageRequest, Role, StudentFilter, User, UserUpdate,
};
use reading_practice_core::policy::ensure_same_class_or_admin;
use reading_practice_core::ports::PortError;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::ApiError;
use crate::security::hash_password;
use crate::web::extract::{AppJson, AppPath, AppQuery};
use crate::web::response::{created, ok, PageResponse};
use crate::web::state::AppState;
use crate::web::validation::{names, normalize_email, Validator, MIN_PASSWORD_LEN};
use crate::web::views::UserView;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    /// Admins only; teachers are pinned to their own class.
    pub class_id: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_inactive: bool,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub level: Option<String>,
    /// Admins only; a teacher's students join the teacher's class.
    pub class_id: Option<String>,
}

#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    pub name: Option<String>,
    pub level: Option<String>,
    pub avatar: Option<String>,
    pub is_active: Option<bool>,
    /// Admins only.
    pub class_id: Option<String>,
}

/// The class a teacher manages. Admins are not pinned to one.
fn managed_class(user: &User) -> Result<Option<String>, ApiError> {
    match user.role {
        Role::Admin => Ok(None),
        _ => user
            .class_id
            .clone()
            .map(Some)
            .ok_or_else(|| ApiError::Forbidden("No class is assigned to this account".to_string())),
    }
}

async fn managed_student(state: &AppState, user: &User, student_id: Uuid) -> Result<User, ApiError> {
    let student = match state.db.get_user_by_id(student_id).await {
        Ok(u) if u.role == Role::Student => u,
        Ok(_) | Err(PortError::NotFound(_)) => return Err(ApiError::not_found("Student")),
        Err(e) => return Err(e.into()),
    };
    ensure_same_class_or_admin(user, &student)?;
    Ok(student)
}

fn class_field(v: &mut Validator, user: &User, class_id: Option<&str>) {
    v.check(
        class_id.is_none() || user.role == Role::Admin,
        "classId",
        "only an admin may assign a class",
    );
}

#[utoipa::path(
    get,
    path = "/api/users/students",
    params(StudentQuery),
    responses(
        (status = 200, description = "A page of students", body = [UserView]),
        (status = 403, description = "Not a teacher or admin")
    ),
    security(("bearer" = [])),
    tag = "students"
)]
pub async fn list_students_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppQuery(query): AppQuery<StudentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let class_id = match managed_class(&user)? {
        Some(own) => Some(own),
        None => query.class_id.filter(|c| !c.trim().is_empty()),
    };
    let filter = StudentFilter {
        class_id,
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        include_inactive: query.include_inactive,
    };
    let page = PageRequest::new(query.page.unwrap_or(1), query.limit.unwrap_or(10));
    let students = state.db.list_students(&filter, page).await?;
    Ok(ok(
        "Students loaded",
        PageResponse::from_page(students, UserView::from),
    ))
}

/// Create a student account.
#[utoipa::path(
    post,
    path = "/api/users/students",
    request_body = CreateStudentRequest,
    responses(
        (status = 201, description = "Student created", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Not a teacher or admin"),
        (status = 409, description = "Email already registered")
    ),
    security(("bearer" = [])),
    tag = "students"
)]
pub async fn create_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppJson(payload): AppJson<CreateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let own_class = managed_class(&user)?;

    let mut v = Validator::new();
    v.required(payload.email.as_deref(), "email")
        .email(payload.email.as_deref(), "email")
        .required(payload.password.as_deref(), "password")
        .required(payload.name.as_deref(), "name")
        .length(payload.name.as_deref(), "name", 2, 100);
    if let Some(password) = payload.password.as_deref() {
        v.check(
            password.chars().count() >= MIN_PASSWORD_LEN,
            "password",
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
        );
    }
    class_field(&mut v, &user, payload.class_id.as_deref());
    let level: Option<Level> =
        v.parse(payload.level.as_deref(), "level", &names(Level::ALL, Level::as_str));
    v.finish()?;

    let (Some(email), Some(password), Some(name)) = (payload.email, payload.password, payload.name)
    else {
        return Err(ApiError::BadRequest("Missing student fields".to_string()));
    };

    let student = state
        .db
        .create_user(NewUser {
            email: normalize_email(&email),
            hashed_password: hash_password(&password)?,
            name: name.trim().to_string(),
            role: Role::Student,
            level: level.unwrap_or(Level::Beginner),
            class_id: own_class.or(payload.class_id),
        })
        .await
        .map_err(|e| match e {
            PortError::Conflict(_) => {
                ApiError::Conflict("A user with this email already exists".to_string())
            }
            other => other.into(),
        })?;

    info!(student_id = %student.id, created_by = %user.id, "Student created");
    Ok(created("Student created", UserView::from(student)))
}

#[utoipa::path(
    put,
    path = "/api/users/students/{user_id}",
    params(("user_id" = Uuid, Path, description = "Student id")),
    request_body = UpdateStudentRequest,
    responses(
        (status = 200, description = "Student updated", body = UserView),
        (status = 400, description = "Invalid data"),
        (status = 403, description = "Student of another class"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer" = [])),
    tag = "students"
)]
pub async fn update_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(student_id): AppPath<Uuid>,
    AppJson(payload): AppJson<UpdateStudentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    managed_student(&state, &user, student_id).await?;

    let mut v = Validator::new();
    v.length(payload.name.as_deref(), "name", 2, 100)
        .length(payload.avatar.as_deref(), "avatar", 1, 500);
    class_field(&mut v, &user, payload.class_id.as_deref());
    let level: Option<Level> =
        v.parse(payload.level.as_deref(), "level", &names(Level::ALL, Level::as_str));
    v.finish()?;

    let updated = state
        .db
        .update_user(
            student_id,
            UserUpdate {
                name: payload.name.map(|n| n.trim().to_string()),
                level,
                class_id: payload.class_id.map(|c| c.trim().to_string()),
                avatar: payload.avatar.map(|a| a.trim().to_string()),
                is_active: payload.is_active,
            },
        )
        .await?;
    Ok(ok("Student updated", UserView::from(updated)))
}

/// Deactivate a student. Their readings and progress are kept.
#[utoipa::path(
    delete,
    path = "/api/users/students/{user_id}",
    params(("user_id" = Uuid, Path, description = "Student id")),
    responses(
        (status = 200, description = "Student deactivated", body = UserView),
        (status = 403, description = "Student of another class"),
        (status = 404, description = "Student not found")
    ),
    security(("bearer" = [])),
    tag = "students"
)]
pub async fn deactivate_student_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    AppPath(student_id): AppPath<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    managed_student(&state, &user, student_id).await?;
    let updated = state
        .db
        .update_user(
            student_id,
            UserUpdate {
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await?;
    info!(student_id = %student_id, by = %user.id, "Student deactivated");
    Ok(ok("Student deactivated", UserView::from(updated)))
}

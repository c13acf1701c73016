use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, DatabaseError, ResourceTyped, check_access,
        entity::{Lesson, LessonCreate},
    },
    web::{
        ApiResponse, AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::lessons::LessonResponse,
        error::ErrorResponse,
        routes::courses::{fetch_visible_course, manages_course},
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", post(lesson_create_handler))
        .route(
            "/{id}",
            get(lesson_get_handler)
                .put(lesson_update_handler)
                .delete(lesson_delete_handler),
        )
        .with_state(state)
}

fn lesson_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(Lesson::get_resource_type(), e)
}

fn bad_lesson<S: Into<String>>(reason: S) -> WebError {
    WebError::resource_bad_request(Lesson::get_resource_type(), reason)
}

async fn fetch_lesson(state: &AppState, actor: &AuthenticatedUser, id: Uuid) -> WebResult<Lesson> {
    Lesson::find_by_id(state.pool(), actor, id)
        .await
        .map_err(lesson_error)?
        .ok_or(WebError::resource_not_found(Lesson::get_resource_type()))
}

#[utoipa::path(
    post,
    path = "/api/lessons",
    description = "Adds a lesson to a course. Appended at the end when order_index is missing",
    request_body = LessonCreate,
    responses(
        (status = 201, description = "Lesson created", body = ApiResponse<Lesson>),
        (status = 400, description = "Invalid lesson", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 409, description = "Position already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "lessons",
    security(
        ("cookie" = [])
    )
)]
pub async fn lesson_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<LessonCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, payload.course_id).await?;

    if !manages_course(state.pool(), user, &course).await? {
        return Err(WebError::resource_forbidden(Lesson::get_resource_type()));
    }
    payload.validate().map_err(bad_lesson)?;

    let lesson = Lesson::create(state.pool(), user, payload)
        .await
        .map_err(lesson_error)?;

    Ok(ApiResponse::with_message(lesson, "Lesson created").created())
}

#[utoipa::path(
    get,
    path = "/api/lessons/{id}",
    description = "A lesson with links to its published neighbours",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Lesson found", body = ApiResponse<LessonResponse>),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "lessons"
)]
pub async fn lesson_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let actor = ctx.actor();
    let lesson = fetch_lesson(&state, &actor, id).await?;
    let course = fetch_visible_course(state.pool(), &actor, lesson.course_id())
        .await
        .map_err(|_| WebError::resource_not_found(Lesson::get_resource_type()))?;

    if !lesson.is_published() && !manages_course(state.pool(), &actor, &course).await? {
        return Err(WebError::resource_not_found(Lesson::get_resource_type()));
    }

    let navigation = lesson.neighbors(state.pool()).await.map_err(lesson_error)?;
    Ok(ApiResponse::ok(LessonResponse { lesson, navigation }))
}

#[utoipa::path(
    put,
    path = "/api/lessons/{id}",
    description = "Replaces a lesson. The course's instructor or an admin",
    params(("id" = Uuid, Path, description = "Lesson id")),
    request_body = LessonCreate,
    responses(
        (status = 200, description = "Lesson updated", body = ApiResponse<Lesson>),
        (status = 400, description = "Invalid lesson", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 409, description = "Position already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "lessons",
    security(
        ("cookie" = [])
    )
)]
pub async fn lesson_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LessonCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let lesson = fetch_lesson(&state, user, id).await?;

    check_access(state.pool(), user, &lesson, Some(user.user_id()))
        .await
        .map_err(lesson_error)?;
    if payload.course_id != lesson.course_id() {
        return Err(bad_lesson("a lesson cannot move to another course"));
    }
    payload.validate().map_err(bad_lesson)?;

    let updated = lesson
        .update(state.pool(), user, payload)
        .await
        .map_err(lesson_error)?;

    Ok(ApiResponse::with_message(updated, "Lesson updated"))
}

#[utoipa::path(
    delete,
    path = "/api/lessons/{id}",
    description = "Deletes a lesson. The course's instructor or an admin",
    params(("id" = Uuid, Path, description = "Lesson id")),
    responses(
        (status = 200, description = "Lesson deleted"),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "lessons",
    security(
        ("cookie" = [])
    )
)]
pub async fn lesson_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let lesson = fetch_lesson(&state, user, id).await?;

    check_access(state.pool(), user, &lesson, Some(user.user_id()))
        .await
        .map_err(lesson_error)?;

    lesson.delete(state.pool(), user).await.map_err(lesson_error)?;
    Ok(ApiResponse::with_message((), "Lesson deleted"))
}

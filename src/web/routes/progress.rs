use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    game::LessonCompletion,
    model::{
        CrudRepository, DatabaseError, Page, PageRequest, PaginatableRepository, ResourceTyped,
        entity::{Lesson, UserProgress},
    },
    web::{
        ApiResponse, AppState, RequestContext, WebError, WebResult,
        dto::progress::{CompleteLessonBody, CompletionResponse, ProgressResponse},
        error::ErrorResponse,
        routes::{
            PaginationQuery,
            courses::{fetch_visible_course, manages_course},
        },
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(progress_list_handler))
        .route("/courses/{course_id}", get(progress_course_handler))
        .route(
            "/lessons/{lesson_id}/complete",
            post(progress_complete_lesson_handler),
        )
        .with_state(state)
}

fn progress_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(UserProgress::get_resource_type(), e)
}

#[utoipa::path(
    get,
    path = "/api/progress",
    description = "The caller's progress in every course they are enrolled in",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Page of progress records", body = ApiResponse<Page<ProgressResponse>>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(
        ("cookie" = [])
    )
)]
pub async fn progress_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let page = UserProgress::page(state.pool(), user, PageRequest::from(pagination))
        .await
        .map_err(progress_error)?;

    let course_ids: Vec<Uuid> = page.items.iter().map(|p| p.course_id()).collect();
    let published = Lesson::published_ids_by_course(state.pool(), &course_ids)
        .await
        .map_err(progress_error)?;

    let items: Vec<ProgressResponse> = page
        .items
        .into_iter()
        .map(|progress| {
            let ids = published.get(&progress.course_id()).map(Vec::as_slice).unwrap_or(&[]);
            ProgressResponse::new(progress, ids)
        })
        .collect();

    Ok(ApiResponse::ok(Page {
        items,
        total: page.total,
        page: page.page,
        limit: page.limit,
        pages: page.pages,
    }))
}

#[utoipa::path(
    get,
    path = "/api/progress/courses/{course_id}",
    description = "The caller's progress in one course",
    params(("course_id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Progress record", body = ApiResponse<ProgressResponse>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Not enrolled", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(
        ("cookie" = [])
    )
)]
pub async fn progress_course_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(course_id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let (progress, published) = tokio::try_join!(
        UserProgress::find_for(state.pool(), user.user_id(), course_id),
        Lesson::published_ids(state.pool(), course_id),
    )
    .map_err(progress_error)?;

    let progress =
        progress.ok_or(WebError::resource_not_found(UserProgress::get_resource_type()))?;

    Ok(ApiResponse::ok(ProgressResponse::new(progress, &published)))
}

#[utoipa::path(
    post,
    path = "/api/progress/lessons/{lesson_id}/complete",
    description = "Marks a lesson complete, enrolling the caller when needed. \
                   XP is credited on the first completion only",
    params(("lesson_id" = Uuid, Path, description = "Lesson id")),
    request_body = CompleteLessonBody,
    responses(
        (status = 200, description = "Completion recorded", body = ApiResponse<CompletionResponse>),
        (status = 400, description = "Invalid score or time", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Lesson not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "progress",
    security(
        ("cookie" = [])
    )
)]
pub async fn progress_complete_lesson_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(lesson_id): Path<Uuid>,
    Json(payload): Json<CompleteLessonBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    payload.validate().map_err(|reason| {
        WebError::resource_bad_request(UserProgress::get_resource_type(), reason)
    })?;

    let lesson_missing = || WebError::resource_not_found(Lesson::get_resource_type());
    let lesson = Lesson::find_by_id(state.pool(), user, lesson_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?
        .ok_or_else(lesson_missing)?;
    let course = fetch_visible_course(state.pool(), user, lesson.course_id())
        .await
        .map_err(|_| lesson_missing())?;

    // drafts are visible to managers but never count toward progress
    if !lesson.is_published() {
        return if manages_course(state.pool(), user, &course).await? {
            Err(WebError::resource_bad_request(
                Lesson::get_resource_type(),
                "draft lessons cannot be completed",
            ))
        } else {
            Err(lesson_missing())
        };
    }
    if !(course.is_published() && course.is_active()) {
        return Err(WebError::resource_bad_request(
            UserProgress::get_resource_type(),
            "course is not open yet",
        ));
    }

    let outcome = UserProgress::complete_lesson(
        state.pool(),
        user.user_id(),
        &lesson,
        &course,
        payload.score.unwrap_or(100),
        payload.time_spent.unwrap_or(0),
    )
    .await
    .map_err(progress_error)?;

    let published = Lesson::published_ids(state.pool(), course.id())
        .await
        .map_err(progress_error)?;

    let message = if outcome.course_completed {
        "Course completed"
    } else {
        "Lesson completed"
    };
    let response = CompletionResponse {
        progress: ProgressResponse::new(outcome.progress, &published),
        first_completion: outcome.completion == LessonCompletion::First,
        course_completed: outcome.course_completed,
        xp_earned: outcome.xp_earned,
        level_up: outcome.xp.as_ref().is_some_and(|xp| xp.leveled_up()),
        xp: outcome.xp,
    };

    Ok(ApiResponse::with_message(response, message))
}

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, DatabaseError, ModelManager, ResourceTyped, check_access,
        entity::{Lesson, Quiz, QuizAttempt, QuizCreate, QuizStats},
    },
    web::{
        ApiResponse, AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::quizzes::{QuizView, SubmitBody, SubmitResponse},
        error::ErrorResponse,
        routes::courses::{fetch_visible_course, manages_course},
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", post(quiz_create_handler))
        .route(
            "/{id}",
            get(quiz_get_handler)
                .put(quiz_update_handler)
                .delete(quiz_delete_handler),
        )
        .route("/{id}/submit", post(quiz_submit_handler))
        .route("/{id}/attempts", get(quiz_attempts_handler))
        .route("/{id}/stats", get(quiz_stats_handler))
        .with_state(state)
}

fn quiz_error(e: DatabaseError) -> WebError {
    WebError::resource_fetch_error(Quiz::get_resource_type(), e)
}

fn bad_quiz<S: Into<String>>(reason: S) -> WebError {
    WebError::resource_bad_request(Quiz::get_resource_type(), reason)
}

fn not_found() -> WebError {
    WebError::resource_not_found(Quiz::get_resource_type())
}

/// The quiz and whether `actor` manages its course. Drafts and quizzes of
/// hidden courses read as missing for everyone else.
async fn fetch_visible_quiz(
    mm: &ModelManager,
    actor: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<(Quiz, bool)> {
    let quiz = Quiz::find_by_id(mm, actor, id)
        .await
        .map_err(quiz_error)?
        .ok_or_else(not_found)?;
    let course = fetch_visible_course(mm, actor, quiz.course_id())
        .await
        .map_err(|_| not_found())?;
    let manager = manages_course(mm, actor, &course).await?;

    if !quiz.is_published() && !manager {
        return Err(not_found());
    }
    Ok((quiz, manager))
}

/// A quiz may hang off a lesson of its own course only.
async fn check_lesson(mm: &ModelManager, data: &QuizCreate) -> WebResult<()> {
    let Some(lesson_id) = data.lesson_id else {
        return Ok(());
    };

    let lesson = Lesson::find_by_id(mm, &AuthenticatedUser::admin(), lesson_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;

    match lesson {
        Some(lesson) if lesson.course_id() == data.course_id => Ok(()),
        _ => Err(bad_quiz("lesson_id must point at a lesson of the same course")),
    }
}

#[utoipa::path(
    post,
    path = "/api/quiz",
    description = "Creates a quiz for a course. The course's instructor or an admin",
    request_body = QuizCreate,
    responses(
        (status = 201, description = "Quiz created", body = ApiResponse<QuizView>),
        (status = 400, description = "Invalid quiz", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<QuizCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, payload.course_id).await?;

    if !manages_course(state.pool(), user, &course).await? {
        return Err(WebError::resource_forbidden(Quiz::get_resource_type()));
    }
    payload.validate().map_err(bad_quiz)?;
    check_lesson(state.pool(), &payload).await?;

    let quiz = Quiz::create(state.pool(), user, payload)
        .await
        .map_err(quiz_error)?;

    Ok(ApiResponse::with_message(QuizView::new(&quiz, true), "Quiz created").created())
}

#[utoipa::path(
    get,
    path = "/api/quiz/{id}",
    description = "A quiz. Correct answers are included only for the course's managers",
    params(("id" = Uuid, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Quiz found", body = ApiResponse<QuizView>),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz"
)]
pub async fn quiz_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let (quiz, manager) = fetch_visible_quiz(state.pool(), &ctx.actor(), id).await?;
    Ok(ApiResponse::ok(QuizView::new(&quiz, manager)))
}

#[utoipa::path(
    put,
    path = "/api/quiz/{id}",
    description = "Replaces a quiz. The course's instructor or an admin",
    params(("id" = Uuid, Path, description = "Quiz id")),
    request_body = QuizCreate,
    responses(
        (status = 200, description = "Quiz updated", body = ApiResponse<QuizView>),
        (status = 400, description = "Invalid quiz", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<QuizCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let quiz = Quiz::find_by_id(state.pool(), user, id)
        .await
        .map_err(quiz_error)?
        .ok_or_else(not_found)?;

    check_access(state.pool(), user, &quiz, Some(user.user_id()))
        .await
        .map_err(quiz_error)?;
    if payload.course_id != quiz.course_id() {
        return Err(bad_quiz("a quiz cannot move to another course"));
    }
    payload.validate().map_err(bad_quiz)?;
    check_lesson(state.pool(), &payload).await?;

    let updated = quiz
        .update(state.pool(), user, payload)
        .await
        .map_err(quiz_error)?;

    Ok(ApiResponse::with_message(QuizView::new(&updated, true), "Quiz updated"))
}

#[utoipa::path(
    delete,
    path = "/api/quiz/{id}",
    description = "Deletes a quiz with its attempts. The course's instructor or an admin",
    params(("id" = Uuid, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Quiz deleted"),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let quiz = Quiz::find_by_id(state.pool(), user, id)
        .await
        .map_err(quiz_error)?
        .ok_or_else(not_found)?;

    check_access(state.pool(), user, &quiz, Some(user.user_id()))
        .await
        .map_err(quiz_error)?;

    quiz.delete(state.pool(), user).await.map_err(quiz_error)?;
    Ok(ApiResponse::with_message((), "Quiz deleted"))
}

#[utoipa::path(
    post,
    path = "/api/quiz/{id}/submit",
    description = "Grades a submission. XP is credited on the first passing attempt only",
    params(("id" = Uuid, Path, description = "Quiz id")),
    request_body = SubmitBody,
    responses(
        (status = 201, description = "Attempt graded", body = ApiResponse<SubmitResponse>),
        (status = 400, description = "Invalid submission or no attempts left", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_submit_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (quiz, _) = fetch_visible_quiz(state.pool(), user, id).await?;

    if payload.time_spent < 0 {
        return Err(bad_quiz("time_spent cannot be negative"));
    }

    let submission = QuizAttempt::submit(
        state.pool(),
        &quiz,
        user.user_id(),
        payload.answers,
        payload.time_spent,
    )
    .await
    .map_err(|e| WebError::resource_fetch_error(QuizAttempt::get_resource_type(), e))?;

    let attempt = submission.attempt;
    tracing::debug!(
        "user {} scored {} on quiz {} (attempt {})",
        user.user_id(),
        attempt.score(),
        quiz.id(),
        attempt.attempt_number()
    );

    let message = if attempt.passed() {
        "Quiz passed"
    } else {
        "Quiz not passed"
    };
    let response = SubmitResponse {
        level_up: submission.xp.as_ref().is_some_and(|xp| xp.leveled_up()),
        xp: submission.xp,
        attempt,
    };

    Ok(ApiResponse::with_message(response, message).created())
}

#[utoipa::path(
    get,
    path = "/api/quiz/{id}/attempts",
    description = "The caller's attempts at a quiz, latest first",
    params(("id" = Uuid, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Attempts", body = ApiResponse<Vec<QuizAttempt>>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_attempts_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (quiz, _) = fetch_visible_quiz(state.pool(), user, id).await?;

    let attempts = QuizAttempt::all_for_user(state.pool(), quiz.id(), user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(QuizAttempt::get_resource_type(), e))?;

    Ok(ApiResponse::ok(attempts))
}

#[utoipa::path(
    get,
    path = "/api/quiz/{id}/stats",
    description = "Attempt aggregates of a quiz. The course's instructor or an admin",
    params(("id" = Uuid, Path, description = "Quiz id")),
    responses(
        (status = 200, description = "Quiz stats", body = ApiResponse<QuizStats>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Quiz not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "quiz",
    security(
        ("cookie" = [])
    )
)]
pub async fn quiz_stats_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let (quiz, manager) = fetch_visible_quiz(state.pool(), user, id).await?;

    if !manager {
        return Err(WebError::resource_forbidden(Quiz::get_resource_type()));
    }

    let stats = QuizStats::collect(state.pool(), quiz.id())
        .await
        .map_err(quiz_error)?;

    Ok(ApiResponse::ok(stats))
}

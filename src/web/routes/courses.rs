use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    model::{
        CrudRepository, ModelManager, Page, PageRequest, ResourceTyped, can_manage, check_access,
        entity::{
            Course, CourseCreate, CourseFilter, CourseStats, Lesson, Quiz, Review, ReviewCreate,
            UserProgress,
        },
    },
    web::{
        ApiResponse, AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::{
            courses::{EnrollResponse, ReviewBody},
            quizzes::QuizView,
        },
        error::ErrorResponse,
        routes::PaginationQuery,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(courses_list_handler).post(course_create_handler))
        .route(
            "/{id}",
            get(course_get_handler)
                .put(course_update_handler)
                .delete(course_delete_handler),
        )
        .route("/{id}/enroll", post(course_enroll_handler))
        .route("/{id}/lessons", get(course_lessons_handler))
        .route("/{id}/quizzes", get(course_quizzes_handler))
        .route("/{id}/stats", get(course_stats_handler))
        .route(
            "/{id}/reviews",
            get(course_reviews_handler).post(course_review_handler),
        )
        .route(
            "/{id}/reviews/{review_id}",
            delete(course_review_delete_handler),
        )
        .with_state(state)
}

fn course_error(e: crate::model::DatabaseError) -> WebError {
    WebError::resource_fetch_error(Course::get_resource_type(), e)
}

/// Drafts of other instructors read as missing rather than forbidden.
pub(super) async fn fetch_visible_course(
    mm: &ModelManager,
    actor: &AuthenticatedUser,
    id: Uuid,
) -> WebResult<Course> {
    Course::find_by_id(mm, actor, id)
        .await
        .map_err(course_error)?
        .filter(|course| course.is_visible_to(actor))
        .ok_or(WebError::resource_not_found(Course::get_resource_type()))
}

/// Admins and the course's instructor.
pub(super) async fn manages_course(
    mm: &ModelManager,
    actor: &AuthenticatedUser,
    course: &Course,
) -> WebResult<bool> {
    can_manage(mm, actor, course, Some(actor.user_id()))
        .await
        .map_err(course_error)
}

fn ensure_open(course: &Course) -> WebResult<()> {
    if course.is_published() && course.is_active() {
        Ok(())
    } else {
        Err(WebError::resource_bad_request(
            Course::get_resource_type(),
            "course is not open yet",
        ))
    }
}

#[utoipa::path(
    get,
    path = "/api/courses",
    description = "Lists visible courses with optional filters, sorting and pagination",
    params(CourseFilter, PaginationQuery),
    responses(
        (status = 200, description = "Page of courses", body = ApiResponse<Page<Course>>),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
pub async fn courses_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(filter): Query<CourseFilter>,
    Query(pagination): Query<PaginationQuery>,
) -> WebResult<impl IntoResponse> {
    let actor = ctx.actor();
    let page = Course::search_page(state.pool(), &actor, &filter, PageRequest::from(pagination))
        .await
        .map_err(course_error)?;

    Ok(ApiResponse::ok(page))
}

#[utoipa::path(
    post,
    path = "/api/courses",
    description = "Creates a course owned by the caller. Instructors and admins",
    request_body = CourseCreate,
    responses(
        (status = 201, description = "Course created", body = ApiResponse<Course>),
        (status = 400, description = "Invalid course", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Students cannot author courses", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_create_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !user.can_author() {
        return Err(WebError::resource_forbidden(Course::get_resource_type()));
    }
    payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request(Course::get_resource_type(), reason))?;

    let course = Course::create(state.pool(), user, payload)
        .await
        .map_err(course_error)?;

    tracing::info!("user {} created course `{}`", user.user_id(), course.title());
    Ok(ApiResponse::with_message(course, "Course created").created())
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course found", body = ApiResponse<Course>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
pub async fn course_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let course = fetch_visible_course(state.pool(), &ctx.actor(), id).await?;
    Ok(ApiResponse::ok(course))
}

#[utoipa::path(
    put,
    path = "/api/courses/{id}",
    description = "Replaces a course. Its instructor or an admin",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = CourseCreate,
    responses(
        (status = 200, description = "Course updated", body = ApiResponse<Course>),
        (status = 400, description = "Invalid course", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CourseCreate>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, id).await?;

    check_access(state.pool(), user, &course, Some(user.user_id()))
        .await
        .map_err(course_error)?;
    payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request(Course::get_resource_type(), reason))?;

    let updated = course
        .update(state.pool(), user, payload)
        .await
        .map_err(course_error)?;

    Ok(ApiResponse::with_message(updated, "Course updated"))
}

#[utoipa::path(
    delete,
    path = "/api/courses/{id}",
    description = "Deletes a course with its lessons, quizzes, reviews and progress. Its instructor or an admin",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course deleted"),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the course's instructor", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, id).await?;

    check_access(state.pool(), user, &course, Some(user.user_id()))
        .await
        .map_err(course_error)?;

    let title = course.title().to_string();
    course.delete(state.pool(), user).await.map_err(course_error)?;

    tracing::info!("user {} deleted course `{}`", user.user_id(), title);
    Ok(ApiResponse::with_message((), "Course deleted"))
}

#[utoipa::path(
    post,
    path = "/api/courses/{id}/enroll",
    description = "Enrolls the caller. Enrolling twice returns the existing record",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Enrolled", body = ApiResponse<EnrollResponse>),
        (status = 400, description = "Course is not published", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_enroll_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, id).await?;
    ensure_open(&course)?;

    let (progress, newly_enrolled) = UserProgress::enroll(state.pool(), user.user_id(), course.id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserProgress::get_resource_type(), e))?;

    let message = if newly_enrolled {
        "Enrolled"
    } else {
        "Already enrolled"
    };
    Ok(ApiResponse::with_message(
        EnrollResponse {
            progress,
            newly_enrolled,
        },
        message,
    ))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}/lessons",
    description = "Lessons in reading order. Drafts are listed only for the course's managers",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Lessons of the course", body = ApiResponse<Vec<Lesson>>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
pub async fn course_lessons_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let actor = ctx.actor();
    let course = fetch_visible_course(state.pool(), &actor, id).await?;
    let manager = manages_course(state.pool(), &actor, &course).await?;

    let lessons = Lesson::all_by_course(state.pool(), course.id(), !manager)
        .await
        .map_err(|e| WebError::resource_fetch_error(Lesson::get_resource_type(), e))?;

    Ok(ApiResponse::ok(lessons))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}/quizzes",
    description = "Quizzes of the course. Correct answers are included only for its managers",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Quizzes of the course", body = ApiResponse<Vec<QuizView>>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
pub async fn course_quizzes_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let actor = ctx.actor();
    let course = fetch_visible_course(state.pool(), &actor, id).await?;
    let manager = manages_course(state.pool(), &actor, &course).await?;

    let quizzes = Quiz::all_by_course(state.pool(), course.id(), !manager)
        .await
        .map_err(|e| WebError::resource_fetch_error(Quiz::get_resource_type(), e))?;

    let views: Vec<QuizView> = quizzes.iter().map(|q| QuizView::new(q, manager)).collect();
    Ok(ApiResponse::ok(views))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}/stats",
    description = "Enrolment, completion, rating and quiz aggregates of a course",
    params(("id" = Uuid, Path, description = "Course id")),
    responses(
        (status = 200, description = "Course stats", body = ApiResponse<CourseStats>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "courses"
)]
pub async fn course_stats_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let course = fetch_visible_course(state.pool(), &ctx.actor(), id).await?;
    let stats = CourseStats::collect(state.pool(), &course)
        .await
        .map_err(course_error)?;

    Ok(ApiResponse::ok(stats))
}

#[utoipa::path(
    get,
    path = "/api/courses/{id}/reviews",
    description = "Reviews of a course, newest first",
    params(("id" = Uuid, Path, description = "Course id"), PaginationQuery),
    responses(
        (status = 200, description = "Page of reviews", body = ApiResponse<Page<Review>>),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "reviews"
)]
pub async fn course_reviews_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(pagination): Query<PaginationQuery>,
) -> WebResult<impl IntoResponse> {
    let course = fetch_visible_course(state.pool(), &ctx.actor(), id).await?;
    let page = Review::page_by_course(state.pool(), course.id(), PageRequest::from(pagination))
        .await
        .map_err(|e| WebError::resource_fetch_error(Review::get_resource_type(), e))?;

    Ok(ApiResponse::ok(page))
}

#[utoipa::path(
    post,
    path = "/api/courses/{id}/reviews",
    description = "Rates a course. A second review by the same user replaces the first",
    params(("id" = Uuid, Path, description = "Course id")),
    request_body = ReviewBody,
    responses(
        (status = 201, description = "Review stored", body = ApiResponse<Review>),
        (status = 400, description = "Invalid review", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 404, description = "Course not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "reviews",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_review_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReviewBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let course = fetch_visible_course(state.pool(), user, id).await?;
    ensure_open(&course)?;

    let data = ReviewCreate {
        course_id: course.id(),
        user_id: user.user_id(),
        rating: payload.rating,
        comment: payload.comment.trim().to_string(),
    };
    data.validate()
        .map_err(|reason| WebError::resource_bad_request(Review::get_resource_type(), reason))?;

    let review = Review::create(state.pool(), user, data)
        .await
        .map_err(|e| WebError::resource_fetch_error(Review::get_resource_type(), e))?;

    Ok(ApiResponse::with_message(review, "Review saved").created())
}

#[utoipa::path(
    delete,
    path = "/api/courses/{id}/reviews/{review_id}",
    description = "Removes a review. Its author or an admin",
    params(
        ("id" = Uuid, Path, description = "Course id"),
        ("review_id" = Uuid, Path, description = "Review id"),
    ),
    responses(
        (status = 200, description = "Review deleted"),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the author", body = ErrorResponse),
        (status = 404, description = "Review not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "reviews",
    security(
        ("cookie" = [])
    )
)]
pub async fn course_review_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path((id, review_id)): Path<(Uuid, Uuid)>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let review = Review::find_by_id(state.pool(), user, review_id)
        .await
        .map_err(|e| WebError::resource_fetch_error(Review::get_resource_type(), e))?
        .filter(|review| review.course_id() == id)
        .ok_or(WebError::resource_not_found(Review::get_resource_type()))?;

    check_access(state.pool(), user, &review, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(Review::get_resource_type(), e))?;

    review
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(Review::get_resource_type(), e))?;

    Ok(ApiResponse::with_message((), "Review deleted"))
}

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    auth::hash_password,
    game::LevelProgress,
    model::{
        CrudRepository, PageRequest, PaginatableRepository, ResourceTyped, can_manage,
        check_access,
        entity::{QuizAttempt, UserEntity, UserEntityCreateUpdate, UserProgress},
    },
    web::{
        ApiResponse, AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::users::{
            LeaderboardEntry, LeaderboardQuery, PublicProfile, UpdateUserBody, UserResponse,
            UserStats, UserView,
        },
        error::ErrorResponse,
        routes::PaginationQuery,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/", get(users_list_handler))
        .route("/leaderboard", get(leaderboard_handler))
        .route(
            "/{id}",
            get(user_get_handler)
                .put(user_update_handler)
                .delete(user_delete_handler),
        )
        .route("/{id}/stats", get(user_stats_handler))
        .with_state(state)
}

async fn fetch_user(state: &AppState, id: Uuid) -> WebResult<UserEntity> {
    UserEntity::find_by_id(state.pool(), &AuthenticatedUser::admin(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or(WebError::resource_not_found(UserEntity::get_resource_type()))
}

#[utoipa::path(
    get,
    path = "/api/users",
    description = "Lists every user. Admin only",
    params(PaginationQuery),
    responses(
        (status = 200, description = "Page of users", body = ApiResponse<crate::model::Page<UserResponse>>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not an admin", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users",
    security(
        ("cookie" = [])
    )
)]
pub async fn users_list_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    if !user.is_admin() {
        return Err(WebError::resource_forbidden(UserEntity::get_resource_type()));
    }

    let page = UserEntity::page(state.pool(), user, PageRequest::from(pagination))
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    Ok(ApiResponse::ok(page.map(|u| UserResponse::from(&u))))
}

#[utoipa::path(
    get,
    path = "/api/users/leaderboard",
    description = "Active users ranked by total XP",
    params(LeaderboardQuery),
    responses(
        (status = 200, description = "Ranked users", body = ApiResponse<Vec<LeaderboardEntry>>),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn leaderboard_handler(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> WebResult<impl IntoResponse> {
    let limit = PageRequest::new(None, query.limit).limit();
    let users = UserEntity::leaderboard(state.pool(), limit)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    Ok(ApiResponse::ok(LeaderboardEntry::ranked(&users)))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}",
    description = "Full record for the user themselves and admins, public profile otherwise",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User found", body = ApiResponse<UserView>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn user_get_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let actor = ctx.actor();
    let found = fetch_user(&state, id).await?;

    let is_owner = can_manage(state.pool(), &actor, &found, actor.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let view = if is_owner {
        UserView::Full(UserResponse::from(&found))
    } else {
        UserView::Public(PublicProfile::from(&found))
    };

    Ok(ApiResponse::ok(view))
}

#[utoipa::path(
    put,
    path = "/api/users/{id}",
    description = "Updates username, email, password or preferences. Owner or admin",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserBody,
    responses(
        (status = 200, description = "User updated", body = ApiResponse<UserResponse>),
        (status = 400, description = "Invalid data", body = ErrorResponse),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users",
    security(
        ("cookie" = [])
    )
)]
pub async fn user_update_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserBody>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request(UserEntity::get_resource_type(), reason))?;

    let found = fetch_user(&state, id).await?;
    check_access(state.pool(), user, &found, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let admin = AuthenticatedUser::admin();
    let username = match payload.username.as_deref().map(str::trim) {
        Some(name) if name != found.username() => {
            let taken = UserEntity::find_by_username(state.pool(), &admin, name)
                .await
                .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
            if taken.is_some_and(|other| other.id() != found.id()) {
                return Err(WebError::registration_conflict());
            }
            name.to_string()
        }
        _ => found.username().to_string(),
    };
    let email = match payload.email.as_deref().map(|e| e.trim().to_lowercase()) {
        Some(email) if email != found.email() => {
            let taken = UserEntity::find_by_email(state.pool(), &admin, &email)
                .await
                .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
            if taken.is_some_and(|other| other.id() != found.id()) {
                return Err(WebError::registration_conflict());
            }
            email
        }
        _ => found.email().to_string(),
    };
    // empty keeps the stored hash
    let password_hash = match payload.password.as_deref() {
        Some(password) => hash_password(password).map_err(WebError::server_crypt_error)?,
        None => String::new(),
    };

    let data = UserEntityCreateUpdate {
        username,
        email,
        password_hash,
        preferences: payload.preferences,
    };

    let updated = found
        .update(state.pool(), user, data)
        .await
        .map_err(|e| match e {
            e if e.is_unique_violation() => WebError::registration_conflict(),
            e => WebError::resource_fetch_error(UserEntity::get_resource_type(), e),
        })?;

    Ok(ApiResponse::with_message(
        UserResponse::from(&updated),
        "User updated",
    ))
}

#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    description = "Deletes the account with its progress and attempts. Owner or admin",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User deleted"),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users",
    security(
        ("cookie" = [])
    )
)]
pub async fn user_delete_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;
    let found = fetch_user(&state, id).await?;

    check_access(state.pool(), user, &found, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let username = found.username().to_string();
    found
        .delete(state.pool(), user)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    tracing::info!("deleted user `{}`", username);
    Ok(ApiResponse::with_message((), "User deleted"))
}

#[utoipa::path(
    get,
    path = "/api/users/{id}/stats",
    description = "Level, badges and learning totals of a user",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 200, description = "User stats", body = ApiResponse<UserStats>),
        (status = 404, description = "User not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "users"
)]
pub async fn user_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> WebResult<impl IntoResponse> {
    let found = fetch_user(&state, id).await?;

    let (progress, attempts) = tokio::try_join!(
        UserProgress::totals_for_user(state.pool(), id),
        QuizAttempt::totals_for_user(state.pool(), id),
    )
    .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let (enrolled, completed_courses, completed_lessons, time_spent) = progress;
    let (quiz_attempts, quizzes_passed, average_score) = attempts;

    Ok(ApiResponse::ok(UserStats {
        user_id: found.id(),
        level_progress: LevelProgress::from_xp(found.total_xp()),
        badges: found.badges().to_vec(),
        enrolled_courses: enrolled,
        completed_courses,
        completed_lessons,
        total_time_spent: time_spent,
        quiz_attempts,
        quizzes_passed,
        average_quiz_score: crate::game::stats::round1(average_score),
    }))
}

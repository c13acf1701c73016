use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use tower_cookies::{Cookie, Cookies, cookie::SameSite};

use crate::{
    auth::{self, TOKEN_TTL_HOURS, hash_password, verify_password},
    model::{
        CrudRepository, ResourceTyped,
        entity::{UserEntity, UserEntityCreateUpdate},
    },
    web::{
        ApiResponse, AppState, AuthenticatedUser, RequestContext, WebError, WebResult,
        dto::users::{AuthResponse, LoginBody, RegisterBody, UserResponse},
        error::ErrorResponse,
        middlewares::AUTH_TOKEN,
    },
};

pub fn routes<S>(state: AppState) -> Router<S> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/me", get(me_handler))
        .with_state(state)
}

fn session_cookie(token: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(AUTH_TOKEN, token);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_http_only(true);
    cookie.set_path("/");
    cookie.set_max_age(tower_cookies::cookie::time::Duration::hours(TOKEN_TTL_HOURS));
    cookie
}

fn start_session(state: &AppState, cookies: &Cookies, user: &UserEntity) -> WebResult<String> {
    let token = auth::issue_token(user.id(), state.config().app().jwt())
        .map_err(|e| WebError::server_crypt_error(e.into()))?;
    cookies.add(session_cookie(token.clone()));
    Ok(token)
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterBody,
    description = "Creates a student account and signs it in",
    responses(
        (status = 201, description = "User created successfully", body = ApiResponse<AuthResponse>),
        (status = 400, description = "Invalid registration data", body = ErrorResponse),
        (status = 409, description = "Username or email already taken", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterBody>,
) -> WebResult<impl IntoResponse> {
    payload
        .validate()
        .map_err(|reason| WebError::resource_bad_request(UserEntity::get_resource_type(), reason))?;

    let admin = AuthenticatedUser::admin();
    let username = payload.username.trim();
    let email = payload.email.trim().to_lowercase();

    let by_name = UserEntity::find_by_username(state.pool(), &admin, username)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;
    let by_email = UserEntity::find_by_email(state.pool(), &admin, &email)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    if by_name.is_some() || by_email.is_some() {
        return Err(WebError::registration_conflict());
    }

    let hash = hash_password(&payload.password).map_err(WebError::server_crypt_error)?;
    let data = UserEntityCreateUpdate {
        username: username.to_string(),
        email,
        password_hash: hash,
        preferences: None,
    };

    let created = UserEntity::create(state.pool(), &admin, data)
        .await
        .map_err(|e| match e {
            // lost a race against a concurrent registration
            e if e.is_unique_violation() => WebError::registration_conflict(),
            e => WebError::resource_fetch_error(UserEntity::get_resource_type(), e),
        })?;

    let token = start_session(&state, &cookies, &created)?;
    tracing::info!("registered user `{}`", created.username());

    Ok(ApiResponse::with_message(
        AuthResponse {
            user: UserResponse::from(&created),
            token,
        },
        "Registration successful",
    )
    .created())
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    description = "Signs in with a username or email",
    request_body = LoginBody,
    responses(
        (status = 200, description = "User signed in", body = ApiResponse<AuthResponse>),
        (status = 401, description = "Credentials invalid", body = ErrorResponse),
        (status = 403, description = "Account disabled", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth",
)]
pub async fn login_handler(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginBody>,
) -> WebResult<impl IntoResponse> {
    let admin = AuthenticatedUser::admin();
    let found = UserEntity::find_by_login(state.pool(), &admin, payload.login.trim())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let Some(mut found) = found else {
        return Err(WebError::auth_invalid_credentials());
    };

    let is_verified =
        verify_password(found.hash(), &payload.password).map_err(WebError::server_crypt_error)?;

    if !is_verified {
        return Err(WebError::auth_invalid_credentials());
    }
    if !found.is_active() {
        return Err(WebError::auth_account_disabled());
    }

    found
        .touch_login(state.pool())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let token = start_session(&state, &cookies, &found)?;

    Ok(ApiResponse::with_message(
        AuthResponse {
            user: UserResponse::from(&found),
            token,
        },
        "Login successful",
    ))
}

#[utoipa::path(
    post,
    path = "/api/auth/logout",
    description = "Clears the session cookie",
    responses(
        (status = 200, description = "Signed out"),
    ),
    tag = "auth",
)]
pub async fn logout_handler(cookies: Cookies) -> impl IntoResponse {
    cookies.remove(session_cookie(String::new()));

    ApiResponse::with_message((), "Logged out")
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    description = "Returns the signed-in user",
    responses(
        (status = 200, description = "Current user", body = ApiResponse<UserResponse>),
        (status = 401, description = "Not signed in", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse),
    ),
    tag = "auth",
    security(
        ("cookie" = [])
    )
)]
pub async fn me_handler(
    ctx: RequestContext,
    State(state): State<AppState>,
) -> WebResult<impl IntoResponse> {
    let user = ctx.user()?;

    let found = UserEntity::find_by_id(state.pool(), user, user.user_id())
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?
        .ok_or(WebError::auth_required())?;

    Ok((StatusCode::OK, ApiResponse::ok(UserResponse::from(&found))))
}

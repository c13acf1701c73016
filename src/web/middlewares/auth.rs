use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;

use crate::{
    auth::{self, CryptError},
    model::{CrudRepository, ResourceTyped, entity::UserEntity},
    web::{AppState, RequestContext, context::AuthenticatedUser, error::WebError},
};

pub static AUTH_TOKEN: &str = "SID";

/// The session cookie wins over an `Authorization: Bearer` header. Empty
/// values (a cleared cookie) count as absent.
fn find_token(cookies: &Cookies, req: &Request) -> Option<(String, &'static str)> {
    if let Some(cookie) = cookies.get(AUTH_TOKEN).filter(|c| !c.value().is_empty()) {
        return Some((cookie.value().to_string(), AUTH_TOKEN));
    }

    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| (token.to_string(), "Authorization"))
}

/// Resolves the caller into a [`RequestContext`]. Anonymous requests pass
/// through; a malformed or expired token is rejected with 401.
pub async fn extract_context_fn(
    State(state): State<AppState>,
    cookies: Cookies,
    mut req: Request,
    next: Next,
) -> Result<Response, WebError> {
    let Some((token, source)) = find_token(&cookies, &req) else {
        req.extensions_mut().insert(RequestContext::new(None));
        return Ok(next.run(req).await);
    };

    let claims = auth::process_token(&token, state.config().app().jwt())
        .map_err(|e| WebError::auth_token_invalid(source, e.into()))?;

    let id = claims
        .claims
        .sub
        .parse::<uuid::Uuid>()
        .map_err(|e| WebError::auth_token_invalid(source, CryptError::from(e)))?;

    let found = UserEntity::find_by_id(state.pool(), &AuthenticatedUser::admin(), id)
        .await
        .map_err(|e| WebError::resource_fetch_error(UserEntity::get_resource_type(), e))?;

    let ctx = match found {
        Some(user) if user.is_active() => {
            RequestContext::new(Some(AuthenticatedUser::new(id, user.role())))
        }
        // deleted or disabled accounts fall back to anonymous
        _ => RequestContext::new(None),
    };

    req.extensions_mut().insert(ctx);
    Ok(next.run(req).await)
}

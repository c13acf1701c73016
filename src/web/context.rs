//! Request context, e.g. user id, its role, etc.
//!

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::web::{WebResult, error::WebError};

#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    user_id: uuid::Uuid,
    user_role: UserRole,
}

impl AuthenticatedUser {
    pub fn new(user_id: uuid::Uuid, user_role: UserRole) -> Self {
        Self { user_id, user_role }
    }

    /// The system actor used by startup code and the CLI.
    pub fn admin() -> Self {
        Self {
            user_role: UserRole::Admin,
            user_id: uuid::Uuid::max(), // admin ID
        }
    }

    /// Stand-in for anonymous requests; owns nothing and sees only public data.
    pub fn guest() -> Self {
        Self {
            user_role: UserRole::Guest,
            user_id: uuid::Uuid::nil(),
        }
    }

    pub fn is_system(&self) -> bool {
        self.user_id == uuid::Uuid::max()
    }

    pub fn user_id(&self) -> uuid::Uuid {
        self.user_id
    }

    pub fn user_role(&self) -> UserRole {
        self.user_role
    }

    pub fn is_admin(&self) -> bool {
        self.user_role == UserRole::Admin
    }

    /// Instructors and admins author content.
    pub fn can_author(&self) -> bool {
        matches!(self.user_role, UserRole::Admin | UserRole::Instructor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Admin,
    Instructor,
    Student,
    Guest,
}

impl From<&str> for UserRole {
    fn from(value: &str) -> Self {
        match value {
            "admin" => Self::Admin,
            "instructor" => Self::Instructor,
            _ => Self::Student,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => write!(f, "admin"),
            Self::Instructor => write!(f, "instructor"),
            Self::Student => write!(f, "student"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    maybe_user: Option<AuthenticatedUser>,
}

impl RequestContext {
    pub fn new(maybe_user: Option<AuthenticatedUser>) -> Self {
        Self { maybe_user }
    }

    pub fn maybe_user(&self) -> Option<&AuthenticatedUser> {
        self.maybe_user.as_ref()
    }

    pub fn user(&self) -> WebResult<&AuthenticatedUser> {
        self.maybe_user.as_ref().ok_or(WebError::auth_required())
    }

    /// The signed-in user, or a guest for anonymous requests.
    pub fn actor(&self) -> AuthenticatedUser {
        self.maybe_user
            .clone()
            .unwrap_or_else(AuthenticatedUser::guest)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = WebError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<RequestContext>();
        if let Some(ctx) = ctx {
            Ok(ctx.clone())
        } else {
            Ok(RequestContext::new(None))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn role_round_trip_test() {
        for role in [UserRole::Admin, UserRole::Instructor, UserRole::Student] {
            assert_eq!(UserRole::from(role.to_string().as_str()), role);
        }
        assert_eq!(UserRole::from("something"), UserRole::Student);
    }

    #[test]
    fn actor_defaults_to_guest_test() {
        let ctx = RequestContext::new(None);
        assert!(ctx.user().is_err());
        let actor = ctx.actor();
        assert_eq!(actor.user_role(), UserRole::Guest);
        assert!(!actor.can_author());
        assert!(!actor.is_system());
        assert!(AuthenticatedUser::admin().is_system());
    }
}

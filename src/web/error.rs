use axum::{Json, http::StatusCode, response::IntoResponse};
use thiserror::Error;

use crate::{
    Config,
    auth::CryptError,
    error::log_error,
    model::{DatabaseError, ResourceType},
};

pub type WebResult<T> = std::result::Result<T, WebError>;

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("RegistrationUserConflict")]
    RegistrationUserConflict,
}

#[derive(Debug, Error)]
pub enum AuthenticationError {
    #[error("AuthenticationTokenInvalid, source: {source_name}. Error: {error}")]
    AuthenticationTokenInvalid {
        source_name: String,
        error: CryptError,
    },

    #[error("AuthenticationRequired")]
    AuthenticationRequired,

    #[error("AuthenticationInvalidCredentials")]
    AuthenticationInvalidCredentials,

    #[error("AuthenticationAccountDisabled")]
    AuthenticationAccountDisabled,
}

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("ResourceNotFound: {resource_type:?}")]
    ResourceNotFound { resource_type: ResourceType },

    #[error("ResourceForbidden: {resource_type:?}")]
    ResourceForbidden { resource_type: ResourceType },

    #[error("ResourceConflict: {resource_type:?}. Error: {error}")]
    ResourceConflict {
        resource_type: ResourceType,
        error: DatabaseError,
    },

    #[error("ResourceFetchError: {resource_type:?}. Error: {error}")]
    ResourceFetchError {
        resource_type: ResourceType,
        error: DatabaseError,
    },

    #[error("ResourceBadRequest: {resource_type:?}. Reason: {reason}")]
    ResourceBadRequest {
        resource_type: ResourceType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("RequestRouteNotFound: {path}")]
    RequestRouteNotFound { path: String },

    #[error("RequestRateLimited, retry after {retry_after}s")]
    RequestRateLimited { retry_after: u64 },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ServerCryptError: {0}")]
    ServerCryptError(#[from] crate::auth::CryptError),

    #[error("ServerPanic: {0}")]
    ServerPanic(String),
}

impl ServerError {
    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    pub fn client_display(&self) -> String {
        String::from("Internal server error.")
    }
}

impl RegistrationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RegistrationUserConflict => StatusCode::CONFLICT,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::RegistrationUserConflict => {
                String::from("Registration error, username or email already taken.")
            }
        }
    }
}

impl AuthenticationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            Self::AuthenticationTokenInvalid { .. } => StatusCode::UNAUTHORIZED,
            Self::AuthenticationInvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AuthenticationAccountDisabled => StatusCode::FORBIDDEN,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::AuthenticationTokenInvalid { .. } => {
                String::from("Authentication error, token invalid or expired.")
            }
            Self::AuthenticationRequired => String::from("Authentication required."),
            Self::AuthenticationInvalidCredentials => {
                String::from("Authentication error, user not found or password is invalid.")
            }
            Self::AuthenticationAccountDisabled => {
                String::from("Authentication error, account is disabled.")
            }
        }
    }
}

impl ResourceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ResourceNotFound { .. } => StatusCode::NOT_FOUND,
            Self::ResourceForbidden { .. } => StatusCode::FORBIDDEN,
            Self::ResourceConflict { .. } => StatusCode::CONFLICT,
            Self::ResourceFetchError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ResourceBadRequest { .. } => StatusCode::BAD_REQUEST,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceNotFound { resource_type } => {
                format!("{} not found.", resource_type.display_name())
            }
            Self::ResourceForbidden { .. } => String::from("Resource error, resource forbidden."),
            Self::ResourceConflict { resource_type, .. } => {
                format!("{} conflicts with an existing one.", resource_type.display_name())
            }
            Self::ResourceFetchError { .. } => {
                String::from("Resource error, unable to fetch resource.")
            }
            Self::ResourceBadRequest { reason, .. } => reason.clone(),
        }
    }
}

impl RequestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RequestRouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::RequestRateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::RequestRouteNotFound { path } => format!("Route {} not found.", path),
            Self::RequestRateLimited { .. } => {
                String::from("Too many requests, please try again later.")
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("ResourceError - {0}")]
    ResourceError(#[from] ResourceError),
    #[error("AuthenticationError - {0}")]
    AuthenticationError(#[from] AuthenticationError),
    #[error("RegistrationError - {0}")]
    RegistrationError(#[from] RegistrationError),
    #[error("RequestError - {0}")]
    RequestError(#[from] RequestError),
    #[error("ServerError - {0}")]
    ServerError(#[from] ServerError),
}

impl WebError {
    pub fn resource_not_found(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceNotFound {
            resource_type: r#type,
        })
    }

    pub fn resource_forbidden(r#type: ResourceType) -> Self {
        Self::ResourceError(ResourceError::ResourceForbidden {
            resource_type: r#type,
        })
    }

    /// Maps a database failure: access denials become 403, unique violations
    /// 409, exhausted quiz attempts 400 and everything else 500.
    pub fn resource_fetch_error(r#type: ResourceType, error: DatabaseError) -> Self {
        match error {
            DatabaseError::Forbidden => Self::resource_forbidden(r#type),
            DatabaseError::AttemptLimitReached(max) => Self::resource_bad_request(
                r#type,
                format!("Maximum number of attempts ({}) reached.", max),
            ),
            e if e.is_unique_violation() => Self::ResourceError(ResourceError::ResourceConflict {
                resource_type: r#type,
                error: e,
            }),
            e => Self::ResourceError(ResourceError::ResourceFetchError {
                resource_type: r#type,
                error: e,
            }),
        }
    }

    pub fn resource_bad_request<S: Into<String>>(r#type: ResourceType, reason: S) -> Self {
        Self::ResourceError(ResourceError::ResourceBadRequest {
            resource_type: r#type,
            reason: reason.into(),
        })
    }

    pub fn auth_token_invalid<S: Into<String>>(source_name: S, error: CryptError) -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationTokenInvalid {
            source_name: source_name.into(),
            error,
        })
    }

    pub fn auth_required() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationRequired)
    }

    pub fn auth_invalid_credentials() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationInvalidCredentials)
    }

    pub fn auth_account_disabled() -> Self {
        Self::AuthenticationError(AuthenticationError::AuthenticationAccountDisabled)
    }

    pub fn registration_conflict() -> Self {
        Self::RegistrationError(RegistrationError::RegistrationUserConflict)
    }

    pub fn route_not_found<S: Into<String>>(path: S) -> Self {
        Self::RequestError(RequestError::RequestRouteNotFound { path: path.into() })
    }

    pub fn rate_limited(retry_after: u64) -> Self {
        Self::RequestError(RequestError::RequestRateLimited { retry_after })
    }

    pub fn server_crypt_error(e: CryptError) -> Self {
        Self::ServerError(ServerError::ServerCryptError(e))
    }

    pub fn server_panic<S: Into<String>>(detail: S) -> Self {
        Self::ServerError(ServerError::ServerPanic(detail.into()))
    }

    pub fn status_code(&self) -> axum::http::StatusCode {
        match self {
            Self::ResourceError(e) => e.status_code(),
            Self::RegistrationError(e) => e.status_code(),
            Self::AuthenticationError(e) => e.status_code(),
            Self::RequestError(e) => e.status_code(),
            Self::ServerError(e) => e.status_code(),
        }
    }

    pub fn client_display(&self) -> String {
        match self {
            Self::ResourceError(e) => e.client_display(),
            Self::RegistrationError(e) => e.client_display(),
            Self::AuthenticationError(e) => e.client_display(),
            Self::RequestError(e) => e.client_display(),
            Self::ServerError(e) => e.client_display(),
        }
    }
}

/// Failure envelope shared by every endpoint.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Always `false`
    pub success: bool,
    /// Human-readable message for the client
    pub message: String,
    /// Debug details, omitted in production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn expose_details() -> bool {
    Config::try_get()
        .map(|config| !config.app().is_production())
        .unwrap_or(cfg!(debug_assertions))
}

impl IntoResponse for WebError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            log_error(&self);
        } else {
            tracing::debug!("{}", self);
        }

        let mut response = (
            status_code,
            Json(ErrorResponse {
                success: false,
                message: self.client_display(),
                error: expose_details().then(|| self.to_string()),
            }),
        )
            .into_response();

        if let Self::RequestError(RequestError::RequestRateLimited { retry_after }) = &self {
            if let Ok(value) = retry_after.to_string().parse() {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, value);
            }
        }

        response
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn database_errors_map_to_statuses_test() {
        let forbidden = WebError::resource_fetch_error(ResourceType::Course, DatabaseError::Forbidden);
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);

        let limit =
            WebError::resource_fetch_error(ResourceType::Quiz, DatabaseError::AttemptLimitReached(3));
        assert_eq!(limit.status_code(), StatusCode::BAD_REQUEST);
        assert!(limit.client_display().contains('3'));

        let other = WebError::resource_fetch_error(
            ResourceType::Lesson,
            DatabaseError::SqlxError(sqlx::Error::RowNotFound),
        );
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn client_messages_hide_internals_test() {
        let err = WebError::rate_limited(30);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let err = WebError::resource_not_found(ResourceType::Quiz);
        assert_eq!(err.client_display(), "Quiz not found.");
    }

    #[tokio::test]
    async fn error_response_body_test() {
        let response = WebError::rate_limited(30).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[axum::http::header::RETRY_AFTER], "30");

        let err = WebError::resource_fetch_error(
            ResourceType::Course,
            DatabaseError::Forbidden,
        );
        let response = err.into_response();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.success);
        // details follow the configured environment
        assert_eq!(body.error.is_some(), expose_details());
    }
}

use crate::{
    Config,
    model::PageRequest,
    web::{
        ApiResponse, AppState, WebError,
        doc::ApiDoc,
        middlewares::{extract_context_fn, rate_limit_fn},
    },
};
use axum::{
    Router,
    http::{HeaderValue, Method, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_cookies::CookieManagerLayer;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod courses;
pub mod lessons;
pub mod progress;
pub mod quiz;
pub mod users;

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationQuery {
    /// 1-based, defaults to 1.
    page: Option<i64>,
    /// Defaults to 10, at most 100.
    limit: Option<i64>,
}

impl From<PaginationQuery> for PageRequest {
    fn from(query: PaginationQuery) -> Self {
        PageRequest::new(query.page, query.limit)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    status: &'static str,
    environment: String,
    version: &'static str,
}

#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = ApiResponse<HealthResponse>),
    ),
    tag = "health"
)]
pub async fn health_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl IntoResponse {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        environment: state.config().app().environment().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn fallback_handler(uri: Uri) -> WebError {
    WebError::route_not_found(uri.path())
}

fn handle_panic(panic: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        String::from("unknown panic")
    };

    WebError::server_panic(detail).into_response()
}

/// `*` mirrors any origin; otherwise a comma separated allow-list.
fn cors_layer(origin: &str) -> CorsLayer {
    if origin.trim() == "*" {
        return CorsLayer::very_permissive();
    }

    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match o.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("ignoring invalid CORS origin `{}`", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub fn build_app<S: Send + Sync + Clone + 'static>(
    state: AppState,
    config: &'static Config,
) -> Router<S> {
    let api = Router::new()
        .route("/health", get(health_handler))
        .nest("/auth", auth::routes(state.clone()))
        .nest("/users", users::routes(state.clone()))
        .nest("/courses", courses::routes(state.clone()))
        .nest("/lessons", lessons::routes(state.clone()))
        .nest("/quiz", quiz::routes(state.clone()))
        .nest("/progress", progress::routes(state.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), extract_context_fn))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit_fn));

    let mut router = Router::new().nest("/api", api);

    if config.app().docs() {
        router = router.merge(
            SwaggerUi::new("/api/docs").url("/api/openapi.json", ApiDoc::openapi()),
        );
    }

    router
        .fallback(fallback_handler)
        .layer(CookieManagerLayer::new())
        .layer(cors_layer(config.app().cors_origin()))
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::web::middlewares::AUTH_TOKEN;

/// Registers the session cookie and its `Authorization: Bearer` twin.
pub struct SessionAuthModifier;

impl Modify for SessionAuthModifier {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(schema) = openapi.components.as_mut() {
            schema.add_security_scheme(
                "cookie",
                SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                    AUTH_TOKEN,
                    "JWT of the signed-in user",
                ))),
            );
            schema.add_security_scheme(
                "bearer",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(title = "LearnQuest API"),
    paths(
        crate::web::routes::health_handler,
        crate::web::routes::auth::register_handler,
        crate::web::routes::auth::login_handler,
        crate::web::routes::auth::logout_handler,
        crate::web::routes::auth::me_handler,
        crate::web::routes::users::users_list_handler,
        crate::web::routes::users::leaderboard_handler,
        crate::web::routes::users::user_get_handler,
        crate::web::routes::users::user_update_handler,
        crate::web::routes::users::user_delete_handler,
        crate::web::routes::users::user_stats_handler,
        crate::web::routes::courses::courses_list_handler,
        crate::web::routes::courses::course_create_handler,
        crate::web::routes::courses::course_get_handler,
        crate::web::routes::courses::course_update_handler,
        crate::web::routes::courses::course_delete_handler,
        crate::web::routes::courses::course_enroll_handler,
        crate::web::routes::courses::course_lessons_handler,
        crate::web::routes::courses::course_quizzes_handler,
        crate::web::routes::courses::course_stats_handler,
        crate::web::routes::courses::course_reviews_handler,
        crate::web::routes::courses::course_review_handler,
        crate::web::routes::courses::course_review_delete_handler,
        crate::web::routes::lessons::lesson_create_handler,
        crate::web::routes::lessons::lesson_get_handler,
        crate::web::routes::lessons::lesson_update_handler,
        crate::web::routes::lessons::lesson_delete_handler,
        crate::web::routes::quiz::quiz_create_handler,
        crate::web::routes::quiz::quiz_get_handler,
        crate::web::routes::quiz::quiz_update_handler,
        crate::web::routes::quiz::quiz_delete_handler,
        crate::web::routes::quiz::quiz_submit_handler,
        crate::web::routes::quiz::quiz_attempts_handler,
        crate::web::routes::quiz::quiz_stats_handler,
        crate::web::routes::progress::progress_list_handler,
        crate::web::routes::progress::progress_course_handler,
        crate::web::routes::progress::progress_complete_lesson_handler,
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "auth", description = "Registration and sessions"),
        (name = "users", description = "Profiles, stats and the leaderboard"),
        (name = "courses", description = "Course catalogue and enrolment"),
        (name = "reviews", description = "Course ratings"),
        (name = "lessons", description = "Lesson content"),
        (name = "quiz", description = "Quizzes and graded attempts"),
        (name = "progress", description = "Lesson completion and course progress"),
    ),
    modifiers(&SessionAuthModifier),
)]
pub struct ApiDoc;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn openapi_lists_routes_and_schemes_test() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/quiz/{id}/submit"));
        assert!(doc.paths.paths.contains_key("/api/courses/{id}/reviews/{review_id}"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("cookie"));
        assert!(components.security_schemes.contains_key("bearer"));
    }
}

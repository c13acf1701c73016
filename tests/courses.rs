mod common;
use axum::http::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, create_course_action, login_action, login_admin_action, register_action,
    setup_server, setup_test_db,
};

fn course_path(key: &'static str, suffix: &'static str) -> Action {
    Action::new("course", "GET", "dynamic")
        .with_dyn_path(move |ctx| format!("/api/courses/{}{}", ctx.id(key), suffix))
}

#[tokio::test]
async fn route_course_listing_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics"))
        .step(create_course_action("Advanced Lifetimes"))
        .step(create_course_action("Async Rust"))
        .step(
            Action::new("create_draft", "POST", "/api/courses")
                .with_body(json!({
                    "title": "Unfinished Draft",
                    "category": "other",
                    "difficulty": "advanced",
                    "language": "rust",
                }))
                .with_expect(StatusCode::CREATED)
                .with_save_as("draft"),
        )
        // admins see drafts in the listing
        .step(
            Action::new("list_as_admin", "GET", "/api/courses")
                .assert_json(|body| assert_eq!(body["data"]["total"], 4)),
        )
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(
            Action::new("first_page", "GET", "/api/courses")
                .with_param("limit", "2")
                .assert_json(|body| {
                    let page = &body["data"];
                    assert_eq!(page["total"], 3);
                    assert_eq!(page["pages"], 2);
                    assert_eq!(page["page"], 1);
                    assert_eq!(page["items"].as_array().unwrap().len(), 2);
                }),
        )
        .step(
            Action::new("second_page", "GET", "/api/courses")
                .with_param("limit", "2")
                .with_param("page", "2")
                .assert_json(|body| {
                    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);
                }),
        )
        .step(
            Action::new("search", "GET", "/api/courses")
                .with_param("search", "advanced")
                .assert_json(|body| {
                    assert_eq!(body["data"]["total"], 1);
                    assert_eq!(body["data"]["items"][0]["title"], "Advanced Lifetimes");
                }),
        )
        .step(
            Action::new("sort_by_title", "GET", "/api/courses")
                .with_param("sort", "title")
                .assert_json(|body| {
                    let titles: Vec<&str> = body["data"]["items"]
                        .as_array()
                        .unwrap()
                        .iter()
                        .map(|c| c["title"].as_str().unwrap())
                        .collect();
                    assert_eq!(titles, ["Advanced Lifetimes", "Async Rust", "Rust Basics"]);
                }),
        )
        .step(
            Action::new("filter_difficulty", "GET", "/api/courses")
                .with_param("difficulty", "advanced")
                .assert_json(|body| assert_eq!(body["data"]["total"], 0)),
        )
        .step(course_path("draft", "").with_expect(StatusCode::NOT_FOUND))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_course_authoring_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(register_action("student", "student123"))
        .step(create_course_action("Not Allowed").with_expect(StatusCode::FORBIDDEN))
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(
            Action::new("create_invalid", "POST", "/api/courses")
                .with_body(json!({
                    "title": "  ",
                    "category": "other",
                    "difficulty": "beginner",
                    "language": "rust",
                }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(login_action("student", "student123").with_clear_cookies(true))
        .step(
            Action::new("update_as_student", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}", ctx.id("course")))
                .with_body(json!({
                    "title": "Hijacked",
                    "category": "other",
                    "difficulty": "beginner",
                    "language": "rust",
                }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(login_admin_action())
        .step(
            Action::new("update_as_admin", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}", ctx.id("course")))
                .with_body(json!({
                    "title": "Rust Basics, Second Edition",
                    "category": "algorithms",
                    "difficulty": "intermediate",
                    "language": "rust",
                    "tags": ["ownership"],
                }))
                .assert_json(|body| {
                    assert_eq!(body["data"]["title"], "Rust Basics, Second Edition");
                    assert_eq!(body["data"]["difficulty"], "intermediate");
                    assert_eq!(body["data"]["tags"][0], "ownership");
                    // fields left out keep their value
                    assert_eq!(body["data"]["is_published"], true);
                    assert_eq!(body["data"]["xp_reward"], 100);
                }),
        )
        .step(
            Action::new("delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}", ctx.id("course"))),
        )
        .step(course_path("course", "").with_expect(StatusCode::NOT_FOUND))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_course_enroll_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(
            Action::new("enroll", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/enroll", ctx.id("course")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["newly_enrolled"], true);
                    assert_eq!(body["data"]["progress"]["is_completed"], false);
                }),
        )
        .step(
            Action::new("enroll_again", "POST", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/enroll", ctx.id("course")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["newly_enrolled"], false);
                    assert_eq!(body["message"], "Already enrolled");
                }),
        )
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["enrolled_students"], 1);
        }))
        .step(course_path("course", "/stats").assert_json(|body| {
            assert_eq!(body["data"]["enrolled_students"], 1);
            assert_eq!(body["data"]["completed_students"], 0);
            assert_eq!(body["data"]["completion_rate"], 0.0);
        }))
        .step(
            Action::new("enroll_unauthenticated", "POST", "dynamic")
                .with_clear_cookies(true)
                .with_dyn_path(|ctx| format!("/api/courses/{}/enroll", ctx.id("course")))
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_course_reviews_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let review = |rating: i64| {
        Action::new("review", "POST", "dynamic")
            .with_dyn_path(|ctx| format!("/api/courses/{}/reviews", ctx.id("course")))
            .with_body(json!({ "rating": rating, "comment": "solid" }))
            .with_expect(StatusCode::CREATED)
    };

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(register_action("first", "first123").with_clear_cookies(true))
        .step(review(4).with_save_as("review"))
        .step(review(9).with_expect(StatusCode::BAD_REQUEST))
        .step(register_action("second", "second123").with_clear_cookies(true))
        .step(review(2))
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["average_rating"], 3.0);
            assert_eq!(body["data"]["total_ratings"], 2);
        }))
        .step(
            Action::new("delete_foreign_review", "DELETE", "dynamic")
                .with_dyn_path(|ctx| {
                    format!("/api/courses/{}/reviews/{}", ctx.id("course"), ctx.id("review"))
                })
                .with_expect(StatusCode::FORBIDDEN),
        )
        // posting again replaces the first review
        .step(login_action("first", "first123").with_clear_cookies(true))
        .step(review(5))
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["average_rating"], 3.5);
            assert_eq!(body["data"]["total_ratings"], 2);
        }))
        .step(
            Action::new("delete_own_review", "DELETE", "dynamic").with_dyn_path(|ctx| {
                format!("/api/courses/{}/reviews/{}", ctx.id("course"), ctx.id("review"))
            }),
        )
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["average_rating"], 2.0);
            assert_eq!(body["data"]["total_ratings"], 1);
        }))
        .step(course_path("course", "/reviews").assert_json(|body| {
            assert_eq!(body["data"]["total"], 1);
            assert_eq!(body["data"]["items"][0]["rating"], 2);
        }))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_delete_updates_course_aggregates_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    let review = |rating: i64| {
        Action::new("review", "POST", "dynamic")
            .with_dyn_path(|ctx| format!("/api/courses/{}/reviews", ctx.id("course")))
            .with_body(json!({ "rating": rating }))
            .with_expect(StatusCode::CREATED)
    };
    let enroll = || {
        Action::new("enroll", "POST", "dynamic")
            .with_dyn_path(|ctx| format!("/api/courses/{}/enroll", ctx.id("course")))
    };

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(register_action("alice", "alice123").with_clear_cookies(true).with_save_as("alice"))
        .step(enroll())
        .step(review(1))
        .step(register_action("bob", "bob12345").with_clear_cookies(true))
        .step(enroll())
        .step(review(5))
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["average_rating"], 3.0);
            assert_eq!(body["data"]["enrolled_students"], 2);
        }))
        .step(login_admin_action())
        .step(
            Action::new("delete_alice", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("alice"))),
        )
        // her review and enrolment leave the aggregates with her
        .step(course_path("course", "").assert_json(|body| {
            assert_eq!(body["data"]["average_rating"], 5.0);
            assert_eq!(body["data"]["total_ratings"], 1);
            assert_eq!(body["data"]["enrolled_students"], 1);
        }))
        .step(course_path("course", "/reviews").assert_json(|body| {
            assert_eq!(body["data"]["total"], 1);
        }))
        .run(&mut server, pool)
        .await;
}

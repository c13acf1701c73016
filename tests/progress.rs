mod common;
use axum::http::StatusCode;
use serde_json::json;

use crate::common::{
    Action, Flow, create_course_action, create_lesson_action, login_admin_action,
    register_action, setup_server, setup_test_db,
};

fn complete_action(lesson_key: &'static str, score: i64) -> Action {
    Action::new("complete", "POST", "dynamic")
        .with_dyn_path(move |ctx| format!("/api/progress/lessons/{}/complete", ctx.id(lesson_key)))
        .with_body(json!({ "score": score, "time_spent": 120 }))
}

fn lesson_path(lesson_key: &'static str) -> Action {
    Action::new("lesson", "GET", "dynamic")
        .with_dyn_path(move |ctx| format!("/api/lessons/{}", ctx.id(lesson_key)))
}

/// A published course with two published lessons and one draft.
fn seeded_flow() -> Flow {
    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(create_lesson_action("course", "Ownership", 0).with_save_as("first"))
        .step(create_lesson_action("course", "Borrowing", 1).with_save_as("second"))
        .step(
            Action::new("create_draft_lesson", "POST", "/api/lessons")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.id("course"),
                        "title": "Lifetimes (draft)",
                        "lesson_type": "theory",
                        "is_published": false,
                    })
                })
                .with_expect(StatusCode::CREATED)
                .with_save_as("draft"),
        )
}

#[tokio::test]
async fn route_lesson_navigation_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seeded_flow()
        // draft appended after the last lesson
        .step(lesson_path("draft").assert_json(|body| {
            assert_eq!(body["data"]["order_index"], 2);
            assert!(body["data"]["navigation"]["next"].is_null());
        }))
        .step(
            create_lesson_action("course", "Duplicate position", 1)
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("create_invalid_lesson", "POST", "/api/lessons")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.id("course"),
                        "title": "Video without a url",
                        "lesson_type": "video",
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(
            Action::new("admin_lessons", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/lessons", ctx.id("course")))
                .assert_json(|body| assert_eq!(body["data"].as_array().unwrap().len(), 3)),
        )
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(
            Action::new("student_lessons", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/lessons", ctx.id("course")))
                .assert_json(|body| {
                    let lessons = body["data"].as_array().unwrap();
                    assert_eq!(lessons.len(), 2);
                    assert_eq!(lessons[0]["title"], "Ownership");
                    assert_eq!(lessons[1]["title"], "Borrowing");
                }),
        )
        .step(lesson_path("first").assert_json(|body| {
            let navigation = &body["data"]["navigation"];
            assert!(navigation["prev"].is_null());
            assert_eq!(navigation["next"]["title"], "Borrowing");
        }))
        .step(lesson_path("second").assert_json(|body| {
            let navigation = &body["data"]["navigation"];
            assert_eq!(navigation["prev"]["title"], "Ownership");
            // drafts are skipped
            assert!(navigation["next"].is_null());
        }))
        .step(lesson_path("draft").with_expect(StatusCode::NOT_FOUND))
        .step(
            Action::new("delete_as_student", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/lessons/{}", ctx.id("first")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_lesson_completion_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seeded_flow()
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(complete_action("first", 150).with_expect(StatusCode::BAD_REQUEST))
        .step(complete_action("first", 80).assert_json(|body| {
            let data = &body["data"];
            assert_eq!(data["first_completion"], true);
            assert_eq!(data["course_completed"], false);
            assert_eq!(data["xp_earned"], 10);
            assert_eq!(data["xp"]["new_badges"][0], "first-steps");
            assert_eq!(data["progress"]["total_lessons"], 2);
            assert_eq!(data["progress"]["completion_percentage"], 50.0);
        }))
        // repeating keeps the best score and grants nothing
        .step(complete_action("first", 60).assert_json(|body| {
            let data = &body["data"];
            assert_eq!(data["first_completion"], false);
            assert_eq!(data["xp_earned"], 0);
            let entry = &data["progress"]["completed_lessons"][0];
            assert_eq!(entry["score"], 80);
            assert_eq!(entry["attempts"], 2);
            assert_eq!(entry["time_spent"], 240);
            assert_eq!(data["progress"]["completed_lessons"].as_array().unwrap().len(), 1);
        }))
        .step(complete_action("draft", 100).with_expect(StatusCode::NOT_FOUND))
        .step(complete_action("second", 100).assert_json(|body| {
            let data = &body["data"];
            assert_eq!(body["message"], "Course completed");
            assert_eq!(data["course_completed"], true);
            // lesson plus course reward
            assert_eq!(data["xp_earned"], 110);
            assert_eq!(data["xp"]["total_xp"], 120);
            assert_eq!(data["level_up"], true);
            assert_eq!(data["progress"]["is_completed"], true);
            assert_eq!(data["progress"]["completion_percentage"], 100.0);
        }))
        .step(
            Action::new("progress_list", "GET", "/api/progress").assert_json(|body| {
                assert_eq!(body["data"]["total"], 1);
                assert_eq!(body["data"]["items"][0]["total_xp"], 120);
                assert_eq!(body["data"]["items"][0]["total_time_spent"], 360);
            }),
        )
        .step(
            Action::new("course_progress", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/progress/courses/{}", ctx.id("course")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["is_completed"], true);
                    assert_eq!(body["data"]["current_lesson_id"], body["data"]["completed_lessons"][1]["lesson_id"]);
                }),
        )
        .step(Action::new("me", "GET", "/api/auth/me").assert_json(|body| {
            assert_eq!(body["data"]["level"], 2);
            let badges = body["data"]["badges"].as_array().unwrap();
            assert!(badges.iter().any(|b| b == "course-finisher"));
        }))
        .step(
            Action::new("leaderboard", "GET", "/api/users/leaderboard").assert_json(|body| {
                assert_eq!(body["data"][0]["username"], "student");
                assert_eq!(body["data"][0]["rank"], 1);
            }),
        )
        .step(
            Action::new("course_stats", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/stats", ctx.id("course")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["completed_students"], 1);
                    assert_eq!(body["data"]["completion_rate"], 100.0);
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_progress_requires_enrolment_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seeded_flow()
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(
            Action::new("course_progress", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/progress/courses/{}", ctx.id("course")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("progress_list", "GET", "/api/progress")
                .assert_json(|body| assert_eq!(body["data"]["total"], 0)),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_progress_list_counts_each_course_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    seeded_flow()
        .step(create_course_action("Async Rust").with_save_as("other"))
        .step(create_lesson_action("other", "Futures", 0).with_save_as("futures"))
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(complete_action("first", 100))
        .step(complete_action("futures", 100))
        .step(
            Action::new("progress_list", "GET", "/api/progress").assert_json(|body| {
                assert_eq!(body["data"]["total"], 2);
                let mut items: Vec<(i64, f64)> = body["data"]["items"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|item| {
                        (
                            item["total_lessons"].as_i64().unwrap(),
                            item["completion_percentage"].as_f64().unwrap(),
                        )
                    })
                    .collect();
                items.sort_by_key(|(total, _)| *total);
                // the draft lesson does not count toward either course
                assert_eq!(items, vec![(1, 100.0), (2, 50.0)]);
            }),
        )
        .run(&mut server, pool)
        .await;
}

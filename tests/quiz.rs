mod common;
use axum::http::StatusCode;
use serde_json::{Value, json};

use crate::common::{
    Action, Flow, FlowContext, create_course_action, login_action, login_admin_action,
    register_action, setup_server, setup_test_db,
};

fn create_quiz_action() -> Action {
    Action::new("create_quiz", "POST", "/api/quiz")
        .with_dyn_body(|ctx| {
            json!({
                "course_id": ctx.id("course"),
                "title": "Ownership check",
                "questions": [
                    {
                        "text": "Which keyword moves a closure's captures?",
                        "options": [
                            { "text": "move", "is_correct": true },
                            { "text": "ref" },
                            { "text": "static" },
                        ],
                        "points": 2,
                        "explanation": "`move` takes ownership of captured values.",
                    },
                    {
                        "text": "Which types are Copy?",
                        "options": [
                            { "text": "i32", "is_correct": true },
                            { "text": "String" },
                            { "text": "bool", "is_correct": true },
                        ],
                    },
                ],
                "passing_score": 70,
                "xp_reward": 50,
                "max_attempts": 4,
            })
        })
        .with_expect(StatusCode::CREATED)
        .with_save_as("quiz")
}

fn question_id(ctx: &FlowContext, index: usize) -> Value {
    ctx.get("quiz")["data"]["questions"][index]["id"].clone()
}

/// Answers the stored quiz; `first` and `second` are the selected option indexes.
fn submit_action(first: &'static [usize], second: &'static [usize]) -> Action {
    Action::new("submit", "POST", "dynamic")
        .with_dyn_path(|ctx| format!("/api/quiz/{}/submit", ctx.id("quiz")))
        .with_dyn_body(move |ctx| {
            json!({
                "answers": [
                    { "question_id": question_id(ctx, 0), "selected_options": first },
                    { "question_id": question_id(ctx, 1), "selected_options": second },
                ],
                "time_spent": 30,
            })
        })
        .with_expect(StatusCode::CREATED)
}

fn quiz_path(suffix: &'static str) -> Action {
    Action::new("quiz", "GET", "dynamic")
        .with_dyn_path(move |ctx| format!("/api/quiz/{}{}", ctx.id("quiz"), suffix))
}

#[tokio::test]
async fn route_quiz_authoring_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(create_quiz_action().assert_json(|body| {
            let quiz = &body["data"];
            assert_eq!(quiz["total_points"], 3);
            assert_eq!(quiz["questions"][0]["options"][0]["is_correct"], true);
            assert!(quiz["questions"][0]["id"].as_str().is_some());
        }))
        .step(
            Action::new("create_invalid_quiz", "POST", "/api/quiz")
                .with_dyn_body(|ctx| {
                    json!({
                        "course_id": ctx.id("course"),
                        "title": "No correct answer",
                        "questions": [
                            { "text": "?", "options": [{ "text": "a" }, { "text": "b" }] },
                        ],
                    })
                })
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(create_quiz_action().with_expect(StatusCode::FORBIDDEN))
        // answers stay hidden from students
        .step(quiz_path("").assert_json(|body| {
            let question = &body["data"]["questions"][1];
            assert!(question["options"][0].get("is_correct").is_none());
            assert!(question.get("explanation").is_none());
            assert_eq!(question["select_count"], 2);
        }))
        .step(
            Action::new("course_quizzes", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/courses/{}/quizzes", ctx.id("course")))
                .assert_json(|body| {
                    assert_eq!(body["data"].as_array().unwrap().len(), 1);
                }),
        )
        .step(quiz_path("/stats").with_expect(StatusCode::FORBIDDEN))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_quiz_submit_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(create_quiz_action())
        .step(register_action("student", "student123").with_clear_cookies(true))
        .step(submit_action(&[1], &[0]).assert_json(|body| {
            let attempt = &body["data"]["attempt"];
            assert_eq!(attempt["score"], 0);
            assert_eq!(attempt["passed"], false);
            assert_eq!(attempt["attempt_number"], 1);
            assert!(body["data"]["xp"].is_null());
        }))
        // 2 of 3 points rounds to 67
        .step(submit_action(&[0], &[0]).assert_json(|body| {
            let attempt = &body["data"]["attempt"];
            assert_eq!(attempt["score"], 67);
            assert_eq!(attempt["earned_points"], 2);
            assert_eq!(attempt["passed"], false);
        }))
        .step(submit_action(&[0], &[2, 0]).assert_json(|body| {
            let data = &body["data"];
            assert_eq!(data["attempt"]["score"], 100);
            assert_eq!(data["attempt"]["passed"], true);
            assert_eq!(data["attempt"]["xp_awarded"], 50);
            assert_eq!(data["xp"]["total_xp"], 50);
            assert_eq!(data["xp"]["new_badges"][0], "perfectionist");
            assert_eq!(data["level_up"], false);
        }))
        // passing again earns nothing
        .step(submit_action(&[0], &[0, 2]).assert_json(|body| {
            assert_eq!(body["data"]["attempt"]["passed"], true);
            assert_eq!(body["data"]["attempt"]["xp_awarded"], 0);
        }))
        .step(
            submit_action(&[0], &[0, 2])
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| assert_eq!(body["success"], false)),
        )
        .step(quiz_path("/attempts").assert_json(|body| {
            let attempts = body["data"].as_array().unwrap();
            assert_eq!(attempts.len(), 4);
            assert_eq!(attempts[0]["attempt_number"], 4);
        }))
        .step(Action::new("me", "GET", "/api/auth/me").assert_json(|body| {
            assert_eq!(body["data"]["total_xp"], 50);
            assert_eq!(body["data"]["badges"][0], "perfectionist");
        }))
        .step(login_admin_action())
        .step(quiz_path("/stats").assert_json(|body| {
            let stats = &body["data"];
            assert_eq!(stats["total_attempts"], 4);
            assert_eq!(stats["unique_users"], 1);
            assert_eq!(stats["highest_score"], 100);
            assert_eq!(stats["pass_rate"], 50.0);
        }))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_quiz_submit_requires_login_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(login_admin_action())
        .step(create_course_action("Rust Basics").with_save_as("course"))
        .step(create_quiz_action())
        .step(
            submit_action(&[0], &[0, 2])
                .with_clear_cookies(true)
                .with_expect(StatusCode::UNAUTHORIZED),
        )
        .step(login_action("admin", "admin"))
        .step(
            Action::new("delete_quiz", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/quiz/{}", ctx.id("quiz"))),
        )
        .step(quiz_path("").with_expect(StatusCode::NOT_FOUND))
        .run(&mut server, pool)
        .await;
}

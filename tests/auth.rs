mod common;
use axum::http::StatusCode;
use learnquest::web::middlewares::AUTH_TOKEN;
use serde_json::json;
use tower_cookies::cookie::SameSite;

use crate::common::{
    Action, Flow, login_action, login_admin_action, logout_action, register_action,
    setup_server, setup_test_db,
};

#[tokio::test]
async fn route_register_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            register_action("ferris", "crab123")
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.same_site(), Some(SameSite::Lax));
                    assert_eq!(cookie.path(), Some("/"));
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_json(|body| {
                    assert_eq!(body["success"], true);
                    assert_eq!(body["data"]["user"]["username"], "ferris");
                    assert_eq!(body["data"]["user"]["role"], "student");
                    assert_eq!(body["data"]["user"]["level"], 1);
                    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
                }),
        )
        // same username again
        .step(
            register_action("ferris", "crab123")
                .with_expect(StatusCode::CONFLICT)
                .assert_json(|body| assert_eq!(body["success"], false)),
        )
        // same email, different username
        .step(
            Action::new("register", "POST", "/api/auth/register")
                .with_body(json!({
                    "username": "ferris2",
                    "email": "FERRIS@learnquest.test",
                    "password": "crab123",
                }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("register_invalid", "POST", "/api/auth/register")
                .with_body(json!({
                    "username": "no spaces allowed",
                    "email": "nobody@learnquest.test",
                    "password": "crab123",
                }))
                .with_expect(StatusCode::BAD_REQUEST)
                .assert_json(|body| {
                    assert_eq!(body["success"], false);
                    assert!(body["message"].as_str().unwrap().contains("username"));
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_login_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(register_action("LOGINTEST", "LOGINTEST").with_save_cookies(false))
        .step(
            login_action("LOGINTEST", "LOGINTEST")
                .with_clear_cookies(true)
                .assert_cookie(AUTH_TOKEN, |cookie| {
                    assert_eq!(cookie.http_only(), Some(true));
                })
                .assert_json(|body| {
                    assert_eq!(body["data"]["user"]["username"], "LOGINTEST");
                    assert_eq!(body["message"], "Login successful");
                }),
        )
        .step(
            Action::new("me", "GET", "/api/auth/me")
                .assert_json(|body| assert_eq!(body["data"]["username"], "LOGINTEST")),
        )
        // email works as the login too
        .step(
            Action::new("login_by_email", "POST", "/api/auth/login").with_body(json!({
                "email": "logintest@learnquest.test",
                "password": "LOGINTEST",
            })),
        )
        .step(
            login_action("LOGINTEST", "WRONGPASSWORD")
                .with_save_cookies(false)
                .with_expect(StatusCode::UNAUTHORIZED)
                .assert_body(|body| assert!(body.contains("Authentication error"))),
        )
        .step(
            login_action("nonexisting", "nvm")
                .with_expect(StatusCode::UNAUTHORIZED)
                .assert_body(|body| assert!(body.contains("Authentication error"))),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_logout_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(register_action("bye", "byebye"))
        .step(Action::new("me", "GET", "/api/auth/me"))
        .step(logout_action())
        .step(Action::new("me", "GET", "/api/auth/me").with_expect(StatusCode::UNAUTHORIZED))
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_list_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(register_action("FOOBAR", "FOOBAZ"))
        .step(
            Action::new("user_list", "GET", "/api/users")
                .with_param("limit", "5")
                .with_expect(StatusCode::FORBIDDEN)
                .assert_json(|body| assert_eq!(body["success"], false)),
        )
        .step(login_admin_action())
        .step(
            Action::new("user_list", "GET", "/api/users")
                .with_param("page", "1")
                .with_param("limit", "1")
                .assert_json(|body| {
                    let page = &body["data"];
                    assert_eq!(page["total"], 2);
                    assert_eq!(page["limit"], 1);
                    assert_eq!(page["pages"], 2);
                    assert_eq!(page["items"].as_array().unwrap().len(), 1);
                }),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_profile_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(register_action("owner", "owner123").with_save_as("owner"))
        .step(
            Action::new("own_profile", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("owner")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["email"], "owner@learnquest.test");
                }),
        )
        .step(register_action("stranger", "stranger123").with_clear_cookies(true))
        .step(
            Action::new("foreign_profile", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("owner")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["username"], "owner");
                    assert!(body["data"].get("email").is_none());
                }),
        )
        .step(
            Action::new("stats", "GET", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}/stats", ctx.id("owner")))
                .assert_json(|body| {
                    assert_eq!(body["data"]["enrolled_courses"], 0);
                    assert_eq!(body["data"]["level_progress"]["level"], 1);
                }),
        )
        .step(
            Action::new("missing_user", "GET", "/api/users/00000000-0000-0000-0000-000000000001")
                .with_expect(StatusCode::NOT_FOUND),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_update_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            register_action("FOOBAR", "FOOBAZ")
                .with_save_cookies(false)
                .with_save_as("foobar_user"),
        )
        .step(register_action("FOOBAR2", "FOOBAZ2").with_save_as("foobar2_user"))
        // someone else's account
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar_user")))
                .with_body(json!({ "username": "should_fail" }))
                .with_expect(StatusCode::FORBIDDEN),
        )
        .step(
            Action::new("user_update", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar2_user")))
                .with_body(json!({
                    "username": "FOOBAR3",
                    "password": "new-password",
                    "preferences": { "theme": "dark", "notifications": false },
                }))
                .assert_json(|body| {
                    assert_eq!(body["data"]["username"], "FOOBAR3");
                    assert_eq!(body["data"]["preferences"]["theme"], "dark");
                    assert_eq!(body["data"]["preferences"]["daily_goal_minutes"], 15);
                }),
        )
        .step(login_action("FOOBAR3", "new-password").with_clear_cookies(true))
        .step(login_admin_action())
        .step(
            Action::new("user_update_as_admin", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar_user")))
                .with_body(json!({ "username": "FOOBAR4" }))
                .assert_json(|body| assert_eq!(body["data"]["username"], "FOOBAR4")),
        )
        // taken by FOOBAR2, now FOOBAR3
        .step(
            Action::new("user_update_conflict", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar_user")))
                .with_body(json!({ "username": "FOOBAR3" }))
                .with_expect(StatusCode::CONFLICT),
        )
        .step(
            Action::new("user_update_invalid", "PUT", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar_user")))
                .with_body(json!({ "email": "not-an-email" }))
                .with_expect(StatusCode::BAD_REQUEST),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_user_delete_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            register_action("FOOBAR", "FOOBAZ")
                .with_save_cookies(false)
                .with_save_as("foobar"),
        )
        .step(register_action("FOOBAZ", "FOOBAR").with_save_as("foobaz"))
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar")))
                .with_expect(StatusCode::FORBIDDEN),
        )
        // self deletion is allowed
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobaz"))),
        )
        .step(login_admin_action())
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobaz")))
                .with_expect(StatusCode::NOT_FOUND),
        )
        .step(
            Action::new("user_delete", "DELETE", "dynamic")
                .with_dyn_path(|ctx| format!("/api/users/{}", ctx.id("foobar"))),
        )
        .run(&mut server, pool)
        .await;
}

#[tokio::test]
async fn route_fallback_and_health_test() {
    let pool = setup_test_db().await;
    let mut server = setup_server(&pool).await;

    Flow::new()
        .step(
            Action::new("health", "GET", "/api/health")
                .assert_json(|body| assert_eq!(body["data"]["status"], "ok")),
        )
        .step(
            Action::new("unknown_route", "GET", "/api/nope")
                .with_expect(StatusCode::NOT_FOUND)
                .assert_json(|body| {
                    assert_eq!(body["success"], false);
                    assert!(body["message"].as_str().unwrap().contains("/api/nope"));
                }),
        )
        .run(&mut server, pool)
        .await;
}

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use mangati_core::{DatabaseService, Role};
use serde_json::json;

#[tokio::test]
async fn register_login_and_me() {
    let app = common::app();
    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({
                "username": "hana",
                "email": "hana@mangati.app",
                "password": "correct horse",
                "role": "WRITER"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["roles"], json!(["Writer"]));
    assert!(body["user"]["createdAt"].is_string());

    let (status, login) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "hana@mangati.app", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap();

    let (status, me) = app.send("GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "hana");
    assert_eq!(me["email"], "hana@mangati.app");
    assert_eq!(me["roles"], json!(["Writer"]));
}

#[tokio::test]
async fn unknown_role_names_register_as_viewer() {
    let app = common::app();
    let user = app.register("kei", "superuser").await;
    let (_, me) = app.send("GET", "/api/auth/me", Some(&user.token), None).await;
    assert_eq!(me["roles"], json!(["Viewer"]));
}

#[tokio::test]
async fn duplicate_registrations_are_rejected() {
    let app = common::app();
    app.register("mio", "Viewer").await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "other", "email": "MIO@mangati.app", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email is already registered");

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/register",
            None,
            Some(json!({ "username": "mio", "email": "mio2@mangati.app", "password": "correct horse" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Username is already taken");
}

#[tokio::test]
async fn registration_input_is_validated() {
    let app = common::app();
    for payload in [
        json!({ "username": "", "email": "a@mangati.app", "password": "correct horse" }),
        json!({ "username": "a", "email": "not-an-email", "password": "correct horse" }),
        json!({ "username": "a", "email": "a@mangati.app", "password": "short" }),
    ] {
        let (status, _) = app.send("POST", "/api/auth/register", None, Some(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let app = common::app();
    app.register("yuki", "Viewer").await;

    let (status, wrong_password) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "yuki@mangati.app", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, unknown_email) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "nobody@mangati.app", "password": "wrong password" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_email);
}

#[tokio::test]
async fn missing_invalid_and_expired_tokens_are_unauthenticated() {
    let app = common::app();
    let user = app.register("ren", "Viewer").await;

    let (status, _) = app.send("GET", "/api/auth/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send("GET", "/api/auth/me", Some("not.a.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stored = app.db.get_user_by_id(user.id).await.unwrap();
    let expired = app
        .state
        .issuer
        .issue_at(&stored, &[Role::Viewer], Utc::now() - Duration::hours(5))
        .unwrap();
    let (status, _) = app
        .send("GET", "/api/auth/me", Some(&expired.token), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_mints_a_new_token_with_current_roles() {
    let app = common::app();
    let user = app.register("sora", "Writer").await;

    let (status, body) = app
        .send("POST", "/api/auth/refresh", Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap();
    assert_ne!(fresh, user.token);
    assert_eq!(body["user"]["roles"], json!(["Writer"]));

    let (status, _) = app.send("POST", "/api/auth/refresh", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn debug_echoes_role_claims() {
    let app = common::app();
    let user = app.register("aoi", "Writer").await;

    let (status, body) = app
        .send("GET", "/api/auth/debug", Some(&user.token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["roleClaims"], json!(["Writer"]));
    assert_eq!(body["isInWriterRole"], true);
    assert_eq!(body["isInAdminRole"], false);
    assert_eq!(body["isInWriterRoleUppercase"], false);
}

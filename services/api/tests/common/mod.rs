//! Shared fixtures for the HTTP-level tests: an in-memory app, request helpers
//! and shortcuts for registering users of each role.

#![allow(dead_code)]

use api_lib::{
    adapters::MemoryDb,
    config::{Config, JwtSettings},
    web::{self, state::AppState},
};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use mangati_core::{DatabaseService, SubscriptionStatus};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub db: Arc<MemoryDb>,
    pub state: Arc<AppState>,
}

pub struct TestUser {
    pub id: Uuid,
    pub token: String,
}

pub fn config() -> Config {
    Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: None,
        log_level: tracing::Level::DEBUG,
        cors_origins: vec![],
        jwt: JwtSettings {
            secret_key: "integration-secret-integration-secret".to_string(),
            token_lifetime_minutes: 240,
            issuer: Some("mangati".to_string()),
            audience: Some("mangati-client".to_string()),
            validate_issuer: true,
            validate_audience: true,
        },
        seed_admin: None,
    }
}

pub fn app() -> TestApp {
    let db = Arc::new(MemoryDb::new());
    let port: Arc<dyn DatabaseService> = db.clone();
    let state = Arc::new(AppState::new(port, Arc::new(config())).unwrap());
    TestApp {
        router: web::router(state.clone()),
        db,
        state,
    }
}

impl TestApp {
    /// Sends one request and returns the status and the JSON body (`Null` when empty).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.send_raw(method, uri, token, body).await;
        (status, body)
    }

    pub async fn send_raw(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, json)
    }

    pub async fn register(&self, username: &str, role: &str) -> TestUser {
        let (status, body) = self
            .send(
                "POST",
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@mangati.app", username),
                    "password": "correct horse",
                    "role": role,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "register {}: {}", username, body);
        TestUser {
            id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
            token: body["token"].as_str().unwrap().to_string(),
        }
    }

    pub async fn subscribe(&self, user: &TestUser, plan_name: &str, status: SubscriptionStatus) {
        let plan = self
            .db
            .list_plans()
            .await
            .unwrap()
            .into_iter()
            .find(|p| p.name == plan_name)
            .unwrap();
        self.db
            .upsert_subscription(user.id, plan.id, status, chrono::Utc::now())
            .await
            .unwrap();
    }

    pub async fn create_series(&self, author: &TestUser, title: &str) -> i64 {
        let (status, body) = self
            .send(
                "POST",
                "/api/mangaseries",
                Some(&author.token),
                Some(json!({
                    "title": title,
                    "synopsis": "A story",
                    "coverImageUrl": "https://img.example/cover.png",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create series: {}", body);
        body["id"].as_i64().unwrap()
    }

    pub async fn upload(&self, user: &TestUser, series_id: i64, title: &str) -> (StatusCode, Value) {
        self.send(
            "POST",
            &format!("/api/manga/{}/chapter", series_id),
            Some(&user.token),
            Some(json!({
                "title": title,
                "pages": [
                    { "imageUrl": "https://img.example/p1.png", "fileSizeBytes": 2048 },
                    { "imageUrl": "https://img.example/p2.png", "fileSizeBytes": 4096 }
                ]
            })),
        )
        .await
    }
}

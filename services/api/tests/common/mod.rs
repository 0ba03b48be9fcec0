#![allow(dead_code)]

use api_lib::{
    adapters::InMemoryDatabase,
    config::Config,
    security::hash_password,
    web::{build_router, AppState},
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use http_body_util::BodyExt;
use reading_practice_core::domain::{Level, NewUser, Role};
use reading_practice_core::ports::DatabaseService;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "secret123";

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub db: Arc<InMemoryDatabase>,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = [
        ("DATABASE_URL", "postgres://unused/test"),
        ("JWT_SECRET", "integration-test-secret"),
        ("APP_ENV", "test"),
        ("REGISTER_RATE_LIMIT_MAX", "1000"),
        ("RATE_LIMIT_MAX_REQUESTS", "1000"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(move |key| vars.get(key).cloned()).expect("test config")
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(&[])
}

pub fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let db = Arc::new(InMemoryDatabase::new());
    let state = Arc::new(AppState::new(db.clone(), test_config(overrides)));
    let router = build_router(state.clone()).expect("router");
    TestApp { router, state, db }
}

pub struct Session {
    pub user_id: String,
    pub token: String,
    pub refresh_token: String,
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        read_json(self.send(Method::GET, uri, Some(token), None).await).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        read_json(self.send(Method::POST, uri, token, Some(body)).await).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        read_json(self.send(Method::PUT, uri, Some(token), Some(body)).await).await
    }

    pub async fn register(&self, email: &str, role: &str, class_id: Option<&str>) -> Session {
        let (status, body) = self
            .post(
                "/api/auth/register",
                None,
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": "Test User",
                    "role": role,
                    "classId": class_id,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        session_from(&body)
    }

    /// Admins cannot self-register, so they are inserted directly.
    pub async fn admin(&self, email: &str) -> Session {
        let user = self
            .db
            .create_user(NewUser {
                email: email.to_string(),
                hashed_password: hash_password(PASSWORD).unwrap(),
                name: "Admin".to_string(),
                role: Role::Admin,
                level: Level::Advanced,
                class_id: None,
            })
            .await
            .unwrap();
        let tokens = self.state.credentials.issue(&user).unwrap();
        Session {
            user_id: user.id.to_string(),
            token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        }
    }

    pub async fn create_poem(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .post(
                "/api/poems",
                Some(token),
                json!({
                    "title": title,
                    "author": "Anon",
                    "content": "Roses are red,\nviolets are blue.",
                    "theme": "Nature",
                    "level": "beginner",
                    "difficulty": "easy",
                    "duration": 2,
                    "tags": ["nature"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "poem failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

pub fn session_from(body: &Value) -> Session {
    Session {
        user_id: body["data"]["user"]["id"].as_str().unwrap().to_string(),
        token: body["data"]["token"].as_str().unwrap().to_string(),
        refresh_token: body["data"]["refreshToken"].as_str().unwrap().to_string(),
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

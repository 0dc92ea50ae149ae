//! Common test utilities for integration tests
//!
//! Builds the full router on top of the in-memory store and a recording
//! notifier, mints session tokens for test users and wraps `oneshot`
//! requests.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use boardly_api::{
    app::{build_router, AppState},
    config::{
        ApiConfig, AuthConfig, BillingConfig, Config, CronConfig, DatabaseConfig,
        NotificationConfig, RateLimitConfig,
    },
};
use boardly_shared::{
    auth::jwt::{create_token, Claims},
    models::entitlement::Entitlement,
    notify::RecordingNotifier,
    store::{memory::MemoryStore, EntitlementRepo, ProfileRepo},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
pub const CRON_SECRET: &str = "cron-secret-for-tests-0001";
pub const PADDLE_SECRET: &str = "pdl_ntfset_integration";

pub fn test_config(requests_per_window: u32) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
        },
        database: DatabaseConfig {
            url: None,
            max_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            service_role_key: None,
            supabase_url: None,
        },
        cron: CronConfig {
            secret: CRON_SECRET.to_string(),
        },
        notifications: NotificationConfig {
            resend_api_key: None,
            email_from: "Boardly <test@boardly.app>".to_string(),
            app_url: "http://localhost:3000".to_string(),
        },
        billing: BillingConfig {
            paddle_webhook_secret: Some(PADDLE_SECRET.to_string()),
        },
        rate_limit: RateLimitConfig {
            requests_per_window,
            window_secs: 60,
        },
    }
}

/// A user with a valid session token
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

impl TestUser {
    pub fn new(email: &str) -> Self {
        let id = Uuid::new_v4();
        let token = create_token(&Claims::new(id, Some(email.to_string())), JWT_SECRET)
            .expect("token signs");
        TestUser {
            id,
            email: email.to_string(),
            token,
        }
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub state: AppState,
    pub app: Router,
    pub user: TestUser,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_rate_limit(1_000).await
    }

    pub async fn with_rate_limit(requests_per_window: u32) -> Self {
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let state = AppState::new(store.clone(), notifier.clone(), test_config(requests_per_window));
        let app = build_router(state.clone());

        TestContext {
            store,
            notifier,
            state,
            app,
            user: TestUser::new("owner@example.com"),
        }
    }

    /// Creates a profile with the admin flag and returns a session for it
    pub async fn admin(&self) -> TestUser {
        let admin = TestUser::new("admin@example.com");
        let mut profile = self.store.ensure_profile(admin.id, &admin.email).await.unwrap();
        profile.is_admin = true;
        self.store.save_profile(&profile).await.unwrap();
        admin
    }

    pub async fn entitlement(&self, user_id: Uuid) -> Entitlement {
        self.store.get_or_create_entitlement(user_id).await.unwrap()
    }

    pub async fn save_entitlement(&self, ent: &Entitlement) {
        self.store.save_entitlement(ent).await.unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Sends a JSON request as `user` and returns status plus parsed body
    pub async fn call_as(
        &self,
        user: &TestUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, user.bearer());
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self.send(builder.body(body).unwrap()).await;
        split(response).await
    }

    pub async fn call(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let user = self.user.clone();
        self.call_as(&user, method, uri, body).await
    }

    /// POSTs to a cron endpoint with the given secret
    pub async fn cron(&self, uri: &str, secret: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", secret))
            .body(Body::empty())
            .unwrap();
        split(self.send(request).await).await
    }

    /// Creates a board as the default user and returns its JSON
    pub async fn create_board(&self, title: &str) -> Value {
        let (status, body) = self
            .call(Method::POST, "/api/boards", Some(serde_json::json!({ "title": title })))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create board failed: {}", body);
        body
    }

    /// Creates a task at the top of `column_id`
    pub async fn create_task(&self, board_id: &str, column_id: &str, title: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                &format!("/api/boards/{}/tasks", board_id),
                Some(serde_json::json!({ "columnId": column_id, "title": title })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create task failed: {}", body);
        body
    }

    /// Titles of a column's active tasks in position order
    pub async fn column_titles(&self, board_id: &str, column_index: usize) -> Vec<(String, i64)> {
        let (status, board) = self
            .call(Method::GET, &format!("/api/boards/{}", board_id), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        board["columns"][column_index]["tasks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| {
                (
                    t["title"].as_str().unwrap().to_string(),
                    t["position"].as_i64().unwrap(),
                )
            })
            .collect()
    }
}

pub async fn split(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

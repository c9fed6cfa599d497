use std::{net::SocketAddr, sync::Arc};

use agriqual::{
    accounts::MemoryAccounts,
    build_router,
    cache::MemoryCache,
    config::Config,
    mailer::RecordingMailer,
    otp::ScriptedOtp,
    state::{Backends, State},
};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tokio::net::TcpListener;

struct TestServer {
    base: String,
    client: Client,
    mailer: Arc<RecordingMailer>,
}

impl TestServer {
    async fn start(codes: &[&str]) -> Self {
        let config = Config {
            jwt_secret: "integration-secret".to_string(),
            password_iterations: 10,
            ..Config::default()
        };
        let mailer = Arc::new(RecordingMailer::new());

        let state = State::with_backends(
            config,
            Backends {
                cache: Arc::new(MemoryCache::new()),
                accounts: Arc::new(MemoryAccounts::new()),
                mailer: mailer.clone(),
                otp: Arc::new(ScriptedOtp::new(codes.iter().copied())),
            },
        )
        .expect("state");

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, build_router(state))
                .await
                .expect("serve");
        });

        Self {
            base: format!("http://{addr}"),
            client: Client::new(),
            mailer,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .expect("request");
        let status = response.status();
        (status, response.json().await.expect("json body"))
    }
}

#[tokio::test]
async fn health_endpoints_respond() {
    let server = TestServer::start(&["123456"]).await;

    for path in ["/health", "/api/health"] {
        let body: Value = server
            .client
            .get(format!("{}{path}", server.base))
            .send()
            .await
            .expect("request")
            .json()
            .await
            .expect("json");
        assert_eq!(body, json!({ "ok": true }));
    }
}

#[tokio::test]
async fn otp_signup_end_to_end() {
    let server = TestServer::start(&["123456"]).await;

    let (status, body) = server
        .post(
            "/api/auth/register-otp",
            json!({ "name": "A", "email": "A@B.com", "password": "longenough1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "OTP sent to email for verification");
    assert!(!body.to_string().contains("123456"));
    assert_eq!(
        server.mailer.last_code_for("a@b.com").await.as_deref(),
        Some("123456")
    );

    let (status, body) = server
        .post(
            "/api/auth/verify-otp",
            json!({ "email": "a@b.com", "otp": "000000" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid OTP. 4 attempt(s) remaining");

    let (status, body) = server
        .post(
            "/api/auth/verify-otp",
            json!({ "email": "a@b.com", "otp": "123456" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "a@b.com");
    assert_eq!(body["user"]["role"], "farmer");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert!(body["user"].get("password_hash").is_none());

    let (status, body) = server
        .post(
            "/api/auth/verify-otp",
            json!({ "email": "a@b.com", "otp": "123456" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "OTP expired or not found. Please sign up again."
    );

    let (status, _) = server
        .post(
            "/api/auth/login",
            json!({ "email": "a@b.com", "password": "longenough1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn signup_rejects_existing_account() {
    let server = TestServer::start(&["123456"]).await;

    let (status, _) = server
        .post(
            "/api/auth/register",
            json!({ "name": "A", "email": "a@b.com", "password": "longenough1", "role": "inspector" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .post(
            "/api/auth/register-otp",
            json!({ "name": "A", "email": "a@b.com", "password": "longenough1" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "User already exists with this email");
}

#[tokio::test]
async fn bad_payloads_are_client_errors() {
    let server = TestServer::start(&["123456"]).await;

    let (status, body) = server
        .post("/api/auth/register-otp", json!({ "email": "a@b.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Name, email and password are required");

    let response = server
        .client
        .post(format!("{}/api/auth/verify-otp", server.base))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["message"], "Malformed payload");
}

#[tokio::test]
async fn login_and_change_password() {
    let server = TestServer::start(&["123456"]).await;

    let (_, registered) = server
        .post(
            "/api/auth/register",
            json!({ "name": "A", "email": "a@b.com", "password": "original1" }),
        )
        .await;
    let token = registered["token"].as_str().expect("token").to_string();

    let (status, body) = server
        .post(
            "/api/auth/login",
            json!({ "email": "a@b.com", "password": "wrong" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid credentials");

    let unauthorized = server
        .client
        .post(format!("{}/api/account/change-password", server.base))
        .json(&json!({ "oldPassword": "original1", "newPassword": "replacement1" }))
        .send()
        .await
        .expect("request");
    assert_eq!(unauthorized.status(), StatusCode::UNAUTHORIZED);

    let changed = server
        .client
        .post(format!("{}/api/account/change-password", server.base))
        .bearer_auth(&token)
        .json(&json!({ "oldPassword": "original1", "newPassword": "replacement1" }))
        .send()
        .await
        .expect("request");
    assert_eq!(changed.status(), StatusCode::OK);

    let (status, body) = server
        .post(
            "/api/auth/login",
            json!({ "email": "a@b.com", "password": "replacement1" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
}

#[tokio::test]
async fn cors_preflight_allows_known_origins_only() {
    let server = TestServer::start(&["123456"]).await;

    let preflight = |origin: &'static str| {
        server
            .client
            .request(
                reqwest::Method::OPTIONS,
                format!("{}/api/auth/login", server.base),
            )
            .header("origin", origin)
            .header("access-control-request-method", "POST")
            .send()
    };

    let allowed = preflight("https://feature-branch.vercel.app")
        .await
        .expect("request");
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("https://feature-branch.vercel.app")
    );
    assert_eq!(
        allowed
            .headers()
            .get("access-control-allow-credentials")
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );

    let blocked = preflight("https://example.com").await.expect("request");
    assert!(blocked.headers().get("access-control-allow-origin").is_none());
}

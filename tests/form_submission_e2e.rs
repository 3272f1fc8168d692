use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use dacosta_forms::{
    config::{Config, EmailJsConfig},
    crypto::clock::{Clock, MockClock, SystemClock},
    crypto::csrf::{CsrfSecret, TOKEN_TTL_MS},
    middleware_layer::csrf::{MAX_FORM_BODY_BYTES, verify_csrf},
    state::AppState,
};
use once_cell::sync::Lazy;
use serde_json::{Value, json};
use tower_cookies::CookieManagerLayer;

const SECRET: &str = "test-secret-32-chars-minimum-xx";

static TRACING: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
});

fn test_config() -> Config {
    Config {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        production: false,
        csrf_secret: CsrfSecret::new(SECRET),
        csrf_cookie_binding: false,
        allowed_origins: vec!["http://localhost:3000".to_string()],
        public_dir: "public".into(),
        emailjs: Some(EmailJsConfig {
            service_id: "service_test".to_string(),
            template_id: "template_test".to_string(),
            public_key: "public_test".to_string(),
        }),
    }
}

// Shared test context
struct TestContext {
    client: reqwest::Client,
    base_url: String,
}

impl TestContext {
    async fn start(config: Config, clock: Arc<dyn Clock>) -> Self {
        Lazy::force(&TRACING);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::with_clock(config, clock);
        tokio::spawn(async move {
            dacosta_forms::serve(listener, state).await.unwrap();
        });

        Self {
            client: reqwest::Client::builder()
                .cookie_store(true)
                .build()
                .unwrap(),
            base_url: format!("http://{}", addr),
        }
    }

    async fn with_config(config: Config) -> Self {
        Self::start(config, Arc::new(SystemClock)).await
    }

    async fn fetch_token(&self) -> String {
        let response = self
            .client
            .get(format!("{}/api/csrf-token", self.base_url))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200, "Token request failed");

        let body: Value = response.json().await.unwrap();
        body["csrf_token"].as_str().unwrap().to_string()
    }

    async fn post_contact(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api/contact", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

fn contact_body(token: &str) -> Value {
    json!({
        "name": "Ana Silva",
        "email": "ana@example.com",
        "subject": "Booking request",
        "message": "Is the artist available in May?",
        "csrf_token": token
    })
}

#[tokio::test]
async fn token_endpoint_returns_signed_token() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let parts: Vec<&str> = token.split('|').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0].len(), 64);
    assert!(parts[1].parse::<i64>().is_ok());
    assert_eq!(parts[2].len(), 64);
}

#[tokio::test]
async fn contact_form_accepts_fresh_token() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["emailjs"]["serviceId"], "service_test");
    assert_eq!(body["emailjs"]["templateId"], "template_test");
    assert_eq!(body["emailjs"]["publicKey"], "public_test");
    assert_eq!(body["emailjs"]["templateParams"]["from_name"], "Ana Silva");
    assert_eq!(body["emailjs"]["templateParams"]["reply_to"], "ana@example.com");
}

#[tokio::test]
async fn token_can_be_reused_within_window() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    for _ in 0..3 {
        let response = context.post_contact(contact_body(&token)).await;
        assert_eq!(response.status().as_u16(), 200);
    }
}

#[tokio::test]
async fn contact_form_without_token_is_forbidden() {
    let context = TestContext::with_config(test_config()).await;

    let response = context
        .post_contact(json!({
            "name": "Ana Silva",
            "email": "ana@example.com",
            "subject": "Booking request",
            "message": "Hello"
        }))
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Invalid security token");
}

#[tokio::test]
async fn forged_token_is_forbidden() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let mut forged = token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == 'a' { 'b' } else { 'a' });

    let response = context.post_contact(contact_body(&forged)).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = context.post_contact(contact_body("not-a-token")).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn token_from_another_secret_is_forbidden() {
    let issuer = TestContext::with_config(Config {
        csrf_secret: CsrfSecret::new("a-completely-different-secret-value"),
        ..test_config()
    })
    .await;
    let token = issuer.fetch_token().await;

    let context = TestContext::with_config(test_config()).await;
    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn expired_token_is_forbidden() {
    let clock = Arc::new(MockClock::new(1_700_000_000_000));
    let context = TestContext::start(test_config(), clock.clone()).await;
    let token = context.fetch_token().await;

    clock.advance(1_000);
    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 200);

    clock.advance(TOKEN_TTL_MS + 1);
    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn contact_form_requires_all_fields() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .post_contact(json!({
            "name": "Ana Silva",
            "email": "ana@example.com",
            "subject": "   ",
            "message": "Hello",
            "csrf_token": token
        }))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "All fields are required");
}

#[tokio::test]
async fn contact_form_without_emailjs_fails() {
    let context = TestContext::with_config(Config {
        emailjs: None,
        ..test_config()
    })
    .await;
    let token = context.fetch_token().await;

    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Email delivery is not configured");
}

#[tokio::test]
async fn newsletter_accepts_token_in_header() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .header("X-CSRF-Token", &token)
        .json(&json!({ "email": "fan@example.com" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Thank you for subscribing to our newsletter!");
}

#[tokio::test]
async fn newsletter_rejects_invalid_email() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .json(&json!({ "email": "not an email", "csrf_token": token }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Please provide a valid email address.");
}

#[tokio::test]
async fn missing_secret_fails_generation() {
    let context = TestContext::with_config(Config {
        csrf_secret: None,
        ..test_config()
    })
    .await;

    let response = context
        .client
        .get(format!("{}/api/csrf-token", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 500);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Failed to generate security token");
}

#[tokio::test]
async fn cookie_binding_requires_issuing_cookie() {
    let context = TestContext::with_config(Config {
        csrf_cookie_binding: true,
        ..test_config()
    })
    .await;

    let response = context
        .client
        .get(format!("{}/api/csrf-token", context.base_url))
        .send()
        .await
        .unwrap();
    let cookie = response
        .cookies()
        .find(|c| c.name() == "csrf_token")
        .expect("CSRF cookie not set");
    assert!(cookie.http_only());
    let token = cookie.value().to_string();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["csrf_token"], token.as_str());

    // same client carries the cookie
    let response = context.post_contact(contact_body(&token)).await;
    assert_eq!(response.status().as_u16(), 200);

    // a client without the cookie replays the token
    let stranger = reqwest::Client::new();
    let response = stranger
        .post(format!("{}/api/contact", context.base_url))
        .json(&contact_body(&token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn debug_endpoint_hides_secret() {
    let context = TestContext::with_config(test_config()).await;

    let response = context
        .client
        .get(format!("{}/api/csrf/debug", context.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let text = response.text().await.unwrap();
    assert!(!text.contains(SECRET));
    let body: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(body["csrf_secret_defined"], true);
    assert_eq!(body["csrf_secret_length"], SECRET.len());
    assert_eq!(body["cookie_binding"], false);

    let production = TestContext::with_config(Config {
        production: true,
        ..test_config()
    })
    .await;
    let response = production
        .client
        .get(format!("{}/api/csrf/debug", production.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn newsletter_accepts_hidden_form_field() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .form(&[("email", "fan@example.com"), ("csrf_token", token.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn form_post_with_forged_token_is_forbidden() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;
    let mut forged = token.clone();
    let last = forged.pop().unwrap();
    forged.push(if last == '0' { '1' } else { '0' });

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .form(&[("email", "fan@example.com"), ("csrf_token", forged.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn contact_form_accepts_form_post() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .client
        .post(format!("{}/api/contact", context.base_url))
        .form(&[
            ("name", "Ana Silva"),
            ("email", "ana@example.com"),
            ("subject", "Booking request"),
            ("message", "Is the artist available in May?"),
            ("csrf_token", token.as_str()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["emailjs"]["templateParams"]["subject"], "Booking request");
}

fn oversized_json() -> String {
    format!(
        r#"{{"email":"fan@example.com","padding":"{}"}}"#,
        "x".repeat(MAX_FORM_BODY_BYTES)
    )
}

#[tokio::test]
async fn oversized_body_without_header_token_is_rejected_by_guard() {
    let context = TestContext::with_config(test_config()).await;

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .header("Content-Type", "application/json")
        .body(oversized_json())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Request body too large");
}

#[tokio::test]
async fn oversized_body_with_header_token_hits_body_limit() {
    let context = TestContext::with_config(test_config()).await;
    let token = context.fetch_token().await;

    let response = context
        .client
        .post(format!("{}/api/newsletter", context.base_url))
        .header("X-CSRF-Token", &token)
        .header("Content-Type", "application/json")
        .body(oversized_json())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 413);
}

#[tokio::test]
async fn safe_methods_skip_the_guard() {
    Lazy::force(&TRACING);
    let state = AppState::new(test_config());
    let app = Router::new()
        .route("/guarded", get(|| async { "ok" }).post(|| async { "posted" }))
        .route_layer(from_fn_with_state(state.clone(), verify_csrf))
        .layer(CookieManagerLayer::new())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let url = format!("http://{}/guarded", addr);

    let response = client.get(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    let response = client.head(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = client
        .request(reqwest::Method::OPTIONS, &url)
        .send()
        .await
        .unwrap();
    assert_ne!(response.status().as_u16(), 403);

    let response = client.post(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn safe_methods_on_form_routes_are_not_forbidden() {
    let context = TestContext::with_config(test_config()).await;

    for method in [reqwest::Method::GET, reqwest::Method::HEAD] {
        let response = context
            .client
            .request(method.clone(), format!("{}/api/contact", context.base_url))
            .send()
            .await
            .unwrap();
        assert_ne!(response.status().as_u16(), 403, "{method} was forbidden");
    }
}

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use http::{HeaderName, HeaderValue, Method, header};
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

pub mod config;
pub mod error;
pub mod state;

pub mod crypto {
    pub mod clock;
    pub mod csrf;
}

pub mod handlers {
    pub mod body;
    pub mod contact;
    pub mod csrf;
    pub mod newsletter;
}

pub mod middleware_layer {
    pub mod csrf;
}

pub mod services {
    pub mod contact;
}

pub mod validation {
    pub mod forms;
}

use middleware_layer::csrf::{CSRF_HEADER, MAX_FORM_BODY_BYTES};
use state::AppState;

/// Seconds between rate limiter replenishments on the form routes.
const FORM_REPLENISH_SECS: u64 = 3;
/// Submissions a single IP may burst on the form routes.
const FORM_BURST_SIZE: u32 = 20;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(CSRF_HEADER),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400))
}

/// Builds the application router.
///
/// The form routes require a valid CSRF token; the router must be served
/// with connect info (see [`serve`]) for per-IP rate limiting.
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let form_governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(FORM_REPLENISH_SECS)
            .burst_size(FORM_BURST_SIZE)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let token_routes = Router::new()
        .route("/api/csrf-token", get(handlers::csrf::issue_token))
        .route("/api/csrf/debug", get(handlers::csrf::debug_environment))
        .with_state(state.clone());

    let form_routes = Router::new()
        .route("/api/contact", post(handlers::contact::submit_contact))
        .route("/api/newsletter", post(handlers::newsletter::subscribe))
        .layer(tower_governor::GovernorLayer::new(form_governor_conf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::csrf::verify_csrf,
        ))
        .with_state(state.clone());

    let app = Router::new()
        .merge(token_routes)
        .merge(form_routes)
        .fallback_service(ServeDir::new(&state.config.public_dir))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default())
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(MAX_FORM_BODY_BYTES))
        .layer(cors_layer(&state.config.allowed_origins));

    Ok(app)
}

/// Serves the application on an already bound listener until it fails.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state)?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

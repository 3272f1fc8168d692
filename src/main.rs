use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dacosta_forms::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    // No token may be issued without a secret, so refuse to start at all.
    config.require_csrf_secret()?;
    tracing::info!("✅ Configuration loaded successfully");

    let addr = config.bind_addr;
    let state = AppState::new(config);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    dacosta_forms::serve(listener, state).await
}

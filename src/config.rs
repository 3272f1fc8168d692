use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::crypto::csrf::CsrfSecret;

/// EmailJS identifiers handed to the browser for contact form delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailJsConfig {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
}

/// The application's configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Whether the application runs in production (`APP_ENV=production`).
    pub production: bool,
    /// The CSRF signing secret.
    pub csrf_secret: Option<CsrfSecret>,
    /// Whether tokens must also match the `csrf_token` cookie.
    pub csrf_cookie_binding: bool,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Directory of static files served as the fallback.
    pub public_dir: PathBuf,
    /// EmailJS settings, when all three identifiers are present.
    pub emailjs: Option<EmailJsConfig>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// A missing `CSRF_SECRET` is not an error here; call
    /// [`Config::require_csrf_secret`] where it must be present.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a `Config` from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse()
            .context("BIND_ADDR must be a socket address such as 127.0.0.1:3000")?;

        let production = lookup("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let csrf_cookie_binding = match lookup("CSRF_COOKIE_BINDING") {
            Some(v) => parse_bool(&v).context("CSRF_COOKIE_BINDING must be true or false")?,
            None => false,
        };

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();

        let emailjs = match (
            non_empty(lookup("EMAILJS_SERVICE_ID")),
            non_empty(lookup("EMAILJS_TEMPLATE_ID")),
            non_empty(lookup("EMAILJS_PUBLIC_KEY")),
        ) {
            (Some(service_id), Some(template_id), Some(public_key)) => Some(EmailJsConfig {
                service_id,
                template_id,
                public_key,
            }),
            _ => None,
        };

        Ok(Self {
            bind_addr,
            production,
            csrf_secret: lookup("CSRF_SECRET").and_then(CsrfSecret::new),
            csrf_cookie_binding,
            allowed_origins,
            public_dir: lookup("PUBLIC_DIR")
                .unwrap_or_else(|| "public".to_string())
                .into(),
            emailjs,
        })
    }

    /// Fails when no CSRF secret is configured.
    pub fn require_csrf_secret(&self) -> Result<&CsrfSecret> {
        self.csrf_secret.as_ref().context(
            "CSRF_SECRET must be set (generate with: openssl rand -hex 32)",
        )
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("unrecognised boolean {other:?}"),
    }
}

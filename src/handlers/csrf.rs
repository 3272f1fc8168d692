use axum::{
    Json,
    extract::State,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tower_cookies::cookie::SameSite;
use tower_cookies::cookie::time::Duration;
use tower_cookies::{Cookie, Cookies};

use crate::{
    crypto::csrf::TOKEN_TTL_MS,
    error::{AppError, Result},
    middleware_layer::csrf::CSRF_FIELD,
    state::AppState,
};

/// The response payload for a freshly issued token.
#[derive(Serialize)]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
}

/// What the debug endpoint reports about the CSRF setup.
#[derive(Serialize)]
pub struct CsrfDebugResponse {
    pub csrf_secret_defined: bool,
    pub csrf_secret_length: usize,
    pub cookie_binding: bool,
}

/// Creates the HttpOnly cookie a token is bound to.
fn create_csrf_cookie(value: String, production: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(CSRF_FIELD, value);
    cookie.set_http_only(true);
    if production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(Duration::milliseconds(TOKEN_TTL_MS));
    cookie.set_path("/");
    cookie
}

/// Issues a CSRF token to embed in a form.
///
/// With cookie binding enabled the token is also set as the `csrf_token`
/// cookie.
#[axum::debug_handler]
pub async fn issue_token(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Json<CsrfTokenResponse>> {
    let csrf_token = state.csrf.generate_token()?;

    if state.config.csrf_cookie_binding {
        cookies.add(create_csrf_cookie(csrf_token.clone(), state.config.production));
        tracing::debug!("✅ CSRF cookie added");
    }

    Ok(Json(CsrfTokenResponse { csrf_token }))
}

/// Reports whether the CSRF secret is loaded, without revealing it.
/// Only available outside production.
#[axum::debug_handler]
pub async fn debug_environment(State(state): State<AppState>) -> Response {
    if state.config.production {
        return AppError::NotFound.into_response();
    }

    Json(CsrfDebugResponse {
        csrf_secret_defined: state.csrf.is_configured(),
        csrf_secret_length: state.csrf.secret_len(),
        cookie_binding: state.config.csrf_cookie_binding,
    })
    .into_response()
}

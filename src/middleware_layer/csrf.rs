use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_cookies::Cookies;

use crate::{error::AppError, state::AppState};

/// Header carrying the CSRF token on API calls.
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Form field and cookie name carrying the CSRF token.
pub const CSRF_FIELD: &str = "csrf_token";

/// Largest form body buffered while looking for the token.
pub const MAX_FORM_BODY_BYTES: usize = 64 * 1024;

#[derive(Deserialize)]
struct TokenField {
    csrf_token: Option<String>,
}

/// Whether the request body is an HTML form post.
pub(crate) fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|mime| {
            mime.trim()
                .eq_ignore_ascii_case("application/x-www-form-urlencoded")
        })
}

/// Reads the token from the `x-csrf-token` header, falling back to the
/// `csrf_token` field of a url-encoded form or JSON body. The body is
/// restored for the handler.
async fn extract_token(req: Request<Body>) -> Result<(Option<String>, Request<Body>), AppError> {
    let header_token = req
        .headers()
        .get(CSRF_HEADER)
        .map(|value| value.to_str().ok().map(str::to_string));

    if let Some(token) = header_token {
        if token.is_none() {
            tracing::warn!("❌ CSRF: header with invalid characters");
        }
        return Ok((token, req));
    }

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_FORM_BODY_BYTES)
        .await
        .map_err(|e| {
            tracing::warn!("❌ CSRF: failed to buffer request body: {}", e);
            AppError::Validation("Request body too large".to_string())
        })?;

    let field = if is_form_encoded(&parts.headers) {
        serde_urlencoded::from_bytes::<TokenField>(&body_bytes).ok()
    } else {
        sonic_rs::from_slice::<TokenField>(&body_bytes).ok()
    };
    let token = field.and_then(|field| field.csrf_token);

    Ok((token, Request::from_parts(parts, Body::from(body_bytes))))
}

/// A middleware that verifies the CSRF token on state-changing requests.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `cookies` - The request cookies.
/// * `req` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// The handler's `Response`, or `403` when the token is missing or invalid.
pub async fn verify_csrf(
    State(state): State<AppState>,
    cookies: Cookies,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() == Method::GET
        || req.method() == Method::HEAD
        || req.method() == Method::OPTIONS
    {
        tracing::debug!("✅ CSRF exemption: {} request", req.method());
        return next.run(req).await;
    }

    let (token, req) = match extract_token(req).await {
        Ok(extracted) => extracted,
        Err(e) => return e.into_response(),
    };

    let Some(token) = token else {
        tracing::warn!("❌ CSRF: token missing from header and body");
        return AppError::InvalidCsrfToken.into_response();
    };

    let verdict = if state.config.csrf_cookie_binding {
        let cookie = cookies.get(CSRF_FIELD).map(|c| c.value().to_string());
        state.csrf.verify_bound_token(&token, cookie.as_deref())
    } else {
        state.csrf.verify_token(&token)
    };

    match verdict {
        Ok(()) => {
            tracing::debug!("✅ CSRF token valid");
            next.run(req).await
        }
        Err(reason) => {
            tracing::warn!("❌ CSRF: {}", reason);
            AppError::InvalidCsrfToken.into_response()
        }
    }
}

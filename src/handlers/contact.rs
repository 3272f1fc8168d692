use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Result},
    handlers::body::FormOrJson,
    services::contact::{self as contact_service, ContactMessage, EmailJsDispatch},
    state::AppState,
    validation::forms::{validate_email, validate_required},
};

/// The request payload of the contact form.
///
/// `csrf_token` is checked by the CSRF middleware before this handler runs.
#[derive(Deserialize, Debug)]
pub struct ContactRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub message: String,
}

/// The response payload of an accepted contact form.
#[derive(Serialize)]
pub struct ContactResponse {
    pub success: bool,
    pub emailjs: EmailJsDispatch,
}

/// Handles a contact form submission.
#[axum::debug_handler]
pub async fn submit_contact(
    State(state): State<AppState>,
    FormOrJson(payload): FormOrJson<ContactRequest>,
) -> Result<Json<ContactResponse>> {
    validate_required(&[
        &payload.name,
        &payload.email,
        &payload.subject,
        &payload.message,
    ])?;
    validate_email(&payload.email)?;

    let emailjs = state.config.emailjs.as_ref().ok_or_else(|| {
        AppError::Internal("Email delivery is not configured".to_string())
    })?;

    tracing::info!("📨 Contact form accepted: {:?}", payload.subject);

    let dispatch = contact_service::build_dispatch(
        emailjs,
        ContactMessage {
            name: payload.name,
            email: payload.email,
            subject: payload.subject,
            message: payload.message,
        },
    );

    Ok(Json(ContactResponse {
        success: true,
        emailjs: dispatch,
    }))
}

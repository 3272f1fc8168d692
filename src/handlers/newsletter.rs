use axum::Json;
use serde::{Deserialize, Serialize};

use crate::{error::Result, handlers::body::FormOrJson, validation::forms::validate_email};

/// The request payload of the newsletter signup form.
#[derive(Deserialize, Debug)]
pub struct NewsletterRequest {
    #[serde(default)]
    pub email: String,
}

/// The response payload of a newsletter signup.
#[derive(Serialize)]
pub struct NewsletterResponse {
    pub success: bool,
    pub message: String,
}

/// Handles a newsletter signup, posted either as a plain HTML form with a
/// hidden `csrf_token` field or as JSON.
#[axum::debug_handler]
pub async fn subscribe(
    FormOrJson(payload): FormOrJson<NewsletterRequest>,
) -> Result<Json<NewsletterResponse>> {
    validate_email(&payload.email)?;

    // No newsletter provider is wired up; the signup is only recorded in the log.
    tracing::info!("📰 Newsletter signup received");

    Ok(Json(NewsletterResponse {
        success: true,
        message: "Thank you for subscribing to our newsletter!".to_string(),
    }))
}

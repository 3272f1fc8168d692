use serde::Serialize;

use crate::config::EmailJsConfig;

/// A validated contact form submission.
#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

/// Template variables consumed by the EmailJS contact template.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TemplateParams {
    pub from_name: String,
    pub from_email: String,
    pub subject: String,
    pub message: String,
    pub reply_to: String,
}

/// Everything the browser needs to hand the message to EmailJS.
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EmailJsDispatch {
    pub service_id: String,
    pub template_id: String,
    pub public_key: String,
    pub template_params: TemplateParams,
}

/// Builds the EmailJS dispatch for a contact message. Replies go to the
/// sender.
///
/// # Arguments
///
/// * `emailjs` - The configured EmailJS identifiers.
/// * `msg` - The submission.
pub fn build_dispatch(emailjs: &EmailJsConfig, msg: ContactMessage) -> EmailJsDispatch {
    let email = msg.email.trim().to_string();

    EmailJsDispatch {
        service_id: emailjs.service_id.clone(),
        template_id: emailjs.template_id.clone(),
        public_key: emailjs.public_key.clone(),
        template_params: TemplateParams {
            from_name: msg.name.trim().to_string(),
            reply_to: email.clone(),
            from_email: email,
            subject: msg.subject.trim().to_string(),
            message: msg.message,
        },
    }
}

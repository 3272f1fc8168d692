use crate::error::{AppError, Result};

/// Longest accepted value for any single form field.
pub const MAX_FIELD_LEN: usize = 5_000;

/// Checks that an email address has the shape `local@domain.tld`, with no
/// whitespace anywhere.
///
/// # Arguments
///
/// * `email` - The address to validate.
///
/// # Returns
///
/// `true` when the address looks deliverable.
pub fn is_plausible_email(email: &str) -> bool {
    if email.is_empty() || email.chars().any(char::is_whitespace) {
        return false;
    }

    // some '@' past the first character, followed by a dot with at least
    // one character on each side
    email
        .match_indices('@')
        .filter(|(at, _)| *at > 0)
        .any(|(at, _)| {
            let domain = &email[at + 1..];
            domain
                .char_indices()
                .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
        })
}

/// Validates the email of a form submission.
pub fn validate_email(email: &str) -> Result<()> {
    if !is_plausible_email(email.trim()) {
        return Err(AppError::Validation(
            "Please provide a valid email address.".to_string(),
        ));
    }
    Ok(())
}

/// Validates that every field is present and not blank.
///
/// # Arguments
///
/// * `fields` - The field values to check.
///
/// # Returns
///
/// A `Result<()>` indicating whether all fields are filled in.
pub fn validate_required(fields: &[&str]) -> Result<()> {
    if fields.iter().any(|f| f.trim().is_empty()) {
        return Err(AppError::Validation("All fields are required".to_string()));
    }

    if fields.iter().any(|f| f.len() > MAX_FIELD_LEN) {
        return Err(AppError::Validation(format!(
            "Fields must be at most {} characters",
            MAX_FIELD_LEN
        )));
    }

    Ok(())
}

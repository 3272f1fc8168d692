use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use super::clock::{Clock, SystemClock};

/// The size of the random part of a CSRF token in bytes.
pub const CSRF_TOKEN_SIZE: usize = 32;

/// How long a token stays valid after it was issued (1 hour).
pub const TOKEN_TTL_MS: i64 = 60 * 60 * 1000;

/// How far in the future a token timestamp may lie before it is rejected.
pub const MAX_CLOCK_SKEW_MS: i64 = 5_000;

/// Separator between the three token fields.
pub const TOKEN_DELIMITER: char = '|';

/// Secrets shorter than this are accepted but logged as weak.
pub const RECOMMENDED_SECRET_LEN: usize = 32;

/// Raised when a token cannot be issued.
#[derive(Error, Debug)]
pub enum CsrfError {
    /// No signing secret is configured.
    #[error("CSRF configuration error")]
    NotConfigured,

    /// The clock reads before the Unix epoch, which the wire format cannot carry.
    #[error("clock reads {0} ms, before the Unix epoch")]
    ClockBeforeEpoch(i64),
}

/// Why a presented token was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenRejection {
    #[error("CSRF secret is not configured")]
    NotConfigured,

    #[error("malformed token: {0}")]
    Malformed(&'static str),

    #[error("token has expired")]
    Expired,

    #[error("token timestamp is in the future")]
    FromFuture,

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("token does not match the csrf_token cookie")]
    CookieMismatch,
}

/// The shared signing secret.
///
/// The value is wiped from memory once the last clone is dropped.
#[derive(Clone)]
pub struct CsrfSecret(Arc<Zeroizing<String>>);

impl CsrfSecret {
    /// Wraps a secret value. Returns `None` for an empty string, which
    /// counts as "not configured".
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = Zeroizing::new(value.into());
        if value.is_empty() {
            return None;
        }
        Some(Self(Arc::new(value)))
    }

    /// Length of the secret in bytes.
    pub fn byte_len(&self) -> usize {
        self.0.len()
    }

    fn expose(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for CsrfSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfSecret(***)")
    }
}

/// A token split into its wire fields: `random_part|timestamp_ms|signature`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken {
    pub random_part: String,
    pub timestamp_ms: i64,
    pub signature: String,
}

impl fmt::Display for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TOKEN_DELIMITER}{}{TOKEN_DELIMITER}{}",
            self.random_part, self.timestamp_ms, self.signature
        )
    }
}

impl FromStr for CsrfToken {
    type Err = TokenRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split(TOKEN_DELIMITER);
        let (Some(random_part), Some(timestamp), Some(signature), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(TokenRejection::Malformed("expected three fields"));
        };

        Ok(Self {
            random_part: random_part.to_string(),
            timestamp_ms: parse_timestamp(timestamp)?,
            signature: signature.to_string(),
        })
    }
}

/// Parses a canonical decimal millisecond timestamp.
///
/// Signs, whitespace and leading zeros are refused so that the parsed value
/// renders back to exactly the text that was signed.
fn parse_timestamp(raw: &str) -> Result<i64, TokenRejection> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TokenRejection::Malformed("timestamp is not a decimal number"));
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return Err(TokenRejection::Malformed("timestamp has leading zeros"));
    }
    raw.parse()
        .map_err(|_| TokenRejection::Malformed("timestamp out of range"))
}

/// Computes `hex(SHA-256(random_part | timestamp || secret))`.
fn sign(secret: &CsrfSecret, random_part: &str, timestamp_ms: i64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(random_part.as_bytes());
    hasher.update([TOKEN_DELIMITER as u8]);
    hasher.update(timestamp_ms.to_string().as_bytes());
    hasher.update(secret.expose());
    hex::encode(hasher.finalize())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Issues and checks stateless, signed, time-limited CSRF tokens.
///
/// Nothing is stored between calls: a token is valid when its signature
/// matches and its timestamp lies inside the expiry window. The same token
/// may be presented any number of times until it expires.
#[derive(Clone)]
pub struct CsrfService {
    secret: Option<CsrfSecret>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CsrfService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CsrfService")
            .field("secret", &self.secret)
            .finish_non_exhaustive()
    }
}

impl CsrfService {
    /// Creates a new `CsrfService`.
    ///
    /// # Arguments
    ///
    /// * `secret` - The signing secret, or `None` when it is not configured.
    /// * `clock` - The time source used for timestamps and expiry.
    pub fn new(secret: Option<CsrfSecret>, clock: Arc<dyn Clock>) -> Self {
        if let Some(secret) = &secret {
            if secret.byte_len() < RECOMMENDED_SECRET_LEN {
                tracing::warn!(
                    "⚠️ CSRF secret is only {} bytes, at least {} are recommended",
                    secret.byte_len(),
                    RECOMMENDED_SECRET_LEN
                );
            }
        }
        Self { secret, clock }
    }

    /// Creates a new `CsrfService` reading time from the system clock.
    pub fn with_system_clock(secret: Option<CsrfSecret>) -> Self {
        Self::new(secret, Arc::new(SystemClock))
    }

    /// Whether a signing secret is configured.
    pub fn is_configured(&self) -> bool {
        self.secret.is_some()
    }

    /// Length in bytes of the configured secret, `0` when missing.
    pub fn secret_len(&self) -> usize {
        self.secret.as_ref().map_or(0, CsrfSecret::byte_len)
    }

    /// Generates a new signed CSRF token.
    ///
    /// # Returns
    ///
    /// The serialized token `random|timestamp|signature`, or
    /// `CsrfError::NotConfigured` when there is no secret to sign with, or
    /// `CsrfError::ClockBeforeEpoch` when the clock is negative.
    pub fn generate_token(&self) -> Result<String, CsrfError> {
        let Some(secret) = &self.secret else {
            tracing::error!("❌ CSRF_SECRET is not configured, refusing to issue a token");
            return Err(CsrfError::NotConfigured);
        };

        let timestamp_ms = self.clock.now_millis();
        if timestamp_ms < 0 {
            tracing::error!("❌ Clock reads {} ms, refusing to issue a token", timestamp_ms);
            return Err(CsrfError::ClockBeforeEpoch(timestamp_ms));
        }

        let mut random = [0u8; CSRF_TOKEN_SIZE];
        OsRng.fill_bytes(&mut random);
        let random_part = hex::encode(random);
        let signature = sign(secret, &random_part, timestamp_ms);

        let token = CsrfToken {
            random_part,
            timestamp_ms,
            signature,
        };
        tracing::debug!("🔐 Issued CSRF token at {}", timestamp_ms);

        Ok(token.to_string())
    }

    /// Checks a presented token and reports why it was refused.
    pub fn verify_token(&self, token: &str) -> Result<(), TokenRejection> {
        let secret = self.secret.as_ref().ok_or(TokenRejection::NotConfigured)?;
        let parsed: CsrfToken = token.parse()?;

        let elapsed = self.clock.now_millis().saturating_sub(parsed.timestamp_ms);
        if elapsed < -MAX_CLOCK_SKEW_MS {
            return Err(TokenRejection::FromFuture);
        }
        if elapsed > TOKEN_TTL_MS {
            return Err(TokenRejection::Expired);
        }

        let expected = sign(secret, &parsed.random_part, parsed.timestamp_ms);
        if !constant_time_eq(&parsed.signature, &expected) {
            return Err(TokenRejection::SignatureMismatch);
        }

        Ok(())
    }

    /// Checks a presented token and additionally requires it to equal the
    /// `csrf_token` cookie that was set when it was issued.
    pub fn verify_bound_token(
        &self,
        token: &str,
        cookie: Option<&str>,
    ) -> Result<(), TokenRejection> {
        self.verify_token(token)?;
        match cookie {
            Some(cookie) if constant_time_eq(token, cookie) => Ok(()),
            _ => Err(TokenRejection::CookieMismatch),
        }
    }

    /// Returns `true` only for an untampered token inside its window.
    ///
    /// Never fails: every rejection is logged and collapsed to `false`.
    pub fn validate_token(&self, token: &str) -> bool {
        match self.verify_token(token) {
            Ok(()) => true,
            Err(reason) => {
                tracing::warn!("❌ CSRF token rejected: {}", reason);
                false
            }
        }
    }
}

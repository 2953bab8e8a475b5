//! Stateless, HMAC-signed per-database access tokens.
//!
//! A token has four dot-separated segments:
//!
//! ```text
//! <db name>.<128 random bits, base64url>.<expiry, epoch ms>.<base64url(HMAC-SHA256)>
//! ```
//!
//! The signature covers the first three segments. Nothing is stored server
//! side: a token is valid until it expires, and revoking tokens early means
//! rotating the secret.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

const RANDOM_BYTES: usize = 16;

/// Why a token was refused. [`TokenRejection::reason`] is the
/// machine-readable code returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenRejection {
    /// Not four segments, or an unparsable expiry.
    #[error("token is malformed")]
    Malformed,
    /// Issued for another database.
    #[error("token was issued for another database")]
    DbMismatch,
    /// Expiry is in the past.
    #[error("token has expired")]
    Expired,
    /// Signature does not match.
    #[error("token signature is invalid")]
    BadSignature,
}

impl TokenRejection {
    /// Returns the stable reason code.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::DbMismatch => "db_mismatch",
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
        }
    }
}

/// Errors of the token service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The signing secret is empty.
    #[error("token secret must not be empty")]
    EmptySecret,
    /// The database name cannot be embedded in a token.
    #[error("database name '{0}' must be non-empty and must not contain '.'")]
    InvalidDbName(String),
    /// The token was refused.
    #[error(transparent)]
    Rejected(#[from] TokenRejection),
}

/// What a valid token vouches for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Database the token grants access to.
    pub db_name: String,
    /// Instant after which the token is refused.
    pub expires_at: DateTime<Utc>,
}

/// Issues a token for `db_name` valid for `ttl` from now.
///
/// # Errors
///
/// Returns [`TokenError::EmptySecret`] or [`TokenError::InvalidDbName`].
pub fn issue(db_name: &str, secret: &str, ttl: Duration) -> Result<String, TokenError> {
    issue_at(db_name, secret, ttl, Utc::now())
}

/// Issues a token as if the current time were `now`.
///
/// # Errors
///
/// Same as [`issue`].
pub fn issue_at(
    db_name: &str,
    secret: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    if db_name.is_empty() || db_name.contains('.') {
        return Err(TokenError::InvalidDbName(db_name.to_string()));
    }
    let mut mac = mac(secret)?;

    let mut random = [0u8; RANDOM_BYTES];
    {
        use rand::RngExt;
        rand::rng().fill(&mut random);
    }
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    let expiry = now.timestamp_millis().saturating_add(ttl_ms);

    let payload = format!("{db_name}.{}.{expiry}", URL_SAFE_NO_PAD.encode(random));
    mac.update(payload.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{payload}.{signature}"))
}

/// Validates `token` for `db_name`.
///
/// # Errors
///
/// Returns [`TokenError::EmptySecret`] for an empty secret, otherwise
/// [`TokenError::Rejected`] with the first failed check.
pub fn validate(db_name: &str, token: &str, secret: &str) -> Result<TokenClaims, TokenError> {
    validate_at(db_name, token, secret, Utc::now())
}

/// Validates `token` as if the current time were `now`.
///
/// # Errors
///
/// Same as [`validate`].
pub fn validate_at(
    db_name: &str,
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<TokenClaims, TokenError> {
    let mut mac = mac(secret)?;

    let segments: Vec<&str> = token.split('.').collect();
    let [name, random, expiry, signature] = segments[..] else {
        return Err(TokenRejection::Malformed.into());
    };
    if name != db_name {
        return Err(TokenRejection::DbMismatch.into());
    }
    let expiry: i64 = expiry.parse().map_err(|_| TokenRejection::Malformed)?;
    let expires_at = DateTime::from_timestamp_millis(expiry).ok_or(TokenRejection::Malformed)?;
    if expiry <= now.timestamp_millis() {
        return Err(TokenRejection::Expired.into());
    }

    let provided = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenRejection::BadSignature)?;
    mac.update(format!("{name}.{random}.{expiry}").as_bytes());
    let expected = mac.finalize().into_bytes();
    if !bool::from(expected.as_slice().ct_eq(&provided)) {
        return Err(TokenRejection::BadSignature.into());
    }

    Ok(TokenClaims {
        db_name: name.to_string(),
        expires_at,
    })
}

fn mac(secret: &str) -> Result<HmacSha256, TokenError> {
    if secret.is_empty() {
        return Err(TokenError::EmptySecret);
    }
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| TokenError::EmptySecret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "s3cret";
    const HOUR: Duration = Duration::from_secs(3600);

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn rejection(result: Result<TokenClaims, TokenError>) -> TokenRejection {
        match result {
            Err(TokenError::Rejected(rejection)) => rejection,
            other => panic!("expected a rejection, got {other:?}"),
        }
    }

    #[test]
    fn test_issue_shape() {
        let token = issue_at("main", SECRET, HOUR, at(1_000)).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], "main");
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[1]).unwrap().len(), 16);
        assert_eq!(segments[2], "3601000");
        assert_eq!(URL_SAFE_NO_PAD.decode(segments[3]).unwrap().len(), 32);
    }

    #[test]
    fn test_tokens_are_random() {
        let a = issue_at("main", SECRET, HOUR, at(0)).unwrap();
        let b = issue_at("main", SECRET, HOUR, at(0)).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_validate_roundtrip() {
        let token = issue_at("main", SECRET, HOUR, at(0)).unwrap();
        let claims = validate_at("main", &token, SECRET, at(60_000)).unwrap();
        assert_eq!(claims.db_name, "main");
        assert_eq!(claims.expires_at, at(3_600_000));
        assert!(validate("main", &issue("main", SECRET, HOUR).unwrap(), SECRET).is_ok());
    }

    #[test]
    fn test_rejections() {
        let token = issue_at("main", SECRET, HOUR, at(0)).unwrap();

        assert_eq!(
            rejection(validate_at("main", "a.b.c", SECRET, at(0))),
            TokenRejection::Malformed
        );
        assert_eq!(
            rejection(validate_at("main", &format!("{token}.x"), SECRET, at(0))),
            TokenRejection::Malformed
        );
        assert_eq!(
            rejection(validate_at("other", &token, SECRET, at(0))),
            TokenRejection::DbMismatch
        );
        assert_eq!(
            rejection(validate_at("main", &token, SECRET, at(3_600_000))),
            TokenRejection::Expired
        );
        assert_eq!(
            rejection(validate_at("main", &token, "other-secret", at(0))),
            TokenRejection::BadSignature
        );
    }

    #[test]
    fn test_any_signature_byte_mutation_fails() {
        let token = issue_at("main", SECRET, HOUR, at(0)).unwrap();
        let split = token.rfind('.').unwrap() + 1;
        let (payload, signature) = token.split_at(split);

        for i in 0..signature.len() {
            let mut bytes = signature.as_bytes().to_vec();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let mutated = format!("{payload}{}", String::from_utf8(bytes).unwrap());
            assert!(
                validate_at("main", &mutated, SECRET, at(0)).is_err(),
                "mutation at {i} accepted"
            );
        }
    }

    #[test]
    fn test_tampered_payload_fails() {
        let token = issue_at("main", SECRET, HOUR, at(0)).unwrap();
        let segments: Vec<&str> = token.split('.').collect();
        let extended = format!("main.{}.99999999999.{}", segments[1], segments[3]);
        assert_eq!(
            rejection(validate_at("main", &extended, SECRET, at(0))),
            TokenRejection::BadSignature
        );
    }

    #[test]
    fn test_configuration_errors() {
        assert_eq!(
            issue_at("main", "", HOUR, at(0)),
            Err(TokenError::EmptySecret)
        );
        assert_eq!(
            validate_at("main", "a.b.c.d", "", at(0)),
            Err(TokenError::EmptySecret)
        );
        assert!(matches!(
            issue_at("a.b", SECRET, HOUR, at(0)),
            Err(TokenError::InvalidDbName(_))
        ));
    }
}

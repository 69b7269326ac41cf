//! Unverified inspection of bearer tokens.
//!
//! The client never holds the signing secret, so it cannot check signatures.
//! It only reads the payload to learn when the token stops being useful.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::error::ClientError;

/// The payload fields the client cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenPayload {
    #[serde(default)]
    pub sub: Option<String>,
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
}

/// Decodes the middle segment of a compact JWT without verifying it.
pub fn decode_payload(token: &str) -> Result<TokenPayload, ClientError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return Err(ClientError::Token("expected three segments".to_string())),
    };

    // Some encoders keep the padding; the URL-safe alphabet is otherwise shared.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| ClientError::Token(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Token(e.to_string()))
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, ClientError> {
    DateTime::from_timestamp(seconds, 0)
        .ok_or_else(|| ClientError::Token(format!("timestamp {} is out of range", seconds)))
}

pub fn expires_at(token: &str) -> Result<DateTime<Utc>, ClientError> {
    timestamp(decode_payload(token)?.exp)
}

/// When the token should be swapped for a fresh one: `margin` before expiry,
/// but never earlier than halfway through the token's own lifetime, so a
/// server issuing short-lived tokens does not get a refresh per request.
pub fn refresh_due_at(token: &str, margin: Duration) -> Result<DateTime<Utc>, ClientError> {
    let payload = decode_payload(token)?;
    let exp = timestamp(payload.exp)?;
    let margin = match payload.iat.map(timestamp).transpose()? {
        Some(iat) if iat < exp => margin.min((exp - iat) / 2),
        _ => margin,
    };
    Ok(exp - margin)
}

/// A token is treated as expired `buffer` before its real expiry so the
/// request does not race the server's clock. Undecodable tokens are expired.
pub fn is_expired(token: &str, now: DateTime<Utc>, buffer: Duration) -> bool {
    match expires_at(token) {
        Ok(exp) => now + buffer >= exp,
        Err(_) => true,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// Builds an unsigned token with the given payload; good enough for a
    /// client that never checks signatures.
    pub(crate) fn fake_token(exp: DateTime<Utc>) -> String {
        encode(json!({ "sub": "u-1", "exp": exp.timestamp(), "jti": uuid::Uuid::new_v4().to_string() }))
    }

    /// Like `fake_token`, with an `iat` claim the way the server issues them.
    pub(crate) fn fake_token_issued(iat: DateTime<Utc>, exp: DateTime<Utc>) -> String {
        encode(json!({
            "sub": "u-1",
            "iat": iat.timestamp(),
            "exp": exp.timestamp(),
            "jti": uuid::Uuid::new_v4().to_string(),
        }))
    }

    fn encode(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        format!("{}.{}.signature", header, URL_SAFE_NO_PAD.encode(payload.to_string()))
    }

    #[test]
    fn reads_expiry_from_payload() {
        let exp = DateTime::from_timestamp(Utc::now().timestamp() + 600, 0).unwrap();
        let token = fake_token(exp);
        assert_eq!(expires_at(&token).unwrap(), exp);
        assert_eq!(decode_payload(&token).unwrap().sub.as_deref(), Some("u-1"));
    }

    #[test]
    fn judges_expiry_with_buffer() {
        let now = Utc::now();
        let buffer = Duration::seconds(30);

        assert!(is_expired(&fake_token(now - Duration::seconds(10)), now, buffer));
        assert!(is_expired(&fake_token(now + Duration::seconds(20)), now, buffer));
        assert!(!is_expired(&fake_token(now + Duration::minutes(10)), now, buffer));
    }

    #[test]
    fn refresh_margin_is_capped_at_half_the_lifetime() {
        let iat = DateTime::from_timestamp(Utc::now().timestamp(), 0).unwrap();
        let margin = Duration::minutes(2);

        let short = fake_token_issued(iat, iat + Duration::seconds(60));
        assert_eq!(refresh_due_at(&short, margin).unwrap(), iat + Duration::seconds(30));

        let long = fake_token_issued(iat, iat + Duration::hours(4));
        assert_eq!(
            refresh_due_at(&long, margin).unwrap(),
            iat + Duration::hours(4) - margin
        );

        // Without `iat` the full margin applies.
        let bare = fake_token(iat + Duration::seconds(60));
        assert_eq!(refresh_due_at(&bare, margin).unwrap(), iat - Duration::seconds(60));
    }

    #[test]
    fn garbage_counts_as_expired() {
        let now = Utc::now();
        assert!(is_expired("not-a-token", now, Duration::zero()));
        assert!(is_expired("a.!!!.c", now, Duration::zero()));
        assert!(matches!(decode_payload("a.b"), Err(ClientError::Token(_))));
    }
}

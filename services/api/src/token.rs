//! services/api/src/token.rs
//!
//! Minting and verifying the signed bearer tokens (HS256 JWTs).
//!
//! Tokens are self-contained: nothing is persisted at issuance and nothing can be
//! revoked. A token is accepted exactly while its signature checks out against
//! the shared secret and its expiry lies in the future.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mangati_core::{Caller, Role, User};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::config::JwtSettings;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("JWT secret key is not configured")]
    MissingSigningKey,
    #[error("Failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Token has expired")]
    Expired,
}

//=========================================================================================
// Claims
//=========================================================================================

/// The claim set carried by every token.
///
/// `sub` is the one canonical subject claim; roles travel under `role`, one
/// value per role held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub unique_name: String,
    pub email: String,
    pub jti: String,
    #[serde(default, deserialize_with = "one_or_many")]
    pub role: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

impl TokenClaims {
    pub fn into_caller(self) -> Result<Caller, TokenError> {
        let user_id = Uuid::parse_str(&self.sub)
            .map_err(|_| TokenError::Invalid("subject is not a user id".to_string()))?;
        Ok(Caller {
            user_id,
            username: self.unique_name,
            email: self.email,
            role_claims: self.role,
        })
    }
}

/// A freshly minted token and the metadata callers may want to log or return.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

//=========================================================================================
// Issuer
//=========================================================================================

pub struct TokenIssuer {
    encoding_key: EncodingKey,
    lifetime: Duration,
    issuer: Option<String>,
    audience: Option<String>,
}

impl TokenIssuer {
    pub fn new(settings: &JwtSettings) -> Result<Self, TokenError> {
        if settings.secret_key.is_empty() {
            return Err(TokenError::MissingSigningKey);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret_key.as_bytes()),
            lifetime: Duration::minutes(settings.token_lifetime_minutes),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
        })
    }

    /// Mints a token for `user` carrying `roles`, which the caller must have
    /// just read from the credential store.
    pub fn issue(&self, user: &User, roles: &[Role]) -> Result<IssuedToken, TokenError> {
        self.issue_at(user, roles, Utc::now())
    }

    pub fn issue_at(
        &self,
        user: &User,
        roles: &[Role],
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now + self.lifetime;
        let token_id = Uuid::new_v4().to_string();

        let claims = TokenClaims {
            sub: user.id.to_string(),
            unique_name: user.username.clone(),
            email: user.email.clone(),
            jti: token_id.clone(),
            role: roles.iter().map(|r| r.as_str().to_string()).collect(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)?;

        info!(
            "Issued token for user {} with roles: {}",
            user.username,
            claims.role.join(", ")
        );

        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }
}

//=========================================================================================
// Verifier
//=========================================================================================

pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &JwtSettings) -> Result<Self, TokenError> {
        if settings.secret_key.is_empty() {
            return Err(TokenError::MissingSigningKey);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock in `verify_at`, with no skew.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.validate_aud = false;

        if settings.validate_issuer {
            if let Some(issuer) = &settings.issuer {
                validation.set_issuer(&[issuer]);
            }
        }
        if settings.validate_audience {
            if let Some(audience) = &settings.audience {
                validation.validate_aud = true;
                validation.set_audience(&[audience]);
            }
        }

        Ok(Self {
            decoding_key: DecodingKey::from_secret(settings.secret_key.as_bytes()),
            validation,
        })
    }

    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, Utc::now())
    }

    /// Checks the signature, then requires `now` to lie strictly before `exp`.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        let data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if now.timestamp() >= data.claims.exp {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> JwtSettings {
        JwtSettings {
            secret_key: "a-test-secret-that-is-long-enough-for-hs256".to_string(),
            token_lifetime_minutes: 60,
            issuer: Some("mangati".to_string()),
            audience: Some("mangati-client".to_string()),
            validate_issuer: true,
            validate_audience: true,
        }
    }

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "kana".to_string(),
            email: "kana@mangati.app".to_string(),
            roles: vec![Role::Writer],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn missing_signing_key_is_fatal() {
        let mut settings = settings();
        settings.secret_key.clear();
        assert!(matches!(TokenIssuer::new(&settings), Err(TokenError::MissingSigningKey)));
        assert!(matches!(TokenVerifier::new(&settings), Err(TokenError::MissingSigningKey)));
    }

    #[test]
    fn issued_claims_round_trip() {
        let settings = settings();
        let issuer = TokenIssuer::new(&settings).unwrap();
        let verifier = TokenVerifier::new(&settings).unwrap();
        let user = user();
        let now = Utc::now();

        let issued = issuer.issue_at(&user, &[Role::Writer, Role::Admin], now).unwrap();
        let claims = verifier.verify_at(&issued.token, now).unwrap();
        assert_eq!(claims.jti, issued.token_id);
        assert_eq!(claims.iss.as_deref(), Some("mangati"));

        let caller = claims.into_caller().unwrap();
        assert_eq!(caller.user_id, user.id);
        assert_eq!(caller.username, user.username);
        assert_eq!(caller.email, user.email);
        assert_eq!(caller.roles(), vec![Role::Writer, Role::Admin]);
    }

    #[test]
    fn token_is_valid_until_expiry_and_rejected_from_expiry_on() {
        let settings = settings();
        let issuer = TokenIssuer::new(&settings).unwrap();
        let verifier = TokenVerifier::new(&settings).unwrap();
        let issued_at = Utc::now();
        let issued = issuer.issue_at(&user(), &[Role::Viewer], issued_at).unwrap();
        let lifetime = Duration::minutes(settings.token_lifetime_minutes);

        assert!(verifier.verify_at(&issued.token, issued_at).is_ok());
        assert!(verifier
            .verify_at(&issued.token, issued_at + lifetime - Duration::seconds(1))
            .is_ok());
        assert!(matches!(
            verifier.verify_at(&issued.token, issued_at + lifetime),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            verifier.verify_at(&issued.token, issued_at + lifetime + Duration::hours(1)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn any_signature_byte_change_is_rejected() {
        let settings = settings();
        let issuer = TokenIssuer::new(&settings).unwrap();
        let verifier = TokenVerifier::new(&settings).unwrap();
        let now = Utc::now();
        let token = issuer.issue_at(&user(), &[Role::Viewer], now).unwrap().token;

        let signature_start = token.rfind('.').unwrap() + 1;
        let bytes = token.as_bytes();
        for index in signature_start..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(tampered).unwrap();
            assert!(
                verifier.verify_at(&tampered, now).is_err(),
                "tampered byte {} was accepted",
                index
            );
        }
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let mut other = settings();
        other.secret_key = "some-other-secret-entirely-different".to_string();
        let token = TokenIssuer::new(&other)
            .unwrap()
            .issue(&user(), &[Role::Admin])
            .unwrap()
            .token;
        assert!(TokenVerifier::new(&settings()).unwrap().verify(&token).is_err());
    }

    #[test]
    fn same_instant_issuance_differs_only_in_token_id() {
        let issuer = TokenIssuer::new(&settings()).unwrap();
        let verifier = TokenVerifier::new(&settings()).unwrap();
        let user = user();
        let now = Utc::now();

        let first = issuer.issue_at(&user, &[Role::Writer], now).unwrap();
        let second = issuer.issue_at(&user, &[Role::Writer], now).unwrap();
        assert_ne!(first.token, second.token);
        assert_ne!(first.token_id, second.token_id);

        let a = verifier.verify_at(&first.token, now).unwrap();
        let b = verifier.verify_at(&second.token, now).unwrap();
        assert_eq!(a.role, b.role);
    }

    #[test]
    fn single_string_role_claim_is_accepted() {
        let json = r#"{"sub":"6d1f1d9e-7f38-4f0e-a0c1-1f2b3c4d5e6f","unique_name":"a","email":"a@b.c","jti":"x","role":"Writer","iat":0,"exp":10}"#;
        let claims: TokenClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.role, vec!["Writer".to_string()]);
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use log::debug;
use serde::{Deserialize, Serialize};


pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;


/// Identity asserted by a token. Authorization trusts these as-is for the token's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i32,
    pub username: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// What the caller decides; timestamps are filled in on issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
    pub role: Option<String>,
}

impl Identity {
    pub fn user(id: i32, username: &str) -> Self {
        Identity {
            id,
            username: username.to_owned(),
            is_admin: false,
            role: None,
        }
    }

    pub fn admin(id: i32, username: &str, role: &str) -> Self {
        Identity {
            id,
            username: username.to_owned(),
            is_admin: true,
            role: Some(role.to_owned()),
        }
    }
}


#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("failed to sign token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}


pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        TokenService {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        }
    }

    pub fn issue(&self, identity: &Identity) -> Result<String, TokenError> {
        self.issue_with_ttl(identity, self.ttl)
    }

    pub fn issue_with_ttl(&self, identity: &Identity, ttl: Duration) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            id: identity.id,
            username: identity.username.clone(),
            is_admin: identity.is_admin,
            role: identity.role.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    /// Malformed, tampered and expired tokens all fail the same way.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("Token rejected: {}", err);
                TokenError::InvalidToken
            })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", Duration::hours(DEFAULT_TOKEN_TTL_HOURS))
    }

    #[test]
    fn issued_token_verifies_to_same_identity() {
        let tokens = service();
        let token = tokens.issue(&Identity::admin(7, "root", "super_admin")).unwrap();
        let claims = tokens.verify(&token).unwrap();

        assert_eq!(claims.id, 7);
        assert_eq!(claims.username, "root");
        assert!(claims.is_admin);
        assert_eq!(claims.role.as_deref(), Some("super_admin"));
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = service();
        let token = tokens.issue_with_ttl(&Identity::user(1, "alice"), Duration::hours(-1)).unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::InvalidToken)));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let tokens = service();
        let token = tokens.issue(&Identity::user(1, "alice")).unwrap();
        let forged = tokens.issue(&Identity::admin(1, "alice", "admin")).unwrap();

        // Splice the admin payload onto the user token's signature.
        let parts = token.split('.').collect::<Vec<_>>();
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(tokens.verify(&spliced), Err(TokenError::InvalidToken)));
    }

    #[test]
    fn token_from_other_secret_is_rejected() {
        let other = TokenService::new("other-secret", Duration::hours(1));
        let token = other.issue(&Identity::user(1, "alice")).unwrap();

        assert!(service().verify(&token).is_err());
        assert!(service().verify("not-a-token").is_err());
    }
}

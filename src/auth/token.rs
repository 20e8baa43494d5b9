//! Token Service
//! Issues and verifies signed, time-limited identity tokens (HS256).

use crate::auth::models::{Claims, User};
use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// Issues and verifies identity tokens with a process-wide secret.
///
/// There is no revocation list; invalidation is solely via expiry.
pub struct TokenService {
    secret: String,
    lifetime_hours: i64,
}

impl TokenService {
    pub fn new(secret: String, lifetime_hours: i64) -> Self {
        Self {
            secret,
            lifetime_hours,
        }
    }

    /// Issue a token for a user. Returns the token and its lifetime in
    /// seconds.
    pub fn issue(&self, user: &User) -> Result<(String, usize)> {
        let now = Utc::now();
        let expiration = now
            .checked_add_signed(chrono::Duration::hours(self.lifetime_hours))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = Claims {
            user_id: user.id,
            customer_id: user.customer_id.clone(),
            role: user.role,
            email: user.email.clone(),
            iat: now.timestamp() as usize,
            exp: expiration,
        };

        debug!(
            "Issuing token for {} ({}), expires in {}h",
            user.email, user.id, self.lifetime_hours
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign token")?;

        Ok((token, (self.lifetime_hours * 3600) as usize))
    }

    /// Verify signature and expiry. Expired, malformed, and bad-signature
    /// tokens are all the same outward signal: an error.
    pub fn verify(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .context("Invalid or expired token")?;

        Ok(decoded.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::{now_rfc3339, Role};
    use uuid::Uuid;

    fn create_test_user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "agent@logisticsco.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::Agent,
            customer_id: "LogisticsCo".to_string(),
            first_name: "Test".to_string(),
            last_name: "Agent".to_string(),
            is_active: true,
            created_at: now_rfc3339(),
        }
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let service = TokenService::new("test-secret-key-12345".to_string(), 24);
        let user = create_test_user();

        let (token, expires_in) = service.issue(&user).unwrap();
        assert!(!token.is_empty());
        assert_eq!(expires_in, 24 * 3600);

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.customer_id, "LogisticsCo");
        assert_eq!(claims.role, Role::Agent);
        assert_eq!(claims.email, user.email);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_malformed_token_rejected() {
        let service = TokenService::new("test-secret-key-12345".to_string(), 24);
        assert!(service.verify("not.a.token").is_err());
        assert!(service.verify("").is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenService::new("secret1".to_string(), 24);
        let verifier = TokenService::new("secret2".to_string(), 24);

        let (token, _) = issuer.issue(&create_test_user()).unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // Negative lifetime puts exp in the past.
        let service = TokenService::new("test-secret-key-12345".to_string(), -1);
        let (token, _) = service.issue(&create_test_user()).unwrap();
        assert!(service.verify(&token).is_err());
    }
}

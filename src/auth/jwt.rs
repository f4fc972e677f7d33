use crate::models::{Claims, TokenType};
use jsonwebtoken::{DecodingKey, Validation, decode};

/// Decodes and validates an HS256 token. Only access tokens are accepted on
/// API routes; refresh tokens belong to the identity provider.
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, String> {
    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| e.to_string())?;

    if claims.token_type != TokenType::Access {
        return Err("Not an access token".to_string());
    }

    Ok(claims)
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use std::time::{SystemTime, UNIX_EPOCH};
    use uuid::Uuid;

    pub fn issue_token(user_id: u64, token_type: TokenType, secret: &str, ttl: i64) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;

        let claims = Claims {
            user_id,
            sub: format!("user{user_id}@example.com"),
            exp: (now + ttl) as usize,
            jti: Uuid::new_v4().to_string(),
            token_type,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::issue_token;
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn accepts_valid_access_token() {
        let token = issue_token(7, TokenType::Access, SECRET, 600);
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id, 7);
    }

    #[test]
    fn rejects_refresh_token() {
        let token = issue_token(7, TokenType::Refresh, SECRET, 600);
        assert!(verify_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn rejects_wrong_secret_and_expired() {
        let token = issue_token(7, TokenType::Access, SECRET, 600);
        assert!(verify_access_token(&token, "other").is_err());

        let expired = issue_token(7, TokenType::Access, SECRET, -3600);
        assert!(verify_access_token(&expired, SECRET).is_err());
    }

    #[test]
    fn bearer_prefix() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }
}

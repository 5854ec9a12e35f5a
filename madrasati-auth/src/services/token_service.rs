use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use jsonwebtoken::{encode, EncodingKey, Header};
use rand::Rng;
use sha2::{Digest, Sha256};

use madrasati_shared::errors::AppError;
use madrasati_shared::types::auth::{Claims, TokenPair, UserRole};

use crate::config::AppConfig;
use crate::models::NewRefreshToken;
use crate::schema::refresh_tokens;

pub fn create_access_token(
    user_id: i64,
    role: UserRole,
    secret: &str,
    ttl_secs: i64,
) -> Result<String, AppError> {
    let claims = Claims::new(user_id, role, ttl_secs);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("JWT encoding failed: {e}")))
}

pub fn create_refresh_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn refresh_expiry(config: &AppConfig) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(config.jwt_refresh_ttl)
}

/// Mints an access token and a refresh token, storing the refresh token hash.
pub fn issue_tokens(
    conn: &mut PgConnection,
    config: &AppConfig,
    user_id: i64,
    role: UserRole,
) -> Result<TokenPair, AppError> {
    let access_token = create_access_token(user_id, role, &config.jwt_secret, config.jwt_access_ttl)?;
    let refresh_token = create_refresh_token();

    diesel::insert_into(refresh_tokens::table)
        .values(&NewRefreshToken {
            user_id,
            token_hash: hash_token(&refresh_token),
            expires_at: refresh_expiry(config),
        })
        .execute(conn)?;

    Ok(TokenPair::new(access_token, refresh_token, config.jwt_access_ttl))
}

#[cfg(test)]
mod tests {
    use super::*;
    use madrasati_shared::middleware::decode_access_token;

    #[test]
    fn access_token_decodes_with_same_secret() {
        let token = create_access_token(42, UserRole::SchoolAdmin, "secret", 60).unwrap();
        let claims = decode_access_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, UserRole::SchoolAdmin);

        assert!(decode_access_token(&token, "other").is_err());
    }

    #[test]
    fn refresh_tokens_are_random_hex() {
        let a = create_refresh_token();
        let b = create_refresh_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn token_hash_is_stable_sha256() {
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_eq!(hash_token("abc").len(), 64);
        assert_ne!(hash_token("abc"), hash_token("abd"));
    }
}

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::errors::{AppError, ErrorCode};
use crate::types::auth::{AuthUser, Claims, UserRole};

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Secret shared by every service that verifies access tokens.
pub fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| DEV_JWT_SECRET.to_string())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)?;
        let claims = decode_access_token(token, &jwt_secret())?;

        if claims.is_expired() {
            return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
        }

        Ok(AuthUser::from(claims))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| AppError::unauthorized("missing authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("authorization header must use Bearer scheme"))
}

pub fn decode_access_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    Ok(token_data.claims)
}

async fn require_role<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
    allowed: &[UserRole],
    message: &'static str,
) -> Result<AuthUser, AppError> {
    let user = AuthUser::from_request_parts(parts, state).await?;
    if !allowed.contains(&user.role) {
        return Err(AppError::forbidden(message));
    }
    Ok(user)
}

macro_rules! role_extractor {
    ($(#[$doc:meta])* $name:ident, [$($role:ident),+], $message:literal) => {
        $(#[$doc])*
        pub struct $name(pub AuthUser);

        #[axum::async_trait]
        impl<S> FromRequestParts<S> for $name
        where
            S: Send + Sync,
        {
            type Rejection = AppError;

            async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
                require_role(parts, state, &[$(UserRole::$role),+], $message).await.map(Self)
            }
        }
    };
}

role_extractor!(
    /// Require the parent role
    ParentUser, [Parent], "parent access required"
);
role_extractor!(
    /// Require the school admin role
    SchoolAdminUser, [SchoolAdmin], "school admin access required"
);
role_extractor!(
    /// Require the super admin role
    SuperAdminUser, [SuperAdmin], "super admin access required"
);
role_extractor!(
    /// Parents and school admins, the roles allowed to dispute a published review
    ReporterUser, [Parent, SchoolAdmin], "only parents and school admins can report reviews"
);

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(claims: &Claims, secret: &str) -> String {
        encode(&Header::default(), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn bearer_token_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn missing_or_malformed_header_is_unauthorized() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_token(&headers).unwrap_err().error_code(), ErrorCode::Unauthorized);

        let mut basic = HeaderMap::new();
        basic.insert("Authorization", "Basic Zm9vOmJhcg==".parse().unwrap());
        assert_eq!(extract_bearer_token(&basic).unwrap_err().error_code(), ErrorCode::Unauthorized);
    }

    #[test]
    fn valid_token_decodes() {
        let claims = Claims::new(42, UserRole::SchoolAdmin, 300);
        let token = token_for(&claims, "s3cret");

        let decoded = decode_access_token(&token, "s3cret").unwrap();
        assert_eq!(decoded.sub, 42);
        assert_eq!(decoded.role, UserRole::SchoolAdmin);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for(&Claims::new(1, UserRole::Parent, 300), "secret-a");
        let err = decode_access_token(&token, "secret-b").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TokenInvalid);
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new(1, UserRole::Parent, 0);
        claims.exp -= 3_600;
        let token = token_for(&claims, "s3cret");
        let err = decode_access_token(&token, "s3cret").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::TokenExpired);
    }
}

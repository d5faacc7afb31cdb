use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey};
use serde::{Deserialize, Serialize};
use mongodb::bson::oid::ObjectId;

use crate::models::Role;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // User ID
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

pub struct JwtService;

impl JwtService {
    fn issue(user_id: &ObjectId, role: Role, expiry: i64, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: user_id.to_hex(),
            role,
            exp: now + expiry,
            iat: now,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    pub fn generate_access_token(user_id: &ObjectId, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(
            user_id,
            role,
            crate::config::Config::jwt_expiry(),
            &crate::config::Config::jwt_secret(),
        )
    }

    pub fn generate_refresh_token(user_id: &ObjectId, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        Self::issue(
            user_id,
            role,
            crate::config::Config::jwt_refresh_expiry(),
            &crate::config::Config::jwt_refresh_secret(),
        )
    }

    pub fn verify_token(token: &str, is_refresh: bool) -> Result<Claims, jsonwebtoken::errors::Error> {
        let secret = if is_refresh {
            crate::config::Config::jwt_refresh_secret()
        } else {
            crate::config::Config::jwt_secret()
        };

        Self::decode_with(token, &secret)
    }

    fn decode_with(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn access_tokens_round_trip_identity() {
        let user_id = ObjectId::new();
        let token = JwtService::generate_access_token(&user_id, Role::Assistant).unwrap();
        let claims = JwtService::verify_token(&token, false).unwrap();
        assert_eq!(claims.sub, user_id.to_hex());
        assert_eq!(claims.role, Role::Assistant);
    }

    #[test]
    fn refresh_tokens_do_not_pass_as_access_tokens() {
        let token = JwtService::generate_refresh_token(&ObjectId::new(), Role::User).unwrap();
        assert!(JwtService::verify_token(&token, false).is_err());
        assert!(JwtService::verify_token(&token, true).is_ok());
    }

    #[test]
    fn tokens_signed_with_the_fallback_key_fail_once_a_key_is_configured() {
        let figment = rocket::figment::Figment::new()
            .merge(("jwt_secret", "deployment-signing-key"));
        let secret = crate::config::Config::jwt_secret_in(&figment);

        let forged = JwtService::issue(
            &ObjectId::new(),
            Role::User,
            900,
            crate::config::FALLBACK_JWT_SECRET,
        )
        .unwrap();
        assert!(JwtService::decode_with(&forged, &secret).is_err());

        let genuine = JwtService::issue(&ObjectId::new(), Role::User, 900, &secret).unwrap();
        assert!(JwtService::decode_with(&genuine, &secret).is_ok());
    }
}

use crate::entities::UserIdentity;
use axum::http::{HeaderMap, header};
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

/// Motivo del rifiuto di un bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    /// Token valido ma non di accesso (es. refresh token usato per connettersi)
    #[error("wrong token type")]
    WrongType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

// struct che codifica il contenuto del token jwt
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub exp: usize, // Expiry time of the token
    pub iat: usize, // Issued at time of the token
    pub id: i32,
    pub username: String,
    pub token_type: TokenType,
}

/// Segreti e durate dei token. Access e refresh sono firmati con chiavi diverse.
#[derive(Debug, Clone)]
pub struct JwtKeys {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl JwtKeys {
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(30),
            refresh_ttl: Duration::days(7),
        }
    }

    fn secret_for(&self, token_type: TokenType) -> &str {
        match token_type {
            TokenType::Access => &self.access_secret,
            TokenType::Refresh => &self.refresh_secret,
        }
    }
}

#[instrument(skip(keys), fields(user_id = %user_id, username = %username))]
pub fn encode_jwt(
    user_id: i32,
    username: &str,
    token_type: TokenType,
    keys: &JwtKeys,
) -> Result<String, jsonwebtoken::errors::Error> {
    debug!("Encoding JWT token for user");
    let now = Utc::now();
    let ttl = match token_type {
        TokenType::Access => keys.access_ttl,
        TokenType::Refresh => keys.refresh_ttl,
    };
    let claims = Claims {
        iat: now.timestamp() as usize,
        exp: (now + ttl).timestamp() as usize,
        id: user_id,
        username: username.to_string(),
        token_type,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(keys.secret_for(token_type).as_bytes()),
    )
    .map_err(|e| {
        error!("Failed to encode JWT token: {:?}", e);
        e
    })
}

/// Verifica un access token e restituisce l'identità dell'utente.
///
/// Un token firmato con il segreto di refresh viene riconosciuto e rifiutato
/// con `WrongType` invece che con un generico `Invalid`.
#[instrument(skip_all)]
pub fn verify_token(token: &str, keys: &JwtKeys) -> Result<UserIdentity, AuthError> {
    debug!("Verifying access token");
    let access_key = DecodingKey::from_secret(keys.access_secret.as_bytes());

    match decode::<Claims>(token, &access_key, &Validation::default()) {
        Ok(data) if data.claims.token_type != TokenType::Access => {
            warn!("Token signed as access token carries a non-access type");
            Err(AuthError::WrongType)
        }
        Ok(data) => {
            info!("Token verified for user: {}", data.claims.username);
            Ok(UserIdentity {
                user_id: data.claims.id,
                username: data.claims.username,
            })
        }
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => {
                warn!("Token expired");
                Err(AuthError::Expired)
            }
            ErrorKind::InvalidSignature if is_refresh_token(token, keys) => {
                warn!("Refresh token used where an access token is required");
                Err(AuthError::WrongType)
            }
            _ => {
                warn!("Failed to decode JWT token: {:?}", e);
                Err(AuthError::Invalid)
            }
        },
    }
}

fn is_refresh_token(token: &str, keys: &JwtKeys) -> bool {
    let mut validation = Validation::default();
    validation.validate_exp = false;
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(keys.refresh_secret.as_bytes()),
        &validation,
    )
    .is_ok()
}

/// Estrae il bearer token dall'header `Authorization`, se presente
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(scheme), Some(token)) if scheme.eq_ignore_ascii_case("bearer") => {
            Some(token.to_string())
        }
        _ => None,
    }
}

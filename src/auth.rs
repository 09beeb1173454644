//! Bearer token gate for the resolution endpoint.
//!
//! Tokens are issued by the account service as HS256 JWTs. This service only
//! verifies them: signature, expiry, and that it is an access token.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::Sha256;
use tracing::debug;

use crate::{AppState, error::ApiError};

type HmacSha256 = Hmac<Sha256>;

const MISSING_CREDENTIALS: &str = "Authentication credentials were not provided.";
const INVALID_TOKEN: &str = "Given token not valid for any token type";

#[derive(Debug, Deserialize)]
struct Header {
    alg: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub exp: i64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<Value>,
}

/// Identity of the caller, available to handlers as an extension.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    UnsupportedAlgorithm,
    BadSignature,
    Expired,
    WrongType,
}

/// Checks an HS256 token against `secret` and returns its claims.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(TokenError::Malformed);
    };

    let header: Header = decode_segment(header)?;
    if header.alg != "HS256" {
        return Err(TokenError::UnsupportedAlgorithm);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::BadSignature)?;
    mac.update(token[..header_and_payload_len(token)].as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::BadSignature)?;

    let claims: Claims = decode_segment(payload)?;
    if claims.exp <= Utc::now().timestamp() {
        return Err(TokenError::Expired);
    }
    if claims
        .token_type
        .as_deref()
        .is_some_and(|token_type| token_type != "access")
    {
        return Err(TokenError::WrongType);
    }

    Ok(claims)
}

fn header_and_payload_len(token: &str) -> usize {
    token.rfind('.').unwrap_or(token.len())
}

fn decode_segment<T: DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::unauthorized(MISSING_CREDENTIALS))?;

    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| ApiError::unauthorized(INVALID_TOKEN))?;

    let claims = verify_token(token, secret.as_bytes()).map_err(|error| {
        debug!("Rejected bearer token: {error:?}");
        ApiError::unauthorized(INVALID_TOKEN)
    })?;

    let user_id = claims.user_id.map(|value| match value {
        Value::String(text) => text,
        other => other.to_string(),
    });
    request
        .extensions_mut()
        .insert(AuthenticatedUser { user_id });

    Ok(next.run(request).await)
}

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::config::Settings;

#[derive(Debug, Error)]
pub(crate) enum SecurityError {
    #[error("jwt decoding failed")]
    JwtDecoding,
    #[error("unsupported jwt algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) role: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CallerRole {
    Student,
    Teacher,
    Admin,
}

impl CallerRole {
    /// Unknown or missing roles are treated as the least privileged.
    pub(crate) fn from_claim(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("admin") => Self::Admin,
            Some("teacher") => Self::Teacher,
            _ => Self::Student,
        }
    }

    pub(crate) fn can_author(self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

/// Authenticated principal resolved from a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Caller {
    pub(crate) user_id: String,
    pub(crate) role: CallerRole,
}

impl Caller {
    pub(crate) fn is_admin(&self) -> bool {
        self.role == CallerRole::Admin
    }
}

impl From<Claims> for Caller {
    fn from(claims: Claims) -> Self {
        Self { role: CallerRole::from_claim(claims.role.as_deref()), user_id: claims.sub }
    }
}

pub(crate) fn verify_token(token: &str, settings: &Settings) -> Result<Claims, SecurityError> {
    let algorithm = algorithm_from_settings(settings)?;
    let mut validation = Validation::new(algorithm);
    validation.validate_exp = true;
    validation.required_spec_claims.insert("exp".to_string());
    validation.required_spec_claims.insert("sub".to_string());
    match settings.security().audience.as_deref() {
        Some(audience) => validation.set_audience(&[audience]),
        None => validation.validate_aud = false,
    }

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(settings.security().secret_key.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|_| SecurityError::JwtDecoding)
}

pub(crate) fn algorithm_from_settings(settings: &Settings) -> Result<Algorithm, SecurityError> {
    match settings.security().algorithm.as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        other => Err(SecurityError::UnsupportedAlgorithm(other.to_string())),
    }
}

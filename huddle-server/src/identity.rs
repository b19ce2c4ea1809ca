//! Identity verification.
//!
//! Credentials are issued elsewhere; this module only checks them. The
//! bundled [`JwtVerifier`] accepts HS256 tokens carrying `_id`/`sub` and
//! `email` claims.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A verified participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: String,
    pub label: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }

    /// The synthetic sender used for assistant responses.
    pub fn assistant() -> Self {
        Self::new("ai", "AI")
    }

    /// Case-insensitive match against either the id or the label.
    pub fn answers_to(&self, name: &str) -> bool {
        self.id.eq_ignore_ascii_case(name) || self.label.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("token expired")]
    Expired,
    #[error("invalid token: {0}")]
    Invalid(String),
    #[error("token carries no subject")]
    NoSubject,
    #[error("verifier not configured")]
    NotConfigured,
}

pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> Result<Identity, AuthFailure>;
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: Option<String>,
    #[serde(rename = "_id")]
    object_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
}

impl Claims {
    fn into_identity(self) -> Result<Identity, AuthFailure> {
        let id = self
            .sub
            .or(self.object_id)
            .or_else(|| self.email.clone())
            .filter(|s| !s.is_empty())
            .ok_or(AuthFailure::NoSubject)?;
        let label = self.email.or(self.name).unwrap_or_else(|| id.clone());
        Ok(Identity { id, label })
    }
}

/// HS256 JSON Web Token verifier.
pub struct JwtVerifier {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl JwtVerifier {
    /// With no secret every credential is rejected.
    pub fn new(secret: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        // Tokens from the account service carry no iss/aud/exp requirements.
        validation.required_spec_claims.clear();
        Self {
            key: secret
                .filter(|s| !s.is_empty())
                .map(|s| DecodingKey::from_secret(s.as_bytes())),
            validation,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }
}

impl IdentityVerifier for JwtVerifier {
    fn verify(&self, credential: &str) -> Result<Identity, AuthFailure> {
        let key = self.key.as_ref().ok_or(AuthFailure::NotConfigured)?;
        let data = decode::<Claims>(credential, key, &self.validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthFailure::Expired,
                _ => AuthFailure::Invalid(e.to_string()),
            }
        })?;
        data.claims.into_identity()
    }
}

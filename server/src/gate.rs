//! Session gate — credential verification at connection time.
//!
//! DESIGN
//! ======
//! Authentication is mandatory before any room operation. The handshake hands
//! the raw credential to a [`CredentialVerifier`] and either admits the
//! connection with a typed [`Identity`] attached, or refuses it with a typed
//! rejection — never a silent drop.
//!
//! TRADE-OFFS
//! ==========
//! The default verifier decodes a base64 JSON document. That is a stand-in for
//! signed-token verification: production swaps in a real verifier behind the
//! same trait without touching the handshake control flow.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use protocol::RejectCode;
use serde::Deserialize;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// Identity extracted from a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub user_email: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("credential required")]
    MissingCredential,
    #[error("credential rejected: {0}")]
    InvalidCredential(String),
}

impl AuthError {
    #[must_use]
    pub fn code(&self) -> RejectCode {
        match self {
            Self::MissingCredential => RejectCode::AuthRequired,
            Self::InvalidCredential(_) => RejectCode::InvalidToken,
        }
    }
}

// =============================================================================
// VERIFIER
// =============================================================================

/// Pluggable credential verification. Implementations must be cheap and
/// synchronous; anything that needs I/O should resolve it before the upgrade.
pub trait CredentialVerifier: Send + Sync {
    /// Decode a raw credential into an identity.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredential`] when the credential cannot be
    /// decoded or is missing required claims.
    fn verify(&self, raw: &str) -> Result<Identity, AuthError>;
}

/// Claims carried by the placeholder credential format.
#[derive(Debug, Deserialize)]
struct CredentialClaims {
    user_id: Uuid,
    email: String,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// Placeholder verifier: URL-safe base64 of a JSON claims document.
pub struct Base64JsonVerifier;

impl CredentialVerifier for Base64JsonVerifier {
    fn verify(&self, raw: &str) -> Result<Identity, AuthError> {
        if raw.is_empty() {
            return Err(AuthError::MissingCredential);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|e| AuthError::InvalidCredential(format!("not base64: {e}")))?;
        let claims: CredentialClaims = serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::InvalidCredential(format!("bad claims: {e}")))?;

        Ok(Identity {
            user_id: claims.user_id,
            user_email: claims.email,
            avatar_url: claims.avatar_url,
        })
    }
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;

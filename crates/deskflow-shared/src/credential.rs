use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use crate::error::CredentialError;
use crate::types::{Caller, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

// Signed by the server, presented back as a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i64,
    pub role: Role,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn caller(&self) -> Caller {
        Caller {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// Encode and sign `claims`.
///
/// Wire form: `base64url(json(claims)) "." base64url(ed25519 signature)`.
pub fn issue_credential(
    claims: &Claims,
    signing_key: &SigningKey,
) -> Result<String, CredentialError> {
    let payload =
        serde_json::to_vec(claims).map_err(|e| CredentialError::Encoding(e.to_string()))?;
    let signature = signing_key.sign(&payload);

    Ok(format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(&payload),
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Check signature and expiry, returning the embedded claims.
pub fn verify_credential(
    token: &str,
    verifying_key: &VerifyingKey,
    now: DateTime<Utc>,
) -> Result<Claims, CredentialError> {
    let (payload_b64, signature_b64) = token
        .trim()
        .split_once('.')
        .ok_or(CredentialError::Malformed)?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| CredentialError::Malformed)?;
    let signature_bytes = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| CredentialError::Malformed)?;

    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return Err(CredentialError::Malformed);
    };

    verifying_key
        .verify(&payload, &signature)
        .map_err(|_| CredentialError::BadSignature)?;

    let claims: Claims =
        serde_json::from_slice(&payload).map_err(|_| CredentialError::Malformed)?;

    if now > claims.expires_at {
        return Err(CredentialError::Expired);
    }

    Ok(claims)
}

//! secp256k1 key handling for node identities.
//!
//! Node keys arrive as hex strings in the fleet spec. They are validated
//! here before anything is written to the cluster, and the public key
//! derived from them is the node's enode identity.

use crate::error::ControllerError;
use k256::SecretKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;

const PRIVATE_KEY_HEX_LEN: usize = 64;

/// Strip an optional `0x`/`0X` prefix and check the remainder is a 32-byte
/// hex scalar. Returns the lowercase hex digits.
pub fn normalize_private_key(raw: &str) -> Result<String, ControllerError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);

    if digits.len() != PRIVATE_KEY_HEX_LEN {
        return Err(ControllerError::InvalidKeyMaterial(format!(
            "expected {} hex digits, got {}",
            PRIVATE_KEY_HEX_LEN,
            digits.len()
        )));
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ControllerError::InvalidKeyMaterial(
            "private key contains non-hex characters".to_string(),
        ));
    }

    Ok(digits.to_ascii_lowercase())
}

fn secret_key(raw: &str) -> Result<(String, SecretKey), ControllerError> {
    let digits = normalize_private_key(raw)?;
    let bytes = hex::decode(&digits)
        .map_err(|e| ControllerError::InvalidKeyMaterial(e.to_string()))?;
    let key = SecretKey::from_slice(&bytes).map_err(|_| {
        ControllerError::InvalidKeyMaterial("private key is not a valid secp256k1 scalar".to_string())
    })?;
    Ok((digits, key))
}

/// Validate a private key, returning its normalized hex form.
pub fn validate_private_key(raw: &str) -> Result<String, ControllerError> {
    secret_key(raw).map(|(digits, _)| digits)
}

/// Derive the 128 hex digit uncompressed public key (without the `04` tag).
pub fn derive_public_key(raw: &str) -> Result<String, ControllerError> {
    let (_, key) = secret_key(raw)?;
    let point = key.public_key().to_encoded_point(false);
    Ok(hex::encode(&point.as_bytes()[1..]))
}

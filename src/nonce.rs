use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

use crate::types::Nonce;

/// Generates a cryptographically random nonce for the `OAuth2` `state` parameter.
///
/// Returns a 22-character URL-safe string (16 random bytes → base64url).
#[must_use]
pub fn generate_nonce() -> Nonce {
    let random_bytes: [u8; 16] = rand::rng().random();
    Nonce(URL_SAFE_NO_PAD.encode(random_bytes))
}

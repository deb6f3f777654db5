use ring::hmac::{self, Key, HMAC_SHA256};

/// HMAC-SHA256 check over the raw webhook body.
///
/// Runs before the body is parsed; a mismatch means the event is dropped.
pub struct WebhookSignatureVerifier {
    hmac_key: Key,
}

impl WebhookSignatureVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            hmac_key: Key::new(HMAC_SHA256, secret.as_bytes()),
        }
    }

    /// `signature` is the hex digest the processor sends alongside the body
    pub fn verify(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(signature) = hex::decode(signature.trim()) else {
            return false;
        };

        // Constant-time comparison
        hmac::verify(&self.hmac_key, payload, &signature).is_ok()
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        hex::encode(hmac::sign(&self.hmac_key, payload).as_ref())
    }
}

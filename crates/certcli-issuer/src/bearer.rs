use sha2::{Digest, Sha256};

/// Bearer token for the key endpoint: lowercase hex SHA-256 of the passphrase
pub fn bearer_token(passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(passphrase.as_bytes());
    format!("{:x}", hasher.finalize())
}

use sha2::{Digest, Sha256};

/// Hex-encoded SHA256 of an upload payload, sent as `X-Checksum-Sha256`.
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

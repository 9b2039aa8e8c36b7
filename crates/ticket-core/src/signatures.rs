use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Feishu signs callbacks as `sha256(timestamp + nonce + token + body)`.
pub fn compute_feishu_signature(timestamp: &str, nonce: &str, token: &str, body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.as_bytes());
    hasher.update(nonce.as_bytes());
    hasher.update(token.as_bytes());
    hasher.update(body);
    hex::encode(hasher.finalize())
}

pub fn verify_feishu_signature(
    timestamp: &str,
    nonce: &str,
    token: &str,
    body: &[u8],
    signature_header: &str,
) -> bool {
    let expected = compute_feishu_signature(timestamp, nonce, token, body);
    let provided = normalize_signature(signature_header);
    constant_time_hex_equals(&provided, &expected)
}

fn normalize_signature(raw: &str) -> String {
    raw.chars()
        .filter(|character| !character.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase()
}

fn constant_time_hex_equals(left: &str, right: &str) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

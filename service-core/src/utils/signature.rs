use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate a timestamped webhook signature.
///
/// Format: hex(HMAC-SHA256("{timestamp}.{body}", secret)). The body is signed
/// exactly as received; it must be valid UTF-8.
pub fn generate_signature(
    secret: &str,
    timestamp: i64,
    body: &[u8],
) -> Result<String, anyhow::Error> {
    let body = std::str::from_utf8(body)
        .map_err(|e| anyhow::anyhow!("Payload is not valid UTF-8: {}", e))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;

    mac.update(format!("{}.{}", timestamp, body).as_bytes());
    let result = mac.finalize();

    Ok(hex::encode(result.into_bytes()))
}

/// Verify a timestamped webhook signature using constant-time comparison.
///
/// Hex case is ignored.
pub fn verify_signature(
    secret: &str,
    timestamp: i64,
    body: &[u8],
    signature: &str,
) -> Result<bool, anyhow::Error> {
    let expected_signature = generate_signature(secret, timestamp, body)?;
    let provided = signature.trim().to_ascii_lowercase();

    let expected_bytes = expected_signature.as_bytes();
    let signature_bytes = provided.as_bytes();

    if expected_bytes.len() != signature_bytes.len() {
        return Ok(false);
    }

    Ok(expected_bytes.ct_eq(signature_bytes).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const TIMESTAMP: i64 = 1700000000;
    const BODY: &[u8] = br#"{"name":"transaction.approved"}"#;
    const KNOWN_SIGNATURE: &str =
        "991473c02443698b23b79b13944d4554c9724deaa42a39d584f66a56e280cb4d";

    #[test]
    fn test_known_vector() {
        let signature = generate_signature(SECRET, TIMESTAMP, BODY).unwrap();
        assert_eq!(signature, KNOWN_SIGNATURE);

        let signature = generate_signature(
            "key",
            0,
            b"The quick brown fox jumps over the lazy dog",
        )
        .unwrap();
        assert_eq!(
            signature,
            "8511f28f7a1949f0c42772b447d68b2daf760f5f0439a20a17e3b4e7cd395763"
        );
    }

    #[test]
    fn test_each_input_changes_signature() {
        let base = generate_signature(SECRET, TIMESTAMP, BODY).unwrap();

        assert_ne!(
            generate_signature("whsec_other", TIMESTAMP, BODY).unwrap(),
            base
        );
        assert_ne!(
            generate_signature(SECRET, TIMESTAMP + 1, BODY).unwrap(),
            base
        );
        assert_ne!(
            generate_signature(SECRET, TIMESTAMP, br#"{"name":"transaction.declined"}"#)
                .unwrap(),
            base
        );
    }

    #[test]
    fn test_verification_ignores_hex_case() {
        let upper = KNOWN_SIGNATURE.to_ascii_uppercase();
        assert!(verify_signature(SECRET, TIMESTAMP, BODY, &upper).unwrap());
        assert!(verify_signature(SECRET, TIMESTAMP, BODY, KNOWN_SIGNATURE).unwrap());
    }

    #[test]
    fn test_invalid_signature() {
        let invalid_signature = format!("a{}", &KNOWN_SIGNATURE[1..]);
        assert!(!verify_signature(SECRET, TIMESTAMP, BODY, &invalid_signature).unwrap());
        assert!(!verify_signature(SECRET, TIMESTAMP, BODY, "deadbeef").unwrap());
    }

    #[test]
    fn test_tampered_body() {
        let tampered = br#"{"name":"transaction.approved","amount":1}"#;
        assert!(!verify_signature(SECRET, TIMESTAMP, tampered, KNOWN_SIGNATURE).unwrap());
    }

    #[test]
    fn test_non_utf8_body_is_an_error() {
        assert!(generate_signature(SECRET, TIMESTAMP, &[0xff, 0xfe]).is_err());
    }
}

//! `x-fedapay-signature` header parsing and verification.
//!
//! The header is a `,` or `;` separated list of `key=value` pairs, e.g.
//! `t=1700000000,v1=991473c0...`. The signed payload is `"{t}.{raw_body}"`.

use service_core::utils::signature::verify_signature;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-fedapay-signature";

/// Hex length of an HMAC-SHA256 digest.
const SIGNATURE_HEX_LEN: usize = 64;

fn is_hex_signature(value: &str) -> bool {
    value.len() == SIGNATURE_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signature: String,
}

fn segments(header: &str) -> impl Iterator<Item = &str> {
    header
        .split([',', ';'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn unquote(value: &str) -> &str {
    value.trim().trim_matches(|c| c == '"' || c == '\'').trim()
}

impl SignatureHeader {
    /// Strict `t` + `v1` (or `v0`) parse, then the bare-hex fallback.
    pub fn parse(header: &str) -> Option<Self> {
        Self::parse_strict(header).or_else(|| Self::parse_bare_hex(header))
    }

    fn timestamp(header: &str) -> Option<i64> {
        segments(header)
            .filter_map(|s| s.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("t"))
            .and_then(|(_, v)| unquote(v).parse().ok())
    }

    fn parse_strict(header: &str) -> Option<Self> {
        let timestamp = Self::timestamp(header)?;

        let mut v1 = None;
        let mut v0 = None;
        for (key, value) in segments(header).filter_map(|s| s.split_once('=')) {
            let value = unquote(value);
            if value.is_empty() {
                continue;
            }
            match key.trim().to_ascii_lowercase().as_str() {
                "v1" if v1.is_none() => v1 = Some(value.to_string()),
                "v0" if v0.is_none() => v0 = Some(value.to_string()),
                _ => {}
            }
        }

        v1.or(v0).map(|signature| Self {
            timestamp,
            signature,
        })
    }

    /// Timestamp present but no signature key: take a bare 64-hex segment.
    fn parse_bare_hex(header: &str) -> Option<Self> {
        let timestamp = Self::timestamp(header)?;

        segments(header)
            .filter(|s| !s.contains('='))
            .map(unquote)
            .find(|s| is_hex_signature(s))
            .map(|signature| Self {
                timestamp,
                signature: signature.to_string(),
            })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureRejection {
    #[error("webhook secret not configured")]
    SecretNotConfigured,
    #[error("signature header missing")]
    MissingHeader,
    #[error("signature header malformed")]
    MalformedHeader,
    #[error("signature timestamp outside tolerance")]
    OutsideTolerance,
    #[error("body is not valid UTF-8")]
    InvalidBody,
    #[error("signature mismatch")]
    Mismatch,
}

/// Verifies a webhook delivery against the shared secret.
///
/// `tolerance_seconds == 0` skips the timestamp window check.
pub fn verify_webhook(
    secret: &str,
    header: Option<&str>,
    body: &[u8],
    tolerance_seconds: u64,
    now: i64,
) -> Result<SignatureHeader, SignatureRejection> {
    if secret.is_empty() {
        return Err(SignatureRejection::SecretNotConfigured);
    }
    let header = header
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .ok_or(SignatureRejection::MissingHeader)?;
    let parsed = SignatureHeader::parse(header).ok_or(SignatureRejection::MalformedHeader)?;

    if tolerance_seconds > 0 && now.abs_diff(parsed.timestamp) > tolerance_seconds {
        return Err(SignatureRejection::OutsideTolerance);
    }

    match verify_signature(secret, parsed.timestamp, body, &parsed.signature) {
        Ok(true) => Ok(parsed),
        Ok(false) => Err(SignatureRejection::Mismatch),
        Err(_) => Err(SignatureRejection::InvalidBody),
    }
}

/// Shortens a signature or header for logs: `abcdef123456...0a1b2c3d`.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 20 {
        return "***".to_string();
    }
    let head: String = chars[..12].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();
    format!("{}...{}", head, tail)
}

//! On-disk encrypted representation.
//!
//! Wire format (bit-exact):
//!
//! ```text
//! <!-- LOCKDOWN_ENCRYPTED -->\n
//! base64( salt[16] || nonce[12] || ciphertext || tag[16] )
//! ```
//!
//! Decoding is lenient about whitespace, repeated markers and payloads that
//! were duplicated by a racing writer. Recovery is best-effort: whatever it
//! produces still has to pass the charset check here and AEAD authentication
//! in the service.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::crypto::{NONCE_SIZE, SALT_SIZE};
use crate::error::{LockdownError, Result};

/// Marker line that prefixes every envelope.
pub const MARKER: &str = "<!-- LOCKDOWN_ENCRYPTED -->";

/// Smallest decodable payload: salt plus nonce.
pub const MIN_PAYLOAD_BYTES: usize = SALT_SIZE + NONCE_SIZE;

/// Payload length above which an unpadded string is treated as a likely
/// duplicate.
const SUSPICIOUS_PAYLOAD_LEN: usize = 300;

/// Half-width of the search window used by the length heuristic.
const RECOVERY_WINDOW: usize = 32;

static PAYLOAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+/]+={0,2}$").expect("payload regex is valid")
});

fn is_base64_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'+' || c == b'/'
}

/// Decoded envelope byte ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeParts {
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext with the authentication tag appended.
    pub ciphertext: Vec<u8>,
}

/// A validated envelope. Immutable; produced by [`Envelope::encode`] or
/// [`Envelope::decode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    payload: String,
}

impl Envelope {
    /// Concatenate the three byte ranges and wrap them in the wire format.
    pub fn encode(
        salt: &[u8; SALT_SIZE],
        nonce: &[u8; NONCE_SIZE],
        ciphertext_with_tag: &[u8],
    ) -> Self {
        let mut raw = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + ciphertext_with_tag.len());
        raw.extend_from_slice(salt);
        raw.extend_from_slice(nonce);
        raw.extend_from_slice(ciphertext_with_tag);
        Self {
            payload: STANDARD.encode(raw),
        }
    }

    /// Parse raw stored text into an envelope.
    ///
    /// # Errors
    ///
    /// Returns `LockdownError::Validation` when the marker is missing, the
    /// payload is empty or not base64 (after recovery), or it decodes to
    /// fewer than [`MIN_PAYLOAD_BYTES`].
    pub fn decode(raw: &str) -> Result<Self> {
        let start = raw
            .find(MARKER)
            .ok_or_else(|| LockdownError::Validation("Missing encryption marker".to_string()))?;
        let rest = &raw[start + MARKER.len()..];
        let segment = match rest.find(MARKER) {
            Some(next) => &rest[..next],
            None => rest,
        };

        let stripped: String = segment.chars().filter(|c| !c.is_whitespace()).collect();
        if stripped.is_empty() {
            return Err(LockdownError::Validation(
                "Encrypted payload is empty".to_string(),
            ));
        }

        let payload = recover_payload(&stripped);
        if !PAYLOAD_RE.is_match(payload) {
            return Err(LockdownError::Validation(
                "Encrypted payload is not valid base64".to_string(),
            ));
        }
        let bytes = STANDARD
            .decode(payload)
            .map_err(|e| LockdownError::Validation(format!("Invalid base64 payload: {}", e)))?;
        if bytes.len() < MIN_PAYLOAD_BYTES {
            return Err(LockdownError::Validation(format!(
                "Encrypted payload too short ({} bytes, need at least {})",
                bytes.len(),
                MIN_PAYLOAD_BYTES
            )));
        }

        if payload.len() != stripped.len() {
            tracing::warn!(
                original_len = stripped.len(),
                recovered_len = payload.len(),
                "Recovered envelope payload from corrupted input"
            );
        }

        Ok(Self {
            payload: payload.to_string(),
        })
    }

    /// Whether `raw` claims to be an envelope.
    pub fn is_envelope(raw: &str) -> bool {
        raw.contains(MARKER)
    }

    /// The canonical base64 payload.
    pub fn extract_payload(&self) -> &str {
        &self.payload
    }

    /// The first half of a payload that is an exact self-repetition, if that
    /// half is a decodable envelope on its own.
    ///
    /// A duplicated unpadded payload is still valid base64, so the codec
    /// cannot tell it from a genuine envelope. The service tries this
    /// candidate only after the full payload fails authentication.
    pub fn repetition_half(&self) -> Option<Envelope> {
        let len = self.payload.len();
        if len % 2 != 0 {
            return None;
        }
        let (first, second) = self.payload.split_at(len / 2);
        if first != second || !PAYLOAD_RE.is_match(first) {
            return None;
        }
        let bytes = STANDARD.decode(first).ok()?;
        if bytes.len() < MIN_PAYLOAD_BYTES {
            return None;
        }
        Some(Self {
            payload: first.to_string(),
        })
    }

    /// Split the decoded payload into salt, nonce and ciphertext.
    pub fn parts(&self) -> Result<EnvelopeParts> {
        let bytes = STANDARD
            .decode(&self.payload)
            .map_err(|e| LockdownError::Validation(format!("Invalid base64 payload: {}", e)))?;
        if bytes.len() < MIN_PAYLOAD_BYTES {
            return Err(LockdownError::Validation(
                "Encrypted payload too short".to_string(),
            ));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[..SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[SALT_SIZE..MIN_PAYLOAD_BYTES]);

        Ok(EnvelopeParts {
            salt,
            nonce,
            ciphertext: bytes[MIN_PAYLOAD_BYTES..].to_vec(),
        })
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n{}", MARKER, self.payload)
    }
}

/// Best-effort recovery of a single base64 block from a payload that may be
/// the concatenation of two.
///
/// Checks in order: `==` followed by a base64 char, a single `=` followed by
/// a base64 char, then (for long payloads only) a padding run that starts
/// near one third of the length. By the last step every `=` with a base64
/// char after it has been ruled out, so only a trailing run of padding is
/// left to find.
///
/// Valid base64 never matches any step, so a well-formed payload comes back
/// unchanged. Unpadded exact repetitions are also valid base64 and are left
/// to [`Envelope::repetition_half`].
fn recover_payload(payload: &str) -> &str {
    let bytes = payload.as_bytes();

    for i in 0..bytes.len().saturating_sub(2) {
        if bytes[i] == b'=' && bytes[i + 1] == b'=' && is_base64_char(bytes[i + 2]) {
            return &payload[..i + 2];
        }
    }

    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'=' && is_base64_char(bytes[i + 1]) {
            return &payload[..i + 1];
        }
    }

    if bytes.len() > SUSPICIOUS_PAYLOAD_LEN {
        let center = bytes.len() / 3;
        let lo = center.saturating_sub(RECOVERY_WINDOW).max(1);
        let hi = (center + RECOVERY_WINDOW).min(bytes.len() - 1);
        for i in lo..hi {
            if bytes[i] == b'=' && is_base64_char(bytes[i - 1]) {
                let mut end = i + 1;
                if end < bytes.len() && bytes[end] == b'=' {
                    end += 1;
                }
                return &payload[..end];
            }
        }
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ciphertext_len: usize) -> Envelope {
        Envelope::encode(&[1u8; SALT_SIZE], &[2u8; NONCE_SIZE], &vec![3u8; ciphertext_len])
    }

    #[test]
    fn test_display_is_wire_format() {
        let envelope = sample(20);
        let text = envelope.to_string();
        assert!(text.starts_with("<!-- LOCKDOWN_ENCRYPTED -->\n"));
        assert_eq!(text.lines().count(), 2);
        assert_eq!(Envelope::decode(&text).unwrap(), envelope);
    }

    #[test]
    fn test_parts_split_ranges() {
        let parts = sample(20).parts().unwrap();
        assert_eq!(parts.salt, [1u8; SALT_SIZE]);
        assert_eq!(parts.nonce, [2u8; NONCE_SIZE]);
        assert_eq!(parts.ciphertext, vec![3u8; 20]);
    }

    #[test]
    fn test_decode_requires_marker() {
        let err = Envelope::decode("QUJDRA==").unwrap_err();
        assert!(matches!(err, LockdownError::Validation(_)));
    }

    #[test]
    fn test_decode_strips_whitespace() {
        let envelope = sample(40);
        let payload = envelope.extract_payload();
        let (head, tail) = payload.split_at(10);
        let raw = format!("  \n{}\n  {}\r\n{}  \n", MARKER, head, tail);
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_decode_stops_at_second_marker() {
        let first = sample(20);
        let second = sample(30);
        let raw = format!("{}\n{}", first, second);
        assert_eq!(Envelope::decode(&raw).unwrap(), first);
    }

    #[test]
    fn test_decode_rejects_empty_payload() {
        let err = Envelope::decode(&format!("{}\n   \n", MARKER)).unwrap_err();
        assert!(matches!(err, LockdownError::Validation(_)));
    }

    #[test]
    fn test_decode_rejects_short_payload() {
        // 27 bytes decodes fine as base64 but is below salt + nonce.
        let bytes: Vec<u8> = (0u8..27).collect();
        let short = STANDARD.encode(bytes);
        let err = Envelope::decode(&format!("{}\n{}", MARKER, short)).unwrap_err();
        assert!(matches!(err, LockdownError::Validation(ref msg) if msg.contains("too short")));
    }

    #[test]
    fn test_decode_rejects_bad_charset() {
        let err = Envelope::decode(&format!("{}\nnot*base64!", MARKER)).unwrap_err();
        assert!(matches!(err, LockdownError::Validation(_)));
    }

    #[test]
    fn test_recover_double_padding_concatenation() {
        // 28 + 21 = 49 bytes encodes with "==" padding.
        let envelope = sample(21);
        assert!(envelope.extract_payload().ends_with("=="));
        let raw = format!(
            "{}\n{}{}",
            MARKER,
            envelope.extract_payload(),
            sample(30).extract_payload()
        );
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_recover_single_padding_concatenation() {
        // 28 + 22 = 50 bytes encodes with a single "=".
        let envelope = sample(22);
        let payload = envelope.extract_payload();
        assert!(payload.ends_with('=') && !payload.ends_with("=="));
        let raw = format!("{}\n{}{}", MARKER, payload, sample(30).extract_payload());
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_recover_naive_duplicate() {
        let envelope = sample(21);
        let dup = format!("{}\n{}", MARKER, envelope.extract_payload().repeat(2));
        assert_eq!(Envelope::decode(&dup).unwrap(), envelope);
    }

    #[test]
    fn test_unpadded_duplicate_decodes_whole_and_offers_half() {
        let envelope = sample(20);
        assert!(!envelope.extract_payload().contains('='));
        let dup = format!("{}\n{}", MARKER, envelope.extract_payload().repeat(2));

        let decoded = Envelope::decode(&dup).unwrap();
        assert_eq!(decoded.extract_payload().len(), 2 * envelope.extract_payload().len());
        assert_eq!(decoded.repetition_half(), Some(envelope));
    }

    #[test]
    fn test_canonical_payload_with_equal_halves_is_not_halved() {
        let envelope = Envelope::encode(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], &[0u8; 32]);
        let decoded = Envelope::decode(&envelope.to_string()).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(decoded.parts().unwrap().ciphertext, vec![0u8; 32]);
    }

    #[test]
    fn test_repetition_half_needs_a_full_envelope() {
        assert_eq!(sample(21).repetition_half(), None);
        // Equal halves, but each half is below salt + nonce.
        let short = Envelope::encode(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], &[0u8; 20]);
        assert_eq!(short.repetition_half(), None);
    }

    #[test]
    fn test_recover_trailing_padding_run_in_long_payload() {
        // 28 + 54 = 82 bytes: 112 chars ending in "==".
        let envelope = sample(54);
        let payload = envelope.extract_payload();
        assert_eq!(payload.len(), 112);
        assert!(payload.ends_with("=="));

        let raw = format!("{}\n{}{}", MARKER, payload, "=".repeat(218));
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_short_padding_run_is_not_recovered() {
        let envelope = sample(54);
        let raw = format!("{}\n{}{}", MARKER, envelope.extract_payload(), "=".repeat(8));
        assert!(Envelope::decode(&raw).is_err());
    }

    #[test]
    fn test_recover_padded_block_followed_by_junk() {
        let envelope = sample(21);
        let raw = format!("{}\n{}QUJD", MARKER, envelope.extract_payload());
        assert_eq!(Envelope::decode(&raw).unwrap(), envelope);
    }

    #[test]
    fn test_is_envelope() {
        assert!(Envelope::is_envelope(&sample(16).to_string()));
        assert!(!Envelope::is_envelope("hello world"));
    }
}

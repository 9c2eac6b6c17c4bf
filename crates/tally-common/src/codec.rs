//! Serialization, gzip content-coding and HMAC-SHA256 integrity signing.
//!
//! Every function here is pure with respect to its inputs; the HTTP layers on
//! both sides decide when to apply them based on the negotiated headers.

use crate::error::CodecError;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::Sha256;
use std::io::{Read, Write};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the base64 HMAC-SHA256 of the uncompressed body.
pub const HASH_HEADER: &str = "HashSHA256";

/// Content-coding token for gzip.
pub const GZIP: &str = "gzip";

/// Serializes a metric (or a batch of metrics) to JSON bytes.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(value).map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

/// Parses JSON bytes, validating every record against its declared type.
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] on invalid JSON, an unknown
/// `type`, or a record whose payload field does not match its type.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(bytes).map_err(|e| CodecError::MalformedPayload(e.to_string()))
}

pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Decodes a gzip stream, including the trailing CRC and length check.
pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
    decompress_limited(bytes, usize::MAX)
}

/// Like [`decompress`], but stops inflating once the output passes `limit`
/// bytes and returns [`CodecError::TooLarge`].
pub fn decompress_limited(bytes: &[u8], limit: usize) -> Result<Vec<u8>, CodecError> {
    let mut decoder = GzDecoder::new(bytes).take((limit as u64).saturating_add(1));
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(CodecError::CorruptStream)?;
    if decompressed.len() > limit {
        return Err(CodecError::TooLarge { limit });
    }
    Ok(decompressed)
}

/// Returns `base64(HMAC-SHA256(bytes, key))`.
pub fn sign(bytes: &[u8], key: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(bytes);
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

/// Checks a base64 signature in constant time. Undecodable signatures never verify.
pub fn verify(bytes: &[u8], signature: &str, key: &[u8]) -> bool {
    let Ok(expected) = base64::engine::general_purpose::STANDARD.decode(signature.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(bytes);
    mac.verify_slice(&expected).is_ok()
}

/// Whether a `Content-Encoding` or `Accept-Encoding` header value lists gzip.
///
/// Quality parameters are ignored, so `gzip;q=0.5` still counts.
pub fn lists_gzip(header_value: &str) -> bool {
    header_value
        .split(',')
        .map(|token| token.split(';').next().unwrap_or_default().trim())
        .any(|token| token.eq_ignore_ascii_case(GZIP))
}

/// Whether a response with this content type may be compressed for the client.
pub fn is_compressible(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or_default().trim();
    mime.eq_ignore_ascii_case("application/json") || mime.eq_ignore_ascii_case("text/html")
}

/// Failures raised while decoding or verifying a delivery envelope.
///
/// All variants are client errors: the receiver rejects the request and the
/// sender must not retry the same bytes.
///
/// # Examples
///
/// ```rust
/// use tally_common::CodecError;
///
/// let err = CodecError::MalformedPayload("missing field `id`".to_string());
/// assert!(err.to_string().contains("missing field"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Invalid JSON, or a record whose payload field does not match its type.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The gzip stream could not be decoded (bad header, truncated body or CRC mismatch).
    #[error("corrupt gzip stream: {0}")]
    CorruptStream(#[source] std::io::Error),

    /// The decoded body exceeds the receiver's size limit.
    #[error("payload exceeds {limit} bytes")]
    TooLarge { limit: usize },

    /// The `HashSHA256` header did not match the payload.
    #[error("integrity signature mismatch")]
    IntegrityMismatch,
}

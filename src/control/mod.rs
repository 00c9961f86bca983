//! Control-channel protocol: command framing and file transfer over the
//! terminal stream.

pub mod framing;
pub mod show_file;

use thiserror::Error;

/// Failures while decoding control-channel payloads. These are always
/// warned and swallowed by the callers; a corrupt payload never takes the
/// session down.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("show-file metadata is truncated: need {needed} bytes, have {have}")]
    TruncatedMetadata { needed: usize, have: usize },

    #[error("show-file metadata size {size} splits a multi-byte character")]
    MisalignedMetadata { size: usize },

    #[error("show-file metadata is not valid JSON: {0}")]
    BadMetadata(#[from] serde_json::Error),

    #[error("show-file payload is not valid base64: {0}")]
    BadPayload(#[from] base64::DecodeError),
}

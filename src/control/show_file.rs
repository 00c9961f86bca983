//! Decoding of show-file control payloads.
//!
//! The payload is a JSON metadata header, whose byte length rides in the
//! start marker, followed immediately by the base64 encoded file body.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::control::ControlError;
use crate::core::frame_region::PreviewerKind;

/// Metadata header of a show-file payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub filename: String,
    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charset: Option<String>,
}

/// Split a show-file payload into its metadata and decoded file bytes.
pub fn decode_show_file(
    payload: &str,
    metadata_size: &str,
) -> Result<(FileMetadata, Vec<u8>), ControlError> {
    let needed: usize = metadata_size
        .trim()
        .parse()
        .unwrap_or(payload.len() + 1);
    if needed > payload.len() {
        return Err(ControlError::TruncatedMetadata {
            needed,
            have: payload.len(),
        });
    }

    // The size comes off the wire and may point into the middle of a
    // multi-byte character.
    let Some(header) = payload.get(..needed) else {
        return Err(ControlError::MisalignedMetadata { size: needed });
    };
    let metadata: FileMetadata = serde_json::from_str(header)?;

    // The emulator may have chunked the body across lines.
    let body: String = payload[needed..]
        .chars()
        .filter(|ch| !ch.is_ascii_whitespace())
        .collect();
    let bytes = BASE64.decode(body)?;
    Ok((metadata, bytes))
}

/// MIME type for the file, falling back to the filename extension when the
/// metadata does not carry one.
pub fn resolve_mime_type(metadata: &FileMetadata) -> Option<String> {
    if let Some(mime_type) = &metadata.mime_type {
        return Some(mime_type.clone());
    }
    detect_mime_type(&metadata.filename).map(str::to_string)
}

fn detect_mime_type(filename: &str) -> Option<&'static str> {
    let extension = filename.rsplit_once('.')?.1.to_ascii_lowercase();
    match extension.as_str() {
        "txt" | "log" | "md" | "sh" | "conf" => Some("text/plain"),
        "json" => Some("application/json"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        _ => None,
    }
}

/// Pick a previewer family for a MIME type. Unknown types get no preview.
pub fn previewer_for(mime_type: &str) -> Option<PreviewerKind> {
    if mime_type.starts_with("text/") || mime_type == "application/json" {
        Some(PreviewerKind::Text)
    } else if mime_type.starts_with("image/") {
        Some(PreviewerKind::Image)
    } else {
        debug!(mime_type, "no previewer for mime type");
        None
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use pretty_assertions::assert_eq;

    use super::{decode_show_file, previewer_for, resolve_mime_type, FileMetadata};
    use crate::core::frame_region::PreviewerKind;

    fn payload(metadata: &str, body: &[u8]) -> (String, String) {
        let payload = format!("{metadata}{}", BASE64.encode(body));
        (payload, metadata.len().to_string())
    }

    #[test]
    fn splits_metadata_from_file_body() {
        let metadata = r#"{"filename":"notes.txt","mimeType":"text/plain"}"#;
        let (payload, size) = payload(metadata, b"hello file");

        let (parsed, bytes) = decode_show_file(&payload, &size).expect("decode");
        assert_eq!(parsed.filename, "notes.txt");
        assert_eq!(parsed.mime_type.as_deref(), Some("text/plain"));
        assert_eq!(bytes, b"hello file");
    }

    #[test]
    fn tolerates_line_breaks_inside_the_body() {
        let metadata = r#"{"filename":"a.bin"}"#;
        let encoded = BASE64.encode(vec![0u8; 96]);
        let mut wrapped = String::new();
        for chunk in encoded.as_bytes().chunks(40) {
            wrapped.push_str(std::str::from_utf8(chunk).expect("ascii"));
            wrapped.push('\n');
        }
        let payload = format!("{metadata}{wrapped}");

        let (_parsed, bytes) =
            decode_show_file(&payload, &metadata.len().to_string()).expect("decode");
        assert_eq!(bytes, vec![0u8; 96]);
    }

    #[test]
    fn truncated_metadata_is_an_error() {
        assert!(decode_show_file("{\"f", "200").is_err());
        assert!(decode_show_file("{}", "garbage").is_err());
    }

    #[test]
    fn metadata_size_inside_a_character_is_an_error() {
        let metadata = r#"{"filename":"é.txt"}"#;
        let payload = format!("{metadata}AAAA");
        // Byte 14 lands inside the two-byte "é".
        assert!(decode_show_file(&payload, "14").is_err());
        assert!(decode_show_file(&payload, &metadata.len().to_string()).is_ok());
    }

    #[test]
    fn malformed_metadata_json_is_an_error() {
        let (payload, size) = payload("not json at all!", b"x");
        assert!(decode_show_file(&payload, &size).is_err());
    }

    #[test]
    fn mime_type_falls_back_to_the_extension() {
        let metadata = FileMetadata {
            filename: "shot.PNG".to_string(),
            mime_type: None,
            charset: None,
        };
        assert_eq!(resolve_mime_type(&metadata).as_deref(), Some("image/png"));

        let unknown = FileMetadata {
            filename: "blob.xyz".to_string(),
            mime_type: None,
            charset: None,
        };
        assert_eq!(resolve_mime_type(&unknown), None);
    }

    #[test]
    fn previewer_choice_by_mime_family() {
        assert_eq!(previewer_for("text/plain"), Some(PreviewerKind::Text));
        assert_eq!(previewer_for("application/json"), Some(PreviewerKind::Text));
        assert_eq!(previewer_for("image/png"), Some(PreviewerKind::Image));
        assert_eq!(previewer_for("application/octet-stream"), None);
    }
}

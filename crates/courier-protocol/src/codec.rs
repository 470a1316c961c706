//! Codec for encoding and decoding Courier frames.
//!
//! Frames are plain JSON text. Decoding implements the one protocol
//! quirk: an inbound object without a `type` field defaults to
//! `"message"`, so `{"message":"hi"}` and
//! `{"type":"message","message":"hi"}` are equivalent.

use serde_json::Value;
use thiserror::Error;

use crate::frames::{ClientFrame, ServerFrame};

/// Protocol errors that can occur during encoding/decoding.
///
/// A decode error means the single offending frame is dropped; the
/// connection it arrived on stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame is not valid JSON, has an unknown `type`, or is missing a
    /// required field.
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame parsed as JSON but is not an object.
    #[error("Frame is not a JSON object")]
    NotAnObject,
}

/// Decode an inbound text frame.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object or does not match
/// any known frame shape.
pub fn decode(text: &str) -> Result<ClientFrame, ProtocolError> {
    let mut value: Value = serde_json::from_str(text)?;

    let object = value.as_object_mut().ok_or(ProtocolError::NotAnObject)?;
    if !object.contains_key("type") {
        object.insert("type".to_string(), Value::from("message"));
    }

    Ok(serde_json::from_value(value)?)
}

/// Encode an outbound frame to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(frame: &ServerFrame) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(frame)?)
}

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use prost::Message;

use crate::error::Result;

/// MIME type of every datastore request body.
pub const CONTENT_TYPE: &str = "application/base64";

/// Encode a protobuf message into the datastore's base64 body format.
pub fn encode<M: Message>(message: &M) -> String {
    STANDARD.encode(message.encode_to_vec())
}

/// Decode a base64 body into a protobuf message.
///
/// Surrounding whitespace (trailing newlines from some servers) is ignored.
pub fn decode<M: Message + Default>(body: &[u8]) -> Result<M> {
    let trimmed = body.trim_ascii();
    let raw = STANDARD.decode(trimmed)?;
    Ok(M::decode(raw.as_slice())?)
}

//! Line codec: one JSON document per `\n`-terminated line.
//!
//! Encoding and decoding are symmetric: a decoded message re-encodes to a
//! line that decodes to an equal value. The returned lines never contain a
//! trailing newline; the transport adds it when writing.

use thiserror::Error;

use crate::{Request, Response};

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Blank lines carry no message and are skipped by the caller.
    #[error("empty line")]
    EmptyLine,

    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn decode_request(line: &str) -> Result<Request, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    Ok(serde_json::from_str(line)?)
}

pub fn encode_request(request: &Request) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(request)?)
}

pub fn decode_response(line: &str) -> Result<Response, ProtocolError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.trim().is_empty() {
        return Err(ProtocolError::EmptyLine);
    }
    Ok(serde_json::from_str(line)?)
}

pub fn encode_response(response: &Response) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(response)?)
}

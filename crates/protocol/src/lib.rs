//! Coachline Protocol
//!
//! Shared types for communication between the Coachline server and clients.
//! Messages are serialized as JSON, one document per line, over a plain TCP
//! stream. Server pushes (`SEATS_RESERVED`) travel on the same connection,
//! interleaved with ordinary replies.

pub mod client;
pub mod codec;
pub mod server;
pub mod types;

pub use client::Request;
pub use codec::{decode_request, decode_response, encode_request, encode_response, ProtocolError};
pub use server::Response;
pub use types::*;

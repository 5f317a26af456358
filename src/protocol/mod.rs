//! RESP protocol implementation
//!
//! Handles parsing and serialization of the RESP2 wire protocol.

pub mod resp;
pub mod parser;
pub mod serializer;

pub use resp::{RespFrame, Bytes};
pub use parser::{RespParser, FrameReader, parse_resp_frame};
pub use serializer::{serialize_resp_frame, serialize_to_vec, serialize_command, serialize_rdb_bulk};

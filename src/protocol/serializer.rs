//! RESP protocol serializer implementation
//!
//! Provides serialization of RESP frames to byte buffers for network
//! transmission, plus the special RDB bulk framing used during PSYNC.

use std::io::Write;
use crate::error::Result;
use super::resp::RespFrame;

/// Serialize a RESP frame to a writer
pub fn serialize_resp_frame<W: Write>(frame: &RespFrame, writer: &mut W) -> Result<()> {
    match frame {
        RespFrame::SimpleString(bytes) => {
            writer.write_all(b"+")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::Error(bytes) => {
            writer.write_all(b"-")?;
            writer.write_all(bytes)?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::Integer(n) => {
            writer.write_all(b":")?;
            writer.write_all(n.to_string().as_bytes())?;
            writer.write_all(b"\r\n")?;
        }

        RespFrame::BulkString(opt) => match opt {
            Some(bytes) => {
                writer.write_all(b"$")?;
                writer.write_all(bytes.len().to_string().as_bytes())?;
                writer.write_all(b"\r\n")?;
                writer.write_all(bytes)?;
                writer.write_all(b"\r\n")?;
            }
            None => {
                writer.write_all(b"$-1\r\n")?;
            }
        },

        RespFrame::Array(opt) => match opt {
            Some(frames) => {
                writer.write_all(b"*")?;
                writer.write_all(frames.len().to_string().as_bytes())?;
                writer.write_all(b"\r\n")?;
                for frame in frames {
                    serialize_resp_frame(frame, writer)?;
                }
            }
            None => {
                writer.write_all(b"*-1\r\n")?;
            }
        },
    }

    Ok(())
}

/// Serialize a RESP frame to a byte vector
pub fn serialize_to_vec(frame: &RespFrame) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    serialize_resp_frame(frame, &mut buf)?;
    Ok(buf)
}

/// Serialize a command (name + arguments) as an array of bulk strings.
///
/// This is the wire form both of client requests and of commands propagated
/// from a master to its replicas.
pub fn serialize_command(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    buf.push(b'*');
    buf.extend_from_slice(parts.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    for part in parts {
        buf.push(b'$');
        buf.extend_from_slice(part.len().to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(part);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Serialize the RDB bulk sent after a FULLRESYNC reply.
///
/// Unlike a regular bulk string this framing has NO trailing CRLF:
/// `$<n>\r\n` followed by exactly `n` payload bytes.
pub fn serialize_rdb_bulk(payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 16);
    buf.push(b'$');
    buf.extend_from_slice(payload.len().to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(payload);
    buf
}

//! Master-side synchronization: the PSYNC reply
//!
//! `PSYNC ? -1` is answered with `+FULLRESYNC <replid> <offset>` followed
//! immediately by the RDB bulk: `$<n>\r\n` and exactly `n` payload bytes
//! with NO trailing CRLF. The payload is a hard-coded empty snapshot, which
//! is all the bootstrap needs since the keyspace starts empty.

use std::sync::Arc;
use crate::error::Result;
use crate::network::connection::ConnectionWriter;
use crate::protocol::{serialize_rdb_bulk, RespFrame};
use super::ReplicationManager;

/// An empty RDB snapshot (REDIS0011 header, no keys, checksum)
const EMPTY_RDB_HEX: &str = "524544495330303131fa0972656469732d766572053\
72e322e30fa0a72656469732d62697473c040fa056374696d65c26d08bc65fa0875736564\
2d6d656dc2b0c41000fa08616f662d62617365c000fff06e3bfec0ff5aa2";

/// Decode the hard-coded empty snapshot payload
pub fn empty_rdb_payload() -> Vec<u8> {
    hex::decode(EMPTY_RDB_HEX).expect("embedded RDB constant is valid hex")
}

/// Answer PSYNC on a master: FULLRESYNC header plus the inline RDB bulk.
/// The caller then registers the connection as a replica link.
pub fn handle_psync(manager: &Arc<ReplicationManager>, writer: &Arc<ConnectionWriter>) -> Result<()> {
    let header = format!("FULLRESYNC {} {}", manager.repl_id(), manager.offset());
    println!("Replication: answering PSYNC with {}", header);

    writer.send_frame(&RespFrame::simple_string(header))?;
    writer.send_raw(&serialize_rdb_bulk(&empty_rdb_payload()))?;
    Ok(())
}

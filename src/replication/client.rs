//! Replication client - the replica's connection to its master
//!
//! Runs the four-step handshake (PING, REPLCONF listening-port, REPLCONF
//! capa, PSYNC), discards the snapshot, then applies the propagated command
//! stream against the local keyspace WITHOUT sending replies. The loop is a
//! distinct connection state, not a flag threaded through the handlers.

use std::io::Write;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use crate::error::{CuprousError, Result};
use crate::protocol::{serialize_command, FrameReader, RespFrame};
use crate::storage::commands::{self, ClientState, CommandRequest, ServerContext};
use crate::storage::StorageEngine;
use super::ReplicationManager;

/// Start background replication from the configured master.
///
/// Handshake failure at any step aborts replication with a logged error;
/// the server keeps serving client traffic either way.
pub fn start_replication(
    master_host: String,
    master_port: u16,
    listening_port: u16,
    storage: Arc<StorageEngine>,
    manager: Arc<ReplicationManager>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        println!(
            "Replication client: connecting to master at {}:{}",
            master_host, master_port
        );
        if let Err(e) = run(&master_host, master_port, listening_port, storage, manager) {
            eprintln!("Replication client: {}", e);
        }
    })
}

fn run(
    master_host: &str,
    master_port: u16,
    listening_port: u16,
    storage: Arc<StorageEngine>,
    manager: Arc<ReplicationManager>,
) -> Result<()> {
    let mut stream = TcpStream::connect((master_host, master_port)).map_err(|e| {
        CuprousError::Replication(format!(
            "failed to connect to master {}:{}: {}",
            master_host, master_port, e
        ))
    })?;
    stream.set_nodelay(true)?;
    let mut reader = FrameReader::new(stream.try_clone()?);

    // Step 1: PING -> +PONG
    send_command(&mut stream, &[b"PING"])?;
    expect_simple(&mut reader, "PONG", "PING")?;

    // Step 2: REPLCONF listening-port -> +OK
    let port = listening_port.to_string();
    send_command(&mut stream, &[b"REPLCONF", b"listening-port", port.as_bytes()])?;
    expect_simple(&mut reader, "OK", "REPLCONF listening-port")?;

    // Step 3: REPLCONF capa psync2 -> +OK
    send_command(&mut stream, &[b"REPLCONF", b"capa", b"psync2"])?;
    expect_simple(&mut reader, "OK", "REPLCONF capa")?;

    // Step 4: PSYNC ? -1 -> +FULLRESYNC <replid> <offset>, then the RDB bulk
    send_command(&mut stream, &[b"PSYNC", b"?", b"-1"])?;
    let (frame, _) = reader.read_frame()?;
    let repl_id = match &frame {
        RespFrame::SimpleString(data) => {
            let line = String::from_utf8_lossy(data).to_string();
            let mut words = line.split_whitespace();
            match (words.next(), words.next()) {
                (Some("FULLRESYNC"), Some(id)) => id.to_string(),
                _ => {
                    return Err(CuprousError::Replication(format!(
                        "expected FULLRESYNC, master said: {}",
                        line
                    )))
                }
            }
        }
        other => {
            return Err(CuprousError::Replication(format!(
                "unexpected PSYNC reply: {:?}",
                other
            )))
        }
    };
    manager.set_master_repl_id(repl_id);

    // The bootstrap snapshot is an empty database; nothing to load
    let rdb = reader.read_rdb_payload()?;
    println!(
        "Replication client: handshake complete, discarded {} byte snapshot",
        rdb.len()
    );

    propagation_loop(reader, storage, manager)
}

/// Apply the master's command stream. No replies are sent on this link; the
/// consumed-byte offset advances per frame.
fn propagation_loop(
    mut reader: FrameReader<TcpStream>,
    storage: Arc<StorageEngine>,
    manager: Arc<ReplicationManager>,
) -> Result<()> {
    let ctx = ServerContext {
        storage,
        replication: Arc::clone(&manager),
    };
    let mut client = ClientState::new(0);

    loop {
        let (frame, consumed) = match reader.read_frame_or_eof()? {
            Some(result) => result,
            None => {
                println!("Replication client: master closed the link");
                return Ok(());
            }
        };

        match CommandRequest::from_frame(frame) {
            Ok(req) => {
                // The reply is produced and dropped: a replica link never
                // answers propagated commands
                let _ = commands::execute(&ctx, &mut client, &req);
            }
            Err(e) => {
                eprintln!("Replication client: skipping unreadable frame: {}", e);
            }
        }
        manager.add_offset(consumed as u64);
    }
}

fn send_command(stream: &mut TcpStream, parts: &[&[u8]]) -> Result<()> {
    let parts: Vec<Vec<u8>> = parts.iter().map(|p| p.to_vec()).collect();
    stream.write_all(&serialize_command(&parts))?;
    Ok(())
}

fn expect_simple(
    reader: &mut FrameReader<TcpStream>,
    expected: &str,
    step: &str,
) -> Result<()> {
    let (frame, _) = reader.read_frame()?;
    match &frame {
        RespFrame::SimpleString(data) if data.as_slice() == expected.as_bytes() => Ok(()),
        other => Err(CuprousError::Replication(format!(
            "handshake step {} failed, master said: {:?}",
            step, other
        ))),
    }
}

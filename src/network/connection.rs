//! Connection management for individual clients
//!
//! A connection owns the read side of the socket plus an incremental RESP
//! parser. The write side lives behind a mutex in a shared handle so
//! replies, replication fan-out and blocking wakeups serialise their output
//! bytes.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use crate::error::{CuprousError, Result};
use crate::protocol::{serialize_to_vec, RespFrame, RespParser};
use crate::storage::waiters::PeerMonitor;

/// Shared, serialised write half of a client connection
pub struct ConnectionWriter {
    stream: Mutex<TcpStream>,
}

impl ConnectionWriter {
    fn new(stream: TcpStream) -> Self {
        ConnectionWriter {
            stream: Mutex::new(stream),
        }
    }

    /// Serialize and send one frame
    pub fn send_frame(&self, frame: &RespFrame) -> Result<()> {
        let buf = serialize_to_vec(frame)?;
        self.send_raw(&buf)
    }

    /// Send raw bytes
    pub fn send_raw(&self, data: &[u8]) -> Result<()> {
        let mut stream = self.stream.lock().unwrap();
        stream.write_all(data)?;
        Ok(())
    }

    /// Tear down both directions of the socket
    pub fn shutdown(&self) {
        let stream = self.stream.lock().unwrap();
        let _ = stream.shutdown(Shutdown::Both);
    }
}

/// Watches for peer disconnection while the connection's own thread is
/// parked inside a blocking command.
///
/// The probe briefly flips the socket non-blocking for a one-byte peek:
/// EOF means the peer is gone, pending bytes or WouldBlock mean it is
/// alive. That is safe here because the probing thread is the connection's
/// only reader and it only probes while parked, so no concurrent read or
/// reply write can observe the mode change.
pub struct SocketMonitor {
    stream: TcpStream,
}

impl PeerMonitor for SocketMonitor {
    fn is_closed(&self) -> bool {
        if self.stream.set_nonblocking(true).is_err() {
            return true;
        }
        let mut probe = [0u8; 1];
        let closed = match self.stream.peek(&mut probe) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) if e.kind() == ErrorKind::WouldBlock => false,
            Err(_) => true,
        };
        let _ = self.stream.set_nonblocking(false);
        closed
    }
}

/// Represents a client connection
pub struct Connection {
    /// Unique connection ID
    pub id: u64,

    /// Client address
    pub addr: SocketAddr,

    /// Read half
    stream: TcpStream,

    /// RESP protocol parser
    parser: RespParser,

    /// Shared write half
    writer: Arc<ConnectionWriter>,

    /// Disconnect probe handed to blocking handlers
    monitor: Arc<SocketMonitor>,
}

impl Connection {
    /// Create a new connection
    pub fn new(id: u64, stream: TcpStream, addr: SocketAddr) -> Result<Self> {
        stream.set_nodelay(true)?;
        let write_half = stream.try_clone()?;
        let monitor_half = stream.try_clone()?;

        Ok(Connection {
            id,
            addr,
            stream,
            parser: RespParser::new(),
            writer: Arc::new(ConnectionWriter::new(write_half)),
            monitor: Arc::new(SocketMonitor { stream: monitor_half }),
        })
    }

    /// Handle to the serialised write half
    pub fn writer(&self) -> Arc<ConnectionWriter> {
        Arc::clone(&self.writer)
    }

    /// Handle to the disconnect probe
    pub fn monitor(&self) -> Arc<SocketMonitor> {
        Arc::clone(&self.monitor)
    }

    /// Read one complete request frame, blocking as needed.
    ///
    /// Ok(None) means the peer closed cleanly between frames; EOF inside a
    /// frame is an error, as are malformed frames.
    pub fn read_request(&mut self) -> Result<Option<RespFrame>> {
        loop {
            if let Some(frame) = self.parser.parse()? {
                return Ok(Some(frame));
            }

            let mut buf = [0u8; 4096];
            let n = self.stream.read(&mut buf)?;
            if n == 0 {
                if self.parser.has_partial_frame() {
                    return Err(CuprousError::UnexpectedEof);
                }
                return Ok(None);
            }
            self.parser.feed(&buf[..n]);
        }
    }
}

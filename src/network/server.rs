//! Main server implementation
//!
//! One accept loop; each accepted connection is serviced by its own thread.
//! A connection thread reads one request frame at a time, routes it through
//! the command dispatcher, and writes the reply through the connection's
//! serialised writer. PSYNC is intercepted here because its reply spans a
//! simple string plus a raw RDB bulk and flips the connection into a
//! replica link.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use crate::config::Config;
use crate::error::Result;
use crate::replication::{self, ReplicaHandle, ReplicationManager};
use crate::storage::commands::{self, ClientState, CommandRequest, ServerContext};
use crate::storage::StorageEngine;
use super::connection::Connection;
use super::Listener;

/// Connection ID generator
static CONN_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Main server struct
pub struct Server {
    listener: Listener,
    ctx: Arc<ServerContext>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Bind the listener and wire up storage and replication from config
    pub fn from_config(config: &Config) -> Result<Self> {
        let listener = Listener::bind(&config.network)?;
        let storage = StorageEngine::new();

        let replication = match &config.replicaof {
            Some((host, port)) => {
                println!("Configured as replica of {} {}", host, port);
                let manager = ReplicationManager::new_replica(host.clone(), *port);
                replication::start_replication(
                    host.clone(),
                    *port,
                    config.network.port,
                    Arc::clone(&storage),
                    Arc::clone(&manager),
                );
                manager
            }
            None => ReplicationManager::new_master(),
        };

        Ok(Server {
            listener,
            ctx: Arc::new(ServerContext {
                storage,
                replication,
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The address the server is actually listening on
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// Flag observed by the accept loop; setting it stops the server
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Accept connections until shutdown. Each connection gets a thread.
    pub fn run(&self) -> Result<()> {
        loop {
            let (stream, addr) = self.listener.accept()?;
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }

            let id = CONN_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
            let connection = match Connection::new(id, stream, addr) {
                Ok(conn) => conn,
                Err(e) => {
                    eprintln!("Failed to set up connection from {}: {}", addr, e);
                    continue;
                }
            };

            let ctx = Arc::clone(&self.ctx);
            thread::spawn(move || {
                handle_connection(ctx, connection);
            });
        }
    }
}

/// Service one client for the lifetime of its connection
fn handle_connection(ctx: Arc<ServerContext>, mut conn: Connection) {
    // The socket monitor lets blocking handlers drop their wait slot as
    // soon as this client disconnects
    let mut client = ClientState::with_monitor(conn.id, conn.monitor());
    let writer = conn.writer();

    loop {
        let frame = match conn.read_request() {
            Ok(Some(frame)) => frame,
            Ok(None) => break, // clean disconnect
            Err(e) => {
                // Codec errors terminate the connection
                eprintln!("Connection {} ({}): {}", conn.id, conn.addr, e);
                break;
            }
        };

        let req = match CommandRequest::from_frame(frame) {
            Ok(req) => req,
            Err(e) => {
                eprintln!("Connection {} ({}): {}", conn.id, conn.addr, e);
                break;
            }
        };

        // PSYNC replies with FULLRESYNC plus a raw RDB bulk and turns this
        // connection into a replica link
        if req.name == "PSYNC" && ctx.replication.is_master() {
            match replication::sync::handle_psync(&ctx.replication, &writer) {
                Ok(()) => {
                    client.is_replica_link = true;
                    ctx.replication.add_replica(ReplicaHandle {
                        conn_id: conn.id,
                        addr: conn.addr,
                        writer: conn.writer(),
                    });
                    continue;
                }
                Err(e) => {
                    eprintln!("Connection {} ({}): PSYNC failed: {}", conn.id, conn.addr, e);
                    break;
                }
            }
        }

        let reply = commands::dispatch(&ctx, &mut client, &req);

        // After PSYNC the link only carries replication traffic outbound;
        // late client-style commands (REPLCONF ACK and the like) get no
        // reply
        if client.is_replica_link {
            continue;
        }

        if let Err(e) = writer.send_frame(&reply) {
            eprintln!("Connection {} ({}): write failed: {}", conn.id, conn.addr, e);
            break;
        }
    }

    if client.is_replica_link {
        ctx.replication.remove_replica(conn.id);
    }
}

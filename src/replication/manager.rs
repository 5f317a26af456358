//! Replication manager - role state, replica registry and fan-out

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use crate::network::connection::ConnectionWriter;
use crate::protocol::serialize_command;
use super::generate_repl_id;

/// The role of the server in replication, fixed at startup
#[derive(Debug, Clone)]
pub enum ReplicationRole {
    /// This server is a master
    Master {
        /// 40-character alphanumeric replication ID
        repl_id: String,
    },

    /// This server replicates from a master
    Replica {
        master_host: String,
        master_port: u16,
    },
}

/// A replica link attached to a master after PSYNC
pub struct ReplicaHandle {
    /// Connection ID of the replica link
    pub conn_id: u64,

    /// Address of the replica
    pub addr: SocketAddr,

    /// Serialised write half of the link
    pub writer: Arc<ConnectionWriter>,
}

/// Coordinates all replication activity for one server process
pub struct ReplicationManager {
    role: ReplicationRole,

    /// Master: bytes of replication stream produced.
    /// Replica: bytes of replication stream consumed.
    repl_offset: AtomicU64,

    /// Replica side: the master's replication ID learned from FULLRESYNC
    master_repl_id: Mutex<String>,

    /// Attached replica links (master side)
    replicas: Mutex<Vec<ReplicaHandle>>,

    /// Held across apply + fan-out so the replica stream preserves the
    /// master's commit order
    propagation: Mutex<()>,
}

impl ReplicationManager {
    /// Create a manager for a master server
    pub fn new_master() -> Arc<Self> {
        Arc::new(ReplicationManager {
            role: ReplicationRole::Master {
                repl_id: generate_repl_id(),
            },
            repl_offset: AtomicU64::new(0),
            master_repl_id: Mutex::new(String::new()),
            replicas: Mutex::new(Vec::new()),
            propagation: Mutex::new(()),
        })
    }

    /// Create a manager for a replica of the given master
    pub fn new_replica(master_host: String, master_port: u16) -> Arc<Self> {
        Arc::new(ReplicationManager {
            role: ReplicationRole::Replica {
                master_host,
                master_port,
            },
            repl_offset: AtomicU64::new(0),
            master_repl_id: Mutex::new(String::new()),
            replicas: Mutex::new(Vec::new()),
            propagation: Mutex::new(()),
        })
    }

    pub fn role(&self) -> &ReplicationRole {
        &self.role
    }

    pub fn is_master(&self) -> bool {
        matches!(self.role, ReplicationRole::Master { .. })
    }

    /// The replication ID this server advertises
    pub fn repl_id(&self) -> String {
        match &self.role {
            ReplicationRole::Master { repl_id } => repl_id.clone(),
            ReplicationRole::Replica { .. } => self.master_repl_id.lock().unwrap().clone(),
        }
    }

    /// Replica side: record the master's replication ID from FULLRESYNC
    pub fn set_master_repl_id(&self, id: String) {
        *self.master_repl_id.lock().unwrap() = id;
    }

    pub fn offset(&self) -> u64 {
        self.repl_offset.load(Ordering::SeqCst)
    }

    /// Replica side: account consumed replication stream bytes
    pub fn add_offset(&self, bytes: u64) {
        self.repl_offset.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Serialises apply + fan-out of one write command
    pub fn propagation_barrier(&self) -> MutexGuard<'_, ()> {
        self.propagation.lock().unwrap()
    }

    /// Attach a replica link after a completed PSYNC
    pub fn add_replica(&self, handle: ReplicaHandle) {
        println!(
            "Replication: replica attached from {} (conn {})",
            handle.addr, handle.conn_id
        );
        self.replicas.lock().unwrap().push(handle);
    }

    /// Detach a replica link (connection closed)
    pub fn remove_replica(&self, conn_id: u64) -> bool {
        let mut replicas = self.replicas.lock().unwrap();
        let before = replicas.len();
        replicas.retain(|r| r.conn_id != conn_id);
        before != replicas.len()
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.lock().unwrap().len()
    }

    /// Fan a successfully applied write command out to every replica link,
    /// FIFO per link. Links whose socket fails are dropped. The offset
    /// advances by the exact bytes of stream produced.
    pub fn propagate(&self, parts: &[Vec<u8>]) {
        if !self.is_master() {
            return;
        }
        let buf = serialize_command(parts);

        let mut replicas = self.replicas.lock().unwrap();
        replicas.retain(|replica| match replica.writer.send_raw(&buf) {
            Ok(()) => true,
            Err(e) => {
                eprintln!(
                    "Replication: dropping replica {} (conn {}): {}",
                    replica.addr, replica.conn_id, e
                );
                false
            }
        });

        self.repl_offset.fetch_add(buf.len() as u64, Ordering::SeqCst);
    }

    /// The INFO replication section, newline-separated `field:value` lines
    pub fn info_string(&self) -> String {
        match &self.role {
            ReplicationRole::Master { repl_id } => format!(
                "role:master\nconnected_slaves:{}\nmaster_replid:{}\nmaster_repl_offset:{}\nsecond_repl_offset:0\nrepl_backlog_active:0\nrepl_backlog_size:0\nrepl_backlog_first_byte_offset:0\nrepl_backlog_histlen:0",
                self.replica_count(),
                repl_id,
                self.offset(),
            ),
            ReplicationRole::Replica {
                master_host,
                master_port,
            } => format!(
                "role:slave\nmaster_host:{}\nmaster_port:{}\nmaster_replid:{}\nmaster_repl_offset:{}\nslave_repl_offset:{}",
                master_host,
                master_port,
                self.master_repl_id.lock().unwrap(),
                self.offset(),
                self.offset(),
            ),
        }
    }
}

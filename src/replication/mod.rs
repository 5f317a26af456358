//! Replication module for Cuprous
//!
//! Implements the single-master / many-replica topology:
//! - master side: PSYNC handling (FULLRESYNC + inline RDB bulk) and
//!   fan-out of applied write commands to replica links;
//! - replica side: the four-step handshake and the propagation loop that
//!   applies the master's stream without replying.

mod manager;
pub mod sync;
pub mod client;

pub use manager::{ReplicaHandle, ReplicationManager, ReplicationRole};
pub use client::start_replication;

/// Generate a 40-character alphanumeric replication ID
pub fn generate_repl_id() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    let bytes: Vec<u8> = (0..40)
        .map(|_| {
            let n: u8 = rng.gen_range(0..62);
            match n {
                0..=9 => b'0' + n,
                10..=35 => b'a' + n - 10,
                36..=61 => b'A' + n - 36,
                _ => unreachable!(),
            }
        })
        .collect();

    String::from_utf8(bytes).unwrap()
}

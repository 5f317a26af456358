//! Command routing and execution
//!
//! Requests arrive as RESP arrays of bulk strings. The dispatcher applies
//! transaction admission, then routes by name to the handler. Successfully
//! applied write commands are re-serialised and fanned out to any attached
//! replicas while the propagation barrier is held, preserving commit order.

use std::sync::Arc;
use crate::error::{CommandError, CuprousError};
use crate::protocol::RespFrame;
use crate::replication::ReplicationManager;
use crate::storage::waiters::{NoPeer, PeerMonitor};
use crate::storage::StorageEngine;
use super::{lists, server_info, streams, strings, transactions};
use super::transactions::TransactionState;

/// A decoded client request: uppercased command name plus raw arguments
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<Vec<u8>>,
}

impl CommandRequest {
    /// Decode a request from a RESP array of bulk strings
    pub fn from_frame(frame: RespFrame) -> Result<Self, CuprousError> {
        let parts = match frame {
            RespFrame::Array(Some(parts)) if !parts.is_empty() => parts,
            _ => {
                return Err(CuprousError::Protocol(
                    "Request must be a non-empty array".into(),
                ))
            }
        };

        let mut items = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                RespFrame::BulkString(Some(bytes)) => items.push(bytes.as_ref().clone()),
                _ => {
                    return Err(CuprousError::Protocol(
                        "Request elements must be bulk strings".into(),
                    ))
                }
            }
        }

        let name = String::from_utf8_lossy(&items[0]).to_uppercase();
        let args = items.split_off(1);
        Ok(CommandRequest { name, args })
    }

    /// Wire parts: command name followed by the arguments
    pub fn wire_parts(&self) -> Vec<Vec<u8>> {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.name.as_bytes().to_vec());
        parts.extend(self.args.iter().cloned());
        parts
    }
}

/// Shared handles every handler needs
pub struct ServerContext {
    pub storage: Arc<StorageEngine>,
    pub replication: Arc<ReplicationManager>,
}

/// Per-connection command state
pub struct ClientState {
    pub id: u64,
    pub tx: TransactionState,
    /// Set once the peer completes PSYNC and becomes a replica link
    pub is_replica_link: bool,
    /// Lets blocking handlers notice when this client disconnects
    pub monitor: Arc<dyn PeerMonitor>,
}

impl ClientState {
    pub fn new(id: u64) -> Self {
        Self::with_monitor(id, Arc::new(NoPeer))
    }

    pub fn with_monitor(id: u64, monitor: Arc<dyn PeerMonitor>) -> Self {
        ClientState {
            id,
            tx: TransactionState::new(),
            is_replica_link: false,
            monitor,
        }
    }
}

/// Commands whose successful application is propagated to replicas
fn is_write_command(name: &str) -> bool {
    matches!(name, "SET" | "RPUSH" | "LPUSH" | "LPOP" | "XADD" | "INCR" | "DEL")
}

/// Top-level dispatch: transaction admission first, then execution
pub fn dispatch(ctx: &ServerContext, client: &mut ClientState, req: &CommandRequest) -> RespFrame {
    if client.tx.in_transaction && !transactions::is_transaction_command(&req.name) {
        if transactions::is_blocked_in_transaction(req) {
            return RespFrame::error(CommandError::NotAllowedInTransaction.to_string());
        }
        client.tx.queued.push(req.clone());
        return RespFrame::simple_string("QUEUED");
    }
    execute(ctx, client, req)
}

/// Execute a command. Write commands run under the propagation barrier so
/// the replica stream preserves the master's commit order.
pub fn execute(ctx: &ServerContext, client: &mut ClientState, req: &CommandRequest) -> RespFrame {
    if is_write_command(&req.name) && ctx.replication.is_master() {
        let _barrier = ctx.replication.propagation_barrier();
        let reply = run_handler(ctx, client, req);
        if !reply.is_error() {
            ctx.replication.propagate(&req.wire_parts());
        }
        reply
    } else {
        run_handler(ctx, client, req)
    }
}

fn run_handler(ctx: &ServerContext, client: &mut ClientState, req: &CommandRequest) -> RespFrame {
    match req.name.as_str() {
        "PING" => server_info::handle_ping(req),
        "ECHO" => server_info::handle_echo(req),
        "INFO" => server_info::handle_info(ctx, req),

        "SET" => strings::handle_set(ctx, req),
        "GET" => strings::handle_get(ctx, req),
        "INCR" => strings::handle_incr(ctx, req),
        "DEL" => strings::handle_del(ctx, req),
        "TYPE" => strings::handle_type(ctx, req),

        "RPUSH" => lists::handle_rpush(ctx, req),
        "LPUSH" => lists::handle_lpush(ctx, req),
        "LPOP" => lists::handle_lpop(ctx, req),
        "LLEN" => lists::handle_llen(ctx, req),
        "LRANGE" => lists::handle_lrange(ctx, req),
        "BLPOP" => lists::handle_blpop(ctx, client.monitor.as_ref(), req),

        "XADD" => streams::handle_xadd(ctx, req),
        "XRANGE" => streams::handle_xrange(ctx, req),
        "XREAD" => streams::handle_xread(ctx, client.monitor.as_ref(), req),

        "MULTI" => transactions::handle_multi(client, req),
        "EXEC" => transactions::handle_exec(ctx, client, req),
        "DISCARD" => transactions::handle_discard(client, req),

        // The replica handshake: each REPLCONF step is acknowledged; PSYNC
        // itself is intercepted by the connection loop because its reply
        // spans raw frames
        "REPLCONF" => RespFrame::ok(),
        "PSYNC" => RespFrame::error("ERR PSYNC is only valid as a top-level command"),

        _ => RespFrame::error(CommandError::UnknownCommand(req.name.clone()).to_string()),
    }
}

/// Map an engine error onto its RESP error frame
pub fn error_reply(err: CuprousError) -> RespFrame {
    match err {
        CuprousError::Command(e) => RespFrame::error(e.to_string()),
        CuprousError::Storage(e) => RespFrame::error(e.to_string()),
        other => RespFrame::error(format!("ERR {}", other)),
    }
}

/// Decode an argument that must be valid UTF-8 (IDs, numbers, options)
pub fn arg_str(arg: &[u8]) -> Result<&str, CuprousError> {
    std::str::from_utf8(arg).map_err(|_| CommandError::SyntaxError.into())
}

/// Parse a signed decimal argument
pub fn arg_i64(arg: &[u8]) -> Result<i64, CuprousError> {
    arg_str(arg)?
        .parse::<i64>()
        .map_err(|_| CommandError::NotInteger.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RespFrame as F;

    fn request(parts: &[&str]) -> RespFrame {
        F::Array(Some(parts.iter().map(|p| F::bulk_string(p)).collect()))
    }

    fn test_ctx() -> ServerContext {
        ServerContext {
            storage: StorageEngine::new(),
            replication: ReplicationManager::new_master(),
        }
    }

    #[test]
    fn test_request_decoding() {
        let req = CommandRequest::from_frame(request(&["set", "foo", "bar"])).unwrap();
        assert_eq!(req.name, "SET");
        assert_eq!(req.args, vec![b"foo".to_vec(), b"bar".to_vec()]);
    }

    #[test]
    fn test_request_rejects_non_arrays() {
        assert!(CommandRequest::from_frame(F::bulk_string("PING")).is_err());
        assert!(CommandRequest::from_frame(F::Array(Some(vec![]))).is_err());
        assert!(CommandRequest::from_frame(F::Array(Some(vec![F::Integer(1)]))).is_err());
    }

    #[test]
    fn test_unknown_command() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);
        let req = CommandRequest::from_frame(request(&["FROB"])).unwrap();
        let reply = dispatch(&ctx, &mut client, &req);
        assert_eq!(reply, F::error("ERR unknown command 'FROB'"));
    }

    #[test]
    fn test_dispatch_set_get() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);

        let set = CommandRequest::from_frame(request(&["SET", "k", "v"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &set), F::ok());

        let get = CommandRequest::from_frame(request(&["GET", "k"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &get), F::bulk_string("v"));
    }

    #[test]
    fn test_transaction_queue_and_exec() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);

        let multi = CommandRequest::from_frame(request(&["MULTI"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &multi), F::ok());

        let set = CommandRequest::from_frame(request(&["SET", "a", "1"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &set), F::simple_string("QUEUED"));

        let incr = CommandRequest::from_frame(request(&["INCR", "a"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &incr), F::simple_string("QUEUED"));

        // Nothing applied yet
        assert_eq!(ctx.storage.get_string(b"a").unwrap(), None);

        let exec = CommandRequest::from_frame(request(&["EXEC"])).unwrap();
        let reply = dispatch(&ctx, &mut client, &exec);
        assert_eq!(reply, F::array(vec![F::ok(), F::Integer(2)]));
        assert_eq!(ctx.storage.get_string(b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn test_transaction_rejects_blocking_commands() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);

        dispatch(&ctx, &mut client, &CommandRequest::from_frame(request(&["MULTI"])).unwrap());
        let blpop = CommandRequest::from_frame(request(&["BLPOP", "q", "0"])).unwrap();
        let reply = dispatch(&ctx, &mut client, &blpop);
        assert_eq!(reply, F::error("ERR command not allowed in transaction"));

        // The transaction stays open and the rejected command is not queued
        assert!(client.tx.in_transaction);
        assert!(client.tx.queued.is_empty());

        let exec = CommandRequest::from_frame(request(&["EXEC"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &exec), F::array(vec![]));
    }

    #[test]
    fn test_exec_without_multi() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);
        let exec = CommandRequest::from_frame(request(&["EXEC"])).unwrap();
        assert_eq!(dispatch(&ctx, &mut client, &exec), F::error("ERR EXEC without MULTI"));

        let discard = CommandRequest::from_frame(request(&["DISCARD"])).unwrap();
        assert_eq!(
            dispatch(&ctx, &mut client, &discard),
            F::error("ERR DISCARD without MULTI")
        );
    }

    #[test]
    fn test_nested_multi() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);
        let multi = CommandRequest::from_frame(request(&["MULTI"])).unwrap();
        dispatch(&ctx, &mut client, &multi);
        assert_eq!(
            dispatch(&ctx, &mut client, &multi),
            F::error("ERR MULTI calls can not be nested")
        );
    }

    #[test]
    fn test_exec_reports_per_command_errors() {
        let ctx = test_ctx();
        let mut client = ClientState::new(1);

        dispatch(&ctx, &mut client, &CommandRequest::from_frame(request(&["MULTI"])).unwrap());
        dispatch(
            &ctx,
            &mut client,
            &CommandRequest::from_frame(request(&["SET", "s", "abc"])).unwrap(),
        );
        dispatch(&ctx, &mut client, &CommandRequest::from_frame(request(&["INCR", "s"])).unwrap());
        dispatch(&ctx, &mut client, &CommandRequest::from_frame(request(&["GET", "s"])).unwrap());

        let reply = dispatch(
            &ctx,
            &mut client,
            &CommandRequest::from_frame(request(&["EXEC"])).unwrap(),
        );
        assert_eq!(
            reply,
            F::array(vec![
                F::ok(),
                F::error("ERR value is not an integer or out of range"),
                F::bulk_string("abc"),
            ])
        );
    }
}

//! PING, ECHO and INFO

use crate::error::CommandError;
use crate::protocol::RespFrame;
use super::executor::{arg_str, CommandRequest, ServerContext};

/// Handle PING [message]
pub fn handle_ping(req: &CommandRequest) -> RespFrame {
    match req.args.len() {
        0 => RespFrame::simple_string("PONG"),
        1 => RespFrame::from_bytes(req.args[0].clone()),
        _ => RespFrame::error(CommandError::WrongNumberOfArgs("ping".into()).to_string()),
    }
}

/// Handle ECHO message
pub fn handle_echo(req: &CommandRequest) -> RespFrame {
    if req.args.len() != 1 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("echo".into()).to_string());
    }
    RespFrame::from_bytes(req.args[0].clone())
}

/// Handle INFO [section]
///
/// The reply is a single bulk string of newline-separated `field:value`
/// lines. Only the replication section exists; asking for any other named
/// section yields an empty reply.
pub fn handle_info(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    match req.args.len() {
        0 => RespFrame::from_string(ctx.replication.info_string()),
        1 => match arg_str(&req.args[0]) {
            Ok(section) if section.eq_ignore_ascii_case("replication") => {
                RespFrame::from_string(ctx.replication.info_string())
            }
            Ok(_) => RespFrame::from_string(String::new()),
            Err(_) => RespFrame::from_string(String::new()),
        },
        _ => RespFrame::error(CommandError::WrongNumberOfArgs("info".into()).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::ReplicationManager;
    use crate::storage::StorageEngine;

    fn ctx() -> ServerContext {
        ServerContext {
            storage: StorageEngine::new(),
            replication: ReplicationManager::new_master(),
        }
    }

    fn req(name: &str, args: &[&str]) -> CommandRequest {
        CommandRequest {
            name: name.to_string(),
            args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
        }
    }

    #[test]
    fn test_ping() {
        assert_eq!(handle_ping(&req("PING", &[])), RespFrame::simple_string("PONG"));
        assert_eq!(
            handle_ping(&req("PING", &["hello"])),
            RespFrame::bulk_string("hello")
        );
    }

    #[test]
    fn test_echo() {
        assert_eq!(
            handle_echo(&req("ECHO", &["hey"])),
            RespFrame::bulk_string("hey")
        );
        assert!(handle_echo(&req("ECHO", &[])).is_error());
    }

    #[test]
    fn test_info_master_fields() {
        let ctx = ctx();
        let reply = handle_info(&ctx, &req("INFO", &["replication"]));
        let text = match reply {
            RespFrame::BulkString(Some(bytes)) => String::from_utf8(bytes.to_vec()).unwrap(),
            other => panic!("expected bulk string, got {:?}", other),
        };
        assert!(text.contains("role:master"));
        assert!(text.contains("connected_slaves:0"));
        assert!(text.contains("master_replid:"));
        assert!(text.contains("master_repl_offset:0"));
        assert!(text.contains("repl_backlog_histlen:0"));
    }
}

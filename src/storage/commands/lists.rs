//! List command implementations
//!
//! Push, pop, range and length over the quicklist engine, plus the
//! blocking BLPOP.

use std::time::Duration;
use crate::error::CommandError;
use crate::protocol::RespFrame;
use crate::storage::waiters::PeerMonitor;
use super::executor::{arg_i64, arg_str, error_reply, CommandRequest, ServerContext};

/// Handle RPUSH key value [value ...]
pub fn handle_rpush(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() < 2 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("rpush".into()).to_string());
    }
    match ctx
        .storage
        .rpush(req.args[0].clone(), req.args[1..].to_vec())
    {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(e) => error_reply(e),
    }
}

/// Handle LPUSH key value [value ...]
pub fn handle_lpush(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() < 2 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("lpush".into()).to_string());
    }
    match ctx
        .storage
        .lpush(req.args[0].clone(), req.args[1..].to_vec())
    {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(e) => error_reply(e),
    }
}

/// Handle LPOP key [count]
///
/// Without a count the reply is a bulk string; with a count it is an array,
/// even when only one element comes back.
pub fn handle_lpop(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    let (count, has_count) = match req.args.len() {
        1 => (1, false),
        2 => match arg_i64(&req.args[1]) {
            Ok(n) if n >= 0 => (n as usize, true),
            Ok(_) => return RespFrame::error(CommandError::NotInteger.to_string()),
            Err(e) => return error_reply(e),
        },
        _ => {
            return RespFrame::error(CommandError::WrongNumberOfArgs("lpop".into()).to_string());
        }
    };

    match ctx.storage.lpop(&req.args[0], count) {
        Ok(values) if values.is_empty() => RespFrame::null_bulk(),
        Ok(mut values) => {
            if has_count {
                RespFrame::Array(Some(
                    values.into_iter().map(RespFrame::from_bytes).collect(),
                ))
            } else {
                RespFrame::from_bytes(values.remove(0))
            }
        }
        Err(e) => error_reply(e),
    }
}

/// Handle LLEN key
pub fn handle_llen(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 1 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("llen".into()).to_string());
    }
    match ctx.storage.llen(&req.args[0]) {
        Ok(len) => RespFrame::Integer(len as i64),
        Err(e) => error_reply(e),
    }
}

/// Handle LRANGE key start end
pub fn handle_lrange(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 3 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("lrange".into()).to_string());
    }
    let start = match arg_i64(&req.args[1]) {
        Ok(n) => n,
        Err(e) => return error_reply(e),
    };
    let end = match arg_i64(&req.args[2]) {
        Ok(n) => n,
        Err(e) => return error_reply(e),
    };

    match ctx.storage.lrange(&req.args[0], start, end) {
        Ok(values) => RespFrame::Array(Some(
            values.into_iter().map(RespFrame::from_bytes).collect(),
        )),
        Err(e) => error_reply(e),
    }
}

/// Handle BLPOP key timeout
///
/// The timeout is decimal seconds; fractions are accepted and 0 means wait
/// forever. On success the reply pairs the key with the popped value; on
/// timeout (or when the waiting client disconnects) it is a null bulk.
pub fn handle_blpop(
    ctx: &ServerContext,
    monitor: &dyn PeerMonitor,
    req: &CommandRequest,
) -> RespFrame {
    if req.args.len() != 2 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("blpop".into()).to_string());
    }

    let timeout = match arg_str(&req.args[1]).ok().and_then(|s| s.parse::<f64>().ok()) {
        Some(secs) if secs >= 0.0 && secs.is_finite() => {
            if secs == 0.0 {
                None
            } else {
                Some(Duration::from_secs_f64(secs))
            }
        }
        _ => return RespFrame::error(CommandError::NotInteger.to_string()),
    };

    match ctx.storage.blpop(&req.args[0], timeout, monitor) {
        Ok(Some(value)) => RespFrame::Array(Some(vec![
            RespFrame::from_bytes(req.args[0].clone()),
            RespFrame::from_bytes(value),
        ])),
        Ok(None) => RespFrame::null_bulk(),
        Err(e) => error_reply(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::replication::ReplicationManager;
    use crate::storage::waiters::NoPeer;
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

    fn bulk_array(items: &[&str]) -> RespFrame {
        RespFrame::Array(Some(items.iter().map(|i| RespFrame::bulk_string(i)).collect()))
    }

    #[test]
    fn test_rpush_lrange() {
        let ctx = ctx();
        assert_eq!(
            handle_rpush(&ctx, &req("RPUSH", &["l", "a", "b", "c"])),
            RespFrame::Integer(3)
        );
        assert_eq!(
            handle_lrange(&ctx, &req("LRANGE", &["l", "0", "-1"])),
            bulk_array(&["a", "b", "c"])
        );
        assert_eq!(
            handle_lrange(&ctx, &req("LRANGE", &["l", "-2", "-1"])),
            bulk_array(&["b", "c"])
        );
    }

    #[test]
    fn test_lpush_order() {
        let ctx = ctx();
        handle_lpush(&ctx, &req("LPUSH", &["l", "a", "b", "c"]));
        assert_eq!(
            handle_lrange(&ctx, &req("LRANGE", &["l", "0", "-1"])),
            bulk_array(&["c", "b", "a"])
        );
    }

    #[test]
    fn test_lpop_reply_shapes() {
        let ctx = ctx();
        handle_rpush(&ctx, &req("RPUSH", &["l", "a", "b", "c"]));

        // No count: bulk reply
        assert_eq!(handle_lpop(&ctx, &req("LPOP", &["l"])), RespFrame::bulk_string("a"));
        // Count present: array reply, even for a single element
        assert_eq!(
            handle_lpop(&ctx, &req("LPOP", &["l", "1"])),
            bulk_array(&["b"])
        );
        assert_eq!(
            handle_lpop(&ctx, &req("LPOP", &["l", "5"])),
            bulk_array(&["c"])
        );
        // Drained: null bulk either way
        assert_eq!(handle_lpop(&ctx, &req("LPOP", &["l"])), RespFrame::null_bulk());
        assert_eq!(handle_lpop(&ctx, &req("LPOP", &["l", "2"])), RespFrame::null_bulk());
    }

    #[test]
    fn test_llen() {
        let ctx = ctx();
        assert_eq!(handle_llen(&ctx, &req("LLEN", &["l"])), RespFrame::Integer(0));
        handle_rpush(&ctx, &req("RPUSH", &["l", "a", "b"]));
        assert_eq!(handle_llen(&ctx, &req("LLEN", &["l"])), RespFrame::Integer(2));
    }

    #[test]
    fn test_blpop_immediate_and_timeout() {
        let ctx = ctx();
        handle_rpush(&ctx, &req("RPUSH", &["q", "v"]));
        assert_eq!(
            handle_blpop(&ctx, &NoPeer, &req("BLPOP", &["q", "0"])),
            bulk_array(&["q", "v"])
        );
        // Fractional timeout accepted; empty key times out to null
        assert_eq!(
            handle_blpop(&ctx, &NoPeer, &req("BLPOP", &["q", "0.05"])),
            RespFrame::null_bulk()
        );
        assert_eq!(
            handle_blpop(&ctx, &NoPeer, &req("BLPOP", &["q", "-1"])),
            RespFrame::error("ERR value is not an integer or out of range")
        );
    }

    #[test]
    fn test_push_wrong_type() {
        let ctx = ctx();
        ctx.storage.set_string(b"s".to_vec(), b"v".to_vec(), None).unwrap();
        assert_eq!(
            handle_rpush(&ctx, &req("RPUSH", &["s", "x"])),
            RespFrame::error("WRONGTYPE Operation against a key holding the wrong kind of value")
        );
    }
}

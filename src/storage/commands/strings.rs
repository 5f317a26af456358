//! String and key command implementations
//!
//! GET/SET/INCR plus the generic DEL and TYPE.

use std::time::Duration;
use crate::error::CommandError;
use crate::protocol::RespFrame;
use super::executor::{arg_i64, arg_str, error_reply, CommandRequest, ServerContext};

/// Handle SET key value [PX milliseconds]
pub fn handle_set(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() < 2 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("set".into()).to_string());
    }

    let expires_in = match req.args.len() {
        2 => None,
        4 => {
            let option = match arg_str(&req.args[2]) {
                Ok(s) => s,
                Err(e) => return error_reply(e),
            };
            if !option.eq_ignore_ascii_case("px") {
                return RespFrame::error(CommandError::SyntaxError.to_string());
            }
            match arg_i64(&req.args[3]) {
                Ok(ms) if ms > 0 => Some(Duration::from_millis(ms as u64)),
                Ok(_) => {
                    return RespFrame::error(CommandError::NotInteger.to_string());
                }
                Err(e) => return error_reply(e),
            }
        }
        _ => return RespFrame::error(CommandError::SyntaxError.to_string()),
    };

    match ctx
        .storage
        .set_string(req.args[0].clone(), req.args[1].clone(), expires_in)
    {
        Ok(()) => RespFrame::ok(),
        Err(e) => error_reply(e),
    }
}

/// Handle GET key
pub fn handle_get(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 1 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("get".into()).to_string());
    }
    match ctx.storage.get_string(&req.args[0]) {
        Ok(Some(value)) => RespFrame::from_bytes(value),
        Ok(None) => RespFrame::null_bulk(),
        Err(e) => error_reply(e),
    }
}

/// Handle INCR key
pub fn handle_incr(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 1 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("incr".into()).to_string());
    }
    match ctx.storage.incr(req.args[0].clone()) {
        Ok(n) => RespFrame::Integer(n),
        Err(e) => error_reply(e),
    }
}

/// Handle DEL key [key ...]
pub fn handle_del(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.is_empty() {
        return RespFrame::error(CommandError::WrongNumberOfArgs("del".into()).to_string());
    }
    let mut removed = 0i64;
    for key in &req.args {
        if ctx.storage.del(key) {
            removed += 1;
        }
    }
    RespFrame::Integer(removed)
}

/// Handle TYPE key
pub fn handle_type(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 1 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("type".into()).to_string());
    }
    RespFrame::simple_string(ctx.storage.key_type(&req.args[0]))
}

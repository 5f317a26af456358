//! Stream command implementations
//!
//! XADD/XRANGE/XREAD. Entries serialise as `[id, [field, value, ...]]`
//! with fields in insertion order.

use std::time::Duration;
use crate::error::CommandError;
use crate::protocol::RespFrame;
use crate::storage::stream::{parse_range_bound, parse_read_start, parse_xadd_id, StreamEntry};
use crate::storage::waiters::PeerMonitor;
use super::executor::{arg_i64, arg_str, error_reply, CommandRequest, ServerContext};

/// Handle XADD key id field value [field value ...]
pub fn handle_xadd(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() < 4 || (req.args.len() - 2) % 2 != 0 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("xadd".into()).to_string());
    }

    let spec = match arg_str(&req.args[1]).and_then(parse_xadd_id) {
        Ok(spec) => spec,
        Err(e) => return error_reply(e),
    };

    let mut fields = Vec::with_capacity((req.args.len() - 2) / 2);
    for pair in req.args[2..].chunks(2) {
        fields.push((pair[0].clone(), pair[1].clone()));
    }

    match ctx.storage.xadd(req.args[0].clone(), spec, fields) {
        Ok(id) => RespFrame::from_string(id.to_string()),
        Err(e) => error_reply(e),
    }
}

/// Handle XRANGE key start end
pub fn handle_xrange(ctx: &ServerContext, req: &CommandRequest) -> RespFrame {
    if req.args.len() != 3 {
        return RespFrame::error(CommandError::WrongNumberOfArgs("xrange".into()).to_string());
    }

    let start = match arg_str(&req.args[1]).and_then(|s| parse_range_bound(s, true)) {
        Ok(bound) => bound,
        Err(e) => return error_reply(e),
    };
    let end = match arg_str(&req.args[2]).and_then(|s| parse_range_bound(s, false)) {
        Ok(bound) => bound,
        Err(e) => return error_reply(e),
    };

    match ctx.storage.xrange(&req.args[0], start, end) {
        Ok(entries) => RespFrame::Array(Some(entries.iter().map(entry_frame).collect())),
        Err(e) => error_reply(e),
    }
}

/// Handle XREAD [BLOCK milliseconds] STREAMS key [key ...] id [id ...]
pub fn handle_xread(
    ctx: &ServerContext,
    monitor: &dyn PeerMonitor,
    req: &CommandRequest,
) -> RespFrame {
    let mut idx = 0;
    let mut block: Option<Option<Duration>> = None;

    if idx < req.args.len() && req.args[idx].eq_ignore_ascii_case(b"BLOCK") {
        idx += 1;
        if idx >= req.args.len() {
            return RespFrame::error(CommandError::SyntaxError.to_string());
        }
        match arg_i64(&req.args[idx]) {
            Ok(ms) if ms > 0 => block = Some(Some(Duration::from_millis(ms as u64))),
            Ok(0) => block = Some(None), // block without deadline
            Ok(_) => return RespFrame::error(CommandError::NotInteger.to_string()),
            Err(e) => return error_reply(e),
        }
        idx += 1;
    }

    if idx >= req.args.len() || !req.args[idx].eq_ignore_ascii_case(b"STREAMS") {
        return RespFrame::error(CommandError::SyntaxError.to_string());
    }
    idx += 1;

    let remaining = req.args.len() - idx;
    if remaining == 0 || remaining % 2 != 0 {
        return RespFrame::error(CommandError::SyntaxError.to_string());
    }
    let stream_count = remaining / 2;

    let mut queries = Vec::with_capacity(stream_count);
    for i in 0..stream_count {
        let key = req.args[idx + i].clone();
        let start = match arg_str(&req.args[idx + stream_count + i]).and_then(parse_read_start) {
            Ok(start) => start,
            Err(e) => return error_reply(e),
        };
        queries.push((key, start));
    }

    match ctx.storage.xread(&queries, block, monitor) {
        Ok(Some(results)) => RespFrame::Array(Some(
            results
                .into_iter()
                .map(|(key, entries)| {
                    RespFrame::array(vec![
                        RespFrame::from_bytes(key),
                        RespFrame::Array(Some(entries.iter().map(entry_frame).collect())),
                    ])
                })
                .collect(),
        )),
        Ok(None) => RespFrame::null_bulk(),
        Err(e) => error_reply(e),
    }
}

/// Serialise one entry as `[id, [field, value, ...]]`
fn entry_frame(entry: &StreamEntry) -> RespFrame {
    let mut flat = Vec::with_capacity(entry.fields.len() * 2);
    for (field, value) in &entry.fields {
        flat.push(RespFrame::from_bytes(field.clone()));
        flat.push(RespFrame::from_bytes(value.clone()));
    }
    RespFrame::array(vec![
        RespFrame::from_string(entry.id.to_string()),
        RespFrame::Array(Some(flat)),
    ])
}

//! Transaction command implementations
//!
//! MULTI switches a connection into queuing mode; EXEC takes the queue
//! atomically and runs it in order with one reply per command; DISCARD
//! drops it. Blocking commands are refused admission to the queue.

use crate::error::CommandError;
use crate::protocol::RespFrame;
use super::executor::{self, ClientState, CommandRequest, ServerContext};

/// Transaction state for a connection
#[derive(Debug, Default)]
pub struct TransactionState {
    /// Whether we're queuing commands
    pub in_transaction: bool,
    /// Queued commands, in arrival order
    pub queued: Vec<CommandRequest>,
}

impl TransactionState {
    pub fn new() -> Self {
        TransactionState {
            in_transaction: false,
            queued: Vec::new(),
        }
    }
}

/// Transaction controllers are never queued
pub fn is_transaction_command(name: &str) -> bool {
    matches!(name, "MULTI" | "EXEC" | "DISCARD" | "WATCH" | "UNWATCH")
}

/// Commands that may suspend the connection are refused admission; the
/// transaction itself stays open
pub fn is_blocked_in_transaction(req: &CommandRequest) -> bool {
    match req.name.as_str() {
        "BLPOP" => true,
        "XREAD" => req
            .args
            .first()
            .map(|a| a.eq_ignore_ascii_case(b"BLOCK"))
            .unwrap_or(false),
        _ => false,
    }
}

/// Handle MULTI - start queuing
pub fn handle_multi(client: &mut ClientState, req: &CommandRequest) -> RespFrame {
    if !req.args.is_empty() {
        return RespFrame::error(CommandError::WrongNumberOfArgs("multi".into()).to_string());
    }
    if client.tx.in_transaction {
        return RespFrame::error(CommandError::MultiNested.to_string());
    }
    client.tx.in_transaction = true;
    client.tx.queued.clear();
    RespFrame::ok()
}

/// Handle EXEC - run the queued commands in order
pub fn handle_exec(
    ctx: &ServerContext,
    client: &mut ClientState,
    req: &CommandRequest,
) -> RespFrame {
    if !req.args.is_empty() {
        return RespFrame::error(CommandError::WrongNumberOfArgs("exec".into()).to_string());
    }
    if !client.tx.in_transaction {
        return RespFrame::error(CommandError::ExecWithoutMulti.to_string());
    }

    client.tx.in_transaction = false;
    let queued = std::mem::take(&mut client.tx.queued);

    let mut replies = Vec::with_capacity(queued.len());
    for cmd in &queued {
        // Per-command errors become elements of the reply array and do not
        // abort the remaining commands
        replies.push(executor::execute(ctx, client, cmd));
    }
    RespFrame::Array(Some(replies))
}

/// Handle DISCARD - drop the queue
pub fn handle_discard(client: &mut ClientState, req: &CommandRequest) -> RespFrame {
    if !req.args.is_empty() {
        return RespFrame::error(CommandError::WrongNumberOfArgs("discard".into()).to_string());
    }
    if !client.tx.in_transaction {
        return RespFrame::error(CommandError::DiscardWithoutMulti.to_string());
    }
    client.tx.in_transaction = false;
    client.tx.queued.clear();
    RespFrame::ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(name: &str, args: &[&str]) -> CommandRequest {
        CommandRequest {
            name: name.to_string(),
            args: args.iter().map(|a| a.as_bytes().to_vec()).collect(),
        }
    }

    #[test]
    fn test_transaction_controllers() {
        assert!(is_transaction_command("MULTI"));
        assert!(is_transaction_command("EXEC"));
        assert!(is_transaction_command("DISCARD"));
        assert!(is_transaction_command("WATCH"));
        assert!(!is_transaction_command("SET"));
    }

    #[test]
    fn test_admission_rules() {
        assert!(is_blocked_in_transaction(&req("BLPOP", &["q", "0"])));
        assert!(is_blocked_in_transaction(&req(
            "XREAD",
            &["BLOCK", "100", "STREAMS", "s", "$"]
        )));
        assert!(is_blocked_in_transaction(&req(
            "XREAD",
            &["block", "0", "STREAMS", "s", "$"]
        )));
        assert!(!is_blocked_in_transaction(&req("XREAD", &["STREAMS", "s", "0"])));
        assert!(!is_blocked_in_transaction(&req("LPOP", &["q"])));
    }
}

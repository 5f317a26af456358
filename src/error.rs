//! Error types for Cuprous
//!
//! This module defines all error types used throughout the Cuprous server.
//! We follow Redis's error conventions where applicable.

use std::fmt;
use std::io;
use std::error::Error as StdError;

/// Main error type for Cuprous operations
#[derive(Debug)]
pub enum CuprousError {
    /// Protocol-related errors (RESP parsing, serialization)
    Protocol(String),

    /// The peer closed the connection in the middle of a frame
    UnexpectedEof,

    /// Command execution errors
    Command(CommandError),

    /// Storage engine errors
    Storage(StorageError),

    /// Network/IO errors
    Io(String),

    /// Configuration errors
    Config(String),

    /// Client connection errors
    Connection(String),

    /// Replication handshake or propagation errors
    Replication(String),

    /// Internal server errors
    Internal(String),
}

/// Command-specific errors that map to Redis error responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown command
    UnknownCommand(String),

    /// Wrong number of arguments for command
    WrongNumberOfArgs(String),

    /// Syntax error in command
    SyntaxError,

    /// Operation against wrong type
    WrongType,

    /// Value is not an integer or out of range
    NotInteger,

    /// XADD with an explicit 0-0 ID
    StreamIdZero,

    /// XADD with an ID at or below the stream's top item
    StreamIdTooSmall,

    /// MULTI while already queuing
    MultiNested,

    /// EXEC outside a transaction
    ExecWithoutMulti,

    /// DISCARD outside a transaction
    DiscardWithoutMulti,

    /// Blocking command queued inside MULTI
    NotAllowedInTransaction,

    /// Generic command error with message
    Generic(String),
}

/// Storage-related errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Key not found
    KeyNotFound,

    /// Wrong data type for operation
    WrongType,
}

/// Type alias for Results throughout Cuprous
pub type Result<T> = std::result::Result<T, CuprousError>;

impl fmt::Display for CuprousError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CuprousError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            CuprousError::UnexpectedEof => write!(f, "Protocol error: unexpected end of stream"),
            CuprousError::Command(err) => write!(f, "{}", err),
            CuprousError::Storage(err) => write!(f, "{}", err),
            CuprousError::Io(msg) => write!(f, "I/O error: {}", msg),
            CuprousError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CuprousError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CuprousError::Replication(msg) => write!(f, "Replication error: {}", msg),
            CuprousError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::UnknownCommand(cmd) => {
                write!(f, "ERR unknown command '{}'", cmd)
            }
            CommandError::WrongNumberOfArgs(cmd) => {
                write!(f, "ERR wrong number of arguments for '{}' command", cmd)
            }
            CommandError::SyntaxError => write!(f, "ERR syntax error"),
            CommandError::WrongType => {
                write!(f, "WRONGTYPE Operation against a key holding the wrong kind of value")
            }
            CommandError::NotInteger => {
                write!(f, "ERR value is not an integer or out of range")
            }
            CommandError::StreamIdZero => {
                write!(f, "ERR The ID specified in XADD must be greater than 0-0")
            }
            CommandError::StreamIdTooSmall => {
                write!(
                    f,
                    "ERR The ID specified in XADD is equal or smaller than the target stream top item"
                )
            }
            CommandError::MultiNested => write!(f, "ERR MULTI calls can not be nested"),
            CommandError::ExecWithoutMulti => write!(f, "ERR EXEC without MULTI"),
            CommandError::DiscardWithoutMulti => write!(f, "ERR DISCARD without MULTI"),
            CommandError::NotAllowedInTransaction => {
                write!(f, "ERR command not allowed in transaction")
            }
            CommandError::Generic(msg) => {
                write!(f, "ERR {}", msg)
            }
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::KeyNotFound => write!(f, "Key not found"),
            StorageError::WrongType => {
                write!(f, "WRONGTYPE Operation against a key holding the wrong kind of value")
            }
        }
    }
}

impl StdError for CuprousError {}

impl StdError for CommandError {}
impl StdError for StorageError {}

// Conversion implementations
impl From<io::Error> for CuprousError {
    fn from(err: io::Error) -> Self {
        CuprousError::Io(err.to_string())
    }
}

impl From<CommandError> for CuprousError {
    fn from(err: CommandError) -> Self {
        CuprousError::Command(err)
    }
}

impl From<StorageError> for CuprousError {
    fn from(err: StorageError) -> Self {
        CuprousError::Storage(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CommandError::UnknownCommand("FOOBAR".to_string());
        assert_eq!(err.to_string(), "ERR unknown command 'FOOBAR'");

        let err = CommandError::WrongType;
        assert_eq!(
            err.to_string(),
            "WRONGTYPE Operation against a key holding the wrong kind of value"
        );
    }

    #[test]
    fn test_stream_id_errors_verbatim() {
        assert_eq!(
            CommandError::StreamIdZero.to_string(),
            "ERR The ID specified in XADD must be greater than 0-0"
        );
        assert_eq!(
            CommandError::StreamIdTooSmall.to_string(),
            "ERR The ID specified in XADD is equal or smaller than the target stream top item"
        );
    }

    #[test]
    fn test_transaction_errors() {
        assert_eq!(CommandError::MultiNested.to_string(), "ERR MULTI calls can not be nested");
        assert_eq!(CommandError::ExecWithoutMulti.to_string(), "ERR EXEC without MULTI");
        assert_eq!(
            CommandError::NotAllowedInTransaction.to_string(),
            "ERR command not allowed in transaction"
        );
    }
}

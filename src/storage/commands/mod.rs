//! Command handling for Cuprous
//!
//! The executor routes decoded requests to the handler modules below.

pub mod executor;
pub mod strings;
pub mod lists;
pub mod streams;
pub mod transactions;
pub mod server_info;

pub use executor::{dispatch, execute, ClientState, CommandRequest, ServerContext};
pub use transactions::TransactionState;

//! Configuration module for Cuprous
//!
//! A small centralized configuration with command-line overrides.

mod cli;

pub use cli::{parse_cli_args, CliArgs};

use crate::network::NetworkConfig;

/// Main configuration structure for Cuprous
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Network configuration
    pub network: NetworkConfig,

    /// Master to replicate from; absence means this server is a master
    pub replicaof: Option<(String, u16)>,
}

impl Config {
    /// Apply command-line arguments to override defaults
    pub fn apply_cli_args(&mut self, args: CliArgs) {
        if let Some(port) = args.port {
            self.network.port = port;
        }
        if let Some(bind_addr) = args.bind {
            self.network.bind_addr = bind_addr;
        }
        if let Some(replicaof) = args.replicaof {
            self.replicaof = Some(replicaof);
        }
    }
}

/// Errors that can occur during configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Configuration error: {0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.network.port, 6379);
        assert_eq!(config.network.bind_addr, "127.0.0.1");
        assert!(config.replicaof.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = Config::default();
        config.apply_cli_args(CliArgs {
            port: Some(7000),
            bind: None,
            replicaof: Some(("10.0.0.1".to_string(), 6379)),
        });
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.bind_addr, "127.0.0.1");
        assert_eq!(config.replicaof, Some(("10.0.0.1".to_string(), 6379)));
    }
}

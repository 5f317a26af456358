//! TCP listener for accepting client connections

use std::net::{SocketAddr, TcpListener, TcpStream};
use crate::error::{CuprousError, Result};
use super::NetworkConfig;

/// TCP listener wrapper
pub struct Listener {
    listener: TcpListener,
}

impl Listener {
    /// Create a new listener bound to the configured address
    pub fn bind(config: &NetworkConfig) -> Result<Self> {
        let addr = format!("{}:{}", config.bind_addr, config.port);
        let listener = TcpListener::bind(&addr)
            .map_err(|e| CuprousError::Io(format!("Failed to bind to {}: {}", addr, e)))?;

        Ok(Listener { listener })
    }

    /// Block until the next connection arrives
    pub fn accept(&self) -> Result<(TcpStream, SocketAddr)> {
        self.listener.accept().map_err(Into::into)
    }

    /// Get the local address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Into::into)
    }
}

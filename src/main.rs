//! Cuprous - A Redis-compatible in-memory key-value server written in pure Rust
//!
//! This is the main entry point for the Cuprous server.

use std::process;
use std::thread;
use cuprous::config::{self, Config};
use cuprous::error::Result;
use cuprous::network::Server;

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run() -> Result<()> {
    println!("Starting Cuprous - Redis-compatible server in Rust");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Parse command-line arguments over the defaults
    let cli_args = config::parse_cli_args();
    let mut config = Config::default();
    config.apply_cli_args(cli_args);

    let server = Server::from_config(&config)?;
    println!(
        "Cuprous listening on {}:{}",
        config.network.bind_addr, config.network.port
    );

    spawn_signal_handler()?;

    server.run()
}

/// Exit with status 0 once SIGINT or SIGTERM arrives
fn spawn_signal_handler() -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| cuprous::error::CuprousError::Internal(e.to_string()))?;

    thread::spawn(move || {
        if signals.forever().next().is_some() {
            println!("Received shutdown signal, exiting");
            process::exit(0);
        }
    });

    Ok(())
}

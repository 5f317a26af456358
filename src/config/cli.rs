//! Command-line argument parser
//!
//! Parses command-line arguments for Cuprous, with Redis compatibility.

/// Command-line arguments for Cuprous
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Port to listen on
    pub port: Option<u16>,

    /// Address to bind to
    pub bind: Option<String>,

    /// Master to replicate from - (host, port)
    pub replicaof: Option<(String, u16)>,
}

/// Parse command-line arguments, exiting with a non-zero status on
/// anything unrecognised
pub fn parse_cli_args() -> CliArgs {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(cli_args) => cli_args,
        Err(message) => {
            eprintln!("Error: {}", message);
            print_help();
            std::process::exit(1);
        }
    }
}

fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut cli_args = CliArgs::default();
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-v" => {
                println!("Cuprous {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--port" | "-p" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "Missing argument for --port".to_string())?;
                cli_args.port = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| format!("Invalid port number: {}", value))?,
                );
                i += 2;
            }
            "--bind" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "Missing argument for --bind".to_string())?;
                cli_args.bind = Some(value.clone());
                i += 2;
            }
            "--replicaof" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| "Missing argument for --replicaof".to_string())?;
                cli_args.replicaof = Some(parse_replicaof(value)?);
                i += 2;
            }
            arg => {
                return Err(format!("Unknown argument: {}", arg));
            }
        }
    }

    Ok(cli_args)
}

/// The --replicaof value is a single quoted "<host> <port>" pair
fn parse_replicaof(value: &str) -> Result<(String, u16), String> {
    let mut words = value.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(host), Some(port), None) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("Invalid port number for --replicaof: {}", port))?;
            Ok((host.to_string(), port))
        }
        _ => Err(format!(
            "--replicaof expects \"<host> <port>\", got: {}",
            value
        )),
    }
}

/// Print help information
fn print_help() {
    println!("Usage: cuprous [OPTIONS]");
    println!("       cuprous --port 6379");
    println!("       cuprous --port 6380 --replicaof \"127.0.0.1 6379\"");
    println!();
    println!("Options:");
    println!("  --help, -h                    Show this help message");
    println!("  --version, -v                 Show version information");
    println!("  --port, -p    <port>          TCP port to listen on (default: 6379)");
    println!("  --bind        <address>       Interface to bind to (default: 127.0.0.1)");
    println!("  --replicaof   \"<host> <port>\" Replicate from another instance");
}

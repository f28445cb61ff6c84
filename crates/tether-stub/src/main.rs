mod handlers;
mod transport;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tether_rsp::{RspSession, Transport};
use tracing_subscriber::EnvFilter;

use crate::transport::{StdioTransport, TcpTransport};

const DEFAULT_PORT: u16 = 1234;

/// Stand-in debug target that speaks the GDB remote serial protocol.
///
/// Useful for exercising debugger frontends without real hardware: it
/// accepts one session, fakes a stopped target and answers the common
/// commands with plausible data.
#[derive(Parser)]
#[command(name = "tether-stub", version, about)]
struct Cli {
    /// Listen for the debugger on this TCP port.
    #[arg(long, value_name = "PORT")]
    tcp: Option<Option<u16>>,
    /// Talk to the debugger over stdin/stdout instead of TCP.
    #[arg(long, conflicts_with = "tcp")]
    stdio: bool,
}

impl Cli {
    /// Port to serve on; `--tcp` without a value falls back to the default.
    fn port(&self) -> u16 {
        self.tcp.flatten().unwrap_or(DEFAULT_PORT)
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.stdio {
        serve_over(StdioTransport)
    } else {
        serve_over(TcpTransport::accept(cli.port())?)
    }
}

fn serve_over<T: Transport>(transport: T) -> Result<()> {
    let mut session = RspSession::new(transport);
    let mut dispatcher = handlers::dispatcher();
    dispatcher.serve(&mut session)?;
    tracing::info!(target: "tether.stub", "debugger detached");
    Ok(())
}

/// Logs go to stderr; when serving `--stdio`, stdout carries the protocol.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

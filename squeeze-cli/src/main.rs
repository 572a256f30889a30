//! CLI for sending and receiving squeeze frames over TCP.

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

mod config;
mod listen;
mod send;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use squeeze::Cancel;
use tracing_subscriber::EnvFilter;

/// Default listener address.
const DEFAULT_ADDR: &str = "127.0.0.1:7070";

#[derive(Parser)]
#[command(name = "squeeze", version, about = "Framed TCP transfer with adaptive compression")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept connections and print or save every received frame.
    Listen(listen::ListenArgs),

    /// Send stdin lines, then files, to a listener.
    Send(send::SendArgs),

    /// Generate shell completion scripts.
    #[command(hide = true)]
    Completion {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_logging();
    if let Err(e) = Cli::parse().dispatch().await {
        eprintln!("squeeze: {e:#}");
        std::process::exit(1);
    }
}

/// Logs to stderr, filtered by `RUST_LOG` (default `info`).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

impl Cli {
    async fn dispatch(self) -> Result<()> {
        match self.command {
            Command::Listen(args) => args.run(interrupt()).await,
            Command::Send(args) => args.run(interrupt()).await,
            Command::Completion { shell } => {
                clap_complete::generate(shell, &mut Self::command(), "squeeze", &mut std::io::stdout());
                Ok(())
            }
        }
    }
}

/// A token cancelled by Ctrl-C.
fn interrupt() -> Cancel {
    let cancel = Cancel::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted");
            token.cancel();
        }
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_collects_repeated_files() {
        let cli = Cli::try_parse_from(["squeeze", "send", "--file", "a", "--file", "b", "--level", "3"])
            .unwrap();
        assert!(matches!(cli.command, Command::Send(_)));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(Cli::try_parse_from(["squeeze", "listen", "--algorithm", "lz4"]).is_err());
    }
}

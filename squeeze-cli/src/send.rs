//! `squeeze send`: stream stdin lines and files to a listener.

use std::path::PathBuf;

use anyhow::{Context, Result};
use squeeze::{Cancel, Client};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::ConfigArgs;

/// Arguments for `squeeze send`.
#[derive(clap::Args)]
pub struct SendArgs {
    /// Listener address.
    #[arg(long, default_value = crate::DEFAULT_ADDR, env = "SQUEEZE_ADDR")]
    addr: String,

    /// Files to send after stdin is exhausted, one frame each.
    #[arg(long = "file", value_name = "PATH")]
    files: Vec<PathBuf>,

    /// Skip stdin and send only the given files.
    #[arg(long)]
    no_stdin: bool,

    /// Bodies allowed to wait in the outbound queue.
    #[arg(long, default_value_t = 64)]
    capacity: usize,

    #[command(flatten)]
    config: ConfigArgs,
}

impl SendArgs {
    pub async fn run(self, cancel: Cancel) -> Result<()> {
        let config = self.config.resolve()?;
        let client = Client::connect(&self.addr, config, self.capacity, cancel.clone())
            .await
            .with_context(|| format!("connect {}", self.addr))?;

        if !self.no_stdin {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                let line = tokio::select! {
                    biased;
                    () = cancel.cancelled() => anyhow::bail!("interrupted"),
                    line = lines.next_line() => line.context("read stdin")?,
                };
                let Some(line) = line else { break };
                client.enqueue(line).await?;
            }
        }
        for path in self.files {
            anyhow::ensure!(path.is_file(), "{} is not a file", path.display());
            client.send_file(path).await?;
        }

        let frames = client.finish().await?;
        eprintln!("sent {frames} frame(s)");
        Ok(())
    }
}

//! `squeeze listen`: accept peers and deliver their frames.

use std::path::PathBuf;

use anyhow::{Context, Result};
use squeeze::{Cancel, Mode, Server};

use crate::config::ConfigArgs;

/// Arguments for `squeeze listen`.
#[derive(clap::Args)]
pub struct ListenArgs {
    /// Address to bind.
    #[arg(long, default_value = crate::DEFAULT_ADDR, env = "SQUEEZE_ADDR")]
    addr: String,

    /// Save each frame under this directory instead of printing it.
    #[arg(long, value_name = "DIR")]
    files: Option<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,
}

impl ListenArgs {
    pub async fn run(self, cancel: Cancel) -> Result<()> {
        let config = self.config.resolve()?;
        let server = Server::bind(&self.addr, config)
            .await
            .with_context(|| format!("bind {}", self.addr))?;
        eprintln!("listening on {}", server.local_addr()?);

        let mode = match self.files {
            Some(dir) => Mode::Files { dir },
            None => Mode::messages(|_, body| println!("{}", String::from_utf8_lossy(&body))),
        };
        server.run(mode, cancel).await?;
        Ok(())
    }
}

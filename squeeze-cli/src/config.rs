//! Frame settings shared by `squeeze listen` and `squeeze send`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use squeeze::{Algorithm, Config, Layout};

/// Frame settings: an optional JSON file overlaid by flags.
#[derive(Debug, Default, clap::Args)]
pub struct ConfigArgs {
    /// JSON file with frame settings; flags override its values.
    #[arg(long, env = "SQUEEZE_CONFIG")]
    config: Option<PathBuf>,

    /// Largest accepted frame length in bytes.
    #[arg(long)]
    max_frame_bytes: Option<u32>,

    /// Largest decompressed body accepted from a peer, in bytes.
    #[arg(long)]
    max_decoded_bytes: Option<u64>,

    /// I/O chunk size in bytes.
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Sources above this size spool the compression trial to disk.
    #[arg(long)]
    spool_threshold: Option<u64>,

    /// Compression algorithm; both peers must match.
    #[arg(long)]
    algorithm: Option<AlgorithmArg>,

    /// Compression level (0-9).
    #[arg(long)]
    level: Option<u32>,

    /// Omit the flag byte; bodies are never compressed.
    #[arg(long)]
    plain: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum AlgorithmArg {
    /// zlib-wrapped DEFLATE.
    Zlib,
    /// Raw DEFLATE.
    Deflate,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(a: AlgorithmArg) -> Self {
        match a {
            AlgorithmArg::Zlib => Self::Zlib,
            AlgorithmArg::Deflate => Self::Deflate,
        }
    }
}

impl ConfigArgs {
    /// Builds and validates the effective config.
    pub fn resolve(&self) -> Result<Config> {
        let mut cfg = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => Config::default(),
        };

        if let Some(v) = self.max_frame_bytes {
            cfg = cfg.max_frame_bytes(v);
        }
        if let Some(v) = self.max_decoded_bytes {
            cfg = cfg.max_decoded_bytes(v);
        }
        if let Some(v) = self.chunk_size {
            cfg = cfg.chunk_size(v);
        }
        if let Some(v) = self.spool_threshold {
            cfg = cfg.spool_threshold(v);
        }
        if let Some(v) = self.algorithm {
            cfg = cfg.algorithm(v.into());
        }
        if let Some(v) = self.level {
            cfg = cfg.level(v);
        }
        if self.plain {
            cfg = cfg.layout(Layout::Plain);
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

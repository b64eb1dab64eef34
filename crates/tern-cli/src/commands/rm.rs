//! Rm command - remove files and directories with retries.

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tern_fs::{Fs, RmOptions};

#[derive(Args)]
pub struct RmCommand {
    /// Paths to remove
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Remove directories and their contents
    #[arg(short, long)]
    pub recursive: bool,

    /// Ignore missing paths
    #[arg(short, long)]
    pub force: bool,

    /// Retries on EBUSY, EMFILE, ENFILE, ENOTEMPTY and EPERM
    #[arg(long, default_value_t = 0)]
    pub max_retries: u32,

    /// Base delay between retries; defaults to `fs.rm_retry_delay_ms`
    #[arg(long)]
    pub retry_delay_ms: Option<u64>,
}

impl RmCommand {
    pub fn options(&self, config: &Config) -> RmOptions {
        RmOptions {
            force: self.force,
            max_retries: self.max_retries,
            recursive: self.recursive,
            retry_delay: Duration::from_millis(
                self.retry_delay_ms.unwrap_or(config.fs.rm_retry_delay_ms),
            ),
        }
    }

    pub async fn run(&self, config: &Config) -> Result<()> {
        let fs = Fs::std().promises();
        let options = self.options(config);
        for path in &self.paths {
            fs.rm(path, options)
                .await
                .with_context(|| format!("cannot remove {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Removed");
        }
        Ok(())
    }
}

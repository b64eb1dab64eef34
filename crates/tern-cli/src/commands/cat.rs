//! Cat command - print files through a `ReadStream`.

use anyhow::{Context, Result};
use clap::Args;
use futures_util::StreamExt;
use std::io::Write;
use std::path::PathBuf;
use tern_fs::{Fs, ReadStreamOptions};

#[derive(Args)]
pub struct CatCommand {
    /// Files to print, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// First byte to print
    #[arg(long)]
    pub start: Option<u64>,

    /// Last byte to print (inclusive)
    #[arg(long)]
    pub end: Option<u64>,
}

impl CatCommand {
    pub async fn run(&self) -> Result<()> {
        let fs = Fs::std();
        for file in &self.files {
            let options = ReadStreamOptions {
                start: self.start,
                end: self.end,
                ..Default::default()
            };
            let stream = fs
                .create_read_stream(file.as_path(), options)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let mut chunks = Box::pin(stream.into_stream());
            while let Some(chunk) = chunks.next().await {
                let chunk = chunk.with_context(|| format!("cannot read {}", file.display()))?;
                std::io::stdout().write_all(&chunk)?;
            }
        }
        std::io::stdout().flush()?;
        Ok(())
    }
}

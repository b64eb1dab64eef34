//! Ls command - list a directory through `opendir`.

use anyhow::{Context, Result};
use clap::Args;
use futures_util::TryStreamExt;
use std::path::PathBuf;
use tern_fs::{Dirent, Fs, OpendirOptions};

#[derive(Args)]
pub struct LsCommand {
    /// Directory to list
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Show type, size and modification time
    #[arg(short, long)]
    pub long: bool,

    /// Include entries starting with `.`
    #[arg(short, long)]
    pub all: bool,
}

impl LsCommand {
    pub async fn run(&self) -> Result<()> {
        let fs = Fs::std();
        let dir = fs
            .promises()
            .opendir(&self.path, OpendirOptions::default())
            .await
            .with_context(|| format!("cannot open {}", self.path.display()))?;
        let mut entries: Vec<Dirent> = dir
            .entries()
            .try_filter(|entry| std::future::ready(self.all || !entry.name.starts_with('.')))
            .try_collect()
            .await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in &entries {
            if self.long {
                println!("{}", self.describe(&fs, entry)?);
            } else {
                println!("{}", entry.name);
            }
        }
        Ok(())
    }

    fn describe(&self, fs: &Fs, entry: &Dirent) -> Result<String> {
        let stats = fs
            .lstat_sync(self.path.join(&entry.name))
            .with_context(|| format!("cannot stat {}", entry.name))?;
        Ok(format!(
            "{} {:>10} {:>14.0} {}",
            type_char(entry),
            stats.size,
            stats.mtime_ms,
            entry.name
        ))
    }
}

fn type_char(entry: &Dirent) -> char {
    if entry.is_directory() {
        'd'
    } else if entry.is_symbolic_link() {
        'l'
    } else if entry.is_file() {
        '-'
    } else {
        '?'
    }
}

mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{cat::CatCommand, fetch::FetchCommand, ls::LsCommand, rm::RmCommand, serve::ServeCommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

#[derive(Parser)]
#[command(name = "tern", version, about = "Node-compatible fs and http from the command line")]
struct Cli {
    /// Config file (default: nearest tern.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an HTTP server that echoes request bodies
    Serve(ServeCommand),
    /// Send an HTTP request and print the response body
    Fetch(FetchCommand),
    /// List a directory
    Ls(LsCommand),
    /// Print files
    Cat(CatCommand),
    /// Remove files or directories
    Rm(RmCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(config.log.level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve(cmd) => cmd.run(&config).await?,
        Commands::Fetch(cmd) => cmd.run(&config).await?,
        Commands::Ls(cmd) => cmd.run().await?,
        Commands::Cat(cmd) => cmd.run().await?,
        Commands::Rm(cmd) => cmd.run(&config).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn rm_flags_override_config() {
        let cli = Cli::try_parse_from(["tern", "rm", "-rf", "--max-retries", "3", "a", "b"]).unwrap();
        let Commands::Rm(cmd) = cli.command else {
            panic!("expected rm");
        };
        let options = cmd.options(&config::Config::default());
        assert!(options.recursive && options.force);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.retry_delay.as_millis(), 100);
        assert_eq!(cmd.paths.len(), 2);
    }

    #[test]
    fn fetch_collects_repeated_headers() {
        let cli = Cli::try_parse_from([
            "tern", "fetch", "http://x.test/", "-X", "POST", "-d", "hi", "-H", "A: 1", "-H", "B: 2",
        ])
        .unwrap();
        let Commands::Fetch(cmd) = cli.command else {
            panic!("expected fetch");
        };
        assert_eq!(cmd.method, "POST");
        assert_eq!(cmd.data.as_deref(), Some("hi"));
        assert_eq!(cmd.headers, vec!["A: 1", "B: 2"]);
    }
}

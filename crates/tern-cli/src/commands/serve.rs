//! Serve command - run the echo server.

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use tern_http::{IncomingMessage, ServerResponse, create_server};

#[derive(Args)]
pub struct ServeCommand {
    /// Port to listen on (0 picks a free one)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,
}

impl ServeCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let host = self.host.as_deref().unwrap_or(&config.server.host);
        let port = self.port.unwrap_or(config.server.port);
        let prefix = config.server.echo_prefix.clone().into_bytes();

        let mut server = create_server(move |req: IncomingMessage, mut res: ServerResponse| {
            let body = [prefix.as_slice(), &req.body()[..]].concat();
            async move {
                res.set_header("Content-Type", "text/plain; charset=utf-8");
                if let Err(e) = res.end(body).await {
                    tracing::warn!(error = %e, "Failed to send response");
                }
            }
        });
        let addr = server
            .listen(port, host)
            .await
            .with_context(|| format!("cannot listen on {host}:{port}"))?;
        println!("Listening on http://{addr}");

        tokio::signal::ctrl_c().await?;
        server.close()?;
        Ok(())
    }
}

//! Fetch command - send one request and print the response.

use crate::config::Config;
use anyhow::{Context, Result};
use clap::Args;
use std::io::Write;
use std::time::Duration;
use tern_http::{Headers, RequestInit, fetch};

#[derive(Args)]
pub struct FetchCommand {
    /// URL to request (http: or https:)
    pub url: String,

    /// Request method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Request body
    #[arg(short, long)]
    pub data: Option<String>,

    /// Extra header as `Name: value` (repeatable)
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Print response headers
    #[arg(short, long)]
    pub include: bool,
}

impl FetchCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let init = RequestInit {
            method: Some(self.method.clone()),
            headers: parse_headers(&self.headers, &config.client.user_agent)?,
            body: self.data.clone().map(Into::into),
        };

        let exchange = async {
            let mut res = fetch(&self.url, init).await?;
            eprintln!("{} {} {}", res.version(), res.status(), res.status_text());
            if self.include {
                for (name, value) in res.headers().iter() {
                    eprintln!("{name}: {value}");
                }
            }
            while let Some(chunk) = res.next_chunk().await? {
                std::io::stdout().write_all(&chunk)?;
            }
            std::io::stdout().flush()?;
            anyhow::Ok(())
        };

        if config.client.timeout_ms == 0 {
            exchange.await
        } else {
            tokio::time::timeout(Duration::from_millis(config.client.timeout_ms), exchange)
                .await
                .with_context(|| format!("{} timed out after {}ms", self.url, config.client.timeout_ms))?
        }
    }
}

fn parse_headers(raw: &[String], user_agent: &str) -> Result<Headers> {
    let mut headers = Headers::new();
    for line in raw {
        let (name, value) = line
            .split_once(':')
            .with_context(|| format!("header {line:?} is not `Name: value`"))?;
        headers.append(name.trim(), value.trim());
    }
    headers.set_default("User-Agent", user_agent);
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_parse_and_default_user_agent() {
        let raw = vec!["X-A: 1".to_string(), "user-agent:custom".to_string()];
        let headers = parse_headers(&raw, "tern/test").unwrap();
        assert_eq!(headers.get("x-a"), Some("1"));
        assert_eq!(headers.get("User-Agent"), Some("custom"));

        let headers = parse_headers(&[], "tern/test").unwrap();
        assert_eq!(headers.get("user-agent"), Some("tern/test"));

        assert!(parse_headers(&["broken".to_string()], "x").is_err());
    }
}

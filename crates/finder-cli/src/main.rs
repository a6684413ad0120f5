//! Finder connector CLI.
//!
//! Mounts the roots of a RON config and runs commands against them.
//!
//! Usage:
//!   # One command, arguments as a JSON object
//!   finder --config roots.ron ls --args '{"target": "m1_Lw"}'
//!
//!   # JSON-lines mode: one `{"command": ..., "args": {...}}` per stdin line,
//!   # one response envelope per stdout line
//!   finder --config roots.ron < requests.jsonl
//!
//! Without `--config` a single empty in-memory root is mounted.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt};

use finder_kernel::{Connector, ConnectorConfig, RootConfig};
use finder_types::{ErrorKind, Request, Response};

/// Run finder connector commands.
#[derive(Parser, Debug)]
#[command(name = "finder")]
#[command(about = "Run finder connector commands against configured volumes")]
struct Cli {
    /// RON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Command to run; reads JSON-lines requests from stdin when omitted
    command: Option<String>,

    /// Command arguments as a JSON object
    #[arg(short, long, default_value = "{}")]
    args: String,

    /// Allow `debug` blocks in responses
    #[arg(long)]
    debug: bool,

    /// Pretty-print responses
    #[arg(long)]
    pretty: bool,
}

fn load_config(cli: &Cli) -> Result<ConnectorConfig> {
    let mut config = match &cli.config {
        Some(path) => ConnectorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConnectorConfig::default().with_root(RootConfig::new("Memory").with_alias("Home")),
    };
    if cli.debug {
        config.debug = true;
    }
    Ok(config)
}

fn parse_args(text: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(text).context("parsing --args")? {
        Value::Object(map) => Ok(map),
        other => bail!("--args must be a JSON object, got {other}"),
    }
}

fn render(response: &Response, pretty: bool) -> Result<String> {
    Ok(if pretty {
        serde_json::to_string_pretty(response)?
    } else {
        serde_json::to_string(response)?
    })
}

/// Serve JSON-lines requests from `input` until EOF, one envelope per line
/// on `output`.
async fn serve_lines<R, W>(connector: &Connector, input: R, output: &mut W, pretty: bool) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    let mut served = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => connector.handle(request).await,
            Err(e) => {
                tracing::warn!(error = %e, "malformed request line");
                Response::error(ErrorKind::Unknown.into())
            }
        };
        let mut out = render(&response, pretty)?;
        out.push('\n');
        output.write_all(out.as_bytes()).await?;
        output.flush().await?;
        served += 1;
    }
    Ok(served)
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries responses; logs go to stderr
    fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into())
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let connector = Connector::open(config).await;
    for error in connector.registry().mount_errors() {
        tracing::warn!(%error, "root not mounted");
    }

    match &cli.command {
        Some(command) => {
            let request = Request {
                command: command.clone(),
                args: parse_args(&cli.args)?,
            };
            let response = connector.handle(request).await;
            println!("{}", render(&response, cli.pretty)?);
            if response.is_error() {
                std::process::exit(1);
            }
        }
        None => {
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = tokio::io::stdout();
            let served = serve_lines(&connector, stdin, &mut stdout, cli.pretty).await?;
            tracing::info!(served, "stdin closed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_connector() -> Connector {
        let config =
            ConnectorConfig::default().with_root(RootConfig::new("Memory").with_alias("Home"));
        Connector::open(config).await
    }

    #[test]
    fn test_parse_args_requires_object() {
        let map = parse_args(r#"{"target": "m1_Lw"}"#).unwrap();
        assert_eq!(map["target"], "m1_Lw");
        assert!(parse_args("[1, 2]").is_err());
        assert!(parse_args("not json").is_err());
    }

    #[tokio::test]
    async fn test_serve_lines_answers_each_request() {
        let connector = memory_connector().await;
        let input = concat!(
            r#"{"command": "open", "args": {"init": true}}"#,
            "\n\n",
            "garbage\n",
            r#"{"command": "bogus"}"#,
            "\n",
        );
        let mut output = Vec::new();

        let served = serve_lines(&connector, input.as_bytes(), &mut output, false)
            .await
            .unwrap();
        assert_eq!(served, 3);

        let text = String::from_utf8(output).unwrap();
        let responses: Vec<Response> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(responses.len(), 3);
        assert!(!responses[0].is_error());
        assert!(responses[0].cwd.is_some());
        assert!(responses[1].is_error());
        assert!(responses[2].is_error());
    }

    #[tokio::test]
    async fn test_stdio_handles_are_available() {
        // Both handles come from tokio's io-std feature.
        let _stdin = BufReader::new(tokio::io::stdin());
        let mut stdout = tokio::io::stdout();
        stdout.flush().await.unwrap();
    }
}

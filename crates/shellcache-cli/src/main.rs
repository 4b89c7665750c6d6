//! shellcache - drive the caching gateway from the command line.
//!
//! Each invocation plays one host event against a disk-backed cache, so
//! the gateway's behavior can be inspected without a browser: install and
//! activate a version, fetch through it, replay queued mutations, preload
//! resources or simulate a push.

mod host;
mod settings;

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use shellcache_core::{
    CacheStorage, CachedResponse, CachingGateway, ControlMessage, DiskStorage, FetchOutcome,
    HttpNetwork, MessageReply, Method, Network, Request,
};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use host::TerminalHost;
use settings::Settings;

const USAGE: &str = "\
Usage: shellcache <command> [args]

Commands:
  install                       Precache the app shell for the configured version
  activate                      Purge partitions left by other versions
  fetch <url> [options]         Resolve a request through the gateway
      --method <METHOD>         HTTP method (default GET)
      --accept <TYPE>           Accept header
      --body <TEXT>             Request body
  sync [tag]                    Replay queued mutations (default tag: background-sync)
  preload <path>...             Fetch resources into the static partition
  push [json]                   Show a notification from a push payload
  partitions                    List cache partitions and entry counts

Configuration: ~/.config/shellcache/config.json, or SHELLCACHE_ORIGIN,
SHELLCACHE_VERSION, SHELLCACHE_CACHE_DIR, SHELLCACHE_LOG_DIR.
Log level: RUST_LOG (default warn).";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Install,
    Activate,
    Fetch {
        url: String,
        method: Method,
        accept: Option<String>,
        body: Option<String>,
    },
    Sync {
        tag: String,
    },
    Preload {
        resources: Vec<String>,
    },
    Push {
        payload: Option<String>,
    },
    Partitions,
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(Self::Help);
        };

        match name.as_str() {
            "install" => Ok(Self::Install),
            "activate" => Ok(Self::Activate),
            "fetch" => Self::parse_fetch(rest),
            "sync" => Ok(Self::Sync {
                tag: rest
                    .first()
                    .cloned()
                    .unwrap_or_else(|| shellcache_core::config::SYNC_TAG.to_string()),
            }),
            "preload" => {
                if rest.is_empty() {
                    bail!("preload needs at least one resource path");
                }
                Ok(Self::Preload {
                    resources: rest.to_vec(),
                })
            }
            "push" => Ok(Self::Push {
                payload: rest.first().cloned(),
            }),
            "partitions" => Ok(Self::Partitions),
            "help" | "-h" | "--help" => Ok(Self::Help),
            other => bail!("Unknown command: {other}"),
        }
    }

    fn parse_fetch(args: &[String]) -> Result<Self> {
        let mut url = None;
        let mut method = Method::Get;
        let mut accept = None;
        let mut body = None;

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--method" => {
                    let name = iter.next().context("--method needs a value")?;
                    method = Method::from_name(name)
                        .with_context(|| format!("Unsupported method: {name}"))?;
                }
                "--accept" => accept = Some(iter.next().context("--accept needs a value")?.clone()),
                "--body" => body = Some(iter.next().context("--body needs a value")?.clone()),
                flag if flag.starts_with("--") => bail!("Unknown option: {flag}"),
                _ if url.is_none() => url = Some(arg.clone()),
                extra => bail!("Unexpected argument: {extra}"),
            }
        }

        Ok(Self::Fetch {
            url: url.context("fetch needs a URL")?,
            method,
            accept,
            body,
        })
    }
}

/// Initialize the tracing subscriber. Logs go to stderr, and also to a daily
/// rolling file when `log_dir` is set. The guard must outlive the program.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "shellcache.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();
    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{USAGE}");
        return Ok(());
    }

    let mut settings = Settings::load()?;
    settings.apply_env();
    let _guard = init_tracing(settings.log_dir.as_deref());

    let config = settings.cache_config()?;
    let cache_dir = settings.cache_dir(&config)?;
    info!(origin = %config.origin, version = %config.version, cache_dir = %cache_dir.display(), "shellcache starting");

    let storage = Arc::new(DiskStorage::new(cache_dir)?);
    let network = Arc::new(HttpNetwork::new()?);
    let gateway = CachingGateway::new(config, storage.clone(), network.clone(), Arc::new(TerminalHost));

    let result = run(command, &gateway, storage.as_ref(), network.as_ref()).await;

    // Let background cache writes land before exiting
    gateway.wait_until_idle().await;
    result
}

async fn run(
    command: Command,
    gateway: &CachingGateway,
    storage: &dyn CacheStorage,
    network: &dyn Network,
) -> Result<()> {
    match command {
        Command::Install => {
            let count = gateway.on_install().await?;
            println!("Precached {count} resources into {}", gateway.config().static_name);
        }
        Command::Activate => {
            let purged = gateway.on_activate().await;
            if purged.is_empty() {
                println!("No stale partitions");
            }
            for name in purged {
                println!("Deleted {name}");
            }
        }
        Command::Fetch {
            url,
            method,
            accept,
            body,
        } => {
            let mut request = Request::new(method, gateway.config().resolve(&url)?);
            if let Some(accept) = accept {
                request = request.with_header("accept", accept);
            }
            if let Some(body) = body {
                request = request.with_body(body);
            }

            match gateway.on_fetch(request).await {
                FetchOutcome::Responded(response) => print_response(&response)?,
                FetchOutcome::Passthrough(request) => {
                    eprintln!("(not intercepted, sent directly)");
                    print_response(&network.fetch(&request).await?)?;
                }
            }
        }
        Command::Sync { tag } => {
            let report = gateway.on_sync(&tag).await?;
            println!(
                "replayed {}, still queued {}, dropped {}",
                report.replayed, report.failed, report.dropped
            );
        }
        Command::Preload { resources } => {
            let reply = gateway
                .on_message(ControlMessage::PreloadResources { resources })
                .await?;
            if let MessageReply::Preloaded(report) = reply {
                println!("stored {}, failed {}", report.stored, report.failed);
            }
        }
        Command::Push { payload } => {
            let notification = gateway.on_push(payload.as_deref().map(str::as_bytes)).await?;
            gateway.on_notification_click(&notification).await?;
        }
        Command::Partitions => {
            let config = gateway.config();
            for name in storage.names().await? {
                let count = storage.keys(&name).await?.len();
                let marker = if config.current_partitions().contains(&name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {name} ({count} entries)");
            }
        }
        Command::Help => println!("{USAGE}"),
    }
    Ok(())
}

/// Status line and headers to stderr, body to stdout
fn print_response(response: &CachedResponse) -> Result<()> {
    eprintln!("{} {}", response.status, response.status_text());
    for (name, value) in &response.headers {
        eprintln!("{name}: {value}");
    }
    let mut stdout = io::stdout().lock();
    stdout.write_all(&response.body)?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_no_args_is_help() {
        assert_eq!(Command::parse(&[]).unwrap(), Command::Help);
    }

    #[test]
    fn test_parse_fetch_options() {
        let cmd = Command::parse(&args(&[
            "fetch", "/api/items", "--method", "post", "--body", "{}", "--accept", "application/json",
        ]))
        .unwrap();
        assert_eq!(
            cmd,
            Command::Fetch {
                url: "/api/items".to_string(),
                method: Method::Post,
                accept: Some("application/json".to_string()),
                body: Some("{}".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_fetch_errors() {
        assert!(Command::parse(&args(&["fetch"])).is_err());
        assert!(Command::parse(&args(&["fetch", "/", "--method"])).is_err());
        assert!(Command::parse(&args(&["fetch", "/", "--method", "BREW"])).is_err());
        assert!(Command::parse(&args(&["fetch", "/", "/other"])).is_err());
        assert!(Command::parse(&args(&["fetch", "/", "--verbose"])).is_err());
    }

    #[test]
    fn test_parse_sync_defaults_tag() {
        assert_eq!(
            Command::parse(&args(&["sync"])).unwrap(),
            Command::Sync {
                tag: "background-sync".to_string()
            }
        );
    }

    #[test]
    fn test_parse_preload_and_unknown() {
        assert!(Command::parse(&args(&["preload"])).is_err());
        assert_eq!(
            Command::parse(&args(&["preload", "/a", "/b"])).unwrap(),
            Command::Preload {
                resources: vec!["/a".to_string(), "/b".to_string()]
            }
        );
        assert!(Command::parse(&args(&["bogus"])).is_err());
    }
}

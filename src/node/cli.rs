use clap::{Parser, Subcommand};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::node::config::ServiceConfig;
use crate::node::Node;
use crate::rpc::ScanResponse;
use crate::scan::{parse_cursor, CallbackRegistry, CursorPolicy, ScanEngine, ScanRequest};
use crate::utils::init_logging;

/// Glob-scan a key-value store and apply callbacks to every matched key.
#[derive(Parser)]
#[clap(name = "keyscan", version)]
pub struct Cli {
    /// Path to the TOML config file
    #[clap(long, global = true, env = "KEYSCAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset (overrides the config file)
    #[clap(long, global = true)]
    pub log_level: Option<String>,

    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Serve the configured scan endpoints over HTTP
    Serve {
        /// bind address (host:port)
        #[clap(long, env = "KEYSCAN_LISTEN")]
        listen: Option<String>,
    },
    /// Run one scan against the configured store and print the JSON response
    Scan {
        /// glob pattern evaluated by the store
        #[clap(long)]
        pattern: String,

        /// cursor from a previous response; 0 starts over
        #[clap(long, default_value = "0")]
        cursor: String,

        /// callback identifier to apply per key (repeatable)
        #[clap(long = "callback")]
        callbacks: Vec<String>,
    },
    /// List the built-in callback identifiers
    Callbacks,
    /// Load and validate the config, then exit
    CheckConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<ServiceConfig> {
    let mut cfg = match path {
        Some(p) => ServiceConfig::load(p)?,
        None => ServiceConfig::default(),
    };
    cfg.apply_env();
    Ok(cfg)
}

/// One-off scan with the built-in callbacks. A malformed cursor is an error here.
async fn scan_once(
    cfg: &ServiceConfig,
    pattern: &str,
    cursor: &str,
    callbacks: &[String],
    cancel: CancellationToken,
) -> crate::utils::Result<ScanResponse> {
    let cursor = parse_cursor(Some(cursor), CursorPolicy::Reject)?;
    let store = crate::store::open(&cfg.store).await?;
    let engine = ScanEngine::new(Arc::new(CallbackRegistry::with_builtins()), cfg.store.page_hint);

    let req = ScanRequest::new(pattern, cursor, store.as_ref())
        .with_callbacks(callbacks)
        .with_cancel(cancel);
    let out = engine.scan(req).await?;
    Ok(ScanResponse { keys: out.keys, cursor: out.cursor })
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    let mut cfg = load_config(cli.config.as_ref())?;
    if let Some(level) = &cli.log_level {
        cfg.log_level = level.clone();
    }
    init_logging(&cfg.log_level);

    match cli.cmd {
        Cmd::Serve { listen } => {
            if let Some(l) = listen {
                cfg.listen = l;
            }
            let node = Node::new(cfg);
            let svc = node.start().await?;
            // Wait for Ctrl+C
            tokio::signal::ctrl_c().await?;
            println!("Shutting down keyscan...");
            svc.shutdown().await?;
            println!("keyscan stopped");
            Ok(())
        }
        Cmd::Scan { pattern, cursor, callbacks } => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let body = scan_once(&cfg, &pattern, &cursor, &callbacks, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(())
        }
        Cmd::Callbacks => {
            for id in CallbackRegistry::with_builtins().identifiers() {
                println!("{}", id);
            }
            Ok(())
        }
        Cmd::CheckConfig => {
            let warnings = cfg.validate(&CallbackRegistry::with_builtins())?;
            for w in &warnings {
                println!("warning: {}", w);
            }
            println!("config ok: {} endpoint(s), store engine {:?}", cfg.endpoints.len(), cfg.store.engine);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_scan_with_repeated_callbacks() {
        let cli = Cli::try_parse_from([
            "keyscan", "scan", "--pattern", "user:*", "--callback", "log", "--callback", "touch",
        ])
        .unwrap();
        match cli.cmd {
            Cmd::Scan { pattern, cursor, callbacks } => {
                assert_eq!(pattern, "user:*");
                assert_eq!(cursor, "0");
                assert_eq!(callbacks, vec!["log".to_string(), "touch".to_string()]);
            }
            _ => panic!("expected scan subcommand"),
        }
    }

    #[tokio::test]
    async fn test_scan_once_unlinks_matches() {
        let mut cfg = ServiceConfig::default();
        cfg.store.seed = vec!["tmp:1".into(), "tmp:2".into(), "keep:1".into()];
        let cbs = vec!["unlink".to_string()];

        let body = scan_once(&cfg, "tmp:*", "0", &cbs, CancellationToken::new()).await.unwrap();
        assert_eq!(body, ScanResponse { keys: vec!["tmp:1".into(), "tmp:2".into()], cursor: 0 });
    }

    #[tokio::test]
    async fn test_scan_once_rejects_bad_cursor() {
        let cfg = ServiceConfig::default();
        let err = scan_once(&cfg, "*", "nope", &[], CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, crate::utils::KeyscanError::Cursor(_)));
    }
}

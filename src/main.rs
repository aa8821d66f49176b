#![forbid(unsafe_code)]

//! `securitybot` server binary.
//!
//! Loads configuration and credentials, opens the task database, connects
//! to Slack, and runs the dispatcher until SIGINT or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use securitybot::audit::writer::JsonlAuditWriter;
use securitybot::audit::AuditLogger;
use securitybot::auth::{DuoAuth, MfaProvider, NullAuth, OktaAuth};
use securitybot::config::{AuthProviderKind, GlobalConfig};
use securitybot::engine::{Dispatcher, EngineContext};
use securitybot::persistence::blacklist::Blacklist;
use securitybot::persistence::db;
use securitybot::persistence::ignore_list::IgnoreList;
use securitybot::persistence::task_repo::SqlTaskStore;
use securitybot::slack::SlackChat;
use securitybot::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "securitybot", about = "Security alert verification bot", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("securitybot bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;

    let pool = Arc::new(db::connect(&config.database_path).await?);
    info!(path = %config.database_path.display(), "database ready");

    let (chat, slack_runtime) = SlackChat::start(&config.slack)?;
    let mfa = build_mfa(&config)?;
    let audit = match config.audit_log_dir {
        Some(ref dir) => {
            let writer: Arc<dyn AuditLogger> = Arc::new(JsonlAuditWriter::new(dir.clone())?);
            Some(writer)
        }
        None => None,
    };

    let ctx = EngineContext::from_config(
        &config,
        Arc::new(chat),
        mfa,
        Arc::new(SqlTaskStore::new(Arc::clone(&pool))),
        IgnoreList::new(Arc::clone(&pool)),
        audit,
    )?;
    let blacklist = Blacklist::load(Arc::clone(&pool)).await?;

    let mut dispatcher = Dispatcher::new(ctx, blacklist, config.task_poll_interval()).await?;
    let recovered = dispatcher.recover(Utc::now()).await?;
    if recovered > 0 {
        info!(recovered, "resumed in-progress tasks");
    }

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_ct.cancel();
    });

    dispatcher.run(config.tick_interval(), ct).await;

    slack_runtime.abort();
    pool.close().await;
    info!(
        active = dispatcher.active_sessions(),
        "securitybot shut down"
    );
    Ok(())
}

fn build_mfa(config: &GlobalConfig) -> Result<Arc<dyn MfaProvider>> {
    let auth = &config.auth;
    match auth.provider {
        AuthProviderKind::Okta => {
            let okta = auth.okta.as_ref().ok_or_else(|| {
                AppError::Config("auth.provider = \"okta\" requires an [auth.okta] table".into())
            })?;
            info!(endpoint = %okta.endpoint, "using okta push");
            Ok(Arc::new(OktaAuth::new(okta)?))
        }
        AuthProviderKind::Duo => {
            let duo = auth.duo.as_ref().ok_or_else(|| {
                AppError::Config("auth.provider = \"duo\" requires an [auth.duo] table".into())
            })?;
            info!(host = %duo.api_host, "using duo push");
            Ok(Arc::new(DuoAuth::new(duo)?))
        }
        AuthProviderKind::Null => {
            warn!("no MFA provider configured; confirmations finish without a push");
            Ok(Arc::new(NullAuth))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}

//! sd-bot - IRC announcer for GitHub webhooks.

use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::Context;
use sd_bot::admin::{Admins, Bot};
use sd_bot::config::{Config, DebugConfig};
use sd_bot::github::Formatter;
use sd_bot::http::{router, run_http_server};
use sd_bot::identity::IdentityResolver;
use sd_bot::network::Connection;
use sd_bot::persist::State;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "settings.toml".to_string());

    // The [debug] section shapes the subscriber, so the config is read
    // first; a load failure is reported once logging is up.
    let config = Config::load(&config_path);
    let debug = config
        .as_ref()
        .map(|config| config.debug.clone())
        .unwrap_or_default();
    init_tracing(&debug)?;

    let config = config.map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        addr = %config.irc.addr,
        nick = %config.irc.nick,
        channel = %config.irc.channel_name(),
        "Starting sd-bot"
    );

    let mut bootstrap = Admins::new();
    if !config.admin.bootstrap.is_empty() {
        bootstrap.insert(config.admin.bootstrap.clone());
    }
    let admins = State::open(&config.admin.state, bootstrap).map_err(|e| {
        error!(path = %config.admin.state.display(), error = %e, "Failed to load admin state");
        e
    })?;
    info!(count = admins.lock().len(), "Loaded admin set");

    let shutdown = CancellationToken::new();
    let connection = Connection::new(config.irc.clone());
    let client = connection.client();

    let identity = Arc::new(IdentityResolver::new());
    let sweeper = identity.spawn_sweeper(shutdown.clone());

    let bot = Arc::new(Bot::new(
        Arc::clone(&identity),
        Arc::new(admins),
        &config.nickserv,
    ));

    let app = router(
        &config.github.route(),
        client,
        Formatter::new(config.github.templates.clone()),
    );
    let http = {
        let shutdown = shutdown.clone();
        let addr = config.website.addr;
        tokio::spawn(async move {
            if let Err(e) = run_http_server(addr, app, shutdown.clone()).await {
                error!(addr = %addr, error = %e, "Webhook listener failed");
                shutdown.cancel();
            }
        })
    };

    let link = tokio::spawn(connection.run(bot, shutdown.clone()));

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutting down");
        }
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();

    let _ = tokio::join!(link, http, sweeper);
    info!("Stopped");
    Ok(())
}

/// EnvFilter from `RUST_LOG`, else info (debug when enabled); stderr unless
/// a log file is configured.
fn init_tracing(debug: &DebugConfig) -> anyhow::Result<()> {
    let level = if debug.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let Some(path) = debug.log_path() else {
        builder.init();
        return Ok(());
    };
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    builder.with_ansi(false).with_writer(Arc::new(file)).init();
    Ok(())
}

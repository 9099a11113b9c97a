use anyhow::{bail, Context, Result};
use lib_checkin::CheckinSyncClient;
use std::path::PathBuf;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

mod monitor_logic;
use monitor_logic::{config, logger, printer};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Explicitly install the default crypto provider for rustls
    let _ = rustls::crypto::ring::default_provider().install_default();

    let (config, file_status) = config::load_config();
    let log_dir = config.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"));
    let log_level = config.log_level.clone().unwrap_or_else(|| "info".to_string());
    logger::setup_logging(&log_dir, &log_level)?;
    file_status.log();

    let Some(user_id) = config.user_id.clone() else {
        bail!("no user id given; pass --user-id or set CHECKIN_USER_ID");
    };
    if config.children.is_empty() && config.services.is_empty() {
        log::warn!("No --child or --service given; only connection state will be shown.");
    }

    let client = CheckinSyncClient::new(config.sync_config()).context("invalid sync configuration")?;

    // Attach every stream before connecting so nothing is missed
    let mut states = client.subscribe_connection_state();
    let mut children = client.child_status_updates();
    let mut services = client.service_status_updates();
    let mut notifications = client.notifications();

    for child_id in &config.children {
        client.subscribe_to_child(child_id)?;
    }
    for service_id in &config.services {
        client.subscribe_to_service(service_id)?;
    }

    client.connect(&user_id).await?;
    log::info!("Watching {} child(ren) and {} service(s) for user {}", config.children.len(), config.services.len(), user_id);

    let mut term_signal = terminate_signal()?;

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                log::info!("Ctrl-C received, initiating shutdown.");
                break;
            }
            _ = term_signal.recv() => {
                log::info!("SIGTERM received, initiating shutdown.");
                break;
            }
            state = states.recv() => match state {
                Ok(state) => println!("{}", printer::state_line(&state)),
                Err(e) => if !report_lag("connection state", e) { break },
            },
            update = children.recv() => match update {
                Ok(update) => println!("{}", printer::child_line(&update)),
                Err(e) => if !report_lag("child updates", e) { break },
            },
            update = services.recv() => match update {
                Ok(update) => println!("{}", printer::service_line(&update)),
                Err(e) => if !report_lag("service updates", e) { break },
            },
            notification = notifications.recv() => match notification {
                Ok(notification) => println!("{}", printer::notification_line(&notification)),
                Err(e) => if !report_lag("notifications", e) { break },
            },
        }
    }

    client.close().await;
    log::info!("Shutdown complete.");
    Ok(())
}

/// Logs a lagged receiver and returns whether the stream is still usable.
fn report_lag(stream: &str, e: RecvError) -> bool {
    match e {
        RecvError::Lagged(skipped) => {
            log::warn!("Terminal fell behind on {}; skipped {} event(s)", stream, skipped);
            true
        }
        RecvError::Closed => false,
    }
}

#[cfg(unix)]
struct TerminateSignal(signal::unix::Signal);

#[cfg(unix)]
impl TerminateSignal {
    async fn recv(&mut self) {
        self.0.recv().await;
    }
}

#[cfg(unix)]
fn terminate_signal() -> Result<TerminateSignal> {
    let signal = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;
    Ok(TerminateSignal(signal))
}

// On non-unix platforms, just wait forever.
#[cfg(not(unix))]
struct TerminateSignal;

#[cfg(not(unix))]
impl TerminateSignal {
    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

#[cfg(not(unix))]
fn terminate_signal() -> Result<TerminateSignal> {
    Ok(TerminateSignal)
}

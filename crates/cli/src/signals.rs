#![forbid(unsafe_code)]

use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::debug;

/// What the daemon was asked to do from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalEvent {
    /// `SIGHUP`: re-read the configuration files.
    ReloadConfig,
    /// `SIGUSR1`: log the configuration and reclaim statistics.
    DumpStatus,
    /// `SIGINT` or `SIGTERM`.
    Shutdown,
}

/// Forward process signals as [`SignalEvent`]s until shutdown is requested
/// or the receiver goes away.
pub async fn wait_for_signal(tx: mpsc::Sender<SignalEvent>) -> anyhow::Result<()> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut user1 = signal(SignalKind::user_defined1())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    loop {
        let event = tokio::select! {
            _ = hangup.recv() => SignalEvent::ReloadConfig,
            _ = user1.recv() => SignalEvent::DumpStatus,
            _ = interrupt.recv() => SignalEvent::Shutdown,
            _ = terminate.recv() => SignalEvent::Shutdown,
        };
        debug!(?event, "received signal");

        if tx.send(event).await.is_err() || event == SignalEvent::Shutdown {
            break;
        }
    }
    Ok(())
}

//! SIGINT/SIGTERM/SIGQUIT handling: the process listens in its own task and
//! drives the same shutdown path a library caller would trigger manually,
//! so there is only one shutdown sequence to reason about.

use tokio::signal;

/// Waits for the first shutdown-worthy signal, then returns. The caller is
/// expected to run its cleanup and exit afterwards.
#[tracing::instrument(skip_all)]
pub async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{self, SignalKind};

        let mut term = unix::signal(SignalKind::terminate()).expect("SIGTERM handler");
        let mut quit = unix::signal(SignalKind::quit()).expect("SIGQUIT handler");
        tokio::select! {
            _ = signal::ctrl_c() => tracing::warn!("received SIGINT"),
            _ = term.recv() => tracing::warn!("received SIGTERM"),
            _ = quit.recv() => tracing::warn!("received SIGQUIT"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = signal::ctrl_c().await;
        tracing::warn!("received Ctrl+C");
    }
}

/// Releases every lock this process owns and closes all live upstream
/// sockets. Called once, from the shutdown path in `main`.
pub async fn shutdown(supervisor: &crate::supervisor::Supervisor) {
    crate::global::begin_shutdown();
    supervisor.close_all_sockets().await;
    if let Err(err) = wagate_data::locks::release_all(&crate::global::OWNER_ID) {
        tracing::error!(error = %err, "failed to release session locks during shutdown");
    }
}

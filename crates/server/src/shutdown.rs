//! Stops the scheduler on Ctrl-C or, on Unix, SIGTERM.

use std::io;

use tokio::signal;
use tokio::sync::broadcast;

/// Tells subscribed tasks when the process has been asked to stop.
pub struct Shutdown {
    notify: broadcast::Sender<()>,
}

impl Default for Shutdown {
    fn default() -> Self {
        let (notify, _) = broadcast::channel(1);
        Self { notify }
    }
}

impl Shutdown {
    /// A receiver that fires once shutdown begins.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.notify.subscribe()
    }

    /// Wait for a stop signal, then notify every subscriber.
    ///
    /// # Errors
    ///
    /// Returns an error if a signal handler cannot be installed.
    pub async fn on_signal(self) -> io::Result<()> {
        let name = wait().await?;
        tracing::info!(signal = name, "stopping renewal");

        // no receivers left means the scheduler has already exited
        let _ = self.notify.send(());
        Ok(())
    }
}

#[cfg(unix)]
async fn wait() -> io::Result<&'static str> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait() -> io::Result<&'static str> {
    signal::ctrl_c().await.map(|()| "ctrl-c")
}

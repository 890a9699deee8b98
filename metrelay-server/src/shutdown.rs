use tokio::sync::watch;

/// Notifies services that the process is shutting down.
///
/// Cloned handles share the same signal. Once [`Shutdown::trigger`] is called, every pending and
/// future call to [`ShutdownHandle::notified`] completes.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Shutdown {
    /// Creates a new, untriggered shutdown signal.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Returns a handle that waits for the shutdown signal.
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.sender.subscribe())
    }

    /// Signals all handles.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for a [`Shutdown`] to be triggered.
#[derive(Clone, Debug)]
pub struct ShutdownHandle(watch::Receiver<bool>);

impl ShutdownHandle {
    /// Completes once shutdown has been triggered.
    ///
    /// Also completes if the [`Shutdown`] was dropped.
    pub async fn notified(&mut self) {
        let _ = self.0.wait_for(|triggered| *triggered).await;
    }
}

/// Completes when the process receives `SIGINT` or, on unix, `SIGTERM`.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            metrelay_log::error!("failed to listen for ctrl-c: {error}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                metrelay_log::error!("failed to listen for SIGTERM: {error}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => metrelay_log::info!("received SIGINT"),
        _ = terminate => metrelay_log::info!("received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_trigger_notifies_all_handles() {
        let shutdown = Shutdown::new();
        let mut first = shutdown.handle();
        let mut second = first.clone();

        let waiter = tokio::spawn(async move { first.notified().await });
        shutdown.trigger();

        waiter.await.unwrap();
        second.notified().await;
    }

    #[tokio::test]
    async fn test_pending_until_triggered() {
        let shutdown = Shutdown::new();
        let mut handle = shutdown.handle();

        let result = tokio::time::timeout(Duration::from_millis(10), handle.notified()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_late_handle_sees_trigger() {
        let shutdown = Shutdown::new();
        shutdown.trigger();
        shutdown.handle().notified().await;
    }
}

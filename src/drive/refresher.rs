use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::service::TokenService;

/// Background task refreshing the drive token on a fixed interval.
pub struct RefreshTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RefreshTask {
    /// Stop the task and wait for an in-flight refresh to finish.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.handle.await {
            warn!(error = %err, "drive token refresher terminated abnormally");
        }
    }
}

/// Refresh immediately, then once per `interval`. Failures are logged and
/// retried on the next tick.
pub fn spawn_refresher(service: Arc<TokenService>, interval: Duration) -> RefreshTask {
    let (stop, mut stopped) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = stopped.changed() => break,
            }

            match service.refresh().await {
                Ok(Some(token)) => debug!(expires_at = %token.expires_at, "drive token refreshed"),
                Ok(None) => debug!("no drive account bound; refresh skipped"),
                Err(err) => warn!(error = %err, "drive token refresh failed"),
            }
        }
    });

    RefreshTask { stop, handle }
}

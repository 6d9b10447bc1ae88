use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::error::QueryError;
use crate::k8s;

pub const DEFAULT_CONTEXT_POLL: Duration = Duration::from_secs(5);

/// Background task that polls the active kubeconfig context and reports
/// changes. The task is aborted by `stop` or when the watcher is dropped.
pub struct ContextWatcher {
    handle: JoinHandle<()>,
}

impl ContextWatcher {
    pub fn start(
        kubeconfig_path: Option<PathBuf>,
        initial: String,
        period: Duration,
        tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        Self::start_with(
            move || k8s::current_context(kubeconfig_path.as_deref()),
            initial,
            period,
            tx,
        )
    }

    fn start_with<F>(
        read_context: F,
        initial: String,
        period: Duration,
        tx: mpsc::UnboundedSender<String>,
    ) -> Self
    where
        F: Fn() -> Result<String, QueryError> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // the first tick completes immediately
            ticker.tick().await;

            let mut current = initial;
            loop {
                ticker.tick().await;
                match read_context() {
                    Ok(context) if context != current => {
                        debug!("context changed from {current} to {context}");
                        current = context.clone();
                        if tx.send(context).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(error) => warn!("failed to reread kubeconfig context: {error}"),
                }
            }
        });

        Self { handle }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for ContextWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::ContextWatcher;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;
    use tokio::time::{Duration, sleep, timeout};

    #[tokio::test]
    async fn reports_only_changed_contexts() {
        let shared = Arc::new(Mutex::new("dev".to_string()));
        let reader = {
            let shared = Arc::clone(&shared);
            move || Ok(shared.lock().unwrap().clone())
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher =
            ContextWatcher::start_with(reader, "dev".to_string(), Duration::from_millis(10), tx);

        sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());

        *shared.lock().unwrap() = "prod".to_string();
        let changed = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(changed.as_deref(), Some("prod"));

        sleep(Duration::from_millis(40)).await;
        assert!(rx.try_recv().is_err());
        watcher.stop();
    }

    #[tokio::test]
    async fn stopping_aborts_the_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watcher = ContextWatcher::start_with(
            || Ok("dev".to_string()),
            "dev".to_string(),
            Duration::from_millis(10),
            tx,
        );
        watcher.stop();

        let closed = timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(closed, None);
    }
}

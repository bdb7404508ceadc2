use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::RunnerLifecycle;
use super::activity::ActivityTracker;
use crate::model::RunnerError;

/// Background loop that deletes runners idle longer than the inactivity
/// threshold. Only runners that were exercised at least once are tracked;
/// pods already in a terminal state are purged from tracking but never
/// re-deleted.
pub struct Reaper {
    service: Arc<dyn RunnerLifecycle>,
    activity: Arc<ActivityTracker>,
    scan_interval: Duration,
    inactive_timeout: Duration,
}

/// Owner of the reaper's stop channel; stopping consumes the handle so the
/// channel is closed exactly once.
pub struct ReaperHandle {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

impl Reaper {
    pub fn new(
        service: Arc<dyn RunnerLifecycle>,
        activity: Arc<ActivityTracker>,
        scan_interval: Duration,
        inactive_timeout: Duration,
    ) -> Self {
        Self {
            service,
            activity,
            scan_interval,
            inactive_timeout,
        }
    }

    pub fn spawn(self) -> ReaperHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        ReaperHandle { stop_tx, task }
    }

    async fn run(self, mut stop_rx: oneshot::Receiver<()>) {
        info!(
            scan_interval_secs = self.scan_interval.as_secs(),
            inactive_timeout_secs = self.inactive_timeout.as_secs(),
            "starting reaper"
        );
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.scan_interval,
            self.scan_interval,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = &mut stop_rx => {
                    info!("reaper stopped");
                    return;
                }
            }
        }
    }

    async fn sweep(&self) {
        let initial_tracked = self.activity.tracked().len();
        let inactive = self.activity.inactive(self.inactive_timeout);
        info!(
            total_tracked = initial_tracked,
            inactive_found = inactive.len(),
            "reaper scan"
        );
        if inactive.is_empty() {
            return;
        }

        let mut deletes_succeeded = 0usize;
        let mut stopped_already = 0usize;
        let mut delete_failed = 0usize;

        for runner_id in &inactive {
            match self.service.get_runner(runner_id).await {
                Err(RunnerError::NotFound(_)) => {
                    // Already gone (user delete or external cleanup); just
                    // forget about it.
                    self.activity.remove(runner_id);
                    stopped_already += 1;
                }
                Err(e) => {
                    delete_failed += 1;
                    error!(%runner_id, error = %e, "failed to look up inactive runner");
                }
                Ok(runner) if runner.state.is_terminal() => {
                    // The cluster has terminalised the pod; never re-delete.
                    self.activity.remove(runner_id);
                    stopped_already += 1;
                }
                Ok(runner) => {
                    match self.service.delete_runner(runner_id).await {
                        Ok(()) => {
                            self.activity.remove(runner_id);
                            deletes_succeeded += 1;
                            info!(%runner_id, state = runner.state.as_str(), "reaped inactive runner");
                        }
                        Err(e) => {
                            // Keep the entry; the next tick retries.
                            delete_failed += 1;
                            error!(%runner_id, error = %e, "failed to delete inactive runner");
                        }
                    }
                }
            }
        }

        info!(
            initial_tracked,
            inactive_found = inactive.len(),
            deletes_succeeded,
            stopped_already,
            delete_failed,
            remaining_tracked = self.activity.tracked().len(),
            "reaper cycle completed"
        );
    }
}

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{Scheduler, SchedulerState};

/// Worker group handle.
/// - `request_shutdown()` で新しい claim を止める
/// - `shutdown_and_join()` で実行中の task の終了まで待つ
pub struct WorkerGroup {
    scheduler: Arc<Scheduler>,
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub(super) fn spawn(scheduler: Arc<Scheduler>, n: usize) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let s = Arc::clone(&scheduler);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(worker_loop(worker_id, s, rx)));
        }

        Self {
            scheduler,
            shutdown_tx,
            joins,
        }
    }

    pub fn workers(&self) -> usize {
        self.joins.len()
    }

    /// Stops workers from claiming new tasks. Steps already running are not
    /// interrupted.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(e) = join.await {
                error!(error = %e, "worker exited abnormally");
            }
        }
        self.scheduler.set_state(SchedulerState::Stopped);
        info!("scheduler stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    scheduler: Arc<Scheduler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        // shutdown が来ていたら抜ける
        if *shutdown_rx.borrow() {
            break;
        }

        // claim は select の外で行う（途中で cancel されると Running のまま浮くため）
        match scheduler.try_claim().await {
            Ok(Some(id)) => {
                scheduler.execute(worker_id, id).await;
                continue;
            }
            Ok(None) => {}
            Err(e) => error!(worker_id, error = %e, "claim failed"),
        }

        // 何もなければ wake / poll tick / shutdown のどれかを待つ
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = scheduler.notify.notified() => {}
            _ = tokio::time::sleep(scheduler.config.poll_interval) => {}
        }
    }
    debug!(worker_id, "worker exited");
}

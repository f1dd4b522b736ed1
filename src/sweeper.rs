use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, interval_at};
use tracing::{debug, info};

use crate::metrics::RATE_LIMIT_ENTRIES;
use crate::rate_limit::RateLimiter;

// Owns the background sweep task, stop it with `shutdown`
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

pub fn spawn(limiter: Arc<RateLimiter>, every: Duration) -> SweeperHandle {
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(sweeper(limiter, every, rx));
    SweeperHandle { shutdown, task }
}

// Sweep function - runs every `every` until shutdown
async fn sweeper(limiter: Arc<RateLimiter>, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + every, every);

    info!(interval = ?every, "rate limit sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.sweep_at(Instant::now().into_std());
                RATE_LIMIT_ENTRIES.set(limiter.len() as f64);
                if removed > 0 {
                    debug!(removed, remaining = limiter.len(), "swept expired rate limit windows");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("rate limit sweeper stopped");
}

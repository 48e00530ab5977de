//! Periodic forced-refresh scheduling.
//!
//! Evaluates the configured cron expression on a coarse tick and runs a
//! forced refresh cycle when one is due. The cycle runs to completion
//! inside the scheduler task, so triggers can never overlap; a trigger
//! that falls due while a cycle is still running is picked up by the
//! next tick and then skipped by the orchestrator's cycle lock.

use anyhow::{Context, Result};
use chrono::Utc;
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use super::IngestorService;

pub struct SchedulerService {
    ingestor: Arc<IngestorService>,
    schedule: Schedule,
    shutdown_rx: watch::Receiver<bool>,
}

/// Handle to a running scheduler; dropping it also disarms the task.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Disarm the periodic refresh.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for the scheduler task to wind down.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
    }
}

/// Arm the periodic forced-refresh callback.
pub fn schedule_refresh(
    ingestor: Arc<IngestorService>,
    update_cron: &str,
) -> Result<SchedulerHandle> {
    let schedule = Schedule::from_str(update_cron)
        .with_context(|| format!("invalid cron expression '{}'", update_cron))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = SchedulerService {
        ingestor,
        schedule,
        shutdown_rx,
    };
    let task = tokio::spawn(service.run());

    Ok(SchedulerHandle { shutdown_tx, task })
}

impl SchedulerService {
    async fn run(mut self) {
        if let Some(next_time) = self.schedule.upcoming(Utc).next() {
            info!(
                "Scheduler armed - next guide refresh: {}",
                next_time.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        let mut interval = interval(Duration::from_secs(1));
        let mut last_run = Utc::now();

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let due = self
                        .schedule
                        .after(&last_run)
                        .next()
                        .map(|next_time| Utc::now() >= next_time)
                        .unwrap_or(false);

                    if due {
                        info!("Scheduled refresh due, starting forced cycle");
                        self.ingestor.refresh(true).await;
                        last_run = Utc::now();

                        if let Some(next_time) = self.schedule.upcoming(Utc).next() {
                            info!(
                                "Scheduled refresh completed - next update: {}",
                                next_time.format("%Y-%m-%d %H:%M:%S UTC")
                            );
                        }
                    }
                }
                _ = self.shutdown_rx.changed() => {
                    info!("Scheduler disarmed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_expression_validation() {
        assert!(Schedule::from_str("0 0 */12 * * *").is_ok());
        assert!(Schedule::from_str("every twelve hours").is_err());
    }

    #[test]
    fn test_schedule_yields_future_run_times() {
        let schedule = Schedule::from_str("0 0 */12 * * *").unwrap();
        let now = Utc::now();
        let next = schedule.after(&now).next().unwrap();
        assert!(next > now);
    }
}

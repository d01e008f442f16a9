//! Scheduler - re-runs the mirror engine on a fixed delay
//!
//! The first run starts immediately. Between runs the scheduler sleeps for the
//! configured delay and stops early on Ctrl+C or SIGTERM. A run is never
//! interrupted once started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::discovery::SourceApi;
use crate::error::MirrorError;
use crate::gitea::DestinationApi;
use crate::sync::{MirrorEngine, RunSummary};

/// Counters kept across runs of one process
#[derive(Debug, Clone, Default)]
pub struct SchedulerStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub last_run: Option<Instant>,
}

/// Periodic driver around a [`MirrorEngine`]
pub struct Scheduler<S, D> {
    engine: MirrorEngine<S, D>,
    delay: Duration,
    single_run: bool,
    shutdown_sender: broadcast::Sender<()>,
    is_running: Arc<AtomicBool>,
    stats: SchedulerStats,
}

impl<S, D> Scheduler<S, D>
where
    S: SourceApi,
    D: DestinationApi,
{
    /// Take delay and single-run mode from the engine's configuration
    pub fn new(engine: MirrorEngine<S, D>) -> Self {
        let schedule = &engine.config().schedule;
        let delay = Duration::from_secs(schedule.delay);
        let single_run = schedule.single_run;
        let (shutdown_sender, _) = broadcast::channel(1);

        Self {
            engine,
            delay,
            single_run,
            shutdown_sender,
            is_running: Arc::new(AtomicBool::new(false)),
            stats: SchedulerStats::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_single_run(mut self, single_run: bool) -> Self {
        self.single_run = single_run;
        self
    }

    pub fn engine(&self) -> &MirrorEngine<S, D> {
        &self.engine
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Handle that stops the loop before the next run when sent to
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Run until shut down by a signal, or once in single-run mode
    pub async fn run(&mut self) -> Result<(), MirrorError> {
        let shutdown_sender = self.shutdown_sender.clone();
        let is_running = self.is_running.clone();
        tokio::spawn(async move {
            wait_for_shutdown_signal().await;
            info!("Shutdown signal received, stopping after the current run...");
            is_running.store(false, Ordering::SeqCst);
            let _ = shutdown_sender.send(());
        });

        self.run_loop().await
    }

    /// Scheduler loop without installing signal handlers
    pub async fn run_loop(&mut self) -> Result<(), MirrorError> {
        let mut shutdown_receiver = self.shutdown_sender.subscribe();
        self.is_running.store(true, Ordering::SeqCst);

        if self.single_run {
            info!("Running a single mirror pass");
        } else {
            info!("Scheduler started with delay: {:?}", self.delay);
        }

        loop {
            debug!("Starting scheduled mirror run");
            let result = self.engine.run_once().await;
            self.stats.total_runs += 1;
            self.stats.last_run = Some(Instant::now());

            match result {
                Ok(summary) => {
                    self.stats.successful_runs += 1;
                    log_run_success(&summary);
                }
                Err(e) => {
                    self.stats.failed_runs += 1;
                    if self.single_run {
                        self.is_running.store(false, Ordering::SeqCst);
                        return Err(e);
                    }
                    error!("Mirror run failed: {}", e);
                }
            }

            if self.single_run || !self.is_running.load(Ordering::SeqCst) {
                break;
            }

            info!("Next run in {} seconds", self.delay.as_secs());
            tokio::select! {
                _ = shutdown_receiver.recv() => {
                    info!("Shutdown signal received in scheduler loop");
                    break;
                }
                _ = sleep(self.delay) => {}
            }
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler exiting");
        Ok(())
    }
}

fn log_run_success(summary: &RunSummary) {
    if summary.failed > 0 {
        warn!(
            "Run finished with {} failed repositories out of {}",
            summary.failed, summary.found
        );
    } else {
        debug!("Run finished: {} repositories processed", summary.found);
    }
}

/// Wait for Ctrl+C or, on Unix, SIGTERM
async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => match result {
                        Ok(()) => debug!("Ctrl+C received"),
                        Err(e) => {
                            warn!("Failed to listen for Ctrl+C: {}", e);
                            sigterm.recv().await;
                            debug!("SIGTERM received");
                        }
                    },
                    _ = sigterm.recv() => debug!("SIGTERM received"),
                }
                return;
            }
            Err(e) => warn!("Failed to install SIGTERM handler: {}", e),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("Ctrl+C received"),
        Err(e) => {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_start_empty() {
        let stats = SchedulerStats::default();
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.successful_runs + stats.failed_runs, 0);
        assert!(stats.last_run.is_none());
    }
}

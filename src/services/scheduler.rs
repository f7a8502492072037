// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Recurring background sweep.
//!
//! One pass = inactivity sweep followed by absolute-age eviction. Eviction
//! runs even when the sweep fails. Passes never
//! overlap: a tick (or manual trigger) that arrives while a pass is running is
//! skipped.

use crate::error::AppError;
use crate::services::sessions::{SessionManager, SweepReport};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest interval accepted by [`SweepScheduler::start`].
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Result of one guarded pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassReport {
    pub sweep: SweepReport,
    pub evicted: usize,
}

pub struct SweepScheduler {
    manager: Arc<SessionManager>,
    guard: Arc<Mutex<()>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SweepScheduler {
    /// Create a scheduler. Nothing runs until [`SweepScheduler::start`].
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            manager,
            guard: Arc::new(Mutex::new(())),
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Spawn the recurring task. The first pass runs immediately.
    ///
    /// Calling this on a scheduler that is already running does nothing.
    pub async fn start(&self, interval: Duration) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            tracing::warn!("Sweep scheduler already running");
            return;
        }

        let interval = interval.max(MIN_INTERVAL);
        let manager = self.manager.clone();
        let guard = self.guard.clone();
        let mut shutdown = self.shutdown.subscribe();

        tracing::info!(interval_secs = interval.as_secs(), "Starting sweep scheduler");

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match run_pass(&manager, &guard).await {
                            Ok(_) => {}
                            Err(AppError::Conflict(_)) => {
                                tracing::info!("Previous sweep still running, skipping tick");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "Scheduled sweep failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }

            tracing::info!("Sweep scheduler stopped");
        }));
    }

    /// Run one pass now, unless one is already running (`Conflict`).
    pub async fn run_once(&self) -> Result<PassReport, AppError> {
        run_pass(&self.manager, &self.guard).await
    }

    /// Signal the recurring task to exit and wait for it.
    ///
    /// A pass in progress is allowed to finish.
    pub async fn stop(&self) {
        let Some(handle) = self.task.lock().await.take() else {
            return;
        };

        let _ = self.shutdown.send(true);
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Sweep scheduler task panicked");
        }
        self.shutdown.send_replace(false);
    }
}

async fn run_pass(manager: &SessionManager, guard: &Mutex<()>) -> Result<PassReport, AppError> {
    let Ok(_running) = guard.try_lock() else {
        return Err(AppError::Conflict("A sweep is already running".to_string()));
    };

    // Eviction does not depend on the sweep; a failed sweep is reported after it
    let sweep = manager.sweep().await;
    if let Err(e) = &sweep {
        tracing::warn!(error = %e, "Inactivity sweep failed, still running eviction");
    }
    let evicted = manager.evict_expired().await?;

    Ok(PassReport {
        sweep: sweep?,
        evicted,
    })
}

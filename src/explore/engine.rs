//! Exploration engine
//!
//! Runs one explorer driver for a `(network, explorer)` pair. The start marker
//! is persisted before the driver runs, so a crash leaves a `last_run` without
//! `ended_at` that the next run resumes from.

use crate::config::ExplorationConfig;
use crate::drivers::DriverRegistry;
use crate::explore::context::ExplorationContext;
use crate::fetch::FetchClient;
use crate::model::{ExplorerRunResult, LastRun, QualifiedKey, RunStatus};
use crate::storage::{with_storage, SharedStorage};
use crate::{Result, TidewatchError};
use chrono::Utc;
use std::sync::Arc;

/// Lifecycle of a single run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    NotStarted,
    Running,
    Completed,
    Failed,
}

impl RunPhase {
    /// Moves to `next`, rejecting anything but the forward transitions
    pub fn transition(self, next: RunPhase) -> Result<RunPhase> {
        match (self, next) {
            (Self::NotStarted, Self::Running)
            | (Self::Running, Self::Completed)
            | (Self::Running, Self::Failed) => Ok(next),
            (from, to) => Err(TidewatchError::InvalidTransition { from, to }),
        }
    }
}

/// Runs explorer drivers against persisted run configurations
pub struct ExplorationEngine {
    storage: SharedStorage,
    client: FetchClient,
    registry: Arc<DriverRegistry>,
    config: ExplorationConfig,
}

impl ExplorationEngine {
    pub fn new(
        storage: SharedStorage,
        client: FetchClient,
        registry: Arc<DriverRegistry>,
        config: ExplorationConfig,
    ) -> Self {
        Self {
            storage,
            client,
            registry,
            config,
        }
    }

    /// Runs the explorer addressed by `network:explorer`
    ///
    /// # Returns
    ///
    /// * `Ok(ExplorerRunResult)` - The completed run's result
    /// * `Err(TidewatchError)` - Missing configuration, or the driver failed;
    ///   in the latter case a failed result was already recorded
    pub async fn explore(&self, path: &str) -> Result<ExplorerRunResult> {
        let key = QualifiedKey::parse(path)?;

        let run_config = with_storage(&self.storage, |storage| {
            storage.get_explorer_config(&key.network, &key.key)
        })?
        .ok_or_else(|| TidewatchError::ExplorerConfigNotFound {
            network: key.network.clone(),
            explorer: key.key.clone(),
        })?;

        let explorer = self.registry.explorer(&key.network, &key.key)?;
        let mut ctx = ExplorationContext::new(
            self.storage.clone(),
            self.client.clone(),
            run_config,
            &self.config,
        );

        let mut phase = RunPhase::NotStarted.transition(RunPhase::Running)?;

        let mut start = LastRun::started(Utc::now());
        if let Some(previous) = ctx.previous_run().filter(|run| run.is_incomplete()) {
            tracing::warn!(
                "Last run of {} started at {} did not end well, resuming from {:?}",
                key,
                previous.started_at,
                previous.state_vars
            );
            start.state_vars = previous.state_vars.clone();
        }
        ctx.set_last_run(start)?;

        tracing::info!("Starting explorer {}", key);
        let outcome = explorer.explore(&mut ctx).await;

        let (status, error) = match &outcome {
            Ok(()) => {
                phase = phase.transition(RunPhase::Completed)?;
                (RunStatus::Completed, None)
            }
            Err(e) => {
                phase = phase.transition(RunPhase::Failed)?;
                (RunStatus::Failed, Some(e.to_string()))
            }
        };

        let result = ExplorerRunResult {
            network_key: key.network.clone(),
            explorer_key: key.key.clone(),
            status,
            date: Utc::now(),
            stats: ctx.get_stats(),
            error: error.clone(),
        };

        let flushed = self.finish(&mut ctx, &result);

        match outcome {
            Ok(()) => {
                flushed?;
                tracing::info!("Explorer {} {:?}: {:?}", key, phase, result.stats);
                Ok(result)
            }
            Err(e) => {
                if let Err(flush_error) = flushed {
                    tracing::error!("Unable to record failed run of {}: {}", key, flush_error);
                }
                tracing::error!("Explorer {} {:?}: {}", key, phase, e);
                Err(e)
            }
        }
    }

    /// Persists the end marker, the cache and the run result
    ///
    /// Every write is attempted; the first failure is returned.
    fn finish(&self, ctx: &mut ExplorationContext, result: &ExplorerRunResult) -> Result<()> {
        let mut last_run = ctx
            .last_run()
            .cloned()
            .unwrap_or_else(|| LastRun::started(result.date));
        last_run.ended_at = Some(result.date);
        last_run.error = result.error.clone();

        let marker = ctx.set_last_run(last_run);
        let cache = ctx.persist_cache();
        let appended: Result<()> =
            with_storage(&self.storage, |storage| storage.append_run_result(result))
                .map_err(Into::into);

        for (what, outcome) in [
            ("end marker", &marker),
            ("cache", &cache),
            ("run result", &appended),
        ] {
            if let Err(e) = outcome {
                tracing::error!("Unable to persist {}: {}", what, e);
            }
        }
        marker.and(cache).and(appended)
    }
}

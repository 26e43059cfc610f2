//! Ingestion coordinator - main run orchestration logic
//!
//! This module contains the run loop that coordinates:
//! - Taking the run lease and loading the crawl state
//! - Fetching batches from the active source
//! - Normalizing, deduplicating, validating and queueing each record
//! - Cursor commits, source rotation and periodic checkpoints
//! - The final checkpoint and the run summary
//!
//! Execution is strictly sequential: one record resolves completely before
//! the next one starts.

use crate::config::Config;
use crate::crawler::context::RunContext;
use crate::crawler::rotation::{
    apply_batch, apply_fetch_failure, apply_fetch_overrun, BatchOutcome, Transition,
};
use crate::crawler::scheduler::{Scheduler, StopReason};
use crate::output::RunSummary;
use crate::product::{normalize, validate, RawProduct};
use crate::sources::{FetchBudget, FetchedBatch, SourceSet};
use crate::state::{CrawlState, Cursor, SourceId};
use crate::storage::{open_storage, LeaseOutcome, RunStatus, Storage, Submission};
use crate::{IngestError, Result};
use chrono::Utc;
use std::path::Path;
use std::time::Duration;

/// How a single record was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Accepted,
    Duplicate,
    Rejected,
    Dropped,
    Failed,
}

/// Main ingestion coordinator
pub struct Coordinator<S: Storage> {
    config: Config,
    config_hash: String,
    storage: S,
    sources: SourceSet,
    /// Identifies this process in the run lease
    holder: String,
}

impl<S: Storage> Coordinator<S> {
    /// Creates a new coordinator
    ///
    /// # Arguments
    ///
    /// * `config` - The pipeline configuration
    /// * `config_hash` - Hash of the configuration file, recorded with the run
    /// * `storage` - Crawl-state store, catalog and moderation queue
    /// * `sources` - One fetcher per ring slot
    pub fn new(config: Config, config_hash: String, storage: S, sources: SourceSet) -> Self {
        Self {
            config,
            config_hash,
            storage,
            sources,
            holder: format!("pid-{}@{}", std::process::id(), Utc::now().to_rfc3339()),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Executes one budgeted run
    ///
    /// # Returns
    ///
    /// * `Ok(RunSummary)` - The run ended on a budget or because every source was idle
    /// * `Err(IngestError)` - The lease was refused, the state could not be
    ///   loaded, or the final checkpoint failed (the summary is attached)
    pub async fn run(&mut self) -> Result<RunSummary> {
        let ttl = Duration::from_secs(self.config.run.lease_ttl_secs);
        match self.storage.acquire_lease(&self.holder, ttl) {
            Ok(LeaseOutcome::Acquired) => {
                tracing::debug!(holder = %self.holder, "run lease acquired");
            }
            Ok(LeaseOutcome::HeldBy { holder, expires_at }) => {
                tracing::error!(%holder, %expires_at, "another run holds the lease");
                return Err(IngestError::LeaseHeld { holder, expires_at });
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to acquire run lease");
                return Err(IngestError::Lease(e));
            }
        }

        let result = self.run_leased().await;

        if let Err(e) = self.storage.release_lease(&self.holder) {
            tracing::warn!(error = %e, "failed to release run lease");
        }
        result
    }

    async fn run_leased(&mut self) -> Result<RunSummary> {
        let mut state = self.storage.load_state().map_err(|e| {
            tracing::error!(error = %e, "crawl state store unreachable");
            IngestError::StateLoad(e)
        })?;

        let previous_failure = self.previous_run_failure();
        let run_id = self.storage.create_run(&self.config_hash)?;
        tracing::info!(
            run_id,
            source = %state.current_source,
            cursor = state.cursor(state.current_source),
            total_processed = state.total_processed,
            "starting run"
        );

        let mut ctx = RunContext::new(run_id);
        let mut scheduler = Scheduler::new(&self.config.run);

        let stop_reason = self.crawl_loop(&mut state, &mut ctx, &mut scheduler).await;

        state.last_run_at = Some(Utc::now());
        state.last_error = previous_failure.or_else(|| ctx.last_error.clone());

        let summary = RunSummary {
            run_session_id: run_id,
            counters: ctx.counters,
            per_source_counts: ctx.per_source.clone(),
            rotations: ctx.rotations,
            checkpoint_failures: ctx.checkpoint_failures,
            stop_reason,
            elapsed_ms: scheduler.elapsed().as_millis() as u64,
            final_source: state.current_source,
        };

        if let Err(e) = self.storage.save_state(&state) {
            tracing::error!(error = %e, "final checkpoint failed");
            let reason = format!("final checkpoint failed: {}", e);
            if let Err(e) =
                self.storage
                    .finish_run(run_id, RunStatus::Failed, &summary.counters, Some(&reason))
            {
                tracing::warn!(run_id, error = %e, "failed to record run failure");
            }
            return Err(IngestError::FinalCheckpoint {
                source: e,
                summary: Box::new(summary),
            });
        }

        if let Err(e) = self
            .storage
            .finish_run(run_id, RunStatus::Completed, &summary.counters, None)
        {
            tracing::warn!(run_id, error = %e, "failed to record run completion");
        }

        tracing::info!(
            run_id,
            stop_reason = %summary.stop_reason,
            processed = summary.counters.processed,
            duplicates = summary.counters.duplicates,
            rejected = summary.counters.rejected,
            dropped = summary.counters.dropped,
            errors = summary.counters.errors,
            elapsed_ms = summary.elapsed_ms,
            "run finished"
        );

        Ok(summary)
    }

    /// Fatal condition the previous run left behind, if it did not complete
    ///
    /// A run still marked `running` while this one holds the lease died
    /// without finishing.
    fn previous_run_failure(&self) -> Option<String> {
        match self.storage.get_latest_run() {
            Ok(Some(run)) => match run.status {
                RunStatus::Completed => None,
                RunStatus::Failed => Some(format!(
                    "run {} failed: {}",
                    run.id,
                    run.error.as_deref().unwrap_or("unknown error")
                )),
                RunStatus::Running => Some(format!("run {} never finished", run.id)),
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "cannot read previous run");
                None
            }
        }
    }

    /// Fetches and processes batches until a budget or the idle ring stops the run
    async fn crawl_loop(
        &mut self,
        state: &mut CrawlState,
        ctx: &mut RunContext,
        scheduler: &mut Scheduler,
    ) -> StopReason {
        loop {
            if let Some(reason) = scheduler.stop_reason(ctx.counters.processed) {
                return reason;
            }
            if ctx.ring_idle() {
                tracing::info!(rotations = ctx.rotations, "every source idle, stopping early");
                return StopReason::SourcesIdle;
            }

            let source = state.current_source;
            let cursor = state.cursor(source);
            tracing::debug!(%source, cursor, "fetching batch");

            let budget = FetchBudget::new(scheduler.deadline(), self.config.run.record_delay());
            let fetch = self.sources.get_mut(source).fetch_batch(cursor, budget);
            let batch = match tokio::time::timeout(scheduler.remaining(), fetch).await {
                Err(_) => {
                    ctx.record_error(format!(
                        "{}: batch fetch at cursor {} overran the time budget",
                        source, cursor
                    ));
                    if let Transition::Rotate { from, to } = apply_fetch_overrun(state) {
                        tracing::warn!(%from, %to, cursor, "batch fetch overran the time budget, rotating away");
                        ctx.record_rotation();
                    }
                    return StopReason::TimeBudget;
                }
                Ok(Err(e)) => {
                    ctx.fetch_failures += 1;
                    tracing::warn!(
                        %source,
                        cursor,
                        failures = ctx.fetch_failures,
                        error = %e,
                        "batch fetch failed"
                    );
                    ctx.record_error(format!("{}: {}", source, e));

                    let max_failures = self.config.run.max_fetch_failures;
                    if let Transition::Rotate { from, to } =
                        apply_fetch_failure(state, ctx.fetch_failures, max_failures)
                    {
                        tracing::warn!(%from, %to, cursor, "rotating away from failing source");
                        ctx.record_rotation();
                    }
                    scheduler.back_off().await;
                    continue;
                }
                Ok(Ok(batch)) if batch.is_out_of_time() => {
                    tracing::info!(%source, cursor, "no time left for another batch");
                    return StopReason::TimeBudget;
                }
                Ok(Ok(batch)) => batch,
            };
            ctx.fetch_failures = 0;

            let outcome = self
                .process_batch(state, ctx, scheduler, source, cursor, batch)
                .await;

            match apply_batch(state, &outcome) {
                Transition::Hold => {
                    tracing::debug!(%source, cursor, "batch cut short, cursor held");
                }
                Transition::Advance { from, to } => {
                    tracing::debug!(%source, from, to, "cursor advanced");
                }
                Transition::Rotate { from, to } => {
                    tracing::info!(
                        %from,
                        %to,
                        cursor,
                        exhausted = outcome.exhausted,
                        "rotating source"
                    );
                    ctx.record_rotation();
                }
            }
        }
    }

    /// Resolves the records of one batch in order
    ///
    /// Returns early, with `completed == false`, when a budget runs out
    /// before the last record.
    async fn process_batch(
        &mut self,
        state: &mut CrawlState,
        ctx: &mut RunContext,
        scheduler: &mut Scheduler,
        source: SourceId,
        cursor: Cursor,
        batch: FetchedBatch,
    ) -> BatchOutcome {
        tracing::debug!(
            %source,
            cursor,
            records = batch.records.len(),
            record_errors = batch.record_errors.len(),
            exhausted = batch.exhausted,
            truncated = batch.truncated,
            "batch fetched"
        );

        let mut outcome = BatchOutcome {
            cursor,
            next_cursor: batch.next_cursor,
            exhausted: batch.exhausted,
            surfaced: 0,
            errors: 0,
            completed: false,
            truncated: batch.truncated,
        };

        for message in batch.record_errors {
            ctx.record_error(format!("{}: {}", source, message));
            outcome.errors += 1;
        }

        for raw in batch.records {
            if scheduler.stop_reason(ctx.counters.processed).is_some() {
                return outcome;
            }
            scheduler.pace().await;
            if scheduler.stop_reason(ctx.counters.processed).is_some() {
                return outcome;
            }

            match self.process_record(state, ctx, source, raw) {
                RecordOutcome::Accepted => {
                    outcome.surfaced += 1;
                    if ctx.since_checkpoint >= self.config.run.checkpoint_every {
                        self.checkpoint(state, ctx);
                    }
                }
                RecordOutcome::Duplicate => outcome.surfaced += 1,
                RecordOutcome::Rejected | RecordOutcome::Dropped => {}
                RecordOutcome::Failed => outcome.errors += 1,
            }
        }

        outcome.completed = true;
        outcome
    }

    /// Normalize, deduplicate, validate, submit
    fn process_record(
        &mut self,
        state: &mut CrawlState,
        ctx: &mut RunContext,
        source: SourceId,
        raw: RawProduct,
    ) -> RecordOutcome {
        let origin = raw.origin.clone();
        let product = match normalize(raw, source) {
            Ok(product) => product,
            Err(reason) => {
                ctx.counters.dropped += 1;
                tracing::debug!(%source, %origin, %reason, "record dropped");
                return RecordOutcome::Dropped;
            }
        };

        let ean = product.ean.clone();
        state.record_seen(source, ean.as_str());

        match ctx.dedup.is_duplicate(&self.storage, &ean) {
            Ok(true) => {
                ctx.counters.duplicates += 1;
                tracing::debug!(%source, %ean, "duplicate record");
                return RecordOutcome::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(%source, %ean, error = %e, "catalog lookup failed");
                ctx.record_error(format!("{}: catalog lookup for {} failed: {}", source, ean, e));
                return RecordOutcome::Failed;
            }
        }

        let verdict = validate(&product);
        if !verdict.is_valid {
            ctx.counters.rejected += 1;
            tracing::debug!(%source, %ean, reasons = %verdict.reason_codes(), "record rejected");
            return RecordOutcome::Rejected;
        }

        match self
            .storage
            .submit(&Submission::pending(product, ctx.run_session_id))
        {
            Ok(submission_id) => {
                ctx.dedup.remember(ean.clone());
                ctx.record_accepted(source);
                state.total_processed += 1;
                tracing::debug!(%source, %ean, submission_id, "record queued for moderation");
                RecordOutcome::Accepted
            }
            Err(e) => {
                // Not retried in this run; the record comes back only if its
                // source resurfaces it at an unadvanced cursor.
                tracing::warn!(%source, %ean, error = %e, "submission failed");
                ctx.record_error(format!("{}: submission of {} failed: {}", source, ean, e));
                RecordOutcome::Failed
            }
        }
    }

    /// Persists the crawl state; a failure is counted and retried at the next checkpoint
    fn checkpoint(&mut self, state: &CrawlState, ctx: &mut RunContext) {
        ctx.since_checkpoint = 0;
        match self.storage.save_state(state) {
            Ok(()) => {
                tracing::info!(
                    source = %state.current_source,
                    cursor = state.cursor(state.current_source),
                    total_processed = state.total_processed,
                    "checkpoint saved"
                );
            }
            Err(e) => {
                ctx.checkpoint_failures += 1;
                tracing::warn!(error = %e, "checkpoint failed, retrying at next checkpoint");
            }
        }
    }
}

/// Runs one ingestion against the configured database and sources
///
/// # Arguments
///
/// * `config` - The validated pipeline configuration
/// * `config_hash` - Hash of the configuration file
pub async fn run_ingest(config: Config, config_hash: String) -> Result<RunSummary> {
    let storage = open_storage(Path::new(&config.storage.database_path)).map_err(|e| {
        tracing::error!(path = %config.storage.database_path, error = %e, "cannot open crawl state store");
        IngestError::StateLoad(e)
    })?;
    let sources = SourceSet::from_config(&config)?;

    let mut coordinator = Coordinator::new(config, config_hash, storage, sources);
    coordinator.run().await
}

//! Action resolution pipeline.
//!
//! One run turns a ledger node and a batch of pending interactions into the
//! next ledger node:
//!
//! 1. Partition the batch into feeds and resolvable interactions.
//! 2. Fan out one forecast per resolvable interaction (bounded concurrency).
//! 3. After every forecast has returned, sample one outcome per interaction
//!    in batch order. Failed forecasts drop their interaction from the round.
//! 4. Fan in to a single narrative merge over feeds followed by resolution
//!    lines.
//! 5. Commit the merged snapshot as a child of the input node.
//!
//! A run either returns a new committed node or fails with nothing
//! committed.

use crate::ledger::{Ledger, LedgerError, LedgerNode};
use crate::oracle::{Forecast, ForecastContext, MergeContext, Oracle, OracleError};
use crate::sampler::{OutcomeSampler, SamplerError};
use crate::state::{Interaction, StateSnapshot};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Heading placed above feed lines in the merge input.
pub const GROUND_TRUTH_HEADING: &str = "Ground truth (must not be contradicted):";

/// Heading placed above resolution lines in the merge input.
pub const RESOLUTIONS_HEADING: &str = "Resolutions:";

/// Errors that abort a pipeline run. Nothing is committed when one occurs.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Cannot resolve an empty batch")]
    EmptyBatch,

    #[error("Every submission in the round failed to resolve")]
    NothingResolved { dropped: Vec<DroppedAction> },

    #[error("Narrative merge failed: {0}")]
    Merge(#[source] OracleError),

    #[error("Round timed out after {0:?}")]
    Timeout(Duration),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Configuration for pipeline runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upper bound on forecasts in flight at once.
    pub max_concurrent_forecasts: usize,

    /// Deadline for a whole run, forecasts and merge together.
    pub round_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_forecasts: 8,
            round_timeout: Some(Duration::from_secs(300)),
        }
    }
}

impl PipelineConfig {
    pub fn with_max_concurrent_forecasts(mut self, max: usize) -> Self {
        self.max_concurrent_forecasts = max.max(1);
        self
    }

    pub fn with_round_timeout(mut self, timeout: Duration) -> Self {
        self.round_timeout = Some(timeout);
        self
    }

    pub fn without_round_timeout(mut self) -> Self {
        self.round_timeout = None;
        self
    }
}

/// A batch split by kind, each half in submission order.
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub feeds: Vec<&'a Interaction>,
    pub resolvable: Vec<&'a Interaction>,
}

impl Partition<'_> {
    /// Whether any resolvable interaction may move the clock.
    pub fn may_advance_time(&self) -> bool {
        self.resolvable.iter().any(|i| i.kind.advances_time())
    }
}

pub fn partition(batch: &[Interaction]) -> Partition<'_> {
    let mut parts = Partition::default();
    for interaction in batch {
        if interaction.kind.is_resolvable() {
            parts.resolvable.push(interaction);
        } else {
            parts.feeds.push(interaction);
        }
    }
    parts
}

/// An interaction with its sampled outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAction {
    pub interaction: Interaction,
    pub outcome: String,
}

impl ResolvedAction {
    /// `<KIND> <actor>: <text>\nOutcome: <outcome>`
    pub fn line(&self) -> String {
        resolution_line(&self.interaction, &self.outcome)
    }
}

pub fn resolution_line(interaction: &Interaction, outcome: &str) -> String {
    format!("{interaction}\nOutcome: {outcome}")
}

/// An interaction whose forecast yielded nothing usable.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedAction {
    pub interaction: Interaction,
    pub reason: String,
}

/// The merge input: feeds verbatim, then resolution lines.
pub fn build_merge_block(feeds: &[&Interaction], resolved: &[ResolvedAction]) -> String {
    let mut block = String::new();
    if !feeds.is_empty() {
        block.push_str(GROUND_TRUTH_HEADING);
        block.push('\n');
        for feed in feeds {
            block.push_str(&feed.to_string());
            block.push('\n');
        }
    }
    if !resolved.is_empty() {
        if !block.is_empty() {
            block.push('\n');
        }
        block.push_str(RESOLUTIONS_HEADING);
        block.push('\n');
        for action in resolved {
            block.push_str(&action.line());
            block.push('\n');
        }
    }
    block.truncate(block.trim_end().len());
    block
}

/// The uncommitted result of a round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub snapshot: StateSnapshot,
    pub narrative: String,
    pub merge_block: String,
    pub resolved: Vec<ResolvedAction>,
    pub dropped: Vec<DroppedAction>,
}

/// A committed round.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub node: Arc<LedgerNode>,
    pub narrative: String,
    pub resolved: Vec<ResolvedAction>,
    pub dropped: Vec<DroppedAction>,
}

/// Stateless resolution service over an oracle.
pub struct Pipeline {
    oracle: Arc<dyn Oracle>,
    sampler: OutcomeSampler,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            sampler: OutcomeSampler::from_entropy(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_sampler(mut self, sampler: OutcomeSampler) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn oracle(&self) -> &Arc<dyn Oracle> {
        &self.oracle
    }

    /// Run a round and commit it as a child of `current`.
    pub async fn resolve(
        &self,
        ledger: &mut Ledger,
        current: &LedgerNode,
        batch: &[Interaction],
    ) -> Result<Resolution, PipelineError> {
        let outcome = self.advance(current.snapshot(), batch).await?;
        let node = ledger.commit_child(current, outcome.snapshot)?;

        info!(
            hash = %node.short_hash(),
            resolved = outcome.resolved.len(),
            dropped = outcome.dropped.len(),
            "round committed"
        );

        Ok(Resolution {
            node,
            narrative: outcome.narrative,
            resolved: outcome.resolved,
            dropped: outcome.dropped,
        })
    }

    /// Run a round without committing it.
    pub async fn advance(
        &self,
        parent: &StateSnapshot,
        batch: &[Interaction],
    ) -> Result<RoundOutcome, PipelineError> {
        if batch.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }

        match self.config.round_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_round(parent, batch))
                .await
                .map_err(|_| PipelineError::Timeout(limit))?,
            None => self.run_round(parent, batch).await,
        }
    }

    async fn run_round(
        &self,
        parent: &StateSnapshot,
        batch: &[Interaction],
    ) -> Result<RoundOutcome, PipelineError> {
        let parts = partition(batch);

        // Fan-out. `buffered` keeps results in submission order whatever the
        // completion order, and returns only once every forecast is done.
        let forecasts: Vec<Result<Forecast, OracleError>> = stream::iter(&parts.resolvable)
            .map(|target| {
                let context = ForecastContext {
                    snapshot: parent,
                    batch,
                    target: *target,
                };
                async move { self.oracle.forecast(&context).await }
            })
            .buffered(self.config.max_concurrent_forecasts.max(1))
            .collect()
            .await;

        let mut resolved = Vec::new();
        let mut dropped = Vec::new();
        for (interaction, forecast) in parts.resolvable.iter().zip(forecasts) {
            match self.sample(forecast) {
                Ok(outcome) => resolved.push(ResolvedAction {
                    interaction: (*interaction).clone(),
                    outcome,
                }),
                Err(reason) => {
                    warn!(submission = %interaction, %reason, "forecast dropped from round");
                    dropped.push(DroppedAction {
                        interaction: (*interaction).clone(),
                        reason,
                    });
                }
            }
        }

        if parts.feeds.is_empty() && resolved.is_empty() {
            return Err(PipelineError::NothingResolved { dropped });
        }

        let may_advance_time = resolved.iter().any(|r| r.interaction.kind.advances_time());
        let merge_block = build_merge_block(&parts.feeds, &resolved);
        let context = MergeContext {
            snapshot: parent,
            resolution_block: &merge_block,
            may_advance_time,
        };
        let update = self
            .oracle
            .merge_narrative(&context)
            .await
            .map_err(PipelineError::Merge)?;
        if update.narrative_text.trim().is_empty() {
            return Err(PipelineError::Merge(OracleError::Malformed(
                "empty narrative".to_string(),
            )));
        }

        let current_date_time = next_clock(parent, update.current_date_time, may_advance_time);
        let snapshot = parent.advance(
            merge_block.clone(),
            update.narrative_text.clone(),
            update.private_ledger,
            current_date_time,
        );

        Ok(RoundOutcome {
            snapshot,
            narrative: update.narrative_text,
            merge_block,
            resolved,
            dropped,
        })
    }

    fn sample(&self, forecast: Result<Forecast, OracleError>) -> Result<String, String> {
        let forecast = forecast.map_err(|e| e.to_string())?;
        self.sampler
            .sample(&forecast.outcomes)
            .map(|outcome| outcome.label.clone())
            .map_err(|e: SamplerError| e.to_string())
    }
}

/// The clock after a round: never earlier than the parent's, and frozen when
/// no order was resolved.
fn next_clock(
    parent: &StateSnapshot,
    proposed: chrono::NaiveDateTime,
    may_advance_time: bool,
) -> chrono::NaiveDateTime {
    let previous = parent.current_date_time;
    if !may_advance_time {
        return previous;
    }
    if proposed < previous {
        warn!(%proposed, %previous, "oracle moved the clock backwards; keeping previous time");
        return previous;
    }
    proposed
}

//! ScenarioSession - the primary public API for running a wargame.
//!
//! A session owns the ledger, the current position, the pending-interaction
//! queue, and the roster. The ledger and pipeline it drives are stateless
//! services; all mutable state lives here and only changes after an
//! operation has fully succeeded.

use crate::hash::{ContentHash, HashError};
use crate::ledger::{Ledger, LedgerError, LedgerNode};
use crate::oracle::{ClaudeOracle, Oracle, OracleConfig, OracleError, ScenarioRequest};
use crate::persist::{PersistError, SavedScenario};
use crate::pipeline::{DroppedAction, Pipeline, PipelineConfig, PipelineError, ResolvedAction};
use crate::queue::{InteractionQueue, QueueError, QueueState};
use crate::sampler::OutcomeSampler;
use crate::state::{
    render_setup, Interaction, InteractionKind, PlayerId, PlayerRef, StateSnapshot,
};
use chrono::NaiveDateTime;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Errors from ScenarioSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Resolution failed: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Persistence error: {0}")]
    Persist(#[from] PersistError),

    #[error("Invalid hash: {0}")]
    InvalidHash(#[from] HashError),

    #[error("No participant with id {0}")]
    UnknownPlayer(PlayerId),

    #[error("Nothing queued to resolve")]
    EmptyBatch,

    #[error("A scenario needs at least one participant")]
    NoPlayers,

    #[error("No API key configured - set ANTHROPIC_API_KEY environment variable")]
    NoApiKey,
}

impl SessionError {
    /// The user asked for a node that does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            SessionError::Ledger(e) => e.is_not_found(),
            SessionError::InvalidHash(_) => true,
            _ => false,
        }
    }

    /// Nothing changed; the same request may simply be made again.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Oracle(_) => true,
            SessionError::Pipeline(e) => !matches!(e, PipelineError::EmptyBatch),
            _ => false,
        }
    }

    /// A message suitable for showing to players.
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Pipeline(PipelineError::NothingResolved { dropped }) => {
                let mut message = String::from(
                    "None of the queued submissions could be resolved. Nothing changed; try again.",
                );
                for action in dropped {
                    message.push_str(&format!("\n  - {} ({})", action.interaction, action.reason));
                }
                message
            }
            e if e.is_retryable() => format!("{e}. Nothing changed; try again."),
            e if e.is_not_found() => format!("{e}. Check the hash and try again."),
            e => e.to_string(),
        }
    }
}

/// Configuration for creating a new scenario session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// What the scenario is about.
    pub topic: String,

    /// Participants. Ids must be unique.
    pub players: Vec<PlayerRef>,

    /// Settings for the Claude oracle.
    pub oracle: OracleConfig,

    /// Settings for round resolution.
    pub pipeline: PipelineConfig,

    /// Seed for outcome sampling. Entropy when unset.
    pub sampler_seed: Option<u64>,
}

impl SessionConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            players: Vec::new(),
            oracle: OracleConfig::default(),
            pipeline: PipelineConfig::default(),
            sampler_seed: None,
        }
    }

    /// Add a participant.
    pub fn with_player(mut self, player: PlayerRef) -> Self {
        self.players.push(player);
        self
    }

    pub fn with_players(mut self, players: impl IntoIterator<Item = PlayerRef>) -> Self {
        self.players.extend(players);
        self
    }

    pub fn with_oracle_config(mut self, oracle: OracleConfig) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_pipeline_config(mut self, pipeline: PipelineConfig) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.sampler_seed = Some(seed);
        self
    }

    /// Apply `WARGAME_*` environment overrides.
    pub fn from_env(self) -> Self {
        self.with_vars(|key| std::env::var(key).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(model) = var("WARGAME_MODEL") {
            self.oracle = self.oracle.with_model(model);
        }
        if let Some(model) = var("WARGAME_FORECAST_MODEL") {
            self.oracle = self.oracle.with_forecast_model(model);
        }
        if let Some(raw) = var("WARGAME_MAX_CONCURRENT_FORECASTS") {
            match raw.trim().parse::<usize>() {
                Ok(max) => self.pipeline = self.pipeline.with_max_concurrent_forecasts(max),
                Err(_) => warn!(value = %raw, "ignoring WARGAME_MAX_CONCURRENT_FORECASTS"),
            }
        }
        if let Some(raw) = var("WARGAME_ROUND_TIMEOUT_SECS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.pipeline = self.pipeline.without_round_timeout(),
                Ok(secs) => {
                    self.pipeline = self.pipeline.with_round_timeout(Duration::from_secs(secs))
                }
                Err(_) => warn!(value = %raw, "ignoring WARGAME_ROUND_TIMEOUT_SECS"),
            }
        }
        self
    }

    /// The Claude oracle described by this config.
    ///
    /// Requires `ANTHROPIC_API_KEY` environment variable to be set.
    pub fn claude_oracle(&self) -> Result<Arc<dyn Oracle>, SessionError> {
        let oracle = ClaudeOracle::from_env()
            .map_err(oracle_setup_error)?
            .with_config(self.oracle.clone());
        Ok(Arc::new(oracle))
    }

    fn sampler(&self) -> OutcomeSampler {
        self.sampler_seed
            .map(OutcomeSampler::seeded)
            .unwrap_or_default()
    }
}

fn oracle_setup_error(err: claude::Error) -> SessionError {
    match err {
        claude::Error::NoApiKey => SessionError::NoApiKey,
        other => SessionError::Oracle(other.into()),
    }
}

/// A committed round, as reported to players.
#[derive(Debug, Clone)]
pub struct RoundReport {
    pub hash: ContentHash,
    pub narrative: String,
    pub current_date_time: NaiveDateTime,
    pub resolved: Vec<ResolvedAction>,
    /// Submissions whose forecasts failed. They are not carried forward.
    pub dropped: Vec<DroppedAction>,
}

/// Result of a rollback.
#[derive(Debug, Clone)]
pub struct RollbackReport {
    pub hash: ContentHash,
    pub current_date_time: NaiveDateTime,
    /// Pending submissions made against the position left behind.
    pub discarded: Vec<Interaction>,
}

/// One node on the path from the root to the current position.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub hash: ContentHash,
    pub canon_len: usize,
    pub current_date_time: NaiveDateTime,
}

/// A child of the current position.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchEntry {
    pub hash: ContentHash,
    pub current_date_time: NaiveDateTime,
    pub narration: Option<String>,
}

/// Summary of a session for display.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub scenario_id: Uuid,
    pub topic: String,
    pub current: ContentHash,
    pub round: usize,
    pub current_date_time: NaiveDateTime,
    pub queue: QueueState,
    pub nodes: usize,
    pub branches: usize,
}

/// A wargame session.
pub struct ScenarioSession {
    scenario_id: Uuid,
    topic: String,
    players: Vec<PlayerRef>,
    ledger: Ledger,
    current: Arc<LedgerNode>,
    queue: InteractionQueue,
    pipeline: Pipeline,
}

impl ScenarioSession {
    /// Open a new scenario: brief it through the oracle and commit the root.
    pub async fn start(
        config: SessionConfig,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Self, SessionError> {
        if config.players.is_empty() {
            return Err(SessionError::NoPlayers);
        }

        let request = ScenarioRequest {
            topic: config.topic.clone(),
            players: config.players.clone(),
        };
        let briefing = oracle.initialize(&request).await?;

        let root = StateSnapshot::opening(
            render_setup(&config.topic, &config.players),
            briefing.narrative_briefing,
            briefing.private_ledger,
            briefing.start_date_time,
        );
        let mut ledger = Ledger::new();
        let current = ledger.commit_root(root)?;

        let scenario_id = Uuid::new_v4();
        info!(
            %scenario_id,
            topic = %config.topic,
            players = config.players.len(),
            root = %current.short_hash(),
            "scenario started"
        );

        let pipeline = Pipeline::new(oracle)
            .with_config(config.pipeline.clone())
            .with_sampler(config.sampler());

        Ok(Self {
            scenario_id,
            topic: config.topic,
            players: config.players,
            queue: InteractionQueue::new(current.hash()),
            ledger,
            current,
            pipeline,
        })
    }

    /// Resume a saved scenario.
    ///
    /// Topic and roster come from the file; `config` supplies pipeline and
    /// sampler settings.
    pub async fn load(
        path: impl AsRef<Path>,
        config: &SessionConfig,
        oracle: Arc<dyn Oracle>,
    ) -> Result<Self, SessionError> {
        let restored = SavedScenario::load_json(path).await?.restore()?;

        info!(
            scenario_id = %restored.scenario_id,
            nodes = restored.ledger.len(),
            current = %restored.current.short_hash(),
            "scenario loaded"
        );

        let pipeline = Pipeline::new(oracle)
            .with_config(config.pipeline.clone())
            .with_sampler(config.sampler());

        Ok(Self {
            scenario_id: restored.scenario_id,
            topic: restored.topic,
            players: restored.players,
            queue: InteractionQueue::new(restored.current.hash()),
            ledger: restored.ledger,
            current: restored.current,
            pipeline,
        })
    }

    /// Save the whole ledger and the current position. Pending submissions
    /// are not saved.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let saved = SavedScenario::capture(
            self.scenario_id,
            self.topic.clone(),
            self.players.clone(),
            &self.ledger,
            &self.current,
        );
        saved.save_json(path).await?;
        Ok(())
    }

    /// Queue a submission from a participant against the current position.
    pub fn enqueue(
        &mut self,
        kind: InteractionKind,
        player_id: PlayerId,
        text: impl Into<String>,
    ) -> Result<QueueState, SessionError> {
        let actor = self
            .player(player_id)
            .cloned()
            .ok_or(SessionError::UnknownPlayer(player_id))?;
        let anchor = self.current.hash();
        self.submit(&anchor, Interaction::new(kind, actor, text))
    }

    /// Queue `interaction`, submitted while looking at node `anchor`.
    pub fn submit(
        &mut self,
        anchor: &ContentHash,
        interaction: Interaction,
    ) -> Result<QueueState, SessionError> {
        if self.player(interaction.actor.id).is_none() {
            return Err(SessionError::UnknownPlayer(interaction.actor.id));
        }
        Ok(self.queue.enqueue(anchor, interaction)?)
    }

    /// Resolve everything queued as one round.
    ///
    /// On success the session moves to the new node and the queue is
    /// cleared. On failure nothing changes and the queue is kept.
    pub async fn resolve(&mut self) -> Result<RoundReport, SessionError> {
        if self.queue.is_empty() {
            return Err(SessionError::EmptyBatch);
        }

        let batch = self.queue.take_snapshot();
        let resolution = self
            .pipeline
            .resolve(&mut self.ledger, &self.current, &batch)
            .await?;

        self.current = resolution.node;
        self.queue.clear_for(self.current.hash());

        Ok(RoundReport {
            hash: self.current.hash(),
            current_date_time: self.current.snapshot().current_date_time,
            narrative: resolution.narrative,
            resolved: resolution.resolved,
            dropped: resolution.dropped,
        })
    }

    /// Move to `target` (a full hex digest), or to the parent of the current
    /// node when no target is given. Pending submissions are discarded.
    pub fn rollback(&mut self, target: Option<&str>) -> Result<RollbackReport, SessionError> {
        let target = target.map(ContentHash::from_hex).transpose()?;
        let node = self.ledger.rollback(&self.current, target.as_ref())?;

        let discarded = self.queue.clear_for(node.hash());
        info!(
            from = %self.current.short_hash(),
            to = %node.short_hash(),
            discarded = discarded.len(),
            "rolled back"
        );
        self.current = node;

        Ok(RollbackReport {
            hash: self.current.hash(),
            current_date_time: self.current.snapshot().current_date_time,
            discarded,
        })
    }

    /// Root-to-current path.
    pub fn history(&self) -> Result<Vec<HistoryEntry>, SessionError> {
        let path = self.ledger.ancestry(&self.current.hash())?;
        Ok(path
            .iter()
            .map(|node| HistoryEntry {
                hash: node.hash(),
                canon_len: node.snapshot().canon.len(),
                current_date_time: node.snapshot().current_date_time,
            })
            .collect())
    }

    /// Children of the current node, in commit order.
    pub fn branches(&self) -> Vec<BranchEntry> {
        self.ledger
            .children(&self.current.hash())
            .iter()
            .map(|node| BranchEntry {
                hash: node.hash(),
                current_date_time: node.snapshot().current_date_time,
                narration: node.snapshot().latest_narration().map(str::to_string),
            })
            .collect()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            scenario_id: self.scenario_id,
            topic: self.topic.clone(),
            current: self.current.hash(),
            round: self.current.snapshot().round(),
            current_date_time: self.current.snapshot().current_date_time,
            queue: self.queue.state(),
            nodes: self.ledger.len(),
            branches: self.ledger.children(&self.current.hash()).len(),
        }
    }

    pub fn scenario_id(&self) -> Uuid {
        self.scenario_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn players(&self) -> &[PlayerRef] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&PlayerRef> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Case-insensitive lookup by display name.
    pub fn player_by_name(&self, name: &str) -> Option<&PlayerRef> {
        self.players
            .iter()
            .find(|p| p.display_name.eq_ignore_ascii_case(name))
    }

    pub fn current(&self) -> &Arc<LedgerNode> {
        &self.current
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn pending(&self) -> &[Interaction] {
        self.queue.pending()
    }

    /// The most recent narration on the current path.
    pub fn latest_narration(&self) -> Option<&str> {
        self.current.snapshot().latest_narration()
    }
}

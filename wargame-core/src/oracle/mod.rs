//! The oracle facade.
//!
//! The oracle turns structured context into structured forecasts and
//! narrative. The resolution pipeline only ever talks to the [`Oracle`]
//! trait; [`ClaudeOracle`] is the production implementation and
//! [`crate::testing::MockOracle`] the scripted one.

mod anthropic;
mod tools;

pub use anthropic::{ClaudeOracle, OracleConfig};

use crate::sampler::Outcome;
use crate::state::{Interaction, PlayerRef, PrivateLedger, StateSnapshot};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use thiserror::Error;

/// Errors from oracle calls.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    /// Network, authentication, or API failure. Never retried here.
    #[error("Oracle transport error: {0}")]
    Transport(String),

    /// The response arrived but lacked usable structured fields.
    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

impl From<claude::Error> for OracleError {
    fn from(err: claude::Error) -> Self {
        if err.is_transport() {
            OracleError::Transport(err.to_string())
        } else {
            OracleError::Malformed(err.to_string())
        }
    }
}

/// Everything the oracle needs to open a scenario.
#[derive(Debug, Clone)]
pub struct ScenarioRequest {
    pub topic: String,
    pub players: Vec<PlayerRef>,
}

/// The oracle's opening of a scenario.
#[derive(Debug, Clone)]
pub struct Briefing {
    pub narrative_briefing: String,
    pub private_ledger: PrivateLedger,
    pub start_date_time: NaiveDateTime,
}

/// Context for forecasting one interaction of a batch.
#[derive(Debug, Clone, Copy)]
pub struct ForecastContext<'a> {
    /// The state the batch is resolved against.
    pub snapshot: &'a StateSnapshot,
    /// The whole batch, for situational awareness.
    pub batch: &'a [Interaction],
    /// The interaction to forecast.
    pub target: &'a Interaction,
}

impl ForecastContext<'_> {
    /// One `<KIND> <actor>: <text>` line per batch interaction.
    pub fn render_batch(&self) -> String {
        render_batch(self.batch)
    }
}

/// Candidate outcomes for one interaction.
#[derive(Debug, Clone)]
pub struct Forecast {
    pub outcomes: Vec<Outcome>,
    pub rationale: Option<String>,
}

/// Context for the single narrative merge of a round.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub snapshot: &'a StateSnapshot,
    /// Feeds first, then resolution lines, in submission order.
    pub resolution_block: &'a str,
    /// False when the round holds no ACTION; the clock must not move.
    pub may_advance_time: bool,
}

/// The oracle's merged view of a resolved round.
#[derive(Debug, Clone)]
pub struct WorldUpdate {
    pub narrative_text: String,
    pub private_ledger: PrivateLedger,
    pub current_date_time: NaiveDateTime,
}

/// External reasoning capability driving the simulation.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Open a scenario: briefing, private ledger, and starting clock.
    async fn initialize(&self, request: &ScenarioRequest) -> Result<Briefing, OracleError>;

    /// Forecast the possible outcomes of `context.target`.
    async fn forecast(&self, context: &ForecastContext<'_>) -> Result<Forecast, OracleError>;

    /// Merge a round's ground truth and outcomes into narrative and state.
    async fn merge_narrative(&self, context: &MergeContext<'_>) -> Result<WorldUpdate, OracleError>;
}

/// One `<KIND> <actor>: <text>` line per interaction.
pub fn render_batch(batch: &[Interaction]) -> String {
    batch
        .iter()
        .map(|interaction| interaction.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

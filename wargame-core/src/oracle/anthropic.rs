//! Claude-backed oracle.
//!
//! Every call forces a single tool so the answer arrives as structured JSON.
//! The shared canon is replayed as the conversation (player records as user
//! turns, narration as assistant turns); the private ledger travels in the
//! system prompt, which players never see.

use super::tools::{format_date_time, BriefScenario, ForecastOutcomes, UpdateWorld};
use super::{
    Briefing, Forecast, ForecastContext, MergeContext, Oracle, OracleError, ScenarioRequest,
    WorldUpdate,
};
use crate::state::{render_setup, CanonRole, StateSnapshot};
use async_trait::async_trait;
use claude::{Claude, Message, Request};
use tracing::debug;

/// Configuration for the Claude oracle.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Model for briefings and narrative merges (client default if unset).
    pub model: Option<String>,

    /// Model for forecasts. Falls back to `model`.
    pub forecast_model: Option<String>,

    /// Maximum tokens per response.
    pub max_tokens: usize,

    /// Temperature for generation.
    pub temperature: Option<f32>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: None,
            forecast_model: None,
            max_tokens: 4096,
            temperature: Some(0.8),
        }
    }
}

impl OracleConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_forecast_model(mut self, model: impl Into<String>) -> Self {
        self.forecast_model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }
}

/// The production oracle.
pub struct ClaudeOracle {
    client: Claude,
    config: OracleConfig,
}

impl ClaudeOracle {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: OracleConfig::default(),
        }
    }

    /// Create from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, claude::Error> {
        Ok(Self::new(Claude::from_env()?))
    }

    pub fn with_config(mut self, config: OracleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OracleConfig {
        &self.config
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        system: String,
        model: Option<&str>,
    ) -> Request {
        let mut request = Request::new(messages)
            .with_system(system)
            .with_max_tokens(self.config.max_tokens);

        if let Some(model) = model {
            request = request.with_model(model);
        }
        if let Some(temp) = self.config.temperature {
            request = request.with_temperature(temp);
        }
        request
    }

    fn forecast_model(&self) -> Option<&str> {
        self.config
            .forecast_model
            .as_deref()
            .or(self.config.model.as_deref())
    }
}

/// Umpire instructions plus the hidden state of `snapshot`.
fn build_system_prompt(snapshot: &StateSnapshot) -> String {
    let mut prompt = String::new();
    prompt.push_str(include_str!("prompts/umpire.txt"));

    prompt.push_str("\n\n## Current In-World Time\n");
    prompt.push_str(&format_date_time(snapshot.current_date_time));
    prompt.push('\n');

    let ledger = &snapshot.private_ledger;
    prompt.push_str("\n## Private Timeline\n");
    if ledger.timeline.is_empty() {
        prompt.push_str("(empty)\n");
    }
    for entry in &ledger.timeline {
        prompt.push_str(&format!("- {}: {}\n", format_date_time(entry.at), entry.event));
    }

    prompt.push_str("\n## Private Scratchpad\n");
    if ledger.scratchpad.trim().is_empty() {
        prompt.push_str("(empty)\n");
    } else {
        prompt.push_str(&ledger.scratchpad);
        prompt.push('\n');
    }

    prompt
}

/// The canon replayed as alternating turns, followed by `task`.
fn build_messages(snapshot: &StateSnapshot, task: String) -> Vec<Message> {
    let mut messages: Vec<Message> = snapshot
        .canon
        .iter()
        .map(|entry| match entry.role {
            CanonRole::Players => Message::user(&entry.content),
            CanonRole::Narrator => Message::assistant(&entry.content),
        })
        .collect();
    messages.push(Message::user(task));
    messages
}

#[async_trait]
impl Oracle for ClaudeOracle {
    async fn initialize(&self, request: &ScenarioRequest) -> Result<Briefing, OracleError> {
        debug!(topic = %request.topic, players = request.players.len(), "requesting briefing");

        let task = format!(
            "{}\n\n{}",
            include_str!("prompts/initialize.txt"),
            render_setup(&request.topic, &request.players)
        );
        let api_request = self.build_request(
            vec![Message::user(task)],
            include_str!("prompts/umpire.txt").to_string(),
            self.config.model.as_deref(),
        );

        let answer: BriefScenario = self
            .client
            .complete_tool(api_request, BriefScenario::as_tool())
            .await?;
        answer.into_briefing()
    }

    async fn forecast(&self, context: &ForecastContext<'_>) -> Result<Forecast, OracleError> {
        debug!(submission = %context.target, "requesting forecast");

        let task = format!(
            "{}\n\n## This Round's Submissions\n{}\n\n## Target Submission\n{}",
            include_str!("prompts/forecast.txt"),
            context.render_batch(),
            context.target
        );
        let api_request = self.build_request(
            build_messages(context.snapshot, task),
            build_system_prompt(context.snapshot),
            self.forecast_model(),
        );

        let answer: ForecastOutcomes = self
            .client
            .complete_tool(api_request, ForecastOutcomes::as_tool())
            .await?;
        answer.into_forecast()
    }

    async fn merge_narrative(
        &self,
        context: &MergeContext<'_>,
    ) -> Result<WorldUpdate, OracleError> {
        debug!(
            lines = context.resolution_block.lines().count(),
            may_advance_time = context.may_advance_time,
            "requesting narrative merge"
        );

        let mut task = format!(
            "{}\n\n## Round Resolution\n{}",
            include_str!("prompts/merge.txt"),
            context.resolution_block
        );
        if !context.may_advance_time {
            task.push_str(&format!(
                "\n\nNo orders were given this round. Keep the time at {}.",
                format_date_time(context.snapshot.current_date_time)
            ));
        }

        let api_request = self.build_request(
            build_messages(context.snapshot, task),
            build_system_prompt(context.snapshot),
            self.config.model.as_deref(),
        );

        let answer: UpdateWorld = self
            .client
            .complete_tool(api_request, UpdateWorld::as_tool())
            .await?;
        answer.into_update()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PrivateLedger, TimelineEntry};
    use chrono::NaiveDate;

    fn snapshot() -> StateSnapshot {
        let start = NaiveDate::from_ymd_opt(1863, 7, 1)
            .unwrap()
            .and_hms_opt(5, 30, 0)
            .unwrap();
        let ledger = PrivateLedger::new(
            vec![TimelineEntry {
                at: start + chrono::Duration::hours(4),
                event: "Second corps arrives".to_string(),
            }],
            "Red cavalry is screening poorly.",
        );
        StateSnapshot::opening("Gettysburg", "Skirmishers meet west of town.", ledger, start)
    }

    #[test]
    fn test_system_prompt_carries_private_ledger() {
        let prompt = build_system_prompt(&snapshot());
        assert!(prompt.contains("1863-07-01 05:30"));
        assert!(prompt.contains("1863-07-01 09:30: Second corps arrives"));
        assert!(prompt.contains("Red cavalry is screening poorly."));
    }

    #[test]
    fn test_messages_alternate_and_end_with_task() {
        let messages = build_messages(&snapshot(), "forecast this".to_string());
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, claude::Role::User);
        assert_eq!(messages[1].role, claude::Role::Assistant);
        assert_eq!(messages[2].role, claude::Role::User);
        assert_eq!(messages[2].content[0].as_text(), Some("forecast this"));
    }

    #[test]
    fn test_forecast_model_falls_back() {
        let client = Claude::new("test-key").unwrap();
        let oracle = ClaudeOracle::new(client.clone())
            .with_config(OracleConfig::default().with_model("big"));
        assert_eq!(oracle.forecast_model(), Some("big"));

        let oracle = ClaudeOracle::new(client).with_config(
            OracleConfig::default()
                .with_model("big")
                .with_forecast_model("small"),
        );
        assert_eq!(oracle.forecast_model(), Some("small"));
    }
}

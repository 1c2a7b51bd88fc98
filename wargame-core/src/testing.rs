//! Testing utilities for scenarios.
//!
//! This module provides tools for integration testing:
//! - `MockOracle` for deterministic rounds without API calls
//! - Fixtures for a small roster and an opening briefing

use crate::oracle::{
    Briefing, Forecast, ForecastContext, MergeContext, Oracle, OracleError, ScenarioRequest,
    WorldUpdate,
};
use crate::sampler::Outcome;
use crate::state::{PlayerRef, PrivateLedger, TimelineEntry};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// A request the mock oracle received.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleCall {
    Initialize { topic: String, players: usize },
    Forecast { target: String, batch: Vec<String> },
    Merge { block: String, may_advance_time: bool },
}

#[derive(Debug, Clone)]
enum ForecastScript {
    Outcomes(Vec<Outcome>),
    Fail(OracleError),
}

/// A scripted oracle.
///
/// Forecasts are scripted per interaction text. Unscripted interactions get a
/// single certain outcome, `"<text> succeeds"`. Merges echo the resolution
/// block as narrative and move the clock by a configurable step, whether or
/// not the round allows it, so callers can check that the clock rules are
/// enforced above the oracle.
pub struct MockOracle {
    briefing: Mutex<Result<Briefing, OracleError>>,
    forecasts: Mutex<HashMap<String, ForecastScript>>,
    delays: Mutex<HashMap<String, Duration>>,
    merge_failures: Mutex<VecDeque<OracleError>>,
    time_step: Mutex<chrono::Duration>,
    calls: Mutex<Vec<OracleCall>>,
    completed: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockOracle {
    pub fn new() -> Self {
        Self {
            briefing: Mutex::new(Ok(sample_briefing())),
            forecasts: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            merge_failures: Mutex::new(VecDeque::new()),
            time_step: Mutex::new(chrono::Duration::hours(1)),
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn with_briefing(self, briefing: Briefing) -> Self {
        *lock(&self.briefing) = Ok(briefing);
        self
    }

    /// Make `initialize` fail.
    pub fn with_initialize_failure(self, err: OracleError) -> Self {
        *lock(&self.briefing) = Err(err);
        self
    }

    pub fn with_outcomes(self, text: impl Into<String>, outcomes: Vec<Outcome>) -> Self {
        self.script_outcomes(text, outcomes);
        self
    }

    pub fn with_forecast_failure(self, text: impl Into<String>, err: OracleError) -> Self {
        self.script_forecast_failure(text, err);
        self
    }

    /// Hold the forecast for `text` for `delay` before answering.
    pub fn with_delay(self, text: impl Into<String>, delay: Duration) -> Self {
        lock(&self.delays).insert(text.into(), delay);
        self
    }

    pub fn with_time_step(self, step: chrono::Duration) -> Self {
        *lock(&self.time_step) = step;
        self
    }

    pub fn script_outcomes(&self, text: impl Into<String>, outcomes: Vec<Outcome>) {
        lock(&self.forecasts).insert(text.into(), ForecastScript::Outcomes(outcomes));
    }

    pub fn script_forecast_failure(&self, text: impl Into<String>, err: OracleError) {
        lock(&self.forecasts).insert(text.into(), ForecastScript::Fail(err));
    }

    /// Fail the next merge with `err`. Later merges succeed again.
    pub fn fail_next_merge(&self, err: OracleError) {
        lock(&self.merge_failures).push_back(err);
    }

    /// Every request received, in arrival order.
    pub fn calls(&self) -> Vec<OracleCall> {
        lock(&self.calls).clone()
    }

    pub fn forecast_calls(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, OracleCall::Forecast { .. }))
            .count()
    }

    /// Resolution blocks of every merge request, in order.
    pub fn merge_blocks(&self) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter_map(|call| match call {
                OracleCall::Merge { block, .. } => Some(block.clone()),
                _ => None,
            })
            .collect()
    }

    /// Interaction texts in the order their forecasts finished.
    pub fn completion_order(&self) -> Vec<String> {
        lock(&self.completed).clone()
    }

    fn record(&self, call: OracleCall) {
        lock(&self.calls).push(call);
    }
}

impl Default for MockOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn initialize(&self, request: &ScenarioRequest) -> Result<Briefing, OracleError> {
        self.record(OracleCall::Initialize {
            topic: request.topic.clone(),
            players: request.players.len(),
        });
        lock(&self.briefing).clone()
    }

    async fn forecast(&self, context: &ForecastContext<'_>) -> Result<Forecast, OracleError> {
        let text = context.target.text.clone();
        self.record(OracleCall::Forecast {
            target: text.clone(),
            batch: context.batch.iter().map(|i| i.text.clone()).collect(),
        });

        let delay = lock(&self.delays).get(&text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let script = lock(&self.forecasts).get(&text).cloned();
        lock(&self.completed).push(text.clone());
        match script {
            Some(ForecastScript::Outcomes(outcomes)) => Ok(Forecast {
                outcomes,
                rationale: None,
            }),
            Some(ForecastScript::Fail(err)) => Err(err),
            None => Ok(Forecast {
                outcomes: vec![Outcome::new(format!("{text} succeeds"), 1.0)],
                rationale: None,
            }),
        }
    }

    async fn merge_narrative(
        &self,
        context: &MergeContext<'_>,
    ) -> Result<WorldUpdate, OracleError> {
        self.record(OracleCall::Merge {
            block: context.resolution_block.to_string(),
            may_advance_time: context.may_advance_time,
        });

        if let Some(err) = lock(&self.merge_failures).pop_front() {
            return Err(err);
        }

        let parent = context.snapshot;
        let round = parent.round() + 1;
        let mut private_ledger = parent.private_ledger.clone();
        if !private_ledger.scratchpad.is_empty() {
            private_ledger.scratchpad.push('\n');
        }
        private_ledger.scratchpad.push_str(&format!("Round {round} resolved."));

        let step = *lock(&self.time_step);
        Ok(WorldUpdate {
            narrative_text: format!("Round {round}.\n{}", context.resolution_block),
            private_ledger,
            current_date_time: parent.current_date_time + step,
        })
    }
}

/// Three participants: two commanders and a correspondent.
pub fn sample_players() -> Vec<PlayerRef> {
    vec![
        PlayerRef::new(1, "Alice", "Blue force commander"),
        PlayerRef::new(2, "Bob", "Red force commander"),
        PlayerRef::new(3, "Carol", "War correspondent"),
    ]
}

pub fn sample_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1944, 6, 6)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .unwrap_or_default()
}

pub fn sample_briefing() -> Briefing {
    let start = sample_start();
    Briefing {
        narrative_briefing: "Dawn over the beaches. Blue lands in two hours; Red holds the bluffs."
            .to_string(),
        private_ledger: PrivateLedger::new(
            vec![TimelineEntry {
                at: start + chrono::Duration::hours(3),
                event: "Red reserve armor begins moving north".to_string(),
            }],
            "Red artillery is short on shells.",
        ),
        start_date_time: start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Interaction, StateSnapshot};

    fn opening() -> StateSnapshot {
        let briefing = sample_briefing();
        StateSnapshot::opening(
            "setup",
            briefing.narrative_briefing,
            briefing.private_ledger,
            briefing.start_date_time,
        )
    }

    #[tokio::test]
    async fn test_unscripted_forecast_is_certain() {
        let oracle = MockOracle::new();
        let snapshot = opening();
        let batch = vec![Interaction::action(sample_players()[0].clone(), "land")];
        let context = ForecastContext {
            snapshot: &snapshot,
            batch: &batch,
            target: &batch[0],
        };
        let forecast = oracle.forecast(&context).await.unwrap();
        assert_eq!(forecast.outcomes, vec![Outcome::new("land succeeds", 1.0)]);
        assert_eq!(oracle.forecast_calls(), 1);
    }

    #[tokio::test]
    async fn test_merge_failure_is_one_shot() {
        let oracle = MockOracle::new();
        oracle.fail_next_merge(OracleError::Transport("offline".into()));
        let snapshot = opening();
        let context = MergeContext {
            snapshot: &snapshot,
            resolution_block: "block",
            may_advance_time: true,
        };

        assert!(oracle.merge_narrative(&context).await.is_err());
        let update = oracle.merge_narrative(&context).await.unwrap();
        assert_eq!(update.current_date_time, sample_start() + chrono::Duration::hours(1));
        assert!(update.private_ledger.scratchpad.ends_with("Round 1 resolved."));
        assert_eq!(oracle.merge_blocks(), vec!["block", "block"]);
    }
}

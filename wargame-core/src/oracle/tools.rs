//! Structured answers the Claude oracle is forced to give.
//!
//! Each struct is both the tool schema sent to Claude (via `#[derive(Tool)]`)
//! and the type its tool input is decoded into.

use super::{Briefing, Forecast, OracleError, WorldUpdate};
use crate::sampler::Outcome;
use crate::state::{PrivateLedger, TimelineEntry};
use chrono::NaiveDateTime;
use serde::Deserialize;
use wargame_macros::Tool;

/// In-world date-time format exchanged with the oracle.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

pub fn format_date_time(at: NaiveDateTime) -> String {
    at.format(DATE_TIME_FORMAT).to_string()
}

pub fn parse_date_time(field: &str, value: &str) -> Result<NaiveDateTime, OracleError> {
    NaiveDateTime::parse_from_str(value.trim(), DATE_TIME_FORMAT).map_err(|e| {
        OracleError::Malformed(format!("{field} `{value}` is not YYYY-MM-DD HH:MM: {e}"))
    })
}

/// An event in the umpire's private timeline
#[derive(Tool, Deserialize, Debug, Clone)]
pub struct TimelineItem {
    /// When the event happens or happened, as YYYY-MM-DD HH:MM
    pub at: String,
    /// What happens
    pub event: String,
}

fn into_private_ledger(
    timeline: Vec<TimelineItem>,
    scratchpad: String,
) -> Result<PrivateLedger, OracleError> {
    let timeline = timeline
        .into_iter()
        .map(|item| {
            Ok(TimelineEntry {
                at: parse_date_time("timeline entry", &item.at)?,
                event: item.event,
            })
        })
        .collect::<Result<Vec<_>, OracleError>>()?;
    Ok(PrivateLedger::new(timeline, scratchpad))
}

/// Open the scenario: write the players' briefing and your private plan
#[derive(Tool, Deserialize, Debug)]
#[tool(name = "brief_scenario")]
pub struct BriefScenario {
    /// Briefing shown to every participant
    pub briefing: String,
    /// In-world starting date and time, as YYYY-MM-DD HH:MM
    pub start_date_time: String,
    /// Planned future events, hidden from players
    #[tool(nested)]
    pub timeline: Vec<TimelineItem>,
    /// Private notes, hidden from players
    pub scratchpad: String,
}

impl BriefScenario {
    pub fn into_briefing(self) -> Result<Briefing, OracleError> {
        if self.briefing.trim().is_empty() {
            return Err(OracleError::Malformed("empty briefing".to_string()));
        }
        Ok(Briefing {
            start_date_time: parse_date_time("start_date_time", &self.start_date_time)?,
            private_ledger: into_private_ledger(self.timeline, self.scratchpad)?,
            narrative_briefing: self.briefing,
        })
    }
}

/// One possible result of the order
#[derive(Tool, Deserialize, Debug, Clone)]
pub struct Candidate {
    /// What happens, in one or two sentences
    pub outcome: String,
    /// Relative likelihood, any positive number
    pub weight: f64,
}

/// List the plausible outcomes of the target order with relative likelihoods
#[derive(Tool, Deserialize, Debug)]
#[tool(name = "forecast_outcomes")]
pub struct ForecastOutcomes {
    /// Mutually exclusive outcomes
    #[tool(nested, min_items = 1)]
    pub outcomes: Vec<Candidate>,
    /// Brief reasoning behind the weights
    pub rationale: Option<String>,
}

impl ForecastOutcomes {
    pub fn into_forecast(self) -> Result<Forecast, OracleError> {
        if self.outcomes.is_empty() {
            return Err(OracleError::Malformed("forecast listed no outcomes".to_string()));
        }
        Ok(Forecast {
            outcomes: self
                .outcomes
                .into_iter()
                .map(|c| Outcome::new(c.outcome, c.weight))
                .collect(),
            rationale: self.rationale,
        })
    }
}

/// Narrate the resolved round and update your private state
#[derive(Tool, Deserialize, Debug)]
#[tool(name = "update_world")]
pub struct UpdateWorld {
    /// Narrative shown to every participant
    pub narrative: String,
    /// In-world date and time after this round, as YYYY-MM-DD HH:MM
    pub current_date_time: String,
    /// The full updated private timeline
    #[tool(nested)]
    pub timeline: Vec<TimelineItem>,
    /// The full updated private notes
    pub scratchpad: String,
}

impl UpdateWorld {
    pub fn into_update(self) -> Result<WorldUpdate, OracleError> {
        if self.narrative.trim().is_empty() {
            return Err(OracleError::Malformed("empty narrative".to_string()));
        }
        Ok(WorldUpdate {
            current_date_time: parse_date_time("current_date_time", &self.current_date_time)?,
            private_ledger: into_private_ledger(self.timeline, self.scratchpad)?,
            narrative_text: self.narrative,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_forecast_schema() {
        assert_eq!(ForecastOutcomes::tool_name(), "forecast_outcomes");
        let schema = ForecastOutcomes::input_schema();
        let outcomes = &schema["properties"]["outcomes"];
        assert_eq!(outcomes["type"], "array");
        assert_eq!(outcomes["minItems"], 1);
        assert_eq!(outcomes["items"]["properties"]["weight"]["type"], "number");

        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "outcomes"));
        assert!(!required.iter().any(|v| v == "rationale"));
    }

    #[test]
    fn test_update_world_schema_nests_timeline() {
        let tool = UpdateWorld::as_tool();
        assert_eq!(tool.name, "update_world");
        assert!(!tool.description.is_empty());
        let items = &tool.input_schema["properties"]["timeline"]["items"];
        assert_eq!(items["properties"]["at"]["type"], "string");
    }

    #[test]
    fn test_forecast_decoding() {
        let raw = json!({
            "outcomes": [
                {"outcome": "succeeds quietly", "weight": 0.7},
                {"outcome": "triggers alarm", "weight": 0.3}
            ]
        });
        let decoded: ForecastOutcomes = serde_json::from_value(raw).unwrap();
        let forecast = decoded.into_forecast().unwrap();
        assert_eq!(forecast.outcomes.len(), 2);
        assert_eq!(forecast.outcomes[1].label, "triggers alarm");
        assert!(forecast.rationale.is_none());
    }

    #[test]
    fn test_empty_forecast_is_malformed() {
        let decoded: ForecastOutcomes = serde_json::from_value(json!({"outcomes": []})).unwrap();
        assert!(matches!(decoded.into_forecast(), Err(OracleError::Malformed(_))));
    }

    #[test]
    fn test_update_decoding_parses_times() {
        let raw = json!({
            "narrative": "Dawn breaks over the river.",
            "current_date_time": "1944-06-06 08:30",
            "timeline": [
                {"at": "1944-06-06 12:00", "event": "Counterattack"},
                {"at": "1944-06-06 09:00", "event": "Air support arrives"}
            ],
            "scratchpad": "Red is overextended."
        });
        let decoded: UpdateWorld = serde_json::from_value(raw).unwrap();
        let update = decoded.into_update().unwrap();
        assert_eq!(format_date_time(update.current_date_time), "1944-06-06 08:30");
        assert_eq!(update.private_ledger.timeline[0].event, "Air support arrives");
    }

    #[test]
    fn test_bad_time_is_malformed() {
        let raw = json!({
            "narrative": "x",
            "current_date_time": "next tuesday",
            "timeline": [],
            "scratchpad": ""
        });
        let decoded: UpdateWorld = serde_json::from_value(raw).unwrap();
        assert!(matches!(decoded.into_update(), Err(OracleError::Malformed(_))));
    }
}

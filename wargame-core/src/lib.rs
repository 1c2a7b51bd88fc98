//! Branching narrative wargame engine driven by an AI umpire.
//!
//! This crate provides:
//! - A content-addressed, branching ledger of world snapshots with rollback
//! - Concurrent forecast, weighted sampling, and a single narrative merge per round
//! - An oracle facade with a Claude-backed implementation and a scripted mock
//! - Scenario persistence
//!
//! # Quick Start
//!
//! ```ignore
//! use wargame_core::{InteractionKind, PlayerRef, ScenarioSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SessionConfig::new("Defence of the river crossing")
//!         .with_player(PlayerRef::new(1, "Alice", "Blue force commander"))
//!         .with_player(PlayerRef::new(2, "Bob", "Red force commander"))
//!         .from_env();
//!
//!     let oracle = config.claude_oracle()?;
//!     let mut session = ScenarioSession::start(config, oracle).await?;
//!
//!     session.enqueue(InteractionKind::Action, 1, "Blow the bridge at dawn")?;
//!     let round = session.resolve().await?;
//!     println!("{}", round.narrative);
//!
//!     session.save("crossing.json").await?;
//!     Ok(())
//! }
//! ```

pub mod hash;
pub mod ledger;
pub mod oracle;
pub mod persist;
pub mod pipeline;
pub mod queue;
pub mod sampler;
pub mod session;
pub mod state;
pub mod testing;

// Re-export for convenience
pub use wargame_macros::Tool;

// Primary public API
pub use hash::ContentHash;
pub use ledger::{Ledger, LedgerError, LedgerNode};
pub use oracle::{ClaudeOracle, Oracle, OracleConfig, OracleError};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
pub use queue::{InteractionQueue, QueueState};
pub use sampler::{Outcome, OutcomeSampler};
pub use session::{ScenarioSession, SessionConfig, SessionError};
pub use state::{Interaction, InteractionKind, PlayerId, PlayerRef, StateSnapshot};
pub use testing::MockOracle;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// Report the strength of a unit
    #[derive(Tool, Deserialize)]
    #[tool(name = "report_strength")]
    struct ReportStrength {
        /// Unit designation like "2nd Battalion"
        unit: String,
        /// Effective strength as a fraction of establishment
        strength: f64,
        /// Optional free-text remarks
        remarks: Option<String>,
    }

    #[test]
    fn test_tool_derive() {
        assert_eq!(ReportStrength::tool_name(), "report_strength");
        assert_eq!(
            ReportStrength::tool_description(),
            "Report the strength of a unit"
        );
    }

    #[test]
    fn test_tool_schema() {
        let schema = ReportStrength::input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["unit"]["type"], "string");
        assert_eq!(schema["properties"]["strength"]["type"], "number");
        assert_eq!(schema["properties"]["remarks"]["type"], "string");

        // remarks is an Option, so it is not required
        let required = schema["required"].as_array().unwrap();
        assert!(required.iter().any(|v| v == "unit"));
        assert!(!required.iter().any(|v| v == "remarks"));
    }
}

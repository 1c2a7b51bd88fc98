//! World state model.
//!
//! A [`StateSnapshot`] is the complete, immutable world state at one point of
//! the branching history. Snapshots are never edited in place: every round
//! produces a new snapshot from its parent via [`StateSnapshot::advance`].

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Opaque player identifier, unique within a session.
pub type PlayerId = u64;

/// A participant in the scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub id: PlayerId,
    pub display_name: String,
    pub role_description: String,
}

impl PlayerRef {
    pub fn new(
        id: PlayerId,
        display_name: impl Into<String>,
        role_description: impl Into<String>,
    ) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            role_description: role_description.into(),
        }
    }
}

impl fmt::Display for PlayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name)
    }
}

/// What a player interaction asks of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionKind {
    /// A question about the world. Forecast, but never consumes time.
    Info,
    /// A world-truth correction. Merged verbatim, never forecast.
    Feed,
    /// An order. Forecast, and may advance the clock.
    Action,
}

impl InteractionKind {
    pub fn label(&self) -> &'static str {
        match self {
            InteractionKind::Info => "INFO",
            InteractionKind::Feed => "FEED",
            InteractionKind::Action => "ACTION",
        }
    }

    /// Whether interactions of this kind go through the forecast step.
    pub fn is_resolvable(&self) -> bool {
        !matches!(self, InteractionKind::Feed)
    }

    /// Whether interactions of this kind may move the in-world clock.
    pub fn advances_time(&self) -> bool {
        matches!(self, InteractionKind::Action)
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
#[error("Unknown interaction kind: {0} (expected info, feed or action)")]
pub struct ParseKindError(String);

impl FromStr for InteractionKind {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(InteractionKind::Info),
            "feed" => Ok(InteractionKind::Feed),
            "action" => Ok(InteractionKind::Action),
            _ => Err(ParseKindError(s.to_string())),
        }
    }
}

/// A single player submission. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub kind: InteractionKind,
    pub actor: PlayerRef,
    pub text: String,
}

impl Interaction {
    pub fn new(kind: InteractionKind, actor: PlayerRef, text: impl Into<String>) -> Self {
        Self {
            kind,
            actor,
            text: text.into(),
        }
    }

    pub fn info(actor: PlayerRef, text: impl Into<String>) -> Self {
        Self::new(InteractionKind::Info, actor, text)
    }

    pub fn feed(actor: PlayerRef, text: impl Into<String>) -> Self {
        Self::new(InteractionKind::Feed, actor, text)
    }

    pub fn action(actor: PlayerRef, text: impl Into<String>) -> Self {
        Self::new(InteractionKind::Action, actor, text)
    }
}

/// Renders as `<KIND> <actor>: <text>`.
impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.actor, self.text)
    }
}

/// Who a canon record speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CanonRole {
    /// The players' side: scenario setup and round summaries.
    Players,
    /// The umpire's narration.
    Narrator,
}

/// One entry of the shared, append-only transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonEntry {
    pub role: CanonRole,
    pub content: String,
}

impl CanonEntry {
    pub fn players(content: impl Into<String>) -> Self {
        Self {
            role: CanonRole::Players,
            content: content.into(),
        }
    }

    pub fn narrator(content: impl Into<String>) -> Self {
        Self {
            role: CanonRole::Narrator,
            content: content.into(),
        }
    }
}

/// A planned or past event in the oracle's private timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub at: NaiveDateTime,
    pub event: String,
}

/// Oracle-only memory, never shown to players.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateLedger {
    /// Chronological; kept sorted by [`PrivateLedger::new`].
    pub timeline: Vec<TimelineEntry>,
    pub scratchpad: String,
}

impl PrivateLedger {
    pub fn new(mut timeline: Vec<TimelineEntry>, scratchpad: impl Into<String>) -> Self {
        timeline.sort_by_key(|entry| entry.at);
        Self {
            timeline,
            scratchpad: scratchpad.into(),
        }
    }

    /// Timeline entries scheduled strictly after `now`.
    pub fn upcoming(&self, now: NaiveDateTime) -> impl Iterator<Item = &TimelineEntry> {
        self.timeline.iter().filter(move |entry| entry.at > now)
    }
}

/// The authoritative world state at one point in simulated time.
///
/// Field order is part of the content hash: serialization walks the fields
/// in declaration order and every collection is a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub canon: Vec<CanonEntry>,
    pub private_ledger: PrivateLedger,
    pub current_date_time: NaiveDateTime,
}

impl StateSnapshot {
    /// The opening snapshot: the scenario setup followed by the briefing.
    pub fn opening(
        setup: impl Into<String>,
        briefing: impl Into<String>,
        private_ledger: PrivateLedger,
        start: NaiveDateTime,
    ) -> Self {
        Self {
            canon: vec![CanonEntry::players(setup), CanonEntry::narrator(briefing)],
            private_ledger,
            current_date_time: start,
        }
    }

    /// The next snapshot after one committed round.
    ///
    /// Appends exactly two canon records (round summary, narration) and
    /// replaces the private ledger and the clock.
    pub fn advance(
        &self,
        round_summary: impl Into<String>,
        narrative: impl Into<String>,
        private_ledger: PrivateLedger,
        current_date_time: NaiveDateTime,
    ) -> Self {
        let mut canon = Vec::with_capacity(self.canon.len() + 2);
        canon.extend(self.canon.iter().cloned());
        canon.push(CanonEntry::players(round_summary));
        canon.push(CanonEntry::narrator(narrative));

        Self {
            canon,
            private_ledger,
            current_date_time,
        }
    }

    /// The most recent narrator record.
    pub fn latest_narration(&self) -> Option<&str> {
        self.canon
            .iter()
            .rev()
            .find(|entry| entry.role == CanonRole::Narrator)
            .map(|entry| entry.content.as_str())
    }

    /// Number of committed rounds since the opening.
    pub fn round(&self) -> usize {
        self.canon.len().saturating_sub(2) / 2
    }
}

/// Render the setup record for a new scenario.
pub fn render_setup(topic: &str, players: &[PlayerRef]) -> String {
    let mut setup = format!("Scenario: {topic}\n\nParticipants:\n");
    for player in players {
        setup.push_str(&format!(
            "- {} ({})\n",
            player.display_name, player.role_description
        ));
    }
    setup
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1944, 6, 6)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn alice() -> PlayerRef {
        PlayerRef::new(1, "Alice", "Commander, 2nd Brigade")
    }

    #[test]
    fn test_interaction_display() {
        let action = Interaction::action(alice(), "storm the base");
        assert_eq!(action.to_string(), "ACTION Alice: storm the base");
        assert_eq!(Interaction::feed(alice(), "x").to_string(), "FEED Alice: x");
    }

    #[test]
    fn test_kind_properties() {
        assert!(InteractionKind::Action.advances_time());
        assert!(!InteractionKind::Info.advances_time());
        assert!(!InteractionKind::Feed.advances_time());
        assert!(InteractionKind::Info.is_resolvable());
        assert!(!InteractionKind::Feed.is_resolvable());
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("ACTION".parse::<InteractionKind>().unwrap(), InteractionKind::Action);
        assert_eq!("feed".parse::<InteractionKind>().unwrap(), InteractionKind::Feed);
        assert!("order".parse::<InteractionKind>().is_err());
    }

    #[test]
    fn test_advance_appends_two_records() {
        let opening = StateSnapshot::opening("setup", "briefing", PrivateLedger::default(), at(6));
        assert_eq!(opening.canon.len(), 2);
        assert_eq!(opening.round(), 0);

        let next = opening.advance(
            "ACTION Alice: advance\nOutcome: holds",
            "The line holds.",
            PrivateLedger::new(vec![], "note"),
            at(8),
        );
        assert_eq!(next.canon.len(), 4);
        assert_eq!(next.round(), 1);
        assert_eq!(next.latest_narration(), Some("The line holds."));
        assert_eq!(next.canon[2].role, CanonRole::Players);
        // Parent untouched
        assert_eq!(opening.canon.len(), 2);
        assert_eq!(opening.latest_narration(), Some("briefing"));
    }

    #[test]
    fn test_private_ledger_sorted() {
        let ledger = PrivateLedger::new(
            vec![
                TimelineEntry {
                    at: at(12),
                    event: "reinforcements".into(),
                },
                TimelineEntry {
                    at: at(7),
                    event: "dawn patrol".into(),
                },
            ],
            "",
        );
        assert_eq!(ledger.timeline[0].event, "dawn patrol");
        assert_eq!(ledger.upcoming(at(8)).count(), 1);
    }

    #[test]
    fn test_render_setup() {
        let setup = render_setup("Operation Overlord", &[alice()]);
        assert!(setup.contains("Operation Overlord"));
        assert!(setup.contains("- Alice (Commander, 2nd Brigade)"));
    }
}

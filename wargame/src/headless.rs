//! Headless mode for running a wargame.
//!
//! A simple line-oriented protocol on stdin/stdout, suitable for a
//! facilitator at a terminal, scripted runs, and AI agents.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use wargame_core::persist::default_save_path;
use wargame_core::session::{HistoryEntry, RoundReport, SessionStatus};
use wargame_core::{InteractionKind, Oracle, ScenarioSession, SessionConfig};

/// A parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Submit {
        kind: InteractionKind,
        player: String,
        text: String,
    },
    Resolve,
    Rollback(Option<String>),
    History,
    Branches,
    Status,
    Save(Option<PathBuf>),
    Load(PathBuf),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let body = line
            .trim()
            .strip_prefix('#')
            .ok_or_else(|| "Commands start with '#'. Type #help for help.".to_string())?;
        let (name, rest) = match body.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (body, ""),
        };

        match name.to_lowercase().as_str() {
            "info" | "feed" | "action" => {
                let kind: InteractionKind = name.parse().map_err(|e| format!("{e}"))?;
                let (player, text) = rest
                    .split_once(char::is_whitespace)
                    .map(|(p, t)| (p.trim(), t.trim()))
                    .filter(|(_, t)| !t.is_empty())
                    .ok_or_else(|| format!("Usage: #{} <player> <text>", name.to_lowercase()))?;
                Ok(Command::Submit {
                    kind,
                    player: player.to_string(),
                    text: text.to_string(),
                })
            }
            "resolve" => Ok(Command::Resolve),
            "rollback" => Ok(Command::Rollback(
                Some(rest).filter(|r| !r.is_empty()).map(str::to_string),
            )),
            "history" => Ok(Command::History),
            "branches" => Ok(Command::Branches),
            "status" => Ok(Command::Status),
            "save" => Ok(Command::Save(
                Some(rest).filter(|r| !r.is_empty()).map(PathBuf::from),
            )),
            "load" if !rest.is_empty() => Ok(Command::Load(PathBuf::from(rest))),
            "load" => Err("Usage: #load <path>".to_string()),
            "help" => Ok(Command::Help),
            "quit" | "exit" => Ok(Command::Quit),
            _ => Err("Unknown command. Type #help for help.".to_string()),
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  #info <player> <text>   - Ask the umpire a question");
    println!("  #feed <player> <text>   - Declare a fact about the world");
    println!("  #action <player> <text> - Give an order");
    println!("  #resolve                - Resolve everything queued as one round");
    println!("  #rollback [hash]        - Go back one round, or to any node by full hash");
    println!("  #history                - Show the path from the start to here");
    println!("  #branches               - Show rounds branching from here");
    println!("  #status                 - Show scenario status");
    println!("  #save [path]            - Save the scenario");
    println!("  #load <path>            - Load a saved scenario");
    println!("  #help                   - Show this help");
    println!("  #quit                   - Exit");
}

fn print_status(status: &SessionStatus) {
    println!("[STATUS]");
    println!("  Scenario: {} ({})", status.topic, status.scenario_id);
    println!("  Position: {} ({})", status.current.short(), status.current);
    println!("  Round: {}", status.round);
    println!("  Time: {}", status.current_date_time);
    println!(
        "  Queued: {} ({} info, {} feed, {} action)",
        status.queue.pending, status.queue.info, status.queue.feeds, status.queue.actions
    );
    println!("  Nodes: {}, branches here: {}", status.nodes, status.branches);
}

fn print_round(report: &RoundReport) {
    println!("[UMPIRE]");
    for para in report.narrative.split("\n\n") {
        println!("{para}");
    }
    println!();
    println!(
        "[ROUND] {} at {} ({})",
        report.hash.short(),
        report.current_date_time,
        report.hash
    );
    if !report.dropped.is_empty() {
        println!("[DROPPED] These could not be resolved; resubmit them if still wanted:");
        for dropped in &report.dropped {
            println!("  {} ({})", dropped.interaction, dropped.reason);
        }
    }
}

/// One `#history` row. The full digest is what `#rollback` accepts.
fn history_line(round: usize, entry: &HistoryEntry) -> String {
    format!(
        "  {round:>3}  {}  {}  ({} records)  {}",
        entry.hash.short(),
        entry.current_date_time,
        entry.canon_len,
        entry.hash
    )
}

/// Run a session interactively until `#quit` or end of input.
pub async fn run_headless(
    mut session: ScenarioSession,
    config: SessionConfig,
    oracle: Arc<dyn Oracle>,
) -> anyhow::Result<()> {
    println!("=== Wargame Headless Mode ===");
    println!("Scenario: {}", session.topic());
    for player in session.players() {
        println!("  {} - {}", player.display_name, player.role_description);
    }
    println!();
    if let Some(briefing) = session.latest_narration() {
        println!("[UMPIRE]");
        println!("{briefing}");
        println!();
    }
    print_help();
    println!();

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(message) => {
                println!("[ERROR] {message}");
                continue;
            }
        };

        match command {
            Command::Quit => {
                println!("Goodbye!");
                break;
            }
            Command::Help => print_help(),
            Command::Submit { kind, player, text } => {
                let id = session
                    .player_by_name(&player)
                    .or_else(|| player.parse().ok().and_then(|id| session.player(id)))
                    .map(|p| p.id);
                match id {
                    Some(id) => match session.enqueue(kind, id, text) {
                        Ok(state) => println!(
                            "[QUEUED] {kind} from {player} ({} pending)",
                            state.pending
                        ),
                        Err(e) => println!("[ERROR] {}", e.user_message()),
                    },
                    None => println!("[ERROR] No participant named {player}"),
                }
            }
            Command::Resolve => {
                print!("[PROCESSING]");
                stdout.flush().ok();
                let result = session.resolve().await;
                print!("\r            \r");
                stdout.flush().ok();

                match result {
                    Ok(report) => print_round(&report),
                    Err(e) => println!("[ERROR] {}", e.user_message()),
                }
            }
            Command::Rollback(target) => match session.rollback(target.as_deref()) {
                Ok(report) => {
                    println!(
                        "[ROLLBACK] Now at {} ({}), {}",
                        report.hash.short(),
                        report.hash,
                        report.current_date_time
                    );
                    for discarded in &report.discarded {
                        println!("  discarded: {discarded}");
                    }
                }
                Err(e) => println!("[ERROR] {}", e.user_message()),
            },
            Command::History => match session.history() {
                Ok(history) => {
                    println!("[HISTORY]");
                    for (round, entry) in history.iter().enumerate() {
                        println!("{}", history_line(round, entry));
                    }
                }
                Err(e) => println!("[ERROR] {}", e.user_message()),
            },
            Command::Branches => {
                let branches = session.branches();
                if branches.is_empty() {
                    println!("[BRANCHES] none");
                }
                for branch in branches {
                    let preview: String = branch
                        .narration
                        .unwrap_or_default()
                        .chars()
                        .take(60)
                        .collect();
                    println!("[BRANCH] {}  {}  {preview}", branch.hash, branch.current_date_time);
                }
            }
            Command::Status => print_status(&session.status()),
            Command::Save(path) => {
                let path = path.unwrap_or_else(|| {
                    default_save_path(".", session.topic(), session.scenario_id())
                });
                match session.save(&path).await {
                    Ok(()) => println!("[SAVED] Scenario saved to {}", path.display()),
                    Err(e) => println!("[ERROR] Save failed: {}", e.user_message()),
                }
            }
            Command::Load(path) => {
                match ScenarioSession::load(&path, &config, oracle.clone()).await {
                    Ok(loaded) => {
                        session = loaded;
                        println!("[LOADED] Scenario loaded from {}", path.display());
                        print_status(&session.status());
                    }
                    Err(e) => println!("[ERROR] Load failed: {}", e.user_message()),
                }
            }
        }
        stdout.flush().ok();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wargame_core::testing::sample_briefing;
    use wargame_core::ContentHash;

    #[test]
    fn test_parse_submission() {
        let command: Command = "#action Alice Storm the base, 2 hours, stealth approach"
            .parse()
            .unwrap();
        assert_eq!(
            command,
            Command::Submit {
                kind: InteractionKind::Action,
                player: "Alice".to_string(),
                text: "Storm the base, 2 hours, stealth approach".to_string(),
            }
        );

        let command: Command = "#FEED bob  the bridge is out".parse().unwrap();
        assert!(matches!(
            command,
            Command::Submit {
                kind: InteractionKind::Feed,
                ref text,
                ..
            } if text == "the bridge is out"
        ));
    }

    #[test]
    fn test_submission_needs_text() {
        assert!("#info Alice".parse::<Command>().is_err());
        assert!("#info".parse::<Command>().is_err());
    }

    #[test]
    fn test_parse_optional_arguments() {
        assert_eq!("#rollback".parse::<Command>(), Ok(Command::Rollback(None)));
        assert_eq!(
            "#rollback abc123".parse::<Command>(),
            Ok(Command::Rollback(Some("abc123".to_string())))
        );
        assert_eq!("#save".parse::<Command>(), Ok(Command::Save(None)));
        assert_eq!(
            "#save run.json".parse::<Command>(),
            Ok(Command::Save(Some(PathBuf::from("run.json"))))
        );
        assert!("#load".parse::<Command>().is_err());
    }

    #[test]
    fn test_history_line_shows_full_hash() {
        let hash = ContentHash::from_bytes([0xab; 32]);
        let entry = HistoryEntry {
            hash,
            canon_len: 4,
            current_date_time: sample_briefing().start_date_time,
        };
        let line = history_line(1, &entry);
        assert!(line.contains(&hash.to_hex()));
        assert!(line.contains("(4 records)"));

        // The last column can be pasted straight into #rollback
        let typed = line.split_whitespace().last().unwrap();
        assert_eq!(
            format!("#rollback {typed}").parse::<Command>(),
            Ok(Command::Rollback(Some(hash.to_hex())))
        );
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert!("advance on the ridge".parse::<Command>().is_err());
        assert!("#dance".parse::<Command>().is_err());
        assert_eq!("#exit".parse::<Command>(), Ok(Command::Quit));
    }
}

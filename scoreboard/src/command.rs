//! Chat-style command lines (`/win Fra 3`) parsed into typed commands.

use std::sync::LazyLock;

use anyhow::{Result, anyhow, bail};
use regex::Regex;

use crate::ledger::{MAX_ROUNDS, MatchResult, Tally, Team};

static QUANTITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{1,9}$").expect("quantity regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Record { name: String, tally: Tally, qty: u32 },
    Remove { name: String, tally: Tally, qty: u32 },
    AddPlayer { name: String },
    Match(MatchResult),
    Reset { password: String },
    Totals,
    WeeklyReport,
    Players,
    History { name: String },
    Help,
}

impl BotCommand {
    /// True for commands that change the documents (and therefore sync).
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            BotCommand::Record { .. }
                | BotCommand::Remove { .. }
                | BotCommand::AddPlayer { .. }
                | BotCommand::Match(_)
                | BotCommand::Reset { .. }
        )
    }
}

/// Parse one console line. Command names are case-insensitive.
pub fn parse_command(line: &str) -> Result<BotCommand> {
    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        bail!("empty command");
    };
    let Some(verb) = head.strip_prefix('/') else {
        bail!("commands start with '/', try /help");
    };
    let args: Vec<&str> = tokens.collect();

    let command = match verb.to_ascii_lowercase().as_str() {
        "win" => BotCommand::Record {
            name: required(&args, 0, "/win <name> [qty]")?,
            tally: Tally::Win,
            qty: quantity(&args),
        },
        "lose" => BotCommand::Record {
            name: required(&args, 0, "/lose <name> [qty]")?,
            tally: Tally::Loss,
            qty: quantity(&args),
        },
        "winremove" => BotCommand::Remove {
            name: required(&args, 0, "/winRemove <name> [qty]")?,
            tally: Tally::Win,
            qty: quantity(&args),
        },
        "loseremove" => BotCommand::Remove {
            name: required(&args, 0, "/loseRemove <name> [qty]")?,
            tally: Tally::Loss,
            qty: quantity(&args),
        },
        "add" => BotCommand::AddPlayer {
            name: required(&args, 0, "/add <name>")?,
        },
        "match" => BotCommand::Match(parse_match(&args)?),
        "reset" => BotCommand::Reset {
            password: required(&args, 0, "/reset <password>")?,
        },
        "totals" => BotCommand::Totals,
        "report" => BotCommand::WeeklyReport,
        "players" => BotCommand::Players,
        "history" => BotCommand::History {
            name: required(&args, 0, "/history <name>")?,
        },
        "help" | "start" => BotCommand::Help,
        other => bail!("unknown command '/{other}', try /help"),
    };
    Ok(command)
}

/// Build a match from `b1 b2 r1 r2 w1 [w2 w3]`.
pub fn parse_match<S: AsRef<str>>(args: &[S]) -> Result<MatchResult> {
    const USAGE: &str = "/match <blue1> <blue2> <red1> <red2> <winner...>";
    if args.len() < 5 {
        bail!("usage: {USAGE}");
    }
    if args.len() > 4 + MAX_ROUNDS {
        bail!("a match has at most {MAX_ROUNDS} rounds");
    }
    let name = |idx: usize| args[idx].as_ref().to_string();
    let rounds = args[4..]
        .iter()
        .map(|winner| parse_team(winner.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    Ok(MatchResult {
        blue: [name(0), name(1)],
        red: [name(2), name(3)],
        rounds,
    })
}

pub fn parse_team(raw: &str) -> Result<Team> {
    match raw.to_ascii_lowercase().as_str() {
        "blue" | "b" => Ok(Team::Blue),
        "red" | "r" => Ok(Team::Red),
        _ => Err(anyhow!("round winner must be 'blue' or 'red', got '{raw}'")),
    }
}

fn required(args: &[&str], idx: usize, usage: &str) -> Result<String> {
    args.get(idx)
        .map(|arg| (*arg).to_string())
        .ok_or_else(|| anyhow!("usage: {usage}"))
}

/// Second argument as a quantity; anything non-numeric counts as 1, as does 0.
fn quantity(args: &[&str]) -> u32 {
    args.get(1)
        .filter(|raw| QUANTITY.is_match(raw))
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_win_with_and_without_quantity() {
        assert_eq!(
            parse_command("/win Fra 3").expect("parse"),
            BotCommand::Record {
                name: "Fra".to_string(),
                tally: Tally::Win,
                qty: 3
            }
        );
        assert_eq!(
            parse_command("/lose joel").expect("parse"),
            BotCommand::Record {
                name: "joel".to_string(),
                tally: Tally::Loss,
                qty: 1
            }
        );
    }

    #[test]
    fn non_numeric_or_zero_quantity_becomes_one() {
        for line in ["/win Fra abc", "/win Fra 0", "/win Fra -2"] {
            let BotCommand::Record { qty, .. } = parse_command(line).expect("parse") else {
                panic!("expected record for {line}");
            };
            assert_eq!(qty, 1, "{line}");
        }
    }

    #[test]
    fn remove_verbs_are_case_insensitive() {
        assert_eq!(
            parse_command("/winRemove Dani 2").expect("parse"),
            BotCommand::Remove {
                name: "Dani".to_string(),
                tally: Tally::Win,
                qty: 2
            }
        );
        assert!(matches!(
            parse_command("/LOSEREMOVE Dani").expect("parse"),
            BotCommand::Remove {
                tally: Tally::Loss,
                ..
            }
        ));
    }

    #[test]
    fn parses_match_rounds() {
        let BotCommand::Match(result) =
            parse_command("/match Fra Dani Salvo Joel blue red blue").expect("parse")
        else {
            panic!("expected match");
        };
        assert_eq!(result.blue, ["Fra".to_string(), "Dani".to_string()]);
        assert_eq!(result.red, ["Salvo".to_string(), "Joel".to_string()]);
        assert_eq!(result.rounds, vec![Team::Blue, Team::Red, Team::Blue]);
    }

    #[test]
    fn rejects_bad_match_lines() {
        assert!(parse_command("/match Fra Dani Salvo Joel").is_err());
        assert!(parse_command("/match Fra Dani Salvo Joel blue red blue red").is_err());
        let err = parse_command("/match Fra Dani Salvo Joel green").expect_err("team");
        assert!(err.to_string().contains("green"));
    }

    #[test]
    fn missing_arguments_report_usage() {
        let err = parse_command("/add").expect_err("usage");
        assert!(err.to_string().contains("/add <name>"));
        assert!(parse_command("/history").is_err());
    }

    #[test]
    fn report_verb_parses_to_weekly_report() {
        assert_eq!(parse_command("/Report").expect("parse"), BotCommand::WeeklyReport);
    }

    #[test]
    fn rejects_unknown_and_unprefixed_lines() {
        assert!(parse_command("/dance").is_err());
        assert!(parse_command("win Fra").is_err());
        assert!(parse_command("   ").is_err());
    }

    #[test]
    fn only_document_changes_are_mutations() {
        assert!(parse_command("/reset pw").expect("parse").is_mutation());
        assert!(!parse_command("/totals").expect("parse").is_mutation());
        assert!(!parse_command("/report").expect("parse").is_mutation());
        assert!(!parse_command("/help").expect("parse").is_mutation());
    }
}

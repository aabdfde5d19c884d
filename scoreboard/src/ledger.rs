//! Mutations and queries over the two score documents.
//!
//! Every mutation updates memory, writes the affected documents to disk, and
//! returns a [`Mutation`]: the reply for the user plus the [`ChangeSet`] to
//! sync. The on-disk write is authoritative; syncing happens afterwards.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use engine::ChangeSet;
use regex::Regex;
use tracing::{debug, info};

use crate::config::ScoreboardConfig;
use crate::store::{
    Record, Standings, WeeklyStandings, load_standings, load_weekly, write_json,
};
use crate::week::Clock;

static PLAYER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\p{L}+$").expect("player name regex"));

/// True if `name` is a non-empty run of letters.
pub fn is_valid_player_name(name: &str) -> bool {
    PLAYER_NAME.is_match(name)
}

/// First letter upper-case, the rest lower-case.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Which counter a mutation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tally {
    Win,
    Loss,
}

/// Side of a two-versus-two match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Team {
    Blue,
    Red,
}

/// A finished match: two players per team and the winner of each round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub blue: [String; 2],
    pub red: [String; 2],
    pub rounds: Vec<Team>,
}

pub const MAX_ROUNDS: usize = 3;

/// Result of a successful mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub reply: String,
    pub change_set: ChangeSet,
}

#[derive(Debug)]
pub struct Ledger {
    totals_path: PathBuf,
    weekly_path: PathBuf,
    totals_file: PathBuf,
    weekly_file: PathBuf,
    reset_password: Option<String>,
    clock: Clock,
    roster: Vec<String>,
    totals: Standings,
    weekly: WeeklyStandings,
}

impl Ledger {
    /// Load both documents, making sure every rostered player has counters.
    pub fn open(config: &ScoreboardConfig, clock: Clock) -> Result<Self> {
        let totals_path = config.totals_path();
        let weekly_path = config.weekly_path();
        let totals = load_standings(&totals_path)?;
        let weekly = load_weekly(&weekly_path)?;

        let mut roster = Vec::new();
        for name in config.roster.iter().chain(totals.keys()) {
            if !roster.contains(name) {
                roster.push(name.clone());
            }
        }

        let mut ledger = Self {
            totals_path,
            weekly_path,
            totals_file: config.totals_file.clone(),
            weekly_file: config.weekly_file.clone(),
            reset_password: config.reset_password.clone(),
            clock,
            roster,
            totals,
            weekly,
        };
        ledger.fill_missing_players();
        debug!(players = ledger.roster.len(), "ledger opened");
        Ok(ledger)
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn totals(&self) -> &Standings {
        &self.totals
    }

    pub fn weekly(&self) -> &WeeklyStandings {
        &self.weekly
    }

    pub fn week_key(&self) -> String {
        self.clock.week_key()
    }

    /// Counters for the current week (zeros for players without games).
    pub fn current_week(&self) -> Standings {
        let mut week = self
            .weekly
            .get(&self.week_key())
            .cloned()
            .unwrap_or_default();
        for name in &self.roster {
            week.entry(name.clone()).or_default();
        }
        week
    }

    /// Canonical roster spelling for `name`, matched case-insensitively.
    pub fn resolve(&self, name: &str) -> Result<String> {
        let wanted = name.trim().to_lowercase();
        self.roster
            .iter()
            .find(|candidate| candidate.to_lowercase() == wanted)
            .cloned()
            .ok_or_else(|| anyhow!("unknown player '{}'", name.trim()))
    }

    /// Add `qty` (at least 1) to a player's wins or losses.
    pub fn record(&mut self, name: &str, tally: Tally, qty: u32) -> Result<Mutation> {
        self.all_or_nothing(|ledger| ledger.apply_record(name, tally, qty))
    }

    /// Subtract `qty` (at least 1) from a player's wins or losses, never below zero.
    pub fn remove(&mut self, name: &str, tally: Tally, qty: u32) -> Result<Mutation> {
        self.all_or_nothing(|ledger| ledger.apply_remove(name, tally, qty))
    }

    /// Register a new player with zeroed counters.
    pub fn add_player(&mut self, raw: &str) -> Result<Mutation> {
        self.all_or_nothing(|ledger| ledger.apply_add_player(raw))
    }

    /// Apply a 2v2 match: each player gains their team's round wins as wins
    /// and the other team's round wins as losses.
    pub fn record_match(&mut self, result: &MatchResult) -> Result<Mutation> {
        self.all_or_nothing(|ledger| ledger.apply_match(result))
    }

    /// Zero the current week's counters. Only the weekly document changes.
    pub fn reset_week(&mut self, password: &str) -> Result<Mutation> {
        self.all_or_nothing(|ledger| ledger.apply_reset(password))
    }

    /// Run `apply`; on error, put the roster and both documents back as they were.
    fn all_or_nothing(
        &mut self,
        apply: impl FnOnce(&mut Self) -> Result<Mutation>,
    ) -> Result<Mutation> {
        let roster = self.roster.clone();
        let totals = self.totals.clone();
        let weekly = self.weekly.clone();
        let result = apply(self);
        if result.is_err() {
            debug!("mutation failed, in-memory documents restored");
            self.roster = roster;
            self.totals = totals;
            self.weekly = weekly;
        }
        result
    }

    fn apply_record(&mut self, name: &str, tally: Tally, qty: u32) -> Result<Mutation> {
        let name = self.resolve(name)?;
        let qty = qty.max(1);
        let week_key = self.week_key();

        let total = bump(self.totals.entry(name.clone()).or_default(), tally, qty);
        let week = bump(self.week_entry(&week_key, &name), tally, qty);
        self.save_all()?;

        let (label, verb) = match tally {
            Tally::Win => ("win", "Win"),
            Tally::Loss => ("lose", "Loss"),
        };
        info!(player = %name, qty, ?tally, "recorded");
        let reply = format!(
            "{verb} recorded for {name} (+{qty})\nThis week: {}\nCareer: {}",
            counter(week, tally),
            counter(total, tally),
        );
        self.mutation(reply, format!("{label}: {name} +{qty}"), true)
    }

    fn apply_remove(&mut self, name: &str, tally: Tally, qty: u32) -> Result<Mutation> {
        let name = self.resolve(name)?;
        let qty = qty.max(1);
        let week_key = self.week_key();

        let total = drop_count(self.totals.entry(name.clone()).or_default(), tally, qty);
        let week = drop_count(self.week_entry(&week_key, &name), tally, qty);
        self.save_all()?;

        let (label, noun) = match tally {
            Tally::Win => ("win-remove", "wins"),
            Tally::Loss => ("lose-remove", "losses"),
        };
        info!(player = %name, qty, ?tally, "removed");
        let reply = format!(
            "Removed {qty} {noun} from {name}\nCareer {noun}: {}\nThis week {noun}: {}",
            counter(total, tally),
            counter(week, tally),
        );
        self.mutation(reply, format!("{label}: {name} -{qty}"), true)
    }

    fn apply_add_player(&mut self, raw: &str) -> Result<Mutation> {
        let name = capitalize(raw);
        if !is_valid_player_name(&name) {
            bail!("player name must contain only letters, got '{}'", raw.trim());
        }
        if self
            .roster
            .iter()
            .any(|existing| existing.to_lowercase() == name.to_lowercase())
        {
            bail!("player '{name}' is already registered");
        }

        self.roster.push(name.clone());
        self.fill_missing_players();
        self.save_all()?;

        info!(player = %name, players = self.roster.len(), "player added");
        let reply = format!(
            "Player added: {name}\nPlayers registered: {}",
            self.roster.len()
        );
        self.mutation(reply, format!("player: added {name}"), true)
    }

    fn apply_match(&mut self, result: &MatchResult) -> Result<Mutation> {
        if result.rounds.is_empty() || result.rounds.len() > MAX_ROUNDS {
            bail!(
                "a match has 1 to {MAX_ROUNDS} rounds, got {}",
                result.rounds.len()
            );
        }
        let blue = [self.resolve(&result.blue[0])?, self.resolve(&result.blue[1])?];
        let red = [self.resolve(&result.red[0])?, self.resolve(&result.red[1])?];
        let distinct: BTreeSet<&String> = blue.iter().chain(red.iter()).collect();
        if distinct.len() != 4 {
            bail!("a match needs four different players");
        }

        let blue_rounds = count_rounds(&result.rounds, Team::Blue);
        let red_rounds = count_rounds(&result.rounds, Team::Red);
        let week_key = self.week_key();
        for (players, won, lost) in [(&blue, blue_rounds, red_rounds), (&red, red_rounds, blue_rounds)]
        {
            for name in players {
                for record in [
                    self.totals.entry(name.clone()).or_default(),
                    self.weekly
                        .entry(week_key.clone())
                        .or_default()
                        .entry(name.clone())
                        .or_default(),
                ] {
                    record.win = record.win.saturating_add(won);
                    record.lose = record.lose.saturating_add(lost);
                }
            }
        }
        self.save_all()?;

        info!(blue_rounds, red_rounds, "match recorded");
        let reply = format!(
            "Match recorded\nBlue: {} + {} ({blue_rounds} won)\nRed: {} + {} ({red_rounds} won)\nRounds played: {}",
            blue[0],
            blue[1],
            red[0],
            red[1],
            result.rounds.len(),
        );
        let message = format!("match: {}/{} vs {}/{}", blue[0], blue[1], red[0], red[1]);
        self.mutation(reply, message, true)
    }

    fn apply_reset(&mut self, password: &str) -> Result<Mutation> {
        let Some(expected) = self.reset_password.as_deref() else {
            bail!("reset is disabled: no reset_password configured");
        };
        if password != expected {
            bail!("access denied: wrong reset password");
        }

        let week_key = self.week_key();
        let cleared: Standings = self
            .roster
            .iter()
            .map(|name| (name.clone(), Record::default()))
            .collect();
        self.weekly.insert(week_key.clone(), cleared);
        write_json(&self.weekly_path, &self.weekly)?;

        info!(week = %week_key, "week reset");
        let reply = format!("Weekly counters reset\nCurrent week: {week_key}");
        self.mutation(reply, format!("reset: week {week_key}"), false)
    }

    fn week_entry(&mut self, week_key: &str, name: &str) -> &mut Record {
        self.weekly
            .entry(week_key.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default()
    }

    fn fill_missing_players(&mut self) {
        let week_key = self.week_key();
        for name in &self.roster {
            self.totals.entry(name.clone()).or_default();
            self.weekly
                .entry(week_key.clone())
                .or_default()
                .entry(name.clone())
                .or_default();
        }
    }

    fn save_all(&mut self) -> Result<()> {
        self.fill_missing_players();
        write_json(&self.totals_path, &self.totals)?;
        write_json(&self.weekly_path, &self.weekly)?;
        Ok(())
    }

    fn mutation(&self, reply: String, message: String, totals_changed: bool) -> Result<Mutation> {
        let mut files = Vec::with_capacity(2);
        if totals_changed {
            files.push(self.totals_file.clone());
        }
        files.push(self.weekly_file.clone());
        let change_set = ChangeSet::new(files, message).context("build change set")?;
        Ok(Mutation { reply, change_set })
    }
}

fn bump(record: &mut Record, tally: Tally, qty: u32) -> Record {
    match tally {
        Tally::Win => record.win = record.win.saturating_add(qty),
        Tally::Loss => record.lose = record.lose.saturating_add(qty),
    }
    *record
}

fn drop_count(record: &mut Record, tally: Tally, qty: u32) -> Record {
    match tally {
        Tally::Win => record.win = record.win.saturating_sub(qty),
        Tally::Loss => record.lose = record.lose.saturating_sub(qty),
    }
    *record
}

fn counter(record: Record, tally: Tally) -> u32 {
    match tally {
        Tally::Win => record.win,
        Tally::Loss => record.lose,
    }
}

fn count_rounds(rounds: &[Team], team: Team) -> u32 {
    let count = rounds.iter().filter(|winner| **winner == team).count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::NaiveDate;

    use super::*;

    const WEEK: &str = "10/03/25";

    fn clock() -> Clock {
        Clock::Fixed(NaiveDate::from_ymd_opt(2025, 3, 12).expect("date"))
    }

    fn config(dir: &Path) -> ScoreboardConfig {
        ScoreboardConfig {
            data_dir: dir.to_path_buf(),
            roster: ["Fra", "Dani", "Salvo", "Joel"]
                .iter()
                .map(|name| name.to_string())
                .collect(),
            reset_password: Some("secret".to_string()),
            ..ScoreboardConfig::default()
        }
    }

    fn open(dir: &Path) -> Ledger {
        Ledger::open(&config(dir), clock()).expect("open ledger")
    }

    fn files(mutation: &Mutation) -> Vec<String> {
        mutation
            .change_set
            .files()
            .iter()
            .map(|path| path.display().to_string())
            .collect()
    }

    #[test]
    fn open_fills_roster_with_zero_counters() {
        let temp = tempfile::tempdir().expect("tempdir");
        let ledger = open(temp.path());
        assert_eq!(ledger.roster(), &["Fra", "Dani", "Salvo", "Joel"]);
        assert_eq!(ledger.totals()["Joel"], Record::default());
        assert_eq!(ledger.current_week()["Fra"], Record::default());
    }

    #[test]
    fn open_keeps_players_only_present_in_totals() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("stats_totals.json"),
            r#"{"Luca": {"win": 4, "lose": 2}}"#,
        )
        .expect("write");

        let ledger = open(temp.path());
        assert_eq!(ledger.roster().last().map(String::as_str), Some("Luca"));
        assert_eq!(ledger.totals()["Luca"], Record { win: 4, lose: 2 });
    }

    #[test]
    fn win_updates_both_documents_and_builds_change_set() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());

        let mutation = ledger.record("fra", Tally::Win, 3).expect("win");

        assert_eq!(mutation.change_set.message(), "win: Fra +3");
        assert_eq!(
            files(&mutation),
            vec!["stats_totals.json", "stats_weekly.json"]
        );
        assert!(mutation.reply.contains("This week: 3"));

        let reopened = open(temp.path());
        assert_eq!(reopened.totals()["Fra"].win, 3);
        assert_eq!(reopened.weekly()[WEEK]["Fra"].win, 3);
    }

    #[test]
    fn zero_quantity_counts_as_one() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        let mutation = ledger.record("Dani", Tally::Loss, 0).expect("lose");
        assert_eq!(mutation.change_set.message(), "lose: Dani +1");
        assert_eq!(ledger.totals()["Dani"].lose, 1);
    }

    #[test]
    fn remove_saturates_at_zero() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        ledger.record("Salvo", Tally::Win, 2).expect("win");

        let mutation = ledger.remove("Salvo", Tally::Win, 5).expect("remove");

        assert_eq!(mutation.change_set.message(), "win-remove: Salvo -5");
        assert_eq!(ledger.totals()["Salvo"].win, 0);
        assert_eq!(ledger.current_week()["Salvo"].win, 0);
    }

    #[test]
    fn unknown_player_is_rejected_without_writing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        let err = ledger.record("Nobody", Tally::Win, 1).expect_err("unknown");
        assert!(err.to_string().contains("unknown player"));
        assert!(!temp.path().join("stats_totals.json").exists());
    }

    #[test]
    fn failed_write_leaves_memory_matching_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        ledger.record("Fra", Tally::Win, 1).expect("win");
        // A directory where the document should be makes the rename fail.
        fs::remove_file(temp.path().join("stats_totals.json")).expect("remove");
        fs::create_dir(temp.path().join("stats_totals.json")).expect("block");

        assert!(ledger.record("Fra", Tally::Win, 2).is_err());
        assert!(ledger.add_player("Marco").is_err());

        assert_eq!(ledger.totals()["Fra"].win, 1);
        assert_eq!(ledger.current_week()["Fra"].win, 1);
        assert!(!ledger.roster().contains(&"Marco".to_string()));
    }

    #[test]
    fn add_player_capitalizes_and_rejects_duplicates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());

        let mutation = ledger.add_player("  marco ").expect("add");
        assert_eq!(mutation.change_set.message(), "player: added Marco");
        assert!(ledger.roster().contains(&"Marco".to_string()));
        assert_eq!(ledger.current_week()["Marco"], Record::default());

        let err = ledger.add_player("MARCO").expect_err("duplicate");
        assert!(err.to_string().contains("already registered"));
        let err = ledger.add_player("M4rco").expect_err("invalid");
        assert!(err.to_string().contains("only letters"));
    }

    #[test]
    fn match_scores_each_player_by_team_rounds() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        let result = MatchResult {
            blue: ["Fra".to_string(), "dani".to_string()],
            red: ["Salvo".to_string(), "Joel".to_string()],
            rounds: vec![Team::Blue, Team::Red, Team::Blue],
        };

        let mutation = ledger.record_match(&result).expect("match");

        assert_eq!(mutation.change_set.message(), "match: Fra/Dani vs Salvo/Joel");
        assert_eq!(ledger.totals()["Fra"], Record { win: 2, lose: 1 });
        assert_eq!(ledger.totals()["Dani"], Record { win: 2, lose: 1 });
        assert_eq!(ledger.totals()["Salvo"], Record { win: 1, lose: 2 });
        assert_eq!(ledger.current_week()["Joel"], Record { win: 1, lose: 2 });
    }

    #[test]
    fn match_rejects_repeated_players_and_bad_round_counts() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        let repeated = MatchResult {
            blue: ["Fra".to_string(), "Fra".to_string()],
            red: ["Salvo".to_string(), "Joel".to_string()],
            rounds: vec![Team::Red],
        };
        assert!(ledger.record_match(&repeated).is_err());

        let too_long = MatchResult {
            blue: ["Fra".to_string(), "Dani".to_string()],
            red: ["Salvo".to_string(), "Joel".to_string()],
            rounds: vec![Team::Red; 4],
        };
        assert!(ledger.record_match(&too_long).is_err());
        assert_eq!(ledger.totals()["Fra"], Record::default());
    }

    #[test]
    fn reset_zeroes_current_week_and_keeps_totals() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        ledger.record("Fra", Tally::Win, 4).expect("win");

        let mutation = ledger.reset_week("secret").expect("reset");

        assert_eq!(mutation.change_set.message(), format!("reset: week {WEEK}"));
        assert_eq!(files(&mutation), vec!["stats_weekly.json"]);
        assert_eq!(ledger.current_week()["Fra"], Record::default());
        assert_eq!(ledger.totals()["Fra"].win, 4);
    }

    #[test]
    fn reset_requires_matching_configured_password() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut ledger = open(temp.path());
        assert!(ledger.reset_week("wrong").is_err());

        let mut cfg = config(temp.path());
        cfg.reset_password = None;
        let mut ledger = Ledger::open(&cfg, clock()).expect("open");
        let err = ledger.reset_week("secret").expect_err("disabled");
        assert!(err.to_string().contains("disabled"));
    }

    #[test]
    fn capitalize_matches_display_convention() {
        assert_eq!(capitalize("dENNIS"), "Dennis");
        assert_eq!(capitalize(""), "");
        assert!(is_valid_player_name("Niccolò"));
        assert!(!is_valid_player_name("Jo Jo"));
    }
}

//! Plain-text reports over the ledger.

use std::fmt::Write as _;

use anyhow::Result;

use crate::ledger::Ledger;
use crate::store::Record;
use crate::week::parse_week_key;

const RULE: &str = "--------------------";

/// Standings sorted by career wins (ties keep roster order), with this week's counters.
pub fn standings(ledger: &Ledger) -> String {
    let week = ledger.current_week();
    let mut rows: Vec<(&str, Record)> = ledger
        .roster()
        .iter()
        .map(|name| {
            let total = ledger.totals().get(name).copied().unwrap_or_default();
            (name.as_str(), total)
        })
        .collect();
    rows.sort_by(|a, b| b.1.win.cmp(&a.1.win));

    let mut out = format!("STANDINGS\n{RULE}\n");
    for (idx, (name, total)) in rows.iter().enumerate() {
        let this_week = week.get(*name).copied().unwrap_or_default();
        let _ = writeln!(
            out,
            "{:>2}. {name}\n    total: {}W - {}L ({:.0}%)\n    week:  {}W - {}L",
            idx + 1,
            total.win,
            total.lose,
            total.win_rate(),
            this_week.win,
            this_week.lose,
        );
    }
    let _ = write!(out, "{RULE}\nWeek of {}", ledger.week_key());
    out
}

/// Registered players in roster order.
pub fn players(ledger: &Ledger) -> String {
    let mut out = format!("PLAYERS\n{RULE}\n");
    for (idx, name) in ledger.roster().iter().enumerate() {
        let _ = writeln!(out, "{:>2}. {name}", idx + 1);
    }
    let _ = write!(out, "{RULE}\nTotal: {} players", ledger.roster().len());
    out
}

/// One week's counters for a player.
#[derive(Debug, Clone, PartialEq)]
pub struct WeekLine {
    pub week: String,
    pub record: Record,
}

/// Weeks in which `name` has a counter, oldest first.
///
/// Keys that do not parse as week keys sort after the dated ones, by text.
pub fn weekly_history(ledger: &Ledger, name: &str) -> Vec<WeekLine> {
    let mut lines: Vec<WeekLine> = ledger
        .weekly()
        .iter()
        .filter_map(|(week, standings)| {
            standings.get(name).map(|record| WeekLine {
                week: week.clone(),
                record: *record,
            })
        })
        .collect();
    lines.sort_by(|a, b| {
        let key = |line: &WeekLine| (parse_week_key(&line.week).is_none(), parse_week_key(&line.week));
        key(a).cmp(&key(b)).then_with(|| a.week.cmp(&b.week))
    });
    lines
}

/// Career counters, week-by-week lines, and best/toughest week for a player.
pub fn history(ledger: &Ledger, name: &str) -> Result<String> {
    let name = ledger.resolve(name)?;
    let lines = weekly_history(ledger, &name);
    if lines.iter().all(|line| line.record.games() == 0) {
        return Ok(format!("No games recorded for {name}."));
    }

    let total = ledger.totals().get(&name).copied().unwrap_or_default();
    let mut out = format!(
        "HISTORY: {name}\n{RULE}\ntotal: {}W - {}L ({:.1}%)\n",
        total.win,
        total.lose,
        total.win_rate(),
    );
    for line in &lines {
        let _ = writeln!(
            out,
            "{}: {}W - {}L ({:.0}%)",
            line.week,
            line.record.win,
            line.record.lose,
            line.record.win_rate(),
        );
    }

    let _ = write!(
        out,
        "{RULE}\nbest week: {}\ntoughest week: {}",
        best_week(&lines).unwrap_or("-"),
        toughest_week(&lines).unwrap_or("-"),
    );
    Ok(out)
}

/// Earliest week with the highest win rate.
fn best_week(lines: &[WeekLine]) -> Option<&str> {
    let mut best: Option<&WeekLine> = None;
    for line in lines {
        if best.is_none_or(|current| line.record.win_rate() > current.record.win_rate()) {
            best = Some(line);
        }
    }
    best.map(|line| line.week.as_str())
}

/// Earliest week with the lowest non-zero win rate. Winless weeks are skipped.
fn toughest_week(lines: &[WeekLine]) -> Option<&str> {
    let mut worst: Option<&WeekLine> = None;
    for line in lines.iter().filter(|line| line.record.win_rate() > 0.0) {
        if worst.is_none_or(|current| line.record.win_rate() < current.record.win_rate()) {
            worst = Some(line);
        }
    }
    worst.map(|line| line.week.as_str())
}

/// How a player's week went, judged by win rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Form {
    NotPlayed,
    /// 70% or better.
    InForm,
    /// 50% or better.
    GoodWeek,
    CanDoBetter,
}

impl Form {
    pub fn of(record: Record) -> Self {
        if record.games() == 0 {
            return Form::NotPlayed;
        }
        let rate = record.win_rate();
        if rate >= 70.0 {
            Form::InForm
        } else if rate >= 50.0 {
            Form::GoodWeek
        } else {
            Form::CanDoBetter
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Form::NotPlayed => "did not play",
            Form::InForm => "in form",
            Form::GoodWeek => "good week",
            Form::CanDoBetter => "can do better",
        }
    }
}

/// This week's ranking by wins (ties keep roster order), with each player's form.
pub fn weekly(ledger: &Ledger) -> String {
    let week = ledger.current_week();
    let mut rows: Vec<(&str, Record)> = ledger
        .roster()
        .iter()
        .map(|name| (name.as_str(), week.get(name).copied().unwrap_or_default()))
        .collect();
    rows.sort_by(|a, b| b.1.win.cmp(&a.1.win));

    let mut out = format!("WEEKLY REPORT\n{RULE}\nWeek of {}\n", ledger.week_key());
    for (idx, (name, record)) in rows.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {name}\n    {}W - {}L ({:.0}%)\n    {}",
            idx + 1,
            record.win,
            record.lose,
            record.win_rate(),
            Form::of(*record).label(),
        );
    }
    out.push_str(RULE);
    out
}

pub fn help() -> String {
    [
        "COMMANDS",
        RULE,
        "/win <name> [qty]         add wins (e.g. /win Fra 2)",
        "/lose <name> [qty]        add losses (e.g. /lose Joel)",
        "/winRemove <name> [qty]   remove wins",
        "/loseRemove <name> [qty]  remove losses",
        "/add <name>               register a player",
        "/match b1 b2 r1 r2 w1 [w2 w3]",
        "                          2v2 match, each w is blue or red",
        "/reset <password>         zero this week's counters",
        "/totals                   standings",
        "/report                   this week's ranking and form",
        "/players                  registered players",
        "/history <name>           week-by-week record",
        "/help                     this list",
    ]
    .join("\n")
}

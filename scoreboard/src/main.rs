//! Five-a-side pool scoreboard CLI.
//!
//! One-shot subcommands apply a single mutation or print a report. `serve`
//! reads chat-style command lines from stdin, replies immediately, and leaves
//! syncing to the background worker.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use engine::SyncOutcome;
use scoreboard::app::{App, Reply};
use scoreboard::command::{BotCommand, parse_command, parse_match};
use scoreboard::config::{ScoreboardConfig, load_config, write_config};
use scoreboard::exit_codes;
use scoreboard::ledger::Tally;
use scoreboard::logging;
use scoreboard::week::Clock;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "scoreboard",
    version,
    about = "Five-a-side pool scoreboard synced through git"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "scoreboard.toml")]
    config: PathBuf,

    /// Log at info level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Add wins to a player.
    Win { name: String, qty: Option<u32> },
    /// Add losses to a player.
    Lose { name: String, qty: Option<u32> },
    /// Remove wins from a player (never below zero).
    WinRemove { name: String, qty: Option<u32> },
    /// Remove losses from a player (never below zero).
    LoseRemove { name: String, qty: Option<u32> },
    /// Register a new player.
    AddPlayer { name: String },
    /// Record a 2v2 match: two blue players, two red players, then each round's winner.
    Match {
        blue1: String,
        blue2: String,
        red1: String,
        red2: String,
        /// `blue` or `red`, one per round (1 to 3).
        #[arg(required = true, num_args = 1..=3)]
        winners: Vec<String>,
    },
    /// Zero this week's counters.
    Reset { password: String },
    /// Print the standings.
    Standings,
    /// Print this week's ranking with each player's form.
    Report,
    /// List registered players.
    Players,
    /// Print a player's week-by-week record.
    History { name: String },
    /// Read chat-style commands (`/win Fra 2`) from stdin until EOF.
    Serve,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let bot_command = match cli.command {
        Command::Init { force } => return cmd_init(&cli.config, force),
        Command::Serve => return cmd_serve(&cli.config),
        Command::Win { name, qty } => record(name, Tally::Win, qty),
        Command::Lose { name, qty } => record(name, Tally::Loss, qty),
        Command::WinRemove { name, qty } => remove(name, Tally::Win, qty),
        Command::LoseRemove { name, qty } => remove(name, Tally::Loss, qty),
        Command::AddPlayer { name } => BotCommand::AddPlayer { name },
        Command::Match {
            blue1,
            blue2,
            red1,
            red2,
            winners,
        } => {
            let mut args = vec![blue1, blue2, red1, red2];
            args.extend(winners);
            BotCommand::Match(parse_match(&args)?)
        }
        Command::Reset { password } => BotCommand::Reset { password },
        Command::Standings => BotCommand::Totals,
        Command::Report => BotCommand::WeeklyReport,
        Command::Players => BotCommand::Players,
        Command::History { name } => BotCommand::History { name },
    };
    cmd_once(&cli.config, bot_command)
}

fn record(name: String, tally: Tally, qty: Option<u32>) -> BotCommand {
    BotCommand::Record {
        name,
        tally,
        qty: qty.unwrap_or(1),
    }
}

fn remove(name: String, tally: Tally, qty: Option<u32>) -> BotCommand {
    BotCommand::Remove {
        name,
        tally,
        qty: qty.unwrap_or(1),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &ScoreboardConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    println!("wrote {}", path.display());
    Ok(())
}

fn open_app(config_path: &Path) -> Result<App> {
    let config = load_config(config_path)?;
    App::open(&config, Clock::Local)
}

/// Apply one command, print the reply, then wait for its sync before exiting.
fn cmd_once(config_path: &Path, command: BotCommand) -> Result<()> {
    let mut app = open_app(config_path)?;
    let Reply { text, sync } = app.handle(command)?;
    println!("{text}");
    if let Some(handle) = sync {
        let id = handle.id();
        log_outcome(id, &handle.wait());
    }
    app.shutdown()
}

fn cmd_serve(config_path: &Path) -> Result<()> {
    let app = open_app(config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    runtime.block_on(serve(app))
}

async fn serve(mut app: App) -> Result<()> {
    info!("console ready, reading commands from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut pending = JoinSet::new();

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let text = match parse_command(&line).and_then(|command| app.handle(command)) {
            Ok(Reply { text, sync }) => {
                if let Some(handle) = sync {
                    pending.spawn(async move {
                        let id = handle.id();
                        log_outcome(id, &handle.outcome().await);
                    });
                }
                text
            }
            Err(err) => format!("error: {err:#}"),
        };
        stdout
            .write_all(format!("{text}\n\n").as_bytes())
            .await
            .context("write reply")?;
        stdout.flush().await.context("flush stdout")?;
    }

    info!(queued = pending.len(), "end of input, draining sync queue");
    tokio::task::spawn_blocking(move || app.shutdown())
        .await
        .context("join shutdown task")??;
    while pending.join_next().await.is_some() {}
    Ok(())
}

fn log_outcome(id: u64, outcome: &SyncOutcome) {
    if outcome.success {
        info!(id, commit = ?outcome.commit, diagnostic = ?outcome.diagnostic, "sync finished");
    } else {
        warn!(
            id,
            step = ?outcome.failed_step,
            diagnostic = outcome.diagnostic.as_deref().unwrap_or_default(),
            "sync failed, local documents kept"
        );
    }
}

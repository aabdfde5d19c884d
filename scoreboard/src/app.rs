//! The scoreboard service object.
//!
//! Built once at startup and passed to every handler. Owns the [`Ledger`]
//! and, when syncing is enabled, the [`SyncService`] that commits and pushes
//! each mutation after its reply has been produced.

use anyhow::{Context, Result};
use engine::{CommandRunner, SyncHandle, SyncService};
use tracing::{debug, info};

use crate::command::BotCommand;
use crate::config::ScoreboardConfig;
use crate::ledger::{Ledger, Mutation};
use crate::report;
use crate::week::Clock;

/// Text for the user plus the sync receipt, if the command changed anything.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub sync: Option<SyncHandle>,
}

#[derive(Debug)]
pub struct App {
    ledger: Ledger,
    sync: Option<SyncService>,
}

impl App {
    /// Open the ledger and, if `sync_enabled`, start syncing through the system `git`.
    pub fn open(config: &ScoreboardConfig, clock: Clock) -> Result<Self> {
        let runner = config.sync.process_runner();
        Self::with_runner(config, clock, runner)
    }

    /// Like [`open`](Self::open) with an explicit command runner.
    pub fn with_runner<R>(config: &ScoreboardConfig, clock: Clock, runner: R) -> Result<Self>
    where
        R: CommandRunner + Send + 'static,
    {
        config.validate()?;
        let ledger = Ledger::open(config, clock).context("open score documents")?;
        let sync = if config.sync_enabled {
            let service = SyncService::start(runner, config.data_dir.clone(), config.sync.clone())
                .context("start sync service")?;
            Some(service)
        } else {
            info!("sync disabled, documents are only written locally");
            None
        };
        Ok(Self { ledger, sync })
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Run one command. Mutations are written to disk before this returns;
    /// their sync is only queued.
    pub fn handle(&mut self, command: BotCommand) -> Result<Reply> {
        debug!(?command, "handling command");
        let mutation = match command {
            BotCommand::Record { name, tally, qty } => self.ledger.record(&name, tally, qty)?,
            BotCommand::Remove { name, tally, qty } => self.ledger.remove(&name, tally, qty)?,
            BotCommand::AddPlayer { name } => self.ledger.add_player(&name)?,
            BotCommand::Match(result) => self.ledger.record_match(&result)?,
            BotCommand::Reset { password } => self.ledger.reset_week(&password)?,
            BotCommand::Totals => return Ok(text_only(report::standings(&self.ledger))),
            BotCommand::WeeklyReport => return Ok(text_only(report::weekly(&self.ledger))),
            BotCommand::Players => return Ok(text_only(report::players(&self.ledger))),
            BotCommand::History { name } => {
                return Ok(text_only(report::history(&self.ledger, &name)?));
            }
            BotCommand::Help => return Ok(text_only(report::help())),
        };
        Ok(self.submit(mutation))
    }

    fn submit(&self, mutation: Mutation) -> Reply {
        let Mutation { reply, change_set } = mutation;
        let sync = self.sync.as_ref().map(|service| service.submit(change_set));
        Reply { text: reply, sync }
    }

    /// Stop accepting work and block until every queued sync has finished.
    pub fn shutdown(self) -> Result<()> {
        match self.sync {
            Some(service) => service.shutdown(),
            None => Ok(()),
        }
    }
}

fn text_only(text: String) -> Reply {
    Reply { text, sync: None }
}

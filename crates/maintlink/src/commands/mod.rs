//! Command dispatch: bridges CLI args -> console operations -> output formatting.

pub mod config_cmd;
pub mod measure;
pub mod mode;
pub mod probe;
pub mod send;
pub mod util;
pub mod watch;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;
use crate::session::Session;

/// Dispatch a board-bound command to the appropriate handler.
pub async fn dispatch(cmd: Command, session: &Session, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Watch(args) => watch::handle(session, args, global).await,
        Command::Send(args) => send::handle(session, args, global).await,
        Command::Probe => probe::handle(session, global).await,
        Command::Measure(args) => measure::handle(session, args, global).await,
        Command::Mode(args) => mode::handle(session, args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => unreachable!(),
    }
}

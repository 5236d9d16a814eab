use std::ffi::OsString;

use clap::Parser;
use ink_core::InkError;

mod agent;
mod boundary_runner;
mod cli_args;
mod error_map;
mod line_player;
mod models;
mod session;
mod state_store;

pub(crate) use boundary_runner::{emit_boundary, run_to_boundary};
pub(crate) use cli_args::{AgentArgs, AgentCommand, ChooseArgs, Cli, Mode, PlayArgs, StartArgs};
pub(crate) use error_map::{
    emit_error, map_cli_state_invalid, map_cli_state_read, map_cli_state_write,
    map_cli_story_read, map_play_io,
};
pub(crate) use models::{
    BoundaryEvent, BoundaryLine, BoundaryResult, PlayerState, PLAYER_STATE_SCHEMA,
};
pub(crate) use session::Session;
pub(crate) use state_store::{
    load_player_state, player_state_for, resume_session, save_player_state,
};

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

fn run(cli: Cli) -> Result<i32, InkError> {
    match cli.command {
        Mode::Agent(args) => agent::run_agent(args),
        Mode::Play(args) => line_player::run_play(args),
    }
}

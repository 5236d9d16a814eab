use std::path::Path;

use ink_core::InkError;

use crate::{
    emit_boundary, load_player_state, player_state_for, resume_session, run_to_boundary,
    save_player_state, AgentArgs, AgentCommand, ChooseArgs, Session, StartArgs,
};

pub(super) fn run_agent(args: AgentArgs) -> Result<i32, InkError> {
    match args.command {
        AgentCommand::Start(args) => run_start(args),
        AgentCommand::Choose(args) => run_choose(args),
    }
}

pub(super) fn run_start(args: StartArgs) -> Result<i32, InkError> {
    let mut session = Session::open(
        &args.story.story,
        args.story.seed,
        args.story.strict_externals,
    )?;
    if let Some(path) = &args.path {
        session.story.choose_path_string(path, true, &[])?;
    }
    emit_with_saved_state(&mut session, &args.state_out)
}

pub(super) fn run_choose(args: ChooseArgs) -> Result<i32, InkError> {
    let state = load_player_state(Path::new(&args.state_in))?;
    let mut session = resume_session(&state)?;
    session.story.choose_choice_index(args.choice)?;
    emit_with_saved_state(&mut session, &args.state_out)
}

fn emit_with_saved_state(session: &mut Session, state_out: &str) -> Result<i32, InkError> {
    let boundary = run_to_boundary(session)?;
    let state = player_state_for(session)?;
    save_player_state(Path::new(state_out), &state)?;
    emit_boundary(boundary, Some(state_out.to_string()));
    Ok(0)
}

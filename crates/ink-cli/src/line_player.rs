use std::io::{self, BufRead, Write};
use std::path::Path;

use ink_core::InkError;

use crate::{
    load_player_state, map_play_io, player_state_for, resume_session, run_to_boundary,
    save_player_state, BoundaryEvent, PlayArgs, Session,
};

const DEFAULT_STATE_FILE: &str = ".ink-player/save.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandAction {
    NotHandled,
    Continue,
    RefreshBoundary,
    Quit,
}

pub(crate) fn run_play(args: PlayArgs) -> Result<i32, InkError> {
    let state_file = args
        .state_file
        .unwrap_or_else(|| DEFAULT_STATE_FILE.to_string());
    let mut session = Session::open(
        &args.story.story,
        args.story.seed,
        args.story.strict_externals,
    )?;
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut writer = io::stdout();
    run_play_with_io(&mut session, &state_file, &mut reader, &mut writer)
}

pub(crate) fn run_play_with_io(
    session: &mut Session,
    state_file: &str,
    reader: &mut dyn BufRead,
    writer: &mut dyn Write,
) -> Result<i32, InkError> {
    writeln!(writer, "commands: :help :save :load :restart :quit").map_err(map_play_io)?;

    loop {
        let boundary = run_to_boundary(session)?;
        for line in &boundary.lines {
            write!(writer, "{}", line.text).map_err(map_play_io)?;
            if !line.tags.is_empty() {
                writeln!(writer, "  # {}", line.tags.join(" # ")).map_err(map_play_io)?;
            }
        }

        if boundary.event == BoundaryEvent::End {
            writeln!(writer, "-- THE END --").map_err(map_play_io)?;
            return Ok(0);
        }

        for (index, text) in &boundary.choices {
            writeln!(writer, "  [{}] {}", index, text).map_err(map_play_io)?;
        }

        loop {
            let Some(raw) = prompt(reader, writer)? else {
                return Ok(0);
            };
            match handle_command(&raw, session, state_file, writer)? {
                CommandAction::Continue => continue,
                CommandAction::RefreshBoundary => break,
                CommandAction::Quit => return Ok(0),
                CommandAction::NotHandled => {}
            }
            let Ok(choice) = raw.parse::<usize>() else {
                writeln!(writer, "not a choice: {}", raw).map_err(map_play_io)?;
                continue;
            };
            if choice >= boundary.choices.len() {
                writeln!(writer, "no choice {}", choice).map_err(map_play_io)?;
                continue;
            }
            session.story.choose_choice_index(choice)?;
            break;
        }
    }
}

/// `None` at end of input.
fn prompt(reader: &mut dyn BufRead, writer: &mut dyn Write) -> Result<Option<String>, InkError> {
    write!(writer, "> ").map_err(map_play_io)?;
    writer.flush().map_err(map_play_io)?;
    let mut line = String::new();
    let read = reader.read_line(&mut line).map_err(map_play_io)?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

fn handle_command(
    raw: &str,
    session: &mut Session,
    state_file: &str,
    writer: &mut dyn Write,
) -> Result<CommandAction, InkError> {
    let action = match raw {
        ":help" => {
            writeln!(writer, "type a choice number, or :save :load :restart :quit")
                .map_err(map_play_io)?;
            CommandAction::Continue
        }
        ":save" => {
            let state = player_state_for(session)?;
            save_player_state(Path::new(state_file), &state)?;
            writeln!(writer, "saved to {}", state_file).map_err(map_play_io)?;
            CommandAction::Continue
        }
        ":load" => {
            let state = load_player_state(Path::new(state_file))?;
            *session = resume_session(&state)?;
            writeln!(writer, "loaded {}", state_file).map_err(map_play_io)?;
            CommandAction::RefreshBoundary
        }
        ":restart" => {
            session.story.reset_state()?;
            CommandAction::RefreshBoundary
        }
        ":quit" => CommandAction::Quit,
        _ => CommandAction::NotHandled,
    };
    Ok(action)
}

#[cfg(test)]
mod line_player_tests {
    use super::*;
    use crate::cli_test_support::*;

    fn play(input: &str, state_file: &str) -> String {
        let story_path = temp_path("play.ink.json");
        write_file(&story_path, CHOICE_STORY);
        let mut session =
            Session::open(&story_path.to_string_lossy(), Some(9), false).expect("load");
        let mut reader = io::Cursor::new(input.as_bytes().to_vec());
        let mut output = Vec::new();
        let code = run_play_with_io(&mut session, state_file, &mut reader, &mut output)
            .expect("play should finish");
        assert_eq!(code, 0);
        String::from_utf8(output).expect("utf8 output")
    }

    #[test]
    fn plays_through_a_choice_to_the_end() {
        let state_file = temp_path("play-state.json");
        let output = play("0\n", &state_file.to_string_lossy());
        assert!(output.contains("Pick a door.\n  # mood: tense"));
        assert!(output.contains("  [1] Right"));
        assert!(output.contains("You went left."));
        assert!(output.contains("-- THE END --"));
    }

    #[test]
    fn rejects_bad_input_and_supports_save_and_load() {
        let state_file = temp_path("play-save.json");
        let output = play("x\n7\n:save\n:load\n1\n", &state_file.to_string_lossy());
        assert!(output.contains("not a choice: x"));
        assert!(output.contains("no choice 7"));
        assert!(output.contains("saved to"));
        assert!(output.contains("You went right."));
    }

    #[test]
    fn quits_on_command_or_end_of_input() {
        let state_file = temp_path("play-quit.json");
        let output = play(":quit\n", &state_file.to_string_lossy());
        assert!(!output.contains("THE END"));
        let output = play("", &state_file.to_string_lossy());
        assert!(!output.contains("THE END"));
    }
}

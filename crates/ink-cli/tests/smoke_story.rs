use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn temp_state(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("ink-player-smoke-{}-{}.json", std::process::id(), name))
}

fn run(args: &[&str]) -> (Output, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_ink-player"))
        .args(args)
        .output()
        .expect("cli should execute");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    (output, stdout)
}

#[test]
fn agent_start_then_choose_plays_to_the_end() {
    let story = fixture("doors.ink.json");
    let first_state = temp_state("start");
    let second_state = temp_state("choose");

    let (output, stdout) = run(&[
        "agent",
        "start",
        "--story",
        &story.to_string_lossy(),
        "--seed",
        "1",
        "--state-out",
        &first_state.to_string_lossy(),
    ]);
    assert!(output.status.success(), "start failed:\n{}", stdout);
    assert!(stdout.starts_with("RESULT:OK\nEVENT:CHOICES\n"));
    assert!(stdout.contains("TEXT_JSON:\"You stand in a hallway.\\n\""));
    assert!(stdout.contains("TAG_JSON:\"scene: hall\""));
    assert!(stdout.contains("TEXT_JSON:\"3 torches light the way.\\n\""));
    assert!(stdout.contains("CHOICE:0|\"Open the left door\""));
    assert!(stdout.contains("CHOICE:1|\"Open the right door\""));
    assert!(first_state.exists());

    let (output, stdout) = run(&[
        "agent",
        "choose",
        "--state-in",
        &first_state.to_string_lossy(),
        "--choice",
        "0",
        "--state-out",
        &second_state.to_string_lossy(),
    ]);
    assert!(output.status.success(), "choose failed:\n{}", stdout);
    assert!(stdout.contains("EVENT:END"));
    assert!(stdout.contains("TEXT_JSON:\"A cold draft. One torch goes out.\\n\""));

    let saved = std::fs::read_to_string(&second_state).expect("state should be written");
    assert!(saved.contains("\"torches\":2"));
}

#[test]
fn invalid_choice_is_reported_as_error() {
    let story = fixture("doors.ink.json");
    let state = temp_state("invalid");
    let (output, _) = run(&[
        "agent",
        "start",
        "--story",
        &story.to_string_lossy(),
        "--state-out",
        &state.to_string_lossy(),
    ]);
    assert!(output.status.success());

    let (output, stdout) = run(&[
        "agent",
        "choose",
        "--state-in",
        &state.to_string_lossy(),
        "--choice",
        "9",
        "--state-out",
        &temp_state("unused").to_string_lossy(),
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("RESULT:ERROR"));
    assert!(stdout.contains("ERROR_CODE:STORY_CHOICE_OUT_OF_RANGE"));
}

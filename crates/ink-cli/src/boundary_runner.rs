use ink_core::InkError;

use crate::{BoundaryEvent, BoundaryLine, BoundaryResult, Session};

/// Continues until the story stops for choices or ends.
pub(crate) fn run_to_boundary(session: &mut Session) -> Result<BoundaryResult, InkError> {
    let mut lines = Vec::new();
    while session.story.can_continue() {
        let text = session.story.continue_story()?;
        let tags = session.story.current_tags()?;
        session.check_errors()?;
        lines.push(BoundaryLine { text, tags });
    }

    let choices: Vec<(usize, String)> = session
        .story
        .current_choices()
        .into_iter()
        .map(|choice| (choice.index, choice.text))
        .collect();
    let event = if choices.is_empty() {
        BoundaryEvent::End
    } else {
        BoundaryEvent::Choices
    };
    Ok(BoundaryResult {
        event,
        lines,
        choices,
    })
}

pub(crate) fn emit_boundary(boundary: BoundaryResult, state_out: Option<String>) {
    println!("RESULT:OK");
    match boundary.event {
        BoundaryEvent::Choices => println!("EVENT:CHOICES"),
        BoundaryEvent::End => println!("EVENT:END"),
    }

    for line in boundary.lines {
        println!("TEXT_JSON:{}", json_string(&line.text));
        for tag in line.tags {
            println!("TAG_JSON:{}", json_string(&tag));
        }
    }

    for (index, text) in boundary.choices {
        println!("CHOICE:{}|{}", index, json_string(&text));
    }

    println!(
        "STATE_OUT:{}",
        state_out.unwrap_or_else(|| "NONE".to_string())
    );
}

fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| "\"\"".to_string())
}

use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use ink_core::{ErrorKind, InkError};
use ink_runtime::{Story, StoryCallbacks, StoryOptions};

use crate::map_cli_story_read;

/// A loaded story plus the runtime errors reported while playing it.
pub(crate) struct Session {
    pub(crate) story: Story,
    pub(crate) story_path: String,
    pub(crate) strict_externals: bool,
    errors: Rc<RefCell<Vec<String>>>,
}

/// Warnings are already logged by the runtime; errors are kept so the
/// boundary can fail with them.
struct ErrorSink {
    errors: Rc<RefCell<Vec<String>>>,
}

impl StoryCallbacks for ErrorSink {
    fn on_error(&mut self, message: &str, kind: ErrorKind) {
        if kind == ErrorKind::Error {
            self.errors.borrow_mut().push(message.to_string());
        }
    }
}

impl Session {
    pub(crate) fn open(story_path: &str, seed: Option<i32>, strict_externals: bool) -> Result<Self, InkError> {
        let raw = fs::read_to_string(Path::new(story_path)).map_err(map_cli_story_read)?;
        // inklecate writes a byte order mark.
        let json = raw.strip_prefix('\u{feff}').unwrap_or(&raw);
        let options = StoryOptions {
            allow_external_function_fallbacks: !strict_externals,
            random_seed: seed,
            ..StoryOptions::default()
        };
        let mut story = Story::with_options(json, options)?;
        let errors = Rc::new(RefCell::new(Vec::new()));
        story.set_callbacks(Box::new(ErrorSink {
            errors: Rc::clone(&errors),
        }));
        log::debug!("loaded story {} (ink version {})", story_path, story.ink_version());

        Ok(Self {
            story,
            story_path: story_path.to_string(),
            strict_externals,
            errors,
        })
    }

    /// Fails with every runtime error reported since the last check.
    pub(crate) fn check_errors(&self) -> Result<(), InkError> {
        let errors = std::mem::take(&mut *self.errors.borrow_mut());
        if errors.is_empty() {
            return Ok(());
        }
        Err(InkError::new("CLI_STORY_RUNTIME", errors.join("\n")))
    }
}

#[cfg(test)]
mod session_tests {
    use super::*;
    use crate::cli_test_support::*;

    #[test]
    fn open_strips_byte_order_mark() {
        let path = temp_path("bom.ink.json");
        write_file(&path, &format!("\u{feff}{}", HELLO_STORY));
        let mut session =
            Session::open(&path.to_string_lossy(), Some(1), false).expect("story should load");
        assert_eq!(session.story.continue_story().expect("line"), "Hello\n");
        session.check_errors().expect("no errors");
    }

    #[test]
    fn open_reports_missing_files() {
        let error = Session::open("/definitely/not/here.ink.json", None, false)
            .err()
            .expect("missing file");
        assert_eq!(error.code, "CLI_STORY_READ");
    }

    #[test]
    fn runtime_errors_surface_through_check() {
        let path = temp_path("broken.ink.json");
        write_file(&path, BROKEN_DIVERT_STORY);
        let mut session =
            Session::open(&path.to_string_lossy(), Some(1), false).expect("story should load");
        session.story.continue_story().expect("errors go to the sink");
        let error = session.check_errors().expect_err("runtime error");
        assert_eq!(error.code, "CLI_STORY_RUNTIME");
        session.check_errors().expect("errors are drained");
    }
}

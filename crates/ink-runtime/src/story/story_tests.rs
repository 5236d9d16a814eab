use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::*;
use crate::rng::SeededRandom;

fn ink(root: &str) -> String {
    ink_with_lists(root, "{}")
}

fn ink_with_lists(root: &str, list_defs: &str) -> String {
    format!(r#"{{"inkVersion":21,"root":{},"listDefs":{}}}"#, root, list_defs)
}

fn seeded() -> StoryOptions {
    StoryOptions {
        random_seed: Some(42),
        ..StoryOptions::default()
    }
}

fn story(root: &str) -> Story {
    Story::with_options(&ink(root), seeded()).expect("story should load")
}

fn story_with_colours(root: &str) -> Story {
    let json = ink_with_lists(root, r#"{"colours":{"red":1,"green":2,"blue":3}}"#);
    Story::with_options(&json, seeded()).expect("story should load")
}

const TWO_LINES: &str = r#"["^Hello","\n","^world","\n","done",null]"#;

const LOOPING_CHOICES: &str = r##"[{"->":"start"},{"start":["ev","str","^Yes","/str","/ev",{"*":".^.c-0","flg":20},"ev","str","^No","/str","/ev",{"*":".^.c-1","flg":20},"done",{"c-0":["^Picked yes","\n",{"->":"start"},{"#f":5}],"c-1":["^Picked no","\n",{"->":"start"},{"#f":5}],"#f":1}]}]"##;

const GOLD: &str = r#"["ev",{"VAR?":"gold"},1,"+",{"VAR=":"gold","re":true},"/ev","^Gold: ","ev",{"VAR?":"gold"},"out","/ev","\n","done",{"global decl":["ev",5,{"VAR=":"gold"},"/ev","end",null]}]"#;

const EXTERNAL_ADD: &str = r#"["ev",2,3,{"x()":"add","exArgs":2},"out","/ev","\n","done",{"add":[{"temp=":"b"},{"temp=":"a"},"ev",{"VAR?":"a"},{"VAR?":"b"},"-","/ev","~ret",null]}]"#;

#[derive(Default)]
struct Recorder {
    errors: Rc<RefCell<Vec<String>>>,
    choices: Rc<RefCell<Vec<String>>>,
}

impl StoryCallbacks for Recorder {
    fn on_error(&mut self, message: &str, _kind: ink_core::ErrorKind) {
        self.errors.borrow_mut().push(message.to_string());
    }

    fn on_make_choice(&mut self, choice: &Choice) {
        self.choices.borrow_mut().push(choice.text.clone());
    }
}

#[test]
fn lines_are_returned_one_at_a_time() {
    let mut story = story(TWO_LINES);
    assert_eq!(story.continue_story().expect("first line"), "Hello\n");
    assert!(story.can_continue());
    assert_eq!(story.continue_story().expect("second line"), "world\n");
    assert!(!story.can_continue());
    assert!(story.continue_story().is_err());
}

#[test]
fn glue_joins_text_across_a_newline() {
    let mut story = story(r#"["^Hello","<>","\n","^ world","\n","done",null]"#);
    assert_eq!(story.continue_story().expect("line"), "Hello world\n");
    assert!(!story.can_continue());
}

#[test]
fn lookahead_sees_glue_after_a_newline() {
    let mut story = story(r#"["^a","\n","<>","^b","\n","^c","\n","done",null]"#);
    assert_eq!(story.continue_story().expect("joined"), "ab\n");
    assert_eq!(story.continue_story().expect("next"), "c\n");
}

#[test]
fn continue_maximally_concatenates_lines() {
    let mut story = story(TWO_LINES);
    assert_eq!(story.continue_maximally().expect("all"), "Hello\nworld\n");
}

#[test]
fn once_only_choices_disappear_after_being_chosen() {
    let mut story = story(LOOPING_CHOICES);
    assert_eq!(story.continue_story().expect("choices"), "");
    let texts: Vec<String> = story.current_choices().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["Yes".to_string(), "No".to_string()]);

    story.choose_choice_index(0).expect("choose yes");
    assert_eq!(story.continue_story().expect("after yes"), "Picked yes\n");
    let remaining = story.current_choices();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].text, "No");
    assert_eq!(remaining[0].index, 0);
    assert_eq!(story.visit_count_at_path_string("start.c-0"), 1);
}

#[test]
fn out_of_range_choice_is_rejected() {
    let mut story = story(LOOPING_CHOICES);
    story.continue_story().expect("choices");
    let error = story.choose_choice_index(5).expect_err("out of range");
    assert_eq!(error.code, "STORY_CHOICE_OUT_OF_RANGE");
}

#[test]
fn random_is_reproducible_from_the_seed() {
    let root = r#"["ev",1,6,"rnd","out","/ev","\n","ev",1,6,"rnd","out","/ev","\n","done",null]"#;
    let mut story = story(root);
    let first = story.continue_story().expect("first roll");
    let second = story.continue_story().expect("second roll");

    let first_draw = SeededRandom::new(42).next();
    let second_draw = SeededRandom::new(42i32.wrapping_add(first_draw)).next();
    assert_eq!(first, format!("{}\n", first_draw % 6 + 1));
    assert_eq!(second, format!("{}\n", second_draw % 6 + 1));
}

#[test]
fn random_with_inverted_bounds_is_an_error() {
    let mut story = story(r#"["ev",6,1,"rnd","out","/ev","\n","done",null]"#);
    let error = story.continue_story().expect_err("bad range");
    assert_eq!(error.code, "STORY_RUNTIME_ERRORS");
    assert!(error.message.contains("The maximum must be larger"));
}

#[test]
fn globals_are_declared_and_updated() {
    let mut story = story(GOLD);
    assert_eq!(story.variable("gold"), Some(Value::Int(5)));
    assert_eq!(story.continue_story().expect("line"), "Gold: 6\n");
    assert_eq!(story.variable("gold"), Some(Value::Int(6)));
}

#[test]
fn observers_hear_changes_after_continue_and_on_host_writes() {
    let mut story = story(GOLD);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let id = story
        .observe_variable("gold", move |name, value| {
            sink.borrow_mut().push(format!("{}={}", name, value));
        })
        .expect("observe gold");

    story.continue_story().expect("line");
    story.set_variable("gold", Value::Int(10)).expect("host write");
    assert_eq!(*seen.borrow(), vec!["gold=6".to_string(), "gold=10".to_string()]);

    story.remove_variable_observer(Some(id), None);
    story.set_variable("gold", Value::Int(11)).expect("host write");
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn observing_an_undeclared_variable_fails() {
    let mut story = story(GOLD);
    let error = story
        .observe_variable("silver", |_, _| {})
        .expect_err("undeclared");
    assert_eq!(error.code, "STORY_OBSERVE_UNKNOWN");
}

#[test]
fn bound_external_function_receives_arguments_in_order() {
    let mut story = story(EXTERNAL_ADD);
    story
        .bind_external_function("add", 2, true, |args| {
            let sum = args.iter().filter_map(Value::as_int).sum::<i32>();
            Ok(Some(Value::Int(sum * 10 + args.len() as i32)))
        })
        .expect("bind");
    assert_eq!(story.continue_story().expect("line"), "52\n");

    let error = story
        .bind_external_function("add", 2, true, |_| Ok(None))
        .expect_err("double bind");
    assert_eq!(error.code, "STORY_EXTERNAL_ALREADY_BOUND");
}

#[test]
fn missing_external_binding_is_reported_before_running() {
    let mut story = story(EXTERNAL_ADD);
    let error = story.continue_story().expect_err("unbound");
    assert_eq!(error.code, "STORY_EXTERNAL_MISSING");
    assert!(error.message.contains("'add'"));
    assert!(error.message.contains("(ink fallbacks disabled)"));
}

#[test]
fn unbound_external_falls_back_to_ink_function() {
    let options = StoryOptions {
        allow_external_function_fallbacks: true,
        random_seed: Some(1),
        ..StoryOptions::default()
    };
    let mut story = Story::with_options(&ink(EXTERNAL_ADD), options).expect("load");
    assert_eq!(story.continue_story().expect("line"), "-1\n");
}

#[test]
fn evaluate_function_returns_result_and_text() {
    let root = r#"["^Main","\n","done",{"double":[{"temp=":"x"},"^Doubling","\n","ev",{"VAR?":"x"},2,"*","/ev","~ret",null]}]"#;
    let mut story = story(root);
    assert!(story.has_function("double"));

    let evaluation = story
        .evaluate_function("double", &[Value::Int(4)])
        .expect("evaluate");
    assert_eq!(evaluation.result, Some(Value::Int(8)));
    assert_eq!(evaluation.text_output, "Doubling\n");

    assert_eq!(story.continue_story().expect("main"), "Main\n");
    let error = story.evaluate_function("triple", &[]).expect_err("missing");
    assert_eq!(error.code, "STORY_FUNCTION_MISSING");
}

#[test]
fn tunnels_return_to_the_caller() {
    let root = r#"[{"->t->":"tun"},"^after","\n","done",{"tun":["^in tunnel","\n","ev","void","/ev","->->",null]}]"#;
    let mut story = story(root);
    assert_eq!(story.continue_story().expect("tunnel"), "in tunnel\n");
    assert_eq!(story.continue_story().expect("after"), "after\n");
}

#[test]
fn global_tags_are_read_without_running() {
    let mut story = story(r##"["#","^author: Joe","/#","^Hi","\n","done",null]"##);
    assert_eq!(story.global_tags().expect("tags"), vec!["author: Joe".to_string()]);
    assert_eq!(story.continue_story().expect("line"), "Hi\n");
    assert_eq!(story.current_tags().expect("tags"), vec!["author: Joe".to_string()]);
}

#[test]
fn save_and_load_resume_at_the_same_choices() {
    let mut story = story(LOOPING_CHOICES);
    story.continue_story().expect("choices");
    story.choose_choice_index(1).expect("choose no");
    story.continue_story().expect("after no");
    let saved = story.save_state().expect("save");

    let mut restored = self::story(LOOPING_CHOICES);
    restored.load_state(&saved).expect("load");
    let texts: Vec<String> = restored.current_choices().into_iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["Yes".to_string()]);
    restored.choose_choice_index(0).expect("choose yes");
    assert_eq!(restored.continue_story().expect("after yes"), "Picked yes\n");
    assert!(restored.current_choices().is_empty());
}

#[test]
fn flows_run_independently() {
    let mut story = story(TWO_LINES);
    assert_eq!(story.continue_story().expect("default"), "Hello\n");

    story.switch_flow("side").expect("switch");
    assert_eq!(story.current_flow_name(), "side");
    assert!(!story.current_flow_is_default_flow());
    assert_eq!(story.continue_story().expect("side"), "Hello\n");

    story.switch_to_default_flow().expect("back");
    assert_eq!(story.continue_story().expect("default again"), "world\n");
    story.remove_flow("side").expect("remove");
    assert!(!story.alive_flow_names().contains(&"side".to_string()));
}

#[test]
fn errors_go_to_callbacks_when_installed() {
    let mut story = story(r#"[{"->":"nowhere"},"^unreachable","\n","done",null]"#);
    let recorder = Recorder::default();
    let errors = Rc::clone(&recorder.errors);
    story.set_callbacks(Box::new(recorder));

    story.continue_story().expect("errors are delivered, not returned");
    let errors = errors.borrow();
    assert!(errors
        .iter()
        .any(|error| error.contains("Divert resolution failed")));
    assert!(!story.can_continue());
}

#[test]
fn chosen_choices_are_reported_to_callbacks() {
    let mut story = story(LOOPING_CHOICES);
    let recorder = Recorder::default();
    let choices = Rc::clone(&recorder.choices);
    story.set_callbacks(Box::new(recorder));

    story.continue_story().expect("choices");
    story.choose_choice_index(1).expect("choose");
    assert_eq!(*choices.borrow(), vec!["No".to_string()]);
}

#[test]
fn choose_path_string_jumps_to_a_knot() {
    let root = r##"["^start","\n","done",{"knot":["^in knot","\n","done",{"#f":1}]}]"##;
    let mut story = story(root);
    story.choose_path_string("knot", true, &[]).expect("jump");
    assert_eq!(story.continue_story().expect("knot"), "in knot\n");
    assert_eq!(story.visit_count_at_path_string("knot"), 1);

    let error = story
        .choose_path_string("missing", true, &[])
        .expect_err("bad path");
    assert_eq!(error.code, "STORY_PATH_NOT_FOUND");
}

#[test]
fn newline_state_change_detects_extension_and_removal() {
    use super::step::{calculate_newline_output_state_change, OutputStateChange};

    assert_eq!(
        calculate_newline_output_state_change("a\n", "a\nb", 0, 0),
        OutputStateChange::ExtendedBeyondNewline
    );
    assert_eq!(
        calculate_newline_output_state_change("a\n", "a", 0, 0),
        OutputStateChange::NewlineRemoved
    );
    assert_eq!(
        calculate_newline_output_state_change("a\n", "a\n ", 0, 0),
        OutputStateChange::NoChange
    );
    assert_eq!(
        calculate_newline_output_state_change("a\n", "a\n", 0, 1),
        OutputStateChange::ExtendedBeyondNewline
    );
}

#[test]
fn random_matches_between_stories_with_the_same_seed() {
    let root = r#"["ev",1,100,"rnd","out","/ev","\n","ev",1,100,"rnd","out","/ev","\n","done",null]"#;
    let mut first = story(root);
    let mut second = story(root);
    assert_eq!(
        first.continue_maximally().expect("first story"),
        second.continue_maximally().expect("second story")
    );
}

#[test]
fn unknown_read_count_target_warns_and_reads_zero() {
    let mut story = story(r#"["ev",{"CNT?":"nowhere"},"out","/ev","\n","done",null]"#);
    let recorder = Recorder::default();
    let errors = Rc::clone(&recorder.errors);
    story.set_callbacks(Box::new(recorder));

    assert_eq!(story.continue_story().expect("line"), "0\n");
    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("WARNING"));
    assert!(errors[0].contains("Read count for target (nowhere) unknown"));
}

#[test]
fn unknown_read_count_target_is_a_warning_without_callbacks() {
    let mut story = story(r#"["ev",{"CNT?":"nowhere"},"out","/ev","\n","done",null]"#);
    let error = story.continue_story().expect_err("warnings are surfaced");
    assert_eq!(error.code, "STORY_RUNTIME_WARNINGS");
    assert_eq!(story.state().current_text(), "0\n");
}

#[test]
fn host_calls_are_rejected_while_an_async_continue_is_pending() {
    let mut story = story(r#"[{"->":"loop"},{"loop":[{"->":"loop"},null]}]"#);
    story.continue_async(5).expect("time-limited continue");
    assert!(!story.async_continue_complete());

    let error = story.continue_maximally().expect_err("async pending");
    assert_eq!(error.code, "STORY_ASYNC_ACTIVE");
    assert_eq!(story.save_state().expect_err("async pending").code, "STORY_ASYNC_ACTIVE");
    assert_eq!(
        story.current_text().expect_err("async pending").code,
        "STORY_ASYNC_ACTIVE"
    );
}

#[test]
fn lookahead_unsafe_external_runs_once_on_its_own_line() {
    let root = r#"["^Line one","\n","ev",{"x()":"tick","exArgs":0},"out","/ev","\n","done",null]"#;
    let mut story = story(root);
    let calls = Rc::new(Cell::new(0));
    let counter = Rc::clone(&calls);
    story
        .bind_external_function("tick", 0, false, move |_| {
            counter.set(counter.get() + 1);
            Ok(Some(Value::Int(counter.get())))
        })
        .expect("bind");

    assert_eq!(story.continue_story().expect("first line"), "Line one\n");
    assert_eq!(calls.get(), 0);
    assert_eq!(story.continue_story().expect("second line"), "1\n");
    assert_eq!(calls.get(), 1);
}

#[test]
fn threads_run_before_returning_to_the_forking_flow() {
    let root = r#"["thread",{"->":"side"},"^main","\n","done",{"side":["^side","\n","done",null]}]"#;
    let mut story = story(root);
    assert_eq!(story.continue_story().expect("thread line"), "side\n");
    assert!(story.state().callstack().can_pop_thread());
    assert_eq!(story.continue_story().expect("main line"), "main\n");
    assert!(!story.state().callstack().can_pop_thread());
    assert!(!story.can_continue());
}

#[test]
fn list_value_is_built_from_an_int() {
    let mut story = story_with_colours(r#"["ev","^colours",2,"listInt","out","/ev","\n","done",null]"#);
    assert_eq!(story.continue_story().expect("line"), "green\n");

    let mut unknown = story_with_colours(r#"["ev","^shapes",2,"listInt","out","/ev","\n","done",null]"#);
    let error = unknown.continue_story().expect_err("no such list");
    assert!(error.message.contains("Failed to find LIST called shapes"));
}

#[test]
fn list_range_keeps_items_between_the_bounds() {
    let root = r#"["ev",{"list":{"colours.red":1,"colours.green":2,"colours.blue":3}},2,3,"range","out","/ev","\n","done",null]"#;
    let mut story = story_with_colours(root);
    assert_eq!(story.continue_story().expect("line"), "green, blue\n");
}

#[test]
fn list_random_picks_an_item_from_the_seed() {
    let root = r#"["ev",{"list":{"colours.red":1,"colours.green":2,"colours.blue":3}},"lrnd","out","/ev","\n","done",null]"#;
    let mut story = story_with_colours(root);
    let picked = story.continue_story().expect("line");

    let by_item = ["blue", "green", "red"];
    let expected = by_item[SeededRandom::new(42).next() as usize % by_item.len()];
    assert_eq!(picked, format!("{}\n", expected));
}

#[test]
fn shuffle_visits_every_element_once_per_loop() {
    let root = r#"["ev",0,3,"seq","out",1,3,"seq","out",2,3,"seq","out","/ev","\n","done",null]"#;
    let first = story(root).continue_story().expect("first pass");
    let again = story(root).continue_story().expect("same seed");
    assert_eq!(first, again);

    let mut indices: Vec<char> = first.trim_end().chars().collect();
    indices.sort_unstable();
    assert_eq!(indices, vec!['0', '1', '2']);
}

#[test]
fn failed_function_evaluation_restores_the_story() {
    let root = r#"["^Main","\n","done",{"shaky":["ev",{"VAR?":"missing"},"/ev","~ret",null]}]"#;
    let mut story = story(root);
    assert_eq!(story.continue_story().expect("main"), "Main\n");

    let error = story
        .evaluate_function("shaky", &[])
        .expect_err("warning surfaces as an error");
    assert_eq!(error.code, "STORY_RUNTIME_WARNINGS");
    assert_eq!(story.current_text().expect("text"), "Main\n");
    assert!(!story.state().callstack().element_is_evaluate_from_game());
    assert!(story.state().evaluation_stack().is_empty());
}

use std::rc::Rc;

use super::*;
use crate::container::Container;
use crate::object::{ControlCommand, NodeKind};
use crate::state::output::clean_output_whitespace;

fn tree_with_knot() -> (Tree, NodeId) {
    let mut tree = Tree::new();
    let mut knot = Container::named("knot");
    knot.set_count_flags(3);
    let knot = tree.add_node(NodeKind::Container(knot));
    let root = tree.root();
    tree.add_content(root, knot).expect("knot should attach");
    (tree, knot)
}

fn state_for(tree: &Tree) -> StoryState {
    StoryState::new(
        Pointer::start_of(tree.root()),
        Rc::new(ListDefinitionsOrigin::new(Vec::new())),
        7,
    )
}

fn push_texts(state: &mut StoryState, texts: &[&str]) {
    for text in texts {
        state.push_to_output_stream(RtObject::text(*text));
    }
}

#[test]
fn glue_absorbs_pending_newline() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    push_texts(&mut state, &["Hello", "\n"]);
    state.push_to_output_stream(RtObject::Glue);
    push_texts(&mut state, &[" world"]);
    assert_eq!(state.current_text(), "Hello world");
    assert!(!state.output_stream().contains(&RtObject::Glue));
}

#[test]
fn newlines_are_not_doubled_or_leading() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    push_texts(&mut state, &["\n", "A", "\n", "\n"]);
    assert_eq!(state.current_text(), "A\n");
    assert!(state.output_stream_ends_in_newline());
    assert!(state.output_stream_contains_content());
}

#[test]
fn strings_with_outer_newlines_are_split() {
    let pieces = super::output::split_head_tail_whitespace("  \n\nText \n  ").expect("should split");
    assert_eq!(pieces, vec!["  ", "\n", "Text ", "\n", "  "]);
    assert!(super::output::split_head_tail_whitespace("one\ntwo").is_none());
}

#[test]
fn whitespace_is_collapsed_per_line() {
    assert_eq!(clean_output_whitespace("  a   b \n c"), "a b\nc");
    assert_eq!(clean_output_whitespace("a\tb"), "a b");
}

#[test]
fn function_start_drops_newline_until_text_arrives() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    push_texts(&mut state, &["Hi"]);
    let length = state.output_stream().len();
    state.callstack_mut().push(PushPopType::Function, 0, length);
    push_texts(&mut state, &["\n", "there"]);
    assert_eq!(state.current_text(), "Hithere");
    assert_eq!(
        state.callstack().current_element().function_start_in_output_stream,
        -1
    );
}

#[test]
fn function_end_trims_trailing_whitespace() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    state.callstack_mut().push(PushPopType::Function, 0, 0);
    push_texts(&mut state, &["x", "\n", " "]);
    state
        .pop_callstack(Some(PushPopType::Function))
        .expect("function frame should pop");
    assert_eq!(state.output_stream(), &[RtObject::text("x")]);
}

#[test]
fn function_end_trim_looks_past_commands() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    state.callstack_mut().push(PushPopType::Function, 0, 0);
    push_texts(&mut state, &["x", " "]);
    state.push_to_output_stream(RtObject::Command(ControlCommand::EndTag));
    state
        .pop_callstack(Some(PushPopType::Function))
        .expect("function frame should pop");
    assert_eq!(
        state.output_stream(),
        &[RtObject::text("x"), RtObject::Command(ControlCommand::EndTag)]
    );
}

#[test]
fn tags_are_collected_apart_from_text() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    state.push_to_output_stream(RtObject::Command(ControlCommand::BeginTag));
    push_texts(&mut state, &["tag   one"]);
    state.push_to_output_stream(RtObject::Command(ControlCommand::EndTag));
    state.push_to_output_stream(RtObject::Tag("legacy".to_string()));
    push_texts(&mut state, &["Line"]);
    assert_eq!(state.current_tags(), vec!["tag one", "legacy"]);
    assert_eq!(state.current_text(), "Line");
}

#[test]
fn evaluation_stack_pops_in_push_order() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    for value in 1..=3 {
        state.push_evaluation_stack(RtObject::Value(Value::Int(value)));
    }
    let popped = state.pop_evaluation_stack_n(2).expect("two values should pop");
    assert_eq!(
        popped,
        vec![RtObject::Value(Value::Int(2)), RtObject::Value(Value::Int(3))]
    );
    assert!(state.pop_evaluation_stack_n(2).is_err());
    assert_eq!(
        state.pop_evaluation_stack().expect("one value left"),
        RtObject::Value(Value::Int(1))
    );
    let error = state.pop_evaluation_stack().expect_err("stack should be empty");
    assert_eq!(error.code, "STATE_EVAL_STACK_EMPTY");
}

#[test]
fn discarded_patch_leaves_base_untouched() {
    let (tree, knot) = tree_with_knot();
    let mut base = state_for(&tree);
    base.set_global("x", Value::Int(1));
    base.variables.snapshot_default_globals();

    let mut live = base.copy_and_start_patching();
    live.set_global("x", Value::Int(2));
    live.increment_visit_count_for_container(&tree, knot);
    assert_eq!(live.global_variable("x"), Some(Value::Int(2)));
    assert_eq!(live.visit_count_at_path_string("knot"), 1);

    drop(live);
    base.restore_after_patch();
    assert_eq!(base.global_variable("x"), Some(Value::Int(1)));
    assert_eq!(base.visit_count_at_path_string("knot"), 0);
}

#[test]
fn applied_patch_lands_exactly_once() {
    let (tree, knot) = tree_with_knot();
    let mut base = state_for(&tree);
    base.set_global("x", Value::Int(1));
    base.variables.snapshot_default_globals();

    let mut live = base.copy_and_start_patching();
    live.set_global("x", Value::Int(2));
    live.increment_visit_count_for_container(&tree, knot);
    assert_eq!(base.global_variable("x"), Some(Value::Int(1)));
    assert_eq!(base.visit_count_at_path_string("knot"), 0);

    drop(base);
    live.apply_any_patch();
    assert!(live.patch().is_none());
    assert_eq!(live.global_variable("x"), Some(Value::Int(2)));
    assert_eq!(live.visit_count_at_path_string("knot"), 1);
    live.apply_any_patch();
    assert_eq!(live.visit_count_at_path_string("knot"), 1);
}

#[test]
fn turns_since_tracks_turn_index() {
    let (tree, knot) = tree_with_knot();
    let mut state = state_for(&tree);
    assert_eq!(state.turns_since_for_container(&tree, knot).expect("counted"), -1);
    state.set_chosen_path(Pointer::start_of(knot), true);
    state.record_turn_index_visit_to_container(&tree, knot);
    state.set_chosen_path(Pointer::start_of(knot), true);
    state.set_chosen_path(Pointer::start_of(knot), true);
    assert_eq!(state.current_turn_index(), 2);
    assert_eq!(state.turns_since_for_container(&tree, knot).expect("counted"), 2);

    let root = tree.root();
    let error = state
        .turns_since_for_container(&tree, root)
        .expect_err("root is not turn counted");
    assert_eq!(error.code, "STORY_TURNS_SINCE_UNKNOWN");
}

#[test]
fn flows_keep_separate_output() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    push_texts(&mut state, &["main"]);
    state.switch_flow("side");
    assert!(!state.current_flow_is_default_flow());
    push_texts(&mut state, &["aside"]);
    assert_eq!(state.current_text(), "aside");

    state.switch_to_default_flow();
    assert_eq!(state.current_text(), "main");
    assert_eq!(state.alive_flow_names(), vec!["side".to_string()]);

    let error = state
        .remove_flow(DEFAULT_FLOW_NAME)
        .expect_err("default flow cannot be removed");
    assert_eq!(error.code, "STATE_REMOVE_DEFAULT_FLOW");

    state.switch_flow("side");
    state.remove_flow("side").expect("side flow should be removed");
    assert_eq!(state.current_flow_name(), DEFAULT_FLOW_NAME);
    assert!(state.alive_flow_names().is_empty());
}

#[test]
fn force_end_unwinds_to_a_safe_exit() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    state.callstack_mut().push(PushPopType::Tunnel, 0, 0);
    state.force_end();
    assert_eq!(state.callstack().depth(), 1);
    assert!(state.current_pointer().is_null());
    assert!(state.did_safe_exit);
    assert!(!state.can_continue());
}

#[test]
fn save_round_trip_restores_flows_and_counts() {
    let (tree, knot) = tree_with_knot();
    let mut state = state_for(&tree);
    state.set_global("x", Value::Int(1));
    state.variables.snapshot_default_globals();
    state.set_global("x", Value::Int(5));
    state.increment_visit_count_for_container(&tree, knot);
    state.set_current_pointer(Pointer::start_of(knot));
    push_texts(&mut state, &["kept"]);
    state.switch_flow("side");
    state.switch_to_default_flow();

    let json = state.to_json(&tree).expect("state should serialize");
    let mut loaded = state_for(&tree);
    loaded.set_global("x", Value::Int(1));
    loaded.variables.snapshot_default_globals();
    loaded.load_json(&tree, &json).expect("state should load");

    assert_eq!(loaded.global_variable("x"), Some(Value::Int(5)));
    assert_eq!(loaded.visit_count_at_path_string("knot"), 1);
    assert_eq!(loaded.current_pointer(), Pointer::start_of(knot));
    assert_eq!(loaded.current_text(), "kept");
    assert_eq!(loaded.alive_flow_names(), vec!["side".to_string()]);
    assert_eq!(loaded.story_seed(), 7);
}

#[test]
fn load_rejects_old_or_flowless_saves() {
    let (tree, _) = tree_with_knot();
    let mut state = state_for(&tree);
    let old = state
        .load_json(&tree, r#"{"inkSaveVersion":7,"flows":{}}"#)
        .expect_err("old saves are rejected");
    assert_eq!(old.code, "STATE_VERSION");
    let flowless = state
        .load_json(&tree, r#"{"inkSaveVersion":10}"#)
        .expect_err("legacy layout is rejected");
    assert_eq!(flowless.code, "STATE_LEGACY_FORMAT");
}

#[test]
fn load_rejects_call_stacks_without_threads_or_frames() {
    let (tree, _) = tree_with_knot();
    let save = state_for(&tree).to_save(&tree);

    let mut threadless = save.clone();
    for flow in threadless.flows.values_mut() {
        flow.callstack.threads.clear();
    }
    let error = state_for(&tree)
        .load_save(&tree, threadless)
        .expect_err("a flow needs a thread");
    assert_eq!(error.code, "STATE_PARSE");

    let mut frameless = save;
    for flow in frameless.flows.values_mut() {
        for thread in &mut flow.callstack.threads {
            thread.callstack.clear();
        }
    }
    let error = state_for(&tree)
        .load_save(&tree, frameless)
        .expect_err("a thread needs a frame");
    assert_eq!(error.code, "STATE_PARSE");
}

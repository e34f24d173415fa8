// Playback tests over normalized traces

use serde_json::json;
use std::sync::Arc;
use tracescope::player::{PlayerError, PlayerState, StepPlayer};
use tracescope::scene::project;
use tracescope::snapshot::fold;
use tracescope::trace::normalize::normalize;
use tracescope::trace::Trace;

fn counting_trace(steps: usize) -> Arc<Trace> {
    let steps: Vec<_> = (0..steps)
        .map(|i| {
            json!({
                "line": i + 1,
                "variables": {"i": i},
                "stdout": [format!("tick {}", i)],
                "heap": [{"id": "counter", "type": "Object", "value": {"n": i}}]
            })
        })
        .collect();
    Arc::new(normalize(&json!({"version": "1.0", "steps": steps})))
}

#[test]
fn test_scrub_equals_repeated_step_forward() {
    let trace = counting_trace(6);
    for n in 0..trace.len() {
        let mut stepped = StepPlayer::with_trace(Arc::clone(&trace));
        stepped.scrub_to(0).unwrap();
        for _ in 0..n {
            stepped.step_forward();
        }

        let mut scrubbed = StepPlayer::with_trace(Arc::clone(&trace));
        scrubbed.scrub_to(n).unwrap();

        assert_eq!(stepped.state(), scrubbed.state());
        assert_eq!(
            stepped.current_cumulative_state(),
            scrubbed.current_cumulative_state()
        );
    }
}

#[test]
fn test_scrub_past_end_fails_and_keeps_index() {
    let mut player = StepPlayer::with_trace(counting_trace(3));
    player.scrub_to(1).unwrap();

    let err = player.scrub_to(5).unwrap_err();
    assert_eq!(err, PlayerError::OutOfRange { index: 5, len: 3 });
    assert_eq!(err.to_string(), "step 5 out of range for a trace of 3 steps");
    assert_eq!(player.index(), Some(1));
}

#[test]
fn test_heap_resolution_prefers_latest_entry() {
    let mut player = StepPlayer::with_trace(counting_trace(4));
    player.scrub_to(2).unwrap();
    let snapshot = player.current_cumulative_state();
    assert_eq!(snapshot.state.heap.len(), 1);
    assert_eq!(
        snapshot.state.heap_object("counter").unwrap().value,
        json!({"n": 2})
    );
}

#[test]
fn test_output_accumulates_across_steps() {
    let mut player = StepPlayer::with_trace(counting_trace(3));
    player.scrub_to(2).unwrap();
    let snapshot = player.current_cumulative_state();
    assert_eq!(snapshot.state.stdout, vec!["tick 0", "tick 1", "tick 2"]);
    assert_eq!(snapshot.state.variables["i"], json!(2));
}

#[test]
fn test_synthesized_final_state_matches_full_fold() {
    let trace = counting_trace(5);
    let mut player = StepPlayer::with_trace(Arc::clone(&trace));
    player.jump_to_end();
    assert_eq!(player.state(), PlayerState::Finished);

    let at_end = player.current_cumulative_state();
    assert_eq!(at_end.state, fold(&trace.steps).state);
    assert_eq!(Some(&at_end.state), trace.final_state.as_ref());
}

#[test]
fn test_play_runs_to_completion() {
    let mut player = StepPlayer::with_trace(counting_trace(4));
    player.play();
    let mut ticks = 0;
    while player.is_playing() {
        player.tick();
        ticks += 1;
    }
    assert_eq!(ticks, 4);
    assert_eq!(player.state(), PlayerState::Finished);
}

#[test]
fn test_unchanged_step_projects_identically() {
    let mut player = StepPlayer::with_trace(counting_trace(3));
    player.scrub_to(1).unwrap();
    let first = project(&player.current_cumulative_state()).to_json().unwrap();
    player.step_forward();
    player.step_backward();
    let second = project(&player.current_cumulative_state()).to_json().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_supplied_final_state_matches_fold() {
    let trace = Arc::new(normalize(&json!({
        "version": "1.0",
        "steps": [
            {"line": 1, "stack": [{"id": "f", "functionName": "square"}],
             "heap": [{"type": "Object", "value": {"n": 3}}]},
            {"line": 2, "stack": []},
            {"line": 3, "stack": [{"id": "f", "functionName": "square"}], "stdout": ["9"]}
        ],
        "finalState": {
            "variables": {},
            "stack": [{"id": "f", "functionName": "square"}],
            "heap": [{"type": "Object", "value": {"n": 3}}],
            "stdout": ["9"],
            "errors": []
        }
    })));
    assert_eq!(Some(&fold(&trace.steps).state), trace.final_state.as_ref());

    let mut player = StepPlayer::with_trace(Arc::clone(&trace));
    player.scrub_to(2).unwrap();
    let last_step = player.current_cumulative_state();
    player.step_forward();
    assert_eq!(player.state(), PlayerState::Finished);
    let finished = player.current_cumulative_state();
    assert_eq!(finished.state.stack[0].id, last_step.state.stack[0].id);
    assert_eq!(finished.state.heap, last_step.state.heap);
}

// Cumulative state reconstruction for step-through playback

use crate::trace::{CallEvent, ControlFlow, HeapObject, ProgramState, Step};
use serde::Serialize;

/// Markers of the step a snapshot was taken at
///
/// `line` and `code` carry forward from earlier steps when the current step
/// omits them, so the source view always has a line to highlight.
/// `control_flow` and `calls` belong to the current step only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub line: Option<u32>,
    pub code: Option<String>,
    pub control_flow: Option<ControlFlow>,
    pub calls: Vec<CallEvent>,
}

/// Cumulative program state up to and including one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Index of the last folded step, `None` when no step was folded
    pub step_index: Option<usize>,
    pub state: ProgramState,
    pub cursor: Cursor,
}

impl ProgramState {
    /// Apply one step's delta in place.
    ///
    /// `variables` and `stack` replace the previous values when present.
    /// `heap` entries update by id: a known id is replaced where it stands, a
    /// new id is appended, and nothing is ever removed. `stdout` and `errors`
    /// are appended.
    pub fn apply(&mut self, step: &Step) {
        if let Some(variables) = &step.variables {
            self.variables = variables.clone();
        }
        if let Some(stack) = &step.stack {
            self.stack = stack.clone();
        }
        if let Some(heap) = &step.heap {
            for object in heap {
                upsert_heap_object(&mut self.heap, object);
            }
        }
        if let Some(stdout) = &step.stdout {
            self.stdout.extend(stdout.iter().cloned());
        }
        if let Some(errors) = &step.errors {
            self.errors.extend(errors.iter().cloned());
        }
    }
}

fn upsert_heap_object(heap: &mut Vec<HeapObject>, object: &HeapObject) {
    match heap.iter_mut().find(|existing| existing.id == object.id) {
        Some(existing) => *existing = object.clone(),
        None => heap.push(object.clone()),
    }
}

impl Cursor {
    fn advance(&mut self, step: &Step) {
        if step.line.is_some() {
            self.line = step.line;
        }
        if step.code.is_some() {
            self.code = step.code.clone();
        }
        self.control_flow = step.control_flow.clone();
        self.calls = step.calls.clone().unwrap_or_default();
    }
}

/// Fold steps in order, starting from an empty state.
///
/// Recomputed from scratch on every call; there is no cached accumulator.
pub fn fold(steps: &[Step]) -> Snapshot {
    let mut snapshot = Snapshot::default();
    for (index, step) in steps.iter().enumerate() {
        snapshot.state.apply(step);
        snapshot.cursor.advance(step);
        snapshot.step_index = Some(index);
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn steps(value: serde_json::Value) -> Vec<Step> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_fold_empty() {
        let snapshot = fold(&[]);
        assert_eq!(snapshot.step_index, None);
        assert_eq!(snapshot.state, ProgramState::default());
    }

    #[test]
    fn test_variables_replace_wholesale() {
        let steps = steps(json!([
            {"variables": {"a": 1, "b": 2}},
            {"variables": {"c": 3}},
            {"line": 4}
        ]));
        let snapshot = fold(&steps);
        assert_eq!(snapshot.state.variables.len(), 1);
        assert_eq!(snapshot.state.variables["c"], json!(3));
        assert_eq!(snapshot.step_index, Some(2));
    }

    #[test]
    fn test_stdout_and_errors_append() {
        let steps = steps(json!([
            {"stdout": ["a"]},
            {"stdout": ["b", "c"], "errors": ["oops"]},
            {}
        ]));
        let snapshot = fold(&steps);
        assert_eq!(snapshot.state.stdout, vec!["a", "b", "c"]);
        assert_eq!(snapshot.state.errors, vec!["oops"]);
    }

    #[test]
    fn test_heap_latest_entry_wins_and_nothing_is_removed() {
        let steps = steps(json!([
            {"heap": [{"id": "h1", "type": "Array", "value": [1]}, {"id": "h2", "type": "Object", "value": {}}]},
            {"heap": [{"id": "h1", "type": "Array", "value": [1, 2]}]},
            {"heap": []}
        ]));

        let at_first = fold(&steps[..1]);
        assert_eq!(at_first.state.heap_object("h1").unwrap().value, json!([1]));

        let at_end = fold(&steps);
        assert_eq!(at_end.state.heap.len(), 2);
        assert_eq!(at_end.state.heap[0].id, "h1");
        assert_eq!(at_end.state.heap_object("h1").unwrap().value, json!([1, 2]));
    }

    #[test]
    fn test_cursor_carries_line_but_not_control_flow() {
        let steps = steps(json!([
            {"line": 1, "code": "for (;;) {", "controlFlow": {"loop": {"type": "for", "iteration": 0}}},
            {"calls": [{"functionName": "f", "args": []}]}
        ]));
        let snapshot = fold(&steps);
        assert_eq!(snapshot.cursor.line, Some(1));
        assert_eq!(snapshot.cursor.code.as_deref(), Some("for (;;) {"));
        assert_eq!(snapshot.cursor.control_flow, None);
        assert_eq!(snapshot.cursor.calls.len(), 1);
    }
}

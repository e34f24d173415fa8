//! Total conversion of producer output into a canonical [`Trace`]
//!
//! [`normalize`] never fails. Whatever it is given, it returns a trace with
//! `version` set, a (possibly empty) step list and a populated `finalState`:
//!
//! - fields with the wrong type are dropped, never rejected
//! - missing ids are generated; stack frame ids that would be reused after a
//!   pop, or duplicated within one stack, are rewritten to fresh ids
//! - an absent `finalState` is synthesized by [`snapshot::fold`]; a supplied
//!   one gets the same frame renames and generated ids as the steps
//!
//! [`normalize_str`] adds the raw-text stage: markdown fences are stripped, and
//! text that is not JSON at all becomes the sentinel trace from
//! [`Trace::invalid_json`].
//!
//! Normalizing an already normalized trace returns it unchanged.

use super::{
    CallEvent, ControlFlow, HeapObject, LoopInfo, LoopKind, ProgramState, StackFrame, Step,
    Trace, Variables, TRACE_VERSION,
};
use crate::snapshot;
use log::{debug, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{Map, Value};

/// Error recorded in the sentinel trace for unparseable producer output
pub const INVALID_JSON_ERROR: &str = "Invalid JSON from model";

const ANONYMOUS_FUNCTION: &str = "<anonymous>";
const UNKNOWN_HEAP_TYPE: &str = "unknown";

impl Trace {
    /// The sentinel trace returned when the producer's output is not JSON
    pub fn invalid_json() -> Self {
        Trace {
            version: TRACE_VERSION.to_string(),
            steps: Vec::new(),
            final_state: Some(ProgramState {
                errors: vec![INVALID_JSON_ERROR.to_string()],
                ..ProgramState::default()
            }),
        }
    }

    /// Re-run normalization on this trace
    pub fn normalized(&self) -> Trace {
        match serde_json::to_value(self) {
            Ok(doc) => normalize(&doc),
            Err(e) => {
                warn!("failed to re-serialize trace: {}", e);
                Trace::invalid_json()
            }
        }
    }
}

/// Parse raw producer text and normalize it
pub fn normalize_str(raw: &str) -> Trace {
    match serde_json::from_str::<Value>(strip_code_fence(raw)) {
        Ok(doc) => normalize(&doc),
        Err(e) => {
            warn!("producer output is not valid JSON: {}", e);
            Trace::invalid_json()
        }
    }
}

/// Remove a surrounding markdown code fence, if any
pub(crate) fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    // Drop the opening fence line (```json or ```)
    let body = match trimmed.find('\n') {
        Some(pos) => &trimmed[pos + 1..],
        None => return trimmed,
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Normalize a parsed document into a canonical trace
pub fn normalize(doc: &Value) -> Trace {
    let empty = Map::new();
    let obj = match doc.as_object() {
        Some(obj) => obj,
        None => {
            debug!("document root is not an object; treating it as empty");
            &empty
        }
    };

    let mut ids = IdAllocator::new(doc);
    let mut frames = FrameTracker::default();

    let raw_steps = obj
        .get("steps")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let steps: Vec<Step> = raw_steps
        .iter()
        .enumerate()
        .filter_map(|(i, raw)| match raw.as_object() {
            Some(step) => Some(normalize_step(step, &mut ids, &mut frames)),
            None => {
                debug!("dropping step {}: not an object", i);
                None
            }
        })
        .collect();

    let folded = snapshot::fold(&steps).state;
    let final_state = match obj.get("finalState").and_then(Value::as_object) {
        Some(state) => program_state(state, &folded, &mut ids, &frames),
        None => folded,
    };

    Trace {
        version: TRACE_VERSION.to_string(),
        steps,
        final_state: Some(final_state),
    }
}

/// Hands out ids that collide with nothing in the document
struct IdAllocator {
    taken: FxHashSet<String>,
    counters: FxHashMap<String, usize>,
}

impl IdAllocator {
    fn new(doc: &Value) -> Self {
        let mut taken = FxHashSet::default();
        collect_ids(doc, &mut taken);
        IdAllocator {
            taken,
            counters: FxHashMap::default(),
        }
    }

    fn fresh(&mut self, base: &str) -> String {
        let counter = self.counters.entry(base.to_string()).or_insert(0);
        loop {
            *counter += 1;
            let candidate = format!("{}-{}", base, counter);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

/// Gather every frame and heap id mentioned anywhere in the document
fn collect_ids(doc: &Value, taken: &mut FxHashSet<String>) {
    let mut collect_from = |state: &Map<String, Value>| {
        for key in ["stack", "heap"] {
            let Some(items) = state.get(key).and_then(Value::as_array) else {
                continue;
            };
            for item in items {
                if let Some(id) = item.get("id").and_then(Value::as_str) {
                    taken.insert(id.to_string());
                }
            }
        }
    };

    if let Some(steps) = doc.get("steps").and_then(Value::as_array) {
        for step in steps.iter().filter_map(Value::as_object) {
            collect_from(step);
        }
    }
    if let Some(state) = doc.get("finalState").and_then(Value::as_object) {
        collect_from(state);
    }
}

/// Keeps frame ids unique over the lifetime of the trace
#[derive(Default)]
struct FrameTracker {
    /// Producer id -> canonical id, for frames on the current stack
    live: FxHashMap<String, String>,
    /// Canonical ids of frames that have been popped
    retired: FxHashSet<String>,
}

impl FrameTracker {
    fn resolve(&mut self, raw_frames: &[Value], ids: &mut IdAllocator) -> Vec<StackFrame> {
        let mut next_live: FxHashMap<String, String> = FxHashMap::default();
        let mut used: FxHashSet<String> = FxHashSet::default();
        let mut frames = Vec::with_capacity(raw_frames.len());

        for raw in raw_frames.iter().filter_map(Value::as_object) {
            let raw_id = raw
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty());

            let id = match raw_id {
                None => ids.fresh("frame"),
                Some(raw_id) => {
                    let continuing = self.live.get(raw_id);
                    let candidate = continuing.cloned().unwrap_or_else(|| raw_id.to_string());
                    let reused = continuing.is_none() && self.retired.contains(&candidate);
                    if reused || used.contains(&candidate) {
                        let fresh = ids.fresh(raw_id);
                        debug!("frame id '{}' reused; renamed to '{}'", raw_id, fresh);
                        fresh
                    } else {
                        candidate
                    }
                }
            };

            if let Some(raw_id) = raw_id {
                next_live
                    .entry(raw_id.to_string())
                    .or_insert_with(|| id.clone());
            }
            used.insert(id.clone());
            frames.push(stack_frame(raw, id));
        }

        for (_, canonical) in self.live.drain() {
            if !used.contains(&canonical) {
                self.retired.insert(canonical);
            }
        }
        self.live = next_live;
        frames
    }

    /// Resolve `finalState.stack` against the stack left by the last step.
    ///
    /// Frames without an id take the id of the folded frame at the same depth
    /// when the function matches.
    fn resolve_final(
        &self,
        raw_frames: &[Value],
        folded: &[StackFrame],
        ids: &mut IdAllocator,
    ) -> Vec<StackFrame> {
        let mut used: FxHashSet<String> = FxHashSet::default();
        let mut frames = Vec::with_capacity(raw_frames.len());

        for (depth, raw) in raw_frames.iter().filter_map(Value::as_object).enumerate() {
            let raw_id = raw
                .get("id")
                .and_then(Value::as_str)
                .filter(|id| !id.trim().is_empty());
            let function_name = raw
                .get("functionName")
                .and_then(Value::as_str)
                .unwrap_or(ANONYMOUS_FUNCTION);

            let candidate = match raw_id {
                Some(raw_id) => self.live.get(raw_id).cloned().or_else(|| {
                    Some(raw_id.to_string()).filter(|id| !self.retired.contains(id))
                }),
                None => folded
                    .get(depth)
                    .filter(|frame| frame.function_name == function_name)
                    .map(|frame| frame.id.clone()),
            };
            let id = match candidate {
                Some(id) if !used.contains(&id) => id,
                _ => {
                    let fresh = ids.fresh(raw_id.unwrap_or("frame"));
                    debug!("finalState frame renamed to '{}'", fresh);
                    fresh
                }
            };

            used.insert(id.clone());
            frames.push(stack_frame(raw, id));
        }
        frames
    }
}

fn normalize_step(
    obj: &Map<String, Value>,
    ids: &mut IdAllocator,
    frames: &mut FrameTracker,
) -> Step {
    Step {
        line: obj.get("line").and_then(line_number),
        code: obj.get("code").and_then(Value::as_str).map(str::to_string),
        variables: obj.get("variables").and_then(Value::as_object).cloned(),
        stack: obj
            .get("stack")
            .and_then(Value::as_array)
            .map(|raw| frames.resolve(raw, ids)),
        heap: obj
            .get("heap")
            .and_then(Value::as_array)
            .map(|raw| heap_objects(raw, ids)),
        stdout: obj.get("stdout").and_then(text_lines),
        errors: obj.get("errors").and_then(text_lines),
        calls: obj.get("calls").and_then(Value::as_array).map(|raw| calls(raw)),
        control_flow: obj
            .get("controlFlow")
            .and_then(Value::as_object)
            .map(control_flow),
    }
}

fn program_state(
    obj: &Map<String, Value>,
    folded: &ProgramState,
    ids: &mut IdAllocator,
    frames: &FrameTracker,
) -> ProgramState {
    ProgramState {
        variables: obj
            .get("variables")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
        stack: obj
            .get("stack")
            .and_then(Value::as_array)
            .map(|raw| frames.resolve_final(raw, &folded.stack, ids))
            .unwrap_or_default(),
        heap: obj
            .get("heap")
            .and_then(Value::as_array)
            .map(|raw| final_heap_objects(raw, &folded.heap, ids))
            .unwrap_or_default(),
        stdout: obj.get("stdout").and_then(text_lines).unwrap_or_default(),
        errors: obj.get("errors").and_then(text_lines).unwrap_or_default(),
    }
}

fn stack_frame(obj: &Map<String, Value>, id: String) -> StackFrame {
    StackFrame {
        id,
        function_name: obj
            .get("functionName")
            .and_then(Value::as_str)
            .unwrap_or(ANONYMOUS_FUNCTION)
            .to_string(),
        locals: obj
            .get("locals")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(Variables::new),
        return_address: obj
            .get("returnAddress")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn heap_objects(raw: &[Value], ids: &mut IdAllocator) -> Vec<HeapObject> {
    raw.iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            let id = match present_id(obj) {
                Some(id) => id.to_string(),
                None => ids.fresh("heap"),
            };
            heap_object(obj, id)
        })
        .collect()
}

/// Heap objects of a supplied `finalState`. One without an id takes the id of
/// an identical object from the steps.
fn final_heap_objects(
    raw: &[Value],
    folded: &[HeapObject],
    ids: &mut IdAllocator,
) -> Vec<HeapObject> {
    let mut claimed: FxHashSet<&str> = FxHashSet::default();
    raw.iter()
        .filter_map(Value::as_object)
        .map(|obj| {
            if let Some(id) = present_id(obj) {
                return heap_object(obj, id.to_string());
            }
            let mut object = heap_object(obj, String::new());
            let matching = folded.iter().find(|candidate| {
                !claimed.contains(candidate.id.as_str())
                    && candidate.kind == object.kind
                    && candidate.value == object.value
            });
            object.id = match matching {
                Some(candidate) => {
                    claimed.insert(candidate.id.as_str());
                    candidate.id.clone()
                }
                None => ids.fresh("heap"),
            };
            object
        })
        .collect()
}

fn present_id(obj: &Map<String, Value>) -> Option<&str> {
    obj.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

fn heap_object(obj: &Map<String, Value>, id: String) -> HeapObject {
    HeapObject {
        id,
        kind: obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or(UNKNOWN_HEAP_TYPE)
            .to_string(),
        value: obj.get("value").cloned().unwrap_or(Value::Null),
    }
}

fn calls(raw: &[Value]) -> Vec<CallEvent> {
    raw.iter()
        .filter_map(Value::as_object)
        .filter_map(|obj| {
            let name = obj.get("functionName").and_then(Value::as_str)?;
            Some(CallEvent {
                function_name: name.to_string(),
                args: obj
                    .get("args")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn control_flow(obj: &Map<String, Value>) -> ControlFlow {
    let loop_info = obj.get("loop").and_then(Value::as_object).and_then(|l| {
        let kind = l.get("type").and_then(Value::as_str).and_then(LoopKind::parse)?;
        Some(LoopInfo {
            kind,
            iteration: l.get("iteration").and_then(counter).unwrap_or(0),
        })
    });
    ControlFlow {
        branch: obj.get("branch").and_then(Value::as_str).map(str::to_string),
        loop_info,
    }
}

/// Accepts `3` and `3.0`; rejects negatives and non-numbers
fn counter(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
            .map(|f| f as u64)
    })
}

fn line_number(value: &Value) -> Option<u32> {
    counter(value).and_then(|n| u32::try_from(n).ok())
}

/// Coerce `stdout`/`errors` content into lines of text
fn text_lines(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect(),
        ),
        Value::String(s) => Some(vec![s.clone()]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::validate::validate;
    use serde_json::json;

    #[test]
    fn test_invalid_json_gives_sentinel() {
        for raw in ["", "not json", "{\"version\": \"1.0\", \"steps\": [", "```json\n{]\n```"] {
            let trace = normalize_str(raw);
            assert_eq!(trace, Trace::invalid_json(), "input: {:?}", raw);
            assert_eq!(
                trace.final_state.unwrap().errors,
                vec![INVALID_JSON_ERROR.to_string()]
            );
        }
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let raw = "```json\n{\"version\": \"1.0\", \"steps\": [{\"line\": 1}]}\n```";
        let trace = normalize_str(raw);
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.steps[0].line, Some(1));
    }

    #[test]
    fn test_defaults_for_missing_version_and_steps() {
        let trace = normalize(&json!({}));
        assert_eq!(trace.version, TRACE_VERSION);
        assert!(trace.steps.is_empty());
        assert_eq!(trace.final_state, Some(ProgramState::default()));
    }

    #[test]
    fn test_non_object_root_is_empty_trace() {
        let trace = normalize(&json!(["steps"]));
        assert!(trace.is_empty());
        assert_eq!(trace.final_state, Some(ProgramState::default()));
    }

    #[test]
    fn test_final_state_synthesized_from_steps() {
        let doc = json!({
            "version": "1.0",
            "steps": [
                {"variables": {"x": 1}, "stdout": ["a"]},
                {"heap": [{"id": "h1", "type": "Array", "value": []}]},
                {"variables": {"x": 2}, "stdout": ["b"], "errors": ["warn"]}
            ]
        });
        let final_state = normalize(&doc).final_state.unwrap();
        assert_eq!(final_state.variables["x"], json!(2));
        assert_eq!(final_state.stdout, vec!["a", "b"]);
        assert_eq!(final_state.errors, vec!["warn"]);
        assert_eq!(final_state.heap.len(), 1);
    }

    #[test]
    fn test_supplied_final_state_is_kept_and_defaulted() {
        let doc = json!({
            "version": "1.0",
            "steps": [{"stdout": ["ignored by finalState"]}],
            "finalState": {"variables": {"x": 7}, "stdout": ["7"]}
        });
        let final_state = normalize(&doc).final_state.unwrap();
        assert_eq!(final_state.variables["x"], json!(7));
        assert_eq!(final_state.stdout, vec!["7"]);
        assert!(final_state.stack.is_empty());
        assert!(final_state.errors.is_empty());
    }

    #[test]
    fn test_supplied_final_state_follows_step_repairs() {
        let doc = json!({
            "steps": [
                {"stack": [{"id": "f", "functionName": "add"}],
                 "heap": [{"type": "Array", "value": [1]}]},
                {"stack": []},
                {"stack": [{"id": "f", "functionName": "add"}], "variables": {"x": 1}, "stdout": ["a"]}
            ],
            "finalState": {
                "variables": {"x": 1},
                "stack": [{"id": "f", "functionName": "add"}],
                "heap": [{"type": "Array", "value": [1]}],
                "stdout": ["a"],
                "errors": []
            }
        });
        let trace = normalize(&doc);
        let final_state = trace.final_state.as_ref().unwrap();
        assert_eq!(final_state.stack[0].id, "f-1");
        assert_eq!(final_state.heap[0].id, "heap-1");
        assert_eq!(&snapshot::fold(&trace.steps).state, final_state);
        assert_eq!(trace.normalized(), trace);
    }

    #[test]
    fn test_final_state_frame_retired_by_steps_is_renamed() {
        let doc = json!({
            "steps": [
                {"stack": [{"id": "g", "functionName": "g"}]},
                {"stack": []}
            ],
            "finalState": {"stack": [{"id": "g", "functionName": "g"}, {"functionName": "h"}]}
        });
        let final_state = normalize(&doc).final_state.unwrap();
        assert_eq!(final_state.stack[0].id, "g-1");
        assert_eq!(final_state.stack[1].id, "frame-1");
    }

    #[test]
    fn test_wrong_typed_fields_are_dropped() {
        let doc = json!({
            "steps": [
                42,
                {"line": "three", "code": 5, "variables": [1], "stdout": "single line", "calls": [{"args": []}]}
            ]
        });
        let trace = normalize(&doc);
        assert_eq!(trace.len(), 1);
        let step = &trace.steps[0];
        assert_eq!(step.line, None);
        assert_eq!(step.code, None);
        assert_eq!(step.variables, None);
        assert_eq!(step.stdout, Some(vec!["single line".to_string()]));
        assert_eq!(step.calls, Some(vec![]));
    }

    #[test]
    fn test_missing_ids_are_generated_without_collisions() {
        let doc = json!({
            "steps": [{
                "stack": [{"functionName": "main"}, {"id": "frame-1", "functionName": "f"}],
                "heap": [{"type": "Array", "value": [1]}, {"id": ""}]
            }]
        });
        let trace = normalize(&doc);
        let step = &trace.steps[0];
        let stack = step.stack.as_ref().unwrap();
        assert_eq!(stack[0].id, "frame-2");
        assert_eq!(stack[1].id, "frame-1");
        let heap = step.heap.as_ref().unwrap();
        assert_eq!(heap[0].id, "heap-1");
        assert_eq!(heap[1].id, "heap-2");
        assert_eq!(heap[1].kind, "unknown");
        assert_eq!(heap[1].value, Value::Null);
        assert!(validate(&serde_json::to_value(&trace).unwrap()).is_valid());
    }

    #[test]
    fn test_frame_id_reused_after_pop_is_renamed() {
        let doc = json!({
            "steps": [
                {"stack": [{"id": "main", "functionName": "main"}, {"id": "f", "functionName": "add"}]},
                {"stack": [{"id": "main", "functionName": "main"}]},
                {"stack": [{"id": "main", "functionName": "main"}, {"id": "f", "functionName": "add"}]},
                {"stack": [{"id": "main", "functionName": "main"}, {"id": "f", "functionName": "add"}]}
            ]
        });
        let trace = normalize(&doc);
        let ids: Vec<Vec<String>> = trace
            .steps
            .iter()
            .map(|s| s.stack.as_ref().unwrap().iter().map(|f| f.id.clone()).collect())
            .collect();
        assert_eq!(ids[0], vec!["main", "f"]);
        assert_eq!(ids[1], vec!["main"]);
        assert_eq!(ids[2], vec!["main", "f-1"]);
        // The same activation keeps its rewritten id
        assert_eq!(ids[3], vec!["main", "f-1"]);
    }

    #[test]
    fn test_duplicate_frame_ids_in_one_stack() {
        let doc = json!({
            "steps": [{"stack": [
                {"id": "f", "functionName": "fib"},
                {"id": "f", "functionName": "fib"}
            ]}]
        });
        let trace = normalize(&doc);
        let stack = trace.steps[0].stack.as_ref().unwrap();
        assert_eq!(stack[0].id, "f");
        assert_eq!(stack[1].id, "f-1");
    }

    #[test]
    fn test_loop_info_is_lenient() {
        let doc = json!({
            "steps": [
                {"controlFlow": {"loop": {"type": "While", "iteration": 2.0}}},
                {"controlFlow": {"branch": "if-false", "loop": {"type": "repeat", "iteration": 1}}},
                {"controlFlow": {"loop": null}}
            ]
        });
        let trace = normalize(&doc);
        let flows: Vec<&ControlFlow> = trace
            .steps
            .iter()
            .map(|s| s.control_flow.as_ref().unwrap())
            .collect();
        assert_eq!(
            flows[0].loop_info,
            Some(LoopInfo {
                kind: LoopKind::While,
                iteration: 2
            })
        );
        assert_eq!(flows[1].branch.as_deref(), Some("if-false"));
        assert_eq!(flows[1].loop_info, None);
        assert_eq!(flows[2], &ControlFlow::default());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let doc = json!({
            "steps": [
                {"line": 1, "stack": [{"functionName": "main"}], "heap": [{"type": "Object"}]},
                {"stack": []},
                {"stack": [{"id": "frame-1", "functionName": "main"}], "stdout": [1, true]},
                {"controlFlow": {"loop": {"type": "for", "iteration": 3}}, "calls": [{"functionName": "f"}]}
            ]
        });
        let once = normalize(&doc);
        let twice = once.normalized();
        assert_eq!(once, twice);
        assert_eq!(twice.normalized(), twice);
    }
}

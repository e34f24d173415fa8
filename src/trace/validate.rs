//! Structural validation of producer documents
//!
//! [`validate`] checks a parsed document against the trace shape and reports
//! every deviation it finds, in document order. It is deliberately permissive:
//! - unknown fields are ignored
//! - `null` in an optional step field counts as absent
//! - cross-step consistency (a heap id used before it is created, a frame id
//!   reused after a pop) is not checked; the normalizer repairs those
//!
//! Validation never blocks the pipeline. Its result is diagnostic: the
//! analyzer logs it and hands it back alongside the normalized trace.

use super::{LoopKind, TRACE_VERSION};
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

/// One structural problem found in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// Location such as `steps[2].stack[0].id`; `$` is the document root
    pub path: String,
    pub reason: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(Vec<Violation>),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn violations(&self) -> &[Violation] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Invalid(violations) => violations,
        }
    }

    pub fn into_violations(self) -> Vec<Violation> {
        match self {
            ValidationResult::Valid => Vec::new(),
            ValidationResult::Invalid(violations) => violations,
        }
    }
}

/// Check a parsed document against the trace schema
pub fn validate(doc: &Value) -> ValidationResult {
    let mut validator = Validator::default();
    validator.document(doc);
    validator.finish()
}

/// Name of a JSON value's type, for violation messages
pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

pub(crate) fn index_path(parent: &str, index: usize) -> String {
    format!("{}[{}]", parent, index)
}

/// Optional field lookup where an explicit `null` counts as absent
fn present<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    obj.get(key).filter(|v| !v.is_null())
}

#[derive(Default)]
pub(crate) struct Validator {
    violations: Vec<Violation>,
}

impl Validator {
    pub(crate) fn report(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.violations.push(Violation {
            path: path.into(),
            reason: reason.into(),
        });
    }

    pub(crate) fn finish(self) -> ValidationResult {
        if self.violations.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid(self.violations)
        }
    }

    fn expected(&mut self, path: &str, expected: &str, got: &Value) {
        self.report(path, format!("expected {}, got {}", expected, kind_of(got)));
    }

    fn missing(&mut self, path: &str) {
        self.report(path, "missing required field");
    }

    pub(crate) fn object<'a>(
        &mut self,
        path: &str,
        value: &'a Value,
    ) -> Option<&'a Map<String, Value>> {
        let obj = value.as_object();
        if obj.is_none() {
            self.expected(path, "an object", value);
        }
        obj
    }

    fn array<'a>(&mut self, path: &str, value: &'a Value) -> Option<&'a [Value]> {
        let arr = value.as_array();
        if arr.is_none() {
            self.expected(path, "an array", value);
        }
        arr.map(Vec::as_slice)
    }

    pub(crate) fn string(&mut self, path: &str, value: &Value) {
        if !value.is_string() {
            self.expected(path, "a string", value);
        }
    }

    fn non_empty_id(&mut self, path: &str, value: Option<&Value>) {
        match value {
            None => self.missing(path),
            Some(Value::String(s)) if s.trim().is_empty() => {
                self.report(path, "id must be a non-empty string")
            }
            Some(Value::String(_)) => {}
            Some(other) => self.expected(path, "a non-empty string", other),
        }
    }

    fn non_negative_integer(&mut self, path: &str, value: &Value) {
        if value.as_u64().is_none() {
            self.expected(path, "a non-negative integer", value);
        }
    }

    fn string_list(&mut self, path: &str, value: &Value) {
        if let Some(items) = self.array(path, value) {
            for (i, item) in items.iter().enumerate() {
                self.string(&index_path(path, i), item);
            }
        }
    }

    fn required<'a>(
        &mut self,
        path: &str,
        obj: &'a Map<String, Value>,
        key: &str,
    ) -> Option<&'a Value> {
        let value = obj.get(key);
        if value.is_none() {
            self.missing(&field_path(path, key));
        }
        value
    }

    fn document(&mut self, doc: &Value) {
        let Some(obj) = doc.as_object() else {
            self.expected("$", "an object", doc);
            return;
        };

        match obj.get("version") {
            None => self.missing("version"),
            Some(Value::String(v)) if v == TRACE_VERSION => {}
            Some(other) => self.report(
                "version",
                format!("expected \"{}\", got {}", TRACE_VERSION, other),
            ),
        }

        if let Some(steps) = obj.get("steps") {
            if let Some(steps) = self.array("steps", steps) {
                for (i, step) in steps.iter().enumerate() {
                    self.step(&index_path("steps", i), step);
                }
            }
        }

        if let Some(final_state) = obj.get("finalState") {
            self.final_state("finalState", final_state);
        }
    }

    fn step(&mut self, path: &str, step: &Value) {
        let Some(obj) = self.object(path, step) else {
            return;
        };

        if let Some(line) = present(obj, "line") {
            self.non_negative_integer(&field_path(path, "line"), line);
        }
        if let Some(code) = present(obj, "code") {
            self.string(&field_path(path, "code"), code);
        }
        if let Some(variables) = present(obj, "variables") {
            self.object(&field_path(path, "variables"), variables);
        }
        if let Some(stack) = present(obj, "stack") {
            self.frames(&field_path(path, "stack"), stack);
        }
        if let Some(heap) = present(obj, "heap") {
            self.heap(&field_path(path, "heap"), heap);
        }
        if let Some(stdout) = present(obj, "stdout") {
            self.string_list(&field_path(path, "stdout"), stdout);
        }
        if let Some(errors) = present(obj, "errors") {
            self.string_list(&field_path(path, "errors"), errors);
        }
        if let Some(calls) = present(obj, "calls") {
            self.calls(&field_path(path, "calls"), calls);
        }
        if let Some(flow) = present(obj, "controlFlow") {
            self.control_flow(&field_path(path, "controlFlow"), flow);
        }
    }

    fn frames(&mut self, path: &str, value: &Value) {
        let Some(frames) = self.array(path, value) else {
            return;
        };
        for (i, frame) in frames.iter().enumerate() {
            let frame_path = index_path(path, i);
            let Some(obj) = self.object(&frame_path, frame) else {
                continue;
            };
            self.non_empty_id(&field_path(&frame_path, "id"), obj.get("id"));
            if let Some(name) = self.required(&frame_path, obj, "functionName") {
                self.string(&field_path(&frame_path, "functionName"), name);
            }
            if let Some(locals) = self.required(&frame_path, obj, "locals") {
                self.object(&field_path(&frame_path, "locals"), locals);
            }
            if let Some(ret) = present(obj, "returnAddress") {
                self.string(&field_path(&frame_path, "returnAddress"), ret);
            }
        }
    }

    fn heap(&mut self, path: &str, value: &Value) {
        let Some(objects) = self.array(path, value) else {
            return;
        };
        for (i, object) in objects.iter().enumerate() {
            let object_path = index_path(path, i);
            let Some(obj) = self.object(&object_path, object) else {
                continue;
            };
            self.non_empty_id(&field_path(&object_path, "id"), obj.get("id"));
            if let Some(kind) = self.required(&object_path, obj, "type") {
                self.string(&field_path(&object_path, "type"), kind);
            }
            self.required(&object_path, obj, "value");
        }
    }

    fn calls(&mut self, path: &str, value: &Value) {
        let Some(calls) = self.array(path, value) else {
            return;
        };
        for (i, call) in calls.iter().enumerate() {
            let call_path = index_path(path, i);
            let Some(obj) = self.object(&call_path, call) else {
                continue;
            };
            if let Some(name) = self.required(&call_path, obj, "functionName") {
                self.string(&field_path(&call_path, "functionName"), name);
            }
            if let Some(args) = self.required(&call_path, obj, "args") {
                self.array(&field_path(&call_path, "args"), args);
            }
        }
    }

    fn control_flow(&mut self, path: &str, value: &Value) {
        let Some(obj) = self.object(path, value) else {
            return;
        };
        if let Some(branch) = present(obj, "branch") {
            self.string(&field_path(path, "branch"), branch);
        }
        let Some(loop_info) = present(obj, "loop") else {
            return;
        };
        let loop_path = field_path(path, "loop");
        let Some(loop_obj) = self.object(&loop_path, loop_info) else {
            return;
        };
        match self.required(&loop_path, loop_obj, "type") {
            Some(Value::String(kind)) if LoopKind::parse(kind).is_some() => {}
            Some(other) => self.report(
                field_path(&loop_path, "type"),
                format!("expected one of for, while, do-while, got {}", other),
            ),
            None => {}
        }
        if let Some(iteration) = self.required(&loop_path, loop_obj, "iteration") {
            self.non_negative_integer(&field_path(&loop_path, "iteration"), iteration);
        }
    }

    fn final_state(&mut self, path: &str, value: &Value) {
        let Some(obj) = self.object(path, value) else {
            return;
        };
        if let Some(variables) = self.required(path, obj, "variables") {
            self.object(&field_path(path, "variables"), variables);
        }
        if let Some(stack) = self.required(path, obj, "stack") {
            self.frames(&field_path(path, "stack"), stack);
        }
        if let Some(heap) = self.required(path, obj, "heap") {
            self.heap(&field_path(path, "heap"), heap);
        }
        if let Some(stdout) = self.required(path, obj, "stdout") {
            self.string_list(&field_path(path, "stdout"), stdout);
        }
        if let Some(errors) = self.required(path, obj, "errors") {
            self.string_list(&field_path(path, "errors"), errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn paths(result: &ValidationResult) -> Vec<&str> {
        result.violations().iter().map(|v| v.path.as_str()).collect()
    }

    #[test]
    fn test_minimal_document_is_valid() {
        let doc = json!({"version": "1.0", "steps": []});
        assert_eq!(validate(&doc), ValidationResult::Valid);
    }

    #[test]
    fn test_full_step_is_valid() {
        let doc = json!({
            "version": "1.0",
            "steps": [{
                "line": 3,
                "code": "const x = add(2, 5);",
                "variables": {"x": 7},
                "stack": [{"id": "f1", "functionName": "main", "locals": {}}],
                "heap": [{"id": "h1", "type": "Array", "value": [1, 2]}],
                "stdout": ["7"],
                "errors": [],
                "calls": [{"functionName": "add", "args": [2, 5]}],
                "controlFlow": {"branch": "if-true", "loop": {"type": "for", "iteration": 0}},
                "someFutureField": true
            }],
            "finalState": {"variables": {}, "stack": [], "heap": [], "stdout": [], "errors": []}
        });
        assert!(validate(&doc).is_valid());
    }

    #[test]
    fn test_wrong_version() {
        let result = validate(&json!({"version": "2.0", "steps": []}));
        assert_eq!(paths(&result), vec!["version"]);

        let result = validate(&json!({"steps": []}));
        assert_eq!(result.violations()[0].reason, "missing required field");
    }

    #[test]
    fn test_non_object_root() {
        let result = validate(&json!([1, 2, 3]));
        assert_eq!(paths(&result), vec!["$"]);
        assert_eq!(result.violations()[0].reason, "expected an object, got array");
    }

    #[test]
    fn test_empty_ids_are_reported() {
        let doc = json!({
            "version": "1.0",
            "steps": [
                {"stack": [{"id": "", "functionName": "main", "locals": {}}]},
                {"heap": [{"type": "Object", "value": {}}]}
            ]
        });
        let result = validate(&doc);
        assert_eq!(paths(&result), vec!["steps[0].stack[0].id", "steps[1].heap[0].id"]);
    }

    #[test]
    fn test_violations_in_document_order() {
        let doc = json!({
            "version": "1.0",
            "steps": [
                "not a step",
                {"line": -1, "stdout": ["ok", 3]},
                {"controlFlow": {"loop": {"type": "until", "iteration": 1}}}
            ]
        });
        let result = validate(&doc);
        assert_eq!(
            paths(&result),
            vec![
                "steps[0]",
                "steps[1].line",
                "steps[1].stdout[1]",
                "steps[2].controlFlow.loop.type"
            ]
        );
    }

    #[test]
    fn test_null_optional_fields_are_absent() {
        let doc = json!({
            "version": "1.0",
            "steps": [{"line": null, "code": null, "controlFlow": {"loop": null}}]
        });
        assert!(validate(&doc).is_valid());
    }

    #[test]
    fn test_cross_step_references_not_checked() {
        // Frame id reused after being popped: tolerated here.
        let doc = json!({
            "version": "1.0",
            "steps": [
                {"stack": [{"id": "f1", "functionName": "main", "locals": {}}]},
                {"stack": []},
                {"stack": [{"id": "f1", "functionName": "main", "locals": {}}]}
            ]
        });
        assert!(validate(&doc).is_valid());
    }

    #[test]
    fn test_final_state_requires_all_fields() {
        let doc = json!({"version": "1.0", "steps": [], "finalState": {"variables": {}}});
        let result = validate(&doc);
        assert_eq!(
            paths(&result),
            vec![
                "finalState.stack",
                "finalState.heap",
                "finalState.stdout",
                "finalState.errors"
            ]
        );
    }
}

//! Execution trace schema
//!
//! This module defines the shapes exchanged with the trace producer:
//! - [`Trace`]: the full ordered record of a hypothetical execution
//! - [`Step`]: one sparse delta within a trace
//! - [`ProgramState`]: a complete program state (`finalState`, or the cumulative
//!   state at a step)
//! - [`StackFrame`], [`HeapObject`], [`CallEvent`], [`ControlFlow`]
//!
//! Field names serialize in camelCase to match the wire format.
//!
//! Documents from the producer are never deserialized into these types
//! directly. They go through [`validate`] (diagnostics only) and
//! [`normalize`] (total conversion), so a malformed document never fails the
//! pipeline.

pub mod normalize;
pub mod validate;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only trace format version this crate produces.
pub const TRACE_VERSION: &str = "1.0";

/// Any value a program variable can hold.
pub type VariableValue = Value;

/// Variables by name, in the order the producer listed them.
pub type Variables = Map<String, VariableValue>;

/// Scope label of top-level variables
pub const GLOBAL_SCOPE: &str = "global";

/// A named variable together with the scope it was found in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableBinding {
    pub name: String,
    pub value: VariableValue,
    /// Grouping label such as `global` or `function:foo`
    pub scope: String,
}

/// Activation record of one function call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    /// Unique for the whole trace, never reused after the frame is popped
    pub id: String,
    pub function_name: String,
    #[serde(default)]
    pub locals: Variables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_address: Option<String>,
}

/// A reference-semantics value (array, object, closure)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeapObject {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: VariableValue,
}

/// A function call observed during a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub function_name: String,
    #[serde(default)]
    pub args: Vec<VariableValue>,
}

/// Loop flavour reported in [`LoopInfo`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    #[serde(rename = "for")]
    For,
    #[serde(rename = "while")]
    While,
    #[serde(rename = "do-while")]
    DoWhile,
}

impl LoopKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LoopKind::For => "for",
            LoopKind::While => "while",
            LoopKind::DoWhile => "do-while",
        }
    }

    /// Parse a loop kind, tolerating case and `_`/space separators
    pub fn parse(s: &str) -> Option<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c.to_ascii_lowercase() })
            .collect();
        match normalized.as_str() {
            "for" => Some(LoopKind::For),
            "while" => Some(LoopKind::While),
            "do-while" | "dowhile" => Some(LoopKind::DoWhile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopInfo {
    #[serde(rename = "type")]
    pub kind: LoopKind,
    pub iteration: u64,
}

/// Branch and loop markers for a step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlFlow {
    /// e.g. `if-true`, `if-false`, `loop-continue`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(rename = "loop", default, skip_serializing_if = "Option::is_none")]
    pub loop_info: Option<LoopInfo>,
}

/// One incremental delta of program state
///
/// Every field is optional; a step carries only what changed. `variables` and
/// `stack` replace the previous values wholesale, `heap` entries update by id,
/// and `stdout`/`errors` hold only the lines added by this step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Variables>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<Vec<StackFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heap: Option<Vec<HeapObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calls: Option<Vec<CallEvent>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_flow: Option<ControlFlow>,
}

/// A complete program state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgramState {
    #[serde(default)]
    pub variables: Variables,
    #[serde(default)]
    pub stack: Vec<StackFrame>,
    #[serde(default)]
    pub heap: Vec<HeapObject>,
    /// Full cumulative output
    #[serde(default)]
    pub stdout: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ProgramState {
    /// Look up the current entry for a heap id
    pub fn heap_object(&self, id: &str) -> Option<&HeapObject> {
        self.heap.iter().find(|obj| obj.id == id)
    }

    /// Flatten top-level variables and frame locals into scoped bindings.
    ///
    /// Globals come first, then locals frame by frame from the outermost frame.
    pub fn bindings(&self) -> Vec<VariableBinding> {
        let globals = self.variables.iter().map(|(name, value)| VariableBinding {
            name: name.clone(),
            value: value.clone(),
            scope: GLOBAL_SCOPE.to_string(),
        });
        let locals = self.stack.iter().flat_map(|frame| {
            frame.locals.iter().map(move |(name, value)| VariableBinding {
                name: name.clone(),
                value: value.clone(),
                scope: format!("function:{}", frame.function_name),
            })
        });
        globals.chain(locals).collect()
    }
}

/// The full ordered record of a hypothetical program execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trace {
    pub version: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<ProgramState>,
}

impl Trace {
    /// A trace with no steps and no final state
    pub fn empty() -> Self {
        Trace {
            version: TRACE_VERSION.to_string(),
            steps: Vec::new(),
            final_state: None,
        }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::empty()
    }
}

//! Scene projection
//!
//! [`project`] turns a [`Snapshot`] into a [`Scene`]: a fixed sequence of
//! named groups, each an ordered list of label/value entries. The scene says
//! *what* to show and in which order; how it is laid out and painted is up to
//! the renderer (see [`crate::ui`] for the terminal one).
//!
//! Projection is a pure function. Equal snapshots produce equal scenes, entry
//! for entry, which keeps the display stable when an unchanged step is
//! rendered again.

pub mod format;

use crate::snapshot::Snapshot;
use crate::trace::GLOBAL_SCOPE;
use format::{format_call, format_locals, format_loop, format_value};
use serde::Serialize;
use std::fmt;

/// The groups of a scene, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupKind {
    Variables,
    Stack,
    Heap,
    Stdout,
    Errors,
    ControlFlow,
}

impl GroupKind {
    pub const ALL: [GroupKind; 6] = [
        GroupKind::Variables,
        GroupKind::Stack,
        GroupKind::Heap,
        GroupKind::Stdout,
        GroupKind::Errors,
        GroupKind::ControlFlow,
    ];

    pub fn title(self) -> &'static str {
        match self {
            GroupKind::Variables => "Variables",
            GroupKind::Stack => "Call Stack",
            GroupKind::Heap => "Heap",
            GroupKind::Stdout => "Stdout",
            GroupKind::Errors => "Errors",
            GroupKind::ControlFlow => "Control Flow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneEntry {
    pub label: String,
    pub value: String,
}

impl SceneEntry {
    fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        SceneEntry {
            label: label.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for SceneEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.label, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneGroup {
    pub kind: GroupKind,
    pub entries: Vec<SceneEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub step_index: Option<usize>,
    pub groups: Vec<SceneGroup>,
}

impl Scene {
    pub fn group(&self, kind: GroupKind) -> &[SceneEntry] {
        self.groups
            .iter()
            .find(|g| g.kind == kind)
            .map(|g| g.entries.as_slice())
            .unwrap_or_default()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Project a cumulative state into a scene
pub fn project(snapshot: &Snapshot) -> Scene {
    let groups = GroupKind::ALL
        .iter()
        .map(|&kind| SceneGroup {
            kind,
            entries: entries_for(kind, snapshot),
        })
        .collect();

    Scene {
        step_index: snapshot.step_index,
        groups,
    }
}

fn entries_for(kind: GroupKind, snapshot: &Snapshot) -> Vec<SceneEntry> {
    let state = &snapshot.state;
    match kind {
        // Globals first, then frame locals grouped by scope
        GroupKind::Variables => state
            .bindings()
            .into_iter()
            .map(|binding| {
                let label = if binding.scope == GLOBAL_SCOPE {
                    binding.name
                } else {
                    format!("{} ({})", binding.name, binding.scope)
                };
                SceneEntry::new(label, format_value(&binding.value))
            })
            .collect(),
        // Outermost first, innermost (currently executing) last
        GroupKind::Stack => state
            .stack
            .iter()
            .map(|frame| {
                let mut value = format_locals(&frame.locals);
                if let Some(ret) = &frame.return_address {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str("↩ ");
                    value.push_str(ret);
                }
                SceneEntry::new(format!("{}() [{}]", frame.function_name, frame.id), value)
            })
            .collect(),
        GroupKind::Heap => state
            .heap
            .iter()
            .map(|object| {
                SceneEntry::new(
                    object.id.as_str(),
                    format!("{} {}", object.kind, format_value(&object.value)),
                )
            })
            .collect(),
        GroupKind::Stdout => numbered(&state.stdout),
        GroupKind::Errors => numbered(&state.errors),
        GroupKind::ControlFlow => {
            let cursor = &snapshot.cursor;
            let mut entries = Vec::new();
            if let Some(line) = cursor.line {
                entries.push(SceneEntry::new("line", line.to_string()));
            }
            if let Some(code) = &cursor.code {
                entries.push(SceneEntry::new("code", code.trim()));
            }
            if let Some(flow) = &cursor.control_flow {
                if let Some(branch) = &flow.branch {
                    entries.push(SceneEntry::new("branch", branch.as_str()));
                }
                if let Some(info) = &flow.loop_info {
                    entries.push(SceneEntry::new("loop", format_loop(info)));
                }
            }
            for call in &cursor.calls {
                entries.push(SceneEntry::new("call", format_call(call)));
            }
            entries
        }
    }
}

fn numbered(lines: &[String]) -> Vec<SceneEntry> {
    lines
        .iter()
        .enumerate()
        .map(|(i, line)| SceneEntry::new((i + 1).to_string(), line.as_str()))
        .collect()
}

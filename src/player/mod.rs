//! Step-through playback of a loaded trace
//!
//! [`StepPlayer`] is a small state machine:
//!
//! ```text
//! Idle --load--> Ready(0) --forward--> Ready(i+1) ... --forward from last--> Finished
//!   Finished --backward--> Ready(len-1)
//!   any --scrub_to(k)--> Ready(k)
//! ```
//!
//! Loading an empty trace goes straight to `Finished`. The player never
//! mutates the trace; it only moves an index over it and folds the prefix on
//! demand.

use crate::snapshot::{fold, Snapshot};
use crate::trace::Trace;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No trace loaded yet
    Idle,
    /// Positioned at a step index
    Ready(usize),
    /// Past the last step
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlayerError {
    #[error("step {index} out of range for a trace of {len} steps")]
    OutOfRange { index: usize, len: usize },
}

#[derive(Debug, Clone)]
pub struct StepPlayer {
    trace: Option<Arc<Trace>>,
    state: PlayerState,
    playing: bool,
}

impl Default for StepPlayer {
    fn default() -> Self {
        Self::new()
    }
}

impl StepPlayer {
    pub fn new() -> Self {
        StepPlayer {
            trace: None,
            state: PlayerState::Idle,
            playing: false,
        }
    }

    pub fn with_trace(trace: Arc<Trace>) -> Self {
        let mut player = Self::new();
        player.load(trace);
        player
    }

    /// Replace the trace and rewind. Playback stops.
    pub fn load(&mut self, trace: Arc<Trace>) {
        self.state = if trace.is_empty() {
            PlayerState::Finished
        } else {
            PlayerState::Ready(0)
        };
        self.trace = Some(trace);
        self.playing = false;
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Current step index, `None` when idle or finished
    pub fn index(&self) -> Option<usize> {
        match self.state {
            PlayerState::Ready(i) => Some(i),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.trace.as_ref().map_or(0, |t| t.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn trace(&self) -> Option<&Arc<Trace>> {
        self.trace.as_ref()
    }

    pub fn step_forward(&mut self) {
        if let PlayerState::Ready(i) = self.state {
            self.state = if i + 1 < self.len() {
                PlayerState::Ready(i + 1)
            } else {
                PlayerState::Finished
            };
        }
    }

    pub fn step_backward(&mut self) {
        match self.state {
            PlayerState::Ready(i) if i > 0 => self.state = PlayerState::Ready(i - 1),
            PlayerState::Finished if !self.is_empty() => {
                self.state = PlayerState::Ready(self.len() - 1);
            }
            _ => {}
        }
    }

    /// Jump to step `index`. Out-of-range leaves the position unchanged.
    pub fn scrub_to(&mut self, index: usize) -> Result<(), PlayerError> {
        let len = self.len();
        if self.trace.is_none() || index >= len {
            return Err(PlayerError::OutOfRange { index, len });
        }
        self.state = PlayerState::Ready(index);
        Ok(())
    }

    pub fn rewind(&mut self) {
        if self.trace.is_some() {
            self.state = if self.is_empty() {
                PlayerState::Finished
            } else {
                PlayerState::Ready(0)
            };
        }
    }

    pub fn jump_to_end(&mut self) {
        if self.trace.is_some() {
            self.state = PlayerState::Finished;
            self.playing = false;
        }
    }

    /// Start auto-advancing. Has no effect unless positioned on a step.
    pub fn play(&mut self) {
        if matches!(self.state, PlayerState::Ready(_)) {
            self.playing = true;
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    pub fn toggle_play(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Advance one step if playing. Playback stops on reaching `Finished`.
    ///
    /// Returns whether the position changed.
    pub fn tick(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        let before = self.state;
        self.step_forward();
        if self.state == PlayerState::Finished {
            self.playing = false;
        }
        self.state != before
    }

    /// Cumulative state at the current position.
    ///
    /// `Ready(i)` folds steps `0..=i`. `Finished` shows the trace's final
    /// state, with the cursor left where the last step put it. `Idle` is the
    /// empty snapshot.
    pub fn current_cumulative_state(&self) -> Snapshot {
        let Some(trace) = &self.trace else {
            return Snapshot::default();
        };
        match self.state {
            PlayerState::Idle => Snapshot::default(),
            PlayerState::Ready(i) => fold(&trace.steps[..=i]),
            PlayerState::Finished => {
                let mut snapshot = fold(&trace.steps);
                if let Some(final_state) = &trace.final_state {
                    snapshot.state = final_state.clone();
                }
                snapshot
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::normalize::normalize;
    use serde_json::json;

    fn three_steps() -> Arc<Trace> {
        Arc::new(normalize(&json!({
            "steps": [
                {"line": 1, "variables": {"x": 1}, "stdout": ["a"]},
                {"line": 2, "variables": {"x": 2}},
                {"line": 3, "variables": {"x": 3}, "stdout": ["b"]}
            ]
        })))
    }

    #[test]
    fn test_idle_ignores_navigation() {
        let mut player = StepPlayer::new();
        player.step_forward();
        player.step_backward();
        player.play();
        assert_eq!(player.state(), PlayerState::Idle);
        assert!(!player.is_playing());
        assert_eq!(player.scrub_to(0), Err(PlayerError::OutOfRange { index: 0, len: 0 }));
        assert_eq!(player.current_cumulative_state(), Snapshot::default());
    }

    #[test]
    fn test_load_empty_trace_is_finished() {
        let player = StepPlayer::with_trace(Arc::new(Trace::empty()));
        assert_eq!(player.state(), PlayerState::Finished);
    }

    #[test]
    fn test_forward_to_finished_and_back() {
        let mut player = StepPlayer::with_trace(three_steps());
        assert_eq!(player.state(), PlayerState::Ready(0));
        player.step_forward();
        player.step_forward();
        assert_eq!(player.state(), PlayerState::Ready(2));
        player.step_forward();
        assert_eq!(player.state(), PlayerState::Finished);
        player.step_forward();
        assert_eq!(player.state(), PlayerState::Finished);
        player.step_backward();
        assert_eq!(player.state(), PlayerState::Ready(2));
    }

    #[test]
    fn test_backward_at_start_stays() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.step_backward();
        assert_eq!(player.state(), PlayerState::Ready(0));
    }

    #[test]
    fn test_scrub_out_of_range_keeps_position() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.scrub_to(1).unwrap();
        assert_eq!(player.scrub_to(3), Err(PlayerError::OutOfRange { index: 3, len: 3 }));
        assert_eq!(player.state(), PlayerState::Ready(1));
    }

    #[test]
    fn test_cumulative_state_folds_prefix() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.scrub_to(1).unwrap();
        let snapshot = player.current_cumulative_state();
        assert_eq!(snapshot.state.variables["x"], json!(2));
        assert_eq!(snapshot.state.stdout, vec!["a"]);
        assert_eq!(snapshot.cursor.line, Some(2));
    }

    #[test]
    fn test_finished_uses_final_state() {
        let trace = Arc::new(normalize(&json!({
            "steps": [{"line": 1, "variables": {"x": 1}}],
            "finalState": {"variables": {"x": 7}, "stack": [], "heap": [], "stdout": ["7"], "errors": []}
        })));
        let mut player = StepPlayer::with_trace(trace);
        player.jump_to_end();
        let snapshot = player.current_cumulative_state();
        assert_eq!(snapshot.state.variables["x"], json!(7));
        assert_eq!(snapshot.state.stdout, vec!["7"]);
        assert_eq!(snapshot.cursor.line, Some(1));
    }

    #[test]
    fn test_play_ticks_until_finished() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.play();
        assert!(player.tick());
        assert!(player.tick());
        assert_eq!(player.state(), PlayerState::Ready(2));
        assert!(player.tick());
        assert_eq!(player.state(), PlayerState::Finished);
        assert!(!player.is_playing());
        assert!(!player.tick());
    }

    #[test]
    fn test_play_at_finished_does_nothing() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.jump_to_end();
        player.toggle_play();
        assert!(!player.is_playing());
    }

    #[test]
    fn test_load_resets_position_and_playback() {
        let mut player = StepPlayer::with_trace(three_steps());
        player.scrub_to(2).unwrap();
        player.play();
        player.load(three_steps());
        assert_eq!(player.state(), PlayerState::Ready(0));
        assert!(!player.is_playing());
    }
}

//! Main TUI application state and logic

use crate::analyzer::{AnalyzeError, AnalyzeRequest, Analysis, Analyzer};
use crate::config::PlaybackConfig;
use crate::player::{PlayerState, StepPlayer};
use crate::scene::{project, GroupKind, Scene};
use crate::ui::panes::{
    render_group_pane, render_source_pane, render_status_bar, render_terminal_pane,
    resolve_current_line, GroupScrollState, SourceScrollState, StatusRenderData,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use log::{debug, warn};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// An analysis result tagged with the sequence number of its request
pub type AnalysisMessage = (u64, Result<Analysis, AnalyzeError>);

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Source,
    Terminal,
    Variables,
    Stack,
    Heap,
}

impl FocusedPane {
    /// Move focus to the next pane (clockwise: source -> terminal -> variables -> stack -> heap)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Source => FocusedPane::Terminal,
            FocusedPane::Terminal => FocusedPane::Variables,
            FocusedPane::Variables => FocusedPane::Stack,
            FocusedPane::Stack => FocusedPane::Heap,
            FocusedPane::Heap => FocusedPane::Source,
        }
    }
}

/// The main application state
pub struct App {
    pub player: StepPlayer,

    analyzer: Analyzer,
    runtime: Handle,
    results_tx: UnboundedSender<AnalysisMessage>,
    results_rx: UnboundedReceiver<AnalysisMessage>,

    /// Template for re-analysis; `code` is refreshed from disk each time
    request: AnalyzeRequest,
    source_path: PathBuf,
    pub source_code: String,

    /// Sequence number of the newest request; older results are dropped
    pub latest_seq: u64,
    pub is_analyzing: bool,

    pub focused_pane: FocusedPane,

    pub source_scroll: SourceScrollState,
    pub variables_scroll: GroupScrollState,
    pub stack_scroll: GroupScrollState,
    pub heap_scroll: GroupScrollState,
    pub terminal_scroll: usize,

    pub should_quit: bool,
    pub status_message: String,
    pub status_is_error: bool,

    playback: PlaybackConfig,
    /// Last time a step was taken in play mode
    last_play_time: Instant,
    /// Last time space was pressed (for debouncing)
    last_space_press: Instant,
}

impl App {
    pub fn new(
        analyzer: Analyzer,
        request: AnalyzeRequest,
        source_path: PathBuf,
        playback: PlaybackConfig,
        runtime: Handle,
    ) -> Self {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let long_ago = Instant::now()
            .checked_sub(Duration::from_secs(1))
            .unwrap_or_else(Instant::now);
        App {
            player: StepPlayer::new(),
            analyzer,
            runtime,
            results_tx,
            results_rx,
            source_code: request.code.clone(),
            request,
            source_path,
            latest_seq: 0,
            is_analyzing: false,
            focused_pane: FocusedPane::Source,
            source_scroll: SourceScrollState::default(),
            variables_scroll: GroupScrollState::default(),
            stack_scroll: GroupScrollState::default(),
            heap_scroll: GroupScrollState::default(),
            terminal_scroll: 0,
            should_quit: false,
            status_message: String::from("Ready!"),
            status_is_error: false,
            playback,
            last_play_time: Instant::now(),
            last_space_press: long_ago,
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        if self.latest_seq == 0 {
            self.start_analysis();
        }

        loop {
            self.drain_results();
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.player.is_playing()
                && self.last_play_time.elapsed() >= self.playback.step_interval
            {
                self.player.tick();
                if self.player.is_playing() {
                    self.set_status("Playing...");
                } else {
                    self.set_status("Playback complete");
                }
                self.terminal_scroll = usize::MAX;
                self.last_play_time = Instant::now();
            }

            // Poll with timeout so play mode and incoming results keep flowing
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key_event(key);
                    }
                }
            }
        }

        Ok(())
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_is_error = false;
    }

    fn set_error(&mut self, message: impl Into<String>) {
        self.status_message = message.into();
        self.status_is_error = true;
    }

    /// Submit the current request in the background.
    ///
    /// The new sequence number supersedes any request still in flight.
    pub fn start_analysis(&mut self) {
        let request = self.request.clone();
        let ticket = match self.analyzer.begin(&request) {
            Ok(ticket) => ticket,
            Err(e) => {
                self.set_error(e.detailed());
                return;
            }
        };
        self.latest_seq = ticket.seq;
        self.is_analyzing = true;
        self.set_status(format!("Analyzing with {}...", self.analyzer.generator_name()));

        let analyzer = self.analyzer.clone();
        let tx = self.results_tx.clone();
        self.runtime.spawn(async move {
            let seq = ticket.seq;
            let result = analyzer.run(ticket, &request).await;
            // Receiver is gone only when the app has exited
            let _ = tx.send((seq, result));
        });
    }

    /// Re-read the file and analyze it again
    fn reload(&mut self) {
        match fs::read_to_string(&self.source_path) {
            Ok(code) => {
                self.source_code = code.clone();
                self.request.code = code;
                self.start_analysis();
            }
            Err(e) => self.set_error(format!(
                "Cannot read {}: {}",
                self.source_path.display(),
                e
            )),
        }
    }

    fn drain_results(&mut self) {
        while let Ok((seq, result)) = self.results_rx.try_recv() {
            self.apply_result(seq, result);
        }
    }

    /// Apply one analysis result.
    ///
    /// Results from any request but the newest are dropped. A failed request
    /// leaves the loaded trace in place.
    pub fn apply_result(&mut self, seq: u64, result: Result<Analysis, AnalyzeError>) {
        if seq != self.latest_seq {
            debug!("dropping stale result {} (latest {})", seq, self.latest_seq);
            return;
        }
        self.is_analyzing = false;

        match result {
            Ok(analysis) => {
                let steps = analysis.trace.len();
                self.player.load(analysis.trace);
                self.terminal_scroll = usize::MAX;
                if analysis.violations.is_empty() {
                    self.set_status(format!("Loaded {} steps", steps));
                } else {
                    self.set_status(format!(
                        "Loaded {} steps ({} repaired problems)",
                        steps,
                        analysis.violations.len()
                    ));
                }
            }
            Err(e) if e.is_superseded() => {
                debug!("{}", e.detailed());
            }
            Err(e) => {
                warn!("{}", e.detailed());
                self.set_error(e.detailed());
            }
        }
    }

    /// Scene for the current position
    pub fn scene(&self) -> Scene {
        project(&self.player.current_cumulative_state())
    }

    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();
        let snapshot = self.player.current_cumulative_state();
        let scene = project(&snapshot);
        let current_line = resolve_current_line(
            &self.source_code,
            snapshot.cursor.line,
            snapshot.cursor.code.as_deref(),
        );

        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_chunks[0]);

        // Left column: Source (top) | Terminal (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        // Right column: Variables | Stack | Heap
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Percentage(30),
                Constraint::Percentage(35),
                Constraint::Percentage(35),
            ])
            .split(columns[1]);

        render_source_pane(
            frame,
            left_rows[0],
            &self.source_code,
            self.request.language,
            current_line,
            scene.group(GroupKind::ControlFlow),
            self.focused_pane == FocusedPane::Source,
            &mut self.source_scroll,
        );

        render_terminal_pane(
            frame,
            left_rows[1],
            scene.group(GroupKind::Stdout),
            scene.group(GroupKind::Errors),
            self.focused_pane == FocusedPane::Terminal,
            &mut self.terminal_scroll,
        );

        for (area, kind, pane, scroll) in [
            (
                right_rows[0],
                GroupKind::Variables,
                FocusedPane::Variables,
                &mut self.variables_scroll,
            ),
            (
                right_rows[1],
                GroupKind::Stack,
                FocusedPane::Stack,
                &mut self.stack_scroll,
            ),
            (
                right_rows[2],
                GroupKind::Heap,
                FocusedPane::Heap,
                &mut self.heap_scroll,
            ),
        ] {
            render_group_pane(
                frame,
                area,
                kind,
                scene.group(kind),
                self.focused_pane == pane,
                scroll,
            );
        }

        render_status_bar(
            frame,
            main_chunks[1],
            &StatusRenderData {
                message: &self.status_message,
                state: self.player.state(),
                total_steps: self.player.len(),
                is_playing: self.player.is_playing(),
                is_analyzing: self.is_analyzing,
                is_error: self.status_is_error,
            },
        );
    }

    /// Handle keyboard events
    pub fn handle_key_event(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            // Number keys jump straight to a step
            KeyCode::Char(c @ '1'..='9') => {
                self.player.pause();
                let n = c.to_digit(10).map_or(1, |d| d as usize);
                match self.player.scrub_to(n - 1) {
                    Ok(()) => self.set_status(format!("Jumped to step {}", n)),
                    Err(e) => self.set_error(format!("Cannot jump: {}", e)),
                }
                self.terminal_scroll = usize::MAX;
            }
            KeyCode::Char('r') | KeyCode::Char('R') => {
                self.player.pause();
                self.reload();
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Left => {
                self.player.pause();
                self.step_backward();
            }
            KeyCode::Right => {
                self.player.pause();
                self.step_forward();
            }
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Source => {
                    // Scrolling up makes the current line move down visually
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_add(1));
                    }
                }
                FocusedPane::Variables => {
                    self.variables_scroll.offset = self.variables_scroll.offset.saturating_sub(1)
                }
                FocusedPane::Stack => {
                    self.stack_scroll.offset = self.stack_scroll.offset.saturating_sub(1)
                }
                FocusedPane::Heap => {
                    self.heap_scroll.offset = self.heap_scroll.offset.saturating_sub(1)
                }
                FocusedPane::Terminal => {
                    self.terminal_scroll = self.terminal_scroll.saturating_sub(1)
                }
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Source => {
                    if let Some(row) = self.source_scroll.target_line_row {
                        self.source_scroll.target_line_row = Some(row.saturating_sub(1));
                    }
                }
                FocusedPane::Variables => {
                    self.variables_scroll.offset = self.variables_scroll.offset.saturating_add(1)
                }
                FocusedPane::Stack => {
                    self.stack_scroll.offset = self.stack_scroll.offset.saturating_add(1)
                }
                FocusedPane::Heap => {
                    self.heap_scroll.offset = self.heap_scroll.offset.saturating_add(1)
                }
                FocusedPane::Terminal => {
                    self.terminal_scroll = self.terminal_scroll.saturating_add(1)
                }
            },
            KeyCode::Char(' ') => {
                // Toggle auto-play mode (with 200ms debounce to prevent key repeat spam)
                if self.last_space_press.elapsed() >= Duration::from_millis(200) {
                    self.last_space_press = Instant::now();
                    self.player.toggle_play();
                    if self.player.is_playing() {
                        // First step happens on the next loop iteration
                        self.last_play_time = Instant::now()
                            .checked_sub(self.playback.step_interval)
                            .unwrap_or_else(Instant::now);
                        self.set_status("Playing...");
                    } else if self.player.state() == PlayerState::Finished {
                        self.set_status("At the end; press ⌫ to rewind");
                    } else {
                        self.set_status("Paused");
                    }
                }
            }
            KeyCode::Enter => {
                self.player.jump_to_end();
                self.set_status("Jumped to end");
                self.terminal_scroll = usize::MAX;
            }
            KeyCode::Backspace => {
                self.player.pause();
                self.player.rewind();
                self.set_status("Jumped to start");
                self.terminal_scroll = usize::MAX;
            }
            _ => {}
        }
    }

    fn step_forward(&mut self) {
        match self.player.state() {
            PlayerState::Idle => self.set_error("Cannot step forward: no trace loaded"),
            PlayerState::Finished => self.set_status("Already at the end"),
            PlayerState::Ready(_) => {
                self.player.step_forward();
                self.set_status("Stepped forward");
                self.terminal_scroll = usize::MAX;
            }
        }
    }

    fn step_backward(&mut self) {
        match self.player.state() {
            PlayerState::Idle => self.set_error("Cannot step backward: no trace loaded"),
            PlayerState::Ready(0) => self.set_status("Already at the start"),
            _ => {
                self.player.step_backward();
                self.set_status("Stepped backward");
                self.terminal_scroll = usize::MAX;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Language;
    use crate::generator::{GenerateError, MockGenerator};
    use crate::trace::normalize::normalize;
    use crossterm::event::KeyModifiers;
    use serde_json::json;
    use std::sync::Arc;

    fn app() -> App {
        let analyzer = Analyzer::new(Arc::new(MockGenerator));
        let request = AnalyzeRequest::new(Language::JavaScript, "let x = 7;", "test");
        App::new(
            analyzer,
            request,
            PathBuf::from("test.js"),
            PlaybackConfig::default(),
            Handle::current(),
        )
    }

    fn analysis(seq: u64, steps: usize) -> Analysis {
        let steps: Vec<_> = (1..=steps).map(|i| json!({"line": i})).collect();
        Analysis {
            seq,
            trace: Arc::new(normalize(&json!({ "steps": steps }))),
            violations: Vec::new(),
        }
    }

    fn press(app: &mut App, code: KeyCode) {
        app.handle_key_event(KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[tokio::test]
    async fn test_stale_result_is_dropped() {
        let mut app = app();
        app.latest_seq = 2;
        app.apply_result(1, Ok(analysis(1, 3)));
        assert_eq!(app.player.state(), PlayerState::Idle);

        app.apply_result(2, Ok(analysis(2, 2)));
        assert_eq!(app.player.len(), 2);
        assert_eq!(app.status_message, "Loaded 2 steps");
    }

    #[tokio::test]
    async fn test_failed_request_keeps_trace() {
        let mut app = app();
        app.latest_seq = 1;
        app.apply_result(1, Ok(analysis(1, 3)));
        app.latest_seq = 2;
        let err = AnalyzeError::from(GenerateError::Api {
            status: 503,
            body: "unavailable".to_string(),
        });
        app.apply_result(2, Err(err));
        assert_eq!(app.player.len(), 3);
        assert!(app.status_is_error);
        assert!(!app.is_analyzing);
    }

    #[tokio::test]
    async fn test_navigation_keys() {
        let mut app = app();
        app.latest_seq = 1;
        app.apply_result(1, Ok(analysis(1, 3)));

        press(&mut app, KeyCode::Right);
        assert_eq!(app.player.state(), PlayerState::Ready(1));
        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.player.state(), PlayerState::Ready(2));
        press(&mut app, KeyCode::Char('9'));
        assert_eq!(app.player.state(), PlayerState::Ready(2));
        assert!(app.status_is_error);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.player.state(), PlayerState::Finished);
        press(&mut app, KeyCode::Left);
        assert_eq!(app.player.state(), PlayerState::Ready(2));
        press(&mut app, KeyCode::Backspace);
        assert_eq!(app.player.state(), PlayerState::Ready(0));
        press(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[tokio::test]
    async fn test_background_analysis_delivers_result() {
        let mut app = app();
        app.start_analysis();
        assert_eq!(app.latest_seq, 1);
        assert!(app.is_analyzing);

        let (seq, result) = app.results_rx.recv().await.unwrap();
        app.apply_result(seq, result);
        assert_eq!(app.player.len(), 1);
        assert_eq!(
            app.scene().group(GroupKind::ControlFlow)[0].value,
            "let x = 7;"
        );
    }

    #[test]
    fn test_focus_cycle() {
        let mut pane = FocusedPane::Source;
        for _ in 0..5 {
            pane = pane.next();
        }
        assert_eq!(pane, FocusedPane::Source);
    }
}

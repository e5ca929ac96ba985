//! Main TUI application state and logic

use crate::simulation::Simulation;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    Frame, Terminal,
    backend::Backend,
    layout::{Constraint, Direction, Layout},
};
use std::io;
use std::time::{Duration, Instant};

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Stack,
    Memory,
    Console,
}

impl FocusedPane {
    /// Move focus to the next pane (stack -> memory -> console)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Stack => FocusedPane::Memory,
            FocusedPane::Memory => FocusedPane::Console,
            FocusedPane::Console => FocusedPane::Stack,
        }
    }
}

/// The main application state
pub struct App {
    pub sim: Simulation,

    pub focused_pane: FocusedPane,

    /// Per-pane scroll offsets
    pub stack_scroll: usize,
    pub memory_scroll: usize,
    pub terminal_scroll: usize,

    /// Line being typed for cin; `Some` while in input mode
    pub input: Option<String>,

    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,

    /// Whether auto-play mode is active
    pub is_playing: bool,

    /// Last time a step was taken in play mode
    pub last_play_time: Instant,
}

impl App {
    pub fn new(sim: Simulation) -> Self {
        App {
            sim,
            focused_pane: FocusedPane::Stack,
            stack_scroll: 0,
            memory_scroll: 0,
            terminal_scroll: usize::MAX,
            input: None,
            should_quit: false,
            status_message: String::from("Ready!"),
            is_playing: false,
            last_play_time: Instant::now(),
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            if self.is_playing && self.last_play_time.elapsed() >= Duration::from_millis(400) {
                self.step_forward(1);
                if self.sim.at_end() || self.sim.is_blocking_until_cin() {
                    self.is_playing = false;
                }
                self.last_play_time = Instant::now();
            }

            // Use poll with timeout to allow auto-play to work
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

    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        // Left column: Stack | Right column: Memory (top) and Console (bottom)
        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(main_chunks[0]);
        let right_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(columns[1]);

        super::panes::render_stack_pane(
            frame,
            columns[0],
            &self.sim,
            self.focused_pane == FocusedPane::Stack,
            &mut self.stack_scroll,
        );
        super::panes::render_memory_pane(
            frame,
            right_rows[0],
            &self.sim,
            self.focused_pane == FocusedPane::Memory,
            &mut self.memory_scroll,
        );
        super::panes::render_terminal_pane(
            frame,
            right_rows[1],
            &self.sim,
            self.input.as_deref(),
            self.focused_pane == FocusedPane::Console,
            &mut self.terminal_scroll,
        );
        super::panes::render_status_bar(
            frame,
            main_chunks[1],
            super::panes::StatusRenderData {
                message: &self.status_message,
                steps_taken: self.sim.steps_taken(),
                ub_count: self.sim.total_ub(),
                leaked: self.sim.leaked_objects().len(),
                at_end: self.sim.at_end(),
                is_playing: self.is_playing,
                is_input: self.input.is_some(),
            },
        );
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        if let Some(input) = self.input.as_mut() {
            match key.code {
                KeyCode::Enter => {
                    let mut line = self.input.take().unwrap_or_default();
                    line.push('\n');
                    self.sim.cin_input(&line);
                    self.status_message = "Input sent to cin".to_string();
                }
                KeyCode::Esc => {
                    self.input = None;
                    self.status_message = "Input cancelled".to_string();
                }
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Char(c) => input.push(c),
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            // Number keys step forward N times directly
            KeyCode::Char(c @ '1'..='9') => {
                self.is_playing = false;
                let n = c.to_digit(10).map_or(1, |d| d as usize);
                self.step_forward(n);
            }
            KeyCode::Char('i') => {
                self.is_playing = false;
                self.input = Some(String::new());
                self.status_message = "Type a line for cin, Enter to send".to_string();
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::Left => {
                self.is_playing = false;
                self.step_backward(1);
            }
            KeyCode::Right => {
                self.is_playing = false;
                self.step_forward(1);
            }
            KeyCode::Up => {
                let scroll = self.focused_scroll();
                *scroll = scroll.saturating_sub(1);
            }
            KeyCode::Down => {
                let scroll = self.focused_scroll();
                *scroll = scroll.saturating_add(1);
            }
            KeyCode::Char(' ') => {
                self.is_playing = !self.is_playing;
                self.status_message = if self.is_playing { "Playing..." } else { "Paused" }.to_string();
            }
            KeyCode::Enter => {
                self.is_playing = false;
                self.sim.step_to_end();
                self.terminal_scroll = usize::MAX;
                self.status_message = self.position_message("Ran to end");
            }
            KeyCode::Backspace => {
                self.is_playing = false;
                self.sim.reset();
                self.terminal_scroll = usize::MAX;
                self.status_message = "Jumped to start".to_string();
            }
            _ => {}
        }
    }

    fn focused_scroll(&mut self) -> &mut usize {
        match self.focused_pane {
            FocusedPane::Stack => &mut self.stack_scroll,
            FocusedPane::Memory => &mut self.memory_scroll,
            FocusedPane::Console => &mut self.terminal_scroll,
        }
    }

    fn position_message(&self, done: &str) -> String {
        if self.sim.is_blocking_until_cin() {
            "Waiting for cin (press i)".to_string()
        } else if self.sim.at_end() {
            match self.sim.main_return_value() {
                Some(code) => format!("Finished, main returned {}", code),
                None => "Finished".to_string(),
            }
        } else {
            done.to_string()
        }
    }

    fn step_forward(&mut self, n: usize) {
        let before = self.sim.steps_taken();
        self.sim.step_forward(n);
        let stepped = self.sim.steps_taken() - before;
        self.terminal_scroll = usize::MAX;
        self.status_message = self.position_message(&format!("Stepped forward {} step(s)", stepped));
    }

    fn step_backward(&mut self, n: usize) {
        if self.sim.steps_taken() == 0 {
            self.status_message = "Cannot step backward: at start".to_string();
            return;
        }
        self.sim.step_backward(n);
        self.terminal_scroll = usize::MAX;
        self.status_message = "Stepped backward".to_string();
    }
}

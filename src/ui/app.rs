//! Main TUI application state and logic

use crate::inspect::formatter::IntMode;
use crate::inspect::{LoadCoordinator, LoadEvent, LoadRequest, NodeRef, PanelId, ValueOverride, WatchExpr, Workspace};
use crate::remote::EvalScope;
use crate::ui::panes::{self, OpenSet, Row, StatusRenderData, VariablesRenderData, VariablesScrollState};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Constraint, Direction, Layout},
    Frame, Terminal,
};
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which pane is currently focused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusedPane {
    Locals,
    Globals,
    Output,
}

impl FocusedPane {
    /// Move focus to the next pane (locals -> globals -> output)
    pub fn next(self) -> Self {
        match self {
            FocusedPane::Locals => FocusedPane::Globals,
            FocusedPane::Globals => FocusedPane::Output,
            FocusedPane::Output => FocusedPane::Locals,
        }
    }

    /// Move focus to the previous pane
    pub fn prev(self) -> Self {
        match self {
            FocusedPane::Locals => FocusedPane::Output,
            FocusedPane::Globals => FocusedPane::Locals,
            FocusedPane::Output => FocusedPane::Globals,
        }
    }
}

/// The main application state
pub struct App {
    coordinator: LoadCoordinator,
    events: Receiver<LoadEvent>,

    /// Function name of each recorded frame, innermost first
    frames: Vec<String>,

    /// Currently focused pane
    pub focused_pane: FocusedPane,

    /// Nodes the user expanded
    open: OpenSet,

    /// Per-pane scroll state
    locals_state: VariablesScrollState,
    globals_state: VariablesScrollState,
    output_scroll: usize,

    /// Show addresses before names
    pub show_addr: bool,

    /// Show package-qualified type names
    pub full_types: bool,

    /// Watch expression being typed, if any
    input: Option<String>,

    /// Whether the app should quit
    pub should_quit: bool,

    /// Status message to display
    pub status_message: String,
}

impl App {
    /// Create a new app. `frames` names the function of each frame the
    /// service can evaluate in.
    pub fn new(coordinator: LoadCoordinator, events: Receiver<LoadEvent>, frames: Vec<String>) -> Self {
        App {
            coordinator,
            events,
            frames,
            focused_pane: FocusedPane::Locals,
            open: OpenSet::default(),
            locals_state: VariablesScrollState::default(),
            globals_state: VariablesScrollState::default(),
            output_scroll: 0,
            show_addr: false,
            full_types: false,
            input: None,
            should_quit: false,
            status_message: String::from("Ready!"),
        }
    }

    /// Run the TUI application
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<()> {
        loop {
            self.drain_events();
            self.autoload();

            terminal.draw(|f| self.render(f))?;

            if self.should_quit {
                break;
            }

            // Poll with a timeout so finished loads are picked up without input
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

    fn workspace(&self) -> MutexGuard<'_, Workspace> {
        lock(self.coordinator.workspace())
    }

    /// Panels shown in the pane, in display order
    fn panels(ws: &Workspace, pane: FocusedPane) -> Vec<PanelId> {
        match pane {
            FocusedPane::Locals => ws
                .watches()
                .iter()
                .map(|w| PanelId::Watch(w.id()))
                .chain(std::iter::once(PanelId::Locals))
                .collect(),
            FocusedPane::Globals => vec![PanelId::Globals],
            FocusedPane::Output => Vec::new(),
        }
    }

    fn rows(&self, pane: FocusedPane) -> Vec<Row> {
        let ws = self.workspace();
        panes::collect_rows(&ws, &Self::panels(&ws, pane), &self.open)
    }

    fn selected_row(&self) -> Option<Row> {
        let selected = match self.focused_pane {
            FocusedPane::Locals => self.locals_state.selected,
            FocusedPane::Globals => self.globals_state.selected,
            FocusedPane::Output => return None,
        };
        self.rows(self.focused_pane).get(selected).copied()
    }

    /// Apply finished background loads
    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            debug!(?event, "load event");
            match event {
                LoadEvent::Failed(_, e) => {
                    self.status_message = format!("Error: {}", e);
                    self.output_scroll = usize::MAX;
                }
                LoadEvent::WatchReloaded(_) => self.output_scroll = usize::MAX,
                LoadEvent::Merged(_) | LoadEvent::Stale(_) => {}
            }
        }
    }

    /// Start at most one automatic load across all visible panels
    fn autoload(&mut self) {
        let targets: Vec<(PanelId, u64)> = {
            let ws = self.workspace();
            let mut panels = Self::panels(&ws, FocusedPane::Locals);
            panels.push(PanelId::Globals);
            panels
                .into_iter()
                .filter_map(|p| ws.tree(p).map(|t| (p, t.generation())))
                .collect()
        };
        for (panel, generation) in targets {
            let open = &self.open;
            let request = self.coordinator.autoload(panel, |node| {
                open.contains(&NodeRef {
                    panel,
                    generation,
                    node,
                })
            });
            if !matches!(request, LoadRequest::NothingToLoad) {
                break;
            }
        }
    }

    /// Render the UI
    fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        let main_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(1)])
            .split(size);

        let columns = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
            .split(main_chunks[0]);

        // Left column: Locals and watches (top) | Output (bottom)
        let left_rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(70), Constraint::Percentage(30)])
            .split(columns[0]);

        let is_loading = self.coordinator.is_loading();
        let ws = lock(self.coordinator.workspace());
        let scope = ws.scope();

        let locals_rows = panes::collect_rows(&ws, &Self::panels(&ws, FocusedPane::Locals), &self.open);
        panes::render_variables_pane(
            frame,
            left_rows[0],
            VariablesRenderData {
                title: "Locals",
                workspace: &ws,
                rows: &locals_rows,
                open: &self.open,
                show_addr: self.show_addr,
                full_types: self.full_types,
            },
            self.focused_pane == FocusedPane::Locals,
            &mut self.locals_state,
        );

        let globals_rows = panes::collect_rows(&ws, &[PanelId::Globals], &self.open);
        panes::render_variables_pane(
            frame,
            columns[1],
            VariablesRenderData {
                title: "Globals",
                workspace: &ws,
                rows: &globals_rows,
                open: &self.open,
                show_addr: self.show_addr,
                full_types: self.full_types,
            },
            self.focused_pane == FocusedPane::Globals,
            &mut self.globals_state,
        );

        panes::render_output_pane(
            frame,
            left_rows[1],
            ws.scrollback(),
            self.focused_pane == FocusedPane::Output,
            &mut self.output_scroll,
        );
        drop(ws);

        let message = match &self.input {
            Some(text) => format!("watch: {}_", text),
            None => self.status_message.clone(),
        };
        panes::render_status_bar(
            frame,
            main_chunks[1],
            StatusRenderData {
                message: &message,
                function: usize::try_from(scope.frame)
                    .ok()
                    .and_then(|i| self.frames.get(i))
                    .map(String::as_str),
                frame: scope.frame,
                frame_count: self.frames.len(),
                is_loading,
            },
        );
    }

    /// Handle keyboard events
    fn handle_key_event(&mut self, key: KeyEvent) {
        if self.input.is_some() {
            self.handle_input_key(key);
            return;
        }
        match key.code {
            KeyCode::Char('q') | KeyCode::Char('Q') => {
                self.should_quit = true;
            }
            KeyCode::Tab => {
                self.focused_pane = self.focused_pane.next();
            }
            KeyCode::BackTab => {
                self.focused_pane = self.focused_pane.prev();
            }
            KeyCode::Up => match self.focused_pane {
                FocusedPane::Locals => {
                    self.locals_state.selected = self.locals_state.selected.saturating_sub(1)
                }
                FocusedPane::Globals => {
                    self.globals_state.selected = self.globals_state.selected.saturating_sub(1)
                }
                FocusedPane::Output => self.output_scroll = self.output_scroll.saturating_sub(1),
            },
            KeyCode::Down => match self.focused_pane {
                FocusedPane::Locals => {
                    self.locals_state.selected = self.locals_state.selected.saturating_add(1)
                }
                FocusedPane::Globals => {
                    self.globals_state.selected = self.globals_state.selected.saturating_add(1)
                }
                FocusedPane::Output => self.output_scroll = self.output_scroll.saturating_add(1),
            },
            KeyCode::Enter | KeyCode::Right => self.expand(key.code == KeyCode::Enter),
            KeyCode::Left => {
                if let Some(Row::Node { target, .. }) = self.selected_row() {
                    self.open.remove(&target);
                }
            }
            KeyCode::Char('m') => {
                if let Some(target) = self.selected_row().and_then(|r| r.target()) {
                    self.load_more(target);
                }
            }
            KeyCode::Char('x') => self.set_int_mode(IntMode::Hex),
            KeyCode::Char('o') => self.set_int_mode(IntMode::Oct),
            KeyCode::Char('d') => self.set_int_mode(IntMode::Dec),
            KeyCode::Char('w') => self.watch_selected(),
            KeyCode::Char('n') => {
                self.input = Some(String::new());
            }
            KeyCode::Char('t') => self.toggle_traced(),
            KeyCode::Char('p') => {
                if let Some(id) = self.selected_watch() {
                    self.workspace().toggle_pin(id);
                    self.coordinator.reload_watch(id);
                }
            }
            KeyCode::Delete => {
                if let Some(id) = self.selected_watch() {
                    self.workspace().remove_watch(id);
                    self.status_message = "Watch removed".to_string();
                }
            }
            KeyCode::Char('a') => self.show_addr = !self.show_addr,
            KeyCode::Char('f') => self.full_types = !self.full_types,
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('[') => self.switch_frame(-1),
            KeyCode::Char(']') => self.switch_frame(1),
            _ => {}
        }
    }

    fn handle_input_key(&mut self, key: KeyEvent) {
        let Some(text) = self.input.as_mut() else {
            return;
        };
        match key.code {
            KeyCode::Esc => self.input = None,
            KeyCode::Backspace => {
                text.pop();
            }
            KeyCode::Char(c) => text.push(c),
            KeyCode::Enter => {
                let expr = text.trim().to_string();
                self.input = None;
                if expr.is_empty() {
                    return;
                }
                self.add_watch(expr);
            }
            _ => {}
        }
    }

    fn add_watch(&mut self, expr: String) {
        let id = self.workspace().add_watch(WatchExpr::new(expr.as_str()));
        self.coordinator.reload_watch(id);
        self.status_message = format!("Watching {}", expr);
    }

    /// Watch the expression of the selected node
    fn watch_selected(&mut self) {
        let Some(Row::Node { target, .. }) = self.selected_row() else {
            return;
        };
        let expr = self
            .workspace()
            .tree(target.panel)
            .and_then(|t| t.get(target.node))
            .map(|n| n.expression.clone())
            .unwrap_or_default();
        if expr.is_empty() {
            self.status_message = "Selected value has no expression".to_string();
        } else {
            self.add_watch(expr);
        }
    }

    /// Open (or, for Enter, toggle) the selected node; on a "more" row, load
    /// the next chunk
    fn expand(&mut self, toggle: bool) {
        match self.selected_row() {
            Some(Row::Node { target, .. }) => {
                if !self.open.insert(target) && toggle {
                    self.open.remove(&target);
                }
            }
            Some(Row::More { target, .. }) => self.load_more(target),
            _ => {}
        }
    }

    fn load_more(&mut self, target: NodeRef) {
        match self.coordinator.load_more(target) {
            LoadRequest::Issued(_) => self.status_message = "Loading...".to_string(),
            LoadRequest::InFlight => {
                self.status_message = "Another load is in progress".to_string()
            }
            LoadRequest::NothingToLoad => {}
        }
    }

    fn set_int_mode(&mut self, mode: IntMode) {
        let Some(Row::Node { target, .. }) = self.selected_row() else {
            return;
        };
        let result = self
            .workspace()
            .install_override(target.panel, target.node, ValueOverride::Int(mode));
        if let Err(e) = result {
            self.status_message = format!("Error: {}", e);
        }
    }

    /// The watch whose root row is selected
    fn selected_watch(&self) -> Option<u64> {
        match self.selected_row()? {
            Row::Node {
                target:
                    NodeRef {
                        panel: PanelId::Watch(id),
                        ..
                    },
                depth: 0,
            } => Some(id),
            _ => None,
        }
    }

    fn toggle_traced(&mut self) {
        let Some(id) = self.selected_watch() else {
            return;
        };
        let mut ws = self.workspace();
        let traced = ws.watch(id).is_some_and(|w| !w.spec.traced);
        ws.set_traced(id, traced);
        drop(ws);
        self.status_message = if traced { "Tracing watch" } else { "Stopped tracing watch" }.to_string();
    }

    /// Rebuild every panel at the current scope
    fn refresh(&mut self) {
        let service = self.coordinator.service().clone();
        let result = self.workspace().refresh_all(service.as_ref());
        // old generations are unreachable after a refresh
        self.open.clear();
        self.output_scroll = usize::MAX;
        self.status_message = match result {
            Ok(()) => "Refreshed".to_string(),
            Err(e) => format!("Error: {}", e),
        };
    }

    fn switch_frame(&mut self, delta: i32) {
        let scope = self.workspace().scope();
        let frame = scope.frame + delta;
        if frame < 0 || frame as usize >= self.frames.len() {
            return;
        }
        self.workspace().set_scope(EvalScope { frame, ..scope });
        self.locals_state = VariablesScrollState::default();
        self.refresh();
    }
}

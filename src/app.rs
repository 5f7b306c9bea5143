use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use log::{info, warn};
use std::rc::Rc;

use crate::activity::Activity;
use crate::config::Config;
use crate::content::ContentSource;
use crate::error::MediatorError;
use crate::location::Location;
use crate::mediator::{ActivityMediator, MediatorEvent, Outcome};
use crate::observable::Subscription;
use crate::runtime::{HandTermEvent, KeyTrigger};
use crate::store::{Store, TreeItem};
use crate::timing::{slowest_characters, time_code, CharSpeed, Clock, TimingEngine};

const HISTORY_LIMIT: usize = 200;

/// What the event loop should do after an event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    Redraw,
    Quit,
}

/// Editor sub-mode while in [`Activity::Edit`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditMode {
    #[default]
    Insert,
    /// Typing a `:` command.
    Command,
}

/// The typing console: input line, keystroke timing and the activity mediator.
///
/// Holds no terminal state, so it runs the same under the TUI and in tests.
pub struct HandTerm {
    engine: TimingEngine,
    mediator: ActivityMediator,
    trigger: KeyTrigger,
    slowest_count: usize,
    input: String,
    history: Vec<String>,
    last_wpm: Option<f64>,
    slowest: Vec<CharSpeed>,
    last_error: Option<MediatorError>,
    editor: String,
    edit_mode: EditMode,
    edit_command: String,
    tree_cursor: usize,
    _activity_log: Subscription<Activity>,
}

impl HandTerm {
    pub fn new(
        config: &Config,
        location: &Location,
        store: Rc<dyn Store>,
        content: Box<dyn ContentSource>,
    ) -> Self {
        let engine = TimingEngine::new(Rc::clone(&store));
        let mediator = ActivityMediator::new(location, store, content);
        let activity_log = mediator.subscribe(|activity| info!("activity: {activity}"));

        let mut app = Self {
            engine,
            mediator,
            trigger: KeyTrigger::default(),
            slowest_count: config.slowest_count,
            input: String::new(),
            history: Vec::new(),
            last_wpm: None,
            slowest: Vec::new(),
            last_error: None,
            editor: String::new(),
            edit_mode: EditMode::default(),
            edit_command: String::new(),
            tree_cursor: 0,
            _activity_log: activity_log,
        };
        app.sync_activity(None);
        app
    }

    /// Time keystrokes with `clock` instead of the system clock.
    pub fn with_clock(mut self, store: Rc<dyn Store>, clock: Box<dyn Clock>) -> Self {
        self.engine = TimingEngine::with_clock(store, clock);
        self
    }

    pub fn with_trigger(mut self, trigger: KeyTrigger) -> Self {
        self.trigger = trigger;
        self
    }

    pub fn on_event(&mut self, event: HandTermEvent) -> Control {
        match event {
            HandTermEvent::Key(key) => self.on_key(key),
            HandTermEvent::Paste(text) => {
                self.paste(&text);
                Control::Redraw
            }
            HandTermEvent::Resize => Control::Redraw,
            HandTermEvent::Tick => Control::Continue,
        }
    }

    pub fn on_key(&mut self, key: KeyEvent) -> Control {
        if !self.trigger.accepts(&key) {
            return Control::Continue;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Control::Quit;
        }

        match self.activity() {
            Activity::Edit => self.on_edit_key(key),
            Activity::Tree => self.on_tree_key(key),
            Activity::Normal | Activity::Tutorial | Activity::Game => match key.code {
                KeyCode::Esc => return Control::Quit,
                KeyCode::Char(c) => self.type_char(c),
                KeyCode::Backspace => self.backspace(),
                KeyCode::Enter => {
                    let _ = self.submit();
                }
                _ => return Control::Continue,
            },
        }
        Control::Redraw
    }

    /// Append to the input line and time the keystroke.
    pub fn type_char(&mut self, c: char) {
        self.input.push(c);
        self.engine.add_keystroke(&c.to_string());
    }

    /// Same as [`type_char`](Self::type_char) with an explicit release time.
    pub fn type_char_at(&mut self, c: char, timestamp_ms: f64) {
        self.input.push(c);
        self.engine.add_keystroke_at(&c.to_string(), timestamp_ms);
    }

    pub fn backspace(&mut self) {
        self.input.pop();
    }

    /// Pasted text is not timed.
    pub fn paste(&mut self, text: &str) {
        match (self.activity(), self.edit_mode) {
            (Activity::Edit, EditMode::Insert) => self.editor.push_str(text),
            (Activity::Edit, EditMode::Command) => self.edit_command.push_str(text),
            (Activity::Tree, _) => {}
            _ => self.input.push_str(text),
        }
    }

    /// Submit the input line: save the phrase timing, clear the buffer and let the
    /// mediator classify the command.
    pub fn submit(&mut self) -> Result<Outcome, MediatorError> {
        let line = std::mem::take(&mut self.input);

        if !self.engine.is_empty() {
            let summary = self.engine.wpms();
            self.slowest = slowest_characters(&summary.char_wpms, self.slowest_count);
            self.last_wpm = Some(self.engine.save_keystrokes(&time_code()));
        }
        self.engine.clear_keystrokes();

        self.history.push(line.clone());
        if self.history.len() > HISTORY_LIMIT {
            self.history.remove(0);
        }

        self.dispatch(MediatorEvent::command(&line))
    }

    fn dispatch(&mut self, event: MediatorEvent) -> Result<Outcome, MediatorError> {
        let before = self.activity();
        let result = self.mediator.handle(event);
        for deferred in self.mediator.process_pending() {
            if let Err(err) = deferred {
                warn!("{err}");
            }
        }

        match &result {
            Ok(_) => self.last_error = None,
            Err(err) => {
                warn!("{err}");
                self.last_error = Some(err.clone());
            }
        }
        self.sync_activity(Some(before));
        result
    }

    fn sync_activity(&mut self, before: Option<Activity>) {
        let now = self.activity();
        if before == Some(now) {
            return;
        }
        match now {
            Activity::Edit => {
                self.editor = self.mediator.edit_content().unwrap_or_default().to_string();
                self.edit_mode = EditMode::Insert;
                self.edit_command.clear();
            }
            Activity::Tree => self.tree_cursor = 0,
            _ => {}
        }
    }

    fn on_edit_key(&mut self, key: KeyEvent) {
        match self.edit_mode {
            EditMode::Insert => match key.code {
                KeyCode::Esc => {
                    self.edit_mode = EditMode::Command;
                    self.edit_command.clear();
                }
                KeyCode::Char(c) => self.editor.push(c),
                KeyCode::Enter => self.editor.push('\n'),
                KeyCode::Tab => self.editor.push('\t'),
                KeyCode::Backspace => {
                    self.editor.pop();
                }
                _ => {}
            },
            EditMode::Command => match key.code {
                KeyCode::Esc => self.edit_mode = EditMode::Insert,
                KeyCode::Char(c) => self.edit_command.push(c),
                KeyCode::Backspace => {
                    self.edit_command.pop();
                }
                KeyCode::Enter => {
                    let command = std::mem::take(&mut self.edit_command);
                    let _ = self.editor_command(&command);
                }
                _ => {}
            },
        }
    }

    /// Run `:w`, `:q`, `:q!` or `:wq` against the editor buffer.
    pub fn editor_command(&mut self, command: &str) -> Result<Outcome, MediatorError> {
        let event = MediatorEvent::EditorCommand {
            command: command.to_string(),
            content: Some(self.editor.clone()),
        };
        let result = self.dispatch(event);
        if self.activity() == Activity::Edit {
            self.edit_mode = EditMode::Insert;
        }
        result
    }

    fn on_tree_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up | KeyCode::Char('k') => self.move_tree_cursor(-1),
            KeyCode::Down | KeyCode::Char('j') => self.move_tree_cursor(1),
            KeyCode::Enter => {
                let _ = self.select_tree_item();
            }
            KeyCode::Esc | KeyCode::Char('q') => {
                let _ = self.dispatch(MediatorEvent::CloseTree);
            }
            _ => {}
        }
    }

    pub fn move_tree_cursor(&mut self, delta: isize) {
        let len = self.mediator.tree().get().len();
        if len == 0 {
            return;
        }
        self.tree_cursor = self.tree_cursor.saturating_add_signed(delta).min(len - 1);
    }

    pub fn select_tree_item(&mut self) -> Result<Outcome, MediatorError> {
        let Some(item) = self.mediator.tree().get().get(self.tree_cursor).cloned() else {
            return Ok(Outcome::Ignored);
        };
        let result = self.dispatch(MediatorEvent::TreeItemSelected(item));
        self.tree_cursor = 0;
        result
    }

    pub fn activity(&self) -> Activity {
        self.mediator.current()
    }

    pub fn mediator(&self) -> &ActivityMediator {
        &self.mediator
    }

    pub fn engine(&self) -> &TimingEngine {
        &self.engine
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    /// The phrase the user is expected to type, if any
    pub fn target_prompt(&self) -> Option<String> {
        match self.activity() {
            Activity::Tutorial => self.mediator.tutorial().get().map(|p| p.prompt()),
            Activity::Game => self.mediator.game().get().map(|p| p.prompt()),
            _ => None,
        }
    }

    pub fn last_wpm(&self) -> Option<f64> {
        self.last_wpm
    }

    pub fn slowest(&self) -> &[CharSpeed] {
        &self.slowest
    }

    pub fn last_error(&self) -> Option<&MediatorError> {
        self.last_error.as_ref()
    }

    pub fn editor(&self) -> &str {
        &self.editor
    }

    pub fn edit_mode(&self) -> EditMode {
        self.edit_mode
    }

    pub fn edit_command(&self) -> &str {
        &self.edit_command
    }

    pub fn tree_items(&self) -> Vec<TreeItem> {
        self.mediator.tree().get()
    }

    pub fn tree_cursor(&self) -> usize {
        self.tree_cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Catalog, GamePhrase};
    use crate::progress::COMPLETED_TUTORIALS_KEY;
    use crate::store::MemoryStore;
    use crate::timing::ManualClock;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn catalog() -> Catalog {
        Catalog::new(
            vec![
                GamePhrase::tutorial("fd", Some("home")),
                GamePhrase::tutorial("jk", Some("home")),
            ],
            vec![GamePhrase::game("fjdk", Some("home"))],
        )
    }

    fn app_at(path: &str) -> (HandTerm, MemoryStore, ManualClock) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0.0);
        let shared: Rc<dyn Store> = Rc::new(store.clone());
        let app = HandTerm::new(
            &Config::default(),
            &Location::parse(path),
            Rc::clone(&shared),
            Box::new(catalog()),
        )
        .with_clock(shared, Box::new(clock.clone()));
        (app, store, clock)
    }

    fn type_timed(app: &mut HandTerm, clock: &ManualClock, text: &str, step_ms: f64) {
        for c in text.chars() {
            app.type_char(c);
            clock.advance(step_ms);
        }
    }

    fn key(code: KeyCode, kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn test_submit_saves_timing_and_advances_tutorial() {
        let (mut app, store, clock) = app_at("");
        assert_eq!(app.target_prompt().as_deref(), Some("fd"));

        type_timed(&mut app, &clock, "fd", 600.0);
        let outcome = app.submit().unwrap();

        assert_matches::assert_matches!(outcome, Outcome::Applied(_));
        assert_eq!(app.last_wpm(), Some(20.0));
        assert_eq!(app.input(), "");
        assert!(app.engine().is_empty());
        assert_eq!(store.log_count(), 1);
        assert_eq!(app.target_prompt().as_deref(), Some("jk"));
        assert_eq!(app.slowest().len(), 1);
        assert_eq!(app.slowest()[0].character, "d");
    }

    #[test]
    fn test_group_completion_starts_game_then_normal() {
        let (mut app, _, clock) = app_at("");
        type_timed(&mut app, &clock, "fd", 100.0);
        app.submit().unwrap();
        type_timed(&mut app, &clock, "jk", 100.0);
        app.submit().unwrap();
        assert_eq!(app.activity(), Activity::Game);
        assert_eq!(app.target_prompt().as_deref(), Some("fjdk"));

        type_timed(&mut app, &clock, "fjdk", 100.0);
        app.submit().unwrap();
        assert_eq!(app.activity(), Activity::Normal);
        assert_eq!(app.target_prompt(), None);
    }

    #[test]
    fn test_persistence_error_is_kept_for_display() {
        let (mut app, store, clock) = app_at("");
        store.fail_writes(true);
        type_timed(&mut app, &clock, "fd", 100.0);

        assert!(app.submit().is_err());
        assert_eq!(app.activity(), Activity::Tutorial);
        assert!(app.last_error().is_some());
        assert!(store.file(COMPLETED_TUTORIALS_KEY).is_none());

        store.fail_writes(false);
        app.paste("fd");
        app.submit().unwrap();
        assert!(app.last_error().is_none());
        assert_eq!(app.last_wpm(), Some(120.0));
    }

    #[test]
    fn test_backspace_edits_line_but_keeps_timing() {
        let (mut app, _, clock) = app_at("/normal");
        type_timed(&mut app, &clock, "ab", 100.0);
        app.backspace();
        assert_eq!(app.input(), "a");
        assert_eq!(app.engine().len(), 2);
    }

    #[test]
    fn test_release_trigger_ignores_presses() {
        let (app, _, _) = app_at("/normal");
        let mut app = app.with_trigger(KeyTrigger::Release);

        assert_eq!(
            app.on_key(key(KeyCode::Char('x'), KeyEventKind::Press)),
            Control::Continue
        );
        assert_eq!(
            app.on_key(key(KeyCode::Char('x'), KeyEventKind::Release)),
            Control::Redraw
        );
        assert_eq!(app.input(), "x");
        assert_eq!(
            app.on_key(key(KeyCode::Esc, KeyEventKind::Release)),
            Control::Quit
        );
    }

    #[test]
    fn test_editor_flow() {
        let (mut app, store, _) = app_at("/normal");
        app.paste("edit notes.md");
        app.submit().unwrap();
        assert_eq!(app.activity(), Activity::Edit);

        for c in "hi".chars() {
            app.on_key(key(KeyCode::Char(c), KeyEventKind::Press));
        }
        app.on_key(key(KeyCode::Esc, KeyEventKind::Press));
        assert_eq!(app.edit_mode(), EditMode::Command);
        for c in ":w".chars() {
            app.on_key(key(KeyCode::Char(c), KeyEventKind::Press));
        }
        app.on_key(key(KeyCode::Enter, KeyEventKind::Press));

        assert_eq!(store.file("notes.md").as_deref(), Some("hi"));
        assert_eq!(app.activity(), Activity::Edit);
        assert_eq!(app.edit_mode(), EditMode::Insert);

        app.editor_command(":q").unwrap();
        assert_eq!(app.activity(), Activity::Normal);
    }

    #[test]
    fn test_edit_loads_existing_content() {
        let (mut app, store, _) = app_at("/normal");
        store.put_file("a.txt", "old");
        app.paste("edit a.txt");
        app.submit().unwrap();
        assert_eq!(app.editor(), "old");
    }

    #[test]
    fn test_tree_navigation() {
        let (mut app, store, _) = app_at("/normal");
        store.put_file("docs/a.md", "a");
        store.put_file("docs/b.md", "b");
        app.paste("tree docs");
        app.submit().unwrap();
        assert_eq!(app.activity(), Activity::Tree);
        assert_eq!(app.tree_items().len(), 2);

        app.move_tree_cursor(5);
        assert_eq!(app.tree_cursor(), 1);
        app.move_tree_cursor(-3);
        assert_eq!(app.tree_cursor(), 0);
        app.move_tree_cursor(1);

        app.select_tree_item().unwrap();
        assert_eq!(app.activity(), Activity::Normal);
        assert_eq!(
            app.mediator().selected_item().map(|i| i.path.as_str()),
            Some("docs/b.md")
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let (mut app, _, _) = app_at("/normal");
        for i in 0..(HISTORY_LIMIT + 5) {
            app.paste(&i.to_string());
            app.submit().unwrap();
        }
        assert_eq!(app.history().len(), HISTORY_LIMIT);
        assert_eq!(app.history()[0], "5");
    }
}

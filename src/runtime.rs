use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyEvent, KeyEventKind};

/// Unified event type consumed by the app runner
#[derive(Clone, Debug)]
pub enum HandTermEvent {
    Key(KeyEvent),
    Paste(String),
    Resize,
    Tick,
}

/// Source of terminal events (keyboard, resize, etc.)
pub trait EventSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> Result<HandTermEvent, RecvTimeoutError>;
}

/// Production event source using crossterm
pub struct CrosstermEventSource {
    rx: Receiver<HandTermEvent>,
}

impl CrosstermEventSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || loop {
            let event = match event::read() {
                Ok(CtEvent::Key(key)) => HandTermEvent::Key(key),
                Ok(CtEvent::Paste(text)) => HandTermEvent::Paste(text),
                Ok(CtEvent::Resize(_, _)) => HandTermEvent::Resize,
                Ok(_) => continue,
                Err(_) => break,
            };
            if tx.send(event).is_err() {
                break;
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSource for CrosstermEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<HandTermEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Which key event kind counts as a keystroke.
///
/// Terminals with the kitty keyboard protocol report releases, and a keystroke is
/// timed at release. Elsewhere only presses (and auto-repeats) arrive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum KeyTrigger {
    #[default]
    Press,
    Release,
}

impl KeyTrigger {
    pub fn for_enhancement(supported: bool) -> Self {
        if supported {
            KeyTrigger::Release
        } else {
            KeyTrigger::Press
        }
    }

    pub fn accepts(&self, key: &KeyEvent) -> bool {
        match self {
            KeyTrigger::Press => key.kind != KeyEventKind::Release,
            KeyTrigger::Release => key.kind == KeyEventKind::Release,
        }
    }
}

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// Channel-fed event source for headless runs
pub struct TestEventSource {
    rx: Receiver<HandTermEvent>,
}

impl TestEventSource {
    pub fn new(rx: Receiver<HandTermEvent>) -> Self {
        Self { rx }
    }
}

impl EventSource for TestEventSource {
    fn recv_timeout(&self, timeout: Duration) -> Result<HandTermEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

/// Runner that advances the application one event/tick at a time
pub struct Runner<E: EventSource, T: Ticker> {
    event_source: E,
    ticker: T,
}

impl<E: EventSource, T: Ticker> Runner<E, T> {
    pub fn new(event_source: E, ticker: T) -> Self {
        Self {
            event_source,
            ticker,
        }
    }

    /// Blocks up to tick interval and returns the next event, or Tick on timeout
    pub fn step(&self) -> HandTermEvent {
        match self.event_source.recv_timeout(self.ticker.interval()) {
            Ok(ev) => ev,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                HandTermEvent::Tick
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventState, KeyModifiers};
    use std::sync::mpsc;

    fn key(kind: KeyEventKind) -> KeyEvent {
        KeyEvent {
            code: KeyCode::Char('f'),
            modifiers: KeyModifiers::NONE,
            kind,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn step_returns_tick_on_timeout() {
        let (_tx, rx) = mpsc::channel();
        let es = TestEventSource::new(rx);
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(1)));

        assert!(matches!(runner.step(), HandTermEvent::Tick));
    }

    #[test]
    fn step_passes_through_events() {
        let (tx, rx) = mpsc::channel();
        tx.send(HandTermEvent::Paste("jkl;".into())).unwrap();
        let es = TestEventSource::new(rx);
        let runner = Runner::new(es, FixedTicker::new(Duration::from_millis(10)));

        match runner.step() {
            HandTermEvent::Paste(text) => assert_eq!(text, "jkl;"),
            other => panic!("expected Paste event, got {other:?}"),
        }
    }

    #[test]
    fn press_trigger_ignores_releases() {
        let trigger = KeyTrigger::for_enhancement(false);
        assert!(trigger.accepts(&key(KeyEventKind::Press)));
        assert!(trigger.accepts(&key(KeyEventKind::Repeat)));
        assert!(!trigger.accepts(&key(KeyEventKind::Release)));
    }

    #[test]
    fn release_trigger_only_accepts_releases() {
        let trigger = KeyTrigger::for_enhancement(true);
        assert!(!trigger.accepts(&key(KeyEventKind::Press)));
        assert!(trigger.accepts(&key(KeyEventKind::Release)));
    }
}

use std::rc::Rc;
use std::sync::mpsc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use handterm::activity::Activity;
use handterm::app::{Control, HandTerm};
use handterm::config::Config;
use handterm::content::{Catalog, ContentSource};
use handterm::location::Location;
use handterm::runtime::{FixedTicker, HandTermEvent, Runner, TestEventSource};
use handterm::store::{MemoryStore, Store};

fn send_line(tx: &mpsc::Sender<HandTermEvent>, line: &str) {
    for c in line.chars() {
        tx.send(HandTermEvent::Key(KeyEvent::new(
            KeyCode::Char(c),
            KeyModifiers::NONE,
        )))
        .unwrap();
    }
    tx.send(HandTermEvent::Key(KeyEvent::new(
        KeyCode::Enter,
        KeyModifiers::NONE,
    )))
    .unwrap();
}

fn drive(app: &mut HandTerm, runner: &Runner<TestEventSource, FixedTicker>, steps: u32) -> bool {
    for _ in 0..steps {
        if app.on_event(runner.step()) == Control::Quit {
            return true;
        }
    }
    false
}

// Headless run of the embedded tutorial through Runner/TestEventSource, without a TTY.
#[test]
fn headless_tutorial_group_unlocks_games() {
    let store = MemoryStore::new();
    let catalog = Catalog::embedded().unwrap();
    let home_row: Vec<String> = catalog
        .tutorials()
        .iter()
        .filter(|p| p.tutorial_group.as_deref() == Some("home-row"))
        .map(|p| p.key.clone())
        .collect();
    let mut app = HandTerm::new(
        &Config::default(),
        &Location::default(),
        Rc::new(store.clone()),
        Box::new(catalog),
    );
    assert_eq!(app.activity(), Activity::Tutorial);

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );

    for key in &home_row {
        // The Enter step is completed by an empty line.
        send_line(&tx, key.trim_end_matches('\r'));
    }
    let events: usize = home_row.iter().map(|k| k.len() + 1).sum();
    drive(&mut app, &runner, events as u32);

    assert_eq!(app.activity(), Activity::Game);
    assert!(app.mediator().progress().covers(home_row.iter().map(String::as_str)));
    assert!(store.log_count() >= home_row.len() - 1);

    tx.send(HandTermEvent::Key(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)))
        .unwrap();
    assert!(drive(&mut app, &runner, 10));
}

#[test]
fn headless_wrong_phrase_keeps_tutorial() {
    let store = MemoryStore::new();
    let mut app = HandTerm::new(
        &Config::default(),
        &Location::parse("/tutorial/fdsa"),
        Rc::new(store.clone()),
        Box::new(Catalog::embedded().unwrap()),
    );

    let (tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(5)),
    );
    send_line(&tx, "fdas");
    drive(&mut app, &runner, 10);

    assert_eq!(app.activity(), Activity::Tutorial);
    assert_eq!(app.target_prompt().as_deref().map(|p| &p[..4]), Some("fdsa"));
    assert!(app.mediator().progress().is_empty());
    assert_eq!(store.log_count(), 1);
}

#[test]
fn headless_ticks_without_input_change_nothing() {
    let store = MemoryStore::new();
    let mut app = HandTerm::new(
        &Config::default(),
        &Location::parse("/normal"),
        Rc::new(store.clone()),
        Box::new(Catalog::embedded().unwrap()),
    );
    let (_tx, rx) = mpsc::channel();
    let runner = Runner::new(
        TestEventSource::new(rx),
        FixedTicker::new(Duration::from_millis(1)),
    );

    assert!(!drive(&mut app, &runner, 5));
    assert_eq!(app.activity(), Activity::Normal);
    assert!(store.get_file("tutorial/completed.json").status != 200);
}

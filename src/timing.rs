use chrono::Local;
use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::store::Store;
use crate::util::{mean, round_to};

/// Number of characters listed by [`slowest_characters`] unless a caller asks otherwise.
pub const DEFAULT_SLOWEST_COUNT: usize = 3;

/// Durations at or below this are treated as noise (first keystroke, key repeat).
pub const NOISE_THRESHOLD_MS: f64 = 1.0;

/// Format tag passed to the store for keystroke logs.
pub const LOG_FORMAT: &str = "json";

const MS_PER_MINUTE: f64 = 60_000.0;
const CHARS_PER_WORD: f64 = 5.0;
const WPM_DECIMALS: u32 = 3;

/// A logical key release.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keystroke {
    pub character: String,
    pub timestamp_ms: f64,
}

impl Keystroke {
    pub fn new(character: impl Into<String>, timestamp_ms: f64) -> Self {
        Self {
            character: character.into(),
            timestamp_ms,
        }
    }
}

/// Time since the previous keystroke, never negative.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharDuration {
    pub character: String,
    pub duration_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharWpm {
    pub character: String,
    pub wpm: f64,
    pub duration_ms: f64,
}

impl From<&CharDuration> for CharWpm {
    fn from(d: &CharDuration) -> Self {
        Self {
            character: d.character.clone(),
            wpm: wpm_for_duration(d.duration_ms),
            duration_ms: d.duration_ms,
        }
    }
}

/// Words per minute for a single character interval, rounded to 3 places.
/// A five character word is the unit; non-positive durations give 0.
pub fn wpm_for_duration(duration_ms: f64) -> f64 {
    if duration_ms <= 0.0 {
        return 0.0;
    }
    let chars_per_minute = 1.0 / (duration_ms / MS_PER_MINUTE);
    round_to(chars_per_minute / CHARS_PER_WORD, WPM_DECIMALS)
}

/// Aggregate speed for one phrase attempt
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WpmSummary {
    pub wpm_average: f64,
    pub char_wpms: Vec<CharWpm>,
    pub wpm_sum: f64,
    pub char_count: usize,
}

impl WpmSummary {
    pub fn from_durations(durations: &[CharDuration]) -> Self {
        let char_wpms: Vec<CharWpm> = durations.iter().map(CharWpm::from).collect();

        // A single keystroke has no interval to measure.
        if durations.len() < 2 {
            return Self {
                char_wpms,
                ..Self::default()
            };
        }

        let counted: Vec<f64> = char_wpms
            .iter()
            .filter(|c| c.duration_ms > NOISE_THRESHOLD_MS)
            .map(|c| c.wpm)
            .collect();

        Self {
            wpm_average: mean(&counted).unwrap_or(0.0),
            wpm_sum: counted.iter().sum(),
            char_count: counted.len(),
            char_wpms,
        }
    }
}

/// Average speed of one character across a phrase
#[derive(Clone, Debug, PartialEq)]
pub struct CharSpeed {
    pub character: String,
    pub wpm: f64,
}

impl fmt::Display for CharSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.1}", self.character, self.wpm)
    }
}

/// The `count` slowest characters, slowest first.
///
/// Noise entries (`duration_ms <= 1`) are dropped before grouping. Each character's
/// WPM is averaged over all of its occurrences. Ties keep first-seen order.
pub fn slowest_characters(char_wpms: &[CharWpm], count: usize) -> Vec<CharSpeed> {
    let mut groups: Vec<(&str, f64, usize)> = Vec::new();
    for cw in char_wpms
        .iter()
        .filter(|c| c.duration_ms > NOISE_THRESHOLD_MS)
    {
        match groups.iter_mut().find(|(c, _, _)| *c == cw.character) {
            Some(group) => {
                group.1 += cw.wpm;
                group.2 += 1;
            }
            None => groups.push((&cw.character, cw.wpm, 1)),
        }
    }

    groups
        .into_iter()
        .map(|(character, sum, n)| CharSpeed {
            character: character.to_string(),
            wpm: round_to(sum / n as f64, WPM_DECIMALS),
        })
        .sorted_by(|a, b| a.wpm.total_cmp(&b.wpm))
        .take(count)
        .collect()
}

/// Sortable local timestamp used as a keystroke log key.
pub fn time_code() -> String {
    Local::now().format("%Y%m%dT%H%M%S%.3f").to_string()
}

/// Source of "now" in milliseconds
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Wall clock. May step backwards when the system time is adjusted.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64() * 1000.0,
            Err(e) => -(e.duration().as_secs_f64() * 1000.0),
        }
    }
}

/// Hand-driven clock for headless sessions and tests. Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(start_ms: f64) -> Self {
        Self {
            now: Rc::new(Cell::new(start_ms)),
        }
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

/// Per-phrase keystroke timing
pub struct TimingEngine {
    clock: Box<dyn Clock>,
    store: Rc<dyn Store>,
    durations: Vec<CharDuration>,
    previous_ms: Option<f64>,
}

impl fmt::Debug for TimingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimingEngine")
            .field("durations", &self.durations)
            .field("previous_ms", &self.previous_ms)
            .finish()
    }
}

impl TimingEngine {
    pub fn new(store: Rc<dyn Store>) -> Self {
        Self::with_clock(store, Box::new(SystemClock))
    }

    pub fn with_clock(store: Rc<dyn Store>, clock: Box<dyn Clock>) -> Self {
        Self {
            clock,
            store,
            durations: Vec::new(),
            previous_ms: None,
        }
    }

    /// Record a keystroke at the clock's current time.
    pub fn add_keystroke(&mut self, character: &str) -> CharDuration {
        let now = self.clock.now_ms();
        self.record(Keystroke::new(character, now))
    }

    /// Record a keystroke at a caller-supplied time.
    pub fn add_keystroke_at(&mut self, character: &str, timestamp_ms: f64) -> CharDuration {
        self.record(Keystroke::new(character, timestamp_ms))
    }

    /// Record a keystroke carrying its own timestamp.
    pub fn record(&mut self, keystroke: Keystroke) -> CharDuration {
        let duration_ms = match self.previous_ms {
            Some(previous) => (keystroke.timestamp_ms - previous).max(0.0),
            None => 0.0,
        };
        self.previous_ms = Some(keystroke.timestamp_ms);

        let duration = CharDuration {
            character: keystroke.character,
            duration_ms,
        };
        self.durations.push(duration.clone());
        duration
    }

    pub fn durations(&self) -> &[CharDuration] {
        &self.durations
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn wpms(&self) -> WpmSummary {
        WpmSummary::from_durations(&self.durations)
    }

    /// Drop the phrase buffer. The next keystroke starts a fresh interval.
    pub fn clear_keystrokes(&mut self) {
        self.durations.clear();
        self.previous_ms = None;
    }

    /// Hand the phrase's character speeds to the store and return the average.
    /// A failed save is logged and otherwise ignored.
    pub fn save_keystrokes(&mut self, time_code: &str) -> f64 {
        let summary = self.wpms();
        match serde_json::to_string(&summary.char_wpms) {
            Ok(content) => {
                if self.store.save_log(time_code, &content, LOG_FORMAT) {
                    debug!(
                        "saved {} keystrokes under {time_code}",
                        summary.char_wpms.len()
                    );
                } else {
                    warn!("keystroke log {time_code} was not saved");
                }
            }
            Err(err) => warn!("could not serialize keystroke log {time_code}: {err}"),
        }
        self.previous_ms = None;
        summary.wpm_average
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn engine_with_clock() -> (TimingEngine, ManualClock, MemoryStore) {
        let store = MemoryStore::new();
        let clock = ManualClock::new(0.0);
        let engine = TimingEngine::with_clock(Rc::new(store.clone()), Box::new(clock.clone()));
        (engine, clock, store)
    }

    fn cw(character: &str, wpm: f64, duration_ms: f64) -> CharWpm {
        CharWpm {
            character: character.to_string(),
            wpm,
            duration_ms,
        }
    }

    #[test]
    fn test_first_keystroke_has_zero_duration() {
        let (mut engine, clock, _) = engine_with_clock();
        clock.set(5_000.0);

        let d = engine.add_keystroke("a");

        assert_eq!(d.character, "a");
        assert_eq!(d.duration_ms, 0.0);
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_caller_timestamps_ignore_clock() {
        let (mut engine, clock, _) = engine_with_clock();
        clock.set(99_999.0);

        engine.add_keystroke_at("f", 1_000.0);
        let d = engine.add_keystroke_at("d", 1_250.0);

        assert_eq!(d.duration_ms, 250.0);
        assert_eq!(engine.wpms().char_wpms[1].wpm, 48.0);
    }

    #[test]
    fn test_durations_and_wpm_for_even_rhythm() {
        let (mut engine, clock, _) = engine_with_clock();

        engine.add_keystroke("a");
        clock.advance(600.0);
        engine.add_keystroke("b");
        clock.advance(600.0);
        engine.add_keystroke("c");

        let durations: Vec<f64> = engine.durations().iter().map(|d| d.duration_ms).collect();
        assert_eq!(durations, vec![0.0, 600.0, 600.0]);

        let summary = engine.wpms();
        assert_eq!(summary.char_wpms[0].wpm, 0.0);
        assert_eq!(summary.char_wpms[1].wpm, 20.0);
        assert_eq!(summary.char_wpms[2].wpm, 20.0);
        assert_eq!(summary.wpm_average, 20.0);
        assert_eq!(summary.wpm_sum, 40.0);
        assert_eq!(summary.char_count, 2);
    }

    #[test]
    fn test_backwards_clock_is_clamped() {
        let (mut engine, clock, _) = engine_with_clock();
        clock.set(1_000.0);
        engine.add_keystroke("a");
        clock.set(400.0);
        let d = engine.add_keystroke("b");
        assert_eq!(d.duration_ms, 0.0);

        clock.set(700.0);
        let d = engine.add_keystroke("c");
        assert_eq!(d.duration_ms, 300.0);
        assert!(engine.durations().iter().all(|d| d.duration_ms >= 0.0));
    }

    #[test]
    fn test_wpms_with_no_keystrokes() {
        let (engine, _, _) = engine_with_clock();
        let summary = engine.wpms();
        assert_eq!(summary, WpmSummary::default());
    }

    #[test]
    fn test_wpms_with_one_keystroke() {
        let (mut engine, _, _) = engine_with_clock();
        engine.add_keystroke("x");

        let summary = engine.wpms();
        assert_eq!(summary.wpm_average, 0.0);
        assert_eq!(summary.char_wpms.len(), 1);
        assert_eq!(summary.wpm_sum, 0.0);
        assert_eq!(summary.char_count, 0);
    }

    #[test]
    fn test_wpms_when_every_interval_is_noise() {
        let (mut engine, clock, _) = engine_with_clock();
        engine.add_keystroke("a");
        clock.advance(1.0);
        engine.add_keystroke("b");

        let summary = engine.wpms();
        assert!(!summary.wpm_average.is_nan());
        assert_eq!(summary.wpm_average, 0.0);
        assert_eq!(summary.char_count, 0);
    }

    #[test]
    fn test_clear_resets_buffer_and_interval() {
        let (mut engine, clock, _) = engine_with_clock();
        engine.add_keystroke("a");
        clock.advance(250.0);
        engine.add_keystroke("b");

        engine.clear_keystrokes();
        assert!(engine.is_empty());
        assert_eq!(engine.wpms(), WpmSummary::default());

        clock.advance(10_000.0);
        let d = engine.add_keystroke("c");
        assert_eq!(d.duration_ms, 0.0);
    }

    #[test]
    fn test_save_keystrokes_logs_and_resets_interval() {
        let (mut engine, clock, store) = engine_with_clock();
        engine.add_keystroke("a");
        clock.advance(600.0);
        engine.add_keystroke("b");

        let average = engine.save_keystrokes("20240101T000000.000");
        assert_eq!(average, 20.0);

        let (content, format) = store.log("20240101T000000.000").unwrap();
        assert_eq!(format, LOG_FORMAT);
        let saved: Vec<CharWpm> = serde_json::from_str(&content).unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[1].wpm, 20.0);

        clock.advance(5_000.0);
        assert_eq!(engine.add_keystroke("c").duration_ms, 0.0);
    }

    #[test]
    fn test_save_keystrokes_survives_store_failure() {
        let (mut engine, clock, store) = engine_with_clock();
        store.fail_writes(true);
        engine.add_keystroke("a");
        clock.advance(600.0);
        engine.add_keystroke("b");

        assert_eq!(engine.save_keystrokes("t1"), 20.0);
        assert!(store.log("t1").is_none());
    }

    #[test]
    fn test_wpm_for_duration() {
        assert_eq!(wpm_for_duration(0.0), 0.0);
        assert_eq!(wpm_for_duration(-5.0), 0.0);
        assert_eq!(wpm_for_duration(600.0), 20.0);
        assert_eq!(wpm_for_duration(120.0), 100.0);
        assert_eq!(wpm_for_duration(700.0), 17.143);
    }

    #[test]
    fn test_slowest_characters_averages_per_character() {
        let wpms = vec![cw("a", 10.0, 200.0), cw("a", 30.0, 200.0), cw("b", 5.0, 200.0)];

        let slowest = slowest_characters(&wpms, DEFAULT_SLOWEST_COUNT);

        assert_eq!(
            slowest,
            vec![
                CharSpeed {
                    character: "b".to_string(),
                    wpm: 5.0
                },
                CharSpeed {
                    character: "a".to_string(),
                    wpm: 20.0
                },
            ]
        );
    }

    #[test]
    fn test_slowest_characters_drops_noise_and_truncates() {
        let wpms = vec![
            cw("z", 0.0, 0.0),
            cw("q", 1.0, 1.0),
            cw("c", 40.0, 300.0),
            cw("d", 30.0, 400.0),
            cw("e", 50.0, 240.0),
            cw("f", 60.0, 200.0),
        ];

        let slowest: Vec<String> = slowest_characters(&wpms, 3)
            .into_iter()
            .map(|s| s.character)
            .collect();

        assert_eq!(slowest, vec!["d", "c", "e"]);
    }

    #[test]
    fn test_slowest_characters_ties_keep_first_seen_order() {
        let wpms = vec![cw("x", 20.0, 600.0), cw("y", 20.0, 600.0), cw("w", 20.0, 600.0)];

        let slowest: Vec<String> = slowest_characters(&wpms, 5)
            .into_iter()
            .map(|s| s.character)
            .collect();

        assert_eq!(slowest, vec!["x", "y", "w"]);
    }

    #[test]
    fn test_char_speed_display() {
        let speed = CharSpeed {
            character: "k".to_string(),
            wpm: 12.345,
        };
        assert_eq!(speed.to_string(), "k: 12.3");
    }

    #[test]
    fn test_time_code_is_sortable() {
        let code = time_code();
        assert_eq!(code.len(), "20240101T000000.000".len());
        assert!(code.contains('T'));
    }
}

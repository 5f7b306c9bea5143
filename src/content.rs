use include_dir::{include_dir, Dir};
use serde::{Deserialize, Serialize};

use crate::progress::TutorialProgress;

static PHRASE_DIR: Dir = include_dir!("src/phrases");

/// Key of the tutorial step completed by pressing Enter on an empty line.
pub const ENTER_KEY: &str = "\r";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhraseKind {
    #[default]
    Tutorial,
    Game,
}

/// A target the user must type. `key` is the exact expected input; `value` is
/// optional display text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GamePhrase {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub tutorial_group: Option<String>,
    #[serde(default)]
    pub display_as: PhraseKind,
}

impl GamePhrase {
    pub fn tutorial(key: &str, group: Option<&str>) -> Self {
        Self {
            key: key.to_string(),
            value: None,
            tutorial_group: group.map(str::to_string),
            display_as: PhraseKind::Tutorial,
        }
    }

    pub fn game(key: &str, group: Option<&str>) -> Self {
        Self {
            display_as: PhraseKind::Game,
            ..Self::tutorial(key, group)
        }
    }

    /// Exact comparison against `key`. The Enter step accepts an empty line.
    pub fn matches(&self, submitted: &str) -> bool {
        if self.key == ENTER_KEY {
            return submitted.is_empty() || submitted == ENTER_KEY;
        }
        submitted == self.key
    }

    pub fn in_group(&self, group: Option<&str>) -> bool {
        self.tutorial_group.as_deref() == group
    }

    /// What the user sees as the target
    pub fn prompt(&self) -> String {
        let key = if self.key == ENTER_KEY {
            "Enter"
        } else {
            self.key.as_str()
        };
        match &self.value {
            Some(value) => format!("{key}  ({value})"),
            None => key.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhraseSet {
    #[allow(dead_code)]
    name: String,
    phrases: Vec<GamePhrase>,
}

/// Tutorial and game content, with the completed set passed in by the caller.
pub trait ContentSource {
    fn tutorials(&self) -> &[GamePhrase];
    fn games(&self) -> &[GamePhrase];

    fn tutorial_keys(&self) -> Vec<&str> {
        self.tutorials().iter().map(|p| p.key.as_str()).collect()
    }

    /// First incomplete tutorial after `after_key`, wrapping to the start.
    fn next_tutorial(
        &self,
        progress: &TutorialProgress,
        after_key: Option<&str>,
    ) -> Option<GamePhrase> {
        let tutorials = self.tutorials();
        let start = after_key
            .and_then(|key| tutorials.iter().position(|p| p.key == key))
            .map_or(0, |idx| idx + 1);

        tutorials[start..]
            .iter()
            .chain(&tutorials[..start])
            .find(|p| !progress.contains(&p.key))
            .cloned()
    }

    fn incomplete_in_group(
        &self,
        group: Option<&str>,
        progress: &TutorialProgress,
    ) -> Vec<GamePhrase> {
        self.tutorials()
            .iter()
            .filter(|p| p.in_group(group) && !progress.contains(&p.key))
            .cloned()
            .collect()
    }

    /// Games unlocked by `group`, or every game when no group is given.
    fn game_phrases(&self, group: Option<&str>) -> Vec<GamePhrase> {
        self.games()
            .iter()
            .filter(|p| group.is_none() || p.in_group(group))
            .cloned()
            .collect()
    }
}

/// Phrase catalog loaded from JSON
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    tutorials: Vec<GamePhrase>,
    games: Vec<GamePhrase>,
}

impl Catalog {
    pub fn new(tutorials: Vec<GamePhrase>, games: Vec<GamePhrase>) -> Self {
        Self { tutorials, games }
    }

    /// The phrases shipped with the binary.
    pub fn embedded() -> Result<Self, serde_json::Error> {
        Ok(Self {
            tutorials: read_phrase_set("tutorials.json")?,
            games: read_phrase_set("games.json")?
                .into_iter()
                .map(|p| GamePhrase {
                    display_as: PhraseKind::Game,
                    ..p
                })
                .collect(),
        })
    }
}

impl ContentSource for Catalog {
    fn tutorials(&self) -> &[GamePhrase] {
        &self.tutorials
    }

    fn games(&self) -> &[GamePhrase] {
        &self.games
    }
}

fn read_phrase_set(file_name: &str) -> Result<Vec<GamePhrase>, serde_json::Error> {
    let contents = PHRASE_DIR
        .get_file(file_name)
        .and_then(|f| f.contents_utf8())
        .unwrap_or("");
    let set: PhraseSet = serde_json::from_str(contents)?;
    Ok(set.phrases)
}

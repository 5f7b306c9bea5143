use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Top-level UI mode
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Activity {
    #[default]
    Normal,
    Tutorial,
    Game,
    Edit,
    Tree,
}

impl Activity {
    pub const ALL: [Activity; 5] = [
        Activity::Normal,
        Activity::Tutorial,
        Activity::Game,
        Activity::Edit,
        Activity::Tree,
    ];

    /// Whether the activity was reached from somewhere it should return to.
    pub fn returns_to_previous(&self) -> bool {
        match self {
            Activity::Tree => true,
            Activity::Normal | Activity::Tutorial | Activity::Game | Activity::Edit => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown activity '{0}'")]
pub struct UnknownActivity(pub String);

impl FromStr for Activity {
    type Err = UnknownActivity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "normal" => Ok(Activity::Normal),
            "tutorial" => Ok(Activity::Tutorial),
            "game" => Ok(Activity::Game),
            "edit" => Ok(Activity::Edit),
            "tree" => Ok(Activity::Tree),
            other => Err(UnknownActivity(other.to_string())),
        }
    }
}

use log::warn;

use crate::store::{Response, Store, STATUS_NOT_FOUND, STATUS_OK};

/// Store key holding the completed tutorial keys as a JSON string array.
pub const COMPLETED_TUTORIALS_KEY: &str = "tutorial/completed.json";

/// Completed tutorial phrase keys, in completion order.
///
/// Keys are only added, except through [`TutorialProgress::reset`]. An addition is
/// first applied in memory and left pending until [`commit`](Self::commit) or
/// [`rollback`](Self::rollback).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TutorialProgress {
    completed: Vec<String>,
    pending: Vec<String>,
}

impl TutorialProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut progress = Self::new();
        for key in keys {
            let key = key.into();
            if !progress.completed.contains(&key) {
                progress.completed.push(key);
            }
        }
        progress
    }

    /// Parse the persisted JSON blob. Anything malformed yields an empty set.
    pub fn from_json(json: &str) -> Self {
        match serde_json::from_str::<Vec<String>>(json) {
            Ok(keys) => Self::from_keys(keys),
            Err(err) => {
                warn!("ignoring malformed tutorial progress: {err}");
                Self::new()
            }
        }
    }

    /// Load from the store. A missing entry is a new user; any other failure is
    /// logged and treated the same way.
    pub fn load(store: &dyn Store) -> Self {
        let response = store.get_file(COMPLETED_TUTORIALS_KEY);
        match response.data {
            Some(json) if response.status == STATUS_OK => Self::from_json(&json),
            _ => {
                if response.status != STATUS_NOT_FOUND {
                    warn!(
                        "could not load tutorial progress: {}",
                        response.error.unwrap_or_default()
                    );
                }
                Self::new()
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.completed).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn save(&self, store: &dyn Store) -> Response<()> {
        store.put_file(COMPLETED_TUTORIALS_KEY, &self.to_json())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.completed.iter().any(|k| k == key)
    }

    pub fn keys(&self) -> &[String] {
        &self.completed
    }

    pub fn len(&self) -> usize {
        self.completed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.completed.is_empty()
    }

    /// True when every key in `all` has been completed.
    pub fn covers<'a>(&self, all: impl IntoIterator<Item = &'a str>) -> bool {
        all.into_iter().all(|k| self.contains(k))
    }

    /// Optimistically mark `key` complete. Returns false if it already was.
    pub fn mark_pending(&mut self, key: &str) -> bool {
        if self.contains(key) {
            return false;
        }
        self.completed.push(key.to_string());
        self.pending.push(key.to_string());
        true
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The store accepted the pending keys.
    pub fn commit(&mut self) {
        self.pending.clear();
    }

    /// The store refused the pending keys; forget them.
    pub fn rollback(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        self.completed.retain(|k| !pending.contains(k));
    }

    pub fn reset(&mut self) {
        self.completed.clear();
        self.pending.clear();
    }
}

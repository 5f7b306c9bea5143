use chrono::Local;
use itertools::Itertools;
use log::warn;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::error::StoreError;

pub const STATUS_OK: u16 = 200;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_SERVER_ERROR: u16 = 500;
pub const STATUS_UNAVAILABLE: u16 = 503;

/// Request/response envelope shared by every store call. Only 200 is success.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub status: u16,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: STATUS_OK,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(status: u16, error: impl Into<String>) -> Self {
        Self {
            status,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn error_message(&self) -> String {
        self.error
            .clone()
            .unwrap_or_else(|| format!("status {}", self.status))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeItemKind {
    Directory,
    File,
}

/// One entry of a directory listing
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeItem {
    pub path: String,
    pub kind: TreeItemKind,
}

impl TreeItem {
    pub fn is_directory(&self) -> bool {
        self.kind == TreeItemKind::Directory
    }
}

/// Persistence collaborator: keystroke logs plus a flat key/value file space.
pub trait Store {
    fn save_log(&self, key: &str, content: &str, format: &str) -> bool;
    fn get_file(&self, key: &str) -> Response<String>;
    fn put_file(&self, key: &str, content: &str) -> Response<()>;
    /// Immediate children of `path`, directories first.
    fn list_tree(&self, path: &str) -> Response<Vec<TreeItem>>;
}

/// Build the immediate children of `path` out of flat `/`-separated keys.
pub fn tree_from_keys<'a>(path: &str, keys: impl IntoIterator<Item = &'a str>) -> Vec<TreeItem> {
    let prefix = path.trim_matches('/');
    let mut children: BTreeMap<String, TreeItemKind> = BTreeMap::new();

    for key in keys {
        let rest = if prefix.is_empty() {
            key
        } else {
            match key
                .strip_prefix(prefix)
                .and_then(|r| r.strip_prefix('/'))
            {
                Some(rest) => rest,
                None => continue,
            }
        };
        if rest.is_empty() {
            continue;
        }

        let (name, kind) = match rest.split_once('/') {
            Some((dir, _)) => (dir, TreeItemKind::Directory),
            None => (rest, TreeItemKind::File),
        };
        let full = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };
        let entry = children.entry(full).or_insert(kind);
        if kind == TreeItemKind::Directory {
            *entry = TreeItemKind::Directory;
        }
    }

    children
        .into_iter()
        .map(|(path, kind)| TreeItem { path, kind })
        .sorted_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.path.cmp(&b.path)))
        .collect()
}

#[derive(Debug, Default)]
struct MemoryState {
    logs: Vec<(String, String, String)>,
    files: BTreeMap<String, String>,
    fail_writes: Cell<bool>,
    fail_reads: Cell<bool>,
}

/// In-process store. Clones share the same data, so a caller can keep a handle
/// while the engine and mediator hold theirs.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write answer 503 until switched back.
    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow().fail_writes.set(fail);
    }

    /// Make every read answer 503 until switched back.
    pub fn fail_reads(&self, fail: bool) {
        self.state.borrow().fail_reads.set(fail);
    }

    /// Content and format of the latest log saved under `key`
    pub fn log(&self, key: &str) -> Option<(String, String)> {
        self.state
            .borrow()
            .logs
            .iter()
            .rev()
            .find(|(k, _, _)| k == key)
            .map(|(_, content, format)| (content.clone(), format.clone()))
    }

    pub fn log_count(&self) -> usize {
        self.state.borrow().logs.len()
    }

    pub fn file(&self, key: &str) -> Option<String> {
        self.state.borrow().files.get(key).cloned()
    }
}

impl Store for MemoryStore {
    fn save_log(&self, key: &str, content: &str, format: &str) -> bool {
        let mut state = self.state.borrow_mut();
        if state.fail_writes.get() {
            return false;
        }
        state
            .logs
            .push((key.to_string(), content.to_string(), format.to_string()));
        true
    }

    fn get_file(&self, key: &str) -> Response<String> {
        let state = self.state.borrow();
        if state.fail_reads.get() {
            return Response::failure(STATUS_UNAVAILABLE, "store unavailable");
        }
        match state.files.get(key) {
            Some(content) => Response::ok(content.clone()),
            None => Response::failure(STATUS_NOT_FOUND, format!("{key} not found")),
        }
    }

    fn put_file(&self, key: &str, content: &str) -> Response<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes.get() {
            return Response::failure(STATUS_UNAVAILABLE, "store unavailable");
        }
        state.files.insert(key.to_string(), content.to_string());
        Response::ok(())
    }

    fn list_tree(&self, path: &str) -> Response<Vec<TreeItem>> {
        let state = self.state.borrow();
        if state.fail_reads.get() {
            return Response::failure(STATUS_UNAVAILABLE, "store unavailable");
        }
        Response::ok(tree_from_keys(path, state.files.keys().map(String::as_str)))
    }
}

/// SQLite-backed store for logs and files
pub struct SqliteStore {
    conn: Connection,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.conn.path())
            .finish()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating parent directories.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL,
                content TEXT NOT NULL,
                format TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_logs_key ON logs(key)",
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS files (
                key TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        Ok(Self { conn })
    }

    /// Most recent logs, newest first, as (key, content, format).
    pub fn recent_logs(&self, limit: usize) -> Result<Vec<(String, String, String)>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, content, format FROM logs ORDER BY id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            logs.push(row?);
        }
        Ok(logs)
    }

    fn read_file(&self, key: &str) -> Result<Option<String>, StoreError> {
        let content = self
            .conn
            .query_row("SELECT content FROM files WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(content)
    }

    fn write_file(&self, key: &str, content: &str) -> Result<(), StoreError> {
        self.conn.execute(
            r#"
            INSERT INTO files (key, content, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE
                SET content = excluded.content, updated_at = excluded.updated_at
            "#,
            params![key, content, Local::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn file_keys(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare("SELECT key FROM files ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}

impl Store for SqliteStore {
    fn save_log(&self, key: &str, content: &str, format: &str) -> bool {
        let result = self.conn.execute(
            "INSERT INTO logs (key, content, format, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![key, content, format, Local::now().to_rfc3339()],
        );
        match result {
            Ok(_) => true,
            Err(err) => {
                warn!("save_log {key}: {err}");
                false
            }
        }
    }

    fn get_file(&self, key: &str) -> Response<String> {
        match self.read_file(key) {
            Ok(Some(content)) => Response::ok(content),
            Ok(None) => Response::failure(STATUS_NOT_FOUND, format!("{key} not found")),
            Err(err) => Response::failure(STATUS_SERVER_ERROR, err.to_string()),
        }
    }

    fn put_file(&self, key: &str, content: &str) -> Response<()> {
        match self.write_file(key, content) {
            Ok(()) => Response::ok(()),
            Err(err) => Response::failure(STATUS_SERVER_ERROR, err.to_string()),
        }
    }

    fn list_tree(&self, path: &str) -> Response<Vec<TreeItem>> {
        match self.file_keys() {
            Ok(keys) => Response::ok(tree_from_keys(path, keys.iter().map(String::as_str))),
            Err(err) => Response::failure(STATUS_SERVER_ERROR, err.to_string()),
        }
    }
}

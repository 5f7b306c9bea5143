use serde::{Deserialize, Serialize};

/// Where the UI is pointed: `/<activity>/<content>?group=<group>`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub activity_key: String,
    pub content_key: Option<String>,
    pub group_key: Option<String>,
}

impl Location {
    pub fn new(activity_key: impl Into<String>) -> Self {
        Self {
            activity_key: activity_key.into(),
            content_key: None,
            group_key: None,
        }
    }

    pub fn with_content(mut self, content_key: impl Into<String>) -> Self {
        self.content_key = Some(content_key.into());
        self
    }

    pub fn with_group(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Parse a path such as `/tutorial/fdsa?group=home`. Content keys may contain `/`,
    /// and the escapes `\r`, `\n`, `\t` and `\\` in them are unescaped.
    pub fn parse(path: &str) -> Self {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };

        let trimmed = path.trim_matches('/');
        let (activity, content) = match trimmed.split_once('/') {
            Some((a, c)) => (a, Some(c)),
            None => (trimmed, None),
        };

        let group_key = query.and_then(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .find(|(k, _)| *k == "group")
                .map(|(_, v)| v.to_string())
                .filter(|v| !v.is_empty())
        });

        Self {
            activity_key: activity.to_lowercase(),
            content_key: content.filter(|c| !c.is_empty()).map(unescape),
            group_key,
        }
    }

    pub fn to_path(&self) -> String {
        let mut path = format!("/{}", self.activity_key);
        if let Some(content) = &self.content_key {
            path.push('/');
            path.push_str(&escape(content));
        }
        if let Some(group) = &self.group_key {
            path.push_str("?group=");
            path.push_str(group);
        }
        path
    }
}

fn escape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    for c in content.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let replaced = match chars.peek() {
            Some('r') => '\r',
            Some('n') => '\n',
            Some('t') => '\t',
            Some('\\') => '\\',
            // unknown escapes are kept as typed
            _ => {
                out.push(c);
                continue;
            }
        };
        chars.next();
        out.push(replaced);
    }
    out
}

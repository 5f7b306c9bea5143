use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Switch {
    Flag(bool),
    Value(String),
}

/// A command line after execution: name, positional args and switches.
/// `raw` keeps the submitted text for phrase matching.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedCommand {
    pub command: String,
    pub args: Vec<String>,
    pub switches: BTreeMap<String, Switch>,
    pub raw: String,
}

impl ParsedCommand {
    /// Split on whitespace (double quotes group words). `--name`, `--name=value`
    /// and `-abc` become switches; a lone `-` stays positional.
    pub fn parse(line: &str) -> Self {
        let mut tokens = tokenize(line).into_iter();
        let command = tokens.next().unwrap_or_default();

        let mut args = Vec::new();
        let mut switches = BTreeMap::new();
        for token in tokens {
            if let Some(long) = token.strip_prefix("--") {
                if long.is_empty() {
                    args.push(token);
                    continue;
                }
                match long.split_once('=') {
                    Some((name, value)) => {
                        switches.insert(name.to_string(), Switch::Value(value.to_string()))
                    }
                    None => switches.insert(long.to_string(), Switch::Flag(true)),
                };
            } else if let Some(short) = token.strip_prefix('-').filter(|s| !s.is_empty()) {
                for c in short.chars() {
                    switches.insert(c.to_string(), Switch::Flag(true));
                }
            } else {
                args.push(token);
            }
        }

        Self {
            command,
            args,
            switches,
            raw: line.to_string(),
        }
    }

    /// The submitted text as a practice phrase
    pub fn phrase(&self) -> &str {
        self.raw.trim_end_matches(['\r', '\n'])
    }

    pub fn flag(&self, name: &str) -> bool {
        matches!(self.switches.get(name), Some(Switch::Flag(true)))
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        match self.switches.get(name) {
            Some(Switch::Value(v)) => Some(v),
            _ => None,
        }
    }

    pub fn arg(&self, idx: usize) -> Option<&str> {
        self.args.get(idx).map(String::as_str)
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut started = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                started = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if started {
                    tokens.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            c => {
                current.push(c);
                started = true;
            }
        }
    }
    if started {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_and_args() {
        let cmd = ParsedCommand::parse("edit notes/today.md");
        assert_eq!(cmd.command, "edit");
        assert_eq!(cmd.args, vec!["notes/today.md"]);
        assert!(cmd.switches.is_empty());
        assert_eq!(cmd.raw, "edit notes/today.md");
    }

    #[test]
    fn test_parse_switches() {
        let cmd = ParsedCommand::parse("tut --reset --group=home -ab - x");
        assert_eq!(cmd.command, "tut");
        assert!(cmd.flag("reset"));
        assert_eq!(cmd.value("group"), Some("home"));
        assert!(cmd.flag("a"));
        assert!(cmd.flag("b"));
        assert_eq!(cmd.args, vec!["-", "x"]);
        assert!(!cmd.flag("group"));
    }

    #[test]
    fn test_parse_quoted_args() {
        let cmd = ParsedCommand::parse(r#"echo "hello world" """#);
        assert_eq!(cmd.args, vec!["hello world", ""]);
    }

    #[test]
    fn test_parse_blank_line() {
        let cmd = ParsedCommand::parse("   ");
        assert_eq!(cmd.command, "");
        assert!(cmd.args.is_empty());
        assert_eq!(cmd.phrase(), "   ");
    }

    #[test]
    fn test_phrase_strips_line_endings_only() {
        let cmd = ParsedCommand::parse("jkl; \r\n");
        assert_eq!(cmd.phrase(), "jkl; ");
        assert_eq!(cmd.arg(0), None);
    }
}

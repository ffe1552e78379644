use std::fmt;
use std::io::{stderr, stdout, Write};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use humantime::format_rfc3339;
use serde_json::{Map, Value};

pub const LOG_LEVEL_ENV: &str = "OSCAL_LOG_LEVEL";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Level::Trace),
            "debug" => Ok(Level::Debug),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(anyhow!("unsupported log level: {other}")),
        }
    }
}

/// In-memory sink shared by a capturing logger and its clones.
#[derive(Clone, Default)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<Value>>>,
}

impl LogCapture {
    pub fn entries(&self) -> Vec<Value> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.entries()
            .iter()
            .filter_map(|entry| entry.get("message").and_then(Value::as_str))
            .map(str::to_owned)
            .collect()
    }

    fn push(&self, entry: Value) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}

/// JSON-lines logger. Entries carry `level`, `message`, optional `data`,
/// scope `tags` and an RFC 3339 `timestamp`.
#[derive(Clone)]
pub struct Logger {
    min_level: Level,
    tags: Map<String, Value>,
    capture: Option<LogCapture>,
    stderr_only: bool,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new(Level::Info)
    }
}

impl Logger {
    pub fn new(min_level: Level) -> Self {
        Self {
            min_level,
            tags: Map::new(),
            capture: None,
            stderr_only: false,
        }
    }

    pub fn capturing(min_level: Level) -> (Self, LogCapture) {
        let capture = LogCapture::default();
        let logger = Self {
            min_level,
            tags: Map::new(),
            capture: Some(capture.clone()),
            stderr_only: false,
        };
        (logger, capture)
    }

    pub fn min_level(&self) -> Level {
        self.min_level
    }

    /// Returns a logger whose entries carry the given scalar tags in addition
    /// to the current ones. Non-scalar tag values are dropped.
    pub fn with_tags(&self, tags: Value) -> Self {
        let mut merged = self.tags.clone();
        for (key, val) in stable_tags(tags) {
            merged.insert(key, val);
        }
        Self {
            min_level: self.min_level,
            tags: merged,
            capture: self.capture.clone(),
            stderr_only: self.stderr_only,
        }
    }

    /// Sends every entry to stderr, leaving stdout to the program's output.
    pub fn stderr_only(mut self) -> Self {
        self.stderr_only = true;
        self
    }

    fn writes_to_stderr(&self, level: Level) -> bool {
        self.stderr_only || level >= Level::Error
    }

    pub fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }

    pub fn log(&self, level: Level, message: &str, data: Option<Value>) {
        if !self.enabled(level) || message.is_empty() {
            return;
        }
        let mut entry = Map::new();
        entry.insert("level".to_string(), Value::String(level.to_string()));
        entry.insert("message".to_string(), Value::String(message.to_string()));
        if let Some(data) = data {
            if data.is_object() {
                entry.insert("data".to_string(), data);
            }
        }
        if !self.tags.is_empty() {
            entry.insert("tags".to_string(), Value::Object(self.tags.clone()));
        }
        entry.insert("timestamp".to_string(), Value::String(current_timestamp()));

        match &self.capture {
            Some(capture) => capture.push(Value::Object(entry)),
            None => write_entry(self.writes_to_stderr(level), &entry),
        }
    }

    pub fn trace(&self, message: &str, data: Option<Value>) {
        self.log(Level::Trace, message, data);
    }

    pub fn debug(&self, message: &str, data: Option<Value>) {
        self.log(Level::Debug, message, data);
    }

    pub fn info(&self, message: &str, data: Option<Value>) {
        self.log(Level::Info, message, data);
    }

    pub fn warn(&self, message: &str, data: Option<Value>) {
        self.log(Level::Warn, message, data);
    }

    pub fn error(&self, message: &str, data: Option<Value>) {
        self.log(Level::Error, message, data);
    }
}

fn current_timestamp() -> String {
    let now = std::time::SystemTime::now();
    format_rfc3339(now).to_string()
}

fn stable_tags(value: Value) -> Map<String, Value> {
    let mut out = Map::new();
    if let Value::Object(obj) = value {
        for (key, val) in obj {
            match val {
                Value::String(_) | Value::Number(_) | Value::Bool(_) => {
                    out.insert(key, val);
                }
                _ => {}
            }
        }
    }
    out
}

fn write_entry(to_stderr: bool, entry: &Map<String, Value>) {
    if let Ok(serialized) = serde_json::to_string(entry) {
        if to_stderr {
            let _ = writeln!(stderr(), "{}", serialized);
        } else {
            let _ = writeln!(stdout(), "{}", serialized);
        }
    }
}

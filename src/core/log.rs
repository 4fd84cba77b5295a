//! Application logger service.
//!
//! [`Logger`] is the interface registered in the container; [`FileLogger`] appends
//! one line per record to the application log file and mirrors every record as a
//! `tracing` event so it also reaches the diagnostic subscriber.

use std::{
    fmt,
    fs::{self, File, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Log severities, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Notice => "NOTICE",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Alert => "ALERT",
            LogLevel::Emergency => "EMERGENCY",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait Logger: Send + Sync {
    /// Records `message`, replacing `{key}` placeholders with values from `context`.
    fn log(&self, level: LogLevel, message: &str, context: &Value);

    fn debug(&self, message: &str, context: &Value) {
        self.log(LogLevel::Debug, message, context);
    }

    fn info(&self, message: &str, context: &Value) {
        self.log(LogLevel::Info, message, context);
    }

    fn warning(&self, message: &str, context: &Value) {
        self.log(LogLevel::Warning, message, context);
    }

    fn error(&self, message: &str, context: &Value) {
        self.log(LogLevel::Error, message, context);
    }
}

/// Replaces `{key}` with the matching context value. Unknown keys are left as is.
///
/// The template is scanned once, so a value that itself contains `{other}` is
/// inserted verbatim.
pub fn interpolate(message: &str, context: &Value) -> String {
    let Some(fields) = context.as_object() else {
        return message.to_string();
    };
    let mut out = String::with_capacity(message.len());
    let mut rest = message;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let found = after
            .find('}')
            .and_then(|close| fields.get(&after[..close]).map(|value| (close, value)));
        match found {
            Some((close, value)) => {
                match value {
                    Value::String(text) => out.push_str(text),
                    Value::Null => {}
                    other => out.push_str(&other.to_string()),
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Appends formatted records to a file, opened on first write.
pub struct FileLogger {
    path: PathBuf,
    channel: String,
    min_level: LogLevel,
    file: Mutex<Option<File>>,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>, channel: impl Into<String>, min_level: LogLevel) -> Self {
        Self {
            path: path.into(),
            channel: channel.into(),
            min_level,
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `[2026-01-01T00:00:00+00:00] app.ERROR: message {"key":"value"}`
    pub fn format(&self, level: LogLevel, message: &str, context: &Value) -> String {
        let timestamp = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, false);
        let message = interpolate(message, context);
        match context {
            Value::Null => format!("[{timestamp}] {}.{level}: {message}", self.channel),
            Value::Object(fields) if fields.is_empty() => {
                format!("[{timestamp}] {}.{level}: {message}", self.channel)
            }
            _ => format!("[{timestamp}] {}.{level}: {message} {context}", self.channel),
        }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))?;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            *guard = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }
        match guard.as_mut() {
            Some(file) => writeln!(file, "{line}"),
            None => Ok(()),
        }
    }
}

impl Logger for FileLogger {
    fn log(&self, level: LogLevel, message: &str, context: &Value) {
        let rendered = interpolate(message, context);
        match level {
            LogLevel::Debug => tracing::debug!(channel = %self.channel, "{rendered}"),
            LogLevel::Info | LogLevel::Notice => {
                tracing::info!(channel = %self.channel, "{rendered}")
            }
            LogLevel::Warning => tracing::warn!(channel = %self.channel, "{rendered}"),
            _ => tracing::error!(channel = %self.channel, level = %level, "{rendered}"),
        }

        if level < self.min_level {
            return;
        }
        let line = self.format(level, message, context);
        if let Err(err) = self.write_line(&line) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to write log record");
        }
    }
}

impl fmt::Debug for FileLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLogger")
            .field("path", &self.path)
            .field("channel", &self.channel)
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertables::*;
    use serde_json::json;

    #[test]
    fn test_interpolate() {
        let context = json!({"user": "ada", "id": 7, "missing": null});
        assert_eq!(
            interpolate("user {user} (#{id}) {missing}{unknown}", &context),
            "user ada (#7) {unknown}"
        );
        assert_eq!(interpolate("plain {user}", &Value::Null), "plain {user}");
    }

    #[test]
    fn test_interpolated_values_are_not_expanded_again() {
        let context = json!({"message": "bad {path}", "method": "GET", "path": "/x"});
        assert_eq!(
            interpolate("{method} {path} failed: {message}", &context),
            "GET /x failed: bad {path}"
        );
        assert_eq!(interpolate("{{method}} {", &context), "{GET} {");
    }

    #[test]
    fn test_levels_are_ordered() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Warning < LogLevel::Error);
        assert!(LogLevel::Alert < LogLevel::Emergency);
        assert_eq!(LogLevel::Critical.to_string(), "CRITICAL");
    }

    #[test]
    fn test_file_logger_appends_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("app.log");
        let logger = FileLogger::new(&path, "app", LogLevel::Info);

        logger.error("request {path} failed", &json!({"path": "/users"}));
        logger.info("started", &Value::Null);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_contains!(lines[0], "app.ERROR: request /users failed {\"path\":\"/users\"}");
        assert!(lines[1].ends_with("app.INFO: started"));
        assert!(lines[0].starts_with('['));
    }

    #[test]
    fn test_file_logger_drops_records_below_min_level() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let logger = FileLogger::new(&path, "app", LogLevel::Warning);

        logger.debug("noise", &Value::Null);
        assert!(!path.exists());

        logger.warning("kept", &json!({}));
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.trim_end().ends_with("app.WARNING: kept"));
    }
}

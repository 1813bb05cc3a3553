//! Host log records, the bounded ring buffer, and the query model.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Default ring-buffer capacity on both peers.
pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Default result cap applied by [`LogQuery`] when none is given.
pub const DEFAULT_QUERY_COUNT: usize = 100;

/// Log severity with numeric mapping (higher = more severe).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    /// Detailed entry/exit points.
    Trace = 10,
    /// Intermediate values, decisions.
    Debug = 20,
    /// Outcomes, summaries.
    Info = 30,
    /// Non-fatal issues.
    Warn = 40,
    /// Errors.
    Error = 50,
    /// Unrecoverable errors.
    Fatal = 60,
}

impl LogSeverity {
    /// Convert from a tracing level.
    #[must_use]
    pub fn from_tracing(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }

    /// Convert from string (case-insensitive, lossy: unknown → `Info`).
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => Self::Trace,
            "debug" => Self::Debug,
            "warn" | "warning" => Self::Warn,
            "error" => Self::Error,
            "fatal" => Self::Fatal,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
            Self::Fatal => write!(f, "fatal"),
        }
    }
}

/// One host-emitted log event as carried in a `log` envelope.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Log message.
    pub message: String,
    /// Stack trace, when the host attached one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Severity.
    pub severity: LogSeverity,
    /// Event time.
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Build a record stamped now.
    pub fn new(severity: LogSeverity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack_trace: None,
            severity,
            timestamp: Utc::now(),
        }
    }

    /// Attach a stack trace.
    #[must_use]
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

/// Fixed-capacity ring of log records; oldest evicted first.
///
/// Not internally synchronized — callers wrap it in their own mutex, one
/// lock per structure.
#[derive(Debug)]
pub struct LogBuffer {
    records: VecDeque<LogRecord>,
    capacity: usize,
}

impl LogBuffer {
    /// Create a buffer holding at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)),
            capacity: capacity.max(1),
        }
    }

    /// Append a record, evicting the oldest when at capacity.
    pub fn push(&mut self, record: LogRecord) {
        if self.records.len() == self.capacity {
            let _ = self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of the current contents, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.iter().cloned().collect()
    }

    /// Evaluate a query against the current contents.
    #[must_use]
    pub fn query(&self, query: &LogQuery) -> Vec<Value> {
        query.evaluate(self.records.iter())
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Fields a query may project.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogField {
    /// The message text.
    Message,
    /// The stack trace.
    StackTrace,
    /// The severity.
    Severity,
    /// The event time.
    Timestamp,
}

/// Filter, projection, and cap for reading the log buffer.
///
/// The cap applies as "most recent N after filtering", with the survivors
/// returned in original append order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogQuery {
    /// Keep only records with one of these severities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severities: Option<Vec<LogSeverity>>,
    /// Keep only records whose message or stack trace contains this text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Keep only records at or after this time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Keep only records at or before this time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Project each result down to these fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<LogField>>,
    /// Result cap; [`DEFAULT_QUERY_COUNT`] when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

impl LogQuery {
    fn matches(&self, record: &LogRecord) -> bool {
        if let Some(severities) = &self.severities {
            if !severities.contains(&record.severity) {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let in_message = record.message.contains(text.as_str());
            let in_stack = record
                .stack_trace
                .as_deref()
                .is_some_and(|s| s.contains(text.as_str()));
            if !in_message && !in_stack {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp > until {
                return false;
            }
        }
        true
    }

    fn project(&self, record: &LogRecord) -> Value {
        match &self.fields {
            None => serde_json::to_value(record).unwrap_or(Value::Null),
            Some(fields) => {
                let mut out = serde_json::Map::new();
                for field in fields {
                    let (key, value) = match field {
                        LogField::Message => ("message", json!(record.message)),
                        LogField::StackTrace => ("stackTrace", json!(record.stack_trace)),
                        LogField::Severity => ("severity", json!(record.severity)),
                        LogField::Timestamp => ("timestamp", json!(record.timestamp)),
                    };
                    let _ = out.insert(key.to_owned(), value);
                }
                Value::Object(out)
            }
        }
    }

    /// Run the query over records in append order.
    pub fn evaluate<'a>(&self, records: impl Iterator<Item = &'a LogRecord>) -> Vec<Value> {
        let filtered: Vec<&LogRecord> = records.filter(|r| self.matches(r)).collect();
        let cap = self.count.unwrap_or(DEFAULT_QUERY_COUNT);
        let start = filtered.len().saturating_sub(cap);
        filtered[start..].iter().map(|r| self.project(r)).collect()
    }
}

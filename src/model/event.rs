//! Stored events: the append-only timeline record.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OverstoryError, Result};

// ---------------------------------------------------------------------------
// EventType
// ---------------------------------------------------------------------------

/// Kind of a stored event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A tool invocation began.
    ToolStart,
    /// A tool invocation finished.
    ToolEnd,
    /// An agent session started.
    SessionStart,
    /// An agent session ended.
    SessionEnd,
    /// Mail was sent.
    MailSent,
    /// Mail was checked and delivered.
    MailReceived,
    /// An agent was spawned.
    Spawn,
    /// Something went wrong.
    Error,
    /// Project-defined event.
    Custom,
}

impl EventType {
    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ToolStart => "tool_start",
            Self::ToolEnd => "tool_end",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
            Self::MailSent => "mail_sent",
            Self::MailReceived => "mail_received",
            Self::Spawn => "spawn",
            Self::Error => "error",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tool_start" => Ok(Self::ToolStart),
            "tool_end" => Ok(Self::ToolEnd),
            "session_start" => Ok(Self::SessionStart),
            "session_end" => Ok(Self::SessionEnd),
            "mail_sent" => Ok(Self::MailSent),
            "mail_received" => Ok(Self::MailReceived),
            "spawn" => Ok(Self::Spawn),
            "error" => Ok(Self::Error),
            "custom" => Ok(Self::Custom),
            other => Err(OverstoryError::validation(
                "event type",
                other,
                "expected one of: tool_start, tool_end, session_start, session_end, mail_sent, mail_received, spawn, error, custom",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// EventLevel
// ---------------------------------------------------------------------------

/// Severity of a stored event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    /// Routine.
    Info,
    /// Unexpected but recoverable.
    Warn,
    /// A failure.
    Error,
}

impl EventLevel {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventLevel {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(OverstoryError::validation(
                "event level",
                other,
                "expected one of: info, warn, error",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// StoredEvent
// ---------------------------------------------------------------------------

/// One record in the append-only event log.
///
/// `id` and `created_at` are assigned by the store at insert time; the values
/// on an un-inserted draft are placeholders.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct StoredEvent {
    /// Store-assigned autoincrement id.
    pub id: i64,
    /// Run the event belongs to, if a run was active.
    pub run_id: Option<String>,
    /// The agent the event concerns.
    pub agent_name: String,
    /// Session id, when known.
    pub session_id: Option<String>,
    /// Event kind.
    pub event_type: EventType,
    /// Tool name, for tool events.
    pub tool_name: Option<String>,
    /// Tool arguments, JSON-encoded, for tool events.
    pub tool_args: Option<String>,
    /// Tool wall-clock duration, for `tool_end` events.
    pub tool_duration_ms: Option<u64>,
    /// Severity.
    pub level: EventLevel,
    /// Opaque JSON payload.
    pub data: Option<String>,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Draft an event for insertion. Store-assigned fields are placeholders.
    #[must_use]
    pub fn new(agent_name: impl Into<String>, event_type: EventType) -> Self {
        Self {
            id: 0,
            run_id: None,
            agent_name: agent_name.into(),
            session_id: None,
            event_type,
            tool_name: None,
            tool_args: None,
            tool_duration_ms: None,
            level: EventLevel::Info,
            data: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a run id.
    #[must_use]
    pub fn with_run(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    /// Attach a session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the severity.
    #[must_use]
    pub const fn with_level(mut self, level: EventLevel) -> Self {
        self.level = level;
        self
    }

    /// Attach an opaque JSON payload.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Attach tool metadata.
    #[must_use]
    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        args: Option<String>,
        duration_ms: Option<u64>,
    ) -> Self {
        self.tool_name = Some(name.into());
        self.tool_args = args;
        self.tool_duration_ms = duration_ms;
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_roundtrip() {
        for et in [
            EventType::ToolStart,
            EventType::ToolEnd,
            EventType::SessionStart,
            EventType::SessionEnd,
            EventType::MailSent,
            EventType::MailReceived,
            EventType::Spawn,
            EventType::Error,
            EventType::Custom,
        ] {
            assert_eq!(et.as_str().parse::<EventType>().unwrap(), et);
        }
    }

    #[test]
    fn event_level_roundtrip() {
        for level in [EventLevel::Info, EventLevel::Warn, EventLevel::Error] {
            assert_eq!(level.as_str().parse::<EventLevel>().unwrap(), level);
        }
    }

    #[test]
    fn draft_defaults() {
        let e = StoredEvent::new("alice", EventType::Spawn);
        assert_eq!(e.id, 0);
        assert_eq!(e.agent_name, "alice");
        assert_eq!(e.level, EventLevel::Info);
        assert!(e.run_id.is_none());
        assert!(e.tool_name.is_none());
    }

    #[test]
    fn draft_builders_compose() {
        let e = StoredEvent::new("bob", EventType::ToolEnd)
            .with_run(Some("run-1".to_owned()))
            .with_session("sess-9")
            .with_level(EventLevel::Warn)
            .with_tool("Bash", Some("{\"cmd\":\"ls\"}".to_owned()), Some(42))
            .with_data("{\"exit\":0}");
        assert_eq!(e.run_id.as_deref(), Some("run-1"));
        assert_eq!(e.session_id.as_deref(), Some("sess-9"));
        assert_eq!(e.level, EventLevel::Warn);
        assert_eq!(e.tool_name.as_deref(), Some("Bash"));
        assert_eq!(e.tool_duration_ms, Some(42));
        assert_eq!(e.data.as_deref(), Some("{\"exit\":0}"));
    }
}

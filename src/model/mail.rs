//! Mail messages: types, priorities, and the nudge trigger rule.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OverstoryError, Result};

// ---------------------------------------------------------------------------
// MessageType
// ---------------------------------------------------------------------------

/// Semantic kind of a mail message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Routine progress report.
    Status,
    /// Asks the recipient to do something.
    Request,
    /// Initial task assignment written at spawn time.
    Dispatch,
    /// A worker finished its task.
    WorkerDone,
    /// A branch is ready for the merge queue.
    MergeReady,
    /// Something went wrong.
    Error,
    /// Needs attention above the normal flow.
    Escalation,
    /// A merge attempt failed.
    MergeFailed,
}

impl MessageType {
    /// Canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Request => "request",
            Self::Dispatch => "dispatch",
            Self::WorkerDone => "worker_done",
            Self::MergeReady => "merge_ready",
            Self::Error => "error",
            Self::Escalation => "escalation",
            Self::MergeFailed => "merge_failed",
        }
    }

    /// Message types that are urgent by nature, independent of priority.
    #[must_use]
    pub const fn is_urgent(self) -> bool {
        matches!(
            self,
            Self::WorkerDone | Self::MergeReady | Self::Error | Self::Escalation | Self::MergeFailed
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "status" => Ok(Self::Status),
            "request" => Ok(Self::Request),
            "dispatch" => Ok(Self::Dispatch),
            "worker_done" => Ok(Self::WorkerDone),
            "merge_ready" => Ok(Self::MergeReady),
            "error" => Ok(Self::Error),
            "escalation" => Ok(Self::Escalation),
            "merge_failed" => Ok(Self::MergeFailed),
            other => Err(OverstoryError::validation(
                "message type",
                other,
                "expected one of: status, request, dispatch, worker_done, merge_ready, error, escalation, merge_failed",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Delivery priority of a mail message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background information.
    Low,
    /// Default.
    Normal,
    /// Should be read soon.
    High,
    /// Should interrupt whatever the recipient is doing next.
    Urgent,
}

impl Priority {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    /// High and urgent priorities trigger a pending nudge.
    #[must_use]
    pub const fn is_urgent(self) -> bool {
        matches!(self, Self::High | Self::Urgent)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = OverstoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            other => Err(OverstoryError::validation(
                "priority",
                other,
                "expected one of: low, normal, high, urgent",
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// MailMessage
// ---------------------------------------------------------------------------

/// A durable inter-agent message.
///
/// The payload is opaque JSON, stored as text and decoded only by consumers
/// that know the shape for the given message type.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct MailMessage {
    /// Store-assigned id.
    pub id: i64,
    /// Sending agent name.
    pub from: String,
    /// Receiving agent name (group addresses are expanded before insert).
    pub to: String,
    /// One-line summary.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Semantic kind.
    pub message_type: MessageType,
    /// Delivery priority.
    pub priority: Priority,
    /// Id of the message this one replies to, for threading.
    pub thread_id: Option<i64>,
    /// Optional structured payload, JSON-encoded.
    pub payload: Option<String>,
    /// Whether the recipient has checked this message.
    pub read: bool,
    /// Insertion time; delivery order per recipient follows it.
    pub created_at: DateTime<Utc>,
}

/// Whether sending a message with this type/priority leaves a pending nudge
/// for the recipient.
#[must_use]
pub const fn triggers_nudge(message_type: MessageType, priority: Priority) -> bool {
    message_type.is_urgent() || priority.is_urgent()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

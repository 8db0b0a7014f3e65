//! Mail client: durable inter-agent messaging.
//!
//! Wraps the mail store with group/broadcast addressing, reply semantics,
//! the urgent-message nudge flow, and the inbox-injection rendering used by
//! agent hooks. Event recording is fire-and-forget: a mail that lands is
//! never failed retroactively because the event log was unavailable.

pub mod groups;
pub mod nudge;

pub use groups::{GroupAddress, is_group_address, parse_group, resolve_recipients};
pub use nudge::{NudgeMarker, has_pending_nudge, last_nudge_time, take_nudge, write_nudge};

use chrono::Utc;

use crate::error::{OverstoryError, Result};
use crate::model::{
    EventType, MailMessage, MessageType, Priority, StoredEvent, format_ts, triggers_nudge,
};
use crate::paths::StatePaths;
use crate::store::mail::MailDraft;
use crate::store::{EventStore, MailFilter, MailStore, PurgeFilter, SessionStore};

// ---------------------------------------------------------------------------
// Requests and outcomes
// ---------------------------------------------------------------------------

/// Parameters for sending a message.
#[derive(Clone, Debug)]
pub struct SendRequest {
    /// Sending agent.
    pub from: String,
    /// Recipient agent name or group address.
    pub to: String,
    /// One-line summary.
    pub subject: String,
    /// Message body.
    pub body: String,
    /// Semantic kind.
    pub message_type: MessageType,
    /// Delivery priority.
    pub priority: Priority,
    /// Optional JSON payload.
    pub payload: Option<String>,
}

/// Result of a send: one inserted id per resolved recipient.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendOutcome {
    /// Inserted message ids, one per recipient.
    pub ids: Vec<i64>,
    /// Number of recipients the address resolved to.
    pub recipient_count: usize,
}

// ---------------------------------------------------------------------------
// MailClient
// ---------------------------------------------------------------------------

/// The mail subsystem facade used by commands and hooks.
pub struct MailClient {
    store: MailStore,
    sessions: SessionStore,
    events: EventStore,
    paths: StatePaths,
}

impl MailClient {
    /// Open the mail, session, and event stores for a project.
    ///
    /// # Errors
    /// Returns a store error when any database cannot be opened.
    pub fn open(paths: &StatePaths) -> Result<Self> {
        Ok(Self {
            store: MailStore::open(&paths.mail_db())?,
            sessions: SessionStore::open(&paths.sessions_db())?,
            events: EventStore::open(&paths.events_db())?,
            paths: paths.clone(),
        })
    }

    /// Close all held stores.
    pub fn close(self) {
        self.store.close();
        self.sessions.close();
        self.events.close();
    }

    /// Send a message to an agent or group.
    ///
    /// Group addresses fan out one row per resolved recipient, excluding the
    /// sender. Urgent sends leave a pending-nudge marker per recipient. A
    /// group resolving to nobody sends nothing and reports count 0.
    ///
    /// # Errors
    /// Fails on malformed group addresses or store errors; event recording
    /// failures are swallowed.
    pub fn send(&mut self, request: &SendRequest) -> Result<SendOutcome> {
        if request.from.is_empty() {
            return Err(OverstoryError::mail("sender must be non-empty"));
        }
        let active = self.sessions.get_active()?;
        let recipients = resolve_recipients(&request.to, &request.from, &active)?;

        let mut ids = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let id = self.store.insert(&MailDraft {
                from: request.from.clone(),
                to: recipient.clone(),
                subject: request.subject.clone(),
                body: request.body.clone(),
                message_type: request.message_type,
                priority: request.priority,
                thread_id: None,
                payload: request.payload.clone(),
            })?;
            ids.push(id);

            if triggers_nudge(request.message_type, request.priority) {
                let marker = NudgeMarker {
                    from: request.from.clone(),
                    subject: request.subject.clone(),
                    message_type: request.message_type,
                    priority: request.priority,
                    created_at: Utc::now(),
                };
                if let Err(err) = write_nudge(&self.paths, recipient, &marker) {
                    tracing::warn!(recipient, %err, "could not write nudge marker");
                }
            }

            self.record_event(
                EventType::MailSent,
                &request.from,
                format!(
                    "{{\"to\":{},\"subject\":{},\"type\":\"{}\"}}",
                    serde_json::to_string(recipient).unwrap_or_default(),
                    serde_json::to_string(&request.subject).unwrap_or_default(),
                    request.message_type
                ),
            );
        }

        Ok(SendOutcome {
            recipient_count: ids.len(),
            ids,
        })
    }

    /// Unread mail for an agent, atomically marked read.
    ///
    /// # Errors
    /// Returns a store error on failure.
    pub fn check(&mut self, agent: &str) -> Result<Vec<MailMessage>> {
        let messages = self.store.take_unread(agent)?;
        if !messages.is_empty() {
            self.record_event(
                EventType::MailReceived,
                agent,
                format!("{{\"count\":{}}}", messages.len()),
            );
        }
        Ok(messages)
    }

    /// Render the agent's unread mail as a block suitable for prepending to
    /// an LLM prompt, draining any pending-nudge marker into a priority
    /// banner. Returns an empty string when there is nothing to show.
    ///
    /// # Errors
    /// Returns a store error on failure.
    pub fn check_inject(&mut self, agent: &str) -> Result<String> {
        let banner = take_nudge(&self.paths, agent).map(|marker| marker.banner());
        let messages = self.check(agent)?;

        if messages.is_empty() && banner.is_none() {
            return Ok(String::new());
        }

        let mut out = String::new();
        if let Some(banner) = banner {
            out.push_str(&banner);
            out.push_str("\n\n");
        }
        out.push_str(&format!(
            "=== OVERSTORY INBOX: {} unread message(s) ===\n",
            messages.len()
        ));
        for (i, message) in messages.iter().enumerate() {
            out.push_str(&format!(
                "\n--- message {}/{} ---\n",
                i + 1,
                messages.len()
            ));
            out.push_str(&format!(
                "from: {}  type: {}  priority: {}  at: {}\n",
                message.from,
                message.message_type,
                message.priority,
                format_ts(message.created_at)
            ));
            out.push_str(&format!("subject: {}\n", message.subject));
            out.push_str(&message.body);
            if !message.body.ends_with('\n') {
                out.push('\n');
            }
            if let Some(payload) = &message.payload {
                out.push_str(&format!("payload: {payload}\n"));
            }
        }
        out.push_str("=== END INBOX (reply with `ov mail send`) ===\n");
        Ok(out)
    }

    /// List messages matching a filter.
    ///
    /// # Errors
    /// Returns a store error on failure.
    pub fn list(&self, filter: &MailFilter) -> Result<Vec<MailMessage>> {
        self.store.list(filter)
    }

    /// Mark one message read. Returns `false` when it was already read.
    ///
    /// # Errors
    /// Fails when the message does not exist.
    pub fn mark_read(&self, id: i64) -> Result<bool> {
        self.store.mark_read(id)
    }

    /// Reply to a message.
    ///
    /// The reply goes back to the original sender — unless the replier *is*
    /// the original sender (replying to their own message), in which case it
    /// goes to the original recipient. The subject gains a `Re: ` prefix
    /// exactly once.
    ///
    /// # Errors
    /// Fails when the original message does not exist.
    pub fn reply(&mut self, id: i64, body: &str, from: &str) -> Result<i64> {
        let Some(original) = self.store.get(id)? else {
            return Err(OverstoryError::mail(format!("no message with id {id}")));
        };
        let to = if from == original.from {
            original.to.clone()
        } else {
            original.from.clone()
        };
        let subject = if original.subject.starts_with("Re: ") {
            original.subject.clone()
        } else {
            format!("Re: {}", original.subject)
        };
        let reply_id = self.store.insert(&MailDraft {
            from: from.to_owned(),
            to,
            subject,
            body: body.to_owned(),
            message_type: original.message_type,
            priority: Priority::Normal,
            thread_id: Some(original.id),
            payload: None,
        })?;
        Ok(reply_id)
    }

    /// Bulk-delete messages.
    ///
    /// # Errors
    /// Rejects an empty filter.
    pub fn purge(&self, filter: &PurgeFilter) -> Result<usize> {
        self.store.purge(filter)
    }

    /// Record a mail event, swallowing failures.
    fn record_event(&self, event_type: EventType, agent: &str, data: String) {
        let draft = StoredEvent::new(agent, event_type).with_data(data);
        if let Err(err) = self.events.insert(&draft) {
            tracing::debug!(%err, "mail event not recorded");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

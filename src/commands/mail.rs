//! `ov mail` — send, check, list, reply, purge.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use crate::hooks::check_inject_with_debounce;
use crate::mail::{MailClient, SendRequest};
use crate::model::{MessageType, Priority, format_ts};
use crate::store::{MailFilter, PurgeFilter};

use super::load_context;

/// Inter-agent mail
#[derive(Subcommand, Debug)]
pub enum MailCommands {
    /// Send a message to an agent or group
    ///
    /// Groups: all, group:<name>, or a capability plural (builders,
    /// scouts, ...). Broadcasts insert one message per resolved recipient
    /// and report the count.
    Send(SendArgs),

    /// Check unread mail (marks it read)
    Check(CheckArgs),

    /// List messages
    List(ListArgs),

    /// Mark one message read
    MarkRead {
        /// Message id
        id: i64,
    },

    /// Reply to a message
    Reply(ReplyArgs),

    /// Bulk-delete messages
    Purge(PurgeArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Recipient agent or group address
    #[arg(long)]
    pub to: String,

    /// One-line subject
    #[arg(long)]
    pub subject: String,

    /// Message body
    #[arg(long)]
    pub body: String,

    /// Sending agent (default: orchestrator, or $OVERSTORY_AGENT_NAME)
    #[arg(long, env = "OVERSTORY_AGENT_NAME", default_value = "orchestrator")]
    pub from: String,

    /// Message type
    #[arg(long = "type", default_value = "status")]
    pub message_type: MessageType,

    /// Priority
    #[arg(long, default_value = "normal")]
    pub priority: Priority,

    /// Structured JSON payload
    #[arg(long)]
    pub payload: Option<String>,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Agent whose inbox to check
    #[arg(long, env = "OVERSTORY_AGENT_NAME")]
    pub agent: String,

    /// Render for prompt injection (banner + inbox block)
    #[arg(long)]
    pub inject: bool,

    /// Debounce window for --inject, in milliseconds (0 disables)
    #[arg(long, default_value_t = 0)]
    pub debounce_ms: u64,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only messages from this agent
    #[arg(long)]
    pub from: Option<String>,

    /// Only messages to this agent
    #[arg(long)]
    pub to: Option<String>,

    /// Only unread messages
    #[arg(long)]
    pub unread: bool,

    /// Maximum rows
    #[arg(long)]
    pub limit: Option<u32>,

    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ReplyArgs {
    /// Message id to reply to
    pub id: i64,

    /// Reply body
    #[arg(long)]
    pub body: String,

    /// Replying agent
    #[arg(long, env = "OVERSTORY_AGENT_NAME", default_value = "orchestrator")]
    pub from: String,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Delete everything
    #[arg(long)]
    pub all: bool,

    /// Delete messages older than this many milliseconds
    #[arg(long)]
    pub older_than_ms: Option<u64>,

    /// Delete messages to or from this agent
    #[arg(long)]
    pub agent: Option<String>,
}

pub fn run(command: &MailCommands) -> Result<()> {
    let ctx = load_context()?;
    match command {
        MailCommands::Send(args) => {
            if let Some(payload) = &args.payload {
                if serde_json::from_str::<serde_json::Value>(payload).is_err() {
                    bail!("--payload must be valid JSON");
                }
            }
            let mut client = MailClient::open(&ctx.paths)?;
            let outcome = client.send(&SendRequest {
                from: args.from.clone(),
                to: args.to.clone(),
                subject: args.subject.clone(),
                body: args.body.clone(),
                message_type: args.message_type,
                priority: args.priority,
                payload: args.payload.clone(),
            })?;
            client.close();
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "recipientCount": outcome.recipient_count,
                        "ids": outcome.ids,
                    })
                );
            } else {
                println!(
                    "sent to {} recipient(s): ids {:?}",
                    outcome.recipient_count, outcome.ids
                );
            }
        }
        MailCommands::Check(args) => {
            if args.inject {
                let block = check_inject_with_debounce(&ctx.paths, &args.agent, args.debounce_ms)?;
                print!("{block}");
            } else {
                let mut client = MailClient::open(&ctx.paths)?;
                let messages = client.check(&args.agent)?;
                client.close();
                if messages.is_empty() {
                    println!("no unread mail for {}", args.agent);
                }
                for message in messages {
                    println!(
                        "[{}] {} {} from {}: {}",
                        message.id,
                        format_ts(message.created_at),
                        message.message_type,
                        message.from,
                        message.subject
                    );
                    println!("{}", message.body);
                }
            }
        }
        MailCommands::List(args) => {
            let client = MailClient::open(&ctx.paths)?;
            let messages = client.list(&MailFilter {
                from: args.from.clone(),
                to: args.to.clone(),
                unread_only: args.unread,
                limit: args.limit,
            })?;
            client.close();
            if args.json {
                println!("{}", serde_json::to_string_pretty(&messages)?);
            } else {
                for message in &messages {
                    let flag = if message.read { " " } else { "*" };
                    println!(
                        "{flag}[{}] {} -> {} ({}/{}): {}",
                        message.id,
                        message.from,
                        message.to,
                        message.message_type,
                        message.priority,
                        message.subject
                    );
                }
                println!("{} message(s)", messages.len());
            }
        }
        MailCommands::MarkRead { id } => {
            let client = MailClient::open(&ctx.paths)?;
            let flipped = client.mark_read(*id)?;
            client.close();
            if flipped {
                println!("message {id} marked read");
            } else {
                println!("message {id} was already read");
            }
        }
        MailCommands::Reply(args) => {
            let mut client = MailClient::open(&ctx.paths)?;
            let id = client.reply(args.id, &args.body, &args.from)?;
            client.close();
            println!("reply sent as message {id}");
        }
        MailCommands::Purge(args) => {
            let client = MailClient::open(&ctx.paths)?;
            let deleted = client.purge(&PurgeFilter {
                all: args.all,
                older_than_ms: args.older_than_ms,
                agent: args.agent.clone(),
            })?;
            client.close();
            println!("purged {deleted} message(s)");
        }
    }
    Ok(())
}

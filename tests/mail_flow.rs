//! Mail subsystem flows: broadcast fan-out, nudge markers, inbox
//! injection, reply semantics.

mod common;

use common::TestProject;

use overstory::mail::{MailClient, SendRequest, has_pending_nudge};
use overstory::model::{AgentSession, Capability, MessageType, Priority};
use overstory::store::{MailFilter, SessionStore};
use std::path::PathBuf;

fn register(project: &TestProject, name: &str, capability: Capability) {
    let store = SessionStore::open(&project.paths.sessions_db()).unwrap();
    let session = AgentSession::new(
        name,
        capability,
        PathBuf::from(format!("/wt/{name}")),
        format!("overstory/{name}/t-1"),
        format!("t-{name}"),
        format!("overstory-testproj-{name}"),
        Some("lead-1".to_owned()),
        1,
        None,
    );
    store.upsert(&session).unwrap();
    store.close();
}

fn send(
    client: &mut MailClient,
    from: &str,
    to: &str,
    message_type: MessageType,
    priority: Priority,
) -> overstory::mail::SendOutcome {
    client
        .send(&SendRequest {
            from: from.to_owned(),
            to: to.to_owned(),
            subject: "s".to_owned(),
            body: "b".to_owned(),
            message_type,
            priority,
            payload: None,
        })
        .unwrap()
}

#[test]
fn broadcast_to_builders_reaches_exactly_the_builders() {
    let project = TestProject::new();
    register(&project, "lead-1", Capability::Lead);
    register(&project, "builder-a", Capability::Builder);
    register(&project, "builder-b", Capability::Builder);

    let mut client = MailClient::open(&project.paths).unwrap();
    let outcome = send(
        &mut client,
        "lead-1",
        "builders",
        MessageType::Request,
        Priority::Normal,
    );
    assert_eq!(outcome.recipient_count, 2);
    assert_eq!(outcome.ids.len(), 2);

    let rows = client
        .list(&MailFilter {
            from: Some("lead-1".to_owned()),
            ..MailFilter::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 2);
    let mut recipients: Vec<_> = rows.iter().map(|m| m.to.clone()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["builder-a", "builder-b"]);
}

#[test]
fn broadcast_to_empty_group_sends_zero() {
    let project = TestProject::new();
    register(&project, "lead-1", Capability::Lead);

    let mut client = MailClient::open(&project.paths).unwrap();
    let outcome = send(
        &mut client,
        "lead-1",
        "scouts",
        MessageType::Request,
        Priority::Normal,
    );
    assert_eq!(outcome.recipient_count, 0);
    assert!(client.list(&MailFilter::default()).unwrap().is_empty());
}

#[test]
fn urgent_mail_leaves_marker_consumed_by_inject() {
    let project = TestProject::new();
    register(&project, "lead-1", Capability::Lead);
    register(&project, "builder-a", Capability::Builder);

    let mut client = MailClient::open(&project.paths).unwrap();
    send(
        &mut client,
        "builder-a",
        "lead-1",
        MessageType::WorkerDone,
        Priority::Normal,
    );
    assert!(has_pending_nudge(&project.paths, "lead-1"));

    let block = client.check_inject("lead-1").unwrap();
    assert!(block.contains("[PRIORITY]"), "banner expected: {block}");
    assert!(block.contains("worker_done"));
    assert!(!has_pending_nudge(&project.paths, "lead-1"));

    // Nothing left: subsequent inject is empty.
    assert!(client.check_inject("lead-1").unwrap().is_empty());
}

#[test]
fn per_recipient_delivery_order_is_insertion_order() {
    let project = TestProject::new();
    let mut client = MailClient::open(&project.paths).unwrap();
    for i in 0..5 {
        client
            .send(&SendRequest {
                from: "orchestrator".to_owned(),
                to: "builder-a".to_owned(),
                subject: format!("message {i}"),
                body: String::new(),
                message_type: MessageType::Status,
                priority: Priority::Normal,
                payload: None,
            })
            .unwrap();
    }
    let delivered = client.check("builder-a").unwrap();
    let subjects: Vec<_> = delivered.iter().map(|m| m.subject.clone()).collect();
    assert_eq!(
        subjects,
        (0..5).map(|i| format!("message {i}")).collect::<Vec<_>>()
    );
    let mut ids: Vec<_> = delivered.iter().map(|m| m.id).collect();
    let sorted = {
        let mut s = ids.clone();
        s.sort_unstable();
        s
    };
    assert_eq!(ids, sorted);
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

#[test]
fn mark_read_twice_signals_already_read() {
    let project = TestProject::new();
    let mut client = MailClient::open(&project.paths).unwrap();
    let outcome = send(
        &mut client,
        "a",
        "b",
        MessageType::Status,
        Priority::Normal,
    );
    let id = outcome.ids[0];
    assert!(client.mark_read(id).unwrap());
    assert!(!client.mark_read(id).unwrap(), "second mark is a no-op");
}

#[test]
fn reply_routes_to_sender_and_prefixes_once() {
    let project = TestProject::new();
    let mut client = MailClient::open(&project.paths).unwrap();
    let outcome = send(
        &mut client,
        "lead-1",
        "builder-a",
        MessageType::Request,
        Priority::Normal,
    );

    let reply_id = client.reply(outcome.ids[0], "done", "builder-a").unwrap();
    let rows = client
        .list(&MailFilter {
            to: Some("lead-1".to_owned()),
            ..MailFilter::default()
        })
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, reply_id);
    assert_eq!(rows[0].subject, "Re: s");
    assert_eq!(rows[0].thread_id, Some(outcome.ids[0]));

    // Replying to the reply keeps a single prefix.
    let second = client.reply(reply_id, "ok", "lead-1").unwrap();
    let back = client
        .list(&MailFilter {
            to: Some("builder-a".to_owned()),
            unread_only: true,
            ..MailFilter::default()
        })
        .unwrap();
    assert!(back.iter().any(|m| m.id == second && m.subject == "Re: s"));
}

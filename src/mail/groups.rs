//! Group and broadcast addressing.
//!
//! An address is a group when it matches one of the recognized forms:
//!
//! - `all` — every active agent
//! - `group:<name>` — where `<name>` is `all`, a capability, or a
//!   capability plural
//! - a capability plural: `leads`, `builders`, `scouts`, `reviewers`,
//!   `mergers`, `coordinators`, `monitors`, `customs`
//!
//! That is the exact accepted set. The plural form would collide with any
//! capability whose name itself ends in `s`; none of the built-in
//! capabilities do, and the ambiguity is accepted for custom ones.
//!
//! Resolution expands the group against the active session set and removes
//! the sender. A group resolving to nobody is not an error — the broadcast
//! simply sends zero messages.

use crate::error::{OverstoryError, Result};
use crate::model::{AgentSession, Capability};

// ---------------------------------------------------------------------------
// GroupAddress
// ---------------------------------------------------------------------------

/// A parsed group address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupAddress {
    /// Every active agent.
    All,
    /// Every active agent with one capability.
    Capability(Capability),
}

/// Whether an address uses one of the recognized group forms.
///
/// `group:`-prefixed addresses count as group syntax even when the name
/// inside is unknown; resolution reports those as errors rather than
/// silently treating them as an agent name.
#[must_use]
pub fn is_group_address(address: &str) -> bool {
    if address == "all" || address.starts_with("group:") {
        return true;
    }
    Capability::ALL.iter().any(|c| c.plural() == address)
}

/// Parse a group address.
///
/// # Errors
/// Returns a [`OverstoryError::Group`] for `group:`-prefixed addresses whose
/// name is not recognized. Non-group addresses return `Ok(None)`.
pub fn parse_group(address: &str) -> Result<Option<GroupAddress>> {
    if address == "all" {
        return Ok(Some(GroupAddress::All));
    }
    if let Some(name) = address.strip_prefix("group:") {
        if name == "all" {
            return Ok(Some(GroupAddress::All));
        }
        if let Some(cap) = capability_for(name) {
            return Ok(Some(GroupAddress::Capability(cap)));
        }
        return Err(OverstoryError::Group {
            address: address.to_owned(),
            detail: format!("'{name}' is not a capability or capability plural"),
        });
    }
    if let Some(cap) = Capability::ALL
        .iter()
        .find(|c| c.plural() == address)
        .copied()
    {
        return Ok(Some(GroupAddress::Capability(cap)));
    }
    Ok(None)
}

/// Match a `group:` name against capabilities, singular or plural.
fn capability_for(name: &str) -> Option<Capability> {
    Capability::ALL
        .iter()
        .find(|c| c.as_str() == name || c.plural() == name)
        .copied()
}

/// Expand an address into concrete recipient names.
///
/// Individual addresses pass through as a single recipient. Group addresses
/// expand against `active` sessions with the sender removed; duplicates are
/// impossible because active names are unique.
///
/// # Errors
/// Returns a [`OverstoryError::Group`] for malformed `group:` addresses.
pub fn resolve_recipients(
    address: &str,
    sender: &str,
    active: &[AgentSession],
) -> Result<Vec<String>> {
    let Some(group) = parse_group(address)? else {
        return Ok(vec![address.to_owned()]);
    };
    let recipients = active
        .iter()
        .filter(|s| match group {
            GroupAddress::All => true,
            GroupAddress::Capability(cap) => s.capability == cap,
        })
        .map(|s| s.agent_name.clone())
        .filter(|name| name != sender)
        .collect();
    Ok(recipients)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn session(name: &str, capability: Capability) -> AgentSession {
        AgentSession::new(
            name,
            capability,
            PathBuf::from(format!("/wt/{name}")),
            format!("overstory/{name}/t-1"),
            "t-1",
            format!("overstory-proj-{name}"),
            Some("lead".to_owned()),
            1,
            None,
        )
    }

    // -- grammar --

    #[test]
    fn recognized_group_forms() {
        for addr in [
            "all",
            "group:builders",
            "group:builder",
            "group:all",
            "leads",
            "builders",
            "scouts",
            "reviewers",
            "mergers",
            "coordinators",
            "monitors",
            "customs",
        ] {
            assert!(is_group_address(addr), "'{addr}' should be a group");
        }
    }

    #[test]
    fn individual_addresses_are_not_groups() {
        for addr in ["alice", "builder", "scout", "lead-1", "allstar"] {
            assert!(!is_group_address(addr), "'{addr}' should not be a group");
        }
    }

    #[test]
    fn parse_group_maps_plurals() {
        assert_eq!(
            parse_group("builders").unwrap(),
            Some(GroupAddress::Capability(Capability::Builder))
        );
        assert_eq!(parse_group("all").unwrap(), Some(GroupAddress::All));
        assert_eq!(parse_group("group:all").unwrap(), Some(GroupAddress::All));
        assert_eq!(
            parse_group("group:scout").unwrap(),
            Some(GroupAddress::Capability(Capability::Scout))
        );
        assert_eq!(parse_group("alice").unwrap(), None);
    }

    #[test]
    fn parse_group_rejects_unknown_named_group() {
        let err = parse_group("group:wizards").unwrap_err();
        assert_eq!(err.code(), "GROUP");
        assert!(format!("{err}").contains("wizards"));
    }

    // -- resolution --

    #[test]
    fn broadcast_to_builders_excludes_sender() {
        let active = vec![
            session("lead-1", Capability::Lead),
            session("b1", Capability::Builder),
            session("b2", Capability::Builder),
        ];
        let recipients = resolve_recipients("builders", "b1", &active).unwrap();
        assert_eq!(recipients, vec!["b2".to_owned()]);
    }

    #[test]
    fn broadcast_all_reaches_everyone_but_sender() {
        let active = vec![
            session("lead-1", Capability::Lead),
            session("b1", Capability::Builder),
            session("s1", Capability::Scout),
        ];
        let recipients = resolve_recipients("all", "lead-1", &active).unwrap();
        assert_eq!(recipients, vec!["b1".to_owned(), "s1".to_owned()]);
    }

    #[test]
    fn empty_group_resolves_to_nobody() {
        let active = vec![session("b1", Capability::Builder)];
        let recipients = resolve_recipients("scouts", "b1", &active).unwrap();
        assert!(recipients.is_empty());
    }

    #[test]
    fn individual_address_passes_through() {
        let recipients = resolve_recipients("alice", "bob", &[]).unwrap();
        assert_eq!(recipients, vec!["alice".to_owned()]);
    }

    #[test]
    fn sender_not_in_group_gets_full_expansion() {
        let active = vec![
            session("b1", Capability::Builder),
            session("b2", Capability::Builder),
        ];
        let recipients = resolve_recipients("builders", "orchestrator", &active).unwrap();
        assert_eq!(recipients.len(), 2);
    }
}

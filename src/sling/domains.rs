//! Knowledge-domain inference.
//!
//! Maps file paths a task touches onto knowledge-store domains, used to
//! prime freshly spawned agents with relevant recorded patterns. The prefix
//! table mirrors how this codebase itself is organized; paths outside
//! `src/` contribute nothing.

/// Infer knowledge domains from a set of file paths.
///
/// Prefix table: `src/commands/` → `cli`, `src/mail/` → `messaging`,
/// `src/agents/` → `agents`, `src/merge/` and `src/worktree/` →
/// `architecture`, any other `src/` path → `rust`. Results are
/// deduplicated and sorted; when nothing matches, the configured fallback
/// domains are returned as-is.
#[must_use]
pub fn infer_domains(files: &[String], fallback: &[String]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::new();
    for file in files {
        let Some(domain) = domain_for(file) else {
            continue;
        };
        if !domains.iter().any(|d| d == domain) {
            domains.push(domain.to_owned());
        }
    }
    if domains.is_empty() {
        return fallback.to_vec();
    }
    domains.sort();
    domains
}

fn domain_for(path: &str) -> Option<&'static str> {
    if path.starts_with("src/commands/") {
        Some("cli")
    } else if path.starts_with("src/mail/") {
        Some("messaging")
    } else if path.starts_with("src/agents/") {
        Some("agents")
    } else if path.starts_with("src/merge/") || path.starts_with("src/worktree/") {
        Some("architecture")
    } else if path.starts_with("src/") {
        Some("rust")
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

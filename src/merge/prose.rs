//! Prose heuristic for LLM merge output.
//!
//! Tiers 3 and 4 demand raw resolved file content from the LLM — no
//! explanation, no code fences. Responses that read like conversation are
//! rejected and the tier falls through. The heuristic is deliberately
//! cheap: leaders, fences, and refusal phrases cover what models actually
//! emit when they disobey.

/// Conversational openers that mark a response as prose.
const PROSE_LEADERS: &[&str] = &[
    "I ",
    "I'm",
    "I'll",
    "I'd",
    "I've",
    "Here ",
    "Here's",
    "The conflict",
    "Let me",
    "Sure",
    "Certainly",
    "Of course",
    "Unfortunately",
    "Sorry",
    "To resolve",
    "Looking at",
    "Based on",
];

/// Phrases that mark a refusal anywhere in the response.
const REFUSAL_PHRASES: &[&str] = &["I need permission", "I cannot", "I don't have"];

/// Whether LLM output should be rejected as prose rather than file content.
#[must_use]
pub fn is_prose(output: &str) -> bool {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return true;
    }
    if let Some(first_line) = trimmed.lines().next() {
        if PROSE_LEADERS
            .iter()
            .any(|leader| first_line.starts_with(leader))
        {
            return true;
        }
    }
    if trimmed.lines().any(|line| line.trim_start().starts_with("```")) {
        return true;
    }
    REFUSAL_PHRASES
        .iter()
        .any(|phrase| trimmed.contains(phrase))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

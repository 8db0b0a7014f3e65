//! Model and provider resolution.
//!
//! Configuration may route each capability to a `provider/model` string.
//! Native providers launch the LLM CLI untouched with the raw model alias.
//! Gateway providers redirect the CLI through an environment bundle:
//! base URL, a placeholder API key (the gateway reads its own token), a
//! pinned default model, and optionally a pass-through auth token read from
//! the environment variable the provider names.

use crate::config::{OverstoryConfig, ProviderKind};
use crate::error::{OverstoryError, Result};
use crate::model::Capability;

/// Model alias used when configuration has no entry for a capability.
pub const DEFAULT_MODEL: &str = "sonnet";

// ---------------------------------------------------------------------------
// ResolvedModel
// ---------------------------------------------------------------------------

/// The model alias and environment bundle to launch an agent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Model argument passed to the LLM CLI.
    pub model: String,
    /// Environment variables injected into the agent's session.
    pub env: Vec<(String, String)>,
}

impl ResolvedModel {
    fn native(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            env: Vec::new(),
        }
    }
}

/// Resolve the model and environment for a capability.
///
/// Resolution order: the configured `models.<capability>` entry, else the
/// default alias. A `provider/model` entry consults the named provider;
/// `native` providers return the bare model, `gateway` providers return the
/// redirect bundle.
///
/// # Errors
/// Fails when the entry names an undefined provider (config validation
/// catches this earlier; the check here guards ad-hoc configs).
pub fn resolve_model(config: &OverstoryConfig, capability: Capability) -> Result<ResolvedModel> {
    let Some(entry) = config.models.get(capability.as_str()) else {
        return Ok(ResolvedModel::native(DEFAULT_MODEL));
    };
    let Some((provider_name, model)) = entry.split_once('/') else {
        // A bare alias is implicitly native.
        return Ok(ResolvedModel::native(entry.clone()));
    };
    let Some(provider) = config.providers.get(provider_name) else {
        return Err(OverstoryError::validation(
            format!("models.{capability}"),
            entry.clone(),
            format!("references undefined provider '{provider_name}'"),
        ));
    };
    match provider.kind {
        ProviderKind::Native => Ok(ResolvedModel::native(model)),
        ProviderKind::Gateway => {
            let mut env = vec![
                ("ANTHROPIC_BASE_URL".to_owned(), provider.base_url.clone()),
                // Placeholder: the gateway authenticates with its own token.
                ("ANTHROPIC_API_KEY".to_owned(), String::new()),
                (
                    "ANTHROPIC_DEFAULT_SONNET_MODEL".to_owned(),
                    model.to_owned(),
                ),
            ];
            if let Some(token_env) = &provider.auth_token_env {
                if let Ok(token) = std::env::var(token_env) {
                    env.push(("ANTHROPIC_AUTH_TOKEN".to_owned(), token));
                }
            }
            Ok(ResolvedModel {
                model: DEFAULT_MODEL.to_owned(),
                env,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

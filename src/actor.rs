//! Actor identity management.
//!
//! The actor is recorded as `created_by` / `updated_by` on every mutation.
//! Resolution order:
//! 1) CLI --actor (explicit)
//! 2) MDTASKS_ACTOR environment variable
//! 3) Config default (actor.default, "unknown" unless configured)

use crate::config::Config;

pub const ACTOR_ENV: &str = "MDTASKS_ACTOR";

/// Resolve the current actor using CLI, environment, and config.
pub fn resolve_actor(cli_actor: Option<&str>, config: &Config) -> String {
    if let Some(actor) = non_empty(cli_actor) {
        return actor.to_string();
    }

    if let Ok(env_actor) = std::env::var(ACTOR_ENV) {
        if let Some(actor) = non_empty(Some(env_actor.as_str())) {
            return actor.to_string();
        }
    }

    non_empty(Some(config.actor.default.as_str()))
        .unwrap_or("unknown")
        .to_string()
}

fn non_empty(input: Option<&str>) -> Option<&str> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

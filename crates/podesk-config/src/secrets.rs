//! Runtime secret resolution.
//!
//! Config YAML stores only env var **names**. Binaries call
//! [`resolve_secrets`] once at startup and pass the result to constructors.
//! `Debug` redacts values, and errors name the variable, never its value.

use anyhow::{bail, Result};

use crate::DeskConfig;

/// Secrets resolved from the environment. **Values are redacted in `Debug`.**
#[derive(Clone, Default)]
pub struct ResolvedSecrets {
    /// Chat webhook for escalations. `None` means log-only dispatch.
    pub webhook_url: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "webhook_url",
                &self.webhook_url.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

/// Returns `None` if the variable is unset or blank.
fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

/// Resolve every secret the desk config names.
///
/// The webhook is optional: no `dispatch.webhook_url_env` means log-only
/// dispatch. But once a variable is named it must be set and must hold an
/// http(s) URL, so a typo does not silently disable escalations.
pub fn resolve_secrets(config: &DeskConfig) -> Result<ResolvedSecrets> {
    let webhook_url = match config.webhook_url_env.as_deref() {
        None => None,
        Some(var) => {
            let Some(url) = resolve_env(var) else {
                bail!("SECRETS_MISSING: env var '{var}' (dispatch.webhook_url_env) is unset");
            };
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                bail!("SECRETS_INVALID: env var '{var}' does not hold an http(s) URL");
            }
            Some(url)
        }
    };
    Ok(ResolvedSecrets { webhook_url })
}

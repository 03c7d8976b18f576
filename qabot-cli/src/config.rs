//! Provider configuration from the environment

use qabot_core::{Error, ProviderConfig, ProviderType, Result};

pub const OPENAI_KEY_VAR: &str = "OPENAI_API_KEY";
pub const GEMINI_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Options the user set on the command line
#[derive(Debug, Clone)]
pub struct ProviderOptions {
    pub provider: ProviderType,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

/// Build the provider config, reading credentials through `lookup`.
///
/// `lookup` is `std::env::var` in the binary and a map in tests. Blank
/// values count as unset.
pub fn resolve_provider<F>(options: &ProviderOptions, lookup: F) -> Result<ProviderConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

    let config = match options.provider {
        ProviderType::OpenAI => {
            let key = read(OPENAI_KEY_VAR).ok_or_else(|| {
                Error::missing_env(OPENAI_KEY_VAR).with_operation("config::resolve_provider")
            })?;
            ProviderConfig::openai(key)
        }
        ProviderType::Gemini => {
            let key = GEMINI_KEY_VARS.iter().find_map(|&var| read(var)).ok_or_else(|| {
                Error::config_invalid(format!(
                    "environment variable {} (or {}) is not set",
                    GEMINI_KEY_VARS[0], GEMINI_KEY_VARS[1]
                ))
                .with_context("variable", GEMINI_KEY_VARS[0])
                .with_operation("config::resolve_provider")
            })?;
            ProviderConfig::gemini(key)
        }
    };

    let mut config = config.with_timeout(options.timeout_secs);
    if let Some(model) = options.model.as_deref().filter(|m| !m.trim().is_empty()) {
        config = config.with_model(model);
    }
    if let Some(url) = options.base_url.as_deref().filter(|u| !u.trim().is_empty()) {
        config = config.with_base_url(url);
    }

    Ok(config)
}

//! Startup configuration read from the environment

use crate::system_prompt::WELCOME_GREETING;
use reqwest::Url;
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_FORWARD_URL: &str = "http://127.0.0.1:5001/stream";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub port: u16,
    /// Public host name the phone platform reaches us on; the request's
    /// `Host` header is used when unset
    pub public_host: Option<String>,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    /// Cap on reply length; the provider default applies when unset
    pub openai_max_tokens: Option<u32>,
    /// Where outbound events are mirrored; `None` disables forwarding
    pub forward_url: Option<String>,
    /// Calendar webhook; the scheduling tool is only registered when set
    pub webhook_url: Option<String>,
    pub welcome_greeting: String,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Unset and blank are the same thing
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match var("PORT") {
            Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let public_host = match var("NGROK_URL")
            .map(|raw| ("NGROK_URL", raw))
            .or_else(|| var("PUBLIC_HOST").map(|raw| ("PUBLIC_HOST", raw)))
        {
            Some((name, raw)) => Some(
                bare_host(&raw).ok_or_else(|| ConfigError::Invalid { name, value: raw })?,
            ),
            None => None,
        };

        let openai_max_tokens = match var("OPENAI_MAX_TOKENS") {
            Some(value) => Some(value.trim().parse().map_err(|_| ConfigError::Invalid {
                name: "OPENAI_MAX_TOKENS",
                value,
            })?),
            None => None,
        };

        let openai_api_key = var("OPENAI_API_KEY").ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;

        // An explicitly empty FORWARD_URL turns forwarding off
        let forward_url = match lookup("FORWARD_URL") {
            Some(url) if url.trim().is_empty() => None,
            Some(url) => Some(url.trim().to_string()),
            None => Some(DEFAULT_FORWARD_URL.to_string()),
        };

        Ok(Self {
            port,
            public_host,
            openai_api_key,
            openai_model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            openai_base_url: var("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            openai_max_tokens,
            forward_url,
            webhook_url: var("WEBHOOK_API_URL"),
            welcome_greeting: var("WELCOME_GREETING")
                .unwrap_or_else(|| WELCOME_GREETING.to_string()),
        })
    }
}

/// `https://abc.ngrok.app/path` -> `abc.ngrok.app`; a bare host is taken as is
fn bare_host(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let url = if raw.contains("://") {
        Url::parse(raw)
    } else {
        Url::parse(&format!("https://{raw}"))
    }
    .ok()?;

    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

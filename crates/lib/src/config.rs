//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.groupbridge/config.json`) and environment.
//! Environment variables win over the file; blank values are treated as unset.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP listener settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Where inbound group messages are forwarded.
    #[serde(default)]
    pub webhook: WebhookConfig,

    /// Shared secrets for `/send` and `/qr`.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Session storage owned by the automation sidecar.
    #[serde(default)]
    pub session: SessionConfig,

    /// Automation sidecar connection and optional process launch.
    #[serde(default)]
    pub sidecar: SidecarConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for HTTP (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

/// Outbound webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    /// Target URL. Overridden by WEBHOOK_URL (or N8N_WEBHOOK_URL) env. Unset = log payloads only.
    pub url: Option<String>,

    /// Per-delivery timeout in seconds (default 10).
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

/// Bearer tokens. Either may be absent, in which case that endpoint is open.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Required for POST /send. Overridden by SEND_TOKEN env.
    pub send_token: Option<String>,
    /// Required for GET /qr. Overridden by QR_TOKEN env.
    pub qr_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Session credential directory, created before the sidecar starts. Overridden by SESSION_DIR env.
    #[serde(default = "default_session_dir")]
    pub dir: PathBuf,

    /// Client id passed to the sidecar so several bridges can share one directory.
    #[serde(default = "default_client_id")]
    pub client_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarConfig {
    /// WebSocket URL of the sidecar. Overridden by SIDECAR_URL env.
    #[serde(default = "default_sidecar_url")]
    pub url: String,

    /// When set, the gateway spawns this program and stops it on shutdown.
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single request (chat lookup, media download, send).
    #[serde(default = "default_sidecar_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_webhook_timeout_secs() -> u64 {
    crate::gateway::DEFAULT_WEBHOOK_TIMEOUT.as_secs()
}

fn default_session_dir() -> PathBuf {
    PathBuf::from("/data/session")
}

fn default_client_id() -> String {
    "groupbridge".to_string()
}

fn default_sidecar_url() -> String {
    "ws://127.0.0.1:3781".to_string()
}

fn default_sidecar_request_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            client_id: default_client_id(),
        }
    }
}

impl Default for SidecarConfig {
    fn default() -> Self {
        Self {
            url: default_sidecar_url(),
            command: None,
            args: Vec::new(),
            request_timeout_secs: default_sidecar_request_timeout_secs(),
        }
    }
}

/// Read an env var, trimmed; empty counts as unset.
fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn trimmed(value: Option<&String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Resolve the webhook URL: env WEBHOOK_URL, then N8N_WEBHOOK_URL, then config.
pub fn resolve_webhook_url(config: &Config) -> Option<String> {
    env_nonempty("WEBHOOK_URL")
        .or_else(|| env_nonempty("N8N_WEBHOOK_URL"))
        .or_else(|| trimmed(config.webhook.url.as_ref()))
}

/// Resolve the /send token: env SEND_TOKEN overrides config.
pub fn resolve_send_token(config: &Config) -> Option<String> {
    env_nonempty("SEND_TOKEN").or_else(|| trimmed(config.auth.send_token.as_ref()))
}

/// Resolve the /qr token: env QR_TOKEN overrides config.
pub fn resolve_qr_token(config: &Config) -> Option<String> {
    env_nonempty("QR_TOKEN").or_else(|| trimmed(config.auth.qr_token.as_ref()))
}

/// Resolve the session directory: env SESSION_DIR overrides config.
pub fn resolve_session_dir(config: &Config) -> PathBuf {
    env_nonempty("SESSION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.session.dir.clone())
}

/// Resolve the listen port: an explicit `flag` wins, then env PORT, then config.
/// PORT is only parsed when no flag is given; an unparsable value is then an error.
pub fn resolve_port(config: &Config, flag: Option<u16>) -> Result<u16> {
    match flag {
        Some(p) => Ok(p),
        None => port_from_env(env_nonempty("PORT"), config),
    }
}

fn port_from_env(value: Option<String>, config: &Config) -> Result<u16> {
    match value {
        Some(p) => p
            .parse()
            .with_context(|| format!("parsing PORT env value {:?}", p)),
        None => Ok(config.gateway.port),
    }
}

/// Resolve the sidecar URL: env SIDECAR_URL overrides config.
pub fn resolve_sidecar_url(config: &Config) -> String {
    env_nonempty("SIDECAR_URL").unwrap_or_else(|| config.sidecar.url.clone())
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Flattened runtime view of the config with all env overrides applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub send_token: Option<String>,
    pub qr_token: Option<String>,
    pub session_dir: PathBuf,
    pub client_id: String,
    pub sidecar_url: String,
    pub sidecar_command: Option<String>,
    pub sidecar_args: Vec<String>,
    pub sidecar_request_timeout: Duration,
}

impl Settings {
    /// Apply env overrides and validate. `port` is the command-line override.
    /// Fails on an unparsable webhook URL, or an unparsable PORT when no override is given.
    pub fn resolve(config: &Config, port: Option<u16>) -> Result<Self> {
        let webhook_url = resolve_webhook_url(config);
        if let Some(ref url) = webhook_url {
            reqwest::Url::parse(url).with_context(|| format!("parsing webhook url {}", url))?;
        }
        Ok(Self {
            bind: config.gateway.bind.trim().to_string(),
            port: resolve_port(config, port)?,
            webhook_url,
            webhook_timeout: Duration::from_secs(config.webhook.timeout_secs.max(1)),
            send_token: resolve_send_token(config),
            qr_token: resolve_qr_token(config),
            session_dir: resolve_session_dir(config),
            client_id: config.session.client_id.clone(),
            sidecar_url: resolve_sidecar_url(config),
            sidecar_command: trimmed(config.sidecar.command.as_ref()),
            sidecar_args: config.sidecar.args.clone(),
            sidecar_request_timeout: Duration::from_secs(config.sidecar.request_timeout_secs.max(1)),
        })
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("GROUPBRIDGE_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".groupbridge").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or the default). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gateway.bind, "0.0.0.0");
        assert_eq!(config.webhook.timeout_secs, 10);
        assert_eq!(config.session.dir, PathBuf::from("/data/session"));
        assert_eq!(config.sidecar.request_timeout_secs, 30);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"webhook":{"url":"http://hooks.local/in"},"auth":{"sendToken":"s3cret"}}"#,
        )
        .unwrap();
        assert_eq!(config.webhook.url.as_deref(), Some("http://hooks.local/in"));
        assert_eq!(config.webhook.timeout_secs, 10);
        assert_eq!(config.auth.send_token.as_deref(), Some("s3cret"));
        assert_eq!(config.gateway.port, 3000);
    }

    #[test]
    fn blank_tokens_count_as_unset() {
        let mut config = Config::default();
        config.auth.qr_token = Some("   ".to_string());
        assert_eq!(trimmed(config.auth.qr_token.as_ref()), None);
        config.auth.qr_token = Some(" abc ".to_string());
        assert_eq!(trimmed(config.auth.qr_token.as_ref()), Some("abc".to_string()));
    }

    #[test]
    fn port_flag_wins_without_parsing_env() {
        let config = Config::default();
        assert_eq!(resolve_port(&config, Some(8080)).unwrap(), 8080);
        let settings = Settings::resolve(&config, Some(8081)).unwrap();
        assert_eq!(settings.port, 8081);
    }

    #[test]
    fn port_env_value_must_parse() {
        let config = Config::default();
        let err = port_from_env(Some("abc".to_string()), &config).unwrap_err();
        assert!(err.to_string().contains("PORT"));
        assert_eq!(port_from_env(Some("4000".to_string()), &config).unwrap(), 4000);
        assert_eq!(port_from_env(None, &config).unwrap(), 3000);
    }

    #[test]
    fn loopback_detection() {
        assert!(is_loopback_bind("127.0.0.1"));
        assert!(is_loopback_bind(" localhost "));
        assert!(!is_loopback_bind("0.0.0.0"));
    }

    #[test]
    fn load_config_missing_file_is_default() {
        let path = std::env::temp_dir()
            .join(format!("groupbridge-missing-{}", uuid::Uuid::new_v4()))
            .join("config.json");
        let (config, used) = load_config(Some(path.clone())).unwrap();
        assert_eq!(used, path);
        assert_eq!(config.gateway.port, 3000);
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Which timestamp a session's idle time is measured from.
///
/// `ThreadTimestamp` reproduces the historical behavior: the thread id is a
/// decimal epoch-seconds string and doubles as the session's creation time,
/// so a busy 13-hour-old thread is still evicted. `LastAccess` measures from
/// the last `get_or_create` hit instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum IdleBasis {
    #[default]
    ThreadTimestamp,
    LastAccess,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default)]
    pub idle_basis: IdleBasis,
}

fn default_ttl_hours() -> u64 {
    12
}

fn default_sweep_interval_secs() -> u64 {
    5 * 60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: default_ttl_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
            idle_basis: IdleBasis::default(),
        }
    }
}

/// Bounded-retry polling with a fixed cadence. No backoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

fn default_max_attempts() -> u32 {
    30
}

fn default_interval_ms() -> u64 {
    500
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_ms: default_interval_ms(),
        }
    }
}

impl PollConfig {
    /// One-shot CLI preset: fewer, slower attempts.
    pub fn standalone() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    #[serde(default = "default_identity_selector")]
    pub identity_selector: String,
    #[serde(default = "default_credential_selector")]
    pub credential_selector: String,
    #[serde(default = "default_next_label")]
    pub next_button_label: String,
    #[serde(default = "default_mfa_grace_secs")]
    pub mfa_grace_secs: u64,
    #[serde(default = "default_credential_wait_secs")]
    pub credential_wait_secs: u64,
}

fn default_identity_selector() -> String {
    "input[type=\"email\"]".to_string()
}

fn default_credential_selector() -> String {
    "input[type=\"password\"]".to_string()
}

fn default_next_label() -> String {
    "Next".to_string()
}

fn default_mfa_grace_secs() -> u64 {
    60
}

fn default_credential_wait_secs() -> u64 {
    15
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_selector: default_identity_selector(),
            credential_selector: default_credential_selector(),
            next_button_label: default_next_label(),
            mfa_grace_secs: default_mfa_grace_secs(),
            credential_wait_secs: default_credential_wait_secs(),
        }
    }
}

/// Selectors for the conversation pane of the target application.
///
/// `answer` must target the newest answer element, not the echoed query;
/// `copy` is the per-answer "copy formatted" affordance whose clipboard
/// contents preserve markdown the raw text loses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySelectors {
    #[serde(default = "default_input_selector")]
    pub input: String,
    #[serde(default = "default_submit_selector")]
    pub submit: String,
    #[serde(default = "default_answer_selector")]
    pub answer: String,
    #[serde(default = "default_copy_selector")]
    pub copy: String,
}

fn default_input_selector() -> String {
    "textarea[aria-label=\"Query box\"]".to_string()
}

fn default_submit_selector() -> String {
    "button[aria-label=\"Submit\"]".to_string()
}

fn default_answer_selector() -> String {
    ".chat-message-pair:nth-last-child(1) chat-message:last-of-type".to_string()
}

fn default_copy_selector() -> String {
    ".chat-message-pair:nth-last-child(1) chat-message:last-of-type button[aria-label$=\"Copy\"]".to_string()
}

impl Default for QuerySelectors {
    fn default() -> Self {
        Self {
            input: default_input_selector(),
            submit: default_submit_selector(),
            answer: default_answer_selector(),
            copy: default_copy_selector(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    /// Explicit browser executable; autodetected when unset.
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,
    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,
}

fn default_headless() -> bool {
    true
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_viewport_width() -> u32 {
    1920
}

fn default_viewport_height() -> u32 {
    1080
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: default_headless(),
            locale: default_locale(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Target application entry point.
    #[serde(default)]
    pub app_url: String,
    #[serde(default)]
    pub login_user: String,
    #[serde(default)]
    pub login_password: String,
    /// Root directory of the blob store.
    #[serde(default)]
    pub blob_root: String,
    #[serde(default)]
    pub queue_url: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub selectors: QuerySelectors,
    #[serde(default)]
    pub browser: BrowserConfig,
    /// Upload per-query debug screenshots to the blob store.
    #[serde(default)]
    pub debug_snapshots: bool,
    /// Post an immediate "processing" acknowledgment to the origin thread.
    #[serde(default)]
    pub acknowledge: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load from a config file when present, then let the environment win.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => Self::load(p)?,
            _ => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Recognized environment keys. Connection-level settings only; tuning
    /// knobs stay in the config file.
    pub fn apply_env(&mut self) {
        for (key, slot) in [
            ("NOTEBRIDGE_APP_URL", &mut self.app_url),
            ("NOTEBRIDGE_LOGIN_USER", &mut self.login_user),
            ("NOTEBRIDGE_LOGIN_PASSWORD", &mut self.login_password),
            ("NOTEBRIDGE_BLOB_ROOT", &mut self.blob_root),
            ("NOTEBRIDGE_QUEUE_URL", &mut self.queue_url),
            ("NOTEBRIDGE_WEBHOOK_URL", &mut self.webhook_url),
        ] {
            if let Ok(value) = std::env::var(key) {
                if !value.is_empty() {
                    *slot = value;
                }
            }
        }
    }

    /// Fail early on settings the worker cannot run without.
    pub fn validate_worker(&self) -> Result<()> {
        for (name, value) in [
            ("appUrl", &self.app_url),
            ("queueUrl", &self.queue_url),
            ("webhookUrl", &self.webhook_url),
        ] {
            if value.is_empty() {
                return Err(crate::error::Error::Config(format!("{name} is not set")));
            }
        }
        Ok(())
    }

    pub fn session_ttl_ms(&self) -> i64 {
        (self.session.ttl_hours * 60 * 60 * 1000) as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.session.ttl_hours, 12);
        assert_eq!(cfg.poll.max_attempts, 30);
        assert_eq!(cfg.poll.interval_ms, 500);
        assert_eq!(cfg.auth.mfa_grace_secs, 60);
        assert_eq!(cfg.session.idle_basis, IdleBasis::ThreadTimestamp);
        assert_eq!(cfg.session_ttl_ms(), 12 * 60 * 60 * 1000);
    }

    #[test]
    fn test_standalone_poll_preset() {
        let poll = PollConfig::standalone();
        assert_eq!(poll.max_attempts, 10);
        assert_eq!(poll.interval_ms, 1000);
    }

    #[test]
    fn test_partial_file_gets_defaults() {
        let raw = r#"{
  "appUrl": "https://notebook.example/app",
  "session": { "idleBasis": "lastAccess" }
}"#;
        let cfg: Config = serde_json::from_str(raw).unwrap();
        assert_eq!(cfg.app_url, "https://notebook.example/app");
        assert_eq!(cfg.session.idle_basis, IdleBasis::LastAccess);
        assert_eq!(cfg.session.ttl_hours, 12);
        assert_eq!(cfg.selectors.input, "textarea[aria-label=\"Query box\"]");
    }

    #[test]
    fn test_validate_worker_reports_missing_key() {
        let mut cfg = Config::default();
        cfg.app_url = "https://notebook.example/app".to_string();
        cfg.webhook_url = "https://hooks.example/x".to_string();
        let err = cfg.validate_worker().unwrap_err();
        assert!(err.to_string().contains("queueUrl"));
    }
}

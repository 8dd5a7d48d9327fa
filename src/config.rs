//! Dispatch configuration
//!
//! Every section has defaults, so an empty YAML document is a valid config.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::models::{EmailAddress, RetryPolicy};

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommsConfig {
    pub platform: PlatformConfig,
    pub email: EmailConfig,
    pub sms: GatewayConfig,
    pub whatsapp: GatewayConfig,
    pub dispatch: DispatchConfig,
    pub retry: RetryPolicy,
    pub reminders: ReminderConfig,
}

impl CommsConfig {
    /// Read a YAML config file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: CommsConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Override secrets and the platform domain from the environment
    pub fn apply_env(mut self) -> Self {
        self.apply_vars(|key| std::env::var(key).ok());
        self
    }

    fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("COMMS_EMAIL_API_KEY") {
            self.email.api_key = Some(key);
        }
        if let Some(token) = get("COMMS_SMS_TOKEN") {
            self.sms.token = Some(token);
        }
        if let Some(token) = get("COMMS_WHATSAPP_TOKEN") {
            self.whatsapp.token = Some(token);
        }
        if let Some(domain) = get("COMMS_PLATFORM_DOMAIN") {
            self.platform.domain = domain;
        }
    }
}

/// Platform domain and tenant-facing URL paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// Domain used for generated tenant subdomains
    pub domain: String,
    pub scheme: String,
    pub paths: UrlPaths,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            domain: "vibenet.shop".to_string(),
            scheme: "https".to_string(),
            paths: UrlPaths::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlPaths {
    pub login: String,
    pub dashboard: String,
    pub support: String,
    pub password_reset: String,
}

impl Default for UrlPaths {
    fn default() -> Self {
        Self {
            login: "/auth".to_string(),
            dashboard: "/dashboard".to_string(),
            support: "/support".to_string(),
            password_reset: "/auth/reset-password".to_string(),
        }
    }
}

/// Email transport kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmailProviderKind {
    #[default]
    Http,
    Smtp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    pub kind: EmailProviderKind,
    /// Base URL of the transactional email API
    pub api_base: String,
    pub api_key: Option<String>,
    pub default_from: Option<EmailAddress>,
    pub smtp: Option<SmtpConfig>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            kind: EmailProviderKind::Http,
            api_base: "https://api.resend.com".to_string(),
            api_key: None,
            default_from: None,
            smtp: None,
        }
    }
}

/// SMTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub encryption: SmtpEncryption,
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            username: None,
            password: None,
            encryption: SmtpEncryption::StartTls,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmtpEncryption {
    None,
    StartTls,
    Tls,
}

/// SMS or WhatsApp gateway endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Message endpoint; `{sender}` is replaced with the sender / phone number id
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Per provider call
    pub timeout_secs: u64,
    /// Entries dispatched in parallel by `process_due`
    pub concurrency: usize,
    /// A `sending` entry with no recorded outcome is claimable again after this
    pub claim_lease_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            concurrency: 4,
            claim_lease_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Quotes expiring within this many days from today are reminded
    pub quote_window_days: u32,
    /// Minimum days between two reminders for the same invoice
    pub invoice_cooldown_days: u32,
    /// 1 = sequential
    pub concurrency: usize,
    /// Due queue entries re-dispatched at the start of each run; 0 disables
    pub redispatch_limit: usize,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            quote_window_days: 1,
            invoice_cooldown_days: 7,
            concurrency: 1,
            redispatch_limit: 100,
        }
    }
}

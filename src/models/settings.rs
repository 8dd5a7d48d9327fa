//! Tenant Communication Settings Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Channel, EmailAddress};

/// Per-tenant channel switches and credentials.
///
/// Owned by tenant administrators; the dispatch pipeline only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicationSettings {
    pub tenant_id: String,
    /// Email channel switch
    pub email_notifications: bool,
    /// SMS channel switch
    pub sms_enabled: bool,
    /// WhatsApp channel switch
    pub whatsapp_enabled: bool,
    /// Sender address for outgoing email
    pub email_from_address: Option<String>,
    /// Sender display name for outgoing email
    pub email_from_name: Option<String>,
    /// Tenant-owned email provider key
    pub email_api_key: Option<String>,
    /// SMS gateway token
    pub sms_api_key: Option<String>,
    /// SMS sender id or originating number
    pub sms_sender_id: Option<String>,
    /// WhatsApp Business API token
    pub whatsapp_access_token: Option<String>,
    /// WhatsApp Business phone number id
    pub whatsapp_phone_number_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl CommunicationSettings {
    /// Settings used when a tenant has none stored
    pub fn defaults(tenant_id: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            email_notifications: Channel::Email.default_enabled(),
            sms_enabled: Channel::Sms.default_enabled(),
            whatsapp_enabled: Channel::Whatsapp.default_enabled(),
            email_from_address: None,
            email_from_name: None,
            email_api_key: None,
            sms_api_key: None,
            sms_sender_id: None,
            whatsapp_access_token: None,
            whatsapp_phone_number_id: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_channel(mut self, channel: Channel, enabled: bool) -> Self {
        match channel {
            Channel::Email => self.email_notifications = enabled,
            Channel::Sms => self.sms_enabled = enabled,
            Channel::Whatsapp => self.whatsapp_enabled = enabled,
        }
        self
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email_notifications,
            Channel::Sms => self.sms_enabled,
            Channel::Whatsapp => self.whatsapp_enabled,
        }
    }

    /// Tenant sender identity for email, if configured
    pub fn email_sender(&self) -> Option<EmailAddress> {
        let address = self.email_from_address.as_deref().filter(|a| !a.trim().is_empty())?;
        Some(match self.email_from_name.as_deref() {
            Some(name) if !name.trim().is_empty() => EmailAddress::with_name(address, name),
            _ => EmailAddress::new(address),
        })
    }

    /// Tenant-level credential overrides for a channel
    pub fn credentials(&self, channel: Channel) -> ChannelCredentials {
        match channel {
            Channel::Email => ChannelCredentials {
                token: self.email_api_key.clone(),
                sender_id: None,
                from: self.email_sender(),
            },
            Channel::Sms => ChannelCredentials {
                token: self.sms_api_key.clone(),
                sender_id: self.sms_sender_id.clone(),
                from: None,
            },
            Channel::Whatsapp => ChannelCredentials {
                token: self.whatsapp_access_token.clone(),
                sender_id: self.whatsapp_phone_number_id.clone(),
                from: None,
            },
        }
    }
}

/// Credentials a provider should prefer over its configured defaults
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelCredentials {
    /// API key or bearer token
    pub token: Option<String>,
    /// SMS sender id or WhatsApp phone number id
    pub sender_id: Option<String>,
    /// Email sender
    pub from: Option<EmailAddress>,
}

/// Kind of domain record attached to a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    /// Tenant-owned domain, requires verification
    Custom,
    /// Subdomain of the platform domain
    Subdomain,
}

/// Domain record used to build tenant-facing URLs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDomain {
    pub tenant_id: String,
    pub domain: String,
    pub domain_type: DomainType,
    pub is_primary: bool,
    pub is_active: bool,
    pub verified: bool,
}

impl TenantDomain {
    pub fn custom(tenant_id: &str, domain: &str, verified: bool) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            domain: domain.to_string(),
            domain_type: DomainType::Custom,
            is_primary: true,
            is_active: true,
            verified,
        }
    }

    pub fn subdomain(tenant_id: &str, domain: &str) -> Self {
        Self {
            tenant_id: tenant_id.to_string(),
            domain: domain.to_string(),
            domain_type: DomainType::Subdomain,
            is_primary: true,
            is_active: true,
            verified: true,
        }
    }

    /// Custom domains only count once verified
    pub fn is_usable(&self) -> bool {
        self.is_active
            && match self.domain_type {
                DomainType::Custom => self.verified,
                DomainType::Subdomain => true,
            }
    }

    /// Bare host, without scheme or path
    pub fn host(&self) -> &str {
        let host = self.domain.trim();
        let host = host
            .strip_prefix("https://")
            .or_else(|| host.strip_prefix("http://"))
            .unwrap_or(host);
        host.split('/').next().unwrap_or(host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_email_only() {
        let settings = CommunicationSettings::defaults("t1");
        assert!(settings.is_enabled(Channel::Email));
        assert!(!settings.is_enabled(Channel::Sms));
        assert!(!settings.is_enabled(Channel::Whatsapp));
    }

    #[test]
    fn email_sender_requires_address() {
        let mut settings = CommunicationSettings::defaults("t1");
        assert!(settings.email_sender().is_none());

        settings.email_from_address = Some("billing@acme.test".to_string());
        settings.email_from_name = Some("Acme".to_string());
        assert_eq!(
            settings.email_sender().unwrap().formatted(),
            "Acme <billing@acme.test>"
        );
    }

    #[test]
    fn unverified_custom_domain_is_unusable() {
        let domain = TenantDomain::custom("t1", "shop.acme.test", false);
        assert!(!domain.is_usable());
        assert!(TenantDomain::custom("t1", "shop.acme.test", true).is_usable());
        assert!(TenantDomain::subdomain("t1", "acme.vibenet.shop").is_usable());
    }

    #[test]
    fn host_strips_scheme_and_path() {
        let domain = TenantDomain::custom("t1", "https://shop.acme.test/", true);
        assert_eq!(domain.host(), "shop.acme.test");
    }
}

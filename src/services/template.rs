//! Template Service
//!
//! Template registry, tenant URL derivation and `{{key}}` substitution.

use regex::Captures;
use scraper::{Html, Node};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use crate::config::PlatformConfig;
use crate::models::template::PLACEHOLDER;
use crate::models::{Channel, MessageContent, MessageTemplate, TemplateBuilder, TemplateRef, Variables};
use crate::services::store::SettingsStore;

/// Template service error
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),
    #[error("Template is inactive: {0}")]
    Inactive(String),
    #[error("Invalid template: {0}")]
    Invalid(String),
}

#[derive(Default)]
struct Registry {
    /// Templates by ID
    templates: HashMap<Uuid, MessageTemplate>,
    /// Slug index
    by_slug: HashMap<String, Uuid>,
}

impl Registry {
    fn insert(&mut self, template: MessageTemplate) -> Result<(), TemplateError> {
        if template.text_body.is_none() && template.html_body.is_none() {
            return Err(TemplateError::Invalid("Template must have a body".to_string()));
        }
        if template.slug.is_empty() {
            return Err(TemplateError::Invalid("Template slug is empty".to_string()));
        }

        let id = template.id;
        let slug = template.slug.clone();

        if let Some(previous) = self.by_slug.insert(slug.clone(), id) {
            if previous != id {
                self.templates.remove(&previous);
            }
        }
        // re-registering an id under a new slug drops the old slug
        if let Some(replaced) = self.templates.insert(id, template) {
            if replaced.slug != slug {
                self.by_slug.remove(&replaced.slug);
            }
        }
        Ok(())
    }

    /// Built-in reminder templates whose slug is not taken yet
    fn insert_system_templates(&mut self) {
        for template in system_templates() {
            match template {
                Ok(template) if self.by_slug.contains_key(&template.slug) => {}
                Ok(template) => {
                    let slug = template.slug.clone();
                    if let Err(e) = self.insert(template) {
                        warn!(slug = %slug, error = %e, "system template rejected");
                    }
                }
                Err(e) => warn!(error = %e, "system template could not be built"),
            }
        }
    }
}

/// Template registry
pub struct TemplateService {
    registry: Arc<RwLock<Registry>>,
}

impl TemplateService {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Registry preloaded with the built-in reminder templates
    pub fn with_system_templates() -> Self {
        let mut registry = Registry::default();
        registry.insert_system_templates();
        Self {
            registry: Arc::new(RwLock::new(registry)),
        }
    }

    /// Register a template, replacing any template with the same slug
    pub async fn register(&self, template: MessageTemplate) -> Result<(), TemplateError> {
        self.registry.write().await.insert(template)
    }

    /// Get template by ID
    pub async fn get(&self, id: Uuid) -> Option<MessageTemplate> {
        self.registry.read().await.templates.get(&id).cloned()
    }

    /// Get template by slug
    pub async fn get_by_slug(&self, slug: &str) -> Option<MessageTemplate> {
        let registry = self.registry.read().await;
        registry
            .by_slug
            .get(slug)
            .and_then(|id| registry.templates.get(id))
            .cloned()
    }

    /// Active template by id or slug
    pub async fn find(&self, reference: &TemplateRef) -> Result<MessageTemplate, TemplateError> {
        let template = match reference {
            TemplateRef::Id(id) => self.get(*id).await,
            TemplateRef::Slug(slug) => self.get_by_slug(slug).await,
        }
        .ok_or_else(|| TemplateError::NotFound(reference.to_string()))?;

        if !template.active {
            return Err(TemplateError::Inactive(reference.to_string()));
        }
        Ok(template)
    }

    /// List templates, optionally only those usable on `channel`
    pub async fn list(&self, channel: Option<Channel>) -> Vec<MessageTemplate> {
        let registry = self.registry.read().await;
        let mut list: Vec<_> = registry
            .templates
            .values()
            .filter(|t| match (channel, t.channel) {
                (Some(wanted), Some(own)) => wanted == own,
                _ => true,
            })
            .cloned()
            .collect();
        list.sort_by(|a, b| a.slug.cmp(&b.slug));
        list
    }

    /// Delete template
    pub async fn delete(&self, id: Uuid) -> Result<(), TemplateError> {
        let mut registry = self.registry.write().await;

        match registry.templates.remove(&id) {
            Some(template) => {
                registry.by_slug.remove(&template.slug);
                Ok(())
            }
            None => Err(TemplateError::NotFound(id.to_string())),
        }
    }

    /// Register the built-in reminder templates. Slugs already registered,
    /// including customised system templates, are left alone.
    pub async fn register_system_templates(&self) {
        self.registry.write().await.insert_system_templates();
    }
}

impl Default for TemplateService {
    fn default() -> Self {
        Self::new()
    }
}

fn system_templates() -> Vec<Result<MessageTemplate, String>> {
    vec![
        TemplateBuilder::new()
            .name("quote-expiry-reminder")
            .description("Sent to customers when a sent quote is about to expire")
            .channel(Channel::Email)
            .subject("Reminder: Quote {{quote_number}} expires soon")
            .required_var("quote_number", "Quote number")
            .required_var("valid_until", "Expiry date")
            .optional_var("customer_name", "Customer")
            .optional_var("amount", "")
            .text(
                r#"Hi {{customer_name}},

This is a friendly reminder that quote {{quote_number}} ({{amount}}) is valid until {{valid_until}}.

Review it here: {{dashboard_url}}

Questions? {{support_url}}"#,
            )
            .html(
                r#"<div style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto;">
    <h2>Your quote expires soon</h2>
    <p>Hi {{customer_name}},</p>
    <p>This is a friendly reminder that quote <strong>{{quote_number}}</strong> ({{amount}}) is valid until <strong>{{valid_until}}</strong>.</p>
    <p style="margin: 30px 0;">
        <a href="{{dashboard_url}}" style="background: #2563eb; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">Review quote</a>
    </p>
    <p style="color: #999; font-size: 12px;">Questions? Contact us at {{support_url}}</p>
</div>"#,
            )
            .build(),
        TemplateBuilder::new()
            .name("invoice-due-reminder")
            .description("Sent to customers with an outstanding or partially paid invoice")
            .channel(Channel::Email)
            .subject("Payment reminder: Invoice {{invoice_number}} is due")
            .required_var("invoice_number", "Invoice number")
            .required_var("due_date", "Due date")
            .optional_var("customer_name", "Customer")
            .optional_var("amount", "")
            .text(
                r#"Hi {{customer_name}},

Invoice {{invoice_number}} for {{amount}} was due on {{due_date}}.

Please arrange payment at your earliest convenience: {{dashboard_url}}

Already paid? Let us know: {{support_url}}"#,
            )
            .html(
                r#"<div style="font-family: Arial, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto;">
    <h2>Payment reminder</h2>
    <p>Hi {{customer_name}},</p>
    <p>Invoice <strong>{{invoice_number}}</strong> for <strong>{{amount}}</strong> was due on <strong>{{due_date}}</strong>.</p>
    <p style="margin: 30px 0;">
        <a href="{{dashboard_url}}" style="background: #dc2626; color: white; padding: 12px 24px; text-decoration: none; border-radius: 4px;">View invoice</a>
    </p>
    <p style="color: #999; font-size: 12px;">Already paid? Let us know at {{support_url}}</p>
</div>"#,
            )
            .build(),
    ]
}

/// Absolute tenant-facing URLs, without trailing slash on `tenant_url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantUrls {
    pub tenant_url: String,
    pub login_url: String,
    pub dashboard_url: String,
    pub support_url: String,
    pub password_reset_url: String,
}

impl TenantUrls {
    fn for_host(platform: &PlatformConfig, host: &str) -> Self {
        let base = format!("{}://{}", platform.scheme, host);
        Self {
            login_url: format!("{}{}", base, platform.paths.login),
            dashboard_url: format!("{}{}", base, platform.paths.dashboard),
            support_url: format!("{}{}", base, platform.paths.support),
            password_reset_url: format!("{}{}", base, platform.paths.password_reset),
            tenant_url: base,
        }
    }

    pub fn as_variables(&self) -> Variables {
        [
            ("tenant_url", &self.tenant_url),
            ("login_url", &self.login_url),
            ("dashboard_url", &self.dashboard_url),
            ("support_url", &self.support_url),
            ("password_reset_url", &self.password_reset_url),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
    }
}

/// Output of [`TemplateResolver::resolve`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedContent {
    pub content: MessageContent,
    /// Derived URLs merged with caller variables
    pub variables: Variables,
    pub tenant_urls: TenantUrls,
}

/// Advisory report on URL placeholders left in resolved content
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableReport {
    pub present: Vec<String>,
    pub missing: Vec<String>,
    /// Any other placeholder still unresolved
    pub unresolved: Vec<String>,
}

impl VariableReport {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Variables every tenant-facing message is expected to resolve
pub const REQUIRED_VARIABLES: [&str; 4] = ["tenant_url", "login_url", "dashboard_url", "support_url"];

/// Resolves placeholders against caller variables and tenant URLs
pub struct TemplateResolver {
    settings: Arc<dyn SettingsStore>,
    platform: PlatformConfig,
}

impl TemplateResolver {
    pub fn new(settings: Arc<dyn SettingsStore>, platform: PlatformConfig) -> Self {
        Self { settings, platform }
    }

    /// Derive tenant URLs. Always succeeds, falling back to the generated subdomain.
    pub async fn tenant_urls(&self, tenant_id: &str) -> TenantUrls {
        let host = match self.settings.primary_domain(tenant_id).await {
            Ok(Some(domain)) if domain.is_usable() => match self.valid_host(domain.host()) {
                Some(host) => host,
                None => {
                    warn!(tenant_id, domain = %domain.domain, "invalid tenant domain, using generated subdomain");
                    self.fallback_host(tenant_id)
                }
            },
            Ok(Some(domain)) => {
                debug!(tenant_id, domain = %domain.domain, "tenant domain not verified");
                self.fallback_host(tenant_id)
            }
            Ok(None) => self.fallback_host(tenant_id),
            Err(e) => {
                warn!(tenant_id, error = %e, "domain lookup failed, using generated subdomain");
                self.fallback_host(tenant_id)
            }
        };

        TenantUrls::for_host(&self.platform, &host)
    }

    fn valid_host(&self, host: &str) -> Option<String> {
        let url = Url::parse(&format!("{}://{}", self.platform.scheme, host)).ok()?;
        let host = url.host_str()?.to_string();
        Some(match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host,
        })
    }

    fn fallback_host(&self, tenant_id: &str) -> String {
        let label: String = tenant_id
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("tenant-{}.{}", label, self.platform.domain)
    }

    /// Substitute caller variables and tenant URLs into subject and bodies.
    /// Caller variables override derived URLs; unknown placeholders stay literal.
    pub async fn resolve(&self, content: MessageContent, variables: &Variables, tenant_id: &str) -> ResolvedContent {
        self.resolve_layered(content, &Variables::new(), variables, tenant_id)
            .await
    }

    /// Like [`resolve`](Self::resolve), with template `defaults` beneath the
    /// derived URLs: defaults < tenant URLs < caller variables.
    pub async fn resolve_layered(
        &self,
        content: MessageContent,
        defaults: &Variables,
        variables: &Variables,
        tenant_id: &str,
    ) -> ResolvedContent {
        let tenant_urls = self.tenant_urls(tenant_id).await;

        let mut merged = defaults.clone();
        merged.extend(tenant_urls.as_variables());
        merged.extend(variables.iter().map(|(k, v)| (k.clone(), v.clone())));

        let content = MessageContent {
            subject: substitute(&content.subject, &merged),
            html_body: content.html_body.map(|body| substitute(&body, &merged)),
            text_body: content.text_body.map(|body| substitute(&body, &merged)),
        };

        ResolvedContent {
            content,
            variables: merged,
            tenant_urls,
        }
    }
}

/// Replace every `{{key}}` whose key is in `variables`
pub fn substitute(text: &str, variables: &Variables) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Which required URL placeholders are still unresolved in `content`
pub fn check_required_variables(content: &MessageContent) -> VariableReport {
    let mut leftover: Vec<String> = Vec::new();
    for part in [
        Some(content.subject.as_str()),
        content.html_body.as_deref(),
        content.text_body.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        for caps in PLACEHOLDER.captures_iter(part) {
            let name = caps[1].to_string();
            if !leftover.contains(&name) {
                leftover.push(name);
            }
        }
    }

    let mut report = VariableReport::default();
    for name in REQUIRED_VARIABLES {
        if leftover.iter().any(|l| l == name) {
            report.missing.push(name.to_string());
        } else {
            report.present.push(name.to_string());
        }
    }
    report.unresolved = leftover
        .into_iter()
        .filter(|l| !REQUIRED_VARIABLES.contains(&l.as_str()))
        .collect();
    report
}

const BLOCK_ELEMENTS: [&str; 13] = [
    "p", "br", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "table", "hr",
];

/// Plain-text rendition of an HTML body
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let mut out = String::with_capacity(html.len());

    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => {
                let hidden = node
                    .ancestors()
                    .filter_map(|a| a.value().as_element())
                    .any(|e| matches!(e.name(), "style" | "script" | "title" | "head"));
                if !hidden {
                    out.push_str(text);
                }
            }
            Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name()) => out.push(' '),
            _ => {}
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

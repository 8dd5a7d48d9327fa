//! Message Template Models

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use uuid::Uuid;

use super::{Channel, MessageContent};

/// `{{key}}` placeholders, inner whitespace allowed
pub(crate) static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([a-zA-Z_][a-zA-Z0-9_]*)\s*\}\}").expect("placeholder pattern compiles")
});

/// Template variable definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVariable {
    /// Variable name
    pub name: String,
    /// Description
    pub description: Option<String>,
    /// Default value
    pub default: Option<String>,
    /// Whether required
    pub required: bool,
}

/// Message template.
///
/// Templates are never mutated by rendering; the resolver works on copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageTemplate {
    /// Unique identifier
    pub id: Uuid,
    /// Template name/key
    pub name: String,
    /// Template slug for lookup
    pub slug: String,
    /// Description
    pub description: Option<String>,
    /// Channel this template is written for, `None` for any
    pub channel: Option<Channel>,
    /// Subject line template
    pub subject: String,
    /// HTML body template
    pub html_body: Option<String>,
    /// Plain text body template
    pub text_body: Option<String>,
    /// Variable definitions
    pub variables: Vec<TemplateVariable>,
    /// Whether template is active
    pub active: bool,
    /// Version number
    pub version: u32,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl MessageTemplate {
    /// Extract variables from template content
    pub fn extract_variables(&self) -> Vec<String> {
        let content = format!(
            "{} {} {}",
            self.subject,
            self.text_body.as_deref().unwrap_or(""),
            self.html_body.as_deref().unwrap_or("")
        );

        let mut vars = Vec::new();
        for cap in PLACEHOLDER.captures_iter(&content) {
            let var_name = cap[1].to_string();
            if !vars.contains(&var_name) {
                vars.push(var_name);
            }
        }

        vars
    }

    /// Required variables absent from `provided`
    pub fn missing_variables<'a>(&'a self, provided: impl Fn(&str) -> bool) -> Vec<&'a str> {
        self.variables
            .iter()
            .filter(|v| v.required && !provided(&v.name))
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Defaults declared for optional variables
    pub fn defaults(&self) -> impl Iterator<Item = (&str, &str)> {
        self.variables
            .iter()
            .filter_map(|v| v.default.as_deref().map(|d| (v.name.as_str(), d)))
    }

    /// Copy of the template content, ready for resolution
    pub fn content(&self) -> MessageContent {
        MessageContent {
            subject: self.subject.clone(),
            html_body: self.html_body.clone(),
            text_body: self.text_body.clone(),
        }
    }
}

/// Template builder
#[derive(Debug, Default)]
pub struct TemplateBuilder {
    name: Option<String>,
    description: Option<String>,
    channel: Option<Channel>,
    subject: Option<String>,
    text_body: Option<String>,
    html_body: Option<String>,
    variables: Vec<TemplateVariable>,
}

impl TemplateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn text(mut self, body: &str) -> Self {
        self.text_body = Some(body.to_string());
        self
    }

    pub fn html(mut self, body: &str) -> Self {
        self.html_body = Some(body.to_string());
        self
    }

    pub fn variable(mut self, var: TemplateVariable) -> Self {
        self.variables.push(var);
        self
    }

    pub fn required_var(mut self, name: &str, description: &str) -> Self {
        self.variables.push(TemplateVariable {
            name: name.to_string(),
            description: Some(description.to_string()),
            default: None,
            required: true,
        });
        self
    }

    pub fn optional_var(mut self, name: &str, default: &str) -> Self {
        self.variables.push(TemplateVariable {
            name: name.to_string(),
            description: None,
            default: Some(default.to_string()),
            required: false,
        });
        self
    }

    pub fn build(self) -> Result<MessageTemplate, String> {
        let name = self.name.ok_or("Template name is required")?;
        let subject = match (self.subject, self.channel) {
            (Some(subject), _) => subject,
            (None, Some(channel)) if channel.is_phone() => String::new(),
            (None, _) => return Err("Subject is required".to_string()),
        };

        if self.text_body.is_none() && self.html_body.is_none() {
            return Err("Template must have a body (text or HTML)".to_string());
        }

        let now = Utc::now();
        Ok(MessageTemplate {
            id: Uuid::now_v7(),
            slug: slugify(&name),
            name,
            description: self.description,
            channel: self.channel,
            subject,
            text_body: self.text_body,
            html_body: self.html_body,
            variables: self.variables,
            active: true,
            version: 1,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Convert string to slug
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Quote Expiry Reminder"), "quote-expiry-reminder");
        assert_eq!(slugify("Invoice Due!"), "invoice-due");
        assert_eq!(slugify("  Multiple   Spaces  "), "multiple-spaces");
    }

    #[test]
    fn extracts_unique_variables_across_parts() {
        let template = TemplateBuilder::new()
            .name("welcome")
            .subject("Hi {{ user_name }}")
            .html("<a href=\"{{login_url}}\">{{user_name}}</a>")
            .text("{{login_url}}")
            .build()
            .unwrap();

        assert_eq!(template.extract_variables(), vec!["user_name", "login_url"]);
    }

    #[test]
    fn sms_templates_may_omit_subject() {
        let template = TemplateBuilder::new()
            .name("otp")
            .channel(Channel::Sms)
            .text("Your code is {{code}}")
            .build()
            .unwrap();
        assert!(template.subject.is_empty());

        let result = TemplateBuilder::new().name("no-subject").text("body").build();
        assert!(result.is_err());
    }

    #[test]
    fn reports_missing_required_variables() {
        let template = TemplateBuilder::new()
            .name("quote")
            .subject("Quote {{quote_number}}")
            .text("{{customer_name}}")
            .required_var("quote_number", "Quote number")
            .optional_var("customer_name", "Customer")
            .build()
            .unwrap();

        let missing = template.missing_variables(|name| name == "customer_name");
        assert_eq!(missing, vec!["quote_number"]);
        assert_eq!(template.defaults().collect::<Vec<_>>(), vec![("customer_name", "Customer")]);
    }
}

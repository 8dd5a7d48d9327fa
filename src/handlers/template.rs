//! Template Handler

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Channel, MessageTemplate, TemplateBuilder, TemplateRef, TemplateVariable, Variables};
use crate::services::template::{check_required_variables, VariableReport};
use crate::services::{TemplateResolver, TemplateService};

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    pub description: Option<String>,
    pub channel: Option<String>,
    pub subject: Option<String>,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub variables: Option<Vec<VariableDefinition>>,
}

#[derive(Debug, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    pub description: Option<String>,
    pub default: Option<String>,
    pub required: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub variables: Variables,
}

#[derive(Debug, Serialize)]
pub struct TemplateResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub channel: Option<String>,
    pub subject: String,
    pub has_text: bool,
    pub has_html: bool,
    pub variables: Vec<String>,
    pub active: bool,
    pub version: u32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize)]
pub struct TemplateDetailResponse {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub channel: Option<String>,
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub variables: Vec<TemplateVariable>,
    /// Placeholders found in subject and bodies
    pub placeholders: Vec<String>,
    pub active: bool,
    pub version: u32,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub subject: String,
    pub text_body: Option<String>,
    pub html_body: Option<String>,
    pub report: VariableReport,
}

/// Template handler
pub struct TemplateHandler {
    templates: Arc<TemplateService>,
    resolver: Arc<TemplateResolver>,
}

impl TemplateHandler {
    pub fn new(templates: Arc<TemplateService>, resolver: Arc<TemplateResolver>) -> Self {
        Self { templates, resolver }
    }

    /// Create template
    pub async fn create(&self, request: CreateTemplateRequest) -> Result<TemplateResponse, String> {
        let mut builder = TemplateBuilder::new().name(&request.name);

        if let Some(channel) = request.channel {
            builder = builder.channel(channel.parse::<Channel>()?);
        }
        if let Some(description) = request.description {
            builder = builder.description(&description);
        }
        if let Some(subject) = request.subject {
            builder = builder.subject(&subject);
        }
        if let Some(text) = request.text_body {
            builder = builder.text(&text);
        }
        if let Some(html) = request.html_body {
            builder = builder.html(&html);
        }
        for v in request.variables.unwrap_or_default() {
            builder = builder.variable(TemplateVariable {
                name: v.name,
                description: v.description,
                default: v.default,
                required: v.required.unwrap_or(false),
            });
        }

        let template = builder.build()?;
        self.templates
            .register(template.clone())
            .await
            .map_err(|e| e.to_string())?;

        Ok(Self::to_response(&template))
    }

    /// Get template by ID
    pub async fn get(&self, id: &str) -> Result<TemplateDetailResponse, String> {
        let uuid = Uuid::parse_str(id).map_err(|e| e.to_string())?;

        let template = self
            .templates
            .get(uuid)
            .await
            .ok_or_else(|| "Template not found".to_string())?;

        Ok(Self::to_detail_response(&template))
    }

    /// Get template by slug
    pub async fn get_by_slug(&self, slug: &str) -> Result<TemplateDetailResponse, String> {
        let template = self
            .templates
            .get_by_slug(slug)
            .await
            .ok_or_else(|| "Template not found".to_string())?;

        Ok(Self::to_detail_response(&template))
    }

    /// List templates
    pub async fn list(&self, channel: Option<&str>) -> Result<Vec<TemplateResponse>, String> {
        let channel = channel.map(|c| c.parse::<Channel>()).transpose()?;
        Ok(self
            .templates
            .list(channel)
            .await
            .iter()
            .map(Self::to_response)
            .collect())
    }

    /// Delete template
    pub async fn delete(&self, id: &str) -> Result<(), String> {
        let uuid = Uuid::parse_str(id).map_err(|e| e.to_string())?;
        self.templates.delete(uuid).await.map_err(|e| e.to_string())
    }

    /// Render a template for a tenant without queueing anything
    pub async fn preview(&self, slug: &str, request: PreviewRequest) -> Result<PreviewResponse, String> {
        let template = self
            .templates
            .find(&TemplateRef::from(slug))
            .await
            .map_err(|e| e.to_string())?;

        let defaults: Variables = template
            .defaults()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let resolved = self
            .resolver
            .resolve_layered(template.content(), &defaults, &request.variables, &request.tenant_id)
            .await;
        let report = check_required_variables(&resolved.content);

        Ok(PreviewResponse {
            subject: resolved.content.subject,
            text_body: resolved.content.text_body,
            html_body: resolved.content.html_body,
            report,
        })
    }

    fn to_response(template: &MessageTemplate) -> TemplateResponse {
        TemplateResponse {
            id: template.id.to_string(),
            name: template.name.clone(),
            slug: template.slug.clone(),
            description: template.description.clone(),
            channel: template.channel.map(|c| c.to_string()),
            subject: template.subject.clone(),
            has_text: template.text_body.is_some(),
            has_html: template.html_body.is_some(),
            variables: template.variables.iter().map(|v| v.name.clone()).collect(),
            active: template.active,
            version: template.version,
            created_at: template.created_at.to_rfc3339(),
            updated_at: template.updated_at.to_rfc3339(),
        }
    }

    fn to_detail_response(template: &MessageTemplate) -> TemplateDetailResponse {
        TemplateDetailResponse {
            id: template.id.to_string(),
            name: template.name.clone(),
            slug: template.slug.clone(),
            description: template.description.clone(),
            channel: template.channel.map(|c| c.to_string()),
            subject: template.subject.clone(),
            text_body: template.text_body.clone(),
            html_body: template.html_body.clone(),
            variables: template.variables.clone(),
            placeholders: template.extract_variables(),
            active: template.active,
            version: template.version,
        }
    }
}

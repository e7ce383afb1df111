//! Template records as served by the platform API.
//!
//! Templates are owned by the platform. This crate only fetches, indexes and
//! reads them; nothing here mutates a template after it has been decoded.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Entity kind whose creation triggers the "clone the new repo" notification.
pub const REPO_ENTITY_KIND: &str = "Repo";

fn default_kind() -> String {
    "Template".to_string()
}

/// Descriptive metadata for a template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadata {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

/// An entity kind a template creates when fulfilled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityKindRef {
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSpec {
    /// JSON Schema for the template inputs, encoded as a JSON string.
    #[serde(default)]
    pub input_json_schema: Option<String>,
    #[serde(default)]
    pub creates: Vec<EntityKindRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub metadata: TemplateMetadata,
    #[serde(default)]
    pub spec: TemplateSpec,
}

impl Template {
    /// Stable reference in the form `kind:namespace/name`.
    pub fn template_ref(&self) -> String {
        format!(
            "{}:{}/{}",
            self.kind, self.metadata.namespace, self.metadata.name
        )
    }

    pub fn title(&self) -> &str {
        &self.metadata.title
    }

    pub fn creates_kinds(&self) -> Vec<String> {
        self.spec.creates.iter().map(|c| c.kind.clone()).collect()
    }

    /// Decode the input schema. `Ok(None)` when the template declares none.
    pub fn input_schema(&self) -> Result<Option<Value>, serde_json::Error> {
        match self.spec.input_json_schema.as_deref().map(str::trim) {
            Some(raw) if !raw.is_empty() => serde_json::from_str(raw).map(Some),
            _ => Ok(None),
        }
    }

    pub fn summary(&self, result_index: Option<usize>) -> TemplateSummary {
        TemplateSummary {
            result_index,
            template_ref: self.template_ref(),
            name: self.metadata.name.clone(),
            title: self.metadata.title.clone(),
            description: self.metadata.description.clone(),
            tags: self.metadata.tags.clone(),
            creates: self.creates_kinds(),
        }
    }

    /// One markdown bullet describing the template, used in search results.
    pub fn markdown_bullet(&self) -> String {
        let mut line = format!("- **{}**: ", self.metadata.title);
        if self.spec.creates.is_empty() {
            line.push_str("Automation template. ");
        } else {
            line.push_str(&format!(
                "Creates {} entities. ",
                self.creates_kinds().join(", ")
            ));
        }
        let description = self
            .metadata
            .description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.metadata.title);
        line.push_str(description);
        line.push('\n');
        line
    }
}

/// Compact view of a template handed to the agent as context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_index: Option<usize>,
    #[serde(rename = "ref")]
    pub template_ref: String,
    pub name: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub creates: Vec<String>,
}

#[cfg(test)]
pub(crate) fn sample_template(name: &str, title: &str, schema: Option<Value>) -> Template {
    Template {
        kind: "Template".to_string(),
        metadata: TemplateMetadata {
            namespace: "default".to_string(),
            name: name.to_string(),
            title: title.to_string(),
            description: Some(format!("Blueprint for {}", title)),
            tags: Vec::new(),
            provider: Some("github.com".to_string()),
        },
        spec: TemplateSpec {
            input_json_schema: schema.map(|s| s.to_string()),
            creates: Vec::new(),
        },
    }
}

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GenerateRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelInfo>,
}

/// One installed model as reported by `GET /api/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl ModelInfo {
    /// Name without the implicit `:latest` tag.
    pub fn display_name(&self) -> &str {
        self.name.strip_suffix(":latest").unwrap_or(&self.name)
    }

    /// True if `name` refers to this model, with or without `:latest`.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.strip_suffix(":latest").unwrap_or(name);
        self.display_name() == name
    }
}

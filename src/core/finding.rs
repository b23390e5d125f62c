use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(rename = "templateID", alias = "template-id", default)]
    pub template_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "matched-at", default)]
    pub matched_at: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "matcher-name", alias = "matcher_name", default)]
    pub matcher_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

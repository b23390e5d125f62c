use crate::core::{Confidence, CsfFunction};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(rename = "templateID")]
    pub template_id: String,
    #[serde(default)]
    pub host: String,
    #[serde(rename = "matched-at", default)]
    pub matched_at: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "matcher-name", default)]
    pub matcher_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub csf_subcategory_id: String,
    pub confidence: Confidence,
    pub rationale: String,
    pub csf_function: CsfFunction,
    pub csf_subcategory_name: String,
    pub weight: f64,
    pub recommendation: String,
}

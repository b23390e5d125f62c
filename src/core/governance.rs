use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceAnswer {
    pub csf_function: String,
    pub csf_subcategory_id: String,
    pub csf_subcategory_name: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceAssessmentEntry {
    pub csf_subcategory_id: String,
    pub csf_subcategory_name: String,
    pub response: String,
    pub score: Option<f64>,
    pub weight: Option<f64>,
    pub recommendation: String,
    pub assessment_score: String,
    pub gap_score: String,
}

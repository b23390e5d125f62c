use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanHeatmapEntry {
    pub csf_subcategory_id: String,
    pub name: String,
    pub count: u64,
    pub max_severity: String,
    pub weighted_score: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceHeatmapEntry {
    pub csf_subcategory_id: String,
    pub name: String,
    pub response: String,
    pub severity: String,
    pub gap_score: String,
}

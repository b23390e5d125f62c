use crate::core::{
    ClassifiedRecord, Finding, GovernanceAssessmentEntry, GovernanceHeatmapEntry, ScanHeatmapEntry,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total_findings: usize,
    pub total_records: usize,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub schema_version: String,
    pub tool_version: String,
    pub generated_at: String,
    pub summary: ReportSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<ClassifiedRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scan_heatmap: Vec<ScanHeatmapEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub governance_assessment: Vec<GovernanceAssessmentEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub governance_heatmap: Vec<GovernanceHeatmapEntry>,
}

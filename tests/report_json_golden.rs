use csfheat::core::{
    ClassifiedRecord, Confidence, CsfFunction, Finding, GovernanceAssessmentEntry,
    GovernanceHeatmapEntry, Report, ReportSummary, ScanHeatmapEntry,
};

#[test]
fn report_json_matches_golden() {
    let report = Report {
        schema_version: "1.0".to_string(),
        tool_version: "0.1.0".to_string(),
        generated_at: "2026-01-01T00:00:00Z".to_string(),
        summary: ReportSummary {
            total_findings: 2,
            total_records: 1,
            notes: vec!["note-1".to_string()],
        },
        findings: vec![Finding {
            template_id: "ssl/weak-cipher".to_string(),
            host: "https://a.example.com".to_string(),
            matched_at: "https://a.example.com:443".to_string(),
            severity: "high".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            matcher_name: "tls10".to_string(),
            description: "Weak cipher suites accepted".to_string(),
            tags: vec!["tls".to_string(), "ssl".to_string()],
        }],
        records: vec![ClassifiedRecord {
            template_id: "ssl/weak-cipher".to_string(),
            host: "https://a.example.com".to_string(),
            matched_at: "https://a.example.com:443".to_string(),
            severity: "high".to_string(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
            matcher_name: "tls10".to_string(),
            description: "Weak cipher suites accepted".to_string(),
            tags: Vec::new(),
            csf_subcategory_id: "PR.DS-02".to_string(),
            confidence: Confidence::High,
            rationale: "tls-weaknesses: Transport security affects data in transit".to_string(),
            csf_function: CsfFunction::Protect,
            csf_subcategory_name: "Data-in-transit protected".to_string(),
            weight: 1.5,
            recommendation: "Enforce TLS".to_string(),
        }],
        scan_heatmap: vec![ScanHeatmapEntry {
            csf_subcategory_id: "PR.DS-02".to_string(),
            name: "Data-in-transit protected".to_string(),
            count: 2,
            max_severity: "high".to_string(),
            weighted_score: "5.54".to_string(),
        }],
        governance_assessment: vec![GovernanceAssessmentEntry {
            csf_subcategory_id: "GV.PO-01".to_string(),
            csf_subcategory_name: "Policy established".to_string(),
            response: "Partial".to_string(),
            score: Some(0.5),
            weight: Some(2.0),
            recommendation: "Publish the security policy".to_string(),
            assessment_score: "1.00".to_string(),
            gap_score: "1.00".to_string(),
        }],
        governance_heatmap: vec![GovernanceHeatmapEntry {
            csf_subcategory_id: "GV.PO-01".to_string(),
            name: "Policy established".to_string(),
            response: "Partial".to_string(),
            severity: "medium".to_string(),
            gap_score: "1.00".to_string(),
        }],
    };

    let actual = serde_json::to_value(&report).expect("serialize report");
    let expected: serde_json::Value =
        serde_json::from_str(include_str!("golden/report.json")).expect("parse golden json");

    assert_eq!(actual, expected);
}

#[test]
fn report_json_skips_empty_sections() {
    let report = Report {
        schema_version: "1.0".to_string(),
        tool_version: "0.1.0".to_string(),
        generated_at: "2026-01-01T00:00:00Z".to_string(),
        summary: ReportSummary {
            total_findings: 0,
            total_records: 0,
            notes: Vec::new(),
        },
        findings: Vec::new(),
        records: Vec::new(),
        scan_heatmap: Vec::new(),
        governance_assessment: Vec::new(),
        governance_heatmap: Vec::new(),
    };

    let v = serde_json::to_value(&report).expect("serialize report");
    assert!(v.get("findings").is_none());
    assert!(v.get("records").is_none());
    assert!(v.get("scan_heatmap").is_none());
    assert!(v.get("governance_assessment").is_none());
    assert!(v.get("governance_heatmap").is_none());
    assert!(v.get("summary").is_some());
}

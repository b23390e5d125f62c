use std::collections::BTreeMap;

use serde_json::Value;

use crate::core::{ClassifiedRecord, ScanHeatmapEntry, Severity};
use crate::reference::Reference;

struct Group {
    count: u64,
    max_ordinal: u8,
}

pub fn aggregate(records: &[ClassifiedRecord], reference: &Reference) -> Vec<ScanHeatmapEntry> {
    build(
        records.iter().map(|r| {
            (
                r.csf_subcategory_id.as_str(),
                Severity::parse_lenient(&r.severity),
            )
        }),
        reference,
    )
}

/// 形の揃っていない行集合むけのゆるい集計。
///
/// 必須2列（csf_subcategory_id / severity）がどの行にも無ければ空を返す。
/// 個々の行で id を欠くものは読み飛ばし、severity を欠くものは info 扱い。
pub fn aggregate_rows(rows: &[Value], reference: &Reference) -> Vec<ScanHeatmapEntry> {
    let has_id = rows.iter().any(|r| r.get("csf_subcategory_id").is_some());
    let has_severity = rows.iter().any(|r| r.get("severity").is_some());
    if !has_id || !has_severity {
        return Vec::new();
    }

    build(
        rows.iter().filter_map(|row| {
            let id = row.get("csf_subcategory_id")?.as_str()?;
            let severity = row.get("severity").and_then(Value::as_str).unwrap_or("");
            Some((id, Severity::parse_lenient(severity)))
        }),
        reference,
    )
}

fn build<'a>(
    pairs: impl Iterator<Item = (&'a str, Severity)>,
    reference: &Reference,
) -> Vec<ScanHeatmapEntry> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for (id, severity) in pairs {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }
        let g = groups.entry(id.to_string()).or_insert(Group {
            count: 0,
            max_ordinal: 0,
        });
        g.count += 1;
        g.max_ordinal = g.max_ordinal.max(severity.ordinal());
    }

    // 参照に無いIDも落とさない。名前はID自身、重みは1.0に落ちる。
    let mut scored: Vec<(f64, ScanHeatmapEntry)> = groups
        .into_iter()
        .map(|(id, g)| {
            let (name, weight) = match reference.get(&id) {
                Some(info) if !info.name.is_empty() => (info.name.clone(), info.weight),
                Some(info) => (id.clone(), info.weight),
                None => (id.clone(), 1.0),
            };
            // 深刻度が支配項、件数は対数でしか効かない。
            let score = weight * (f64::from(g.max_ordinal) + (g.count as f64).ln_1p());
            let entry = ScanHeatmapEntry {
                csf_subcategory_id: id,
                name,
                count: g.count,
                max_severity: Severity::from_ordinal(g.max_ordinal).as_str().to_string(),
                weighted_score: format!("{score:.2}"),
            };
            (score, entry)
        })
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.csf_subcategory_id.cmp(&b.1.csf_subcategory_id))
    });

    scored.into_iter().map(|(_, entry)| entry).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Confidence, CsfFunction};
    use serde_json::json;

    const LOOKUP_CSV: &str = "\
csf_subcategory_id,csf_subcategory_name,weight,recommendation
ID.AM-02,Software inventories maintained,1.0,Inventory exposed services
DE.CM-01,Networks monitored,1.5,Monitor network telemetry
PR.IR-01,Networks protected,1.0,Harden transport security
";

    fn reference() -> Reference {
        Reference::from_reader(LOOKUP_CSV.as_bytes()).expect("reference")
    }

    fn record(subcategory_id: &str, severity: &str) -> ClassifiedRecord {
        ClassifiedRecord {
            template_id: "t/x".to_string(),
            host: String::new(),
            matched_at: String::new(),
            severity: severity.to_string(),
            timestamp: String::new(),
            matcher_name: String::new(),
            description: String::new(),
            tags: Vec::new(),
            csf_subcategory_id: subcategory_id.to_string(),
            confidence: Confidence::Medium,
            rationale: String::new(),
            csf_function: CsfFunction::Unknown,
            csf_subcategory_name: String::new(),
            weight: 1.0,
            recommendation: String::new(),
        }
    }

    #[test]
    fn empty_input_yields_empty_heatmap() {
        assert!(aggregate(&[], &reference()).is_empty());
    }

    #[test]
    fn critical_plus_info_scores_with_log_dampening() {
        let records = vec![record("ID.AM-02", "critical"), record("ID.AM-02", "info")];
        let heatmap = aggregate(&records, &reference());
        assert_eq!(heatmap.len(), 1);

        let entry = &heatmap[0];
        assert_eq!(entry.csf_subcategory_id, "ID.AM-02");
        assert_eq!(entry.name, "Software inventories maintained");
        assert_eq!(entry.count, 2);
        assert_eq!(entry.max_severity, "critical");
        // 1.0 * (4 + ln 3) = 5.0986...
        assert_eq!(entry.weighted_score, "5.10");
    }

    #[test]
    fn sorts_descending_by_score_with_id_tiebreak() {
        let records = vec![
            record("PR.IR-01", "low"),
            record("ID.AM-02", "low"),
            record("DE.CM-01", "high"),
        ];
        let heatmap = aggregate(&records, &reference());
        let ids: Vec<&str> = heatmap
            .iter()
            .map(|e| e.csf_subcategory_id.as_str())
            .collect();
        // DE.CM-01: 1.5*(3+ln2)=5.54、残り2つは同点 1.0*(1+ln2)=1.69 → ID昇順。
        assert_eq!(ids, ["DE.CM-01", "ID.AM-02", "PR.IR-01"]);
        assert_eq!(heatmap[1].weighted_score, heatmap[2].weighted_score);
    }

    #[test]
    fn missing_reference_row_falls_back_to_id_and_unit_weight() {
        let records = vec![record("GV.OC-01", "medium")];
        let heatmap = aggregate(&records, &reference());
        assert_eq!(heatmap.len(), 1);
        assert_eq!(heatmap[0].name, "GV.OC-01");
        // 1.0 * (2 + ln 2) = 2.69
        assert_eq!(heatmap[0].weighted_score, "2.69");
    }

    #[test]
    fn unknown_severity_counts_as_info() {
        let records = vec![record("ID.AM-02", "bogus"), record("ID.AM-02", "")];
        let heatmap = aggregate(&records, &reference());
        assert_eq!(heatmap[0].max_severity, "info");
        // 1.0 * (0 + ln 3) = 1.10
        assert_eq!(heatmap[0].weighted_score, "1.10");
    }

    #[test]
    fn aggregation_is_idempotent() {
        let records = vec![
            record("ID.AM-02", "critical"),
            record("DE.CM-01", "low"),
            record("ID.AM-02", "info"),
        ];
        let first = aggregate(&records, &reference());
        let second = aggregate(&records, &reference());
        assert_eq!(first, second);
    }

    #[test]
    fn rows_without_required_columns_yield_empty() {
        let reference = reference();
        let rows = vec![json!({"severity": "high"}), json!({"severity": "low"})];
        assert!(aggregate_rows(&rows, &reference).is_empty());

        let rows = vec![json!({"csf_subcategory_id": "ID.AM-02"})];
        assert!(aggregate_rows(&rows, &reference).is_empty());
    }

    #[test]
    fn rows_with_partial_shape_are_tolerated() {
        let reference = reference();
        let rows = vec![
            json!({"csf_subcategory_id": "ID.AM-02", "severity": "high", "extra": 1}),
            json!({"severity": "critical"}),
            json!({"csf_subcategory_id": "ID.AM-02"}),
        ];
        let heatmap = aggregate_rows(&rows, &reference);
        assert_eq!(heatmap.len(), 1);
        assert_eq!(heatmap[0].count, 2);
        assert_eq!(heatmap[0].max_severity, "high");
    }
}

use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::{GovernanceAnswer, GovernanceAssessmentEntry, GovernanceHeatmapEntry};
use crate::reference::Reference;

pub fn load_checklist(path: &Path) -> Result<Vec<GovernanceAnswer>> {
    if !path.is_file() {
        return Err(anyhow!(
            "ガバナンスチェックリストが見つかりません: {}",
            path.display()
        ));
    }
    let file = std::fs::File::open(path).with_context(|| {
        format!(
            "ガバナンスチェックリストを開けませんでした: {}",
            path.display()
        )
    })?;
    checklist_from_reader(file).with_context(|| {
        format!(
            "ガバナンスチェックリストの解析に失敗しました: {}",
            path.display()
        )
    })
}

pub fn checklist_from_reader<R: Read>(reader: R) -> Result<Vec<GovernanceAnswer>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr
        .headers()
        .context("チェックリストCSVのヘッダーを読み取れませんでした")?
        .clone();
    let find = |name: &str| headers.iter().position(|h| h.trim() == name);

    let (idx_function, idx_id, idx_name, idx_response) = match (
        find("csf_function"),
        find("csf_subcategory_id"),
        find("csf_subcategory_name"),
        find("response"),
    ) {
        (Some(f), Some(i), Some(n), Some(r)) => (f, i, n, r),
        (f, i, n, r) => {
            let mut missing = Vec::new();
            if f.is_none() {
                missing.push("csf_function");
            }
            if i.is_none() {
                missing.push("csf_subcategory_id");
            }
            if n.is_none() {
                missing.push("csf_subcategory_name");
            }
            if r.is_none() {
                missing.push("response");
            }
            return Err(anyhow!(
                "チェックリストに必須列がありません: {}",
                missing.join(", ")
            ));
        }
    };
    let idx_notes = find("notes");

    let mut answers = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| {
            format!("チェックリストCSVの {} 行目を読み取れませんでした", i + 2)
        })?;
        let notes = idx_notes
            .and_then(|j| record.get(j))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        answers.push(GovernanceAnswer {
            csf_function: record.get(idx_function).unwrap_or("").trim().to_string(),
            csf_subcategory_id: record.get(idx_id).unwrap_or("").trim().to_string(),
            csf_subcategory_name: record.get(idx_name).unwrap_or("").trim().to_string(),
            // 回答は厳密一致で採点するためトリムもしない。
            response: record.get(idx_response).unwrap_or("").to_string(),
            notes,
        });
    }

    answers.sort_by(|a, b| b.csf_subcategory_id.cmp(&a.csf_subcategory_id));
    Ok(answers)
}

// Yes/Partial/No は大文字小文字まで厳密に見る。崩れた回答は点数なしとして伝播する。
fn response_score(response: &str) -> Option<f64> {
    match response {
        "Yes" => Some(1.0),
        "Partial" => Some(0.5),
        "No" => Some(0.0),
        _ => None,
    }
}

fn format_score(v: Option<f64>) -> String {
    match v {
        Some(v) => format!("{v:.2}"),
        None => "NaN".to_string(),
    }
}

pub fn score(
    answers: &[GovernanceAnswer],
    reference: &Reference,
) -> Vec<GovernanceAssessmentEntry> {
    answers
        .iter()
        .map(|answer| {
            let score = response_score(&answer.response);
            let (weight, recommendation) = match reference.get(&answer.csf_subcategory_id) {
                Some(info) => (Some(info.weight), info.recommendation.clone()),
                None => (None, String::new()),
            };
            let assessment = match (score, weight) {
                (Some(s), Some(w)) => Some(s * w),
                _ => None,
            };
            let gap = match (assessment, weight) {
                (Some(a), Some(w)) => Some(w - a),
                _ => None,
            };
            GovernanceAssessmentEntry {
                csf_subcategory_id: answer.csf_subcategory_id.clone(),
                csf_subcategory_name: answer.csf_subcategory_name.clone(),
                response: answer.response.clone(),
                score,
                weight,
                recommendation,
                assessment_score: format_score(assessment),
                gap_score: format_score(gap),
            }
        })
        .collect()
}

// 達成度が weight に届かない度合いで熱さを決める。点数が出せない行は最も熱い扱い。
fn bucket(assessment: Option<f64>, weight: Option<f64>) -> &'static str {
    let (Some(a), Some(w)) = (assessment, weight) else {
        return "high";
    };
    if a.is_nan() || w.is_nan() {
        return "high";
    }
    if a <= 0.0 {
        "high"
    } else if a < w {
        "medium"
    } else {
        "low"
    }
}

/// 評価結果からギャップ順のヒートマップを組み立てる。
///
/// ギャップは整形済みの assessment_score 文字列を数値へ戻してから引き直す。
/// 評価CSVと同じ丸めを通した値でギャップを報告するための措置。
pub fn heatmap_from_assessment(
    assessment: &[GovernanceAssessmentEntry],
) -> Vec<GovernanceHeatmapEntry> {
    let mut scored: Vec<(f64, GovernanceHeatmapEntry)> = assessment
        .iter()
        .map(|entry| {
            let parsed = entry
                .assessment_score
                .parse::<f64>()
                .ok()
                .filter(|v| !v.is_nan());
            let weight = entry.weight.filter(|v| !v.is_nan());
            let gap = match (parsed, weight) {
                (Some(a), Some(w)) => w - a,
                _ => f64::NAN,
            };
            let heatmap_entry = GovernanceHeatmapEntry {
                csf_subcategory_id: entry.csf_subcategory_id.clone(),
                name: entry.csf_subcategory_name.clone(),
                response: entry.response.clone(),
                severity: bucket(parsed, weight).to_string(),
                gap_score: format!("{gap:.2}"),
            };
            (gap, heatmap_entry)
        })
        .collect();

    // ギャップ降順、同点はID昇順。ギャップ不明の行は常に末尾。
    scored.sort_by(|a, b| match (a.0.is_nan(), b.0.is_nan()) {
        (true, true) => a.1.csf_subcategory_id.cmp(&b.1.csf_subcategory_id),
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b
            .0
            .partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.csf_subcategory_id.cmp(&b.1.csf_subcategory_id)),
    });

    scored.into_iter().map(|(_, entry)| entry).collect()
}

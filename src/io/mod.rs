use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;

use crate::core::{
    ClassifiedRecord, Finding, GovernanceAssessmentEntry, GovernanceHeatmapEntry, ScanHeatmapEntry,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Jsonl,
    Csv,
}

impl OutputFormat {
    pub const fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
            OutputFormat::Csv => "csv",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "jsonl" => Ok(OutputFormat::Jsonl),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(format!(
                "出力形式が不正です: {other}（json|jsonl|csv を指定してください）"
            )),
        }
    }
}

/// CSVの1行へ落とせるレコード。列順は各型のJSONフィールド順と揃える。
pub trait CsvRecord {
    fn csv_header() -> &'static [&'static str];
    fn csv_row(&self) -> Vec<String>;
}

fn join_tags(tags: &[String]) -> String {
    tags.join(",")
}

fn opt_f64(v: Option<f64>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => "NaN".to_string(),
    }
}

impl CsvRecord for Finding {
    fn csv_header() -> &'static [&'static str] {
        &[
            "templateID",
            "host",
            "matched-at",
            "severity",
            "timestamp",
            "matcher-name",
            "description",
            "tags",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.template_id.clone(),
            self.host.clone(),
            self.matched_at.clone(),
            self.severity.clone(),
            self.timestamp.clone(),
            self.matcher_name.clone(),
            self.description.clone(),
            join_tags(&self.tags),
        ]
    }
}

impl CsvRecord for ClassifiedRecord {
    fn csv_header() -> &'static [&'static str] {
        &[
            "templateID",
            "host",
            "matched-at",
            "severity",
            "timestamp",
            "matcher-name",
            "description",
            "tags",
            "csf_subcategory_id",
            "confidence",
            "rationale",
            "csf_function",
            "csf_subcategory_name",
            "weight",
            "recommendation",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.template_id.clone(),
            self.host.clone(),
            self.matched_at.clone(),
            self.severity.clone(),
            self.timestamp.clone(),
            self.matcher_name.clone(),
            self.description.clone(),
            join_tags(&self.tags),
            self.csf_subcategory_id.clone(),
            self.confidence.to_string(),
            self.rationale.clone(),
            self.csf_function.to_string(),
            self.csf_subcategory_name.clone(),
            self.weight.to_string(),
            self.recommendation.clone(),
        ]
    }
}

impl CsvRecord for ScanHeatmapEntry {
    fn csv_header() -> &'static [&'static str] {
        &[
            "csf_subcategory_id",
            "name",
            "count",
            "max_severity",
            "weighted_score",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.csf_subcategory_id.clone(),
            self.name.clone(),
            self.count.to_string(),
            self.max_severity.clone(),
            self.weighted_score.clone(),
        ]
    }
}

impl CsvRecord for GovernanceAssessmentEntry {
    fn csv_header() -> &'static [&'static str] {
        &[
            "csf_subcategory_id",
            "csf_subcategory_name",
            "response",
            "score",
            "weight",
            "recommendation",
            "assessment_score",
            "gap_score",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.csf_subcategory_id.clone(),
            self.csf_subcategory_name.clone(),
            self.response.clone(),
            opt_f64(self.score),
            opt_f64(self.weight),
            self.recommendation.clone(),
            self.assessment_score.clone(),
            self.gap_score.clone(),
        ]
    }
}

impl CsvRecord for GovernanceHeatmapEntry {
    fn csv_header() -> &'static [&'static str] {
        &[
            "csf_subcategory_id",
            "name",
            "response",
            "severity",
            "gap_score",
        ]
    }

    fn csv_row(&self) -> Vec<String> {
        vec![
            self.csf_subcategory_id.clone(),
            self.name.clone(),
            self.response.clone(),
            self.severity.clone(),
            self.gap_score.clone(),
        ]
    }
}

pub fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!(
                    "出力ディレクトリを作成できませんでした: {}",
                    parent.display()
                )
            })?;
        }
    }
    Ok(())
}

/// 空データのときはファイルを作らず false を返す。
pub fn write_csv<T: CsvRecord>(path: &Path, records: &[T]) -> Result<bool> {
    if records.is_empty() {
        return Ok(false);
    }
    ensure_parent(path)?;

    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("CSVを書き出せませんでした: {}", path.display()))?;
    wtr.write_record(T::csv_header())
        .with_context(|| format!("CSVを書き出せませんでした: {}", path.display()))?;
    for record in records {
        wtr.write_record(record.csv_row())
            .with_context(|| format!("CSVを書き出せませんでした: {}", path.display()))?;
    }
    wtr.flush()
        .with_context(|| format!("CSVを書き出せませんでした: {}", path.display()))?;
    Ok(true)
}

pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    ensure_parent(path)?;
    let mut json = serde_json::to_string_pretty(data).context("JSONへの変換に失敗しました")?;
    json.push('\n');
    std::fs::write(path, json)
        .with_context(|| format!("JSONを書き出せませんでした: {}", path.display()))?;
    Ok(())
}

pub fn write_json_records<T: Serialize>(path: &Path, records: &[T]) -> Result<bool> {
    if records.is_empty() {
        return Ok(false);
    }
    write_json_file(path, records)?;
    Ok(true)
}

pub fn write_jsonl<T: Serialize>(path: &Path, records: &[T]) -> Result<bool> {
    if records.is_empty() {
        return Ok(false);
    }
    ensure_parent(path)?;

    let mut out = String::new();
    for record in records {
        let line = serde_json::to_string(record).context("JSONへの変換に失敗しました")?;
        out.push_str(&line);
        out.push('\n');
    }
    std::fs::write(path, out)
        .with_context(|| format!("JSONLを書き出せませんでした: {}", path.display()))?;
    Ok(true)
}

/// JSON（配列または単一オブジェクト）を読み、失敗したらJSONLとして読み直す。
pub fn load_json_rows(path: &Path) -> Result<Vec<Value>> {
    if !path.is_file() {
        return Err(anyhow!("入力ファイルが見つかりません: {}", path.display()));
    }
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("入力ファイルの読み取りに失敗しました: {}", path.display()))?;

    match serde_json::from_str::<Value>(&s) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(value @ Value::Object(_)) => Ok(vec![value]),
        Ok(_) => Err(anyhow!(
            "入力JSONはリストまたはオブジェクトである必要があります: {}",
            path.display()
        )),
        Err(_) => {
            let mut rows = Vec::new();
            for (i, line) in s.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line).with_context(|| {
                    format!(
                        "{} 行目をJSONとして解析できません: {}",
                        i + 1,
                        path.display()
                    )
                })?;
                rows.push(value);
            }
            Ok(rows)
        }
    }
}

pub fn load_findings(path: &Path) -> Result<Vec<Finding>> {
    let rows = load_json_rows(path)?;
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| {
            serde_json::from_value(row).with_context(|| {
                format!("{} 件目の finding を解釈できません: {}", i + 1, path.display())
            })
        })
        .collect()
}

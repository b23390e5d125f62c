use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use crate::core::Finding;

/// nucleiの生JSONを正規化済みの finding 列へ変換する。
///
/// nucleiはバージョンや起動方法によって単一オブジェクト・配列・JSONLの
/// いずれも吐きうるし、`template-id`/`templateID` や `host`/`url` のような
/// フィールド名ゆれもある。呼び出し側に条件分岐を散らさないよう、
/// 形のゆれはすべてここで吸収する。
pub fn convert_value(raw: &Value) -> Result<Vec<Finding>> {
    match raw {
        Value::Object(_) => Ok(vec![convert_entry(raw)]),
        Value::Array(items) => {
            let mut findings = Vec::with_capacity(items.len());
            for item in items {
                if !item.is_object() {
                    return Err(anyhow!(
                        "nuclei出力の各要素はオブジェクトである必要があります"
                    ));
                }
                findings.push(convert_entry(item));
            }
            Ok(findings)
        }
        _ => Err(anyhow!(
            "nuclei出力はオブジェクトまたは配列である必要があります"
        )),
    }
}

pub fn convert_str(s: &str) -> Result<Vec<Finding>> {
    match serde_json::from_str::<Value>(s) {
        Ok(raw) => convert_value(&raw),
        Err(_) => {
            // 1行1オブジェクトのJSONLにも耐える。
            let mut findings = Vec::new();
            for (i, line) in s.lines().enumerate() {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let value: Value = serde_json::from_str(line).with_context(|| {
                    format!("nuclei出力の {} 行目をJSONとして解析できません", i + 1)
                })?;
                if !value.is_object() {
                    return Err(anyhow!(
                        "nuclei出力の {} 行目がオブジェクトではありません",
                        i + 1
                    ));
                }
                findings.push(convert_entry(&value));
            }
            Ok(findings)
        }
    }
}

pub fn convert_file(path: &Path) -> Result<Vec<Finding>> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("nuclei出力の読み取りに失敗しました: {}", path.display()))?;
    convert_str(&s)
        .with_context(|| format!("nuclei出力の変換に失敗しました: {}", path.display()))
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn pick<'a>(entry: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().filter_map(|k| entry.get(*k)).find(|v| truthy(v))
}

// 連続する空白・改行を1つの空白へ畳む。
fn clean_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.split_whitespace().collect::<Vec<_>>().join(" "),
        Some(other) => other.to_string(),
    }
}

fn extract_tags(info: Option<&Value>) -> Vec<String> {
    let Some(tags) = info.and_then(|i| i.get("tags")) else {
        return Vec::new();
    };
    let normalize = |t: &str| t.trim().to_lowercase();
    match tags {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(normalize)
            .filter(|t| !t.is_empty())
            .collect(),
        Value::String(joined) => joined
            .split(',')
            .map(normalize)
            .filter(|t| !t.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn convert_entry(entry: &Value) -> Finding {
    let info = entry.get("info").filter(|v| v.is_object());

    let severity = info.and_then(|i| i.get("severity"));
    let description = info.and_then(|i| pick(i, &["description", "name"]));
    let fallback_matcher = info.and_then(|i| i.get("name")).filter(|v| truthy(v));
    let matcher = entry
        .get("matcher-name")
        .filter(|v| truthy(v))
        .or(fallback_matcher);

    Finding {
        template_id: clean_text(pick(entry, &["template-id", "templateID"])),
        host: clean_text(pick(entry, &["host", "url", "matched-at"])),
        matched_at: clean_text(pick(entry, &["matched-at", "url"])),
        severity: clean_text(severity),
        timestamp: clean_text(entry.get("timestamp")),
        matcher_name: clean_text(matcher),
        description: clean_text(description),
        tags: extract_tags(info),
    }
}

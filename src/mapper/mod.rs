use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::{ClassifiedRecord, Confidence, CsfFunction, Finding, Severity};
use crate::reference::Reference;
use crate::rules::RuleSet;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTemplateCache {
    Map(BTreeMap<String, RawCacheEntry>),
    List(Vec<RawCacheListEntry>),
}

#[derive(Debug, Deserialize)]
struct RawCacheEntry {
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawCacheListEntry {
    id: Option<String>,
    template_id: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// テンプレートID → タグの補完キャッシュ。ファイルが無ければ空のまま動く。
#[derive(Debug, Clone, Default)]
pub struct TemplateCache {
    tags_by_template: BTreeMap<String, Vec<String>>,
}

impl TemplateCache {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path).with_context(|| {
            format!(
                "テンプレートキャッシュの読み取りに失敗しました: {}",
                path.display()
            )
        })?;
        Self::from_json_str(&s).with_context(|| {
            format!(
                "テンプレートキャッシュの解析に失敗しました: {}",
                path.display()
            )
        })
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        let raw: RawTemplateCache =
            serde_json::from_str(s).context("テンプレートキャッシュ(JSON)の解析に失敗しました")?;

        let mut tags_by_template = BTreeMap::new();
        match raw {
            RawTemplateCache::Map(entries) => {
                for (template_id, entry) in entries {
                    tags_by_template.insert(template_id, entry.tags);
                }
            }
            RawTemplateCache::List(entries) => {
                for entry in entries {
                    let Some(template_id) = entry.id.or(entry.template_id) else {
                        continue;
                    };
                    tags_by_template.insert(template_id, entry.tags);
                }
            }
        }
        Ok(Self { tags_by_template })
    }

    pub fn tags_for(&self, template_id: &str) -> Option<&[String]> {
        self.tags_by_template.get(template_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tags_by_template.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags_by_template.is_empty()
    }
}

struct Mapping<'a> {
    subcategory_id: &'a str,
    confidence: Confidence,
    rationale: &'a str,
}

pub struct Classifier<'a> {
    rules: &'a RuleSet,
    reference: &'a Reference,
    cache: &'a TemplateCache,
}

impl<'a> Classifier<'a> {
    pub fn new(rules: &'a RuleSet, reference: &'a Reference, cache: &'a TemplateCache) -> Self {
        Self {
            rules,
            reference,
            cache,
        }
    }

    /// 1件の finding を0個以上の分類レコードへ展開する。
    ///
    /// オーバーライドがあればルール評価は完全にスキップされる。どのルールにも
    /// 当たらない finding は空を返す（エラーではない）。
    pub fn classify(&self, finding: &Finding) -> Vec<ClassifiedRecord> {
        let mappings = match self.rules.override_for(&finding.template_id) {
            Some(o) => o
                .subcategories
                .iter()
                .map(|id| Mapping {
                    subcategory_id: id,
                    confidence: o.confidence,
                    rationale: &o.rationale,
                })
                .collect(),
            None => self.rule_mappings(finding),
        };

        mappings
            .into_iter()
            .map(|m| self.enrich(finding, m))
            .collect()
    }

    pub fn classify_all(&self, findings: &[Finding]) -> Vec<ClassifiedRecord> {
        findings.iter().flat_map(|f| self.classify(f)).collect()
    }

    // 全ての一致ルールが寄与する（first-match-wins ではない）。重複IDもそのまま残す。
    fn rule_mappings(&self, finding: &Finding) -> Vec<Mapping<'a>> {
        let severity = Severity::parse_lenient(&finding.severity);
        let tags = self.effective_tags(finding);

        let mut out = Vec::new();
        for rule in &self.rules.rules {
            if rule.matches(severity, &tags) {
                for id in &rule.subcategories {
                    out.push(Mapping {
                        subcategory_id: id,
                        confidence: rule.confidence,
                        rationale: &rule.rationale,
                    });
                }
            }
        }
        out
    }

    // タグ欠落時のみキャッシュから補完する。出力レコードには元のタグをそのまま残す。
    fn effective_tags(&self, finding: &Finding) -> Vec<String> {
        let source: &[String] = if finding.tags.is_empty() {
            self.cache.tags_for(&finding.template_id).unwrap_or(&[])
        } else {
            &finding.tags
        };
        source
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn enrich(&self, finding: &Finding, mapping: Mapping<'_>) -> ClassifiedRecord {
        // 参照に無いIDでも分類は落とさず Unknown として合成する。
        let (function, name, weight, recommendation) =
            match self.reference.get(mapping.subcategory_id) {
                Some(info) => (
                    info.function,
                    info.name.clone(),
                    info.weight,
                    info.recommendation.clone(),
                ),
                None => (CsfFunction::Unknown, String::new(), 1.0, String::new()),
            };

        ClassifiedRecord {
            template_id: finding.template_id.clone(),
            host: finding.host.clone(),
            matched_at: finding.matched_at.clone(),
            severity: finding.severity.clone(),
            timestamp: finding.timestamp.clone(),
            matcher_name: finding.matcher_name.clone(),
            description: finding.description.clone(),
            tags: finding.tags.clone(),
            csf_subcategory_id: mapping.subcategory_id.to_string(),
            confidence: mapping.confidence,
            rationale: mapping.rationale.to_string(),
            csf_function: function,
            csf_subcategory_name: name,
            weight,
            recommendation,
        }
    }
}

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use crate::core::{Confidence, Severity};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRuleFile {
    version: Option<u32>,
    defaults: Option<RawDefaults>,
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    overrides: Vec<RawOverride>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefaults {
    confidence: Option<String>,
    rationale_prefix: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    name: String,
    when: Option<RawCondition>,
    map: RawMapping,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCondition {
    any_tag: Option<Vec<String>>,
    all_tag: Option<Vec<String>>,
    min_severity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMapping {
    csf_subcats: Vec<String>,
    confidence: Option<String>,
    rationale: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOverride {
    template_id: String,
    csf_subcats: Vec<String>,
    confidence: Option<String>,
    rationale: Option<String>,
}

/// 単一の条件。ルール内の複数条件は論理積で評価される。
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    AnyTag(Vec<String>),
    AllTag(Vec<String>),
    MinSeverity(Severity),
}

impl Condition {
    pub fn matches(&self, severity: Severity, tags: &[String]) -> bool {
        match self {
            Condition::AnyTag(wanted) => wanted.iter().any(|t| tags.iter().any(|f| f == t)),
            Condition::AllTag(wanted) => wanted.iter().all(|t| tags.iter().any(|f| f == t)),
            Condition::MinSeverity(min) => severity.ordinal() >= min.ordinal(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub subcategories: Vec<String>,
    pub confidence: Confidence,
    pub rationale: String,
}

impl Rule {
    pub fn matches(&self, severity: Severity, tags: &[String]) -> bool {
        self.conditions.iter().all(|c| c.matches(severity, tags))
    }
}

#[derive(Debug, Clone)]
pub struct Override {
    pub subcategories: Vec<String>,
    pub confidence: Confidence,
    pub rationale: String,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    pub version: u32,
    pub default_confidence: Confidence,
    pub rationale_prefix: Option<String>,
    pub rules: Vec<Rule>,
    overrides: BTreeMap<String, Override>,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!(
                "マッピングルールが見つかりません: {}",
                path.display()
            ));
        }
        let s = std::fs::read_to_string(path).with_context(|| {
            format!("マッピングルールの読み取りに失敗しました: {}", path.display())
        })?;
        Self::from_toml_str(&s)
            .with_context(|| format!("マッピングルールの解析に失敗しました: {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let raw: RawRuleFile =
            toml::from_str(s).context("マッピングルール(TOML)の解析に失敗しました")?;

        let (default_confidence, rationale_prefix) = match raw.defaults {
            Some(defaults) => {
                let confidence = match defaults.confidence.as_deref() {
                    Some(v) => v
                        .parse::<Confidence>()
                        .map_err(anyhow::Error::msg)
                        .context("defaults.confidence が不正です")?,
                    None => Confidence::Medium,
                };
                (confidence, defaults.rationale_prefix)
            }
            None => (Confidence::Medium, None),
        };

        let mut rules = Vec::with_capacity(raw.rules.len());
        for raw_rule in raw.rules {
            let conditions = build_conditions(raw_rule.when.unwrap_or_default())
                .with_context(|| format!("ルール '{}' の when が不正です", raw_rule.name))?;
            let confidence = match raw_rule.map.confidence.as_deref() {
                Some(v) => v
                    .parse::<Confidence>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| {
                        format!("ルール '{}' の confidence が不正です", raw_rule.name)
                    })?,
                None => default_confidence,
            };
            let rationale = compose_rationale(&raw_rule.name, raw_rule.map.rationale.as_deref());
            rules.push(Rule {
                name: raw_rule.name,
                conditions,
                subcategories: raw_rule.map.csf_subcats,
                confidence,
                rationale,
            });
        }

        // 同一 template_id は後勝ち。
        let mut overrides = BTreeMap::new();
        for raw_override in raw.overrides {
            let template_id = raw_override.template_id.trim().to_string();
            if template_id.is_empty() {
                continue;
            }
            let confidence = match raw_override.confidence.as_deref() {
                Some(v) => v
                    .parse::<Confidence>()
                    .map_err(anyhow::Error::msg)
                    .with_context(|| {
                        format!("オーバーライド '{template_id}' の confidence が不正です")
                    })?,
                None => default_confidence,
            };
            overrides.insert(
                template_id,
                Override {
                    subcategories: raw_override.csf_subcats,
                    confidence,
                    rationale: raw_override.rationale.unwrap_or_default(),
                },
            );
        }

        Ok(Self {
            version: raw.version.unwrap_or(1),
            default_confidence,
            rationale_prefix,
            rules,
            overrides,
        })
    }

    pub fn override_for(&self, template_id: &str) -> Option<&Override> {
        self.overrides.get(template_id)
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

fn build_conditions(when: RawCondition) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();

    if let Some(tags) = when.any_tag {
        let tags = normalize_tags(tags);
        if !tags.is_empty() {
            conditions.push(Condition::AnyTag(tags));
        }
    }
    if let Some(tags) = when.all_tag {
        let tags = normalize_tags(tags);
        if !tags.is_empty() {
            conditions.push(Condition::AllTag(tags));
        }
    }
    if let Some(min) = when.min_severity {
        let min = min
            .parse::<Severity>()
            .map_err(anyhow::Error::msg)
            .context("min_severity が不正です")?;
        conditions.push(Condition::MinSeverity(min));
    }

    Ok(conditions)
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    tags.into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

fn compose_rationale(name: &str, rationale: Option<&str>) -> String {
    let rationale = rationale.unwrap_or("").trim();
    if name.is_empty() {
        return rationale.to_string();
    }
    if rationale.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {rationale}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES_TOML: &str = r#"
version = 1

[defaults]
confidence = "Medium"
rationale_prefix = "auto-mapped"

[[rules]]
name = "tls-weaknesses"

[rules.when]
any_tag = ["tls", "ssl"]

[rules.map]
csf_subcats = ["PR.DS-02", "PR.IR-01"]
confidence = "High"
rationale = "Transport security affects data in transit"

[[rules]]
name = "exposed-panels"

[rules.when]
any_tag = ["panel", "exposure"]
min_severity = "medium"

[rules.map]
csf_subcats = ["PR.AA-03"]

[[overrides]]
template_id = "networking/open-ports"
csf_subcats = ["ID.AM-02", "ID.AM-03", "DE.CM-01"]
confidence = "High"
rationale = "Open ports enumerate the attack surface"
"#;

    #[test]
    fn parses_rules_and_resolves_defaults() {
        let set = RuleSet::from_toml_str(RULES_TOML).expect("parse");
        assert_eq!(set.version, 1);
        assert_eq!(set.default_confidence, Confidence::Medium);
        assert_eq!(set.rationale_prefix.as_deref(), Some("auto-mapped"));
        assert_eq!(set.rules.len(), 2);

        let tls = &set.rules[0];
        assert_eq!(tls.confidence, Confidence::High);
        assert_eq!(
            tls.rationale,
            "tls-weaknesses: Transport security affects data in transit"
        );

        // confidence 省略時は defaults に落ちる。rationale 省略時は名前のみ。
        let panels = &set.rules[1];
        assert_eq!(panels.confidence, Confidence::Medium);
        assert_eq!(panels.rationale, "exposed-panels");
    }

    #[test]
    fn override_lookup_is_exact_on_template_id() {
        let set = RuleSet::from_toml_str(RULES_TOML).expect("parse");
        let o = set.override_for("networking/open-ports").expect("override");
        assert_eq!(o.subcategories, ["ID.AM-02", "ID.AM-03", "DE.CM-01"]);
        assert_eq!(o.confidence, Confidence::High);
        assert!(set.override_for("networking/other").is_none());
    }

    #[test]
    fn any_tag_matches_on_intersection() {
        let set = RuleSet::from_toml_str(RULES_TOML).expect("parse");
        let rule = &set.rules[0];
        assert!(rule.matches(Severity::Info, &["ssl".to_string()]));
        assert!(!rule.matches(Severity::Critical, &["cve".to_string()]));
        assert!(!rule.matches(Severity::Critical, &[]));
    }

    #[test]
    fn min_severity_gates_below_threshold() {
        let set = RuleSet::from_toml_str(RULES_TOML).expect("parse");
        let rule = &set.rules[1];
        assert!(!rule.matches(Severity::Info, &["panel".to_string()]));
        assert!(rule.matches(Severity::High, &["panel".to_string()]));
    }

    #[test]
    fn all_tag_requires_superset() {
        let toml = r#"
[[rules]]
name = "authenticated-panels"

[rules.when]
all_tag = ["panel", "auth"]

[rules.map]
csf_subcats = ["PR.AA-03"]
"#;
        let set = RuleSet::from_toml_str(toml).expect("parse");
        let rule = &set.rules[0];
        assert!(rule.matches(
            Severity::Low,
            &["auth".to_string(), "panel".to_string(), "extra".to_string()]
        ));
        assert!(!rule.matches(Severity::Low, &["panel".to_string()]));
    }

    #[test]
    fn empty_when_always_matches() {
        let toml = r#"
[[rules]]
name = "catch-all"

[rules.map]
csf_subcats = ["ID.RA-01"]
"#;
        let set = RuleSet::from_toml_str(toml).expect("parse");
        assert!(set.rules[0].matches(Severity::Info, &[]));
    }

    #[test]
    fn unknown_condition_key_is_an_error() {
        let toml = r#"
[[rules]]
name = "bad"

[rules.when]
some_tag = ["x"]

[rules.map]
csf_subcats = ["ID.RA-01"]
"#;
        assert!(RuleSet::from_toml_str(toml).is_err());
    }

    #[test]
    fn invalid_min_severity_is_an_error() {
        let toml = r#"
[[rules]]
name = "bad"

[rules.when]
min_severity = "extreme"

[rules.map]
csf_subcats = ["ID.RA-01"]
"#;
        let err = RuleSet::from_toml_str(toml).expect_err("must fail");
        assert!(format!("{err:#}").contains("min_severity"), "{err:#}");
    }

    #[test]
    fn duplicate_override_last_wins() {
        let toml = r#"
[[overrides]]
template_id = "http/tech-detect"
csf_subcats = ["ID.AM-02"]

[[overrides]]
template_id = "http/tech-detect"
csf_subcats = ["ID.AM-08"]
"#;
        let set = RuleSet::from_toml_str(toml).expect("parse");
        let o = set.override_for("http/tech-detect").expect("override");
        assert_eq!(o.subcategories, ["ID.AM-08"]);
    }
}

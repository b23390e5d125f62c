use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::core::{
    ClassifiedRecord, Finding, GovernanceAssessmentEntry, GovernanceHeatmapEntry, Report,
    ReportSummary, ScanHeatmapEntry,
};
use crate::mapper::{Classifier, TemplateCache};
use crate::reference::Reference;
use crate::rules::RuleSet;

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub timeout: Duration,
    pub show_progress: bool,
}

#[derive(Clone)]
pub struct Engine {
    opts: EngineOptions,
    home_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ConvertRequest {
    pub input: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MapRequest {
    pub input: PathBuf,
    pub rules: PathBuf,
    pub reference: PathBuf,
    pub template_cache: PathBuf,
}

#[derive(Debug, Clone)]
pub struct AssessRequest {
    pub input: PathBuf,
    pub mapped: bool,
    pub rules: PathBuf,
    pub reference: PathBuf,
    pub template_cache: PathBuf,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct GovernanceRequest {
    pub checklist: PathBuf,
    pub reference: PathBuf,
    pub out_dir: PathBuf,
}

impl Engine {
    pub fn new(opts: EngineOptions) -> Result<Self> {
        let home_dir = crate::platform::effective_home_dir()?;
        Ok(Self { opts, home_dir })
    }

    pub fn timeout(&self) -> Duration {
        self.opts.timeout
    }

    pub fn convert(&self, req: ConvertRequest) -> Result<Report> {
        let findings = crate::convert::convert_file(&req.input)?;
        let summary = ReportSummary {
            total_findings: findings.len(),
            total_records: 0,
            notes: Vec::new(),
        };
        Ok(report_from_parts(
            summary,
            ReportParts {
                findings,
                ..ReportParts::default()
            },
        ))
    }

    pub fn map(&self, req: MapRequest) -> Result<Report> {
        let findings = crate::io::load_findings(&req.input)?;
        let rules = RuleSet::load(&req.rules)?;
        let reference = Reference::load(&req.reference)?;

        let mut notes = Vec::new();
        let cache = load_template_cache(&req.template_cache, &mut notes);
        let classifier = Classifier::new(&rules, &reference, &cache);
        let records = classify_with_notes(&classifier, &findings, &mut notes);

        let summary = ReportSummary {
            total_findings: findings.len(),
            total_records: records.len(),
            notes,
        };
        Ok(report_from_parts(
            summary,
            ReportParts {
                records,
                ..ReportParts::default()
            },
        ))
    }

    pub fn assess(&self, req: AssessRequest) -> Result<Report> {
        use std::io::IsTerminal;
        let progress_enabled = self.opts.show_progress && std::io::stderr().is_terminal();
        let pb = if progress_enabled {
            let pb = indicatif::ProgressBar::new_spinner();
            pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            pb.set_message("ヒートマップを集計中...");
            pb.enable_steady_tick(Duration::from_millis(120));
            Some(pb)
        } else {
            None
        };

        let result = self.assess_pipeline(req);

        if let Some(pb) = pb {
            pb.finish_and_clear();
        }
        result
    }

    fn assess_pipeline(&self, req: AssessRequest) -> Result<Report> {
        let reference = Reference::load(&req.reference)?;
        let mut notes = Vec::new();

        let (total_findings, total_records, records, heatmap) = if req.mapped {
            let rows = crate::io::load_json_rows(&req.input)?;
            let heatmap = crate::heatmap::aggregate_rows(&rows, &reference);
            (0, rows.len(), Vec::new(), heatmap)
        } else {
            let findings = crate::io::load_findings(&req.input)?;
            let rules = RuleSet::load(&req.rules)?;
            let cache = load_template_cache(&req.template_cache, &mut notes);
            let classifier = Classifier::new(&rules, &reference, &cache);
            let records = classify_with_notes(&classifier, &findings, &mut notes);
            let heatmap = crate::heatmap::aggregate(&records, &reference);
            (findings.len(), records.len(), records, heatmap)
        };

        if records.is_empty() {
            if !req.mapped {
                notes.push(
                    "出力: 分類レコードが0件のため mapped-findings を書き出しません".to_string(),
                );
            }
        } else {
            let csv_path = req.out_dir.join("mapped-findings.csv");
            crate::io::write_csv(&csv_path, &records)?;
            notes.push(format!("出力: {}", mask_home(&csv_path, &self.home_dir)));

            let json_path = req.out_dir.join("mapped-findings.json");
            crate::io::write_json_records(&json_path, &records)?;
            notes.push(format!("出力: {}", mask_home(&json_path, &self.home_dir)));
        }

        let heatmap_path = req.out_dir.join("scan-heatmap.csv");
        if crate::io::write_csv(&heatmap_path, &heatmap)? {
            notes.push(format!(
                "出力: {}",
                mask_home(&heatmap_path, &self.home_dir)
            ));
        } else {
            notes.push("出力: ヒートマップが0件のためファイルを書き出しません".to_string());
        }

        let summary = ReportSummary {
            total_findings,
            total_records,
            notes,
        };
        Ok(report_from_parts(
            summary,
            ReportParts {
                records,
                scan_heatmap: heatmap,
                ..ReportParts::default()
            },
        ))
    }

    pub fn governance(&self, req: GovernanceRequest) -> Result<Report> {
        let answers = crate::governance::load_checklist(&req.checklist)?;
        let reference = Reference::load(&req.reference)?;

        let mut notes = Vec::new();
        let assessment = crate::governance::score(&answers, &reference);
        let heatmap = crate::governance::heatmap_from_assessment(&assessment);

        let unknown_responses = assessment.iter().filter(|e| e.score.is_none()).count();
        if unknown_responses > 0 {
            notes.push(format!(
                "ガバナンス: 解釈できない回答が {unknown_responses} 件あります（Yes|Partial|No のみ有効、スコアは NaN になります）"
            ));
        }
        let unknown_subcategories = assessment.iter().filter(|e| e.weight.is_none()).count();
        if unknown_subcategories > 0 {
            notes.push(format!(
                "ガバナンス: 参照表にないサブカテゴリが {unknown_subcategories} 件あります"
            ));
        }

        if assessment.is_empty() {
            notes.push("出力: チェックリストが0件のためファイルを書き出しません".to_string());
        } else {
            let assessment_path = req.out_dir.join("governance-assessment.csv");
            crate::io::write_csv(&assessment_path, &assessment)?;
            notes.push(format!(
                "出力: {}",
                mask_home(&assessment_path, &self.home_dir)
            ));

            let heatmap_path = req.out_dir.join("governance-heatmap.csv");
            crate::io::write_csv(&heatmap_path, &heatmap)?;
            notes.push(format!(
                "出力: {}",
                mask_home(&heatmap_path, &self.home_dir)
            ));
        }

        let summary = ReportSummary {
            total_findings: 0,
            total_records: assessment.len(),
            notes,
        };
        Ok(report_from_parts(
            summary,
            ReportParts {
                governance_assessment: assessment,
                governance_heatmap: heatmap,
                ..ReportParts::default()
            },
        ))
    }
}

#[derive(Default)]
struct ReportParts {
    findings: Vec<Finding>,
    records: Vec<ClassifiedRecord>,
    scan_heatmap: Vec<ScanHeatmapEntry>,
    governance_assessment: Vec<GovernanceAssessmentEntry>,
    governance_heatmap: Vec<GovernanceHeatmapEntry>,
}

fn report_from_parts(mut summary: ReportSummary, parts: ReportParts) -> Report {
    summary.notes.sort();
    summary.notes.dedup();

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string());

    Report {
        schema_version: "1.0".to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        generated_at,
        summary,
        findings: parts.findings,
        records: parts.records,
        scan_heatmap: parts.scan_heatmap,
        governance_assessment: parts.governance_assessment,
        governance_heatmap: parts.governance_heatmap,
    }
}

// 壊れたキャッシュは分類を止めない。注記に残して空のまま続行する。
fn load_template_cache(path: &Path, notes: &mut Vec<String>) -> TemplateCache {
    match TemplateCache::load(path) {
        Ok(cache) => cache,
        Err(err) => {
            notes.push(format!("テンプレートキャッシュを無視します: {err:#}"));
            TemplateCache::default()
        }
    }
}

fn classify_with_notes(
    classifier: &Classifier,
    findings: &[Finding],
    notes: &mut Vec<String>,
) -> Vec<ClassifiedRecord> {
    let mut records = Vec::new();
    let mut unmatched = 0usize;
    for finding in findings {
        let mut mapped = classifier.classify(finding);
        if mapped.is_empty() {
            unmatched += 1;
        }
        records.append(&mut mapped);
    }
    if unmatched > 0 {
        notes.push(format!(
            "分類: ルールに一致しなかった finding が {unmatched} 件あります（レコードなし）"
        ));
    }
    records
}

fn mask_home(path: &Path, home_dir: &Path) -> String {
    let Ok(stripped) = path.strip_prefix(home_dir) else {
        return path.display().to_string();
    };
    let stripped = stripped.display().to_string();
    if stripped.is_empty() {
        "~".to_string()
    } else {
        format!("~/{stripped}")
    }
}

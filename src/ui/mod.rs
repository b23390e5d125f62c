use anyhow::Error;
use std::io::{self, Write};
use unicode_width::UnicodeWidthChar;

use crate::core::{
    ClassifiedRecord, Confidence, CsfFunction, GovernanceAssessmentEntry, GovernanceHeatmapEntry,
    ScanHeatmapEntry,
};

#[derive(Debug, Clone)]
pub struct UiConfig {
    pub color: bool,
    pub stdout_is_tty: bool,
    pub stderr_is_tty: bool,
    pub max_table_rows: usize,
    pub quiet: bool,
    pub verbose: bool,
}

pub fn eprintln_error(err: &Error) {
    let mut stderr = io::stderr().lock();
    let _ = writeln!(stderr, "エラー:");
    let _ = writeln!(stderr, "  {err}");

    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        let _ = writeln!(stderr, "原因:");
        for cause in causes {
            let _ = writeln!(stderr, "  - {cause}");
        }
    }

    let _ = writeln!(stderr, "次に:");
    let _ = writeln!(
        stderr,
        "  - 詳細を見るには `--verbose` を付けて再実行してください"
    );
    let _ = writeln!(
        stderr,
        "  - 利用可能なコマンド/オプションは `csfheat --help` を参照してください"
    );
}

pub fn print_notes(notes: &[String], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }
    let mut out = io::stdout().lock();
    for note in notes {
        let _ = writeln!(out, "- {note}");
    }
}

pub fn print_scan_heatmap(entries: &[ScanHeatmapEntry], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let total = entries.len();
    let rows = cfg.max_table_rows.min(total);
    if total > rows {
        let _ = writeln!(out, "スキャンヒートマップ（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "スキャンヒートマップ（{rows}件表示）:");
    }
    if entries.is_empty() {
        let _ = writeln!(out, "（該当データなし）");
        return;
    }

    let label_score = "スコア";
    let label_sev = "深刻度";
    let label_count = "件数";
    let label_id = "サブカテゴリ";
    let label_name = "名称";

    let score_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.weighted_score))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_score));
    let sev_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.max_severity))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_sev));
    let count_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.count.to_string()))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_count));
    let id_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.csf_subcategory_id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_id));

    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_start_display(label_score, score_w),
        pad_end_display(label_sev, sev_w),
        pad_start_display(label_count, count_w),
        pad_end_display(label_id, id_w),
        label_name
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        "-".repeat(score_w),
        "-".repeat(sev_w),
        "-".repeat(count_w),
        "-".repeat(id_w),
        "-".repeat(visible_width_ansi(label_name))
    );

    for entry in entries.iter().take(rows) {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_start_display(&entry.weighted_score, score_w),
            pad_end_ansi(&format_severity(&entry.max_severity, cfg.color), sev_w),
            pad_start_display(&entry.count.to_string(), count_w),
            pad_end_display(&entry.csf_subcategory_id, id_w),
            entry.name
        );
    }
}

pub fn print_governance_assessment(entries: &[GovernanceAssessmentEntry], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let total = entries.len();
    let rows = cfg.max_table_rows.min(total);
    if total > rows {
        let _ = writeln!(out, "ガバナンス評価（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "ガバナンス評価（{rows}件表示）:");
    }
    if entries.is_empty() {
        let _ = writeln!(out, "（該当データなし）");
        return;
    }

    let label_assess = "評点";
    let label_gap = "ギャップ";
    let label_resp = "回答";
    let label_id = "サブカテゴリ";
    let label_name = "名称";

    let assess_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.assessment_score))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_assess));
    let gap_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.gap_score))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_gap));
    let resp_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.response))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_resp));
    let id_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.csf_subcategory_id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_id));

    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_start_display(label_assess, assess_w),
        pad_start_display(label_gap, gap_w),
        pad_end_display(label_resp, resp_w),
        pad_end_display(label_id, id_w),
        label_name
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        "-".repeat(assess_w),
        "-".repeat(gap_w),
        "-".repeat(resp_w),
        "-".repeat(id_w),
        "-".repeat(visible_width_ansi(label_name))
    );

    for entry in entries.iter().take(rows) {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_start_display(&entry.assessment_score, assess_w),
            pad_start_display(&entry.gap_score, gap_w),
            pad_end_display(&entry.response, resp_w),
            pad_end_display(&entry.csf_subcategory_id, id_w),
            entry.csf_subcategory_name
        );
    }
}

pub fn print_governance_heatmap(entries: &[GovernanceHeatmapEntry], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let total = entries.len();
    let rows = cfg.max_table_rows.min(total);
    if total > rows {
        let _ = writeln!(out, "ガバナンスギャップ（{rows}件表示 / 全{total}件）:");
    } else {
        let _ = writeln!(out, "ガバナンスギャップ（{rows}件表示）:");
    }
    if entries.is_empty() {
        let _ = writeln!(out, "（該当データなし）");
        return;
    }

    let label_gap = "ギャップ";
    let label_sev = "深刻度";
    let label_resp = "回答";
    let label_id = "サブカテゴリ";
    let label_name = "名称";

    let gap_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.gap_score))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_gap));
    let sev_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.severity))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_sev));
    let resp_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.response))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_resp));
    let id_w = entries
        .iter()
        .take(rows)
        .map(|e| visible_width_ansi(&e.csf_subcategory_id))
        .max()
        .unwrap_or(0)
        .max(visible_width_ansi(label_id));

    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        pad_start_display(label_gap, gap_w),
        pad_end_display(label_sev, sev_w),
        pad_end_display(label_resp, resp_w),
        pad_end_display(label_id, id_w),
        label_name
    );
    let _ = writeln!(
        out,
        "{}  {}  {}  {}  {}",
        "-".repeat(gap_w),
        "-".repeat(sev_w),
        "-".repeat(resp_w),
        "-".repeat(id_w),
        "-".repeat(visible_width_ansi(label_name))
    );

    for entry in entries.iter().take(rows) {
        let _ = writeln!(
            out,
            "{}  {}  {}  {}  {}",
            pad_start_display(&entry.gap_score, gap_w),
            pad_end_ansi(&format_severity(&entry.severity, cfg.color), sev_w),
            pad_end_display(&entry.response, resp_w),
            pad_end_display(&entry.csf_subcategory_id, id_w),
            entry.name
        );
    }
}

pub fn print_map_result(findings_total: usize, records: &[ClassifiedRecord], cfg: &UiConfig) {
    if cfg.quiet {
        return;
    }

    let mut out = io::stdout().lock();
    let _ = writeln!(
        out,
        "分類: {findings_total} 件の finding から {} 件のレコードを生成しました。",
        records.len()
    );

    if !cfg.verbose || records.is_empty() {
        return;
    }

    const FUNCTIONS: [CsfFunction; 7] = [
        CsfFunction::Govern,
        CsfFunction::Identify,
        CsfFunction::Protect,
        CsfFunction::Detect,
        CsfFunction::Respond,
        CsfFunction::Recover,
        CsfFunction::Unknown,
    ];
    let by_function: Vec<String> = FUNCTIONS
        .iter()
        .filter_map(|f| {
            let n = records.iter().filter(|r| r.csf_function == *f).count();
            (n > 0).then(|| format!("{f}={n}"))
        })
        .collect();
    let _ = writeln!(out, "- 機能別: {}", by_function.join(" "));

    const CONFIDENCES: [Confidence; 3] = [Confidence::High, Confidence::Medium, Confidence::Low];
    let by_confidence: Vec<String> = CONFIDENCES
        .iter()
        .filter_map(|c| {
            let n = records.iter().filter(|r| r.confidence == *c).count();
            (n > 0).then(|| format!("{c}={n}"))
        })
        .collect();
    let _ = writeln!(out, "- 確度別: {}", by_confidence.join(" "));
}

pub fn format_severity(severity: &str, color: bool) -> String {
    if !color {
        return severity.to_string();
    }

    let code = match severity.trim().to_ascii_lowercase().as_str() {
        "critical" | "high" => "31",
        "medium" => "33",
        "low" => "32",
        "info" => "90",
        _ => return severity.to_string(),
    };
    format!("\x1b[{code}m{severity}\x1b[0m")
}

fn pad_end_ansi(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_end_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{s}{}", " ".repeat(width - w))
}

fn pad_start_display(s: &str, width: usize) -> String {
    let w = visible_width_ansi(s);
    if w >= width {
        return s.to_string();
    }
    format!("{}{}", " ".repeat(width - w), s)
}

fn visible_width_ansi(s: &str) -> usize {
    let mut width: usize = 0;
    let mut chars = s.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                let _ = chars.next();
                while let Some(ch2) = chars.next() {
                    if ch2 == 'm' {
                        break;
                    }
                }
                continue;
            }
        }
        width = width.saturating_add(UnicodeWidthChar::width(ch).unwrap_or(0));
    }
    width
}

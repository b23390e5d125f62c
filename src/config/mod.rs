use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    pub ui: UiConfig,
    pub paths: PathsConfig,
    pub scan: ScanConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathsConfig {
    pub rules: PathBuf,
    pub reference: PathBuf,
    pub template_cache: PathBuf,
    pub profiles: PathBuf,
    pub out_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanConfig {
    pub bin: String,
    pub targets: PathBuf,
    pub profile: String,
    pub timeout_secs: u64,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            paths: PathsConfig {
                rules: PathBuf::from("data/mapping_rules.toml"),
                reference: PathBuf::from("data/csf_lookup.csv"),
                template_cache: PathBuf::from("data/template_cache.json"),
                profiles: PathBuf::from("data/profiles.toml"),
                out_dir: PathBuf::from("data"),
            },
            scan: ScanConfig {
                bin: "nuclei".to_string(),
                targets: PathBuf::from("data/targets.txt"),
                profile: "baseline_web".to_string(),
                timeout_secs: 30,
            },
            config_path: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    paths: Option<RawPathsConfig>,
    scan: Option<RawScanConfig>,
}

#[derive(Debug, Deserialize)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawPathsConfig {
    rules: Option<PathBuf>,
    reference: Option<PathBuf>,
    template_cache: Option<PathBuf>,
    profiles: Option<PathBuf>,
    out_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct RawScanConfig {
    bin: Option<String>,
    targets: Option<PathBuf>,
    profile: Option<String>,
    timeout_secs: Option<u64>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/csfheat/config.toml")
}

/// 優先順位: 組み込み既定 < 設定ファイル < 環境変数。CLIフラグの上書きは呼び出し側で行う。
pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .or_else(|| std::env::var_os("CSFHEAT_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("設定ファイルの読み取りに失敗しました: {}", path.display()))?;
        let raw: RawConfig =
            toml::from_str(&s).context("設定ファイル(TOML)の解析に失敗しました")?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    }

    apply_env_overrides(&mut cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(paths) = raw.paths {
        if let Some(rules) = paths.rules {
            cfg.paths.rules = rules;
        }
        if let Some(reference) = paths.reference {
            cfg.paths.reference = reference;
        }
        if let Some(template_cache) = paths.template_cache {
            cfg.paths.template_cache = template_cache;
        }
        if let Some(profiles) = paths.profiles {
            cfg.paths.profiles = profiles;
        }
        if let Some(out_dir) = paths.out_dir {
            cfg.paths.out_dir = out_dir;
        }
    }

    if let Some(scan) = raw.scan {
        if let Some(bin) = scan.bin {
            cfg.scan.bin = bin;
        }
        if let Some(targets) = scan.targets {
            cfg.scan.targets = targets;
        }
        if let Some(profile) = scan.profile {
            cfg.scan.profile = profile;
        }
        if let Some(timeout_secs) = scan.timeout_secs {
            cfg.scan.timeout_secs = timeout_secs;
        }
    }
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Ok(v) = std::env::var("CSFHEAT_RULES") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.rules = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_REFERENCE") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.reference = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_TEMPLATE_CACHE") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.template_cache = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_PROFILES") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.profiles = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_OUT_DIR") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.paths.out_dir = PathBuf::from(v);
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_NUCLEI_BIN") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.scan.bin = v.to_string();
        }
    }
    if let Ok(v) = std::env::var("CSFHEAT_TIMEOUT_SECS") {
        cfg.scan.timeout_secs = v
            .trim()
            .parse::<u64>()
            .with_context(|| "CSFHEAT_TIMEOUT_SECS")?;
    }
    if let Ok(v) = std::env::var("CSFHEAT_COLOR") {
        cfg.ui.color = parse_bool(&v).with_context(|| "CSFHEAT_COLOR")?;
    }

    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "真偽値が不正です: {s}（true|false|1|0|yes|no|on|off を指定してください）"
        )),
    }
}

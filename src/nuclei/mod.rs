use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

const DEFAULT_OUTPUT: &str = "data/nuclei_results.jsonl";

/// プロファイル1件。フィールドは nuclei のコマンドライン引数に対応する。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanProfile {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub severity: Vec<String>,
    pub rate_limit: Option<u32>,
    pub concurrency: Option<u32>,
    pub retries: Option<u32>,
    pub timeout: Option<u32>,
    pub output: Option<String>,
    pub input_mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProfileFile {
    #[serde(default)]
    profiles: BTreeMap<String, ScanProfile>,
}

/// `[profiles.<name>]` テーブルの集合。
#[derive(Debug, Clone, Default)]
pub struct Profiles {
    profiles: BTreeMap<String, ScanProfile>,
}

impl Profiles {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(anyhow!(
                "スキャンプロファイルが見つかりません: {}",
                path.display()
            ));
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("スキャンプロファイルを読み込めません: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("スキャンプロファイルの解析に失敗しました: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawProfileFile = toml::from_str(text)?;
        Ok(Self {
            profiles: raw.profiles,
        })
    }

    pub fn get(&self, name: &str) -> Result<&ScanProfile> {
        self.profiles.get(name).ok_or_else(|| {
            let available = if self.profiles.is_empty() {
                "なし".to_string()
            } else {
                self.profiles
                    .keys()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            anyhow!("プロファイル '{name}' がありません（利用可能: {available}）")
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// 組み立て済みの nuclei 引数列。実行バイナリ名は設定側が持つ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NucleiCommand {
    pub args: Vec<String>,
    pub output_path: PathBuf,
}

impl NucleiCommand {
    pub fn render(&self, bin: &str) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(bin.to_string());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// プロファイルとターゲットファイルから nuclei の引数列を組み立てる。
///
/// `scan_dir` を渡すとプロファイルの出力先ディレクトリを差し替える
/// （ファイル名はプロファイル側のものを維持する）。出力先の親ディレクトリは
/// ここで作成する。
pub fn build_command(
    profile: &ScanProfile,
    targets: &Path,
    scan_dir: Option<&Path>,
) -> Result<NucleiCommand> {
    if targets.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(anyhow!("スキャン対象ファイルが指定されていません"));
    }
    let targets_abs = std::fs::canonicalize(targets).with_context(|| {
        format!(
            "スキャン対象ファイルが見つかりません: {}",
            targets.display()
        )
    })?;

    let output = profile.output.as_deref().unwrap_or(DEFAULT_OUTPUT);
    let output = PathBuf::from(output.trim());
    let output_path = match scan_dir {
        Some(dir) => {
            let file_name = output
                .file_name()
                .ok_or_else(|| anyhow!("出力ファイル名を決定できません: {}", output.display()))?;
            absolutize(&dir.join(file_name))?
        }
        None => absolutize(&output)?,
    };
    crate::io::ensure_parent(&output_path)?;

    let mut args: Vec<String> = vec!["-l".to_string(), path_arg(&targets_abs)];
    if let Some(mode) = profile.input_mode.as_deref() {
        let mode = mode.trim();
        if !mode.is_empty() {
            args.push("-im".to_string());
            args.push(mode.to_string());
        }
    }
    if !profile.tags.is_empty() {
        args.push("-tags".to_string());
        args.push(profile.tags.join(","));
    }
    if !profile.severity.is_empty() {
        args.push("-s".to_string());
        args.push(profile.severity.join(","));
    }
    if let Some(rl) = profile.rate_limit {
        args.push("-rl".to_string());
        args.push(rl.to_string());
    }
    if let Some(c) = profile.concurrency {
        args.push("-c".to_string());
        args.push(c.to_string());
    }
    if let Some(retries) = profile.retries {
        args.push("-retries".to_string());
        args.push(retries.to_string());
    }
    if let Some(timeout) = profile.timeout {
        args.push("-timeout".to_string());
        args.push(timeout.to_string());
    }
    args.push("-omit-raw".to_string());
    args.push("-je".to_string());
    args.push(path_arg(&output_path));

    Ok(NucleiCommand { args, output_path })
}

// 出力ファイルはまだ存在しないので canonicalize は使えない。
fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("カレントディレクトリを取得できません")?;
    Ok(cwd.join(path))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::platform::CommandOutput;

const MAX_CMD_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Serialize)]
struct ScanRunLog {
    schema_version: &'static str,
    tool_version: String,
    command: &'static str,
    started_at: String,
    finished_at: String,
    status: String,
    profile: String,
    targets: String,
    output: String,
    attempt: CommandAttemptLog,
}

#[derive(Debug, Serialize)]
struct CommandAttemptLog {
    cmd: String,
    args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty")]
    stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn logs_dir(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/csfheat/logs")
}

pub fn write_scan_run_log(
    home_dir: &Path,
    started_at: OffsetDateTime,
    finished_at: OffsetDateTime,
    profile: &str,
    targets: &Path,
    output: &Path,
    cmd: &str,
    args: &[String],
    cmd_output: Option<&CommandOutput>,
    error: Option<String>,
) -> Result<PathBuf> {
    let dir = logs_dir(home_dir);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("ログディレクトリの作成に失敗しました: {}", dir.display()))?;

    let pid = std::process::id();
    let ts = finished_at.unix_timestamp_nanos();
    let file_name = format!("scan-{pid}-{ts}.json");
    let path = dir.join(file_name);

    let attempt = command_attempt(cmd, args, cmd_output, error);
    let status = match (&attempt.error, attempt.exit_code) {
        (Some(_), _) => "error".to_string(),
        (None, Some(0)) => "ok".to_string(),
        (None, Some(_)) => "error".to_string(),
        (None, None) => "error".to_string(),
    };

    let log = ScanRunLog {
        schema_version: "1.0",
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        command: "scan",
        started_at: started_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        finished_at: finished_at
            .format(&Rfc3339)
            .unwrap_or_else(|_| "unknown".to_string()),
        status,
        profile: profile.to_string(),
        targets: mask_home(targets, home_dir),
        output: mask_home(output, home_dir),
        attempt,
    };

    let buf = serde_json::to_vec_pretty(&log).context("ログ(JSON)のシリアライズに失敗しました")?;
    std::fs::write(&path, buf)
        .with_context(|| format!("ログの書き込みに失敗しました: {}", path.display()))?;
    Ok(path)
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

fn command_attempt(
    cmd: &str,
    args: &[String],
    output: Option<&CommandOutput>,
    error: Option<String>,
) -> CommandAttemptLog {
    let Some(output) = output else {
        return CommandAttemptLog {
            cmd: cmd.to_string(),
            args: args.to_vec(),
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            error,
        };
    };

    CommandAttemptLog {
        cmd: cmd.to_string(),
        args: args.to_vec(),
        exit_code: Some(output.exit_code),
        stdout: truncate_string(&output.stdout, MAX_CMD_OUTPUT_BYTES),
        stderr: truncate_string(&output.stderr, MAX_CMD_OUTPUT_BYTES),
        error,
    }
}

fn truncate_string(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut idx = max_bytes;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx = idx.saturating_sub(1);
    }
    let head = &s[..idx];
    format!("{head}\n...(truncated, total={} bytes)", s.len())
}

use std::io;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};

use crate::engine::{
    AssessRequest, ConvertRequest, Engine, EngineOptions, GovernanceRequest, MapRequest,
};
use crate::io::OutputFormat;
use crate::ui::UiConfig;

#[derive(Debug, Parser)]
#[command(
    name = "csfheat",
    version,
    about = "セキュリティスキャンの結果をNIST CSF 2.0のサブカテゴリへ分類し、深刻度加重のヒートスコアで改善優先度を可視化する"
)]
pub struct Cli {
    #[arg(long, global = true)]
    pub json: bool,
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,
    #[arg(long, global = true)]
    pub verbose: bool,
    #[arg(long, global = true)]
    pub quiet: bool,
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Scan(ScanArgs),
    Convert(ConvertArgs),
    Map(MapArgs),
    Assess(AssessArgs),
    Governance(GovernanceArgs),
    Completion(CompletionArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct ScanArgs {
    #[arg(long)]
    pub profile: Option<String>,
    #[arg(long)]
    pub targets: Option<PathBuf>,
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, default_value = "jsonl")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub rules: Option<PathBuf>,
    #[arg(long)]
    pub reference: Option<PathBuf>,
    #[arg(long)]
    pub template_cache: Option<PathBuf>,
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long, default_value = "jsonl")]
    pub format: OutputFormat,
}

#[derive(Debug, Args)]
pub struct AssessArgs {
    #[arg(long)]
    pub input: PathBuf,
    #[arg(long)]
    pub mapped: bool,
    #[arg(long)]
    pub rules: Option<PathBuf>,
    #[arg(long)]
    pub reference: Option<PathBuf>,
    #[arg(long)]
    pub template_cache: Option<PathBuf>,
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct GovernanceArgs {
    #[arg(long)]
    pub checklist: PathBuf,
    #[arg(long)]
    pub reference: Option<PathBuf>,
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct CompletionArgs {
    pub shell: String,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[arg(long)]
    pub show: bool,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let stdout_is_tty = io::stdout().is_terminal();
    let stderr_is_tty = io::stderr().is_terminal();

    let home_dir = crate::platform::effective_home_dir()?;

    let cfg = crate::config::load(cli.config.as_deref(), &home_dir)
        .map_err(crate::exit::invalid_args_err)?;

    let color = stdout_is_tty && cfg.ui.color && !cli.no_color;

    let ui_cfg = UiConfig {
        color,
        stdout_is_tty,
        stderr_is_tty,
        max_table_rows: cfg.ui.max_table_rows,
        quiet: cli.quiet,
        verbose: cli.verbose,
    };

    let timeout = Duration::from_secs(cli.timeout.unwrap_or(cfg.scan.timeout_secs));
    let engine = Engine::new(EngineOptions {
        timeout,
        show_progress: ui_cfg.stderr_is_tty && !cli.quiet && !cli.json,
    })?;

    match cli.command {
        Commands::Scan(args) => {
            if cli.json {
                return Err(crate::exit::invalid_args("scan は --json と併用できません"));
            }

            let profiles = crate::nuclei::Profiles::load(&cfg.paths.profiles)
                .map_err(crate::exit::invalid_args_err)?;
            let profile_name = args.profile.as_deref().unwrap_or(&cfg.scan.profile);
            let profile = profiles
                .get(profile_name)
                .map_err(crate::exit::invalid_args_err)?;

            let targets = args.targets.unwrap_or_else(|| cfg.scan.targets.clone());
            let command = crate::nuclei::build_command(profile, &targets, args.out_dir.as_deref())
                .map_err(crate::exit::invalid_args_err)?;
            let cmd_line = command.render(&cfg.scan.bin);

            if cli.dry_run {
                if !ui_cfg.quiet {
                    println!("dry-run: 実行予定のコマンド: `{cmd_line}`");
                }
                return Ok(());
            }

            let pb = if ui_cfg.stderr_is_tty && !ui_cfg.quiet {
                let pb = indicatif::ProgressBar::new_spinner();
                pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                pb.set_message(format!("nuclei を実行中（プロファイル: {profile_name}）..."));
                pb.enable_steady_tick(Duration::from_millis(120));
                Some(pb)
            } else {
                None
            };

            let arg_refs: Vec<&str> = command.args.iter().map(String::as_str).collect();
            let started_at = time::OffsetDateTime::now_utc();
            let result = crate::platform::run_command(&cfg.scan.bin, &arg_refs, engine.timeout());
            let finished_at = time::OffsetDateTime::now_utc();

            if let Some(pb) = pb {
                pb.finish_and_clear();
            }

            let output = match result {
                Ok(output) => output,
                Err(err) => {
                    let err_s = err.to_string();
                    let log_path = crate::logs::write_scan_run_log(
                        &home_dir,
                        started_at,
                        finished_at,
                        profile_name,
                        &targets,
                        &command.output_path,
                        &cfg.scan.bin,
                        &command.args,
                        None,
                        Some(err_s.clone()),
                    )
                    .map_err(|e| {
                        crate::exit::external_cmd(format!(
                            "scan: nuclei の実行に失敗しました: {err_s}\nさらにログの書き込みにも失敗しました: {e}"
                        ))
                    })?;
                    let log_hint = format_log_hint(&log_path, &home_dir);
                    return Err(crate::exit::external_cmd(format!(
                        "外部コマンドが失敗しました: {cmd_line}\n{err_s}\nログ: {log_hint}"
                    )));
                }
            };

            let log_path = crate::logs::write_scan_run_log(
                &home_dir,
                started_at,
                finished_at,
                profile_name,
                &targets,
                &command.output_path,
                &cfg.scan.bin,
                &command.args,
                Some(&output),
                None,
            )
            .map_err(|e| {
                anyhow::anyhow!("scan: コマンドは終了しましたが、ログの書き込みに失敗しました: {e}")
            })?;
            let log_hint = format_log_hint(&log_path, &home_dir);

            if output.exit_code != 0 {
                let mut msg = format!(
                    "外部コマンドが失敗しました（exit_code={}）: {cmd_line}",
                    output.exit_code
                );
                let stderr = output.stderr.trim();
                if !stderr.is_empty() {
                    msg.push_str(&format!("\n{stderr}"));
                }
                msg.push_str(&format!("\nログ: {log_hint}"));
                return Err(crate::exit::external_cmd(msg));
            }
            if !ui_cfg.quiet {
                let stdout = output.stdout.trim();
                if stdout.is_empty() {
                    println!("成功: `{cmd_line}`");
                } else {
                    println!("{stdout}");
                }
                println!("結果: {}", command.output_path.display());
                println!("ログ: {log_hint}");
            }
            if ui_cfg.verbose {
                let stderr = output.stderr.trim();
                if !stderr.is_empty() {
                    eprintln!("stderr（標準エラー出力）:\n{stderr}");
                }
            }
        }
        Commands::Convert(args) => {
            let report = engine.convert(ConvertRequest { input: args.input })?;
            if let Some(output) = args.output.as_deref() {
                write_records_file(output, args.format, &report.findings, &ui_cfg)?;
            }
            if cli.json {
                write_json(&report)?;
            } else if !ui_cfg.quiet {
                println!(
                    "変換: {} 件の finding を正規化しました。",
                    report.summary.total_findings
                );
            }
        }
        Commands::Map(args) => {
            let report = engine.map(MapRequest {
                input: args.input,
                rules: args.rules.unwrap_or_else(|| cfg.paths.rules.clone()),
                reference: args.reference.unwrap_or_else(|| cfg.paths.reference.clone()),
                template_cache: args
                    .template_cache
                    .unwrap_or_else(|| cfg.paths.template_cache.clone()),
            })?;
            if let Some(output) = args.output.as_deref() {
                write_records_file(output, args.format, &report.records, &ui_cfg)?;
            }
            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_notes(&report.summary.notes, &ui_cfg);
                crate::ui::print_map_result(
                    report.summary.total_findings,
                    &report.records,
                    &ui_cfg,
                );
            }
        }
        Commands::Assess(args) => {
            let report = engine.assess(AssessRequest {
                input: args.input,
                mapped: args.mapped,
                rules: args.rules.unwrap_or_else(|| cfg.paths.rules.clone()),
                reference: args.reference.unwrap_or_else(|| cfg.paths.reference.clone()),
                template_cache: args
                    .template_cache
                    .unwrap_or_else(|| cfg.paths.template_cache.clone()),
                out_dir: args.out_dir.unwrap_or_else(|| cfg.paths.out_dir.clone()),
            })?;
            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_notes(&report.summary.notes, &ui_cfg);
                crate::ui::print_scan_heatmap(&report.scan_heatmap, &ui_cfg);
            }
        }
        Commands::Governance(args) => {
            let report = engine.governance(GovernanceRequest {
                checklist: args.checklist,
                reference: args.reference.unwrap_or_else(|| cfg.paths.reference.clone()),
                out_dir: args.out_dir.unwrap_or_else(|| cfg.paths.out_dir.clone()),
            })?;
            if cli.json {
                write_json(&report)?;
            } else {
                crate::ui::print_notes(&report.summary.notes, &ui_cfg);
                crate::ui::print_governance_assessment(&report.governance_assessment, &ui_cfg);
                crate::ui::print_governance_heatmap(&report.governance_heatmap, &ui_cfg);
            }
        }
        Commands::Completion(args) => {
            let shell = parse_shell(&args.shell)?;
            let mut cmd = Cli::command();
            let mut out = std::io::stdout().lock();
            clap_complete::generate(shell, &mut cmd, "csfheat", &mut out);
        }
        Commands::Config(args) => {
            if args.show {
                if cli.json {
                    let stdout = std::io::stdout();
                    serde_json::to_writer_pretty(stdout.lock(), &cfg)?;
                } else {
                    println!("{}", toml::to_string_pretty(&cfg)?);
                }
            } else if !ui_cfg.quiet {
                eprintln!("config: `csfheat config --show` を使用してください");
            }
        }
    }

    Ok(())
}

fn write_json(report: &crate::core::Report) -> Result<()> {
    use std::io::Write;

    let buf = serde_json::to_vec_pretty(report)?;

    let mut stdout = std::io::stdout().lock();
    match stdout.write_all(&buf) {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => return Ok(()),
        Err(err) => return Err(err.into()),
    }
    match stdout.write_all(b"\n") {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::BrokenPipe => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn write_records_file<T: serde::Serialize + crate::io::CsvRecord>(
    path: &Path,
    format: OutputFormat,
    records: &[T],
    ui_cfg: &UiConfig,
) -> Result<()> {
    let written = match format {
        OutputFormat::Json => crate::io::write_json_records(path, records)?,
        OutputFormat::Jsonl => crate::io::write_jsonl(path, records)?,
        OutputFormat::Csv => crate::io::write_csv(path, records)?,
    };
    if ui_cfg.quiet {
        return Ok(());
    }
    if written {
        println!("出力: {}", path.display());
    } else {
        println!("出力: 対象が0件のためファイルを書き出しませんでした。");
    }
    Ok(())
}

fn format_log_hint(log_path: &Path, home_dir: &Path) -> String {
    log_path
        .strip_prefix(home_dir)
        .map(|p| format!("~/{p}", p = p.display()))
        .unwrap_or_else(|_| log_path.display().to_string())
}

fn parse_shell(s: &str) -> Result<clap_complete::Shell> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "bash" => Ok(clap_complete::Shell::Bash),
        "zsh" => Ok(clap_complete::Shell::Zsh),
        "fish" => Ok(clap_complete::Shell::Fish),
        other => Err(crate::exit::invalid_args(format!(
            "未対応のシェルです: {other}（bash|zsh|fish を指定してください）"
        ))),
    }
}

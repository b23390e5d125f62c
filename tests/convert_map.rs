use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

fn csfheat_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_csfheat"));
    cmd.env("HOME", home);
    cmd.current_dir(home);
    cmd.env_remove("CSFHEAT_CONFIG");
    cmd.env_remove("CSFHEAT_RULES");
    cmd.env_remove("CSFHEAT_REFERENCE");
    cmd.env_remove("CSFHEAT_TEMPLATE_CACHE");
    cmd.env_remove("CSFHEAT_PROFILES");
    cmd.env_remove("CSFHEAT_OUT_DIR");
    cmd.env_remove("CSFHEAT_NUCLEI_BIN");
    cmd.env_remove("CSFHEAT_TIMEOUT_SECS");
    cmd.env_remove("CSFHEAT_COLOR");
    cmd
}

fn run(home: &Path, args: &[&str]) -> Output {
    csfheat_cmd(home).args(args).output().expect("run csfheat")
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);

    let temp = std::env::temp_dir();
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let uniq = format!("csfheat-convert-map-test-{}-{seq}", std::process::id());
    let home = temp.join(uniq);
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

// nuclei が吐く形のゆれ（template-id/templateID、host/url、配列タグ/カンマ区切り）を含む入力。
const RAW_NUCLEI_JSON: &[u8] = br#"[
  {
    "template-id": "ssl/weak-cipher",
    "host": "https://a.example.test",
    "matched-at": "https://a.example.test:443",
    "timestamp": "2026-03-01T10:00:00Z",
    "matcher-name": "weak-cipher",
    "info": {
      "severity": "high",
      "description": "Weak TLS cipher suites",
      "tags": ["tls", "ssl"]
    }
  },
  {
    "templateID": "http/tech-detect",
    "url": "https://b.example.test",
    "info": {"severity": "info", "name": "Tech detect", "tags": "tech"}
  }
]
"#;

const RULES_TOML: &[u8] = br#"version = 1

[defaults]
confidence = "Medium"

[[rules]]
name = "tls-weaknesses"

[rules.when]
any_tag = ["tls"]

[rules.map]
csf_subcats = ["PR.DS-02"]
confidence = "High"
rationale = "Transport security affects data in transit"

[[rules]]
name = "technology-fingerprint"

[rules.when]
any_tag = ["tech"]

[rules.map]
csf_subcats = ["ID.AM-02"]
confidence = "Low"
rationale = "Fingerprinted software belongs in the asset inventory"
"#;

const LOOKUP_CSV: &[u8] = b"csf_subcategory_id,csf_subcategory_name,weight,recommendation\n\
PR.DS-02,Data-in-transit protected,1.5,Enforce modern TLS\n\
ID.AM-02,Software inventoried,1.0,Track deployed software\n";

#[test]
fn convert_json_embeds_normalized_findings() {
    let home = make_temp_home();
    write_file(home.join("raw.json").as_path(), RAW_NUCLEI_JSON);

    let out = run(&home, &["--json", "convert", "--input", "raw.json"]);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(
        v.pointer("/summary/total_findings").and_then(|n| n.as_u64()),
        Some(2)
    );
    assert_eq!(
        v.pointer("/summary/total_records").and_then(|n| n.as_u64()),
        Some(0)
    );

    let findings = v
        .get("findings")
        .and_then(|f| f.as_array())
        .expect("findings array");
    assert_eq!(findings.len(), 2);
    assert_eq!(
        findings[0].get("templateID").and_then(|s| s.as_str()),
        Some("ssl/weak-cipher")
    );
    assert_eq!(
        findings[0].get("tags").and_then(|t| t.as_array()).map(Vec::len),
        Some(2)
    );
    // url からのフォールバックで host と matched-at が埋まる。
    assert_eq!(
        findings[1].get("templateID").and_then(|s| s.as_str()),
        Some("http/tech-detect")
    );
    assert_eq!(
        findings[1].get("host").and_then(|s| s.as_str()),
        Some("https://b.example.test")
    );
    assert_eq!(
        findings[1].get("matched-at").and_then(|s| s.as_str()),
        Some("https://b.example.test")
    );

    assert!(v.get("records").is_none());
    assert!(v.get("scan_heatmap").is_none());

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn convert_csv_output_uses_finding_header() {
    let home = make_temp_home();
    write_file(home.join("raw.json").as_path(), RAW_NUCLEI_JSON);

    let out = run(
        &home,
        &[
            "convert",
            "--input",
            "raw.json",
            "--output",
            "findings.csv",
            "--format",
            "csv",
        ],
    );
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("出力: findings.csv"), "stdout={stdout}");
    assert!(
        stdout.contains("変換: 2 件の finding を正規化しました。"),
        "stdout={stdout}"
    );

    let csv = std::fs::read_to_string(home.join("findings.csv")).expect("csv");
    assert!(
        csv.starts_with("templateID,host,matched-at,severity,timestamp,matcher-name,description,tags\n"),
        "csv={csv}"
    );
    assert_eq!(csv.lines().count(), 3);
    // カンマ区切りで連結したタグ列は引用符付きで1フィールドに収まる。
    assert!(csv.contains("\"tls,ssl\""), "csv={csv}");

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn convert_jsonl_output_feeds_map() {
    let home = make_temp_home();
    write_file(home.join("raw.json").as_path(), RAW_NUCLEI_JSON);
    write_file(home.join("rules.toml").as_path(), RULES_TOML);
    write_file(home.join("lookup.csv").as_path(), LOOKUP_CSV);

    let out = run(
        &home,
        &[
            "convert",
            "--input",
            "raw.json",
            "--output",
            "normalized.jsonl",
        ],
    );
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    let jsonl = std::fs::read_to_string(home.join("normalized.jsonl")).expect("jsonl");
    assert_eq!(jsonl.lines().count(), 2);

    let out = run(
        &home,
        &[
            "--json",
            "map",
            "--input",
            "normalized.jsonl",
            "--rules",
            "rules.toml",
            "--reference",
            "lookup.csv",
        ],
    );
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("parse json");
    assert_eq!(
        v.pointer("/summary/total_findings").and_then(|n| n.as_u64()),
        Some(2)
    );
    assert_eq!(
        v.pointer("/summary/total_records").and_then(|n| n.as_u64()),
        Some(2)
    );
    assert_eq!(
        v.pointer("/records/0/csf_subcategory_id")
            .and_then(|s| s.as_str()),
        Some("PR.DS-02")
    );
    assert_eq!(
        v.pointer("/records/0/weight").and_then(|n| n.as_f64()),
        Some(1.5)
    );
    assert_eq!(
        v.pointer("/records/1/csf_subcategory_id")
            .and_then(|s| s.as_str()),
        Some("ID.AM-02")
    );

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn map_verbose_breaks_down_functions_and_confidence() {
    let home = make_temp_home();
    write_file(home.join("raw.json").as_path(), RAW_NUCLEI_JSON);
    write_file(home.join("rules.toml").as_path(), RULES_TOML);
    write_file(home.join("lookup.csv").as_path(), LOOKUP_CSV);

    let out = run(
        &home,
        &[
            "--verbose",
            "map",
            "--input",
            "raw.json",
            "--rules",
            "rules.toml",
            "--reference",
            "lookup.csv",
        ],
    );
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains("分類: 2 件の finding から 2 件のレコードを生成しました。"),
        "stdout={stdout}"
    );
    assert!(
        stdout.contains("- 機能別: Identify=1 Protect=1"),
        "stdout={stdout}"
    );
    assert!(
        stdout.contains("- 確度別: High=1 Low=1"),
        "stdout={stdout}"
    );

    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn map_zero_records_notes_and_skips_output_file() {
    let home = make_temp_home();
    write_file(
        home.join("findings.jsonl").as_path(),
        br#"{"templateID":"dns/caa-fingerprint","host":"https://a.example.test","matched-at":"https://a.example.test","severity":"info","timestamp":"2026-03-01T10:00:00Z","matcher-name":"caa","description":"CAA record","tags":["dns"]}
"#,
    );
    write_file(home.join("rules.toml").as_path(), RULES_TOML);
    write_file(home.join("lookup.csv").as_path(), LOOKUP_CSV);

    let out = run(
        &home,
        &[
            "map",
            "--input",
            "findings.jsonl",
            "--rules",
            "rules.toml",
            "--reference",
            "lookup.csv",
            "--output",
            "mapped.jsonl",
        ],
    );
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains("出力: 対象が0件のためファイルを書き出しませんでした。"),
        "stdout={stdout}"
    );
    assert!(
        stdout.contains("- 分類: ルールに一致しなかった finding が 1 件あります（レコードなし）"),
        "stdout={stdout}"
    );
    assert!(
        stdout.contains("分類: 1 件の finding から 0 件のレコードを生成しました。"),
        "stdout={stdout}"
    );
    assert!(!home.join("mapped.jsonl").exists());

    let _ = std::fs::remove_dir_all(&home);
}

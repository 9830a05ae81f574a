//! Command-line tools: `kfxgen` writes containers and dumps, `kfx-dump`
//! reads them back.
#![cfg(feature = "cli")]

use std::fs;
use std::path::Path;
use std::process::Command;

use tempfile::TempDir;

const DOC: &str = r#"{
    "id": "urn:test:cli",
    "metadata": {"title": "CLI Book", "authors": ["Someone"], "language": "en"},
    "sections": [
        {"title": "Start", "blocks": [
            {"type": "paragraph", "class": "lead", "content": [{"type": "text", "text": "First words."}]}
        ]}
    ]
}"#;

const CSS: &str = ".lead { font-size: 120%; margin-top: 1em }";

fn write(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn kfxgen() -> Command {
    Command::new(env!("CARGO_BIN_EXE_kfxgen"))
}

#[test]
fn test_kfxgen_writes_container_beside_input() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "book.json", DOC);
    let css = write(dir.path(), "book.css", CSS);

    let status = kfxgen().arg("-s").arg(&css).arg(&input).status().unwrap();
    assert!(status.success());

    let bytes = fs::read(dir.path().join("book.kfx")).unwrap();
    assert_eq!(&bytes[..4], b"CONT");
    assert!(!dir.path().join("book.kfx.txt").exists());
}

#[test]
fn test_kfxgen_debug_dump() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "book.json", DOC);
    let out = dir.path().join("out.kfx");

    let status = kfxgen()
        .arg("--debug-dump")
        .arg("-o")
        .arg(&out)
        .arg(&input)
        .status()
        .unwrap();
    assert!(status.success());
    assert!(out.exists());

    let dump = fs::read_to_string(dir.path().join("out.kfx.txt")).unwrap();
    assert!(dump.starts_with("container CR!"));
    assert!(dump.contains("\"First words.\""));
    assert!(dump.contains("container_entity_map"));
}

#[test]
fn test_kfxgen_config_enables_dump() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "book.json", DOC);
    let config = write(dir.path(), "settings.json", r#"{"debug_dump": true, "location_stride": 50}"#);

    let status = kfxgen().arg("-c").arg(&config).arg(&input).status().unwrap();
    assert!(status.success());
    assert!(dir.path().join("book.kfx.txt").exists());
}

#[test]
fn test_kfxgen_batch_reports_failures() {
    let dir = TempDir::new().unwrap();
    let good = write(dir.path(), "good.json", DOC);
    let bad = write(dir.path(), "bad.json", "{ not json");
    let out = dir.path().join("out");

    let output = kfxgen().arg("-o").arg(&out).arg(&good).arg(&bad).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("bad.json"));
    assert!(out.join("good.kfx").exists());
    assert!(!out.join("bad.kfx").exists());
}

#[test]
fn test_kfx_dump_reads_generated_container() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "book.json", DOC);
    assert!(kfxgen().arg(&input).status().unwrap().success());

    let output = Command::new(env!("CARGO_BIN_EXE_kfx-dump"))
        .arg(dir.path().join("book.kfx"))
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Container version: 2"));
    assert!(stdout.contains("Container id: CR!"));
    assert!(stdout.contains("=== Entity table ==="));
    assert!(stdout.contains("storyline"));
    assert!(stdout.contains("First words."));

    let stats = Command::new(env!("CARGO_BIN_EXE_kfx-dump"))
        .arg("--stat")
        .arg(dir.path().join("book.kfx"))
        .output()
        .unwrap();
    assert!(stats.status.success());
    assert!(String::from_utf8_lossy(&stats.stdout).contains("section"));
}

#[test]
fn test_kfx_dump_type_filter() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "book.json", DOC);
    assert!(kfxgen().arg(&input).status().unwrap().success());
    let book = dir.path().join("book.kfx");

    for name in ["storyline", "$259"] {
        let output = Command::new(env!("CARGO_BIN_EXE_kfx-dump"))
            .arg("-t")
            .arg(name)
            .arg(&book)
            .output()
            .unwrap();
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        let headers: Vec<&str> = stdout.lines().filter(|l| l.starts_with("=== Entity ") && l.contains(": ")).collect();
        assert_eq!(headers.len(), 1, "{headers:?}");
        assert!(headers[0].contains(": storyline "));
    }

    let unknown = Command::new(env!("CARGO_BIN_EXE_kfx-dump"))
        .arg("-t")
        .arg("no-such-type")
        .arg(&book)
        .output()
        .unwrap();
    assert!(!unknown.status.success());
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("unknown fragment type"));
}

#[test]
fn test_kfx_dump_rejects_non_container() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "plain.txt", "hello, not a container");
    let output = Command::new(env!("CARGO_BIN_EXE_kfx-dump")).arg(&path).output().unwrap();
    assert!(!output.status.success());
}

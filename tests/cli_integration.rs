use std::io::Write;
use std::process::{Command, Stdio};
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_deltabridge").to_string()
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    let delta = dir.path().join("delta.vcdiff");
    let output = dir.path().join("output.bin");

    std::fs::write(&source, b"abcde12345abcde12345").unwrap();
    std::fs::write(&target, b"abcdeXXXXXabcde12345!").unwrap();

    let st = Command::new(bin())
        .args(["encode", "--source"])
        .arg(&source)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());

    let st = Command::new(bin())
        .args(["decode", "--source"])
        .arg(&source)
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&target).unwrap()
    );
}

#[test]
fn cli_decode_from_stdin_to_stdout() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("source.bin");
    let target = dir.path().join("target.bin");
    std::fs::write(&source, b"shared prefix, shared suffix").unwrap();
    std::fs::write(&target, b"shared prefix, changed middle, shared suffix").unwrap();

    let encoded = Command::new(bin())
        .args(["encode", "-s"])
        .arg(&source)
        .arg(&target)
        .output()
        .unwrap();
    assert!(encoded.status.success());
    assert!(!encoded.stdout.is_empty());

    let mut child = Command::new(bin())
        .args(["decode", "-s"])
        .arg(&source)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(&encoded.stdout)
        .unwrap();
    let decoded = child.wait_with_output().unwrap();
    assert!(decoded.status.success());
    assert_eq!(decoded.stdout, std::fs::read(&target).unwrap());
}

#[test]
fn cli_empty_delta_fails() {
    let out = Command::new(bin())
        .arg("decode")
        .stdin(Stdio::null())
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&out.stderr).contains("delta is empty"));
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.vcdiff");
    std::fs::write(&input, b"payload").unwrap();
    std::fs::write(&output, b"keep me").unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&output).unwrap(), b"keep me");

    let st = Command::new(bin())
        .args(["-f", "encode"])
        .arg(&input)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_ne!(std::fs::read(&output).unwrap(), b"keep me");
}

#[test]
fn cli_json_reports_sizes() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.bin");
    let output = dir.path().join("out.vcdiff");
    std::fs::write(&input, b"some input bytes").unwrap();

    let out = Command::new(bin())
        .args(["--json", "encode"])
        .arg(&input)
        .arg(&output)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    let json: serde_json::Value = serde_json::from_str(&stderr).unwrap();
    assert_eq!(json["command"], "encode");
    assert_eq!(json["input_size"], 16);
    assert_eq!(
        json["output_size"],
        std::fs::metadata(&output).unwrap().len()
    );
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("MAX_WINDOW_SIZE="));
}

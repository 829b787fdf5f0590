use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use celestial_stardb::xindex::read_entries;

fn make_xindex(args: &[&str], stdin: &str) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_make-xindex"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_stdin_to_stdout() {
    let output = make_xindex(&[], "1 2\n3 4\n");
    assert!(output.status.success());
    assert_eq!(output.stdout.len(), 26);
    assert!(output.stdout.starts_with(b"CELINDEX"));

    let entries = read_entries(output.stdout.as_slice()).unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].catalog_number, 3);
    assert_eq!(entries[1].cel_catalog_number, 4);
}

#[test]
fn test_parse_error_exits_with_failure() {
    let output = make_xindex(&[], "5");
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error parsing record #0"), "{}", stderr);
}

#[test]
fn test_usage_errors_exit_with_failure() {
    for args in [&["a", "b", "c"][..], &["-x"][..]] {
        let output = make_xindex(args, "");
        assert_eq!(output.status.code(), Some(1), "args {:?}", args);
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert_eq!(stderr.matches("Usage:").count(), 1, "{}", stderr);
    }
}

#[test]
fn test_file_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("hd.txt");
    let output_path = dir.path().join("hd.dat");
    std::fs::write(&input, "48915 32349\n8890 11767\n").unwrap();

    let output = make_xindex(&[path_arg(&input), path_arg(&output_path)], "");
    assert!(output.status.success());
    assert!(output.stdout.is_empty());

    let bytes = std::fs::read(&output_path).unwrap();
    assert_eq!(bytes.len(), 26);
    let entries = read_entries(bytes.as_slice()).unwrap();
    assert_eq!(entries[0].catalog_number, 48915);
    assert_eq!(entries[0].cel_catalog_number, 32349);
}

#[test]
fn test_missing_input_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.txt");
    let output = make_xindex(&[path_arg(&missing)], "");
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error opening input file"), "{}", stderr);
}

mod common;

use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn onboard_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("onboard");
    path
}

fn setup_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    common::write_onboarding_pdfs(&tmp.path().join("docs"));
    let config = common::write_config(tmp.path(), "echo");
    (tmp, config)
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(onboard_binary())
        .args(["--config", config.to_str().unwrap(), "--progress", "off"])
        .args(args)
        .output()
        .expect("failed to run onboard")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn setup_profile(config: &Path) {
    let output = run(
        config,
        &[
            "setup",
            "--name",
            "Morgan",
            "--department",
            "sales",
            "--role",
            "Account Executive",
        ],
    );
    assert!(output.status.success(), "setup failed: {:?}", output);
}

#[test]
fn test_ask_without_profile_explains_setup() {
    let (_tmp, config) = setup_env();
    let output = run(&config, &["ask", "How many vacation days?"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("onboard setup"), "stderr: {}", stderr);
}

#[test]
fn test_setup_then_profile_show() {
    let (_tmp, config) = setup_env();
    setup_profile(&config);
    let output = run(&config, &["profile", "show"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("Morgan"));
    assert!(out.contains("Sales"));
    assert!(out.contains("Account Executive"));
}

#[test]
fn test_setup_rejects_unknown_department() {
    let (_tmp, config) = setup_env();
    let output = run(
        &config,
        &["setup", "--name", "A", "--department", "Legal", "--role", "B"],
    );
    assert!(!output.status.success());
}

#[test]
fn test_ask_with_echo_model_and_history() {
    let (_tmp, config) = setup_env();
    setup_profile(&config);

    let output = run(&config, &["ask", "How many vacation days?", "--no-stream"]);
    assert!(output.status.success(), "ask failed: {:?}", output);
    let out = stdout(&output);
    assert!(out.contains("How many vacation days?"));
    assert!(out.contains("Morgan"));
    assert!(out.contains("[SOURCE: handbook.pdf]"));
    assert!(out.contains("Sources: handbook.pdf"));

    let history = stdout(&run(&config, &["history", "show"]));
    assert!(history.contains("you:"));
    assert!(history.contains("assistant:"));

    assert!(run(&config, &["history", "clear"]).status.success());
    assert!(stdout(&run(&config, &["history", "show"])).contains("No chat history."));
}

#[test]
fn test_streamed_ask_prints_answer() {
    let (_tmp, config) = setup_env();
    setup_profile(&config);
    let output = run(&config, &["ask", "When does health insurance start?"]);
    assert!(output.status.success(), "ask failed: {:?}", output);
    let out = stdout(&output);
    assert!(out.contains("Question: When does health insurance start?"));
    let sources = out
        .lines()
        .find(|l| l.starts_with("Sources: "))
        .expect("no sources line");
    assert!(sources.contains(".pdf"), "sources: {}", sources);
}

#[test]
fn test_search_ranks_handbook_first() {
    let (_tmp, config) = setup_env();
    let output = run(&config, &["search", "How many vacation days?", "--k", "1"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("1. ["), "stdout: {}", out);
    assert!(out.contains("handbook.pdf (page 1)"));
    assert!(!out.contains("2. ["));
}

#[test]
fn test_ingest_report_and_profile_reset() {
    let (_tmp, config) = setup_env();
    let out = stdout(&run(&config, &["ingest"]));
    assert!(out.contains("Documents:   2"));
    assert!(out.contains("Chunks:      3"));

    setup_profile(&config);
    assert!(stdout(&run(&config, &["profile", "reset"])).contains("deleted"));
    assert!(stdout(&run(&config, &["profile", "show"])).contains("No profile found"));
}

#[test]
fn test_ingest_empty_folder_mentions_refusal_path() {
    let tmp = TempDir::new().unwrap();
    std::fs::create_dir_all(tmp.path().join("docs")).unwrap();
    let config = common::write_config(tmp.path(), "echo");

    let output = run(&config, &["ingest"]);
    assert!(output.status.success(), "ingest failed: {:?}", output);
    let out = stdout(&output);
    assert!(out.contains("Documents:   0"));
    assert!(
        out.contains("No documents found in") && out.contains("refusal path"),
        "stdout: {}",
        out
    );
}

#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

impl CmdResult {
    pub fn code(&self) -> Option<i32> {
        self.status.code()
    }
}

/// Extra knobs for a CLI invocation.
#[derive(Default)]
pub struct CaseOptions<'a> {
    pub env: Vec<(&'a str, &'a str)>,
    pub stdin: Option<&'a [u8]>,
    pub home: Option<&'a Path>,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_dendr") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "dendr.exe" } else { "dendr" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve dendr binary path for integration test"),
    }
}

pub fn run_cli_case(case_name: &str, args: &[&str]) -> CmdResult {
    run_cli_case_with(case_name, args, &CaseOptions::default())
}

pub fn run_cli_case_with(case_name: &str, args: &[&str], opts: &CaseOptions<'_>) -> CmdResult {
    let root = std::env::temp_dir().join("dendr-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    // Isolate from the developer's config and output preferences.
    let home = opts.home.map_or_else(|| root.join("home"), Path::to_path_buf);
    let mut cmd = Command::new(&bin_path);
    cmd.args(args)
        .env("HOME", &home)
        .env_remove("DENDR_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .stdin(if opts.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().expect("spawn dendr command");
    if let Some(input) = opts.stdin {
        let mut stdin = child.stdin.take().expect("child stdin");
        stdin.write_all(input).expect("write child stdin");
    }
    let output = child.wait_with_output().expect("execute dendr command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let mut log_content = String::new();
    log_content.push_str(&format!("case={case_name}\n"));
    log_content.push_str(&format!("bin={}\n", bin_path.display()));
    log_content.push_str(&format!("args={args:?}\n"));
    log_content.push_str(&format!("env={:?}\n", opts.env));
    log_content.push_str(&format!("status={}\n", output.status));
    log_content.push_str("----- stdout -----\n");
    log_content.push_str(&stdout);
    log_content.push('\n');
    log_content.push_str("----- stderr -----\n");
    log_content.push_str(&stderr);
    log_content.push('\n');
    fs::write(&log_path, log_content).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

use std::path::PathBuf;
use std::process::Command;

fn temp_workspace(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("grackle-cli-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn run_cli(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_grackle"))
        .args(args)
        .output()
        .expect("run cli")
}

fn exit_code(out: &std::process::Output) -> i32 {
    out.status.code().expect("exit code")
}

#[test]
fn conflicting_solver_selections_are_a_config_error() {
    let ws = temp_workspace("conflict");
    let out = run_cli(&[
        "--sim",
        "--smt2",
        "dump.smt2",
        "--seed",
        "1",
        "--tmp-dir",
        ws.join("tmp").to_str().unwrap(),
        "--out-dir",
        ws.join("out").to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&out), 2);
    // No test run was attempted.
    assert!(!ws.join("out").exists());
}

#[test]
fn unknown_flags_are_fatal() {
    let out = run_cli(&["--frobnicate"]);
    assert_eq!(exit_code(&out), 2);
}

#[test]
fn missing_required_argument_is_fatal() {
    let out = run_cli(&["--smt2"]);
    assert_eq!(exit_code(&out), 2);
}

#[test]
fn unknown_theory_is_a_config_error() {
    let out = run_cli(&["--sim", "--seed", "1", "--theory", "frobnication"]);
    assert_eq!(exit_code(&out), 2);
}

#[test]
fn unconfigured_backend_is_a_config_error() {
    let ws = temp_workspace("bitwuzla");
    let out = run_cli(&[
        "--bitwuzla",
        "--seed",
        "1",
        "--tmp-dir",
        ws.join("tmp").to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&out), 2);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("not compiled"), "stderr: {stderr}");
}

#[test]
fn untracing_the_active_trace_target_is_rejected() {
    let ws = temp_workspace("same-path");
    let trace = ws.join("loop.trace");
    std::fs::write(&trace, "seed 1\nnew\ndelete\n").expect("write trace");
    let path = trace.to_str().unwrap();
    let out = run_cli(&["--sim", "--untrace", path, "--api-trace", path]);
    assert_eq!(exit_code(&out), 2);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("refusing to replay"), "stderr: {stderr}");
}

#[test]
fn print_fsm_dumps_the_configuration() {
    let out = run_cli(&["--print-fsm"]);
    assert_eq!(exit_code(&out), 0);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("weighted transitions"));
    assert!(stdout.contains("check"));
}

#[test]
fn direct_seeded_runs_are_deterministic_and_replayable() {
    let ws = temp_workspace("direct");
    let trace_a = ws.join("a.trace");
    let trace_b = ws.join("b.trace");

    for path in [&trace_a, &trace_b] {
        let out = run_cli(&[
            "--sim",
            "--seed",
            "42",
            "--theory",
            "bv",
            "--max-actions",
            "50",
            "--api-trace",
            path.to_str().unwrap(),
        ]);
        assert_eq!(exit_code(&out), 0, "stderr: {}", String::from_utf8_lossy(&out.stderr));
    }

    let a = std::fs::read(&trace_a).expect("trace a");
    let b = std::fs::read(&trace_b).expect("trace b");
    assert_eq!(a, b, "same seed produced different traces");
    assert!(a.starts_with(b"seed 42\n"));

    let out = run_cli(&["--sim", "--untrace", trace_a.to_str().unwrap()]);
    assert_eq!(exit_code(&out), 0, "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("replayed"));
}

#[test]
fn continuous_fuzzing_reports_a_session_summary() {
    let ws = temp_workspace("fuzz");
    let out = run_cli(&[
        "--sim",
        "--seed",
        "7",
        "--max-runs",
        "2",
        "--max-actions",
        "24",
        "--theory",
        "bv",
        "--stats",
        "--tmp-dir",
        ws.join("tmp").to_str().unwrap(),
        "--out-dir",
        ws.join("out").to_str().unwrap(),
    ]);
    assert_eq!(exit_code(&out), 0, "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("2 run(s)"), "stdout: {stdout}");
    assert!(stdout.contains("runs: 2"), "stdout: {stdout}");
    // The per-session scratch directory was cleaned up after the summary.
    let leftovers: Vec<_> = std::fs::read_dir(ws.join("tmp"))
        .map(|it| it.flatten().collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "leftover scratch: {leftovers:?}");
}

#[test]
fn smt2_dump_target_receives_the_session() {
    let ws = temp_workspace("smt2");
    let dump = ws.join("session.smt2");
    let out = run_cli(&[
        "--smt2",
        dump.to_str().unwrap(),
        "--seed",
        "11",
        "--theory",
        "bv",
        "--max-actions",
        "30",
    ]);
    assert_eq!(exit_code(&out), 0, "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let text = std::fs::read_to_string(&dump).expect("dump written");
    assert!(text.contains("(set-logic ALL)"));
    assert!(text.contains("(exit)"));
}

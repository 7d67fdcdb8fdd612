use std::path::PathBuf;

use grackle::{
    delta_debug, untrace, Action, Config, DdOptions, Fsm, FuzzOptions, Orchestrator, Session,
    SessionConfig, Smt2Solver, SolverKind, SortKind, Statistics, Theory, Trace,
};

fn temp_workspace(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("grackle-golden-{name}-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&root).expect("create temp workspace");
    root
}

fn workspace_config(ws: &PathBuf) -> Config {
    let mut config = Config::default();
    config.tmp_dir = ws.join("tmp");
    config.out_dir = ws.join("out");
    config
}

fn bv_session(max_actions: u64) -> SessionConfig {
    let mut cfg = SessionConfig::new(SolverKind::Sim);
    cfg.theories.insert(Theory::BitVectors);
    cfg.max_actions = max_actions;
    cfg
}

fn is_subsequence(smaller: &[Action], larger: &[Action]) -> bool {
    let mut it = larger.iter();
    smaller.iter().all(|a| it.any(|b| b == a))
}

/// Generation and replay must issue the identical solver call sequence. The
/// SMT-LIB2 dump backend makes the call sequence observable as text.
#[test]
fn golden_generate_then_replay_issues_identical_solver_calls() {
    let ws = temp_workspace("replay-fidelity");
    let gen_dump = ws.join("generated.smt2");
    let replay_dump = ws.join("replayed.smt2");
    let trace_path = ws.join("api.trace");

    let mut cfg = SessionConfig::new(SolverKind::Smt2);
    cfg.smt2_out = Some(gen_dump.clone());
    cfg.theories.insert(Theory::BitVectors);
    cfg.max_actions = 50;

    let stats = Statistics::new();
    grackle::run_session_direct(&cfg, 42, Some(trace_path.as_path()), None, &stats)
        .expect("generate");

    let trace = Trace::load(&trace_path).expect("trace parses");
    assert_eq!(trace.seed, 42);
    assert!(trace.actions.len() as u64 <= 50);

    let mut replay_cfg = cfg.clone();
    replay_cfg.smt2_out = Some(replay_dump.clone());
    grackle::run_session_direct(&replay_cfg, 42, None, Some(trace_path.as_path()), &stats)
        .expect("replay");

    let generated = std::fs::read_to_string(&gen_dump).expect("generated dump");
    let replayed = std::fs::read_to_string(&replay_dump).expect("replayed dump");
    assert_eq!(generated, replayed, "replay issued different solver calls");
}

/// Seed 42, bit-vectors only, 50-action budget: every created sort stays in
/// the core or bit-vector theory.
#[test]
fn golden_bv_session_respects_theory_and_budget() {
    let session_cfg = bv_session(50);
    let fsm_cfg = session_cfg.fsm_config();
    let stats = Statistics::new();
    let mut fsm = Fsm::new(
        &fsm_cfg,
        42,
        Box::new(grackle::SimSolver::new()),
        None,
        &stats,
    );
    fsm.run(None).expect("session runs");

    let actions = fsm.recorded().to_vec();
    assert!(actions.len() as u64 <= 50);
    for action in &actions {
        if let Action::MkSort { kind, .. } = action {
            assert!(matches!(kind, SortKind::Bool | SortKind::BitVec(_)));
        }
    }

    // The recorded sequence replays cleanly on a fresh session.
    let trace = Trace {
        seed: 42,
        actions,
    };
    let mut session = Session::new(Box::new(grackle::SimSolver::new()));
    untrace(&mut session, &trace).expect("replay");
}

/// A crafted failing trace with spurious lines shrinks to a strictly
/// shorter reproducer that still carries the match string.
#[test]
fn golden_delta_debug_removes_spurious_lines() {
    let ws = temp_workspace("dd");
    let trace_path = ws.join("fail.trace");
    std::fs::write(
        &trace_path,
        "seed 99\n\
         new\n\
         set-option sim-fail-on-check true\n\
         mk-sort s0 bool\n\
         mk-var t0 s0 p0\n\
         mk-var t1 s0 spurious0\n\
         mk-var t2 s0 spurious1\n\
         assert t0\n\
         check-sat\n\
         delete\n",
    )
    .expect("write trace");

    let original = Trace::load(&trace_path).expect("trace parses");
    let mut orch = Orchestrator::new(
        bv_session(50),
        workspace_config(&ws),
        PathBuf::from(env!("CARGO_BIN_EXE_grackle")),
    )
    .expect("orchestrator");

    let opt = DdOptions {
        match_err: Some("assertion failure".to_string()),
        match_out: None,
        out_path: Some(ws.join("fail.min.trace")),
    };
    let result = delta_debug(&mut orch, &trace_path, &opt).expect("dd runs");

    assert!(result.minimized_actions < result.original_actions);
    let minimized = Trace::load(&result.out_path).expect("minimized parses");
    assert_eq!(minimized.seed, 99);
    assert!(is_subsequence(&minimized.actions, &original.actions));

    let rendered = minimized.render();
    assert!(rendered.contains("set-option sim-fail-on-check true"));
    assert!(rendered.contains("assert t0"));
    assert!(rendered.contains("check-sat"));
    assert!(!rendered.contains("spurious0"));
    assert!(!rendered.contains("spurious1"));

    // Local 1-minimality for this input: exactly the six load-bearing lines.
    assert_eq!(result.minimized_actions, 6);

    // The minimized trace still reproduces through the forked oracle.
    let outcome = orch
        .run_forked(minimized.seed, Some(result.out_path.as_path()))
        .expect("oracle run");
    assert!(outcome.failed());
    assert!(outcome.stderr.contains("assertion failure"));
}

/// Clean sessions fuzz to completion with per-child statistics merged into
/// the parent record.
#[test]
fn golden_fuzz_session_merges_worker_statistics() {
    let ws = temp_workspace("fuzz");
    let mut orch = Orchestrator::new(
        bv_session(24),
        workspace_config(&ws),
        PathBuf::from(env!("CARGO_BIN_EXE_grackle")),
    )
    .expect("orchestrator");

    let summary = orch
        .fuzz(&FuzzOptions {
            seed: Some(5),
            max_runs: Some(3),
            time: None,
        })
        .expect("fuzz");

    assert_eq!(summary.runs, 3);
    assert_eq!(summary.failures, 0);
    assert!(orch.errors.is_empty());

    let stats = orch.stats.snapshot();
    assert_eq!(stats.runs, 3);
    assert_eq!(stats.runs_ok, 3);
    assert!(stats.actions > 0, "worker action counts were not merged");
}

/// A trace whose composite terms reference ids with no creating line is
/// corrupted and must fail loudly rather than silently skip.
#[test]
fn golden_untrace_rejects_corrupted_references() {
    let trace = Trace::parse("seed 3\nnew\nmk-term t5 and t0 t1\n").expect("parses");
    let mut session = Session::new(Box::new(grackle::SimSolver::new()));
    let err = untrace(&mut session, &trace).expect_err("must fail");
    assert!(err.to_string().contains("unknown term"));
}

/// Writing an SMT-LIB2 dump through the session plumbing end to end.
#[test]
fn golden_smt2_writer_flow() {
    use std::io::Write;

    #[derive(Clone, Default)]
    struct SharedBuf(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);
    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buf = SharedBuf::default();
    let solver = Smt2Solver::with_writer(Box::new(buf.clone()));
    let trace = Trace::parse(
        "seed 8\n\
         new\n\
         mk-sort s0 (bv 8)\n\
         mk-sort s1 bool\n\
         mk-var t0 s0 x0\n\
         mk-value t1 s0 #b10100101\n\
         mk-term t2 bvult t0 t1\n\
         assert t2\n\
         check-sat\n\
         delete\n",
    )
    .expect("parses");

    let mut session = Session::new(Box::new(solver));
    untrace(&mut session, &trace).expect("replay");

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).expect("utf8");
    assert!(text.contains("(declare-const x0 (_ BitVec 8))"));
    assert!(text.contains("(assert t2)"));
    assert!(text.contains("(check-sat)"));
}

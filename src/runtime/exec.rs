//! Run orchestration: executes one session in-process or in an isolated
//! worker subprocess with captured streams and a wall-clock deadline, then
//! classifies the outcome and deduplicates error text.

use regex::Regex;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use crate::{
    create_solver, gen_seed, untrace, wall_time_iso_utc, Config, Fsm, GrackleResult, RngSource,
    Seed, Session, SessionConfig, Statistics, TmpDir, Trace, TraceWriter,
};

/// Classified exit of one forked run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Ok,
    /// Normal exit with a non-zero code (solver error, replay error).
    Error,
    /// Terminated by a signal.
    Crash(i32),
    /// Killed at the wall-clock deadline.
    Timeout,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stdout: String,
    pub stderr: String,
    /// The worker's trace file (a replayable prefix even after a crash).
    pub trace_path: PathBuf,
}

impl RunOutcome {
    pub fn failed(&self) -> bool {
        self.status != RunStatus::Ok
    }

    /// The stream the failure signature is derived from.
    pub fn failure_text(&self) -> &str {
        if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        }
    }
}

static HEX_ADDR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"0x[0-9a-fA-F]+").expect("static pattern"));
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static pattern"));

/// Strips volatile substrings (addresses, seeds, counters) so semantically
/// identical failures collapse to one signature.
pub fn normalize_error(text: &str) -> String {
    let no_addrs = HEX_ADDR.replace_all(text, "<addr>");
    DIGIT_RUN.replace_all(&no_addrs, "<n>").trim().to_string()
}

#[derive(Debug, Clone)]
pub struct ErrorEntry {
    /// First occurrence's raw text, kept as the representative message.
    pub raw: String,
    /// Every seed that reproduced this signature.
    pub seeds: Vec<Seed>,
}

/// Normalized failure signature -> representative text and reproducing
/// seeds.
#[derive(Debug, Default)]
pub struct ErrorMap {
    entries: BTreeMap<String, ErrorEntry>,
}

impl ErrorMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an error occurrence; returns true when the signature was
    /// new.
    pub fn add(&mut self, raw: &str, seed: Seed) -> bool {
        let key = normalize_error(raw);
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.seeds.push(seed);
                false
            }
            None => {
                self.entries.insert(
                    key,
                    ErrorEntry {
                        raw: raw.to_string(),
                        seeds: vec![seed],
                    },
                );
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ErrorEntry)> {
        self.entries.iter()
    }

    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "no errors recorded".to_string();
        }
        let mut out = format!("{} distinct error(s):\n", self.entries.len());
        for entry in self.entries.values() {
            let first_line = entry.raw.lines().next().unwrap_or("<empty>");
            let seeds: Vec<String> = entry.seeds.iter().map(|s| s.to_string()).collect();
            out.push_str(&format!(
                "  [{} seed(s): {}] {}\n",
                entry.seeds.len(),
                seeds.join(" "),
                first_line
            ));
        }
        out.trim_end().to_string()
    }
}

/// Runs one session in the current process. Used by `--untrace` (single
/// deterministic replay) and by worker processes; runtime errors propagate
/// because there is no isolation here.
pub fn run_session_direct(
    session_cfg: &SessionConfig,
    seed: Seed,
    trace_out: Option<&Path>,
    untrace_in: Option<&Path>,
    stats: &Statistics,
) -> GrackleResult<()> {
    let solver = create_solver(session_cfg.solver, session_cfg.smt2_out.as_ref())?;
    match untrace_in {
        Some(path) => {
            let trace = Trace::load(path)?;
            let mut session = Session::new(solver);
            untrace(&mut session, &trace)
        }
        None => {
            let writer = trace_out
                .map(|p| TraceWriter::create(p, seed))
                .transpose()?;
            let fsm_cfg = session_cfg.fsm_config();
            let mut fsm = Fsm::new(&fsm_cfg, seed, solver, writer, stats);
            fsm.run(None)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FuzzOptions {
    pub seed: Option<Seed>,
    pub max_runs: Option<u64>,
    pub time: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct FuzzSummary {
    pub runs: u64,
    pub failures: u64,
    pub distinct_errors: usize,
    /// Preserved trace of the first failing run, for delta debugging.
    pub first_failing: Option<(Seed, PathBuf)>,
}

/// Drives forked sessions: one worker subprocess at a time, each owning its
/// own solver and registry exclusively. Parent and child share nothing but
/// the trace file and the per-run stats record.
pub struct Orchestrator {
    pub session_cfg: SessionConfig,
    pub config: Config,
    pub stats: Statistics,
    pub errors: ErrorMap,
    worker_exe: PathBuf,
    tmp: TmpDir,
    run_counter: u64,
}

impl Orchestrator {
    pub fn new(
        session_cfg: SessionConfig,
        config: Config,
        worker_exe: PathBuf,
    ) -> GrackleResult<Self> {
        std::fs::create_dir_all(&config.tmp_dir)?;
        let tmp = TmpDir::create(&config.tmp_dir)?;
        Ok(Self {
            session_cfg,
            config,
            stats: Statistics::new(),
            errors: ErrorMap::new(),
            worker_exe,
            tmp,
            run_counter: 0,
        })
    }

    pub fn tmp_path(&self) -> &Path {
        self.tmp.path()
    }

    /// Spawns one worker run and blocks until exit or deadline. On deadline
    /// expiry the child is killed and the run classified as a timeout.
    pub fn run_forked(
        &mut self,
        seed: Seed,
        untrace_in: Option<&Path>,
    ) -> GrackleResult<RunOutcome> {
        self.run_counter += 1;
        let run_dir = self.tmp.path().join(format!("run-{}", self.run_counter));
        std::fs::create_dir_all(&run_dir)?;
        let trace_path = run_dir.join("api.trace");
        let stdout_path = run_dir.join("stdout.log");
        let stderr_path = run_dir.join("stderr.log");
        let stats_path = run_dir.join("stats.json");

        let mut cmd = std::process::Command::new(&self.worker_exe);
        cmd.arg("--worker")
            .arg("--seed")
            .arg(seed.to_string())
            .arg("--api-trace")
            .arg(&trace_path)
            .arg("--stats-out")
            .arg(&stats_path)
            .args(self.session_cfg.to_worker_args())
            .stdin(std::process::Stdio::null())
            .stdout(std::fs::File::create(&stdout_path)?)
            .stderr(std::fs::File::create(&stderr_path)?);
        if let Some(path) = untrace_in {
            cmd.arg("--untrace").arg(path);
        }

        let mut child = cmd.spawn()?;
        let deadline = Instant::now() + Duration::from_millis(self.config.run_time_ms);
        let status = loop {
            match child.try_wait()? {
                Some(status) => break Some(status),
                None if Instant::now() >= deadline => {
                    child.kill()?;
                    child.wait()?;
                    break None;
                }
                None => std::thread::sleep(Duration::from_millis(5)),
            }
        };

        let status = match status {
            None => RunStatus::Timeout,
            Some(s) => classify_exit(s),
        };

        if let Ok(rec) = Statistics::load(&stats_path) {
            self.stats.merge(&rec);
        }

        Ok(RunOutcome {
            status,
            stdout: read_lossy(&stdout_path),
            stderr: read_lossy(&stderr_path),
            trace_path,
        })
    }

    /// Continuous fuzzing: per-run seeds drawn from a parent source seeded
    /// by the session seed, failing traces preserved under the out dir.
    pub fn fuzz(&mut self, opt: &FuzzOptions) -> GrackleResult<FuzzSummary> {
        let session_seed = opt.seed.unwrap_or_else(gen_seed);
        let mut parent_rng = RngSource::new(session_seed);
        let deadline = opt.time.map(|t| Instant::now() + t);
        let max_runs = opt.max_runs.unwrap_or(u64::MAX);

        tracing::info!(
            seed = session_seed,
            started_at = %wall_time_iso_utc(),
            "fuzzing session started"
        );
        let mut runs = 0u64;
        let mut failures = 0u64;
        let mut first_failing: Option<(Seed, PathBuf)> = None;

        while runs < max_runs {
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    break;
                }
            }
            let run_seed = parent_rng.next_u32();
            let outcome = self.run_forked(run_seed, None)?;
            runs += 1;
            self.stats.bump_runs();
            match outcome.status {
                RunStatus::Ok => self.stats.bump_runs_ok(),
                RunStatus::Error => self.stats.bump_runs_error(),
                RunStatus::Crash(_) => self.stats.bump_runs_crash(),
                RunStatus::Timeout => self.stats.bump_runs_timeout(),
            }

            if outcome.failed() {
                failures += 1;
                let new = self.errors.add(outcome.failure_text(), run_seed);
                let preserved = self.preserve_trace(&outcome.trace_path, run_seed)?;
                if new {
                    tracing::warn!(
                        seed = run_seed,
                        status = ?outcome.status,
                        trace = %preserved.display(),
                        "new failure signature"
                    );
                }
                if first_failing.is_none() {
                    first_failing = Some((run_seed, preserved));
                }
            }
        }

        Ok(FuzzSummary {
            runs,
            failures,
            distinct_errors: self.errors.len(),
            first_failing,
        })
    }

    fn preserve_trace(&self, trace_path: &Path, seed: Seed) -> GrackleResult<PathBuf> {
        std::fs::create_dir_all(&self.config.out_dir)?;
        let dest = self.config.out_dir.join(format!("grackle-{seed}.trace"));
        if trace_path.exists() {
            std::fs::copy(trace_path, &dest)?;
        }
        Ok(dest)
    }
}

fn classify_exit(status: std::process::ExitStatus) -> RunStatus {
    if status.success() {
        return RunStatus::Ok;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return RunStatus::Crash(sig);
        }
    }
    RunStatus::Error
}

fn read_lossy(path: &Path) -> String {
    std::fs::read(path)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_addresses_and_numbers() {
        let a = normalize_error("solver crashed at 0x7f3a9c0812e0 (seed 42)");
        let b = normalize_error("solver crashed at 0xdeadbeef (seed 1234567)");
        assert_eq!(a, b);
        assert_eq!(a, "solver crashed at <addr> (seed <n>)");
    }

    #[test]
    fn error_map_deduplicates_by_signature() {
        let mut map = ErrorMap::new();
        assert!(map.add("assertion failed at 0x1234, seed 42", 42));
        assert!(!map.add("assertion failed at 0xbeef, seed 99", 99));
        assert_eq!(map.len(), 1);

        let (_, entry) = map.iter().next().unwrap();
        assert_eq!(entry.seeds, vec![42, 99]);
        // The first occurrence's raw text is the representative.
        assert!(entry.raw.contains("0x1234"));

        assert!(map.add("a genuinely different failure", 7));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn summary_lists_seeds_per_signature() {
        let mut map = ErrorMap::new();
        map.add("boom at 0x1", 5);
        map.add("boom at 0x2", 6);
        let summary = map.summary();
        assert!(summary.contains("1 distinct error(s)"));
        assert!(summary.contains("5 6"));
    }

    #[test]
    fn direct_session_records_a_replayable_trace() {
        use crate::{SolverKind, Theory};
        let dir = std::env::temp_dir().join(format!("grackle-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let trace_path = dir.join("api.trace");

        let mut cfg = SessionConfig::new(SolverKind::Sim);
        cfg.theories.insert(Theory::BitVectors);
        cfg.max_actions = 40;
        let stats = Statistics::new();
        run_session_direct(&cfg, 42, Some(trace_path.as_path()), None, &stats).unwrap();

        assert!(stats.snapshot().actions > 0);
        let trace = Trace::load(&trace_path).unwrap();
        assert_eq!(trace.seed, 42);
        assert!(trace.actions.len() as u64 <= 40);

        // The recorded trace replays cleanly in direct mode.
        run_session_direct(&cfg, 42, None, Some(trace_path.as_path()), &stats).unwrap();
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

//! Grackle CLI entrypoint.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::process::ExitCode;

use grackle::{
    delta_debug, gen_seed, run_session_direct, Config, DdOptions, FuzzOptions, GrackleError,
    Orchestrator, SessionConfig, SolverKind, Statistics, Theory, TimeLimit,
};

const EXIT_ERROR: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "grackle")]
#[command(about = "model-based API fuzzer for SMT solver libraries")]
#[command(version)]
struct Cli {
    /// Seed for the session. With no run/time limit this selects one direct
    /// deterministic run; omitted seeds come from system entropy.
    #[arg(short = 's', long)]
    seed: Option<u32>,

    /// Wall-clock budget for the whole session (e.g. "30s", "5m", "1.5").
    #[arg(short = 't', long)]
    time: Option<TimeLimit>,

    /// Stop continuous fuzzing after this many runs.
    #[arg(short = 'm', long)]
    max_runs: Option<u64>,

    /// Upper bound on recorded actions per session.
    #[arg(long)]
    max_actions: Option<u64>,

    /// Log level.
    #[arg(long, default_value = "info")]
    log: String,

    /// Record the API trace of a direct run to this file.
    #[arg(short = 'a', long, value_name = "FILE")]
    api_trace: Option<PathBuf>,

    /// Replay a recorded trace instead of generating one.
    #[arg(short = 'u', long, value_name = "FILE")]
    untrace: Option<PathBuf>,

    /// Delta-debug the failing trace down to a minimal reproducer.
    #[arg(short = 'd', long)]
    dd: bool,

    /// Substring the candidate's stderr must contain for a dd trial to
    /// count as reproducing.
    #[arg(long, value_name = "STR")]
    dd_match_err: Option<String>,

    /// Substring the candidate's stdout must contain for a dd trial to
    /// count as reproducing.
    #[arg(long, value_name = "STR")]
    dd_match_out: Option<String>,

    /// Output path for the minimized trace.
    #[arg(long, value_name = "FILE")]
    dd_out: Option<PathBuf>,

    /// Drive the scripted in-process reference backend (default).
    #[arg(long, group = "solver")]
    sim: bool,

    /// Dump the session as SMT-LIB2 to FILE ("-" for stdout).
    #[arg(long, group = "solver", value_name = "FILE")]
    smt2: Option<String>,

    /// Drive the bitwuzla backend (requires a build with bitwuzla support).
    #[arg(long, group = "solver")]
    bitwuzla: bool,

    /// Enable a theory (repeatable: arrays|bv|fp|int|quant|real|string|uf).
    #[arg(short = 'y', long = "theory", value_name = "NAME")]
    theories: Vec<Theory>,

    /// Restrict arithmetic to linear terms.
    #[arg(long)]
    linear: bool,

    /// Disable uninterpreted sorts and constants.
    #[arg(long)]
    no_uf: bool,

    /// Scratch directory override.
    #[arg(long, value_name = "DIR")]
    tmp_dir: Option<PathBuf>,

    /// Directory failing traces are preserved under.
    #[arg(short = 'o', long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Print statistics at session end.
    #[arg(long)]
    stats: bool,

    /// Print the FSM configuration and exit.
    #[arg(long)]
    print_fsm: bool,

    /// Config file with durable defaults.
    #[arg(long, default_value = "grackle.toml")]
    config: PathBuf,

    #[arg(long, hide = true)]
    worker: bool,

    #[arg(long, hide = true, value_name = "FILE")]
    stats_out: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(err),
    }
}

fn print_error_and_exit(err: anyhow::Error) -> ExitCode {
    eprintln!("grackle: {err:#}");
    let config = err
        .downcast_ref::<GrackleError>()
        .is_some_and(GrackleError::is_config);
    if config {
        ExitCode::from(EXIT_CONFIG)
    } else {
        ExitCode::from(EXIT_ERROR)
    }
}

fn run(cli: &Cli) -> anyhow::Result<ExitCode> {
    if cli.print_fsm {
        print!("{}", grackle::render_fsm_table());
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load_optional(&cli.config);
    if let Some(dir) = &cli.tmp_dir {
        config.tmp_dir = dir.clone();
    }
    if let Some(dir) = &cli.out_dir {
        config.out_dir = dir.clone();
    }
    if let Some(t) = cli.time {
        // One forked run never outlives the session budget.
        config.run_time_ms = config.run_time_ms.min(t.0.as_millis().max(1) as u64);
    }

    let session_cfg = resolve_session(cli, &config)?;

    if cli.worker {
        return worker_main(cli, &session_cfg);
    }

    if let (Some(untrace), Some(api_trace)) = (&cli.untrace, &cli.api_trace) {
        if untrace == api_trace {
            return Err(GrackleError::Config(format!(
                "--untrace and --api-trace both name {}; refusing to replay the active trace target",
                untrace.display()
            ))
            .into());
        }
    }

    if let Some(trace_path) = &cli.untrace {
        if cli.dd {
            let mut orch = Orchestrator::new(session_cfg, config, std::env::current_exe()?)?;
            let opt = DdOptions {
                match_err: cli.dd_match_err.clone(),
                match_out: cli.dd_match_out.clone(),
                out_path: cli.dd_out.clone(),
            };
            let result = delta_debug(&mut orch, trace_path, &opt)?;
            println!(
                "minimized {} -> {} actions in {} trials: {}",
                result.original_actions,
                result.minimized_actions,
                result.trials,
                result.out_path.display()
            );
            if cli.stats {
                println!("{}", orch.stats.pretty());
            }
            return Ok(ExitCode::SUCCESS);
        }

        // Single deterministic replay, no isolation: errors propagate.
        let stats = Statistics::new();
        run_session_direct(
            &session_cfg,
            cli.seed.unwrap_or(0),
            None,
            Some(trace_path.as_path()),
            &stats,
        )?;
        println!("replayed {} ok", trace_path.display());
        if cli.stats {
            println!("{}", stats.pretty());
        }
        return Ok(ExitCode::SUCCESS);
    }

    // An explicit seed with no run/time budget is one direct deterministic
    // run, the reproduction workflow.
    if cli.seed.is_some() && cli.max_runs.is_none() && cli.time.is_none() {
        let seed = cli.seed.unwrap_or_else(gen_seed);
        let stats = Statistics::new();
        run_session_direct(&session_cfg, seed, cli.api_trace.as_deref(), None, &stats)?;
        if let Some(path) = &cli.api_trace {
            println!("traced seed {seed} to {}", path.display());
        }
        if cli.stats {
            println!("{}", stats.pretty());
        }
        return Ok(ExitCode::SUCCESS);
    }

    // Continuous fuzzing: forked workers, one at a time.
    let mut orch = Orchestrator::new(session_cfg, config, std::env::current_exe()?)?;
    let summary = orch.fuzz(&FuzzOptions {
        seed: cli.seed,
        max_runs: cli.max_runs,
        time: cli.time.map(|t| t.0),
    })?;

    if cli.dd {
        if let Some((seed, trace)) = &summary.first_failing {
            tracing::info!(seed, trace = %trace.display(), "minimizing first failure");
            let opt = DdOptions {
                match_err: cli.dd_match_err.clone(),
                match_out: cli.dd_match_out.clone(),
                out_path: cli.dd_out.clone(),
            };
            let result = delta_debug(&mut orch, trace, &opt)?;
            println!(
                "minimized {} -> {} actions in {} trials: {}",
                result.original_actions,
                result.minimized_actions,
                result.trials,
                result.out_path.display()
            );
        }
    }

    // Flush the error summary before temp-state cleanup (orchestrator drop).
    println!(
        "{} run(s), {} failure(s)\n{}",
        summary.runs,
        summary.failures,
        orch.errors.summary()
    );
    if cli.stats {
        println!("{}", orch.stats.pretty());
    }
    drop(orch);
    Ok(ExitCode::SUCCESS)
}

fn resolve_session(cli: &Cli, config: &Config) -> anyhow::Result<SessionConfig> {
    let (solver, smt2_out) = if let Some(target) = &cli.smt2 {
        let out = if target == "-" {
            None
        } else {
            Some(PathBuf::from(target))
        };
        (SolverKind::Smt2, out)
    } else if cli.bitwuzla {
        (SolverKind::Bitwuzla, None)
    } else {
        (SolverKind::Sim, None)
    };

    let mut session_cfg = SessionConfig::new(solver);
    session_cfg.smt2_out = smt2_out;
    for theory in &cli.theories {
        session_cfg.theories.insert(*theory);
    }
    session_cfg.linear = cli.linear;
    session_cfg.no_uf = cli.no_uf;
    session_cfg.max_actions = cli.max_actions.unwrap_or(config.max_actions);
    if session_cfg.max_actions < 8 {
        return Err(GrackleError::Config(format!(
            "--max-actions {} is too small (minimum 8)",
            session_cfg.max_actions
        ))
        .into());
    }
    Ok(session_cfg)
}

/// One isolated run inside a spawned worker. Failures print to stderr for
/// the parent to capture and classify; the stats record lands next to the
/// trace.
fn worker_main(cli: &Cli, session_cfg: &SessionConfig) -> anyhow::Result<ExitCode> {
    let seed = cli.seed.unwrap_or_else(gen_seed);
    let stats = Statistics::new();
    let result = run_session_direct(
        session_cfg,
        seed,
        cli.api_trace.as_deref(),
        cli.untrace.as_deref(),
        &stats,
    );
    if let Some(path) = &cli.stats_out {
        if let Err(err) = stats.store(path) {
            tracing::warn!("failed to store stats record: {err}");
        }
    }
    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(err) => {
            eprintln!("grackle: {err}");
            Ok(ExitCode::from(EXIT_ERROR))
        }
    }
}

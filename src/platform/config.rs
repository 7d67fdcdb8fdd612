//! `grackle.toml` defaults plus the resolved per-session configuration.

use serde::{Deserialize, Serialize};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::{FsmConfig, SolverKind, Theory};

/// Durable defaults loadable from an optional TOML file; CLI flags override
/// every field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory for per-run scratch files (worker traces, captured
    /// streams, stats records).
    #[serde(default = "default_tmp_dir")]
    pub tmp_dir: PathBuf,

    /// Directory failing traces and reports are preserved under.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// Default per-session action budget.
    #[serde(default = "default_max_actions")]
    pub max_actions: u64,

    /// Default wall-clock budget for one forked run, milliseconds.
    #[serde(default = "default_run_time_ms")]
    pub run_time_ms: u64,
}

fn default_tmp_dir() -> PathBuf {
    PathBuf::from(".grackle").join("tmp")
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".grackle").join("out")
}

fn default_max_actions() -> u64 {
    100
}

fn default_run_time_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tmp_dir: default_tmp_dir(),
            out_dir: default_out_dir(),
            max_actions: default_max_actions(),
            run_time_ms: default_run_time_ms(),
        }
    }
}

impl Config {
    /// Missing configs are treated as "defaults"; unreadable ones are
    /// reported and ignored.
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }
}

/// Everything one session (in-process or worker) needs to run. Worker
/// processes receive this re-encoded as CLI flags.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub solver: SolverKind,
    pub smt2_out: Option<PathBuf>,
    pub theories: BTreeSet<Theory>,
    pub linear: bool,
    pub no_uf: bool,
    pub max_actions: u64,
}

impl SessionConfig {
    pub fn new(solver: SolverKind) -> Self {
        let mut theories = BTreeSet::new();
        theories.insert(Theory::Booleans);
        Self {
            solver,
            smt2_out: None,
            theories,
            linear: false,
            no_uf: false,
            max_actions: default_max_actions(),
        }
    }

    pub fn fsm_config(&self) -> FsmConfig {
        let mut cfg = FsmConfig::new(self.theories.clone());
        cfg.linear = self.linear;
        cfg.no_uf = self.no_uf;
        cfg.max_actions = self.max_actions;
        cfg
    }

    /// The flag form handed to a spawned worker process.
    pub fn to_worker_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        match self.solver {
            SolverKind::Sim => args.push("--sim".to_string()),
            SolverKind::Smt2 => {
                args.push("--smt2".to_string());
                args.push(
                    self.smt2_out
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
            SolverKind::Bitwuzla => args.push("--bitwuzla".to_string()),
        }
        for theory in &self.theories {
            if *theory == Theory::Booleans {
                continue;
            }
            args.push("--theory".to_string());
            args.push(theory.name().to_string());
        }
        if self.linear {
            args.push("--linear".to_string());
        }
        if self.no_uf {
            args.push("--no-uf".to_string());
        }
        args.push("--max-actions".to_string());
        args.push(self.max_actions.to_string());
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_defaults() {
        let cfg = Config::load_optional(Path::new("/nonexistent/grackle.toml"));
        assert_eq!(cfg.max_actions, 100);
        assert!(cfg.tmp_dir.ends_with("tmp"));
    }

    #[test]
    fn worker_args_round_trip_the_session_shape() {
        let mut cfg = SessionConfig::new(SolverKind::Sim);
        cfg.theories.insert(Theory::BitVectors);
        cfg.linear = true;
        cfg.max_actions = 64;
        let args = cfg.to_worker_args();
        assert!(args.contains(&"--sim".to_string()));
        assert!(args.contains(&"--theory".to_string()));
        assert!(args.contains(&"bv".to_string()));
        assert!(args.contains(&"--linear".to_string()));
        assert!(args.contains(&"64".to_string()));
        // The core theory is implicit, never a flag.
        assert!(!args.contains(&"bool".to_string()));
    }
}

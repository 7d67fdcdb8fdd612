//! Delta debugging: ddmin-style fixed-point reduction of a failing trace.
//!
//! Every trial replays a candidate through a forked worker, so a hang or a
//! fresh crash in a candidate cannot take down the debugger. The minimized
//! output file is only written after a candidate is confirmed to still
//! reproduce the original failure.

use std::path::{Path, PathBuf};

use crate::{
    default_min_trace_path, normalize_error, Action, GrackleError, GrackleResult, Orchestrator,
    RunOutcome, Trace,
};

#[derive(Debug, Clone, Default)]
pub struct DdOptions {
    /// Substring that must appear on the candidate's stderr.
    pub match_err: Option<String>,
    /// Substring that must appear on the candidate's stdout.
    pub match_out: Option<String>,
    pub out_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DdResult {
    pub out_path: PathBuf,
    pub original_actions: usize,
    pub minimized_actions: usize,
    pub trials: u64,
}

/// Shrinks `trace_path` while preserving the failure signature. Guarantees
/// local 1-minimality: no single action line of the result can be removed
/// without the oracle no longer failing.
pub fn delta_debug(
    orch: &mut Orchestrator,
    trace_path: &Path,
    opt: &DdOptions,
) -> GrackleResult<DdResult> {
    let trace = Trace::load(trace_path)?;
    let candidate_path = orch.tmp_path().join("dd-candidate.trace");

    // Reference run: the input must reproduce before reduction starts.
    trace.write(&candidate_path)?;
    let reference = orch.run_forked(trace.seed, Some(candidate_path.as_path()))?;
    if !reference.failed() {
        return Err(GrackleError::InvalidArgument(format!(
            "{} does not fail under replay; nothing to minimize",
            trace_path.display()
        )));
    }
    let reference_sig = normalize_error(reference.failure_text());
    tracing::info!(
        actions = trace.actions.len(),
        signature = %reference_sig.lines().next().unwrap_or(""),
        "delta debugging started"
    );

    let still_fails = |outcome: &RunOutcome| -> bool {
        if !outcome.failed() {
            return false;
        }
        if opt.match_err.is_some() || opt.match_out.is_some() {
            let err_ok = opt
                .match_err
                .as_ref()
                .is_none_or(|m| outcome.stderr.contains(m.as_str()));
            let out_ok = opt
                .match_out
                .as_ref()
                .is_none_or(|m| outcome.stdout.contains(m.as_str()));
            err_ok && out_ok
        } else {
            normalize_error(outcome.failure_text()) == reference_sig
        }
    };

    let out_path = opt
        .out_path
        .clone()
        .unwrap_or_else(|| default_min_trace_path(trace_path));
    let original_actions = trace.actions.len();
    let mut best: Vec<Action> = trace.actions.clone();
    let mut trials = 0u64;

    let mut chunk = (best.len().max(1) + 1) / 2;
    while chunk > 0 && best.len() > 1 {
        let mut improved = false;
        let mut i = 0usize;
        while i < best.len() {
            let end = (i + chunk).min(best.len());
            let mut candidate_actions = best.clone();
            candidate_actions.drain(i..end);
            if candidate_actions.is_empty() {
                i += chunk;
                continue;
            }
            let candidate = Trace {
                seed: trace.seed,
                actions: candidate_actions,
            };
            candidate.write(&candidate_path)?;
            trials += 1;
            let outcome = orch.run_forked(candidate.seed, Some(candidate_path.as_path()))?;
            if still_fails(&outcome) {
                best = candidate.actions;
                // Confirmed reduction: persist before trying further.
                Trace {
                    seed: trace.seed,
                    actions: best.clone(),
                }
                .write(&out_path)?;
                improved = true;
                continue;
            }
            i += chunk;
        }

        if !improved {
            if chunk == 1 {
                break;
            }
            chunk = (chunk + 1) / 2;
        }
    }

    // No reduction confirmed: the output is the (still reproducing) input.
    Trace {
        seed: trace.seed,
        actions: best.clone(),
    }
    .write(&out_path)?;

    tracing::info!(
        trials,
        from = original_actions,
        to = best.len(),
        out = %out_path.display(),
        "delta debugging finished"
    );
    Ok(DdResult {
        out_path,
        original_actions,
        minimized_actions: best.len(),
        trials,
    })
}

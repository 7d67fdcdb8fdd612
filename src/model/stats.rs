//! Session statistics: a fixed-layout record of lock-free counters.
//!
//! Each field has a single writer per run and is aggregated by addition, so
//! no lock is ever taken. Worker processes persist their record as JSON next
//! to their trace and the parent merges after wait; in-process sessions
//! write the parent's counters directly.

use serde::{Deserialize, Serialize};

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{GrackleResult, SatResult};

#[derive(Debug, Default)]
pub struct Statistics {
    runs: AtomicU64,
    runs_ok: AtomicU64,
    runs_error: AtomicU64,
    runs_crash: AtomicU64,
    runs_timeout: AtomicU64,
    actions: AtomicU64,
    sorts: AtomicU64,
    terms: AtomicU64,
    sat: AtomicU64,
    unsat: AtomicU64,
    unknown: AtomicU64,
}

/// The serialized form of [`Statistics`], zero-initialized like the live
/// record.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatsRecord {
    pub runs: u64,
    pub runs_ok: u64,
    pub runs_error: u64,
    pub runs_crash: u64,
    pub runs_timeout: u64,
    pub actions: u64,
    pub sorts: u64,
    pub terms: u64,
    pub sat: u64,
    pub unsat: u64,
    pub unknown: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bump_runs(&self) {
        self.runs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_runs_ok(&self) {
        self.runs_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_runs_error(&self) {
        self.runs_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_runs_crash(&self) {
        self.runs_crash.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_runs_timeout(&self) {
        self.runs_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_actions(&self) {
        self.actions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_sorts(&self) {
        self.sorts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_terms(&self) {
        self.terms.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bump_sat_result(&self, result: SatResult) {
        match result {
            SatResult::Sat => self.sat.fetch_add(1, Ordering::Relaxed),
            SatResult::Unsat => self.unsat.fetch_add(1, Ordering::Relaxed),
            SatResult::Unknown => self.unknown.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn snapshot(&self) -> StatsRecord {
        StatsRecord {
            runs: self.runs.load(Ordering::Relaxed),
            runs_ok: self.runs_ok.load(Ordering::Relaxed),
            runs_error: self.runs_error.load(Ordering::Relaxed),
            runs_crash: self.runs_crash.load(Ordering::Relaxed),
            runs_timeout: self.runs_timeout.load(Ordering::Relaxed),
            actions: self.actions.load(Ordering::Relaxed),
            sorts: self.sorts.load(Ordering::Relaxed),
            terms: self.terms.load(Ordering::Relaxed),
            sat: self.sat.load(Ordering::Relaxed),
            unsat: self.unsat.load(Ordering::Relaxed),
            unknown: self.unknown.load(Ordering::Relaxed),
        }
    }

    /// Field-wise addition of a child's record into this one.
    pub fn merge(&self, rec: &StatsRecord) {
        self.runs.fetch_add(rec.runs, Ordering::Relaxed);
        self.runs_ok.fetch_add(rec.runs_ok, Ordering::Relaxed);
        self.runs_error.fetch_add(rec.runs_error, Ordering::Relaxed);
        self.runs_crash.fetch_add(rec.runs_crash, Ordering::Relaxed);
        self.runs_timeout.fetch_add(rec.runs_timeout, Ordering::Relaxed);
        self.actions.fetch_add(rec.actions, Ordering::Relaxed);
        self.sorts.fetch_add(rec.sorts, Ordering::Relaxed);
        self.terms.fetch_add(rec.terms, Ordering::Relaxed);
        self.sat.fetch_add(rec.sat, Ordering::Relaxed);
        self.unsat.fetch_add(rec.unsat, Ordering::Relaxed);
        self.unknown.fetch_add(rec.unknown, Ordering::Relaxed);
    }

    pub fn store(&self, path: &Path) -> GrackleResult<()> {
        let bytes = serde_json::to_vec(&self.snapshot())?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> GrackleResult<StatsRecord> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn pretty(&self) -> String {
        let s = self.snapshot();
        format!(
            "runs: {} (ok={} error={} crash={} timeout={})\n\
             actions: {} (sorts={} terms={})\n\
             answers: sat={} unsat={} unknown={}",
            s.runs,
            s.runs_ok,
            s.runs_error,
            s.runs_crash,
            s.runs_timeout,
            s.actions,
            s.sorts,
            s.terms,
            s.sat,
            s.unsat,
            s.unknown
        )
    }
}

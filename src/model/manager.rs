//! Generic registry of every live sort and term a backend has created.
//!
//! The registry is handle-type-agnostic: it owns tables keyed by stable
//! integer ids and metadata (theory, sort kind, leaf-ness), while identity
//! and lifetime semantics for the backend's opaque handles go through the
//! [`Solver`] capability hooks (`mk_sort` fingerprints, `sorts_equal`,
//! `copy_*`/`release_*`). The FSM and the trace layer only ever see
//! [`SortId`]/[`TermId`].

use std::collections::{BTreeMap, HashMap};

use crate::{
    result_sort, GrackleError, GrackleResult, OpKind, RngSource, Solver, SortId, SortKind, TermId,
    Theory,
};

#[derive(Debug, Clone)]
pub struct SortInfo {
    pub kind: SortKind,
    pub theory: Theory,
    pub fingerprint: u64,
}

#[derive(Debug, Clone)]
pub struct TermInfo {
    pub sort: SortId,
    /// Variables and values are leaves; applications are composite.
    pub leaf: bool,
    /// True only for constant values, which the linear restriction needs to
    /// tell apart from variables.
    pub value: bool,
}

#[derive(Debug, Default)]
pub struct SolverManager {
    solver_set: bool,
    sorts: Vec<SortInfo>,
    terms: Vec<TermInfo>,
    /// Backend fingerprint -> candidate ids, for handle dedup.
    fingerprints: HashMap<u64, Vec<SortId>>,
    /// Canonical default sort per theory, lazily created by `ensure_sort`.
    canonical: BTreeMap<Theory, SortId>,
}

impl SolverManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds the single active solver instance. The previous instance's
    /// handles are invalid once replaced, so a second bind without an
    /// intervening `clear` is an invariant violation.
    pub fn set_solver(&mut self) -> GrackleResult<()> {
        if self.solver_set {
            return Err(GrackleError::Invariant(
                "solver instance replaced while terms/sorts are still tracked; clear() first"
                    .to_string(),
            ));
        }
        self.solver_set = true;
        Ok(())
    }

    pub fn has_solver(&self) -> bool {
        self.solver_set
    }

    pub fn n_sorts(&self) -> usize {
        self.sorts.len()
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn sort_info(&self, id: SortId) -> GrackleResult<&SortInfo> {
        self.sorts
            .get(id.0 as usize)
            .ok_or_else(|| GrackleError::Trace(format!("unknown sort {id}")))
    }

    pub fn term_info(&self, id: TermId) -> GrackleResult<&TermInfo> {
        self.terms
            .get(id.0 as usize)
            .ok_or_else(|| GrackleError::Trace(format!("unknown term {id}")))
    }

    /// Registers a sort created through the solver, deduplicating against
    /// already-tracked handles via the backend's fingerprint and equality.
    /// Two handles representing "the same" sort yield one id.
    pub fn add_sort(
        &mut self,
        solver: &mut dyn Solver,
        kind: SortKind,
    ) -> GrackleResult<SortId> {
        self.require_solver()?;
        let candidate = SortId(self.sorts.len() as u32);
        let fingerprint = solver.mk_sort(candidate, &kind)?;

        if let Some(ids) = self.fingerprints.get(&fingerprint) {
            for &id in ids {
                if solver.sorts_equal(id, candidate) {
                    if self.sorts[id.0 as usize].kind != kind {
                        return Err(GrackleError::Invariant(format!(
                            "sort {id} re-registered with conflicting metadata: {} vs {}",
                            self.sorts[id.0 as usize].kind, kind
                        )));
                    }
                    solver.release_sort(candidate);
                    return Ok(id);
                }
            }
        }

        solver.copy_sort(candidate);
        let theory = kind.theory();
        self.sorts.push(SortInfo {
            kind,
            theory,
            fingerprint,
        });
        self.fingerprints.entry(fingerprint).or_default().push(candidate);
        Ok(candidate)
    }

    /// Registers a fresh variable (leaf) of a tracked sort.
    pub fn add_var(
        &mut self,
        solver: &mut dyn Solver,
        sort: SortId,
        name: &str,
    ) -> GrackleResult<TermId> {
        self.require_solver()?;
        self.sort_info(sort)?;
        let candidate = TermId(self.terms.len() as u32);
        solver.mk_var(candidate, sort, name)?;
        solver.copy_term(candidate);
        self.terms.push(TermInfo {
            sort,
            leaf: true,
            value: false,
        });
        Ok(candidate)
    }

    /// Registers a constant value (leaf) of a tracked sort.
    pub fn add_value(
        &mut self,
        solver: &mut dyn Solver,
        sort: SortId,
        literal: &str,
    ) -> GrackleResult<TermId> {
        self.require_solver()?;
        self.sort_info(sort)?;
        let candidate = TermId(self.terms.len() as u32);
        solver.mk_value(candidate, sort, literal)?;
        solver.copy_term(candidate);
        self.terms.push(TermInfo {
            sort,
            leaf: true,
            value: true,
        });
        Ok(candidate)
    }

    /// Registers a composite term. Every constituent must already be
    /// tracked, the computed result sort must already be registered (the
    /// registry never creates sorts implicitly), and the backend's own sort
    /// answer is cross-checked against the computed one.
    pub fn add_op_term(
        &mut self,
        solver: &mut dyn Solver,
        op: OpKind,
        args: &[TermId],
    ) -> GrackleResult<TermId> {
        self.require_solver()?;
        let mut arg_kinds = Vec::with_capacity(args.len());
        for &arg in args {
            let info = self.term_info(arg)?;
            arg_kinds.push(self.sort_info(info.sort)?.kind.clone());
        }
        let kind = result_sort(op, &arg_kinds)?;
        let sort = self.find_sort(&kind).ok_or_else(|| {
            GrackleError::Trace(format!(
                "result sort {kind} of {op} application is not registered"
            ))
        })?;

        let candidate = TermId(self.terms.len() as u32);
        solver.mk_term(candidate, op, args)?;
        solver.copy_term(candidate);
        self.terms.push(TermInfo {
            sort,
            leaf: false,
            value: false,
        });

        let reported = solver.sort_of(candidate)?;
        if reported != sort && !solver.sorts_equal(reported, sort) {
            return Err(GrackleError::Invariant(format!(
                "backend reports sort {reported} for {candidate}, registry computed {sort}"
            )));
        }
        Ok(candidate)
    }

    /// Backend-consulted sort lookup for a tracked term. The answer must
    /// itself be a tracked sort.
    pub fn get_sort(&self, solver: &mut dyn Solver, term: TermId) -> GrackleResult<SortId> {
        self.term_info(term)?;
        let sort = solver.sort_of(term)?;
        self.sort_info(sort)?;
        Ok(sort)
    }

    /// Guarantees at least one sort of `theory` exists, lazily creating and
    /// caching the theory's canonical default sort.
    pub fn ensure_sort(
        &mut self,
        solver: &mut dyn Solver,
        theory: Theory,
    ) -> GrackleResult<SortId> {
        if let Some(&id) = self.canonical.get(&theory) {
            return Ok(id);
        }
        if let Some(id) = self.first_sort_of(theory) {
            self.canonical.insert(theory, id);
            return Ok(id);
        }
        let kind = default_sort_kind(theory)?;
        let id = self.add_sort(solver, kind)?;
        self.canonical.insert(theory, id);
        Ok(id)
    }

    pub fn find_sort(&self, kind: &SortKind) -> Option<SortId> {
        self.sorts
            .iter()
            .position(|s| s.kind == *kind)
            .map(|i| SortId(i as u32))
    }

    pub fn has_sort(&self, theory: Theory) -> bool {
        self.first_sort_of(theory).is_some()
    }

    pub fn has_term_of_sort(&self, sort: SortId) -> bool {
        self.terms.iter().any(|t| t.sort == sort)
    }

    pub fn has_term_of_theory(&self, theory: Theory) -> bool {
        self.terms
            .iter()
            .any(|t| self.sorts[t.sort.0 as usize].theory == theory)
    }

    pub fn pick_sort(&self, rng: &mut RngSource, theory: Theory) -> Option<SortId> {
        let ids: Vec<SortId> = self.sorts_of(theory);
        if ids.is_empty() {
            return None;
        }
        Some(ids[rng.pick_index(ids.len())])
    }

    pub fn pick_any_sort(&self, rng: &mut RngSource) -> Option<SortId> {
        if self.sorts.is_empty() {
            return None;
        }
        Some(SortId(rng.pick_index(self.sorts.len()) as u32))
    }

    pub fn pick_term_of_sort(&self, rng: &mut RngSource, sort: SortId) -> Option<TermId> {
        let ids: Vec<TermId> = self
            .terms
            .iter()
            .enumerate()
            .filter(|(_, t)| t.sort == sort)
            .map(|(i, _)| TermId(i as u32))
            .collect();
        if ids.is_empty() {
            return None;
        }
        Some(ids[rng.pick_index(ids.len())])
    }

    pub fn pick_any_term(&self, rng: &mut RngSource) -> Option<TermId> {
        if self.terms.is_empty() {
            return None;
        }
        Some(TermId(rng.pick_index(self.terms.len()) as u32))
    }

    /// Constant values only; used for the linear-arithmetic restriction.
    pub fn pick_value_term_of_sort(&self, rng: &mut RngSource, sort: SortId) -> Option<TermId> {
        let ids: Vec<TermId> = self
            .terms
            .iter()
            .enumerate()
            .filter(|(_, t)| t.sort == sort && t.value)
            .map(|(i, _)| TermId(i as u32))
            .collect();
        if ids.is_empty() {
            return None;
        }
        Some(ids[rng.pick_index(ids.len())])
    }

    fn sorts_of(&self, theory: Theory) -> Vec<SortId> {
        self.sorts
            .iter()
            .enumerate()
            .filter(|(_, s)| s.theory == theory)
            .map(|(i, _)| SortId(i as u32))
            .collect()
    }

    fn first_sort_of(&self, theory: Theory) -> Option<SortId> {
        self.sorts
            .iter()
            .position(|s| s.theory == theory)
            .map(|i| SortId(i as u32))
    }

    fn require_solver(&self) -> GrackleResult<()> {
        if !self.solver_set {
            return Err(GrackleError::Invariant(
                "no active solver instance".to_string(),
            ));
        }
        Ok(())
    }

    /// Releases all tracked terms/sorts/solver state; used between runs and
    /// before replacing the solver instance.
    pub fn clear(&mut self, solver: &mut dyn Solver) {
        solver.release_all();
        self.sorts.clear();
        self.terms.clear();
        self.fingerprints.clear();
        self.canonical.clear();
        self.solver_set = false;
    }
}

/// The canonical default sort created when an action needs a sort of a
/// theory that has none yet.
pub fn default_sort_kind(theory: Theory) -> GrackleResult<SortKind> {
    match theory {
        Theory::Booleans => Ok(SortKind::Bool),
        Theory::BitVectors => Ok(SortKind::BitVec(32)),
        Theory::Integers => Ok(SortKind::Int),
        Theory::Reals => Ok(SortKind::Real),
        Theory::Strings => Ok(SortKind::SmtString),
        Theory::Arrays => Ok(SortKind::Array(
            Box::new(SortKind::Bool),
            Box::new(SortKind::Bool),
        )),
        Theory::UninterpretedFunctions => Ok(SortKind::Uninterpreted("U0".to_string())),
        Theory::FloatingPoint | Theory::Quantifiers => Err(GrackleError::Solver(format!(
            "no default sort for theory {theory}"
        ))),
    }
}

//! The finite-state machine driving API generation: picks, weights, and
//! sequences solver actions subject to theory enablement and registry
//! preconditions, recording every action to the trace before it executes so
//! a crashing call is already on disk.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::{
    Action, GrackleResult, OpKind, RngSource, SatResult, Seed, Solver, SolverManager,
    SolverOptions, SortId, SortKind, Statistics, TermId, Theory, TraceWriter,
};

/// One live solver/registry pair. Exactly one per process drives a given
/// manager or trace; there is no concurrent mutation.
pub struct Session {
    pub solver: Box<dyn Solver>,
    pub mgr: SolverManager,
}

impl Session {
    pub fn new(solver: Box<dyn Solver>) -> Self {
        Self {
            solver,
            mgr: SolverManager::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FsmConfig {
    /// Enabled theories. `Booleans` is the core theory and is always
    /// present.
    pub theories: BTreeSet<Theory>,
    /// Restrict arithmetic multiplication to linear terms (one factor must
    /// be a constant value).
    pub linear: bool,
    /// Disable uninterpreted sorts and constants.
    pub no_uf: bool,
    /// Upper bound on recorded actions per session, closing actions
    /// included.
    pub max_actions: u64,
}

impl FsmConfig {
    pub fn new(theories: BTreeSet<Theory>) -> Self {
        let mut theories = theories;
        theories.insert(Theory::Booleans);
        Self {
            theories,
            linear: false,
            no_uf: false,
            max_actions: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    Opt,
    Sorts,
    Inputs,
    Terms,
    Assert,
    Check,
    Model,
}

impl FsmState {
    fn name(self) -> &'static str {
        match self {
            FsmState::Opt => "opt",
            FsmState::Sorts => "sorts",
            FsmState::Inputs => "inputs",
            FsmState::Terms => "terms",
            FsmState::Assert => "assert",
            FsmState::Check => "check",
            FsmState::Model => "model",
        }
    }
}

/// Weighted transition table. `new` and `delete` bracket every session and
/// are not part of the random walk.
const TRANSITIONS: &[(FsmState, &[(FsmState, u32)])] = &[
    (FsmState::Opt, &[(FsmState::Opt, 1), (FsmState::Sorts, 4), (FsmState::Inputs, 3)]),
    (FsmState::Sorts, &[(FsmState::Sorts, 3), (FsmState::Inputs, 6), (FsmState::Opt, 1)]),
    (
        FsmState::Inputs,
        &[(FsmState::Inputs, 4), (FsmState::Terms, 6), (FsmState::Sorts, 2), (FsmState::Check, 1)],
    ),
    (
        FsmState::Terms,
        &[(FsmState::Terms, 6), (FsmState::Inputs, 2), (FsmState::Assert, 4), (FsmState::Check, 1)],
    ),
    (FsmState::Assert, &[(FsmState::Assert, 3), (FsmState::Terms, 2), (FsmState::Check, 3)]),
    (
        FsmState::Check,
        &[(FsmState::Model, 2), (FsmState::Terms, 3), (FsmState::Assert, 2), (FsmState::Sorts, 1)],
    ),
    (
        FsmState::Model,
        &[(FsmState::Model, 1), (FsmState::Terms, 3), (FsmState::Assert, 2), (FsmState::Check, 1)],
    ),
];

enum StepOutcome {
    Executed,
    /// The state had no legal action for the current registry/option state.
    NothingLegal,
}

pub struct Fsm<'a> {
    cfg: &'a FsmConfig,
    rng: RngSource,
    session: Session,
    writer: Option<TraceWriter>,
    stats: &'a Statistics,
    options: SolverOptions,
    active_options: BTreeMap<String, String>,
    recorded: Vec<Action>,
    last_check: Option<SatResult>,
    var_counter: u32,
    usort_counter: u32,
}

impl<'a> Fsm<'a> {
    pub fn new(
        cfg: &'a FsmConfig,
        seed: Seed,
        solver: Box<dyn Solver>,
        writer: Option<TraceWriter>,
        stats: &'a Statistics,
    ) -> Self {
        let options = solver.options();
        Self {
            cfg,
            rng: RngSource::new(seed),
            session: Session::new(solver),
            writer,
            stats,
            options,
            active_options: BTreeMap::new(),
            recorded: Vec::new(),
            last_check: None,
            var_counter: 0,
            usort_counter: 0,
        }
    }

    /// Actions recorded so far, in issuance order.
    pub fn recorded(&self) -> &[Action] {
        &self.recorded
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Drives one full session: `new`, a weighted random walk over the
    /// generative states, then `delete`. A solver failure propagates after
    /// its action has been recorded.
    pub fn run(&mut self, deadline: Option<Instant>) -> GrackleResult<()> {
        self.exec_new()?;
        let mut state = FsmState::Sorts;
        // Reserve room for a worst-case two-action step plus the closing
        // delete.
        while self.recorded.len() as u64 + 3 <= self.cfg.max_actions {
            if let Some(dl) = deadline {
                if Instant::now() >= dl {
                    break;
                }
            }
            let outcome = self.exec_state(state)?;
            state = match outcome {
                StepOutcome::Executed => self.pick_next(state),
                // Fall through to the satisfiability check rather than
                // failing on an empty legal set.
                StepOutcome::NothingLegal => FsmState::Check,
            };
        }
        self.exec_delete()
    }

    fn pick_next(&mut self, state: FsmState) -> FsmState {
        let row = TRANSITIONS
            .iter()
            .find(|(s, _)| *s == state)
            .map(|(_, row)| *row)
            .unwrap_or(&[(FsmState::Check, 1)]);
        let weights: Vec<u32> = row.iter().map(|(_, w)| *w).collect();
        row[self.rng.pick_weighted(&weights)].0
    }

    fn record(&mut self, action: Action) -> GrackleResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.append(&action)?;
        }
        self.recorded.push(action);
        self.stats.bump_actions();
        Ok(())
    }

    fn exec_new(&mut self) -> GrackleResult<()> {
        self.record(Action::New)?;
        self.session.solver.new_instance()?;
        self.session.mgr.set_solver()
    }

    fn exec_delete(&mut self) -> GrackleResult<()> {
        self.record(Action::Delete)?;
        self.session.solver.delete_instance()?;
        self.session.mgr.clear(self.session.solver.as_mut());
        Ok(())
    }

    fn exec_state(&mut self, state: FsmState) -> GrackleResult<StepOutcome> {
        match state {
            FsmState::Opt => self.exec_opt(),
            FsmState::Sorts => self.exec_sorts(),
            FsmState::Inputs => self.exec_inputs(),
            FsmState::Terms => self.exec_terms(),
            FsmState::Assert => self.exec_assert(),
            FsmState::Check => self.exec_check().map(|()| StepOutcome::Executed),
            FsmState::Model => self.exec_model(),
        }
    }

    /// Activates one option whose dependencies are all active and whose
    /// conflicts are not; the value itself is drawn from the option's
    /// domain.
    fn exec_opt(&mut self) -> GrackleResult<StepOutcome> {
        let active: BTreeSet<String> = self.active_options.keys().cloned().collect();
        let Some(opt) = self.options.pick_legal(&mut self.rng, &active) else {
            return Ok(StepOutcome::NothingLegal);
        };
        let name = opt.get_name().to_string();
        let value = opt.pick_value(&mut self.rng);
        self.record(Action::SetOption {
            name: name.clone(),
            value: value.clone(),
        })?;
        self.session.solver.set_option(&name, &value)?;
        self.active_options.insert(name, value);
        Ok(StepOutcome::Executed)
    }

    fn sort_theories(&self) -> Vec<Theory> {
        self.cfg
            .theories
            .iter()
            .copied()
            .filter(|t| match t {
                Theory::Booleans
                | Theory::BitVectors
                | Theory::Integers
                | Theory::Reals
                | Theory::Strings => true,
                Theory::Arrays => self.session.mgr.n_sorts() > 0,
                Theory::UninterpretedFunctions => !self.cfg.no_uf,
                Theory::FloatingPoint | Theory::Quantifiers => false,
            })
            .collect()
    }

    fn exec_sorts(&mut self) -> GrackleResult<StepOutcome> {
        let theories = self.sort_theories();
        if theories.is_empty() {
            return Ok(StepOutcome::NothingLegal);
        }
        let theory = *self.rng.choose(&theories);
        let kind = match theory {
            Theory::Booleans => SortKind::Bool,
            Theory::BitVectors => SortKind::BitVec(self.rng.pick_u32(64) + 1),
            Theory::Integers => SortKind::Int,
            Theory::Reals => SortKind::Real,
            Theory::Strings => SortKind::SmtString,
            Theory::Arrays => {
                let (Some(dom), Some(cod)) = (
                    self.session.mgr.pick_any_sort(&mut self.rng),
                    self.session.mgr.pick_any_sort(&mut self.rng),
                ) else {
                    return Ok(StepOutcome::NothingLegal);
                };
                SortKind::Array(
                    Box::new(self.session.mgr.sort_info(dom)?.kind.clone()),
                    Box::new(self.session.mgr.sort_info(cod)?.kind.clone()),
                )
            }
            Theory::UninterpretedFunctions => {
                let name = format!("U{}", self.usort_counter);
                self.usort_counter += 1;
                SortKind::Uninterpreted(name)
            }
            Theory::FloatingPoint | Theory::Quantifiers => unreachable!("filtered above"),
        };
        self.create_sort(kind)?;
        Ok(StepOutcome::Executed)
    }

    /// Records and executes one sort creation.
    fn create_sort(&mut self, kind: SortKind) -> GrackleResult<SortId> {
        let candidate = SortId(self.session.mgr.n_sorts() as u32);
        self.record(Action::MkSort {
            id: candidate,
            kind: kind.clone(),
        })?;
        let id = self
            .session
            .mgr
            .add_sort(self.session.solver.as_mut(), kind)?;
        self.stats.bump_sorts();
        Ok(id)
    }

    /// Guarantees a sort of `theory` exists, tracing the canonical-default
    /// creation if one is needed.
    fn ensure_sort_traced(&mut self, theory: Theory) -> GrackleResult<SortId> {
        if self.session.mgr.has_sort(theory) {
            return self
                .session
                .mgr
                .ensure_sort(self.session.solver.as_mut(), theory);
        }
        let kind = crate::default_sort_kind(theory)?;
        self.create_sort(kind)
    }

    fn exec_inputs(&mut self) -> GrackleResult<StepOutcome> {
        let theories = self.sort_theories();
        if theories.is_empty() {
            return Ok(StepOutcome::NothingLegal);
        }
        let theory = *self.rng.choose(&theories);
        if theory == Theory::Arrays && !self.session.mgr.has_sort(Theory::Arrays) {
            // No array sort yet; creating the canonical one needs element
            // sorts, which exec_sorts handles.
            return Ok(StepOutcome::NothingLegal);
        }
        let ensured = self.ensure_sort_traced(theory)?;
        let sort = self
            .session
            .mgr
            .pick_sort(&mut self.rng, theory)
            .unwrap_or(ensured);
        let kind = self.session.mgr.sort_info(sort)?.kind.clone();

        let as_value = matches!(
            kind,
            SortKind::Bool | SortKind::BitVec(_) | SortKind::Int | SortKind::Real | SortKind::SmtString
        ) && self.rng.flip_coin();

        let candidate = TermId(self.session.mgr.n_terms() as u32);
        if as_value {
            let literal = self.pick_literal(&kind);
            self.record(Action::MkValue {
                id: candidate,
                sort,
                value: literal.clone(),
            })?;
            self.session
                .mgr
                .add_value(self.session.solver.as_mut(), sort, &literal)?;
        } else {
            let name = format!("x{}", self.var_counter);
            self.var_counter += 1;
            self.record(Action::MkVar {
                id: candidate,
                sort,
                name: name.clone(),
            })?;
            self.session
                .mgr
                .add_var(self.session.solver.as_mut(), sort, &name)?;
        }
        self.stats.bump_terms();
        Ok(StepOutcome::Executed)
    }

    fn pick_literal(&mut self, kind: &SortKind) -> String {
        match kind {
            SortKind::Bool => if self.rng.flip_coin() { "true" } else { "false" }.to_string(),
            SortKind::BitVec(w) => {
                let mut bits = String::with_capacity(*w as usize + 2);
                bits.push_str("#b");
                for _ in 0..*w {
                    bits.push(if self.rng.flip_coin() { '1' } else { '0' });
                }
                bits
            }
            SortKind::Int => self.rng.pick_int32(-1_000_000, 1_000_000).to_string(),
            SortKind::Real => {
                format!(
                    "{}.{}",
                    self.rng.pick_int32(-1000, 1000),
                    self.rng.pick_u32(1000)
                )
            }
            SortKind::SmtString => {
                const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                let len = self.rng.pick_u32(8);
                let mut s = String::from("\"");
                for _ in 0..len {
                    s.push(CHARS[self.rng.pick_index(CHARS.len())] as char);
                }
                s.push('"');
                s
            }
            SortKind::Array(..) | SortKind::Uninterpreted(_) => "_".to_string(),
        }
    }

    fn exec_terms(&mut self) -> GrackleResult<StepOutcome> {
        let mut candidates: Vec<OpKind> = OpKind::all()
            .iter()
            .copied()
            .filter(|op| self.op_feasible(*op))
            .collect();
        while !candidates.is_empty() {
            let idx = self.rng.pick_index(candidates.len());
            let op = candidates[idx];
            match self.build_args(op) {
                Some(args) => {
                    // Composite results can live in a sort the registry has
                    // not seen yet (e.g. a concat width); trace its creation
                    // explicitly so replay never creates sorts implicitly.
                    let mut arg_kinds = Vec::with_capacity(args.len());
                    for a in &args {
                        let s = self.session.mgr.term_info(*a)?.sort;
                        arg_kinds.push(self.session.mgr.sort_info(s)?.kind.clone());
                    }
                    let result = crate::result_sort(op, &arg_kinds)?;
                    if self.session.mgr.find_sort(&result).is_none() {
                        self.create_sort(result)?;
                    }

                    let candidate = TermId(self.session.mgr.n_terms() as u32);
                    self.record(Action::MkTerm {
                        id: candidate,
                        op,
                        args: args.clone(),
                    })?;
                    self.session
                        .mgr
                        .add_op_term(self.session.solver.as_mut(), op, &args)?;
                    self.stats.bump_terms();
                    return Ok(StepOutcome::Executed);
                }
                None => {
                    candidates.swap_remove(idx);
                }
            }
        }
        Ok(StepOutcome::NothingLegal)
    }

    /// Cheap feasibility filter; `build_args` does the precise check.
    fn op_feasible(&self, op: OpKind) -> bool {
        use OpKind::*;
        let mgr = &self.session.mgr;
        let enabled = |t: Theory| self.cfg.theories.contains(&t);
        match op {
            Not | And | Or | Xor | Implies => mgr.has_term_of_theory(Theory::Booleans),
            Eq | Distinct => mgr.n_terms() > 0,
            Ite => mgr.has_term_of_theory(Theory::Booleans),
            BvNot | BvNeg | BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem
            | BvShl | BvLshr | BvConcat | BvUlt => {
                enabled(Theory::BitVectors) && mgr.has_term_of_theory(Theory::BitVectors)
            }
            Neg | Add | Sub | Mul | Lt | Leq | Gt | Geq => {
                (enabled(Theory::Integers) && mgr.has_term_of_theory(Theory::Integers))
                    || (enabled(Theory::Reals) && mgr.has_term_of_theory(Theory::Reals))
            }
            Select | Store => {
                enabled(Theory::Arrays) && mgr.has_term_of_theory(Theory::Arrays)
            }
            StrConcat | StrContains => {
                enabled(Theory::Strings) && mgr.has_term_of_theory(Theory::Strings)
            }
            StrLen => {
                enabled(Theory::Strings)
                    && enabled(Theory::Integers)
                    && mgr.has_term_of_theory(Theory::Strings)
            }
        }
    }

    fn pick_termful_sort(&mut self, theory: Theory) -> Option<SortId> {
        let mgr = &self.session.mgr;
        let sorts: Vec<SortId> = (0..mgr.n_sorts() as u32)
            .map(SortId)
            .filter(|s| {
                mgr.sort_info(*s).map(|i| i.theory == theory).unwrap_or(false)
                    && mgr.has_term_of_sort(*s)
            })
            .collect();
        if sorts.is_empty() {
            return None;
        }
        Some(sorts[self.rng.pick_index(sorts.len())])
    }

    fn pick_any_termful_sort(&mut self) -> Option<SortId> {
        let mgr = &self.session.mgr;
        let sorts: Vec<SortId> = (0..mgr.n_sorts() as u32)
            .map(SortId)
            .filter(|s| mgr.has_term_of_sort(*s))
            .collect();
        if sorts.is_empty() {
            return None;
        }
        Some(sorts[self.rng.pick_index(sorts.len())])
    }

    fn pick_arith_sort(&mut self) -> Option<SortId> {
        let mut pools = Vec::new();
        if self.cfg.theories.contains(&Theory::Integers) {
            if let Some(s) = self.pick_termful_sort(Theory::Integers) {
                pools.push(s);
            }
        }
        if self.cfg.theories.contains(&Theory::Reals) {
            if let Some(s) = self.pick_termful_sort(Theory::Reals) {
                pools.push(s);
            }
        }
        if pools.is_empty() {
            return None;
        }
        Some(pools[self.rng.pick_index(pools.len())])
    }

    fn build_args(&mut self, op: OpKind) -> Option<Vec<TermId>> {
        use OpKind::*;
        let bool_sort = |fsm: &mut Self| fsm.pick_termful_sort(Theory::Booleans);
        match op {
            Not => {
                let s = bool_sort(self)?;
                let t = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![t])
            }
            And | Or | Xor | Implies => {
                let s = bool_sort(self)?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![a, b])
            }
            Eq | Distinct => {
                let s = self.pick_any_termful_sort()?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![a, b])
            }
            Ite => {
                let c_sort = bool_sort(self)?;
                let cond = self.session.mgr.pick_term_of_sort(&mut self.rng, c_sort)?;
                let s = self.pick_any_termful_sort()?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![cond, a, b])
            }
            BvNot | BvNeg => {
                let s = self.pick_termful_sort(Theory::BitVectors)?;
                let t = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![t])
            }
            BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvShl | BvLshr
            | BvUlt => {
                let s = self.pick_termful_sort(Theory::BitVectors)?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![a, b])
            }
            BvConcat => {
                let sa = self.pick_termful_sort(Theory::BitVectors)?;
                let sb = self.pick_termful_sort(Theory::BitVectors)?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, sa)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, sb)?;
                Some(vec![a, b])
            }
            Neg => {
                let s = self.pick_arith_sort()?;
                let t = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![t])
            }
            Add | Sub | Lt | Leq | Gt | Geq => {
                let s = self.pick_arith_sort()?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![a, b])
            }
            Mul => {
                let s = self.pick_arith_sort()?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                if self.cfg.linear {
                    // Linear restriction: one factor must be a constant.
                    let c = self.session.mgr.pick_value_term_of_sort(&mut self.rng, s)?;
                    Some(vec![a, c])
                } else {
                    let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                    Some(vec![a, b])
                }
            }
            Select => {
                let arr_sort = self.pick_termful_sort(Theory::Arrays)?;
                let SortKind::Array(dom, _) = self.session.mgr.sort_info(arr_sort).ok()?.kind.clone()
                else {
                    return None;
                };
                let dom_sort = self.session.mgr.find_sort(&dom)?;
                let arr = self.session.mgr.pick_term_of_sort(&mut self.rng, arr_sort)?;
                let idx = self.session.mgr.pick_term_of_sort(&mut self.rng, dom_sort)?;
                Some(vec![arr, idx])
            }
            Store => {
                let arr_sort = self.pick_termful_sort(Theory::Arrays)?;
                let SortKind::Array(dom, cod) =
                    self.session.mgr.sort_info(arr_sort).ok()?.kind.clone()
                else {
                    return None;
                };
                let dom_sort = self.session.mgr.find_sort(&dom)?;
                let cod_sort = self.session.mgr.find_sort(&cod)?;
                let arr = self.session.mgr.pick_term_of_sort(&mut self.rng, arr_sort)?;
                let idx = self.session.mgr.pick_term_of_sort(&mut self.rng, dom_sort)?;
                let val = self.session.mgr.pick_term_of_sort(&mut self.rng, cod_sort)?;
                Some(vec![arr, idx, val])
            }
            StrConcat | StrContains => {
                let s = self.pick_termful_sort(Theory::Strings)?;
                let a = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                let b = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![a, b])
            }
            StrLen => {
                let s = self.pick_termful_sort(Theory::Strings)?;
                let t = self.session.mgr.pick_term_of_sort(&mut self.rng, s)?;
                Some(vec![t])
            }
        }
    }

    fn exec_assert(&mut self) -> GrackleResult<StepOutcome> {
        let Some(s) = self.pick_termful_sort(Theory::Booleans) else {
            return Ok(StepOutcome::NothingLegal);
        };
        let Some(t) = self.session.mgr.pick_term_of_sort(&mut self.rng, s) else {
            return Ok(StepOutcome::NothingLegal);
        };
        self.record(Action::Assert { term: t })?;
        self.session.solver.assert_term(t)?;
        Ok(StepOutcome::Executed)
    }

    fn exec_check(&mut self) -> GrackleResult<()> {
        self.record(Action::CheckSat)?;
        let result = self.session.solver.check_sat()?;
        self.stats.bump_sat_result(result);
        self.last_check = Some(result);
        Ok(())
    }

    fn exec_model(&mut self) -> GrackleResult<StepOutcome> {
        let models_on = self
            .active_options
            .get("produce-models")
            .is_some_and(|v| v == "true");
        if self.last_check != Some(SatResult::Sat) || !models_on {
            return Ok(StepOutcome::NothingLegal);
        }
        let Some(t) = self.session.mgr.pick_any_term(&mut self.rng) else {
            return Ok(StepOutcome::NothingLegal);
        };
        self.record(Action::GetValue { term: t })?;
        self.session.solver.get_value(t)?;
        Ok(StepOutcome::Executed)
    }
}

/// Dumps the state/transition/weight configuration to stdout (`--print-fsm`).
pub fn render_fsm_table() -> String {
    let mut out = String::from("states and weighted transitions:\n");
    for (state, row) in TRANSITIONS {
        out.push_str(&format!("  {:<8}->", state.name()));
        for (next, weight) in row.iter() {
            out.push_str(&format!(" {}:{}", next.name(), weight));
        }
        out.push('\n');
    }
    out.push_str("  new/delete bracket every session\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SimSolver, Statistics};

    fn bv_config(max_actions: u64) -> FsmConfig {
        let mut theories = BTreeSet::new();
        theories.insert(Theory::BitVectors);
        let mut cfg = FsmConfig::new(theories);
        cfg.max_actions = max_actions;
        cfg
    }

    fn run_session(cfg: &FsmConfig, seed: Seed) -> Vec<Action> {
        let stats = Statistics::new();
        let mut fsm = Fsm::new(cfg, seed, Box::new(SimSolver::new()), None, &stats);
        fsm.run(None).expect("session runs");
        fsm.recorded().to_vec()
    }

    #[test]
    fn identical_seeds_produce_identical_action_sequences() {
        let cfg = bv_config(80);
        assert_eq!(run_session(&cfg, 42), run_session(&cfg, 42));
    }

    #[test]
    fn different_seeds_produce_different_sequences() {
        let cfg = bv_config(80);
        assert_ne!(run_session(&cfg, 1), run_session(&cfg, 2));
    }

    #[test]
    fn session_respects_the_action_budget() {
        let cfg = bv_config(50);
        for seed in [7u32, 42, 1234] {
            let actions = run_session(&cfg, seed);
            assert!(actions.len() as u64 <= 50, "{} actions", actions.len());
            assert_eq!(actions.first(), Some(&Action::New));
            assert_eq!(actions.last(), Some(&Action::Delete));
        }
    }

    #[test]
    fn bv_only_sessions_stay_in_core_and_bv() {
        let cfg = bv_config(120);
        let actions = run_session(&cfg, 42);
        for action in &actions {
            if let Action::MkSort { kind, .. } = action {
                assert!(
                    matches!(kind, SortKind::Bool | SortKind::BitVec(_)),
                    "unexpected sort {kind} in bv-only session"
                );
            }
            if let Action::MkTerm { op, .. } = action {
                assert!(
                    matches!(op.theory(), Theory::Booleans | Theory::BitVectors),
                    "unexpected op {op} in bv-only session"
                );
            }
        }
    }

    #[test]
    fn option_activations_respect_dependencies_and_conflicts() {
        let cfg = bv_config(200);
        for seed in 0u32..10 {
            let actions = run_session(&cfg, seed);
            let table = SimSolver::new().options();
            let mut active: BTreeSet<String> = BTreeSet::new();
            for action in &actions {
                if let Action::SetOption { name, .. } = action {
                    if let Some(opt) = table.get(name) {
                        assert!(
                            crate::SolverOptions::is_legal(opt, &active),
                            "option {name} activated illegally (active: {active:?})"
                        );
                    }
                    active.insert(name.clone());
                }
            }
        }
    }

    #[test]
    fn fsm_table_renders() {
        let table = render_fsm_table();
        assert!(table.contains("check"));
        assert!(table.contains("sorts"));
    }
}

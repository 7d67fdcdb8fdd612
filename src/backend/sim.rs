//! Scripted in-process reference backend.
//!
//! Tracks sorts and terms in memory, type-checks every application, and
//! answers check-sat deterministically from a hash of the asserted set, so
//! generated sessions and their replays observe identical behavior without
//! linking a real solver. The `sim-fail-on-check` option arms a
//! deterministic internal failure used to exercise the error-capture and
//! delta-debugging paths.

use std::collections::BTreeMap;

use crate::{
    result_sort, GrackleError, GrackleResult, OpKind, SatResult, Solver, SolverOption,
    SolverOptions, SortId, SortKind, TermId,
};

pub const SIM_FAIL_OPTION: &str = "sim-fail-on-check";

#[derive(Debug, Clone)]
enum SimRepr {
    Var(String),
    Value(String),
    App(OpKind, Vec<TermId>),
}

#[derive(Debug, Clone)]
struct SimTerm {
    sort: SortId,
    repr: SimRepr,
}

#[derive(Debug, Default)]
pub struct SimSolver {
    instance: bool,
    sorts: BTreeMap<u32, SortKind>,
    terms: BTreeMap<u32, SimTerm>,
    asserted: Vec<TermId>,
    options: BTreeMap<String, String>,
    fail_on_check: bool,
    model_ready: bool,
}

impl SimSolver {
    pub fn new() -> Self {
        Self::default()
    }

    fn sort_kind(&self, id: SortId) -> GrackleResult<&SortKind> {
        self.sorts
            .get(&id.0)
            .ok_or_else(|| GrackleError::Solver(format!("sim: unbound sort {id}")))
    }

    fn term(&self, id: TermId) -> GrackleResult<&SimTerm> {
        self.terms
            .get(&id.0)
            .ok_or_else(|| GrackleError::Solver(format!("sim: unbound term {id}")))
    }

    fn require_instance(&self) -> GrackleResult<()> {
        if !self.instance {
            return Err(GrackleError::Solver("sim: no active instance".to_string()));
        }
        Ok(())
    }

    /// Structural render of a term, the input to the deterministic
    /// check-sat answer.
    fn render_term(&self, id: TermId) -> String {
        match self.terms.get(&id.0).map(|t| &t.repr) {
            Some(SimRepr::Var(name)) => name.clone(),
            Some(SimRepr::Value(v)) => v.clone(),
            Some(SimRepr::App(op, args)) => {
                let rendered: Vec<String> = args.iter().map(|a| self.render_term(*a)).collect();
                format!("({} {})", op, rendered.join(" "))
            }
            None => format!("<{id}>"),
        }
    }

    fn default_value(kind: &SortKind) -> String {
        match kind {
            SortKind::Bool => "false".to_string(),
            SortKind::BitVec(w) => format!("#b{}", "0".repeat(*w as usize)),
            SortKind::Int => "0".to_string(),
            SortKind::Real => "0.0".to_string(),
            SortKind::SmtString => "\"\"".to_string(),
            SortKind::Array(..) | SortKind::Uninterpreted(_) => "_".to_string(),
        }
    }
}

fn literal_fits(kind: &SortKind, literal: &str) -> bool {
    match kind {
        SortKind::Bool => literal == "true" || literal == "false",
        SortKind::BitVec(w) => literal
            .strip_prefix("#b")
            .is_some_and(|bits| bits.len() == *w as usize && bits.bytes().all(|b| b == b'0' || b == b'1')),
        SortKind::Int => literal.parse::<i64>().is_ok(),
        SortKind::Real => literal.parse::<f64>().is_ok(),
        SortKind::SmtString => literal.starts_with('"') && literal.ends_with('"') && literal.len() >= 2,
        SortKind::Array(..) | SortKind::Uninterpreted(_) => false,
    }
}

fn fingerprint(kind: &SortKind) -> u64 {
    let digest = blake3::hash(kind.render().as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}

impl Solver for SimSolver {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn new_instance(&mut self) -> GrackleResult<()> {
        if self.instance {
            return Err(GrackleError::Solver(
                "sim: instance already exists".to_string(),
            ));
        }
        self.instance = true;
        Ok(())
    }

    fn delete_instance(&mut self) -> GrackleResult<()> {
        self.require_instance()?;
        self.instance = false;
        self.asserted.clear();
        self.model_ready = false;
        Ok(())
    }

    fn options(&self) -> SolverOptions {
        // sim-fail-on-check is deliberately absent: directed options are
        // set via traces, never drawn by the FSM.
        SolverOptions::new(vec![
            SolverOption::bool("produce-models"),
            SolverOption::list("model-format", ["full", "partial"])
                .with_depends(&["produce-models"]),
            SolverOption::bool("eager-bitblast").with_conflicts(&["lazy-bitblast"]),
            SolverOption::bool("lazy-bitblast").with_conflicts(&["eager-bitblast"]),
            SolverOption::int("rewrite-level", 0, 3),
        ])
    }

    fn set_option(&mut self, name: &str, value: &str) -> GrackleResult<()> {
        self.require_instance()?;
        if name == SIM_FAIL_OPTION {
            self.fail_on_check = value == "true";
        }
        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn mk_sort(&mut self, id: SortId, kind: &SortKind) -> GrackleResult<u64> {
        self.require_instance()?;
        self.sorts.insert(id.0, kind.clone());
        Ok(fingerprint(kind))
    }

    fn sorts_equal(&mut self, a: SortId, b: SortId) -> bool {
        match (self.sorts.get(&a.0), self.sorts.get(&b.0)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn copy_sort(&mut self, _id: SortId) {
        // Not refcounted; handles stay valid until released.
    }

    fn release_sort(&mut self, id: SortId) {
        self.sorts.remove(&id.0);
    }

    fn mk_var(&mut self, id: TermId, sort: SortId, name: &str) -> GrackleResult<()> {
        self.require_instance()?;
        self.sort_kind(sort)?;
        self.terms.insert(
            id.0,
            SimTerm {
                sort,
                repr: SimRepr::Var(name.to_string()),
            },
        );
        Ok(())
    }

    fn mk_value(&mut self, id: TermId, sort: SortId, value: &str) -> GrackleResult<()> {
        self.require_instance()?;
        let kind = self.sort_kind(sort)?;
        if !literal_fits(kind, value) {
            return Err(GrackleError::Solver(format!(
                "sim: literal {value:?} does not fit sort {kind}"
            )));
        }
        self.terms.insert(
            id.0,
            SimTerm {
                sort,
                repr: SimRepr::Value(value.to_string()),
            },
        );
        Ok(())
    }

    fn mk_term(&mut self, id: TermId, op: OpKind, args: &[TermId]) -> GrackleResult<()> {
        self.require_instance()?;
        let mut kinds = Vec::with_capacity(args.len());
        for arg in args {
            let t = self.term(*arg)?;
            kinds.push(self.sort_kind(t.sort)?.clone());
        }
        let result = result_sort(op, &kinds)?;
        let sort = self
            .sorts
            .iter()
            .find(|(_, k)| **k == result)
            .map(|(i, _)| SortId(*i))
            .ok_or_else(|| {
                GrackleError::Solver(format!("sim: result sort {result} was never declared"))
            })?;
        self.terms.insert(
            id.0,
            SimTerm {
                sort,
                repr: SimRepr::App(op, args.to_vec()),
            },
        );
        Ok(())
    }

    fn copy_term(&mut self, _id: TermId) {}

    fn sort_of(&mut self, term: TermId) -> GrackleResult<SortId> {
        Ok(self.term(term)?.sort)
    }

    fn assert_term(&mut self, term: TermId) -> GrackleResult<()> {
        self.require_instance()?;
        let t = self.term(term)?;
        if *self.sort_kind(t.sort)? != SortKind::Bool {
            return Err(GrackleError::Solver(format!(
                "sim: asserted term {term} is not boolean"
            )));
        }
        self.asserted.push(term);
        Ok(())
    }

    fn check_sat(&mut self) -> GrackleResult<SatResult> {
        self.require_instance()?;
        if self.fail_on_check && !self.asserted.is_empty() {
            return Err(GrackleError::Solver(
                "assertion failure: internal check on asserted formula set failed".to_string(),
            ));
        }
        let mut hasher = blake3::Hasher::new();
        for t in &self.asserted {
            hasher.update(self.render_term(*t).as_bytes());
            hasher.update(b"\n");
        }
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hasher.finalize().as_bytes()[..8]);
        let roll = u64::from_le_bytes(bytes) % 4;
        let result = match roll {
            0 | 1 => SatResult::Sat,
            2 => SatResult::Unsat,
            _ => SatResult::Unknown,
        };
        self.model_ready = result == SatResult::Sat;
        Ok(result)
    }

    fn get_value(&mut self, term: TermId) -> GrackleResult<String> {
        self.require_instance()?;
        if !self.model_ready {
            return Err(GrackleError::Solver(
                "sim: no model available (last check was not sat)".to_string(),
            ));
        }
        let t = self.term(term)?.clone();
        match t.repr {
            SimRepr::Value(v) => Ok(v),
            SimRepr::Var(_) | SimRepr::App(..) => {
                Ok(Self::default_value(self.sort_kind(t.sort)?))
            }
        }
    }

    fn release_all(&mut self) {
        self.sorts.clear();
        self.terms.clear();
        self.asserted.clear();
        self.model_ready = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solver_with_bool() -> (SimSolver, SortId) {
        let mut s = SimSolver::new();
        s.new_instance().unwrap();
        let bool_id = SortId(0);
        s.mk_sort(bool_id, &SortKind::Bool).unwrap();
        (s, bool_id)
    }

    #[test]
    fn check_sat_is_deterministic_in_the_asserted_set() {
        let (mut a, bool_a) = solver_with_bool();
        let (mut b, bool_b) = solver_with_bool();
        for s in [(&mut a, bool_a), (&mut b, bool_b)] {
            let (solver, bool_id) = s;
            solver.mk_var(TermId(0), bool_id, "p").unwrap();
            solver.mk_var(TermId(1), bool_id, "q").unwrap();
            solver
                .mk_term(TermId(2), OpKind::And, &[TermId(0), TermId(1)])
                .unwrap();
            solver.assert_term(TermId(2)).unwrap();
        }
        assert_eq!(a.check_sat().unwrap(), b.check_sat().unwrap());
    }

    #[test]
    fn fail_on_check_requires_an_assertion() {
        let (mut s, bool_id) = solver_with_bool();
        s.set_option(SIM_FAIL_OPTION, "true").unwrap();
        // Empty assertion set: the armed failure does not trigger.
        s.check_sat().unwrap();

        s.mk_var(TermId(0), bool_id, "p").unwrap();
        s.assert_term(TermId(0)).unwrap();
        let err = s.check_sat().unwrap_err();
        assert!(err.to_string().contains("assertion failure"));
    }

    #[test]
    fn ill_typed_inputs_are_rejected() {
        let (mut s, bool_id) = solver_with_bool();
        s.mk_sort(SortId(1), &SortKind::BitVec(4)).unwrap();
        s.mk_var(TermId(0), bool_id, "p").unwrap();
        s.mk_var(TermId(1), SortId(1), "x").unwrap();
        assert!(s.mk_term(TermId(2), OpKind::And, &[TermId(0), TermId(1)]).is_err());
        assert!(s.assert_term(TermId(1)).is_err());
        assert!(s.mk_value(TermId(3), SortId(1), "#b01010").is_err());
        s.mk_value(TermId(3), SortId(1), "#b0101").unwrap();
    }

    #[test]
    fn get_value_needs_a_sat_answer() {
        let (mut s, bool_id) = solver_with_bool();
        s.mk_var(TermId(0), bool_id, "p").unwrap();
        let err = s.get_value(TermId(0)).unwrap_err();
        assert!(err.to_string().contains("no model"));
    }
}

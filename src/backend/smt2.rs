//! SMT-LIB2 dump backend: renders the driven API sequence as an SMT-LIB2
//! script instead of executing it, so any external solver binary can consume
//! the session. check-sat always reports unknown.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use crate::{
    result_sort, GrackleError, GrackleResult, OpKind, SatResult, Solver, SolverOption,
    SolverOptions, SortId, SortKind, TermId,
};

pub struct Smt2Solver {
    out: Box<dyn Write>,
    sorts: BTreeMap<u32, SortKind>,
    terms: BTreeMap<u32, SortId>,
    instance: bool,
}

impl std::fmt::Debug for Smt2Solver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Smt2Solver")
            .field("sorts", &self.sorts)
            .field("terms", &self.terms)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl Smt2Solver {
    /// Dumps to `path`, or to stdout when no path is given.
    pub fn create(path: Option<&PathBuf>) -> GrackleResult<Self> {
        let out: Box<dyn Write> = match path {
            Some(p) => Box::new(std::io::BufWriter::new(std::fs::File::create(p)?)),
            None => Box::new(std::io::stdout()),
        };
        Ok(Self::with_writer(out))
    }

    pub fn with_writer(out: Box<dyn Write>) -> Self {
        Self {
            out,
            sorts: BTreeMap::new(),
            terms: BTreeMap::new(),
            instance: false,
        }
    }

    fn sort_kind(&self, id: SortId) -> GrackleResult<&SortKind> {
        self.sorts
            .get(&id.0)
            .ok_or_else(|| GrackleError::Solver(format!("smt2: unbound sort {id}")))
    }

    fn term_sort(&self, id: TermId) -> GrackleResult<SortId> {
        self.terms
            .get(&id.0)
            .copied()
            .ok_or_else(|| GrackleError::Solver(format!("smt2: unbound term {id}")))
    }

    fn emit(&mut self, line: &str) -> GrackleResult<()> {
        writeln!(self.out, "{line}")?;
        Ok(())
    }
}

fn smt2_sort(kind: &SortKind) -> String {
    match kind {
        SortKind::Bool => "Bool".to_string(),
        SortKind::BitVec(w) => format!("(_ BitVec {w})"),
        SortKind::Int => "Int".to_string(),
        SortKind::Real => "Real".to_string(),
        SortKind::SmtString => "String".to_string(),
        SortKind::Array(dom, cod) => format!("(Array {} {})", smt2_sort(dom), smt2_sort(cod)),
        SortKind::Uninterpreted(name) => name.clone(),
    }
}

fn smt2_op(op: OpKind) -> &'static str {
    use OpKind::*;
    match op {
        Implies => "=>",
        Eq => "=",
        BvConcat => "concat",
        Neg => "-",
        Add => "+",
        Sub => "-",
        Mul => "*",
        Lt => "<",
        Leq => "<=",
        Gt => ">",
        Geq => ">=",
        StrConcat => "str.++",
        StrLen => "str.len",
        StrContains => "str.contains",
        other => other.name(),
    }
}

fn smt2_literal(kind: &SortKind, literal: &str) -> String {
    match kind {
        SortKind::Int => match literal.strip_prefix('-') {
            Some(mag) => format!("(- {mag})"),
            None => literal.to_string(),
        },
        SortKind::Real => match literal.strip_prefix('-') {
            Some(mag) => format!("(- {mag})"),
            None => literal.to_string(),
        },
        _ => literal.to_string(),
    }
}

impl Solver for Smt2Solver {
    fn name(&self) -> &'static str {
        "smt2"
    }

    fn new_instance(&mut self) -> GrackleResult<()> {
        if self.instance {
            return Err(GrackleError::Solver(
                "smt2: instance already exists".to_string(),
            ));
        }
        self.instance = true;
        self.emit("(set-logic ALL)")
    }

    fn delete_instance(&mut self) -> GrackleResult<()> {
        if !self.instance {
            return Err(GrackleError::Solver("smt2: no active instance".to_string()));
        }
        self.instance = false;
        self.emit("(exit)")?;
        self.out.flush()?;
        Ok(())
    }

    fn options(&self) -> SolverOptions {
        SolverOptions::new(vec![
            SolverOption::bool("produce-models"),
            SolverOption::bool("incremental"),
        ])
    }

    fn set_option(&mut self, name: &str, value: &str) -> GrackleResult<()> {
        self.emit(&format!("(set-option :{name} {value})"))
    }

    fn mk_sort(&mut self, id: SortId, kind: &SortKind) -> GrackleResult<u64> {
        if let SortKind::Uninterpreted(name) = kind {
            // Only emit the declaration once per symbol.
            if !self.sorts.values().any(|k| k == kind) {
                self.emit(&format!("(declare-sort {name} 0)"))?;
            }
        }
        self.sorts.insert(id.0, kind.clone());
        let digest = blake3::hash(kind.render().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn sorts_equal(&mut self, a: SortId, b: SortId) -> bool {
        match (self.sorts.get(&a.0), self.sorts.get(&b.0)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        }
    }

    fn copy_sort(&mut self, _id: SortId) {}

    fn release_sort(&mut self, id: SortId) {
        self.sorts.remove(&id.0);
    }

    fn mk_var(&mut self, id: TermId, sort: SortId, name: &str) -> GrackleResult<()> {
        let rendered = smt2_sort(self.sort_kind(sort)?);
        self.emit(&format!("(declare-const {name} {rendered})"))?;
        self.emit(&format!("(define-fun t{} () {rendered} {name})", id.0))?;
        self.terms.insert(id.0, sort);
        Ok(())
    }

    fn mk_value(&mut self, id: TermId, sort: SortId, value: &str) -> GrackleResult<()> {
        let kind = self.sort_kind(sort)?.clone();
        let rendered = smt2_sort(&kind);
        let literal = smt2_literal(&kind, value);
        self.emit(&format!("(define-fun t{} () {rendered} {literal})", id.0))?;
        self.terms.insert(id.0, sort);
        Ok(())
    }

    fn mk_term(&mut self, id: TermId, op: OpKind, args: &[TermId]) -> GrackleResult<()> {
        let mut kinds = Vec::with_capacity(args.len());
        for arg in args {
            let sort = self.term_sort(*arg)?;
            kinds.push(self.sort_kind(sort)?.clone());
        }
        let result = result_sort(op, &kinds)?;
        let sort = self
            .sorts
            .iter()
            .find(|(_, k)| **k == result)
            .map(|(i, _)| SortId(*i))
            .ok_or_else(|| {
                GrackleError::Solver(format!("smt2: result sort {result} was never declared"))
            })?;

        let rendered_args: Vec<String> = args.iter().map(|a| format!("t{}", a.0)).collect();
        self.emit(&format!(
            "(define-fun t{} () {} ({} {}))",
            id.0,
            smt2_sort(&result),
            smt2_op(op),
            rendered_args.join(" ")
        ))?;
        self.terms.insert(id.0, sort);
        Ok(())
    }

    fn copy_term(&mut self, _id: TermId) {}

    fn sort_of(&mut self, term: TermId) -> GrackleResult<SortId> {
        self.term_sort(term)
    }

    fn assert_term(&mut self, term: TermId) -> GrackleResult<()> {
        self.term_sort(term)?;
        self.emit(&format!("(assert t{})", term.0))
    }

    fn check_sat(&mut self) -> GrackleResult<SatResult> {
        self.emit("(check-sat)")?;
        self.out.flush()?;
        Ok(SatResult::Unknown)
    }

    fn get_value(&mut self, term: TermId) -> GrackleResult<String> {
        self.term_sort(term)?;
        self.emit(&format!("(get-value (t{}))", term.0))?;
        Ok("_".to_string())
    }

    fn release_all(&mut self) {
        self.sorts.clear();
        self.terms.clear();
        let _ = self.out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn dump<F: FnOnce(&mut Smt2Solver)>(f: F) -> String {
        let buf = SharedBuf::default();
        let mut solver = Smt2Solver::with_writer(Box::new(buf.clone()));
        f(&mut solver);
        let bytes = buf.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn renders_a_bitvector_session() {
        let text = dump(|s| {
            s.new_instance().unwrap();
            s.mk_sort(SortId(0), &SortKind::BitVec(8)).unwrap();
            s.mk_sort(SortId(1), &SortKind::Bool).unwrap();
            s.mk_var(TermId(0), SortId(0), "x0").unwrap();
            s.mk_value(TermId(1), SortId(0), "#b00001111").unwrap();
            s.mk_term(TermId(2), OpKind::BvUlt, &[TermId(0), TermId(1)]).unwrap();
            s.assert_term(TermId(2)).unwrap();
            assert_eq!(s.check_sat().unwrap(), SatResult::Unknown);
            s.delete_instance().unwrap();
        });
        assert!(text.contains("(set-logic ALL)"));
        assert!(text.contains("(declare-const x0 (_ BitVec 8))"));
        assert!(text.contains("(define-fun t2 () Bool (bvult t0 t1))"));
        assert!(text.contains("(assert t2)"));
        assert!(text.contains("(check-sat)"));
        assert!(text.contains("(exit)"));
    }

    #[test]
    fn negative_arithmetic_literals_are_wrapped() {
        let text = dump(|s| {
            s.new_instance().unwrap();
            s.mk_sort(SortId(0), &SortKind::Int).unwrap();
            s.mk_value(TermId(0), SortId(0), "-17").unwrap();
        });
        assert!(text.contains("(define-fun t0 () Int (- 17))"));
    }

    #[test]
    fn uninterpreted_sorts_are_declared_once() {
        let text = dump(|s| {
            s.new_instance().unwrap();
            s.mk_sort(SortId(0), &SortKind::Uninterpreted("U0".to_string())).unwrap();
            s.mk_sort(SortId(1), &SortKind::Uninterpreted("U0".to_string())).unwrap();
        });
        assert_eq!(text.matches("(declare-sort U0 0)").count(), 1);
    }
}

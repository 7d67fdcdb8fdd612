//! The pluggable solver capability: handle ids, sorts, operators, and the
//! fixed method set every backend implements.
//!
//! The portable core addresses terms and sorts exclusively by
//! manager-assigned integer ids; raw backend handles (pointers, refcounted
//! objects, value types) stay inside the backend that owns them. Identity
//! over those opaque handles is surfaced to the registry through
//! fingerprints plus the `sorts_equal` callback.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{GrackleError, GrackleResult, SolverOptions, Theory};

/// Stable registry index of a tracked sort. Printed as `s<N>` in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortId(pub u32);

/// Stable registry index of a tracked term. Printed as `t<N>` in traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermId(pub u32);

impl fmt::Display for SortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

impl FromStr for SortId {
    type Err = GrackleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('s')
            .and_then(|n| n.parse::<u32>().ok())
            .map(SortId)
            .ok_or_else(|| GrackleError::Trace(format!("invalid sort id {s:?}")))
    }
}

impl FromStr for TermId {
    type Err = GrackleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.strip_prefix('t')
            .and_then(|n| n.parse::<u32>().ok())
            .map(TermId)
            .ok_or_else(|| GrackleError::Trace(format!("invalid term id {s:?}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortKind {
    Bool,
    BitVec(u32),
    Int,
    Real,
    SmtString,
    Array(Box<SortKind>, Box<SortKind>),
    Uninterpreted(String),
}

impl SortKind {
    pub fn theory(&self) -> Theory {
        match self {
            SortKind::Bool => Theory::Booleans,
            SortKind::BitVec(_) => Theory::BitVectors,
            SortKind::Int => Theory::Integers,
            SortKind::Real => Theory::Reals,
            SortKind::SmtString => Theory::Strings,
            SortKind::Array(..) => Theory::Arrays,
            SortKind::Uninterpreted(_) => Theory::UninterpretedFunctions,
        }
    }

    /// Canonical textual form; also the fingerprint input backends hash.
    pub fn render(&self) -> String {
        match self {
            SortKind::Bool => "bool".to_string(),
            SortKind::BitVec(w) => format!("(bv {w})"),
            SortKind::Int => "int".to_string(),
            SortKind::Real => "real".to_string(),
            SortKind::SmtString => "string".to_string(),
            SortKind::Array(dom, cod) => format!("(array {} {})", dom.render(), cod.render()),
            SortKind::Uninterpreted(name) => format!("(usort {name})"),
        }
    }
}

impl fmt::Display for SortKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    Not,
    And,
    Or,
    Xor,
    Implies,
    Eq,
    Distinct,
    Ite,
    BvNot,
    BvNeg,
    BvAnd,
    BvOr,
    BvXor,
    BvAdd,
    BvSub,
    BvMul,
    BvUdiv,
    BvUrem,
    BvShl,
    BvLshr,
    BvConcat,
    BvUlt,
    Neg,
    Add,
    Sub,
    Mul,
    Lt,
    Leq,
    Gt,
    Geq,
    Select,
    Store,
    StrConcat,
    StrLen,
    StrContains,
}

impl OpKind {
    pub fn all() -> &'static [OpKind] {
        use OpKind::*;
        &[
            Not, And, Or, Xor, Implies, Eq, Distinct, Ite, BvNot, BvNeg, BvAnd, BvOr, BvXor,
            BvAdd, BvSub, BvMul, BvUdiv, BvUrem, BvShl, BvLshr, BvConcat, BvUlt, Neg, Add, Sub,
            Mul, Lt, Leq, Gt, Geq, Select, Store, StrConcat, StrLen, StrContains,
        ]
    }

    pub fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            Not => "not",
            And => "and",
            Or => "or",
            Xor => "xor",
            Implies => "implies",
            Eq => "eq",
            Distinct => "distinct",
            Ite => "ite",
            BvNot => "bvnot",
            BvNeg => "bvneg",
            BvAnd => "bvand",
            BvOr => "bvor",
            BvXor => "bvxor",
            BvAdd => "bvadd",
            BvSub => "bvsub",
            BvMul => "bvmul",
            BvUdiv => "bvudiv",
            BvUrem => "bvurem",
            BvShl => "bvshl",
            BvLshr => "bvlshr",
            BvConcat => "bvconcat",
            BvUlt => "bvult",
            Neg => "neg",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            Lt => "lt",
            Leq => "leq",
            Gt => "gt",
            Geq => "geq",
            Select => "select",
            Store => "store",
            StrConcat => "str.concat",
            StrLen => "str.len",
            StrContains => "str.contains",
        }
    }

    /// The theory an op belongs to, used for action gating.
    pub fn theory(self) -> Theory {
        use OpKind::*;
        match self {
            Not | And | Or | Xor | Implies | Eq | Distinct | Ite => Theory::Booleans,
            BvNot | BvNeg | BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem
            | BvShl | BvLshr | BvConcat | BvUlt => Theory::BitVectors,
            Neg | Add | Sub | Mul | Lt | Leq | Gt | Geq => Theory::Integers,
            Select | Store => Theory::Arrays,
            StrConcat | StrLen | StrContains => Theory::Strings,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpKind {
    type Err = GrackleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OpKind::all()
            .iter()
            .find(|op| op.name() == s)
            .copied()
            .ok_or_else(|| GrackleError::Trace(format!("unknown operator {s:?}")))
    }
}

/// Sort-checks an application and computes its result sort. Shared by the
/// registry (to record metadata for new composite terms) and by backends
/// that type-check their inputs.
pub fn result_sort(op: OpKind, args: &[SortKind]) -> GrackleResult<SortKind> {
    use OpKind::*;

    let bad = |why: &str| {
        Err(GrackleError::Solver(format!(
            "ill-sorted application of {op}: {why} (args: {})",
            args.iter().map(SortKind::render).collect::<Vec<_>>().join(", ")
        )))
    };

    match op {
        Not => match args {
            [SortKind::Bool] => Ok(SortKind::Bool),
            _ => bad("expected one boolean argument"),
        },
        And | Or | Xor | Implies => {
            if args.len() >= 2 && args.iter().all(|a| *a == SortKind::Bool) {
                Ok(SortKind::Bool)
            } else {
                bad("expected two or more boolean arguments")
            }
        }
        Eq | Distinct => {
            if args.len() >= 2 && args.windows(2).all(|w| w[0] == w[1]) {
                Ok(SortKind::Bool)
            } else {
                bad("expected two or more arguments of one sort")
            }
        }
        Ite => match args {
            [SortKind::Bool, a, b] if a == b => Ok(a.clone()),
            _ => bad("expected (bool, S, S)"),
        },
        BvNot | BvNeg => match args {
            [SortKind::BitVec(w)] => Ok(SortKind::BitVec(*w)),
            _ => bad("expected one bit-vector argument"),
        },
        BvAnd | BvOr | BvXor | BvAdd | BvSub | BvMul | BvUdiv | BvUrem | BvShl | BvLshr => {
            match args {
                [SortKind::BitVec(a), SortKind::BitVec(b)] if a == b => Ok(SortKind::BitVec(*a)),
                _ => bad("expected two bit-vectors of equal width"),
            }
        }
        BvConcat => match args {
            [SortKind::BitVec(a), SortKind::BitVec(b)] => Ok(SortKind::BitVec(a + b)),
            _ => bad("expected two bit-vector arguments"),
        },
        BvUlt => match args {
            [SortKind::BitVec(a), SortKind::BitVec(b)] if a == b => Ok(SortKind::Bool),
            _ => bad("expected two bit-vectors of equal width"),
        },
        Neg => match args {
            [a @ (SortKind::Int | SortKind::Real)] => Ok(a.clone()),
            _ => bad("expected one int or real argument"),
        },
        Add | Sub | Mul => match args {
            [a @ (SortKind::Int | SortKind::Real), b] if a == b => Ok(a.clone()),
            _ => bad("expected two arguments of one arithmetic sort"),
        },
        Lt | Leq | Gt | Geq => match args {
            [a @ (SortKind::Int | SortKind::Real), b] if a == b => Ok(SortKind::Bool),
            _ => bad("expected two arguments of one arithmetic sort"),
        },
        Select => match args {
            [SortKind::Array(dom, cod), idx] if **dom == *idx => Ok((**cod).clone()),
            _ => bad("expected (array D C, D)"),
        },
        Store => match args {
            [arr @ SortKind::Array(dom, cod), idx, val] if **dom == *idx && **cod == *val => {
                Ok(arr.clone())
            }
            _ => bad("expected (array D C, D, C)"),
        },
        StrConcat => match args {
            [SortKind::SmtString, SortKind::SmtString] => Ok(SortKind::SmtString),
            _ => bad("expected two string arguments"),
        },
        StrLen => match args {
            [SortKind::SmtString] => Ok(SortKind::Int),
            _ => bad("expected one string argument"),
        },
        StrContains => match args {
            [SortKind::SmtString, SortKind::SmtString] => Ok(SortKind::Bool),
            _ => bad("expected two string arguments"),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    Unknown,
}

impl fmt::Display for SatResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SatResult::Sat => "sat",
            SatResult::Unsat => "unsat",
            SatResult::Unknown => "unknown",
        })
    }
}

/// The capability every backend implements. One implementation is selected
/// at startup and driven through `Box<dyn Solver>`; the registry and the FSM
/// never see backend-specific types.
///
/// Lifetime hooks: `copy_sort`/`copy_term` let refcounting backends hand out
/// an owned reference when the registry retains a handle beyond the creating
/// call; `release_sort` retracts a creation the registry deduplicated away;
/// `release_all` backs the registry's `clear`. Backends without refcounting
/// implement these as no-ops or plain table drops.
pub trait Solver: fmt::Debug {
    fn name(&self) -> &'static str;

    fn new_instance(&mut self) -> GrackleResult<()>;
    fn delete_instance(&mut self) -> GrackleResult<()>;

    /// The backend's randomly-configurable option table.
    fn options(&self) -> SolverOptions;
    fn set_option(&mut self, name: &str, value: &str) -> GrackleResult<()>;

    /// Creates a sort bound to `id` and returns the backend's identity
    /// fingerprint for it (equal handles must fingerprint equal).
    fn mk_sort(&mut self, id: SortId, kind: &SortKind) -> GrackleResult<u64>;
    /// Backend equality over two bound sorts; only the backend knows what
    /// equality means for its handles.
    fn sorts_equal(&mut self, a: SortId, b: SortId) -> bool;
    fn copy_sort(&mut self, id: SortId);
    fn release_sort(&mut self, id: SortId);

    fn mk_var(&mut self, id: TermId, sort: SortId, name: &str) -> GrackleResult<()>;
    fn mk_value(&mut self, id: TermId, sort: SortId, value: &str) -> GrackleResult<()>;
    fn mk_term(&mut self, id: TermId, op: OpKind, args: &[TermId]) -> GrackleResult<()>;
    fn copy_term(&mut self, id: TermId);

    /// Backend-specific lookup of a tracked term's sort.
    fn sort_of(&mut self, term: TermId) -> GrackleResult<SortId>;

    fn assert_term(&mut self, term: TermId) -> GrackleResult<()>;
    fn check_sat(&mut self) -> GrackleResult<SatResult>;
    fn get_value(&mut self, term: TermId) -> GrackleResult<String>;

    fn release_all(&mut self);
}

/// Which backend a session drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverKind {
    Sim,
    Smt2,
    Bitwuzla,
}

impl SolverKind {
    pub fn name(self) -> &'static str {
        match self {
            SolverKind::Sim => "sim",
            SolverKind::Smt2 => "smt2",
            SolverKind::Bitwuzla => "bitwuzla",
        }
    }
}

/// Instantiates the selected backend. Selecting a backend that was not
/// compiled into this binary is a configuration error, reported before any
/// run starts.
pub fn create_solver(
    kind: SolverKind,
    smt2_out: Option<&PathBuf>,
) -> GrackleResult<Box<dyn Solver>> {
    match kind {
        SolverKind::Sim => Ok(Box::new(crate::SimSolver::new())),
        SolverKind::Smt2 => Ok(Box::new(crate::Smt2Solver::create(smt2_out)?)),
        SolverKind::Bitwuzla => Err(GrackleError::Config(
            "support for the bitwuzla backend is not compiled into this binary".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_display() {
        assert_eq!("s7".parse::<SortId>().unwrap(), SortId(7));
        assert_eq!("t123".parse::<TermId>().unwrap(), TermId(123));
        assert_eq!(SortId(7).to_string(), "s7");
        assert!("x7".parse::<SortId>().is_err());
        assert!("t".parse::<TermId>().is_err());
    }

    #[test]
    fn op_names_round_trip() {
        for op in OpKind::all() {
            assert_eq!(op.name().parse::<OpKind>().unwrap(), *op);
        }
    }

    #[test]
    fn result_sorts() {
        use SortKind::*;
        assert_eq!(result_sort(OpKind::And, &[Bool, Bool]).unwrap(), Bool);
        assert_eq!(
            result_sort(OpKind::BvConcat, &[BitVec(8), BitVec(24)]).unwrap(),
            BitVec(32)
        );
        assert_eq!(result_sort(OpKind::BvUlt, &[BitVec(4), BitVec(4)]).unwrap(), Bool);
        assert_eq!(result_sort(OpKind::StrLen, &[SmtString]).unwrap(), Int);
        let arr = Array(Box::new(BitVec(8)), Box::new(Bool));
        assert_eq!(result_sort(OpKind::Select, &[arr.clone(), BitVec(8)]).unwrap(), Bool);
        assert_eq!(
            result_sort(OpKind::Store, &[arr.clone(), BitVec(8), Bool]).unwrap(),
            arr
        );
    }

    #[test]
    fn ill_sorted_applications_are_rejected() {
        use SortKind::*;
        assert!(result_sort(OpKind::And, &[Bool, BitVec(2)]).is_err());
        assert!(result_sort(OpKind::BvAdd, &[BitVec(4), BitVec(8)]).is_err());
        assert!(result_sort(OpKind::Ite, &[Bool, Int, Real]).is_err());
        assert!(result_sort(OpKind::Mul, &[Int, Real]).is_err());
    }

    #[test]
    fn unconfigured_backend_is_config_error() {
        let err = create_solver(SolverKind::Bitwuzla, None).unwrap_err();
        assert!(err.is_config());
    }
}

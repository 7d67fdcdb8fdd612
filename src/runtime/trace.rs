//! Trace format: one action per line, seed recorded once at the top.
//!
//! Replay is argument-literal. The player re-issues exactly the recorded
//! operation/argument sequence and never touches the random source, which is
//! what makes line removal during minimization change the program rather
//! than the randomness.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::{
    GrackleError, GrackleResult, OpKind, SatResult, Seed, Session, SortId, SortKind, TermId,
};

/// A single API operation with its solver-visible arguments: the unit
/// recorded in a trace and the unit removed by the minimizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    New,
    SetOption { name: String, value: String },
    MkSort { id: SortId, kind: SortKind },
    MkVar { id: TermId, sort: SortId, name: String },
    MkValue { id: TermId, sort: SortId, value: String },
    MkTerm { id: TermId, op: OpKind, args: Vec<TermId> },
    Assert { term: TermId },
    CheckSat,
    GetValue { term: TermId },
    Delete,
}

impl Action {
    pub fn tag(&self) -> &'static str {
        match self {
            Action::New => "new",
            Action::SetOption { .. } => "set-option",
            Action::MkSort { .. } => "mk-sort",
            Action::MkVar { .. } => "mk-var",
            Action::MkValue { .. } => "mk-value",
            Action::MkTerm { .. } => "mk-term",
            Action::Assert { .. } => "assert",
            Action::CheckSat => "check-sat",
            Action::GetValue { .. } => "get-value",
            Action::Delete => "delete",
        }
    }

    pub fn parse_line(line: &str) -> GrackleResult<Action> {
        let mut tokens = tokenize(line).into_iter().peekable();
        let tag = tokens
            .next()
            .ok_or_else(|| GrackleError::Trace("empty action line".to_string()))?;

        let action = match tag.as_str() {
            "new" => Action::New,
            "set-option" => Action::SetOption {
                name: take(&mut tokens, "option name")?,
                value: take(&mut tokens, "option value")?,
            },
            "mk-sort" => Action::MkSort {
                id: take(&mut tokens, "sort id")?.parse()?,
                kind: parse_sort_kind(&mut tokens)?,
            },
            "mk-var" => Action::MkVar {
                id: take(&mut tokens, "term id")?.parse()?,
                sort: take(&mut tokens, "sort id")?.parse()?,
                name: take(&mut tokens, "variable name")?,
            },
            "mk-value" => Action::MkValue {
                id: take(&mut tokens, "term id")?.parse()?,
                sort: take(&mut tokens, "sort id")?.parse()?,
                value: take(&mut tokens, "literal")?,
            },
            "mk-term" => {
                let id = take(&mut tokens, "term id")?.parse()?;
                let op: OpKind = take(&mut tokens, "operator")?.parse()?;
                let mut args = Vec::new();
                for tok in tokens.by_ref() {
                    args.push(tok.parse()?);
                }
                if args.is_empty() {
                    return Err(GrackleError::Trace(format!(
                        "mk-term {id} {op} has no arguments"
                    )));
                }
                Action::MkTerm { id, op, args }
            }
            "assert" => Action::Assert {
                term: take(&mut tokens, "term id")?.parse()?,
            },
            "check-sat" => Action::CheckSat,
            "get-value" => Action::GetValue {
                term: take(&mut tokens, "term id")?.parse()?,
            },
            "delete" => Action::Delete,
            other => {
                return Err(GrackleError::Trace(format!("unknown action tag {other:?}")));
            }
        };

        if let Some(extra) = tokens.next() {
            return Err(GrackleError::Trace(format!(
                "trailing token {extra:?} after {} action",
                action.tag()
            )));
        }
        Ok(action)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::New => write!(f, "new"),
            Action::SetOption { name, value } => write!(f, "set-option {name} {value}"),
            Action::MkSort { id, kind } => write!(f, "mk-sort {id} {kind}"),
            Action::MkVar { id, sort, name } => write!(f, "mk-var {id} {sort} {name}"),
            Action::MkValue { id, sort, value } => write!(f, "mk-value {id} {sort} {value}"),
            Action::MkTerm { id, op, args } => {
                write!(f, "mk-term {id} {op}")?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                Ok(())
            }
            Action::Assert { term } => write!(f, "assert {term}"),
            Action::CheckSat => write!(f, "check-sat"),
            Action::GetValue { term } => write!(f, "get-value {term}"),
            Action::Delete => write!(f, "delete"),
        }
    }
}

fn take(
    tokens: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
    what: &str,
) -> GrackleResult<String> {
    tokens
        .next()
        .ok_or_else(|| GrackleError::Trace(format!("missing {what}")))
}

/// Whitespace tokenization with parentheses split out, so sort expressions
/// like `(array (bv 8) bool)` stream token by token.
fn tokenize(line: &str) -> Vec<String> {
    let spaced = line.replace('(', " ( ").replace(')', " ) ");
    spaced.split_whitespace().map(str::to_string).collect()
}

fn parse_sort_kind(
    tokens: &mut std::iter::Peekable<std::vec::IntoIter<String>>,
) -> GrackleResult<SortKind> {
    let tok = take(tokens, "sort expression")?;
    match tok.as_str() {
        "bool" => Ok(SortKind::Bool),
        "int" => Ok(SortKind::Int),
        "real" => Ok(SortKind::Real),
        "string" => Ok(SortKind::SmtString),
        "(" => {
            let head = take(tokens, "sort constructor")?;
            let kind = match head.as_str() {
                "bv" => {
                    let width_tok = take(tokens, "bit-vector width")?;
                    let width: u32 = width_tok.parse().map_err(|_| {
                        GrackleError::Trace(format!("invalid bit-vector width {width_tok:?}"))
                    })?;
                    if width == 0 {
                        return Err(GrackleError::Trace(
                            "bit-vector width must be positive".to_string(),
                        ));
                    }
                    SortKind::BitVec(width)
                }
                "array" => {
                    let dom = parse_sort_kind(tokens)?;
                    let cod = parse_sort_kind(tokens)?;
                    SortKind::Array(Box::new(dom), Box::new(cod))
                }
                "usort" => SortKind::Uninterpreted(take(tokens, "sort name")?),
                other => {
                    return Err(GrackleError::Trace(format!(
                        "unknown sort constructor {other:?}"
                    )));
                }
            };
            let close = take(tokens, "closing parenthesis")?;
            if close != ")" {
                return Err(GrackleError::Trace(format!(
                    "expected ')' after sort expression, got {close:?}"
                )));
            }
            Ok(kind)
        }
        other => Err(GrackleError::Trace(format!("unknown sort {other:?}"))),
    }
}

/// An ordered action sequence plus its originating seed: the unit of
/// persistence, replay, and minimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub seed: Seed,
    pub actions: Vec<Action>,
}

impl Trace {
    pub fn parse(text: &str) -> GrackleResult<Self> {
        Self::parse_named(text, "<trace>")
    }

    pub fn parse_named(text: &str, source: &str) -> GrackleResult<Self> {
        let mut seed: Option<Seed> = None;
        let mut actions = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let lineno = idx + 1;
            if seed.is_none() {
                let value = line.strip_prefix("seed ").ok_or_else(|| {
                    GrackleError::Trace(format!(
                        "{source}:{lineno}: expected `seed <n>` header, got {line:?}"
                    ))
                })?;
                let parsed = value.trim().parse::<Seed>().map_err(|_| {
                    GrackleError::Trace(format!("{source}:{lineno}: invalid seed {value:?}"))
                })?;
                seed = Some(parsed);
                continue;
            }
            let action = Action::parse_line(line).map_err(|e| {
                GrackleError::Trace(format!("{source}:{lineno}: {e}"))
            })?;
            actions.push(action);
        }
        let seed = seed.ok_or_else(|| {
            GrackleError::Trace(format!("{source}: missing `seed <n>` header"))
        })?;
        Ok(Self { seed, actions })
    }

    pub fn load(path: &Path) -> GrackleResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse_named(&text, &path.display().to_string())
    }

    pub fn render(&self) -> String {
        let mut out = format!("seed {}\n", self.seed);
        for action in &self.actions {
            out.push_str(&action.to_string());
            out.push('\n');
        }
        out
    }

    pub fn write(&self, path: &Path) -> GrackleResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        Ok(())
    }
}

/// Append-only trace recorder. Lines are flushed as they are issued so a
/// crashing child still leaves a replayable prefix on disk.
#[derive(Debug)]
pub struct TraceWriter {
    file: std::fs::File,
    path: PathBuf,
}

impl TraceWriter {
    pub fn create(path: &Path, seed: Seed) -> GrackleResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        writeln!(file, "seed {seed}")?;
        file.flush()?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, action: &Action) -> GrackleResult<()> {
        writeln!(self.file, "{action}")?;
        self.file.flush()?;
        Ok(())
    }
}

/// Replays recorded actions against a fresh session.
///
/// Recorded ids are translated through a map because backend-side dedup can
/// bind a creation to an earlier id than the trace recorded. A reference to
/// an id with no mapping means the trace is corrupted (or a minimization
/// candidate removed the creating line) and fails loudly.
pub struct Player<'s> {
    session: &'s mut Session,
    sorts: std::collections::HashMap<u32, SortId>,
    terms: std::collections::HashMap<u32, TermId>,
}

impl<'s> Player<'s> {
    pub fn new(session: &'s mut Session) -> Self {
        Self {
            session,
            sorts: std::collections::HashMap::new(),
            terms: std::collections::HashMap::new(),
        }
    }

    fn sort_ref(&self, id: SortId) -> GrackleResult<SortId> {
        self.sorts
            .get(&id.0)
            .copied()
            .ok_or_else(|| GrackleError::Trace(format!("reference to unknown sort {id}")))
    }

    fn term_ref(&self, id: TermId) -> GrackleResult<TermId> {
        self.terms
            .get(&id.0)
            .copied()
            .ok_or_else(|| GrackleError::Trace(format!("reference to unknown term {id}")))
    }

    pub fn apply(&mut self, action: &Action) -> GrackleResult<Option<SatResult>> {
        match action {
            Action::New => {
                self.session.solver.new_instance()?;
                self.session.mgr.set_solver()?;
            }
            Action::SetOption { name, value } => {
                self.session.solver.set_option(name, value)?;
            }
            Action::MkSort { id, kind } => {
                let got = self
                    .session
                    .mgr
                    .add_sort(self.session.solver.as_mut(), kind.clone())?;
                self.sorts.insert(id.0, got);
            }
            Action::MkVar { id, sort, name } => {
                let sort = self.sort_ref(*sort)?;
                let got = self
                    .session
                    .mgr
                    .add_var(self.session.solver.as_mut(), sort, name)?;
                self.terms.insert(id.0, got);
            }
            Action::MkValue { id, sort, value } => {
                let sort = self.sort_ref(*sort)?;
                let got = self
                    .session
                    .mgr
                    .add_value(self.session.solver.as_mut(), sort, value)?;
                self.terms.insert(id.0, got);
            }
            Action::MkTerm { id, op, args } => {
                let args: Vec<TermId> = args
                    .iter()
                    .map(|a| self.term_ref(*a))
                    .collect::<GrackleResult<_>>()?;
                let got = self
                    .session
                    .mgr
                    .add_op_term(self.session.solver.as_mut(), *op, &args)?;
                self.terms.insert(id.0, got);
            }
            Action::Assert { term } => {
                let term = self.term_ref(*term)?;
                self.session.mgr.term_info(term)?;
                self.session.solver.assert_term(term)?;
            }
            Action::CheckSat => {
                return self.session.solver.check_sat().map(Some);
            }
            Action::GetValue { term } => {
                let term = self.term_ref(*term)?;
                self.session.mgr.term_info(term)?;
                self.session.solver.get_value(term)?;
            }
            Action::Delete => {
                self.session.solver.delete_instance()?;
                self.session.mgr.clear(self.session.solver.as_mut());
            }
        }
        Ok(None)
    }
}

/// Replays a trace against a fresh session, issuing the identical
/// operation/argument sequence without consuming randomness.
pub fn untrace(session: &mut Session, trace: &Trace) -> GrackleResult<()> {
    let mut player = Player::new(session);
    for (idx, action) in trace.actions.iter().enumerate() {
        player.apply(action).map_err(|e| match e {
            GrackleError::Trace(msg) => GrackleError::Trace(format!(
                "replay failed at action {} ({action}): {msg}",
                idx + 1
            )),
            other => other,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_round_trip_through_lines() {
        let actions = vec![
            Action::New,
            Action::SetOption {
                name: "produce-models".to_string(),
                value: "true".to_string(),
            },
            Action::MkSort {
                id: SortId(0),
                kind: SortKind::BitVec(32),
            },
            Action::MkSort {
                id: SortId(1),
                kind: SortKind::Array(
                    Box::new(SortKind::BitVec(8)),
                    Box::new(SortKind::Bool),
                ),
            },
            Action::MkVar {
                id: TermId(0),
                sort: SortId(0),
                name: "x0".to_string(),
            },
            Action::MkValue {
                id: TermId(1),
                sort: SortId(0),
                value: "#b00000000000000000000000000000101".to_string(),
            },
            Action::MkTerm {
                id: TermId(2),
                op: OpKind::BvUlt,
                args: vec![TermId(0), TermId(1)],
            },
            Action::Assert { term: TermId(2) },
            Action::CheckSat,
            Action::GetValue { term: TermId(0) },
            Action::Delete,
        ];
        for action in &actions {
            let line = action.to_string();
            let parsed = Action::parse_line(&line).unwrap();
            assert_eq!(&parsed, action, "line {line:?}");
        }
    }

    #[test]
    fn trace_round_trips_with_seed_header() {
        let trace = Trace {
            seed: 42,
            actions: vec![Action::New, Action::CheckSat, Action::Delete],
        };
        let text = trace.render();
        assert!(text.starts_with("seed 42\n"));
        assert_eq!(Trace::parse(&text).unwrap(), trace);
    }

    #[test]
    fn missing_seed_header_is_rejected() {
        let err = Trace::parse("new\ncheck-sat\n").unwrap_err();
        assert!(err.to_string().contains("expected `seed <n>` header"));
    }

    #[test]
    fn malformed_lines_carry_line_numbers() {
        let err = Trace::parse("seed 1\nnew\nmk-sort s0 frob\n").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(":3:"), "got {msg}");
        assert!(msg.contains("unknown sort"));

        let err = Trace::parse("seed 1\nwat t0\n").unwrap_err();
        assert!(err.to_string().contains("unknown action tag"));

        let err = Trace::parse("seed 1\nassert t0 extra\n").unwrap_err();
        assert!(err.to_string().contains("trailing token"));
    }

    #[test]
    fn replay_executes_recorded_actions_in_order() {
        let text = "\
seed 7
new
mk-sort s0 (bv 4)
mk-var t0 s0 x0
mk-value t1 s0 #b0101
mk-sort s1 bool
mk-term t2 bvult t0 t1
assert t2
check-sat
delete
";
        let trace = Trace::parse(text).unwrap();
        let mut session = Session::new(Box::new(crate::SimSolver::new()));
        untrace(&mut session, &trace).unwrap();
    }

    #[test]
    fn replay_fails_loudly_on_unknown_ids() {
        let text = "\
seed 7
new
mk-sort s0 bool
mk-var t0 s0 x0
assert t9
";
        let trace = Trace::parse(text).unwrap();
        let mut session = Session::new(Box::new(crate::SimSolver::new()));
        let err = untrace(&mut session, &trace).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unknown term t9"), "got {msg}");
        assert!(msg.contains("action 5"), "got {msg}");

        let text = "seed 7\nnew\nmk-var t0 s3 x0\n";
        let trace = Trace::parse(text).unwrap();
        let mut session = Session::new(Box::new(crate::SimSolver::new()));
        let err = untrace(&mut session, &trace).unwrap_err();
        assert!(err.to_string().contains("unknown sort s3"));
    }

    #[test]
    fn replay_tolerates_backend_sort_dedup() {
        // Two mk-sort lines for the same sort bind to one registry id; later
        // references to either recorded id must still resolve.
        let text = "\
seed 7
new
mk-sort s0 bool
mk-sort s1 bool
mk-var t0 s1 x0
assert t0
check-sat
delete
";
        let trace = Trace::parse(text).unwrap();
        let mut session = Session::new(Box::new(crate::SimSolver::new()));
        untrace(&mut session, &trace).unwrap();
    }
}

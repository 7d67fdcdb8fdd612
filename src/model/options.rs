//! Solver configuration options: value domains plus a dependency/conflict
//! graph between option names.
//!
//! Option objects are passive data plus value generators. `pick_value` is
//! deliberately unconstrained by the dependency/conflict state; legality
//! across an option *set* is checked by the caller (the FSM) through
//! [`SolverOptions::pick_legal`] before an option is activated.

use std::collections::BTreeSet;

use crate::RngSource;

#[derive(Debug, Clone)]
pub enum OptionValue {
    Bool,
    /// Bounded integer domain, inclusive on both ends.
    Int { min: i32, max: i32 },
    List(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct SolverOption {
    name: String,
    depends: BTreeSet<String>,
    conflicts: BTreeSet<String>,
    value: OptionValue,
}

impl SolverOption {
    pub fn bool(name: &str) -> Self {
        Self::new(name, OptionValue::Bool)
    }

    pub fn int(name: &str, min: i32, max: i32) -> Self {
        Self::new(name, OptionValue::Int { min, max })
    }

    pub fn list<I, S>(name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values: Vec<String> = values.into_iter().map(Into::into).collect();
        Self::new(name, OptionValue::List(values))
    }

    fn new(name: &str, value: OptionValue) -> Self {
        Self {
            name: name.to_string(),
            depends: BTreeSet::new(),
            conflicts: BTreeSet::new(),
            value,
        }
    }

    pub fn with_depends(mut self, names: &[&str]) -> Self {
        for n in names {
            self.add_depends(n);
        }
        self
    }

    pub fn with_conflicts(mut self, names: &[&str]) -> Self {
        for n in names {
            self.add_conflict(n);
        }
        self
    }

    pub fn add_depends(&mut self, name: &str) {
        self.depends.insert(name.to_string());
    }

    pub fn add_conflict(&mut self, name: &str) {
        self.conflicts.insert(name.to_string());
    }

    pub fn get_name(&self) -> &str {
        &self.name
    }

    pub fn get_depends(&self) -> &BTreeSet<String> {
        &self.depends
    }

    pub fn get_conflicts(&self) -> &BTreeSet<String> {
        &self.conflicts
    }

    /// A textual value consistent with the option's domain. Never inspects
    /// the active-option set.
    pub fn pick_value(&self, rng: &mut RngSource) -> String {
        match &self.value {
            OptionValue::Bool => {
                if rng.flip_coin() {
                    "true".to_string()
                } else {
                    "false".to_string()
                }
            }
            OptionValue::Int { min, max } => rng.pick_int32(*min, *max).to_string(),
            OptionValue::List(values) => rng.choose(values).clone(),
        }
    }
}

/// A backend's option table.
#[derive(Debug, Clone, Default)]
pub struct SolverOptions {
    options: Vec<SolverOption>,
}

impl SolverOptions {
    pub fn new(options: Vec<SolverOption>) -> Self {
        Self { options }
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&SolverOption> {
        self.options.iter().find(|o| o.get_name() == name)
    }

    /// True iff activating `opt` on top of `active` violates no declared
    /// constraint: all dependencies active, no conflict active.
    pub fn is_legal(opt: &SolverOption, active: &BTreeSet<String>) -> bool {
        opt.get_depends().iter().all(|d| active.contains(d))
            && opt.get_conflicts().iter().all(|c| !active.contains(c))
    }

    /// Uniform pick among the options that are legal to activate given the
    /// already-active set. Already-active options are not re-offered.
    pub fn pick_legal(
        &self,
        rng: &mut RngSource,
        active: &BTreeSet<String>,
    ) -> Option<&SolverOption> {
        let candidates: Vec<&SolverOption> = self
            .options
            .iter()
            .filter(|o| !active.contains(o.get_name()) && Self::is_legal(o, active))
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.pick_index(candidates.len())])
    }
}

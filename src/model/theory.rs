//! Theory tags gating which sorts, operators, and actions are legal.

use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::FromStr;

use crate::GrackleError;

/// A family of SMT logic. `Booleans` is the core theory and is always
/// enabled; the rest are opt-in via `--theory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theory {
    Arrays,
    BitVectors,
    Booleans,
    FloatingPoint,
    Integers,
    Quantifiers,
    Reals,
    Strings,
    UninterpretedFunctions,
}

impl Theory {
    pub fn all() -> &'static [Theory] {
        &[
            Theory::Arrays,
            Theory::BitVectors,
            Theory::Booleans,
            Theory::FloatingPoint,
            Theory::Integers,
            Theory::Quantifiers,
            Theory::Reals,
            Theory::Strings,
            Theory::UninterpretedFunctions,
        ]
    }

    /// Short name used on the CLI and in log output.
    pub fn name(self) -> &'static str {
        match self {
            Theory::Arrays => "arrays",
            Theory::BitVectors => "bv",
            Theory::Booleans => "bool",
            Theory::FloatingPoint => "fp",
            Theory::Integers => "int",
            Theory::Quantifiers => "quant",
            Theory::Reals => "real",
            Theory::Strings => "string",
            Theory::UninterpretedFunctions => "uf",
        }
    }
}

impl fmt::Display for Theory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Theory {
    type Err = GrackleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let got = Theory::all().iter().find(|t| t.name() == s).copied();
        got.ok_or_else(|| {
            let known = Theory::all()
                .iter()
                .map(|t| t.name())
                .collect::<Vec<_>>()
                .join(", ");
            GrackleError::Config(format!("unknown theory {s:?} (known: {known})"))
        })
    }
}

//! Parsing for CLI time budgets (e.g. "1.5", "250ms", "30s", "5m").

use std::str::FromStr;
use std::time::Duration;

use crate::{GrackleError, GrackleResult};

/// Wall-clock budget for one test run or a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimit(pub Duration);

impl FromStr for TimeLimit {
    type Err = GrackleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_time_limit(s).map(Self)
    }
}

/// A bare number (possibly fractional) is seconds; otherwise a unit suffix
/// of ms|s|m|h is required.
pub fn parse_time_limit(input: &str) -> GrackleResult<Duration> {
    let s = input.trim();
    if s.is_empty() {
        return Err(GrackleError::InvalidArgument("empty time limit".to_string()));
    }

    if let Ok(secs) = s.parse::<f64>() {
        if !secs.is_finite() || secs < 0.0 {
            return Err(GrackleError::InvalidArgument(format!(
                "invalid time limit {input:?} (must be a non-negative number of seconds)"
            )));
        }
        return Ok(Duration::from_secs_f64(secs));
    }

    let split = s
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let (num_part, unit_part) = s.split_at(split);
    let value: u64 = num_part.parse().map_err(|_| {
        GrackleError::InvalidArgument(format!(
            "invalid time limit number: {num_part:?} (from {input:?})"
        ))
    })?;

    match unit_part {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(60 * 60))),
        _ => Err(GrackleError::InvalidArgument(format!(
            "invalid time limit unit {unit_part:?} (expected ms|s|m|h)"
        ))),
    }
}

use crate::Error;
use serde::{Deserialize, Serialize};

/// Upper bound on the number of rows either sequence may hold.
pub const MAX_THRESHOLD_ROWS: usize = 6;

pub const PRIORITY_FLOORS: &str = "priority_floors";
pub const MINFREE_LEVELS: &str = "minfree_levels";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Thresholds {
    /// Minimum priority that becomes eligible for killing once the matching
    /// `minfree_levels` entry is crossed, on the `oom_adj` scale (-17..15). Paired with `minfree_levels` row by
    /// row; the longer of the two sequences is truncated to the shorter.
    pub priority_floors: Vec<i32>,

    /// Free page levels in ascending order. A row fires when both free and
    /// reclaimable file pages drop below its level.
    pub minfree_levels: Vec<u64>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            priority_floors: vec![0, 1, 6, 12, 15],
            minfree_levels: vec![
                3 * 512,   // 6MB
                2 * 1024,  // 8MB
                4 * 1024,  // 16MB
                16 * 1024, // 64MB
            ],
        }
    }
}

impl Thresholds {
    /// Number of rows actually consulted.
    pub fn rows(&self) -> usize {
        self.priority_floors.len().min(self.minfree_levels.len())
    }

    pub fn validate(&self) -> Result<(), Error> {
        let floors: Vec<i64> = self.priority_floors.iter().map(|&v| v as i64).collect();
        check_sequence(PRIORITY_FLOORS, &floors)?;
        let levels = self
            .minfree_levels
            .iter()
            .map(|&v| {
                i64::try_from(v).map_err(|_| Error::OutOfRange {
                    param: MINFREE_LEVELS,
                    value: i64::MAX,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        check_sequence(MINFREE_LEVELS, &levels)
    }
}

/// Parse a comma separated list such as `0,1,6,12,15` into priority floors.
pub fn parse_priority_floors(text: &str) -> Result<Vec<i32>, Error> {
    parse_sequence(PRIORITY_FLOORS, text)?
        .into_iter()
        .map(|value| {
            i32::try_from(value).map_err(|_| Error::OutOfRange {
                param: PRIORITY_FLOORS,
                value,
            })
        })
        .collect()
}

/// Parse a comma separated list such as `1536,2048,4096,16384` into minfree
/// page levels.
pub fn parse_minfree_levels(text: &str) -> Result<Vec<u64>, Error> {
    Ok(parse_sequence(MINFREE_LEVELS, text)?
        .into_iter()
        .map(|value| value as u64)
        .collect())
}

/// Format a sequence the way it is accepted by the parsers.
pub fn format_sequence<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse and validate a comma separated sequence of non-negative integers.
///
/// An empty (or all-whitespace) string yields an empty sequence.
pub fn parse_sequence(param: &'static str, text: &str) -> Result<Vec<i64>, Error> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    let values = text
        .split(',')
        .map(|item| {
            let item = item.trim();
            item.parse::<i64>().map_err(|_| Error::InvalidInteger {
                param,
                value: item.to_owned(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    check_sequence(param, &values)?;
    Ok(values)
}

fn check_sequence(param: &'static str, values: &[i64]) -> Result<(), Error> {
    if values.len() > MAX_THRESHOLD_ROWS {
        return Err(Error::TooManyEntries {
            param,
            len: values.len(),
            max: MAX_THRESHOLD_ROWS,
        });
    }
    if let Some(&value) = values.iter().find(|&&v| v < 0) {
        return Err(Error::Negative { param, value });
    }
    if values.windows(2).any(|pair| pair[0] > pair[1]) {
        return Err(Error::NotAscending { param });
    }
    Ok(())
}

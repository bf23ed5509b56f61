#![forbid(unsafe_code)]

//! Runtime-adjustable reclaim parameters.
//!
//! Writes go through the same comma-list syntax the thresholds were
//! historically configured with (`0,1,6,12,15`). A write is parsed and
//! validated in full before it replaces anything.

use crate::error::Error;
use crate::threshold::ThresholdTable;
use config::{
    Config, format_sequence, parse_bool, parse_minfree_levels, parse_priority_floors, parse_u32,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunables {
    pub table: ThresholdTable,
    pub debug_level: u32,
    pub fast_run: bool,
    pub reclaim_cost: u32,
    pub grace_window: Duration,
    pub settle_pause: Duration,
}

impl Default for Tunables {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl Tunables {
    pub fn from_config(config: &Config) -> Self {
        Self {
            table: ThresholdTable::from_config(&config.thresholds),
            debug_level: config.reclaim.debug_level,
            fast_run: config.reclaim.fast_run,
            reclaim_cost: config.reclaim.reclaim_cost,
            grace_window: config.reclaim.grace_window,
            settle_pause: config.reclaim.settle_pause,
        }
    }

    /// Whether messages of the given verbosity should be emitted.
    pub fn verbose(&self, level: u32) -> bool {
        self.debug_level >= level
    }

    pub fn write(&mut self, param: Param, value: &str) -> Result<(), Error> {
        match param {
            Param::PriorityFloors => {
                let floors = parse_priority_floors(value)?;
                self.table.set_priority_floors(floors);
            }
            Param::MinfreeLevels => {
                let levels = parse_minfree_levels(value)?;
                self.table.set_minfree_levels(levels);
            }
            Param::DebugLevel => self.debug_level = parse_u32(param.name(), value)?,
            Param::FastRun => self.fast_run = parse_bool(param.name(), value)?,
            Param::ReclaimCost => self.reclaim_cost = parse_u32(param.name(), value)?,
        }
        Ok(())
    }

    pub fn read(&self, param: Param) -> String {
        match param {
            Param::PriorityFloors => format_sequence(self.table.priority_floors()),
            Param::MinfreeLevels => {
                format_sequence(&self.table.minfree_levels().collect::<Vec<_>>())
            }
            Param::DebugLevel => self.debug_level.to_string(),
            Param::FastRun => u8::from(self.fast_run).to_string(),
            Param::ReclaimCost => self.reclaim_cost.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Param {
    PriorityFloors,
    MinfreeLevels,
    DebugLevel,
    FastRun,
    ReclaimCost,
}

impl Param {
    pub const ALL: [Param; 5] = [
        Param::PriorityFloors,
        Param::MinfreeLevels,
        Param::DebugLevel,
        Param::FastRun,
        Param::ReclaimCost,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Param::PriorityFloors => "priority_floors",
            Param::MinfreeLevels => "minfree_levels",
            Param::DebugLevel => "debug_level",
            Param::FastRun => "fast_run",
            Param::ReclaimCost => "reclaim_cost",
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = config::Error;

    /// Accepts both the descriptive names and the short module parameter
    /// names (`adj`, `minfree`, `cost`, `lmk_fast_run`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "priority_floors" | "adj" => Ok(Param::PriorityFloors),
            "minfree_levels" | "minfree" => Ok(Param::MinfreeLevels),
            "debug_level" => Ok(Param::DebugLevel),
            "fast_run" | "lmk_fast_run" => Ok(Param::FastRun),
            "reclaim_cost" | "cost" => Ok(Param::ReclaimCost),
            other => Err(config::Error::UnknownParameter(other.to_owned())),
        }
    }
}

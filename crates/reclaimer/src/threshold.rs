#![forbid(unsafe_code)]

use crate::domain::Priority;
use config::Thresholds;

/// Maps the current memory estimate to the lowest priority that may be
/// killed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ThresholdTable {
    priority_floors: Vec<Priority>,
    minfree_levels: Vec<i64>,
}

impl ThresholdTable {
    /// Both sequences are kept as given; lookups only consult the rows
    /// present in both.
    pub fn new(priority_floors: Vec<Priority>, minfree_levels: Vec<u64>) -> Self {
        Self {
            priority_floors,
            minfree_levels: minfree_levels
                .into_iter()
                .map(|level| i64::try_from(level).unwrap_or(i64::MAX))
                .collect(),
        }
    }

    pub fn from_config(thresholds: &Thresholds) -> Self {
        Self::new(
            thresholds.priority_floors.clone(),
            thresholds.minfree_levels.clone(),
        )
    }

    pub fn rows(&self) -> usize {
        self.priority_floors.len().min(self.minfree_levels.len())
    }

    pub fn priority_floors(&self) -> &[Priority] {
        &self.priority_floors
    }

    pub fn minfree_levels(&self) -> impl Iterator<Item = u64> + '_ {
        self.minfree_levels.iter().map(|&level| level as u64)
    }

    pub fn set_priority_floors(&mut self, floors: Vec<Priority>) {
        self.priority_floors = floors;
    }

    pub fn set_minfree_levels(&mut self, levels: Vec<u64>) {
        *self = Self::new(std::mem::take(&mut self.priority_floors), levels);
    }

    /// The floor of the first row whose level is above both figures, or
    /// `None` when memory is above every level.
    pub fn floor_for(&self, free_pages: i64, file_pages: i64) -> Option<Priority> {
        (0..self.rows())
            .find(|&i| {
                let level = self.minfree_levels[i];
                free_pages < level && file_pages < level
            })
            .map(|i| self.priority_floors[i])
    }
}

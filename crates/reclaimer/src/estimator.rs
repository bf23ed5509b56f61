#![forbid(unsafe_code)]

use crate::domain::{GlobalCounters, ZoneCounters, ZoneKind};
use tracing::{trace, warn};

/// Pages that could relieve an allocation right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Estimate {
    pub free_pages: i64,
    pub file_pages: i64,
}

/// Turns raw page counters into the figures compared against the
/// threshold table.
///
/// Pages in zones the request cannot use are not relief. Pages in more
/// restrictive zones only count beyond the reserve those zones keep back
/// for the request's class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimator {
    fast_run: bool,
}

impl MemoryEstimator {
    pub fn new(fast_run: bool) -> Self {
        Self { fast_run }
    }

    /// `zones` is the fallback list of the node being reclaimed for, most
    /// permissive zone first.
    pub fn estimate(
        &self,
        global: &GlobalCounters,
        zones: &[ZoneCounters],
        highest_zone: ZoneKind,
        is_balancer: bool,
    ) -> Estimate {
        let mut estimate = Estimate {
            free_pages: global.free_pages,
            file_pages: global.reclaimable_file(),
        };

        let Some(preferred) = zones.iter().find(|zone| zone.kind <= highest_zone) else {
            return estimate;
        };
        let class = preferred.index;

        if is_balancer && preferred.is_balanced() {
            Self::adjust_for_zones(zones, class, &mut estimate, !self.fast_run);

            let top = top_kernel_zone(zones).unwrap_or(class);
            if preferred.watermark_ok(0, top) {
                estimate.free_pages -= preferred.reserve_for(top);
            } else {
                estimate.free_pages -= preferred.free_pages;
            }
            trace!(
                free = estimate.free_pages,
                file = estimate.file_pages,
                "balancer estimate"
            );
        } else {
            Self::adjust_for_zones(zones, class, &mut estimate, true);
            trace!(
                free = estimate.free_pages,
                file = estimate.file_pages,
                "allocation estimate"
            );
        }

        estimate
    }

    fn adjust_for_zones(
        zones: &[ZoneCounters],
        class: usize,
        estimate: &mut Estimate,
        subtract_file: bool,
    ) {
        for zone in zones {
            if zone.kind == ZoneKind::Movable {
                warn!(index = zone.index, "unexpected movable zone in fallback list");
                continue;
            }

            if zone.index > class {
                estimate.free_pages -= zone.free_pages;
                if subtract_file {
                    estimate.file_pages -= zone.reclaimable_file();
                }
            } else if zone.index < class {
                if zone.watermark_ok(0, class) {
                    estimate.free_pages -= zone.reserve_for(class);
                } else {
                    estimate.free_pages -= zone.free_pages;
                }
            }
        }
    }
}

/// Index of the highest zone the kernel itself allocates from.
fn top_kernel_zone(zones: &[ZoneCounters]) -> Option<usize> {
    let find = |kind| zones.iter().find(|zone| zone.kind == kind).map(|z| z.index);
    find(ZoneKind::HighMem).or_else(|| find(ZoneKind::Normal))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(kind: ZoneKind, index: usize, free: i64, file: i64, reserve: Vec<i64>) -> ZoneCounters {
        let mut zone = ZoneCounters::new(kind, index);
        zone.free_pages = free;
        zone.file_pages = file;
        zone.lowmem_reserve = reserve;
        zone
    }

    fn global(free: i64, file: i64, shared: i64) -> GlobalCounters {
        GlobalCounters {
            free_pages: free,
            file_pages: file,
            shared_pages: shared,
            ..Default::default()
        }
    }

    #[test]
    fn no_zones_means_raw_counters() {
        let estimator = MemoryEstimator::new(true);
        let estimate = estimator.estimate(&global(500, 300, 100), &[], ZoneKind::Normal, false);
        assert_eq!(
            estimate,
            Estimate {
                free_pages: 500,
                file_pages: 200
            }
        );
    }

    #[test]
    fn unusable_zones_are_subtracted() {
        // HighMem cannot serve a Normal request.
        let zones = vec![
            zone(ZoneKind::HighMem, 3, 4_000, 1_500, vec![0, 0, 0, 0]),
            zone(ZoneKind::Normal, 2, 2_000, 1_000, vec![0, 0, 0, 0]),
        ];
        let estimator = MemoryEstimator::new(true);
        let estimate =
            estimator.estimate(&global(6_000, 3_000, 500), &zones, ZoneKind::Normal, false);
        assert_eq!(estimate.free_pages, 2_000);
        assert_eq!(estimate.file_pages, 1_000);
    }

    #[test]
    fn restrictive_zones_give_up_their_reserve() {
        let zones = vec![
            zone(ZoneKind::Normal, 2, 5_000, 0, vec![0, 0, 0]),
            // Plenty of slack: only the reserve for class 2 is withheld.
            zone(ZoneKind::Dma32, 1, 3_000, 0, vec![0, 0, 1_000]),
            // Not enough slack: all of its free pages are withheld.
            zone(ZoneKind::Dma, 0, 200, 0, vec![0, 500, 800]),
        ];
        let estimator = MemoryEstimator::new(true);
        let estimate =
            estimator.estimate(&global(8_200, 0, 0), &zones, ZoneKind::Normal, false);
        assert_eq!(estimate.free_pages, 8_200 - 1_000 - 200);
        assert_eq!(estimate.file_pages, 0);
    }

    #[test]
    fn estimate_may_go_negative() {
        let zones = vec![
            zone(ZoneKind::HighMem, 3, 9_000, 9_000, vec![0; 4]),
            zone(ZoneKind::Normal, 2, 100, 0, vec![0; 4]),
        ];
        let estimator = MemoryEstimator::new(true);
        let estimate = estimator.estimate(&global(1_000, 500, 0), &zones, ZoneKind::Normal, false);
        assert_eq!(estimate.free_pages, -8_000);
        assert_eq!(estimate.file_pages, -8_500);
    }

    #[test]
    fn movable_zone_is_ignored() {
        let zones = vec![
            zone(ZoneKind::Movable, 3, 7_000, 7_000, vec![0; 4]),
            zone(ZoneKind::Normal, 2, 1_000, 100, vec![0; 4]),
        ];
        let estimator = MemoryEstimator::new(true);
        let estimate = estimator.estimate(&global(8_000, 7_100, 0), &zones, ZoneKind::Normal, false);
        assert_eq!(estimate.free_pages, 8_000);
        assert_eq!(estimate.file_pages, 7_100);
    }

    fn balanced_layout() -> Vec<ZoneCounters> {
        let mut normal = zone(ZoneKind::Normal, 2, 50_000, 10_000, vec![0, 0, 0, 0]);
        normal.high_watermark = 1_000;
        normal.low_watermark = 800;
        normal.present_pages = 100_000;
        let mut high = zone(ZoneKind::HighMem, 3, 5_000, 4_000, vec![0, 0, 0, 0]);
        high.shared_pages = 1_000;
        vec![high, normal]
    }

    #[test]
    fn balancer_fast_run_keeps_unusable_file_cache() {
        let zones = balanced_layout();
        let counters = global(55_000, 14_000, 1_000);

        let fast = MemoryEstimator::new(true).estimate(&counters, &zones, ZoneKind::Normal, true);
        assert_eq!(fast.free_pages, 55_000 - 5_000);
        assert_eq!(fast.file_pages, 13_000);

        let full = MemoryEstimator::new(false).estimate(&counters, &zones, ZoneKind::Normal, true);
        assert_eq!(full.free_pages, 55_000 - 5_000);
        assert_eq!(full.file_pages, 13_000 - 3_000);
    }

    #[test]
    fn balancer_withholds_preferred_reserve_for_top_zone() {
        let mut zones = balanced_layout();
        zones[1].lowmem_reserve = vec![0, 0, 0, 2_500];
        let counters = global(55_000, 14_000, 1_000);
        let estimate = MemoryEstimator::new(true).estimate(&counters, &zones, ZoneKind::Normal, true);
        assert_eq!(estimate.free_pages, 55_000 - 5_000 - 2_500);
    }

    #[test]
    fn unbalanced_zone_takes_full_path_for_balancer() {
        let mut zones = balanced_layout();
        zones[1].free_pages = 900;
        let counters = global(5_900, 14_000, 1_000);
        let estimate = MemoryEstimator::new(true).estimate(&counters, &zones, ZoneKind::Normal, true);
        assert_eq!(estimate.free_pages, 900);
        assert_eq!(estimate.file_pages, 10_000);
    }
}

#![forbid(unsafe_code)]

pub use config::ZoneKind;

/// Pages the background balancer reclaims per batch.
pub const SWAP_CLUSTER_MAX: i64 = 32;

/// Ratio used to derive the balance gap from a zone's present pages.
const BALANCE_GAP_RATIO: i64 = 100;

/// System wide page counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalCounters {
    pub free_pages: i64,
    pub file_pages: i64,
    pub shared_pages: i64,
    pub active_anon: i64,
    pub inactive_anon: i64,
    pub active_file: i64,
    pub inactive_file: i64,
}

impl GlobalCounters {
    /// File cache that is not shared memory.
    pub fn reclaimable_file(&self) -> i64 {
        self.file_pages - self.shared_pages
    }

    /// Everything on the LRU lists.
    pub fn lru_pages(&self) -> i64 {
        self.active_anon + self.inactive_anon + self.active_file + self.inactive_file
    }
}

/// Counters for a single zone of the node being reclaimed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneCounters {
    pub kind: ZoneKind,
    /// Position of the zone within its node; higher is less restrictive.
    pub index: usize,
    pub free_pages: i64,
    pub file_pages: i64,
    pub shared_pages: i64,
    pub present_pages: i64,
    pub min_watermark: i64,
    pub low_watermark: i64,
    pub high_watermark: i64,
    /// Pages held back from allocations whose preferred zone is at the
    /// given index.
    pub lowmem_reserve: Vec<i64>,
}

impl ZoneCounters {
    pub fn new(kind: ZoneKind, index: usize) -> Self {
        Self {
            kind,
            index,
            free_pages: 0,
            file_pages: 0,
            shared_pages: 0,
            present_pages: 0,
            min_watermark: 0,
            low_watermark: 0,
            high_watermark: 0,
            lowmem_reserve: Vec::new(),
        }
    }

    pub fn reclaimable_file(&self) -> i64 {
        self.file_pages - self.shared_pages
    }

    pub fn reserve_for(&self, class_index: usize) -> i64 {
        self.lowmem_reserve.get(class_index).copied().unwrap_or(0)
    }

    /// Whether the zone has more than `mark` free pages on top of the
    /// reserve kept for allocations preferring `class_index`.
    pub fn watermark_ok(&self, mark: i64, class_index: usize) -> bool {
        self.free_pages > mark + self.reserve_for(class_index)
    }

    pub fn balance_gap(&self) -> i64 {
        self.low_watermark
            .min((self.present_pages + BALANCE_GAP_RATIO - 1) / BALANCE_GAP_RATIO)
    }

    /// The zone is far enough above its high watermark that the balancer
    /// has nothing urgent to do.
    pub fn is_balanced(&self) -> bool {
        self.watermark_ok(self.high_watermark + SWAP_CLUSTER_MAX + self.balance_gap(), 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_accounts_for_reserve() {
        let mut zone = ZoneCounters::new(ZoneKind::Dma32, 1);
        zone.free_pages = 1_000;
        zone.lowmem_reserve = vec![0, 0, 900];
        assert!(zone.watermark_ok(50, 1));
        assert!(!zone.watermark_ok(150, 2));
        assert_eq!(zone.reserve_for(7), 0);
    }

    #[test]
    fn balance_gap_is_capped_by_low_watermark() {
        let mut zone = ZoneCounters::new(ZoneKind::Normal, 2);
        zone.present_pages = 100_001;
        zone.low_watermark = 2_000;
        assert_eq!(zone.balance_gap(), 1_001);
        zone.low_watermark = 10;
        assert_eq!(zone.balance_gap(), 10);
    }

    #[test]
    fn lru_sum() {
        let counters = GlobalCounters {
            active_anon: 1,
            inactive_anon: 2,
            active_file: 3,
            inactive_file: 4,
            ..Default::default()
        };
        assert_eq!(counters.lru_pages(), 10);
    }
}

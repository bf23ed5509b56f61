#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{
    CandidateFlags, CandidateId, CandidateRecord, ExecutionContext, Priority, RequestContext,
};
use crate::error::Error;
use crate::estimator::MemoryEstimator;
use crate::host::{MemoryCounters, ProcessHost};
use crate::index::PriorityIndex;
use crate::throttle::ThrottleState;
use crate::tunables::{Param, Tunables};
use crate::wait::Interrupted;
use config::Config;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace, warn};

/// The candidate chosen by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Victim {
    pub id: CandidateId,
    pub name: Arc<str>,
    pub priority: Priority,
    pub footprint: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReclaimAction {
    /// The caller is itself dying and was only marked.
    SelfExempt,
    /// Interrupted while waiting for the scan lock.
    Interrupted,
    /// Page counters could not be read.
    CountersUnavailable,
    /// No scan was requested or no threshold is crossed.
    Reported { floor: Option<Priority> },
    /// A scan ran and found nobody to kill.
    NoVictim { floor: Priority },
    /// A previous victim is still dying; nothing was killed.
    Throttled { pending: CandidateId },
    /// The victim could not be signalled.
    DeliveryFailed(Victim),
    /// The victim was signalled. `settled` is false when the pause after
    /// the kill was interrupted.
    Killed { victim: Victim, settled: bool },
}

/// What a reclaim call did, and the page figure it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReclaimOutcome {
    pub pages: i64,
    pub action: ReclaimAction,
}

impl ReclaimOutcome {
    fn new(pages: i64, action: ReclaimAction) -> Self {
        Self { pages, action }
    }
}

#[derive(Debug, Default)]
struct Stats {
    scans: AtomicU64,
    kills: AtomicU64,
    throttled: AtomicU64,
    interrupted: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub scans: u64,
    pub kills: u64,
    pub throttled: u64,
    pub interrupted: u64,
}

enum ScanResult {
    Victim(Victim),
    Pending(CandidateId),
    Exhausted,
}

/// The reclaim entry point.
///
/// Callers may come from any thread. Calls with a positive scan budget are
/// serialised by one lock; calls without a budget only report pressure and
/// never block.
pub struct LowMemoryKiller {
    index: PriorityIndex,
    tunables: RwLock<Tunables>,
    throttle: ThrottleState,
    scan_lock: Mutex<()>,
    host: Arc<dyn ProcessHost>,
    counters: Arc<dyn MemoryCounters>,
    clock: Arc<dyn Clock>,
    stats: Stats,
}

impl LowMemoryKiller {
    pub fn new(
        tunables: Tunables,
        host: Arc<dyn ProcessHost>,
        counters: Arc<dyn MemoryCounters>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            index: PriorityIndex::new(),
            tunables: RwLock::new(tunables),
            throttle: ThrottleState::new(),
            scan_lock: Mutex::new(()),
            host,
            counters,
            clock,
            stats: Stats::default(),
        }
    }

    pub fn register_candidate(&self, record: CandidateRecord) -> Result<(), Error> {
        self.index.insert(record)
    }

    pub fn unregister_candidate(&self, id: CandidateId) -> Result<CandidateRecord, Error> {
        self.index.remove(id)
    }

    pub fn index(&self) -> &PriorityIndex {
        &self.index
    }

    pub fn tunables(&self) -> Tunables {
        self.tunables.read().clone()
    }

    /// Replace every tunable from a configuration.
    pub fn apply_config(&self, config: &Config) -> Result<(), Error> {
        config.validate()?;
        *self.tunables.write() = Tunables::from_config(config);
        Ok(())
    }

    pub fn write_param(&self, param: Param, value: &str) -> Result<(), Error> {
        let mut tunables = self.tunables.write();
        let mut staged = tunables.clone();
        staged.write(param, value)?;
        *tunables = staged;
        Ok(())
    }

    pub fn read_param(&self, param: Param) -> String {
        self.tunables.read().read(param)
    }

    pub fn throttle_deadline(&self) -> Option<Instant> {
        self.throttle.deadline()
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            scans: self.stats.scans.load(Ordering::Relaxed),
            kills: self.stats.kills.load(Ordering::Relaxed),
            throttled: self.stats.throttled.load(Ordering::Relaxed),
            interrupted: self.stats.interrupted.load(Ordering::Relaxed),
        }
    }

    /// Reclaim callback. With `scan_budget <= 0` only the reclaimable page
    /// estimate is returned; otherwise a victim may be killed.
    pub fn reclaim(&self, scan_budget: i64, request: &RequestContext) -> i64 {
        self.reclaim_detailed(scan_budget, request).pages
    }

    pub fn reclaim_detailed(&self, scan_budget: i64, request: &RequestContext) -> ReclaimOutcome {
        let caller = self.host.current_context();
        if caller.is_self_dying {
            if let Some(id) = caller.candidate {
                self.host.mark_dying(id);
            }
            return ReclaimOutcome::new(0, ReclaimAction::SelfExempt);
        }

        let _serial = if scan_budget > 0 {
            match request.interrupt.lock(&self.scan_lock) {
                Ok(guard) => Some(guard),
                Err(Interrupted) => {
                    self.stats.interrupted.fetch_add(1, Ordering::Relaxed);
                    return ReclaimOutcome::new(0, ReclaimAction::Interrupted);
                }
            }
        } else {
            None
        };

        let tunables = self.tunables();
        let global = match self.counters.global() {
            Ok(global) => global,
            Err(err) => {
                warn!(%err, "failed to read page counters");
                return ReclaimOutcome::new(0, ReclaimAction::CountersUnavailable);
            }
        };
        let zones = self.counters.zones().unwrap_or_else(|err| {
            warn!(%err, "failed to read zone counters, using global figures");
            Vec::new()
        });

        let estimate = MemoryEstimator::new(tunables.fast_run).estimate(
            &global,
            &zones,
            request.highest_zone,
            caller.is_background_balancer,
        );
        let floor = tunables
            .table
            .floor_for(estimate.free_pages, estimate.file_pages);
        if scan_budget > 0 && tunables.verbose(3) {
            debug!(
                scan_budget,
                free = estimate.free_pages,
                file = estimate.file_pages,
                ?floor,
                "reclaim pass"
            );
        }

        let pressure = global.lru_pages();
        let Some(min_priority) = floor.filter(|_| scan_budget > 0) else {
            if tunables.verbose(5) {
                trace!(scan_budget, pressure, "reporting pressure");
            }
            return ReclaimOutcome::new(pressure, ReclaimAction::Reported { floor });
        };

        self.stats.scans.fetch_add(1, Ordering::Relaxed);
        match self.select(min_priority, &tunables, &caller) {
            ScanResult::Pending(id) => {
                self.stats.throttled.fetch_add(1, Ordering::Relaxed);
                if caller.is(id) {
                    self.host.mark_dying(id);
                } else if request.interrupt.sleep(tunables.settle_pause).is_err() {
                    self.stats.interrupted.fetch_add(1, Ordering::Relaxed);
                }
                ReclaimOutcome::new(0, ReclaimAction::Throttled { pending: id })
            }
            ScanResult::Exhausted => {
                if tunables.verbose(4) {
                    trace!(pressure, floor = min_priority, "no victim found");
                }
                ReclaimOutcome::new(pressure, ReclaimAction::NoVictim { floor: min_priority })
            }
            ScanResult::Victim(victim) => self.kill(victim, pressure, &tunables, request),
        }
    }

    /// Walk the index most killable first and pick the victim.
    fn select(
        &self,
        floor: Priority,
        tunables: &Tunables,
        caller: &ExecutionContext,
    ) -> ScanResult {
        let throttled = self.throttle.is_active(self.clock.now());
        let mut best: Option<Victim> = None;

        for node in self.index.scan() {
            let Some(state) = self.host.probe(node.id()) else {
                continue;
            };
            if state
                .flags
                .intersects(CandidateFlags::KERNEL_HELPER | CandidateFlags::MEMORY_RELEASED)
            {
                continue;
            }

            if throttled && state.flags.contains(CandidateFlags::DEATH_MARKED) {
                if tunables.verbose(2) {
                    debug!(
                        pid = %node.id(),
                        own = caller.is(node.id()),
                        "previous victim still dying"
                    );
                }
                return ScanResult::Pending(node.id());
            }

            let priority = node.priority();
            if priority < floor {
                break;
            }

            if state.is_dying() {
                if tunables.verbose(2) {
                    debug!(pid = %node.id(), "skip slow dying process");
                }
                continue;
            }

            if state.footprint <= 0 {
                continue;
            }

            if let Some(current) = &best {
                if priority < current.priority {
                    break;
                }
                if priority == current.priority && state.footprint <= current.footprint {
                    continue;
                }
            }

            let record = node.record();
            if tunables.verbose(2) {
                debug!(
                    pid = %record.id,
                    name = %record.name,
                    priority,
                    footprint = state.footprint,
                    "select to kill"
                );
            }
            best = Some(Victim {
                id: record.id,
                name: Arc::clone(&record.name),
                priority,
                footprint: state.footprint,
            });
        }

        best.map_or(ScanResult::Exhausted, ScanResult::Victim)
    }

    fn kill(
        &self,
        victim: Victim,
        pressure: i64,
        tunables: &Tunables,
        request: &RequestContext,
    ) -> ReclaimOutcome {
        if tunables.verbose(1) {
            info!(
                pid = %victim.id,
                name = %victim.name,
                priority = victim.priority,
                footprint = victim.footprint,
                "sending SIGKILL"
            );
        }
        if let Err(err) = self.host.deliver_termination(victim.id) {
            warn!(pid = %victim.id, %err, "failed to terminate victim");
            return ReclaimOutcome::new(pressure, ReclaimAction::DeliveryFailed(victim));
        }
        self.host.mark_dying(victim.id);
        self.throttle.arm(self.clock.now(), tunables.grace_window);
        self.stats.kills.fetch_add(1, Ordering::Relaxed);

        let remaining = pressure - victim.footprint;
        match request.interrupt.sleep(tunables.settle_pause) {
            Ok(()) => ReclaimOutcome::new(
                remaining,
                ReclaimAction::Killed {
                    victim,
                    settled: true,
                },
            ),
            Err(Interrupted) => {
                self.stats.interrupted.fetch_add(1, Ordering::Relaxed);
                ReclaimOutcome::new(
                    0,
                    ReclaimAction::Killed {
                        victim,
                        settled: false,
                    },
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::domain::{CandidateState, GlobalCounters, ZoneCounters, ZoneKind};
    use proptest::prelude::*;
    use rustc_hash::FxHashMap;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeHost {
        states: Mutex<FxHashMap<CandidateId, CandidateState>>,
        probes: AtomicU64,
        killed: Mutex<Vec<CandidateId>>,
        context: Mutex<ExecutionContext>,
    }

    impl FakeHost {
        fn set(&self, id: u32, footprint: i64, flags: CandidateFlags) {
            self.states
                .lock()
                .insert(CandidateId(id), CandidateState { flags, footprint });
        }
    }

    impl ProcessHost for FakeHost {
        fn probe(&self, id: CandidateId) -> Option<CandidateState> {
            self.probes.fetch_add(1, Ordering::SeqCst);
            self.states.lock().get(&id).copied()
        }

        fn deliver_termination(&self, id: CandidateId) -> Result<(), Error> {
            self.killed.lock().push(id);
            Ok(())
        }

        fn mark_dying(&self, id: CandidateId) {
            if let Some(state) = self.states.lock().get_mut(&id) {
                state.flags |= CandidateFlags::DEATH_MARKED;
            }
        }

        fn current_context(&self) -> ExecutionContext {
            *self.context.lock()
        }
    }

    struct FixedCounters(GlobalCounters);

    impl MemoryCounters for FixedCounters {
        fn global(&self) -> Result<GlobalCounters, Error> {
            Ok(self.0)
        }

        fn zones(&self) -> Result<Vec<ZoneCounters>, Error> {
            Ok(Vec::new())
        }
    }

    fn counters(free: i64) -> GlobalCounters {
        GlobalCounters {
            free_pages: free,
            file_pages: free,
            active_anon: 400,
            inactive_anon: 300,
            active_file: 200,
            inactive_file: 100,
            ..Default::default()
        }
    }

    fn killer(host: Arc<FakeHost>, free: i64) -> (LowMemoryKiller, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let mut tunables = Tunables::default();
        tunables.settle_pause = Duration::ZERO;
        let killer = LowMemoryKiller::new(
            tunables,
            host,
            Arc::new(FixedCounters(counters(free))),
            clock.clone(),
        );
        (killer, clock)
    }

    fn add(killer: &LowMemoryKiller, host: &FakeHost, id: u32, priority: Priority, footprint: i64) {
        host.set(id, footprint, CandidateFlags::empty());
        killer
            .register_candidate(CandidateRecord::new(CandidateId(id), priority, format!("p{id}")))
            .unwrap();
    }

    fn request() -> RequestContext {
        RequestContext::new(ZoneKind::Normal)
    }

    #[test]
    fn zero_budget_reports_lru_pages() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100);
        add(&killer, &host, 1, 15, 500);
        let outcome = killer.reclaim_detailed(0, &request());
        assert_eq!(outcome.pages, 1_000);
        assert_eq!(outcome.action, ReclaimAction::Reported { floor: Some(0) });
        assert!(host.killed.lock().is_empty());
    }

    #[test]
    fn no_threshold_crossed_reports_pressure() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100_000);
        add(&killer, &host, 1, 15, 500);
        let outcome = killer.reclaim_detailed(128, &request());
        assert_eq!(outcome.pages, 1_000);
        assert_eq!(outcome.action, ReclaimAction::Reported { floor: None });
    }

    #[test]
    fn empty_index_is_a_noop() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host, 100);
        let outcome = killer.reclaim_detailed(128, &request());
        assert_eq!(outcome.pages, 1_000);
        assert_eq!(outcome.action, ReclaimAction::NoVictim { floor: 0 });
    }

    #[test]
    fn kill_subtracts_footprint_and_may_go_negative() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100);
        add(&killer, &host, 1, 15, 1_500);
        let outcome = killer.reclaim_detailed(128, &request());
        assert_eq!(outcome.pages, -500);
        assert!(matches!(outcome.action, ReclaimAction::Killed { settled: true, .. }));
        assert_eq!(*host.killed.lock(), vec![CandidateId(1)]);
        assert_eq!(killer.stats().kills, 1);
    }

    #[test]
    fn dying_caller_exempts_itself() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100);
        add(&killer, &host, 9, 15, 500);
        *host.context.lock() = ExecutionContext {
            candidate: Some(CandidateId(9)),
            is_self_dying: true,
            is_background_balancer: false,
        };
        let outcome = killer.reclaim_detailed(128, &request());
        assert_eq!(outcome, ReclaimOutcome::new(0, ReclaimAction::SelfExempt));
        let state = host.probe(CandidateId(9)).unwrap();
        assert!(state.flags.contains(CandidateFlags::DEATH_MARKED));
        assert!(host.killed.lock().is_empty());
    }

    #[test]
    fn interrupted_lock_returns_zero() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100);
        add(&killer, &host, 1, 15, 500);
        let request = request();
        request.interrupt.raise();
        let _held = killer.scan_lock.lock();
        let outcome = killer.reclaim_detailed(128, &request);
        assert_eq!(outcome, ReclaimOutcome::new(0, ReclaimAction::Interrupted));
        // Zero budget never touches the lock.
        assert_eq!(killer.reclaim(0, &request), 1_000);
    }

    #[test]
    fn throttled_caller_that_is_the_victim_marks_itself() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host.clone(), 100);
        add(&killer, &host, 1, 15, 500);
        add(&killer, &host, 2, 12, 500);
        assert!(matches!(
            killer.reclaim_detailed(128, &request()).action,
            ReclaimAction::Killed { .. }
        ));

        *host.context.lock() = ExecutionContext {
            candidate: Some(CandidateId(1)),
            ..Default::default()
        };
        let outcome = killer.reclaim_detailed(128, &request());
        assert_eq!(
            outcome,
            ReclaimOutcome::new(
                0,
                ReclaimAction::Throttled {
                    pending: CandidateId(1)
                }
            )
        );
        assert_eq!(host.killed.lock().len(), 1);
    }

    #[test]
    fn write_param_is_atomic() {
        let host = Arc::new(FakeHost::default());
        let (killer, _) = killer(host, 100);
        assert!(killer.write_param(Param::MinfreeLevels, "1,x").is_err());
        assert_eq!(killer.read_param(Param::MinfreeLevels), "1536,2048,4096,16384");
        killer.write_param(Param::MinfreeLevels, "50").unwrap();
        assert_eq!(killer.read_param(Param::MinfreeLevels), "50");
    }

    /// Reference selection over candidates in kill order.
    fn reference(candidates: &[(Priority, i64)], floor: Priority) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, &(priority, footprint)) in candidates.iter().enumerate() {
            if priority < floor {
                break;
            }
            if footprint <= 0 {
                continue;
            }
            if let Some(b) = best {
                let (bp, bf) = candidates[b];
                if priority < bp {
                    break;
                }
                if priority == bp && footprint <= bf {
                    continue;
                }
            }
            best = Some(i);
        }
        best
    }

    proptest! {
        #[test]
        fn selection_matches_reference(
            raw in prop::collection::vec((0i32..20, -5i64..2_000), 1..40),
        ) {
            let host = Arc::new(FakeHost::default());
            // free = 1_000 lands on the first row: floor 0.
            let (killer, _) = killer(host.clone(), 1_000);
            for (i, (priority, footprint)) in raw.iter().enumerate() {
                add(&killer, &host, i as u32, *priority, *footprint);
            }

            let order: Vec<_> = killer.index().snapshot();
            let in_order: Vec<_> = order
                .iter()
                .map(|r| (r.priority, raw[r.id.as_raw() as usize].1))
                .collect();
            let expected = reference(&in_order, 0).map(|i| order[i].id);

            let outcome = killer.reclaim_detailed(128, &request());
            match (&outcome.action, expected) {
                (ReclaimAction::Killed { victim, .. }, Some(id)) => prop_assert_eq!(victim.id, id),
                (ReclaimAction::NoVictim { .. }, None) => {}
                (action, expected) => prop_assert!(false, "{action:?} vs {expected:?}"),
            }
        }

        #[test]
        fn scan_stops_after_first_less_killable_candidate(
            tiers in prop::collection::vec(1i64..500, 1..10),
            rest in prop::collection::vec(1i64..500, 1..10),
        ) {
            let host = Arc::new(FakeHost::default());
            let (killer, _) = killer(host.clone(), 1_000);
            let mut id = 0;
            for footprint in &tiers {
                add(&killer, &host, id, 15, *footprint);
                id += 1;
            }
            for footprint in &rest {
                add(&killer, &host, id, 6, *footprint);
                id += 1;
            }
            killer.reclaim(128, &request());
            // Every top-tier candidate plus the first lower-tier one.
            prop_assert_eq!(
                host.probes.load(Ordering::SeqCst),
                tiers.len() as u64 + 1
            );
        }
    }
}

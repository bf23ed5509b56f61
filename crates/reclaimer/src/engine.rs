#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{CandidateId, CandidateRecord, Priority, RequestContext};
use crate::error::Error;
use crate::host::ProcessSource;
use crate::selector::{LowMemoryKiller, ReclaimOutcome};
use crate::wait::Interrupt;
use config::Config;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Scan budget one pressure notification translates to, the way the
/// kernel sizes a shrinker call: four times the scanned pages, divided by
/// the cost of recreating what is reclaimed.
pub fn shrink_budget(count: i64, reclaim_cost: u32) -> i64 {
    if count <= 0 {
        return 0;
    }
    count.saturating_mul(4) / i64::from(reclaim_cost.max(1))
}

pub struct Services {
    pub killer: Arc<LowMemoryKiller>,
    pub source: Arc<dyn ProcessSource>,
    pub clock: Arc<dyn Clock>,
}

pub enum ControlEvent {
    Reload(Box<Config>),
    DumpStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub registered: usize,
    pub unregistered: usize,
    pub rekeyed: usize,
}

#[derive(Debug, Clone)]
pub struct TickReport {
    pub tick_id: u64,
    pub sync: SyncReport,
    /// Pages reported by the sizing call.
    pub pressure: i64,
    pub budget: i64,
    /// Outcome of the scanning call, when the budget allowed one.
    pub outcome: Option<ReclaimOutcome>,
}

/// Polling stand-in for a shrinker registration: keeps the killer's
/// registry in step with the process table and feeds it pressure.
pub struct ReclaimEngine {
    config: Config,
    services: Services,
    registered: FxHashMap<CandidateId, Priority>,
    interrupt: Interrupt,
    tick_id: u64,
}

impl ReclaimEngine {
    pub fn new(config: Config, services: Services) -> Self {
        Self {
            config,
            services,
            registered: FxHashMap::default(),
            interrupt: Interrupt::default(),
            tick_id: 0,
        }
    }

    pub fn killer(&self) -> &Arc<LowMemoryKiller> {
        &self.services.killer
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The interrupt handed to every reclaim call of this engine.
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Sync the registry, size the pass, then run it.
    pub async fn tick(&mut self) -> Result<TickReport, Error> {
        self.tick_id = self.tick_id.saturating_add(1);
        let sync = self.sync_registry()?;

        let pressure = self.shrink(0).await?.pages;
        let budget = shrink_budget(pressure, self.services.killer.tunables().reclaim_cost);
        let outcome = if budget > 0 {
            Some(self.shrink(budget).await?)
        } else {
            None
        };

        let report = TickReport {
            tick_id: self.tick_id,
            sync,
            pressure,
            budget,
            outcome,
        };
        trace!(?report, "tick finished");
        Ok(report)
    }

    /// Run ticks every `poll_interval` until `cancel` fires.
    pub async fn run_until(
        &mut self,
        cancel: CancellationToken,
        mut control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    ) -> Result<(), Error> {
        loop {
            let tick_start = self.services.clock.now();
            let mut did_tick = false;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Cut any settle pause still running on the blocking pool.
                    self.interrupt.raise();
                    info!("shutdown requested");
                    break;
                }
                Some(event) = control_rx.recv() => {
                    self.handle_control(event);
                }
                result = self.tick() => {
                    if let Err(err) = result {
                        warn!(%err, "reclaim tick failed");
                    }
                    did_tick = true;
                }
            }

            if did_tick {
                let elapsed = self.services.clock.now().saturating_duration_since(tick_start);
                if let Some(remaining) = self.config.daemon.poll_interval.checked_sub(elapsed) {
                    tokio::select! {
                        _ = cancel.cancelled() => continue,
                        _ = self.services.clock.sleep(remaining) => {}
                    }
                }
            }
        }

        Ok(())
    }

    async fn shrink(&self, scan_budget: i64) -> Result<ReclaimOutcome, Error> {
        let killer = Arc::clone(&self.services.killer);
        let request = RequestContext::new(self.config.daemon.request_zone)
            .with_interrupt(self.interrupt.clone());
        // Reclaim may sleep on a condition variable; keep it off the runtime.
        let outcome =
            tokio::task::spawn_blocking(move || killer.reclaim_detailed(scan_budget, &request))
                .await?;
        Ok(outcome)
    }

    /// Register new processes, drop departed ones and re-key those whose
    /// priority changed.
    fn sync_registry(&mut self) -> Result<SyncReport, Error> {
        let entries = self.services.source.snapshot()?;
        let killer = &self.services.killer;
        let mut report = SyncReport::default();
        let mut seen = FxHashSet::default();

        for entry in entries {
            seen.insert(entry.id);
            match self.registered.get(&entry.id) {
                Some(&priority) if priority == entry.priority => continue,
                Some(_) => {
                    if let Err(err) = killer.unregister_candidate(entry.id) {
                        warn!(pid = %entry.id, %err, "stale registration");
                    }
                    report.rekeyed += 1;
                }
                None => report.registered += 1,
            }
            let record = CandidateRecord::new(entry.id, entry.priority, entry.name);
            match killer.register_candidate(record) {
                Ok(()) => {
                    self.registered.insert(entry.id, entry.priority);
                }
                Err(err) => {
                    warn!(pid = %entry.id, %err, "failed to register candidate");
                    self.registered.remove(&entry.id);
                }
            }
        }

        let gone: Vec<_> = self
            .registered
            .keys()
            .filter(|id| !seen.contains(id))
            .copied()
            .collect();
        for id in gone {
            self.registered.remove(&id);
            if let Err(err) = killer.unregister_candidate(id) {
                warn!(pid = %id, %err, "failed to unregister candidate");
            }
            report.unregistered += 1;
        }

        if report != SyncReport::default() {
            debug!(?report, total = self.registered.len(), "registry synced");
        }
        Ok(report)
    }

    fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Reload(config) => self.apply_reload(*config),
            ControlEvent::DumpStatus => self.dump_status(),
        }
    }

    fn apply_reload(&mut self, config: Config) {
        if let Err(err) = self.services.killer.apply_config(&config) {
            warn!(%err, "rejecting reloaded config");
            return;
        }
        if config.daemon.dry_run != self.config.daemon.dry_run
            || config.daemon.background_balancer != self.config.daemon.background_balancer
        {
            warn!(
                dry_run = config.daemon.dry_run,
                background_balancer = config.daemon.background_balancer,
                "host settings take effect on restart"
            );
        }
        self.config = config;
        info!("config reloaded");
    }

    fn dump_status(&self) {
        let killer = &self.services.killer;
        let stats = killer.stats();
        let deadline = killer
            .throttle_deadline()
            .map(|deadline| deadline.saturating_duration_since(self.services.clock.now()));

        info!(?self.config, "current config");
        info!(
            registered = killer.index().len(),
            ticks = self.tick_id,
            scans = stats.scans,
            kills = stats.kills,
            throttled = stats.throttled,
            interrupted = stats.interrupted,
            throttle_remaining = ?deadline,
            "reclaim status"
        );
    }
}

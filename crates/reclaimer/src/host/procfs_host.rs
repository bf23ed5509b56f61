#![forbid(unsafe_code)]

use super::{MemoryCounters, ProcessEntry, ProcessHost, ProcessSource, parse_zoneinfo};
use crate::domain::{
    CandidateFlags, CandidateId, CandidateState, ExecutionContext, GlobalCounters, Priority,
    ZoneCounters, ZoneKind,
};
use crate::error::Error;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use parking_lot::Mutex;
use procfs::process::Process;
use procfs::{Current, Meminfo, page_size};
use rustc_hash::FxHashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, trace, warn};

const ZONEINFO: &str = "/proc/zoneinfo";

/// Task is exiting.
const PF_EXITING: u32 = 0x0000_0004;
/// Task is a kernel thread.
const PF_KTHREAD: u32 = 0x0020_0000;
/// Bit of SIGKILL (9) in the pending signal masks of `/proc/<pid>/status`.
const SIGKILL_PENDING: u64 = 1 << 8;

const OOM_SCORE_ADJ_MAX: i32 = 1000;
const OOM_ADJUST_MAX: Priority = 15;
const OOM_DISABLE: Priority = -17;

/// Map an `oom_score_adj` (-1000..=1000) onto the legacy `oom_adj` scale
/// (-17..=15) that priority floors are expressed in. Rounds toward zero
/// the same way `/proc/<pid>/oom_adj` reports it.
pub fn oom_adj_from_score_adj(score_adj: i16) -> Priority {
    let score_adj = i32::from(score_adj).clamp(-OOM_SCORE_ADJ_MAX, OOM_SCORE_ADJ_MAX);
    if score_adj == OOM_SCORE_ADJ_MAX {
        return OOM_ADJUST_MAX;
    }
    score_adj * -OOM_DISABLE / OOM_SCORE_ADJ_MAX
}

/// Linux implementation of every host seam, backed by `/proc` and
/// `kill(2)`.
#[derive(Debug)]
pub struct ProcfsHost {
    own_pid: u32,
    dry_run: bool,
    background_balancer: bool,
    page_size: i64,
    marked: Mutex<FxHashSet<CandidateId>>,
}

impl ProcfsHost {
    pub fn new(dry_run: bool, background_balancer: bool) -> Self {
        Self {
            own_pid: std::process::id(),
            dry_run,
            background_balancer,
            page_size: page_size() as i64,
            marked: Mutex::new(FxHashSet::default()),
        }
    }

    fn pages(&self, bytes: u64) -> i64 {
        bytes as i64 / self.page_size
    }

    fn required(&self, value: Option<u64>, field: &'static str) -> Result<i64, Error> {
        value
            .map(|bytes| self.pages(bytes))
            .ok_or(Error::MeminfoFieldMissing(field))
    }

    fn state_of(&self, id: CandidateId) -> Option<CandidateState> {
        let process = Process::new(id.as_raw() as i32).ok()?;
        let stat = process.stat().ok()?;

        let pending = process
            .status()
            .map(|status| status.sigpnd | status.shdpnd)
            .unwrap_or(0);
        let mut flags = task_flags(stat.flags, stat.state, pending);
        if self.marked.lock().contains(&id) {
            flags |= CandidateFlags::DEATH_MARKED;
        }

        Some(CandidateState {
            flags,
            footprint: stat.rss as i64,
        })
    }
}

/// Candidate flags implied by a task's `stat` flags, its state letter and
/// its pending signal mask.
fn task_flags(stat_flags: u32, state: char, pending: u64) -> CandidateFlags {
    let mut flags = CandidateFlags::empty();
    if stat_flags & PF_KTHREAD != 0 {
        flags |= CandidateFlags::KERNEL_HELPER;
    }
    if stat_flags & PF_EXITING != 0 {
        flags |= CandidateFlags::EXITING;
    }
    if matches!(state, 'Z' | 'X') {
        flags |= CandidateFlags::EXITING | CandidateFlags::MEMORY_RELEASED;
    }
    if pending & SIGKILL_PENDING != 0 {
        flags |= CandidateFlags::KILL_PENDING;
    }
    flags
}

impl MemoryCounters for ProcfsHost {
    fn global(&self) -> Result<GlobalCounters, Error> {
        let mem = Meminfo::current()?;
        Ok(GlobalCounters {
            free_pages: self.pages(mem.mem_free),
            file_pages: self.pages(mem.cached + mem.buffers + mem.swap_cached),
            shared_pages: self.required(mem.shmem, "Shmem")?,
            active_anon: self.required(mem.active_anon, "Active(anon)")?,
            inactive_anon: self.required(mem.inactive_anon, "Inactive(anon)")?,
            active_file: self.required(mem.active_file, "Active(file)")?,
            inactive_file: self.required(mem.inactive_file, "Inactive(file)")?,
        })
    }

    fn zones(&self) -> Result<Vec<ZoneCounters>, Error> {
        let text = std::fs::read_to_string(ZONEINFO).map_err(|source| Error::Io {
            path: PathBuf::from(ZONEINFO),
            source,
        })?;
        let mut zones: Vec<_> = parse_zoneinfo(&text, 0)?
            .into_iter()
            .filter(|zone| zone.present_pages > 0 && zone.kind != ZoneKind::Device)
            .collect();
        // Fallback order: most permissive zone first.
        zones.reverse();
        Ok(zones)
    }
}

impl ProcessHost for ProcfsHost {
    fn probe(&self, id: CandidateId) -> Option<CandidateState> {
        self.state_of(id)
    }

    fn deliver_termination(&self, id: CandidateId) -> Result<(), Error> {
        if self.dry_run {
            info!(pid = %id, "dry run, not sending SIGKILL");
            return Ok(());
        }
        kill(Pid::from_raw(id.as_raw() as i32), Signal::SIGKILL)?;
        Ok(())
    }

    fn mark_dying(&self, id: CandidateId) {
        self.marked.lock().insert(id);
    }

    fn current_context(&self) -> ExecutionContext {
        ExecutionContext {
            candidate: Some(CandidateId(self.own_pid)),
            is_self_dying: false,
            is_background_balancer: self.background_balancer,
        }
    }
}

impl ProcessSource for ProcfsHost {
    fn snapshot(&self) -> Result<Vec<ProcessEntry>, Error> {
        let mut entries = Vec::new();
        for process in procfs::process::all_processes()? {
            let process = match process {
                Ok(p) => p,
                Err(err) => {
                    warn!(?err, "failed to read process entry");
                    continue;
                }
            };
            let pid = process.pid as u32;
            if pid == self.own_pid {
                continue;
            }
            // Processes routinely vanish between listing and reading.
            let Ok(stat) = process.stat() else {
                continue;
            };
            if stat.flags & PF_KTHREAD != 0 {
                continue;
            }
            let Ok(score_adj) = process.oom_score_adj() else {
                continue;
            };
            entries.push(ProcessEntry {
                id: CandidateId(pid),
                priority: oom_adj_from_score_adj(score_adj),
                name: Arc::from(stat.comm.as_str()),
            });
        }

        let alive: FxHashSet<_> = entries.iter().map(|entry| entry.id).collect();
        self.marked.lock().retain(|id| alive.contains(id));

        trace!(count = entries.len(), "process snapshot collected");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn score_adj_maps_onto_oom_adj_scale() {
        assert_eq!(oom_adj_from_score_adj(-1000), -17);
        assert_eq!(oom_adj_from_score_adj(0), 0);
        assert_eq!(oom_adj_from_score_adj(58), 0);
        assert_eq!(oom_adj_from_score_adj(59), 1);
        assert_eq!(oom_adj_from_score_adj(300), 5);
        assert_eq!(oom_adj_from_score_adj(353), 6);
        assert_eq!(oom_adj_from_score_adj(999), 16);
        assert_eq!(oom_adj_from_score_adj(1000), 15);
    }

    #[test]
    fn task_flags_follow_stat_and_status() {
        assert_eq!(task_flags(0, 'S', 0), CandidateFlags::empty());
        assert_eq!(
            task_flags(PF_KTHREAD, 'I', 0),
            CandidateFlags::KERNEL_HELPER
        );
        assert_eq!(task_flags(PF_EXITING, 'R', 0), CandidateFlags::EXITING);
        assert_eq!(
            task_flags(0, 'Z', 0),
            CandidateFlags::EXITING | CandidateFlags::MEMORY_RELEASED
        );
        // SIGKILL is signal 9; SIGTERM (15) alone is not a pending kill.
        assert_eq!(task_flags(0, 'S', 0x100), CandidateFlags::KILL_PENDING);
        assert_eq!(task_flags(0, 'S', 1 << 14), CandidateFlags::empty());
    }

    #[test]
    fn perceptible_tier_stays_below_default_floor() {
        // Values in 100..=352 must not reach the floor of 6.
        for score_adj in 100..=352 {
            assert!(oom_adj_from_score_adj(score_adj) < 6, "{score_adj}");
        }
    }
}

#![forbid(unsafe_code)]
#![cfg(target_os = "linux")]

use procfs::{Current, Meminfo, page_size};
use reclaimer::{
    CandidateFlags, CandidateId, CandidateState, MemoryCounters, ProcessEntry, ProcessHost,
    ProcessSource, ProcfsHost,
};
use std::process::{Child, Command};
use std::thread::sleep;
use std::time::{Duration, Instant};

fn spawn_sleeper() -> Child {
    Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep")
}

fn id_of(child: &Child) -> CandidateId {
    CandidateId(child.id())
}

fn poll<T>(mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if let Some(value) = check() {
            return Some(value);
        }
        sleep(Duration::from_millis(20));
    }
    None
}

fn entry_for(host: &ProcfsHost, id: CandidateId) -> Option<ProcessEntry> {
    host.snapshot()
        .unwrap()
        .into_iter()
        .find(|entry| entry.id == id && &*entry.name == "sleep")
}

#[test]
fn snapshot_ranks_children_on_oom_adj_scale() {
    let host = ProcfsHost::new(false, false);
    let mut child = spawn_sleeper();
    std::fs::write(format!("/proc/{}/oom_score_adj", child.id()), "300")
        .expect("raise oom_score_adj");

    let entry = poll(|| entry_for(&host, id_of(&child))).expect("child in snapshot");
    // 300 * 17 / 1000, below the default floor of 6.
    assert_eq!(entry.priority, 5);

    let own = CandidateId(std::process::id());
    assert!(host.snapshot().unwrap().iter().all(|entry| entry.id != own));

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn probe_follows_a_child_until_reaped() {
    let host = ProcfsHost::new(false, false);
    let mut child = spawn_sleeper();
    let id = id_of(&child);

    let state = host.probe(id).expect("live child");
    assert!(!state.flags.contains(CandidateFlags::KERNEL_HELPER));
    assert!(!state.is_dying());

    // The mark survives a snapshot while the process is alive.
    host.mark_dying(id);
    host.snapshot().unwrap();
    let state = host.probe(id).expect("live child");
    assert!(state.flags.contains(CandidateFlags::DEATH_MARKED));

    host.deliver_termination(id).unwrap();
    let zombie: CandidateState = poll(|| {
        host.probe(id)
            .filter(|state| state.flags.contains(CandidateFlags::MEMORY_RELEASED))
    })
    .expect("child becomes a zombie");
    assert!(zombie.flags.contains(CandidateFlags::EXITING));
    assert!(zombie.is_dying());

    child.wait().unwrap();
    assert_eq!(host.probe(id), None);
}

#[test]
fn dry_run_never_signals() {
    let host = ProcfsHost::new(true, false);
    let mut child = spawn_sleeper();

    host.deliver_termination(id_of(&child)).unwrap();
    sleep(Duration::from_millis(100));
    assert!(child.try_wait().unwrap().is_none());

    child.kill().ok();
    child.wait().ok();
}

#[test]
fn global_counters_are_in_pages() {
    let host = ProcfsHost::new(false, false);
    let counters = host.global().unwrap();
    let total_pages = (Meminfo::current().unwrap().mem_total / page_size()) as i64;

    assert!(counters.free_pages > 0);
    assert!(counters.free_pages <= total_pages);
    assert!(counters.file_pages <= total_pages);
    assert!(counters.active_file + counters.inactive_file <= total_pages);
}

#[test]
fn zones_come_most_permissive_first() {
    let host = ProcfsHost::new(false, false);
    let zones = host.zones().unwrap();

    assert!(!zones.is_empty());
    assert!(zones.iter().all(|zone| zone.present_pages > 0));
    assert!(zones.windows(2).all(|pair| pair[0].index > pair[1].index));
}

#[test]
fn context_names_the_daemon_itself() {
    let context = ProcfsHost::new(false, true).current_context();
    assert_eq!(context.candidate, Some(CandidateId(std::process::id())));
    assert!(context.is_background_balancer);
    assert!(!context.is_self_dying);
}

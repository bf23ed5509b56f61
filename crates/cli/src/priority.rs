#![deny(unsafe_code)]

//! Process protection helpers.
//!
//! Opts the daemon out of the kernel OOM killer and raises its CPU
//! scheduling priority so it keeps running under memory pressure.

use std::path::Path;
use tracing::{info, warn};

/// `oom_score_adj` value that exempts a process from the OOM killer.
pub const OOM_SCORE_ADJ_MIN: i32 = -1000;

/// Nice value the daemon runs at.
const DAEMON_NICE: i32 = -10;

/// Exempt the daemon from OOM kills and raise its CPU priority.
///
/// Both steps are best-effort: failures are logged as warnings but do not
/// prevent the daemon from running.
pub fn protect_process() {
    set_oom_score_adj(Path::new("/proc/self/oom_score_adj"), OOM_SCORE_ADJ_MIN);
    set_nice(DAEMON_NICE);
}

fn set_oom_score_adj(path: &Path, value: i32) {
    match std::fs::write(path, value.to_string()) {
        Ok(()) => info!(value, "oom_score_adj set"),
        Err(err) => warn!(%err, value, "failed to set oom_score_adj"),
    }
}

/// Change the nice value of the calling process by `inc`.
///
/// `nice()` can legitimately return -1 as a new nice value, so errors are
/// detected via errno rather than the return value (POSIX convention).
fn set_nice(inc: i32) {
    #[allow(unsafe_code)]
    unsafe {
        *libc::__errno_location() = 0;
    }

    #[allow(unsafe_code)]
    let ret = unsafe { libc::nice(inc) };

    #[allow(unsafe_code)]
    let errno = unsafe { *libc::__errno_location() };

    if errno != 0 {
        let err = std::io::Error::from_raw_os_error(errno);
        warn!(%err, inc, "failed to set nice value");
    } else {
        info!(nice = ret, "process nice value set");
    }
}

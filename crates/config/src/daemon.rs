use crate::zone_kind::ZoneKind;
use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Daemon {
    /// How often the daemon samples memory and runs a reclaim pass.
    /// **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub poll_interval: Duration,

    /// Select victims and log them, but never deliver a signal.
    pub dry_run: bool,

    /// Highest zone usable by the allocations the daemon reclaims for.
    pub request_zone: ZoneKind,

    /// Treat the polling loop as the background balancer, enabling the
    /// lighter estimate when memory is comfortably above the watermarks.
    pub background_balancer: bool,
}

impl Default for Daemon {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            dry_run: false,
            request_zone: ZoneKind::Normal,
            background_balancer: true,
        }
    }
}

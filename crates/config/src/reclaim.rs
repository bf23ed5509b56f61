use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Reclaim {
    /// Diagnostic verbosity. 0 is silent, 1 reports kills, 2 reports
    /// selection decisions, 3 and above report every reclaim pass.
    pub debug_level: u32,

    /// Lighter touch for the background balancer: when the preferred zone
    /// is comfortably above its high watermark, file cache held in zones the
    /// request cannot use is not subtracted from the estimate.
    pub fast_run: bool,

    /// How expensive this reclaimer is relative to others. Higher values
    /// yield smaller scan budgets.
    pub reclaim_cost: u32,

    /// After a kill, further kills are held back for this long while the
    /// victim is still releasing memory. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub grace_window: Duration,

    /// Pause taken after a kill, or after noticing a pending one, so the
    /// memory has time to come back. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub settle_pause: Duration,
}

impl Default for Reclaim {
    fn default() -> Self {
        Self {
            debug_level: 1,
            fast_run: true,
            reclaim_cost: 32,
            grace_window: Duration::from_secs(1),
            settle_pause: Duration::from_millis(20),
        }
    }
}

/// Parse a boolean module parameter. Accepts `0`/`1` as well as words.
pub fn parse_bool(param: &'static str, text: &str) -> Result<bool, crate::Error> {
    match text.trim() {
        "1" | "y" | "Y" | "true" | "on" => Ok(true),
        "0" | "n" | "N" | "false" | "off" => Ok(false),
        other => Err(crate::Error::InvalidBool {
            param,
            value: other.to_owned(),
        }),
    }
}

/// Parse a single non-negative integer module parameter.
pub fn parse_u32(param: &'static str, text: &str) -> Result<u32, crate::Error> {
    let text = text.trim();
    let value: i64 = text.parse().map_err(|_| crate::Error::InvalidInteger {
        param,
        value: text.to_owned(),
    })?;
    if value < 0 {
        return Err(crate::Error::Negative { param, value });
    }
    u32::try_from(value).map_err(|_| crate::Error::OutOfRange { param, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_parameters() {
        assert!(parse_bool("fast_run", "1").unwrap());
        assert!(!parse_bool("fast_run", " off ").unwrap());
        assert!(parse_bool("fast_run", "2").is_err());
        assert_eq!(parse_u32("cost", "64").unwrap(), 64);
        assert!(parse_u32("cost", "-3").is_err());
        assert!(parse_u32("cost", "ten").is_err());
    }
}

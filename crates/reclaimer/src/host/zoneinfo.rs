#![forbid(unsafe_code)]

use crate::domain::{ZoneCounters, ZoneKind};
use crate::error::Error;

#[derive(Debug)]
struct ZoneBuilder {
    zone: ZoneCounters,
    /// Past the `pages free` line, i.e. out of the per-node statistics.
    in_zone: bool,
    file_pages: Option<i64>,
    file_lru: i64,
}

impl ZoneBuilder {
    fn new(kind: ZoneKind, index: usize) -> Self {
        Self {
            zone: ZoneCounters::new(kind, index),
            in_zone: false,
            file_pages: None,
            file_lru: 0,
        }
    }

    fn finish(mut self) -> ZoneCounters {
        self.zone.file_pages = self.file_pages.unwrap_or(self.file_lru);
        self.zone
    }
}

/// Parse the zones of `node` from `/proc/zoneinfo` text, in the order the
/// kernel prints them (most restrictive first).
///
/// Kernels that no longer keep per-zone file page counts get the zone's
/// file LRU size instead, with no shared memory.
pub fn parse_zoneinfo(text: &str, node: u32) -> Result<Vec<ZoneCounters>, Error> {
    let mut zones = Vec::new();
    let mut current: Option<ZoneBuilder> = None;

    for (lineno, line) in text.lines().enumerate() {
        let line_no = lineno + 1;
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("Node ") {
            zones.extend(current.take().map(ZoneBuilder::finish));
            let (node_id, zone) = rest
                .split_once(',')
                .ok_or_else(|| malformed(line_no, "missing zone name"))?;
            let node_id: u32 = node_id
                .trim()
                .parse()
                .map_err(|_| malformed(line_no, "invalid node id"))?;
            if node_id != node {
                continue;
            }
            let name = zone
                .trim()
                .strip_prefix("zone")
                .ok_or_else(|| malformed(line_no, "missing zone keyword"))?
                .trim();
            let kind = ZoneKind::from_kernel_name(name)
                .ok_or_else(|| malformed(line_no, &format!("unknown zone {name}")))?;
            current = Some(ZoneBuilder::new(kind, zones.len()));
            continue;
        }

        let Some(builder) = current.as_mut() else {
            continue;
        };

        if let Some(list) = trimmed.strip_prefix("protection:") {
            builder.zone.lowmem_reserve = parse_protection(list, line_no)?;
            continue;
        }

        let mut tokens = trimmed.split_whitespace();
        let (Some(key), Some(second)) = (tokens.next(), tokens.next()) else {
            continue;
        };
        if key == "pages" && second == "free" {
            let value = tokens
                .next()
                .ok_or_else(|| malformed(line_no, "missing free page count"))?;
            builder.zone.free_pages = number(value, line_no)?;
            builder.in_zone = true;
            continue;
        }
        if !builder.in_zone {
            continue;
        }
        match key {
            "min" => builder.zone.min_watermark = number(second, line_no)?,
            "low" => builder.zone.low_watermark = number(second, line_no)?,
            "high" => builder.zone.high_watermark = number(second, line_no)?,
            "present" => builder.zone.present_pages = number(second, line_no)?,
            "nr_file_pages" => builder.file_pages = Some(number(second, line_no)?),
            "nr_shmem" => builder.zone.shared_pages = number(second, line_no)?,
            "nr_zone_active_file" | "nr_zone_inactive_file" => {
                builder.file_lru += number(second, line_no)?;
            }
            _ => {}
        }
    }
    zones.extend(current.map(ZoneBuilder::finish));
    Ok(zones)
}

fn parse_protection(list: &str, line_no: usize) -> Result<Vec<i64>, Error> {
    let list = list.trim();
    let inner = list
        .strip_prefix('(')
        .and_then(|l| l.strip_suffix(')'))
        .ok_or_else(|| malformed(line_no, "protection is not a parenthesised list"))?;
    inner
        .split(',')
        .map(|item| number(item.trim(), line_no))
        .collect()
}

fn number(value: &str, line_no: usize) -> Result<i64, Error> {
    value
        .parse()
        .map_err(|_| malformed(line_no, &format!("invalid number `{value}`")))
}

fn malformed(line: usize, reason: &str) -> Error {
    Error::ZoneInfo {
        line,
        reason: reason.to_owned(),
    }
}

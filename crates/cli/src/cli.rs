use clap::Parser;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use config::{Config, parse_bool, parse_minfree_levels, parse_priority_floors, parse_u32};
use reclaimer::Param;
use std::path::{Path, PathBuf};

/// lowmemd: low memory killer daemon
///
/// lowmemd watches free memory and, once it drops below the configured
/// levels, terminates the least important process to bring it back up.
/// Processes are ranked by their `oom_score_adj`, scaled to the -17..15
/// `oom_adj` range the priority floors use.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/lowmemd/config.toml` and `/etc/lowmemd/config.d/*.toml`,
    /// where the latter being a glob pattern. If they don't exist, the default
    /// configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub config: Option<PathBuf>,

    /// Log the victims that would be chosen, but never send a signal.
    #[arg(long)]
    pub dry_run: bool,

    /// Override a reclaim parameter, e.g. `--set minfree=1024,4096`.
    ///
    /// Accepted names: priority_floors (adj), minfree_levels (minfree),
    /// debug_level, fast_run (lmk_fast_run) and reclaim_cost (cost).
    /// May be repeated; later values win.
    #[arg(long = "set", value_name = "NAME=VALUE", value_parser = parse_override)]
    pub overrides: Vec<Override>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,
}

impl Cli {
    /// Apply the command line on top of a loaded configuration.
    pub fn apply(&self, config: &mut Config) -> Result<(), config::Error> {
        for item in &self.overrides {
            item.apply(config)?;
        }
        if self.dry_run {
            config.daemon.dry_run = true;
        }
        config.validate()
    }
}

/// A single `--set` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub param: Param,
    pub value: String,
}

impl Override {
    pub fn apply(&self, config: &mut Config) -> Result<(), config::Error> {
        let value = self.value.as_str();
        match self.param {
            Param::PriorityFloors => {
                config.thresholds.priority_floors = parse_priority_floors(value)?;
            }
            Param::MinfreeLevels => {
                config.thresholds.minfree_levels = parse_minfree_levels(value)?;
            }
            Param::DebugLevel => config.reclaim.debug_level = parse_u32(self.param.name(), value)?,
            Param::FastRun => config.reclaim.fast_run = parse_bool(self.param.name(), value)?,
            Param::ReclaimCost => {
                config.reclaim.reclaim_cost = parse_u32(self.param.name(), value)?;
            }
        }
        Ok(())
    }
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

/// Parse and validate `name=value`.
fn parse_override(arg: &str) -> Result<Override, String> {
    let (name, value) = arg
        .split_once('=')
        .ok_or_else(|| format!("`{arg}` is not of the form NAME=VALUE"))?;
    let param: Param = name.trim().parse().map_err(|err| format!("{err}"))?;
    let item = Override {
        param,
        value: value.trim().to_owned(),
    };
    item.apply(&mut Config::default())
        .map_err(|err| format!("{err}"))?;
    Ok(item)
}

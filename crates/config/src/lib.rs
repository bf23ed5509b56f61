#![forbid(unsafe_code)]

mod daemon;
mod error;
mod reclaim;
mod thresholds;
mod zone_kind;

pub use daemon::Daemon;
pub use error::Error;
pub use reclaim::{Reclaim, parse_bool, parse_u32};
pub use thresholds::{
    MAX_THRESHOLD_ROWS, Thresholds, format_sequence, parse_minfree_levels, parse_priority_floors,
    parse_sequence,
};
pub use zone_kind::ZoneKind;

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub thresholds: Thresholds,
    pub reclaim: Reclaim,
    pub daemon: Daemon,
}

impl Config {
    /// Load configuration from a TOML file. Missing fields are filled with defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml_edit::de::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let toml = toml_edit::ser::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Load configuration from multiple TOML files. Later files override earlier ones.
    pub fn load_multiple<T, U>(paths: U) -> Result<Self, Error>
    where
        T: AsRef<Path>,
        U: IntoIterator<Item = T>,
    {
        let mut merged = toml_edit::DocumentMut::new();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                continue;
            }
            let text = std::fs::read_to_string(path)?;
            let doc: toml_edit::DocumentMut = text.parse()?;
            merge_document(&mut merged, doc);
        }
        let config: Config = toml_edit::de::from_str(&merged.to_string())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject threshold sequences that are negative, unordered or too long.
    /// Mismatched lengths are accepted: the table uses the shorter one.
    pub fn validate(&self) -> Result<(), Error> {
        self.thresholds.validate()
    }
}

fn merge_document(target: &mut toml_edit::DocumentMut, source: toml_edit::DocumentMut) {
    for (key, item) in source.iter() {
        merge_item(
            target.entry(key).or_insert(toml_edit::Item::None),
            item.clone(),
        );
    }
}

fn merge_item(target: &mut toml_edit::Item, source: toml_edit::Item) {
    use toml_edit::Item;
    match (target, source) {
        (Item::Table(target_table), Item::Table(source_table)) => {
            for (key, item) in source_table.iter() {
                merge_item(target_table.entry(key).or_insert(Item::None), item.clone());
            }
        }
        (target_item, source_item) => {
            *target_item = source_item;
        }
    }
}

use serde::{Deserialize, Serialize};

/// Memory zone classes, ordered from the most restrictive to the most
/// permissive.
///
/// An allocation whose highest usable zone is `Normal` can be served from
/// `Normal`, `Dma32` and `Dma`, never from `HighMem` or `Movable`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ZoneKind {
    #[serde(rename = "dma")]
    Dma,

    #[serde(rename = "dma32")]
    Dma32,

    #[serde(rename = "normal")]
    Normal,

    #[serde(rename = "highmem")]
    HighMem,

    #[serde(rename = "movable")]
    Movable,

    /// Device memory; never usable for ordinary allocations.
    #[serde(rename = "device")]
    Device,
}

impl ZoneKind {
    /// Map a zone name as printed by `/proc/zoneinfo`.
    pub fn from_kernel_name(name: &str) -> Option<Self> {
        match name {
            "DMA" => Some(Self::Dma),
            "DMA32" => Some(Self::Dma32),
            "Normal" => Some(Self::Normal),
            "HighMem" => Some(Self::HighMem),
            "Movable" => Some(Self::Movable),
            "Device" => Some(Self::Device),
            _ => None,
        }
    }
}

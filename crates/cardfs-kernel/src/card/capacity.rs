//! Capacity figures and byte-unit conversion.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::vfs::StatFs;

/// Binary units for reporting byte counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
pub enum MemoryUnit {
    #[strum(serialize = "B")]
    Byte,
    #[strum(serialize = "KB")]
    KiloByte,
    #[strum(serialize = "MB")]
    MegaByte,
    #[strum(serialize = "GB")]
    GigaByte,
    #[strum(serialize = "TB")]
    TeraByte,
    #[strum(serialize = "PB")]
    PetaByte,
}

impl MemoryUnit {
    fn exponent(self) -> i32 {
        match self {
            MemoryUnit::Byte => 0,
            MemoryUnit::KiloByte => 1,
            MemoryUnit::MegaByte => 2,
            MemoryUnit::GigaByte => 3,
            MemoryUnit::TeraByte => 4,
            MemoryUnit::PetaByte => 5,
        }
    }
}

/// Convert a byte count into `unit` (powers of 1024).
pub fn convert_bytes(value: u64, unit: MemoryUnit) -> f64 {
    value as f64 / 1024f64.powi(unit.exponent())
}

/// Used, total and free space of the mounted card, in megabytes.
///
/// All zero when nothing is mounted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    pub total_mb: f64,
    pub used_mb: f64,
    pub free_mb: f64,
}

impl CapacityReport {
    pub fn from_statfs(stat: &StatFs) -> Self {
        Self {
            total_mb: convert_bytes(stat.total_bytes(), MemoryUnit::MegaByte),
            used_mb: convert_bytes(stat.used_bytes(), MemoryUnit::MegaByte),
            free_mb: convert_bytes(stat.free_bytes(), MemoryUnit::MegaByte),
        }
    }
}

/// SD capacity class, derived from the card size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum CardType {
    #[strum(serialize = "SDSC")]
    Sdsc,
    #[strum(serialize = "SDHC")]
    Sdhc,
    #[strum(serialize = "SDXC")]
    Sdxc,
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

const SDSC_LIMIT: u64 = 2 * 1024 * 1024 * 1024;
const SDHC_LIMIT: u64 = 32 * 1024 * 1024 * 1024;

impl CardType {
    /// Classify a card by its raw capacity in bytes.
    pub fn from_capacity(bytes: u64) -> Self {
        if bytes == 0 {
            CardType::Unknown
        } else if bytes <= SDSC_LIMIT {
            CardType::Sdsc
        } else if bytes <= SDHC_LIMIT {
            CardType::Sdhc
        } else {
            CardType::Sdxc
        }
    }
}

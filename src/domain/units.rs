//! Capacity unit conversion
//!
//! Sizes are declared as a float plus a unit and sent to the array as a
//! byte count. Units are binary: one MB is 2^20 bytes.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const KIB: f64 = 1024.0;
pub const MIB: f64 = KIB * 1024.0;
pub const GIB: f64 = MIB * 1024.0;
pub const TIB: f64 = GIB * 1024.0;

/// Units accepted in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapacityUnit {
    #[serde(rename = "MB")]
    Mb,
    #[serde(rename = "GB")]
    Gb,
    #[serde(rename = "TB")]
    Tb,
}

impl CapacityUnit {
    pub const ALL: [&'static str; 3] = ["MB", "GB", "TB"];

    /// Bytes per unit
    pub fn multiplier(self) -> f64 {
        match self {
            CapacityUnit::Mb => MIB,
            CapacityUnit::Gb => GIB,
            CapacityUnit::Tb => TIB,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CapacityUnit::Mb => "MB",
            CapacityUnit::Gb => "GB",
            CapacityUnit::Tb => "TB",
        }
    }
}

impl std::fmt::Display for CapacityUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CapacityUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "MB" => Ok(CapacityUnit::Mb),
            "GB" => Ok(CapacityUnit::Gb),
            "TB" => Ok(CapacityUnit::Tb),
            other => Err(Error::CapacityUnit(format!("Invalid Capacity unit: {}", other))),
        }
    }
}

/// Convert a declared size to bytes, truncating any fractional byte
pub fn to_bytes(size: f64, unit: &str) -> Result<i64> {
    let unit: CapacityUnit = unit.parse()?;
    Ok((size * unit.multiplier()) as i64)
}

/// Convert a byte count to the largest unit in which the value is at least one
///
/// Values below one kilobyte are reported in KB. Values of a petabyte or
/// more stay in TB.
pub fn from_bytes(bytes: i64) -> (f64, &'static str) {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut divisions = 0;
    while size >= KIB && divisions < UNITS.len() {
        size /= KIB;
        divisions += 1;
    }

    if divisions == 0 {
        return (bytes as f64 / KIB, UNITS[0]);
    }
    (size, UNITS[divisions - 1])
}

//! Device identifiers used to route transfers and pick layouts.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Hardware class a device belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Tpu,
}

impl DeviceKind {
    fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::Gpu => "GPU",
            DeviceKind::Tpu => "TPU",
        }
    }
}

/// A concrete device: hardware class plus ordinal, rendered `TPU:0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Device {
    pub kind: DeviceKind,
    pub ordinal: usize,
}

impl Device {
    pub fn new(kind: DeviceKind, ordinal: usize) -> Self {
        Device { kind, ordinal }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.ordinal)
    }
}

impl FromStr for Device {
    type Err = Error;

    /// Parses `KIND:ordinal`; a bare kind means ordinal zero.
    fn from_str(s: &str) -> Result<Self, Error> {
        let (kind, ordinal) = match s.split_once(':') {
            Some((kind, ordinal)) => (kind, ordinal),
            None => (s, "0"),
        };
        let kind = match kind.trim().to_ascii_uppercase().as_str() {
            "CPU" => DeviceKind::Cpu,
            "GPU" => DeviceKind::Gpu,
            "TPU" => DeviceKind::Tpu,
            _ => return Err(Error::InvalidDevice(s.to_string())),
        };
        let ordinal = ordinal
            .trim()
            .parse::<usize>()
            .map_err(|_| Error::InvalidDevice(s.to_string()))?;
        Ok(Device { kind, ordinal })
    }
}

//! Compute device identifiers.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Host memory.
    Cpu,
    Cuda,
    Mps,
}

impl DeviceKind {
    pub fn name(self) -> &'static str {
        match self {
            DeviceKind::Cpu => "cpu",
            DeviceKind::Cuda => "cuda",
            DeviceKind::Mps => "mps",
        }
    }
}

/// A device kind plus ordinal. Ordinal `-1` selects the current device of that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Device {
    kind: DeviceKind,
    index: i32,
}

impl Device {
    /// Builds a device, normalising host ordinals to `-1` (there is only one host).
    pub fn new(kind: DeviceKind, index: i32) -> Self {
        let index = match kind {
            DeviceKind::Cpu => -1,
            _ if index < 0 => -1,
            _ => index,
        };
        Device { kind, index }
    }

    pub const fn cpu() -> Self {
        Device {
            kind: DeviceKind::Cpu,
            index: -1,
        }
    }

    pub fn cuda(index: i32) -> Self {
        Device::new(DeviceKind::Cuda, index)
    }

    pub fn kind(self) -> DeviceKind {
        self.kind
    }

    pub fn index(self) -> i32 {
        self.index
    }

    pub fn is_cpu(self) -> bool {
        self.kind == DeviceKind::Cpu
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::cpu()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index < 0 {
            f.write_str(self.kind.name())
        } else {
            write!(f, "{}:{}", self.kind.name(), self.index)
        }
    }
}

//! Storage layouts a native tensor can end up in.

use std::fmt;

/// Storage representation of a tensor; independent from its shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Layout {
    /// Dense row-major storage.
    #[default]
    Strided,
    /// Coordinate-format sparse storage.
    Sparse,
    /// Backend-specific optimized memory format, opaque to the bridge.
    Opaque,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Layout::Strided => "strided",
            Layout::Sparse => "sparse",
            Layout::Opaque => "opaque",
        }
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

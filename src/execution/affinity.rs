//! Execution affinity of an environment

use std::fmt;

use serde::Serialize;

/// Logical execution context an environment was created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Affinity {
    /// The registry's singleton, bound to the main thread
    Main,
    /// A per-call background environment counted against the cap
    Background,
    /// Built by an explicit factory call; never pooled or counted
    Detached,
}

impl Affinity {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Affinity::Main => "main",
            Affinity::Background => "background",
            Affinity::Detached => "detached",
        }
    }
}

impl fmt::Display for Affinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

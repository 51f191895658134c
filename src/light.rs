use serde::{Deserialize, Serialize};
use std::fmt;

/// The state of a traffic light.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Green,
    Yellow,
    Red,
}

impl Phase {
    /// The phase that follows this one in the normal cycle.
    pub fn next(self) -> Self {
        use Phase::*;
        match self {
            Green => Yellow,
            Yellow => Red,
            Red => Green,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Green => "green",
            Phase::Yellow => "yellow",
            Phase::Red => "red",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

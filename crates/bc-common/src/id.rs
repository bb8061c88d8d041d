//! Process identity types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID wrapper with display formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub u32);

impl ProcessId {
    /// Raw pid as the signed type libc expects.
    pub fn as_raw(self) -> i32 {
        self.0 as i32
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ProcessId {
    fn from(pid: u32) -> Self {
        ProcessId(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_display() {
        assert_eq!(ProcessId(4242).to_string(), "4242");
        assert_eq!(ProcessId::from(7).as_raw(), 7);
    }

    #[test]
    fn test_process_id_serializes_transparent() {
        let json = serde_json::to_string(&ProcessId(99)).unwrap();
        assert_eq!(json, "99");
    }
}

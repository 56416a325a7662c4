use serde::{Deserialize, Serialize};

/// Maximum number of concurrently open bridged sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 128;

/// Largest single transfer a session performs per callback.
pub const DEFAULT_BUFFER_SIZE: usize = 32_768;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct IoConfig {
    pub max_sessions: usize,
    pub buffer_size: usize,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

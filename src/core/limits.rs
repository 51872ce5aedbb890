//! Resource ceilings for a single project execution.
//!
//! Bounds what one real invocation may cost:
//! - Wall-clock time (soft timeout, the process is killed when it expires)
//! - Captured output per stream (later lines are streamed but not retained)

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::domain::OutputStream;

/// Ceilings applied by the execution engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    /// Soft timeout spanning all invocations of one project (default: 600 = 10 min)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Maximum retained bytes per stream (default: 1MB)
    #[serde(default = "default_max_capture_bytes")]
    pub max_capture_bytes: u64,
}

/// Longest soft timeout honored; larger values are clamped to it
pub const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

fn default_timeout() -> u64 {
    600
}
fn default_max_capture_bytes() -> u64 {
    1024 * 1024
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_capture_bytes: default_max_capture_bytes(),
        }
    }
}

impl ExecutionLimits {
    /// Effective timeout in seconds, within `1..=MAX_TIMEOUT_SECONDS`.
    /// Zero is treated as the shortest timeout, not as "no timeout".
    pub fn effective_timeout_seconds(&self) -> u64 {
        self.timeout_seconds.clamp(1, MAX_TIMEOUT_SECONDS)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.effective_timeout_seconds())
    }

    /// Deadline for an execution starting now
    pub fn deadline(&self) -> Instant {
        let now = Instant::now();
        now.checked_add(self.timeout()).unwrap_or(now)
    }
}

/// Tracks captured bytes during one execution
#[derive(Debug, Clone)]
pub struct CaptureTracker {
    limit: u64,

    stdout_bytes: u64,

    stderr_bytes: u64,

    /// Set once any line was dropped from the retained capture
    pub truncated: bool,
}

impl CaptureTracker {
    pub fn new(limits: &ExecutionLimits) -> Self {
        Self {
            limit: limits.max_capture_bytes,
            stdout_bytes: 0,
            stderr_bytes: 0,
            truncated: false,
        }
    }

    /// Account for a line of `len` bytes (plus newline). Returns whether it
    /// fits under the ceiling and should be retained.
    pub fn admit(&mut self, stream: OutputStream, len: usize) -> bool {
        let counter = match stream {
            OutputStream::Stdout => &mut self.stdout_bytes,
            OutputStream::Stderr => &mut self.stderr_bytes,
        };

        let needed = len as u64 + 1;
        if *counter + needed > self.limit {
            self.truncated = true;
            return false;
        }

        *counter += needed;
        true
    }
}

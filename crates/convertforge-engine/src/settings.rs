//! Runtime knobs for the engine.

use std::time::Duration;

/// Default bytes kept from each of stdout and stderr.
pub const DEFAULT_CAPTURE_LIMIT: usize = 64 * 1024;

/// Default time between SIGTERM and SIGKILL.
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// How the supervisor runs external tools.
#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    /// Bytes of trailing output retained per stream.
    pub capture_limit: usize,
    /// Grace period after SIGTERM before the process group is killed.
    pub kill_grace: Duration,
    /// Upper bound applied to every table budget, if set.
    pub max_timeout: Option<Duration>,
    /// Extra environment for every tool invocation.
    pub env: Vec<(String, String)>,
}

impl SupervisorSettings {
    /// The budget actually enforced for a table budget.
    pub fn effective_timeout(&self, budget: Duration) -> Duration {
        match self.max_timeout {
            Some(cap) => budget.min(cap),
            None => budget,
        }
    }
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            capture_limit: DEFAULT_CAPTURE_LIMIT,
            kill_grace: DEFAULT_KILL_GRACE,
            max_timeout: None,
            env: vec![("DISPLAY".to_string(), ":99".to_string())],
        }
    }
}

/// Delays before temporary files are removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupDelays {
    /// Uploaded input, after every conversion.
    pub input: Duration,
    /// Output path, after a failed conversion.
    pub failure: Duration,
    /// Output path, after a successful conversion has been handed over.
    pub success: Duration,
}

impl Default for CleanupDelays {
    fn default() -> Self {
        Self {
            input: Duration::from_secs(5),
            failure: Duration::from_secs(1),
            success: Duration::from_secs(120),
        }
    }
}

/// Everything the orchestrator needs besides its collaborators.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub supervisor: SupervisorSettings,
    pub cleanup: CleanupDelays,
}

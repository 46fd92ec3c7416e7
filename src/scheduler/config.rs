use crate::virtual_machine::errors::VMError;
use std::fmt;
use std::str::FromStr;

/// Default instructions per turn.
pub const DEFAULT_QUOTA: usize = 20;
/// Default number of shared memory cells.
pub const DEFAULT_MEMORY_SIZE: usize = 50;
/// Default registers per thread.
pub const DEFAULT_REGISTER_COUNT: usize = 5;
/// Upper bound on registers, since operands address them with a `u8`.
pub const MAX_REGISTER_COUNT: usize = 256;

/// What the scheduler does with a thread whose instruction faulted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FaultPolicy {
    /// Log the fault and keep running at the next instruction.
    #[default]
    Continue,
    /// Log the fault and remove the thread; others keep running.
    Terminate,
    /// Log the fault and stop the run with [`VMError::Aborted`].
    Abort,
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FaultPolicy::Continue => "continue",
            FaultPolicy::Terminate => "terminate",
            FaultPolicy::Abort => "abort",
        })
    }
}

impl FromStr for FaultPolicy {
    type Err = VMError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "continue" => Ok(FaultPolicy::Continue),
            "terminate" => Ok(FaultPolicy::Terminate),
            "abort" => Ok(FaultPolicy::Abort),
            other => Err(VMError::InvalidConfig {
                reason: format!("unknown fault policy `{other}`"),
            }),
        }
    }
}

/// Scheduler tunables.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SchedulerConfig {
    /// Maximum instructions a thread runs in one turn.
    pub quota: usize,
    /// Number of shared memory cells.
    pub memory_size: usize,
    /// Registers in each thread's frame.
    pub register_count: usize,
    pub fault_policy: FaultPolicy,
    /// Stop after this many sweeps even if threads are still ready.
    pub max_rounds: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            quota: DEFAULT_QUOTA,
            memory_size: DEFAULT_MEMORY_SIZE,
            register_count: DEFAULT_REGISTER_COUNT,
            fault_policy: FaultPolicy::Continue,
            max_rounds: None,
        }
    }
}

impl SchedulerConfig {
    pub fn with_quota(mut self, quota: usize) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    pub fn with_register_count(mut self, register_count: usize) -> Self {
        self.register_count = register_count;
        self
    }

    pub fn with_fault_policy(mut self, fault_policy: FaultPolicy) -> Self {
        self.fault_policy = fault_policy;
        self
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = Some(max_rounds);
        self
    }

    /// Checks that every tunable is in range.
    pub fn validate(&self) -> Result<(), VMError> {
        let reason = if self.quota == 0 {
            "quota must be at least 1".to_string()
        } else if self.memory_size == 0 {
            "memory size must be at least 1".to_string()
        } else if self.register_count == 0 || self.register_count > MAX_REGISTER_COUNT {
            format!(
                "register count must be between 1 and {MAX_REGISTER_COUNT}, got {}",
                self.register_count
            )
        } else {
            return Ok(());
        };
        Err(VMError::InvalidConfig { reason })
    }
}

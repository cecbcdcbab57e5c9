use serde::{Deserialize, Serialize};

/// Top-level middleware configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MosaicConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub merge: MergeConfig,
}

/// Execution-engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Maximum worker threads for one multi-target statement. The pool is
    /// per execution group, so one slow statement cannot starve unrelated
    /// statements. Default: number of CPUs.
    #[serde(default = "default_worker_threads")]
    pub max_worker_threads: usize,
}

fn default_worker_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_worker_threads: default_worker_threads(),
        }
    }
}

impl ExecutorConfig {
    /// Single-threaded variant for deterministic tests.
    pub fn single_threaded() -> Self {
        Self {
            max_worker_threads: 1,
        }
    }
}

/// Merge-engine resource limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Maximum rows the grouping merge may buffer before aborting.
    #[serde(default = "default_max_rows_buffered")]
    pub max_rows_buffered: usize,
}

fn default_max_rows_buffered() -> usize {
    1_000_000
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_rows_buffered: default_max_rows_buffered(),
        }
    }
}

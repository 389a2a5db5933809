//! Process-level sampling.
//!
//! The server's background collector calls a [`ProcessSampler`] on a fixed
//! interval and stores the result in the [`MetricsRegistry`]. Hosts that
//! know more about their environment (cgroup limits, allocator stats) plug
//! in their own sampler.
//!
//! [`MetricsRegistry`]: crate::MetricsRegistry

use serde::Serialize;
use std::fmt;

/// One observation of the running process.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessSample {
    /// Number of runtime worker threads.
    pub runtime_workers: Option<usize>,
    /// Number of tasks alive on the runtime.
    pub alive_tasks: Option<usize>,
    /// Resident set size in bytes.
    pub resident_memory_bytes: Option<u64>,
}

/// Source of process samples.
pub trait ProcessSampler: Send + Sync + fmt::Debug {
    /// Takes a sample. Fields the sampler cannot observe stay `None`.
    fn sample(&self) -> ProcessSample;
}

/// Samples the current tokio runtime and, on Linux, resident memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeSampler;

impl ProcessSampler for RuntimeSampler {
    fn sample(&self) -> ProcessSample {
        let runtime = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let metrics = handle.metrics();
            (metrics.num_workers(), metrics.num_alive_tasks())
        });

        ProcessSample {
            runtime_workers: runtime.map(|(workers, _)| workers),
            alive_tasks: runtime.map(|(_, tasks)| tasks),
            resident_memory_bytes: resident_memory_bytes(),
        }
    }
}

#[cfg(target_os = "linux")]
fn resident_memory_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_vm_rss(&status)
}

#[cfg(not(target_os = "linux"))]
fn resident_memory_bytes() -> Option<u64> {
    None
}

/// Parses the `VmRSS:  1234 kB` line of `/proc/<pid>/status`.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line
        .trim_start_matches("VmRSS:")
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;
    Some(kib * 1024)
}

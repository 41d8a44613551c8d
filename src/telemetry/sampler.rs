//! Point-in-time resource samples and the host sampler.

use crate::error::LedgerError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::{Disks, Networks, System};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuSample {
    /// Utilisation across all cores, 0..=100.
    pub percent: f64,
    pub cores: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemorySample {
    pub used_mb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskSample {
    pub used_gb: f64,
    pub percent: f64,
}

/// Cumulative interface counters since boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkSample {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu: CpuSample,
    pub memory: MemorySample,
    pub disk: DiskSample,
    pub network: NetworkSample,
}

/// Source of resource samples.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> Result<ResourceSample, LedgerError>;
}

struct HostState {
    system: System,
    disks: Disks,
    networks: Networks,
}

/// Samples the local host through `sysinfo`.
///
/// CPU utilisation is measured between consecutive calls, so the first sample
/// after construction may read low.
pub struct SystemSampler {
    state: Mutex<HostState>,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            state: Mutex::new(HostState {
                system,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
            }),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn percent(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        part / whole * 100.0
    } else {
        0.0
    }
}

impl ResourceSampler for SystemSampler {
    fn sample(&self) -> Result<ResourceSample, LedgerError> {
        let mut state = self.state.lock();
        let HostState {
            system,
            disks,
            networks,
        } = &mut *state;

        system.refresh_cpu();
        system.refresh_memory();
        disks.refresh();
        networks.refresh();

        let cores = system.cpus().len() as u32;
        let used_memory = system.used_memory() as f64;
        let total_memory = system.total_memory() as f64;

        // Root filesystem when present, otherwise every disk together.
        let root = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"));
        let (disk_total, disk_available) = match root {
            Some(disk) => (disk.total_space(), disk.available_space()),
            None => disks.list().iter().fold((0, 0), |(t, a), d| {
                (t + d.total_space(), a + d.available_space())
            }),
        };
        let disk_used = disk_total.saturating_sub(disk_available) as f64;

        let network = networks
            .iter()
            .fold(NetworkSample::default(), |acc, (_, data)| NetworkSample {
                bytes_sent: acc.bytes_sent + data.total_transmitted(),
                bytes_recv: acc.bytes_recv + data.total_received(),
            });

        Ok(ResourceSample {
            cpu: CpuSample {
                percent: system.global_cpu_info().cpu_usage() as f64,
                cores,
            },
            memory: MemorySample {
                used_mb: used_memory / BYTES_PER_MB,
                percent: percent(used_memory, total_memory),
            },
            disk: DiskSample {
                used_gb: disk_used / BYTES_PER_GB,
                percent: percent(disk_used, disk_total as f64),
            },
            network,
        })
    }
}

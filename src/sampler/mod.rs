//! Counter source — point-in-time reads of OS counters.
//!
//! The collector owns all history; this layer only answers "what do the
//! counters say right now". CPU, memory, and network totals come from
//! `sysinfo`; cumulative disk operation counts come from `/proc/diskstats`
//! since `sysinfo` does not expose them.

use std::path::Path;
use sysinfo::{Disks, Networks, System};

/// Cumulative disk operation counts since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub read_count: u64,
    pub write_count: u64,
}

/// Cumulative network byte counts since boot, loopback excluded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct MemorySnapshot {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub percent: f64,
}

/// Instantaneous counter reads. Implementations hold no history — the
/// trait exists so the collector can be driven by a scripted source in
/// tests.
pub trait CounterSource: Send {
    /// Average CPU busy percentage across all cores, 0-100.
    fn cpu_percent(&mut self) -> f64;
    fn memory(&mut self) -> MemorySnapshot;
    fn disk_counters(&mut self) -> Result<DiskCounters, String>;
    fn net_counters(&mut self) -> Result<NetCounters, String>;
    /// Root filesystem usage percentage, 0-100.
    fn disk_usage_percent(&mut self) -> f64;
}

/// Live source backed by `sysinfo` and `/proc/diskstats`.
pub struct SystemCounterSource {
    sys: System,
    networks: Networks,
    disks: Disks,
}

impl SystemCounterSource {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let networks = Networks::new_with_refreshed_list();
        let disks = Disks::new_with_refreshed_list();
        Self {
            sys,
            networks,
            disks,
        }
    }
}

impl Default for SystemCounterSource {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for SystemCounterSource {
    fn cpu_percent(&mut self) -> f64 {
        self.sys.refresh_cpu_usage();
        let cpus = self.sys.cpus();
        if cpus.is_empty() {
            return 0.0;
        }
        cpus.iter().map(|c| c.cpu_usage() as f64).sum::<f64>() / cpus.len() as f64
    }

    fn memory(&mut self) -> MemorySnapshot {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        MemorySnapshot {
            total_bytes: total,
            used_bytes: used,
            percent: if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    fn disk_counters(&mut self) -> Result<DiskCounters, String> {
        let content = std::fs::read_to_string("/proc/diskstats")
            .map_err(|e| format!("cannot read /proc/diskstats: {}", e))?;
        Ok(parse_diskstats(&content))
    }

    fn net_counters(&mut self) -> Result<NetCounters, String> {
        self.networks.refresh();
        let mut totals = NetCounters::default();
        for (name, data) in self.networks.iter() {
            if name == "lo" {
                continue;
            }
            totals.bytes_sent += data.total_transmitted();
            totals.bytes_recv += data.total_received();
        }
        Ok(totals)
    }

    fn disk_usage_percent(&mut self) -> f64 {
        self.disks.refresh();
        let root = self
            .disks
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .or_else(|| self.disks.iter().max_by_key(|d| d.total_space()));
        match root {
            Some(d) if d.total_space() > 0 => {
                let used = d.total_space().saturating_sub(d.available_space());
                used as f64 / d.total_space() as f64 * 100.0
            }
            _ => 0.0,
        }
    }
}

/// Sum reads-completed (field 4) and writes-completed (field 8) across
/// whole-disk devices.
fn parse_diskstats(content: &str) -> DiskCounters {
    let mut totals = DiskCounters::default();
    for line in content.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 10 {
            continue;
        }
        let name = fields[2];
        if !is_whole_disk(name) {
            continue;
        }
        totals.read_count += fields[3].parse::<u64>().unwrap_or(0);
        totals.write_count += fields[7].parse::<u64>().unwrap_or(0);
    }
    totals
}

/// Whole-disk devices only; counting partitions too would double every
/// operation already accounted to the parent disk.
fn is_whole_disk(name: &str) -> bool {
    for prefix in ["loop", "ram", "zram", "dm-", "md", "sr"] {
        if name.starts_with(prefix) {
            return false;
        }
    }
    if let Some(rest) = name.strip_prefix("nvme") {
        // nvme0n1 is a disk, nvme0n1p1 a partition
        return !rest.contains('p');
    }
    if name.starts_with("mmcblk") {
        return !name.contains('p');
    }
    if ["sd", "vd", "xvd", "hd"]
        .iter()
        .any(|p| name.starts_with(p))
    {
        return !name.ends_with(|c: char| c.is_ascii_digit());
    }
    false
}

#[cfg(test)]
pub mod testing {
    //! Scripted counter source for deterministic collector tests.

    use super::*;
    use std::sync::{Arc, Mutex};

    pub struct SourceState {
        pub cpu: f64,
        pub memory: MemorySnapshot,
        pub disk: Result<DiskCounters, String>,
        pub net: Result<NetCounters, String>,
        pub disk_usage: f64,
    }

    #[derive(Clone)]
    pub struct ScriptedSource {
        state: Arc<Mutex<SourceState>>,
    }

    impl ScriptedSource {
        /// Returns the source plus a handle for mutating its readings
        /// between collection cycles.
        pub fn new() -> (Self, Arc<Mutex<SourceState>>) {
            let state = Arc::new(Mutex::new(SourceState {
                cpu: 0.0,
                memory: MemorySnapshot {
                    total_bytes: 8 * 1024 * 1024 * 1024,
                    used_bytes: 2 * 1024 * 1024 * 1024,
                    percent: 25.0,
                },
                disk: Ok(DiskCounters::default()),
                net: Ok(NetCounters::default()),
                disk_usage: 0.0,
            }));
            (
                Self {
                    state: state.clone(),
                },
                state,
            )
        }
    }

    impl CounterSource for ScriptedSource {
        fn cpu_percent(&mut self) -> f64 {
            self.state.lock().unwrap().cpu
        }

        fn memory(&mut self) -> MemorySnapshot {
            self.state.lock().unwrap().memory
        }

        fn disk_counters(&mut self) -> Result<DiskCounters, String> {
            self.state.lock().unwrap().disk.clone()
        }

        fn net_counters(&mut self) -> Result<NetCounters, String> {
            self.state.lock().unwrap().net.clone()
        }

        fn disk_usage_percent(&mut self) -> f64 {
            self.state.lock().unwrap().disk_usage
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diskstats_sums_whole_disks_only() {
        let content = "\
   8       0 sda 5000 100 200000 3000 2500 50 80000 1500 0 4000 4500 0 0 0 0 0 0
   8       1 sda1 4900 100 199000 2900 2400 50 79000 1400 0 3900 4300 0 0 0 0 0 0
 259       0 nvme0n1 12000 0 500000 8000 6000 0 300000 4000 0 9000 12000 0 0 0 0 0 0
 259       1 nvme0n1p1 11000 0 490000 7900 5900 0 295000 3900 0 8900 11800 0 0 0 0 0 0
   7       0 loop0 300 0 600 10 0 0 0 0 0 10 10 0 0 0 0 0 0
";
        let counters = parse_diskstats(content);
        assert_eq!(counters.read_count, 5000 + 12000);
        assert_eq!(counters.write_count, 2500 + 6000);
    }

    #[test]
    fn diskstats_ignores_short_lines() {
        let counters = parse_diskstats("8 0 sda 100\n");
        assert_eq!(counters, DiskCounters::default());
    }

    #[test]
    fn whole_disk_detection() {
        assert!(is_whole_disk("sda"));
        assert!(!is_whole_disk("sda1"));
        assert!(is_whole_disk("nvme0n1"));
        assert!(!is_whole_disk("nvme0n1p2"));
        assert!(is_whole_disk("vdb"));
        assert!(!is_whole_disk("vdb3"));
        assert!(is_whole_disk("mmcblk0"));
        assert!(!is_whole_disk("mmcblk0p1"));
        assert!(!is_whole_disk("loop7"));
        assert!(!is_whole_disk("dm-0"));
        assert!(!is_whole_disk("md127"));
    }
}

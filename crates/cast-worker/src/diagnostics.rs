//! Host diagnostics reported with every heartbeat.
//!
//! On Linux this reads `/proc` and `statvfs`; elsewhere collection fails
//! with [`WorkerError::DiagnosticsUnavailable`].

use std::path::Path;
#[cfg(target_os = "linux")]
use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// Gap between the two `/proc/stat` samples.
#[cfg(target_os = "linux")]
const CPU_SAMPLE_GAP: Duration = Duration::from_millis(250);

/// Human-readable host load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    pub uptime: String,
}

/// Sample CPU, memory, disk (for the filesystem holding `disk_path`) and uptime.
#[cfg(target_os = "linux")]
pub async fn collect(disk_path: &Path) -> WorkerResult<Diagnostics> {
    let first = read_proc("/proc/stat").await?;
    tokio::time::sleep(CPU_SAMPLE_GAP).await;
    let second = read_proc("/proc/stat").await?;
    let cpu = match (parse_cpu_times(&first), parse_cpu_times(&second)) {
        (Some(a), Some(b)) => cpu_usage(a, b),
        _ => return Err(unavailable("unparsable /proc/stat")),
    };

    let meminfo = read_proc("/proc/meminfo").await?;
    let (total, available) =
        parse_meminfo(&meminfo).ok_or_else(|| unavailable("unparsable /proc/meminfo"))?;

    let uptime = read_proc("/proc/uptime").await?;
    let uptime = parse_uptime(&uptime).ok_or_else(|| unavailable("unparsable /proc/uptime"))?;

    let (disk_used, disk_total) = disk_usage(disk_path)?;

    Ok(Diagnostics {
        cpu: format!("{:.1}%", cpu),
        memory: format!(
            "{}/{}",
            format_bytes(total.saturating_sub(available)),
            format_bytes(total)
        ),
        disk: format!("{}/{}", format_bytes(disk_used), format_bytes(disk_total)),
        uptime: format_uptime(uptime),
    })
}

#[cfg(not(target_os = "linux"))]
pub async fn collect(_disk_path: &Path) -> WorkerResult<Diagnostics> {
    Err(unavailable("diagnostics are only collected on Linux"))
}

fn unavailable(msg: &str) -> WorkerError {
    WorkerError::DiagnosticsUnavailable(msg.to_string())
}

#[cfg(target_os = "linux")]
async fn read_proc(path: &str) -> WorkerResult<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| WorkerError::DiagnosticsUnavailable(format!("{}: {}", path, e)))
}

#[cfg(target_os = "linux")]
fn disk_usage(path: &Path) -> WorkerResult<(u64, u64)> {
    // Fall back to the root filesystem until the storage root exists.
    let target = path.ancestors().find(|p| p.exists()).unwrap_or(Path::new("/"));
    let stat = nix::sys::statvfs::statvfs(target)
        .map_err(|e| WorkerError::DiagnosticsUnavailable(format!("statvfs: {}", e)))?;

    let block = stat.fragment_size() as u64;
    let total = stat.blocks() as u64 * block;
    let free = stat.blocks_free() as u64 * block;
    Ok((total.saturating_sub(free), total))
}

/// `(idle, total)` jiffies from the aggregate `cpu` line of `/proc/stat`.
pub fn parse_cpu_times(stat: &str) -> Option<(u64, u64)> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().ok())
        .collect::<Option<_>>()?;
    if fields.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some((idle, fields.iter().sum()))
}

/// Busy percentage between two samples.
pub fn cpu_usage(before: (u64, u64), after: (u64, u64)) -> f64 {
    let total = after.1.saturating_sub(before.1);
    if total == 0 {
        return 0.0;
    }
    let idle = after.0.saturating_sub(before.0);
    (total.saturating_sub(idle)) as f64 * 100.0 / total as f64
}

/// `(MemTotal, MemAvailable)` in bytes.
pub fn parse_meminfo(meminfo: &str) -> Option<(u64, u64)> {
    let field = |name: &str| -> Option<u64> {
        let line = meminfo.lines().find(|l| l.starts_with(name))?;
        // Format: "MemTotal:       16384000 kB"
        let kb: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
        Some(kb * 1024)
    };
    Some((field("MemTotal:")?, field("MemAvailable:")?))
}

/// Seconds since boot from `/proc/uptime`.
pub fn parse_uptime(uptime: &str) -> Option<u64> {
    let secs: f64 = uptime.split_whitespace().next()?.parse().ok()?;
    Some(secs as u64)
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let minutes = secs % 3_600 / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

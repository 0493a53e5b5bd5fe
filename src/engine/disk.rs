use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;
use sysinfo::Disks;
use tracing::{debug, warn};

const NETWORK_FILESYSTEMS: [&str; 7] = ["nfs", "nfs4", "cifs", "smbfs", "smb3", "9p", "fuse.sshfs"];

/// Space on the volume hosting a destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiskSpace {
    /// The probe failed; shown as a placeholder rather than an error
    Unknown,
    Known {
        total_bytes: u64,
        free_bytes: u64,
        available_bytes: u64,
    },
}

impl DiskSpace {
    /// Used fraction in thousandths, for a progress-bar style gauge
    pub fn used_per_mille(&self) -> Option<u32> {
        match *self {
            Self::Known {
                total_bytes,
                available_bytes,
                ..
            } if total_bytes > 0 => {
                let used = total_bytes.saturating_sub(available_bytes);
                Some(((u128::from(used) * 1000) / u128::from(total_bytes)) as u32)
            }
            _ => None,
        }
    }

    /// e.g. "12.3 GB free"
    pub fn free_text(&self) -> String {
        match *self {
            Self::Known {
                available_bytes, ..
            } => format!("{} free", format_bytes(available_bytes)),
            Self::Unknown => "--- GB free".to_string(),
        }
    }
}

/// Human-readable size with three significant digits
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    let decimals = if value >= 100.0 {
        0
    } else if value >= 10.0 {
        1
    } else {
        2
    };
    format!("{value:.decimals$} {}", UNITS[unit])
}

/// Probe the volume holding `path` without blocking the runtime
pub async fn probe(path: &Path) -> DiskSpace {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || probe_blocking(&path))
        .await
        .unwrap_or(DiskSpace::Unknown)
}

/// Local volumes are read through sysinfo; network shares through `df`
pub fn probe_blocking(path: &Path) -> DiskSpace {
    let existing = match unc_share_root(path) {
        // never fall back past the share onto the local root
        Some(share) => nearest_existing(path).filter(|p| p.starts_with(&share)),
        None if is_unc(path) => None,
        None => nearest_existing(path),
    };
    let Some(existing) = existing else {
        debug!("No existing ancestor for {}", path.display());
        return DiskSpace::Unknown;
    };

    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| existing.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    let network = is_unc(path)
        || disk.is_some_and(|d| {
            let fs = d.file_system().to_string_lossy().to_lowercase();
            NETWORK_FILESYSTEMS.contains(&fs.as_str())
        });

    let result = if network {
        probe_df(&existing)
    } else {
        disk.map(|d| DiskSpace::Known {
            total_bytes: d.total_space(),
            free_bytes: d.available_space(),
            available_bytes: d.available_space(),
        })
        .or_else(|| probe_df(&existing))
    };

    result.unwrap_or_else(|| {
        warn!("Could not determine free space for {}", path.display());
        DiskSpace::Unknown
    })
}

fn is_unc(path: &Path) -> bool {
    let s = path.to_string_lossy();
    s.starts_with(r"\\") || s.starts_with("//")
}

/// `//host/share` (or `\\host\share`) of a UNC path
fn unc_share_root(path: &Path) -> Option<PathBuf> {
    if !is_unc(path) {
        return None;
    }
    let s = path.to_string_lossy();
    let separator = &s[..1];
    let mut parts = s[2..].split(['/', '\\']).filter(|p| !p.is_empty());
    let host = parts.next()?;
    let share = parts.next()?;
    Some(PathBuf::from(format!("{separator}{separator}{host}{separator}{share}")))
}

fn nearest_existing(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
}

fn probe_df(path: &Path) -> Option<DiskSpace> {
    let output = Command::new("df").arg("-B1").arg(path).output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df(&String::from_utf8_lossy(&output.stdout))
}

/// Second line of `df -B1`: filesystem, size, used, available
fn parse_df(stdout: &str) -> Option<DiskSpace> {
    let line = stdout.lines().nth(1)?;
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }
    let total: u64 = parts[1].parse().ok()?;
    let used: u64 = parts[2].parse().ok()?;
    let available: u64 = parts[3].parse().ok()?;
    Some(DiskSpace::Known {
        total_bytes: total,
        free_bytes: total.saturating_sub(used),
        available_bytes: available,
    })
}

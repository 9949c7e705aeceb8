pub mod temperature;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use humansize::{format_size, FormatSizeOptions, DECIMAL};
use serde::Serialize;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tracing::{debug, warn};

/// Placeholder shown for any reading that could not be taken.
pub const NOT_AVAILABLE: &str = "N/A";

/// CPU usage is averaged over this window.
const CPU_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub used: u64,
    pub total: u64,
}

impl Usage {
    /// `None` when the total is zero, i.e. the figure is meaningless.
    pub fn new(used: u64, total: u64) -> Option<Self> {
        (total > 0).then(|| Self { used: used.min(total), total })
    }

    pub fn percent(&self) -> f64 {
        self.used as f64 * 100.0 / self.total as f64
    }
}

/// Readings for a single tick. Each metric is independent: a missing one
/// does not invalidate the others.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub cpu_temp_c: Option<f32>,
    pub cpu_usage: Option<f32>,
    pub ram: Option<Usage>,
    pub disk: Option<Usage>,
    pub taken_at: DateTime<Utc>,
}

/// One labelled line of a rendered report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportField {
    pub name: &'static str,
    pub value: String,
    pub inline: bool,
}

impl MetricsSnapshot {
    pub fn unavailable() -> Self {
        Self { cpu_temp_c: None, cpu_usage: None, ram: None, disk: None, taken_at: Utc::now() }
    }

    /// The four report fields, always populated.
    pub fn fields(&self) -> [ReportField; 4] {
        [
            ReportField {
                name: "🌡️ CPU Temperature",
                value: format_temperature(self.cpu_temp_c),
                inline: true,
            },
            ReportField {
                name: "📊 CPU Usage",
                value: format_percent(self.cpu_usage),
                inline: true,
            },
            ReportField {
                name: "🧠 RAM Usage",
                value: format_usage(self.ram),
                inline: false,
            },
            ReportField {
                name: "💾 Disk Usage",
                value: format_usage(self.disk),
                inline: false,
            },
        ]
    }
}

pub fn format_temperature(celsius: Option<f32>) -> String {
    celsius.map_or_else(|| NOT_AVAILABLE.to_string(), |t| format!("{:.1}°C", t))
}

pub fn format_percent(percent: Option<f32>) -> String {
    percent.map_or_else(|| NOT_AVAILABLE.to_string(), |p| format!("{:.1}%", p))
}

pub fn format_usage(usage: Option<Usage>) -> String {
    match usage {
        Some(u) => format!(
            "{} / {} ({:.1}%)",
            format_bytes(u.used),
            format_bytes(u.total),
            u.percent()
        ),
        None => NOT_AVAILABLE.to_string(),
    }
}

fn format_bytes(bytes: u64) -> String {
    format_size(bytes, FormatSizeOptions::from(DECIMAL).decimal_places(1))
}

// ─── Sources ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait MetricsSource: Send + Sync + 'static {
    /// Take a fresh snapshot. Never fails; unreadable metrics are `None`.
    async fn snapshot(&self) -> MetricsSnapshot;
}

/// Reads the local host through sysinfo, `vcgencmd` and sysfs.
pub struct SystemMetrics {
    disk_path: PathBuf,
}

impl SystemMetrics {
    pub fn new(disk_path: impl Into<PathBuf>) -> Self {
        Self { disk_path: disk_path.into() }
    }
}

#[async_trait]
impl MetricsSource for SystemMetrics {
    async fn snapshot(&self) -> MetricsSnapshot {
        let disk_path = self.disk_path.clone();
        // CPU sampling sleeps, keep it off the runtime threads.
        match tokio::task::spawn_blocking(move || collect(&disk_path)).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Metrics collection task failed");
                MetricsSnapshot::unavailable()
            }
        }
    }
}

fn collect(disk_path: &Path) -> MetricsSnapshot {
    let mut sys = System::new();

    sys.refresh_cpu();
    std::thread::sleep(CPU_SAMPLE_WINDOW.max(MINIMUM_CPU_UPDATE_INTERVAL));
    sys.refresh_cpu();
    sys.refresh_memory();

    let cpu_usage = (!sys.cpus().is_empty()).then(|| sys.global_cpu_info().cpu_usage());
    let ram = Usage::new(sys.used_memory(), sys.total_memory());
    let disk = disk_usage(disk_path);
    let cpu_temp_c = temperature::read_cpu_temperature();

    debug!(
        cpu_temp_c = ?cpu_temp_c,
        cpu_usage = ?cpu_usage,
        disk_found = disk.is_some(),
        "Collected system metrics"
    );

    MetricsSnapshot { cpu_temp_c, cpu_usage, ram, disk, taken_at: Utc::now() }
}

/// Usage of the filesystem holding `path`: the disk with the longest
/// mount point that is a prefix of it.
fn disk_usage(path: &Path) -> Option<Usage> {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(d) => Usage::new(d.total_space().saturating_sub(d.available_space()), d.total_space()),
        None => {
            warn!(path = %path.display(), "No mounted filesystem found for disk path");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_with_zero_total_is_unavailable() {
        assert_eq!(Usage::new(10, 0), None);
    }

    #[test]
    fn usage_percent() {
        let u = Usage::new(1_000_000_000, 4_000_000_000).unwrap();
        assert!((u.percent() - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn usage_is_clamped_to_total() {
        assert_eq!(Usage::new(12, 10).unwrap().used, 10);
    }

    #[test]
    fn unavailable_snapshot_still_has_four_fields() {
        let fields = MetricsSnapshot::unavailable().fields();
        assert_eq!(fields.len(), 4);
        for field in &fields {
            assert_eq!(field.value, NOT_AVAILABLE);
        }
    }

    #[test]
    fn missing_temperature_only_affects_its_field() {
        let snapshot = MetricsSnapshot {
            cpu_temp_c: None,
            cpu_usage: Some(12.34),
            ram: Usage::new(1_000_000_000, 4_000_000_000),
            disk: Usage::new(8_000_000_000, 32_000_000_000),
            taken_at: Utc::now(),
        };

        let fields = snapshot.fields();
        assert_eq!(fields[0].value, "N/A");
        assert_eq!(fields[1].value, "12.3%");
        assert!(fields[2].value.ends_with("(25.0%)"));
        assert!(fields[2].value.contains(" / "));
        assert!(fields[3].value.ends_with("(25.0%)"));
        assert!(fields[0].inline && fields[1].inline);
        assert!(!fields[2].inline && !fields[3].inline);
    }

    #[test]
    fn temperature_formatting() {
        assert_eq!(format_temperature(Some(48.31)), "48.3°C");
        assert_eq!(format_temperature(None), "N/A");
    }

    #[test]
    fn sizes_use_si_units() {
        let value = format_usage(Usage::new(1_500_000_000, 4_000_000_000));
        assert!(value.contains("GB"), "{value}");
        assert!(value.ends_with("(37.5%)"), "{value}");
    }

    #[test]
    fn unknown_disk_path_is_unavailable() {
        // No filesystem is mounted at a relative path.
        assert_eq!(disk_usage(Path::new("relative/nowhere")), None);
    }

    #[tokio::test]
    async fn system_snapshot_never_fails() {
        let snapshot = SystemMetrics::new("/").snapshot().await;
        assert_eq!(snapshot.fields().len(), 4);
        assert!(snapshot.ram.is_some());
    }
}

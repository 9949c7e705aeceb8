//! CPU temperature probes, tried in order until one answers.
//!
//! 1. `vcgencmd measure_temp` on Raspberry Pi firmware
//! 2. the first kernel thermal zone
//! 3. the hottest sensor sysinfo can see

use std::process::{Command, Stdio};

use sysinfo::Components;
use tracing::debug;

const THERMAL_ZONE_PATH: &str = "/sys/class/thermal/thermal_zone0/temp";

pub fn read_cpu_temperature() -> Option<f32> {
    let reading = vcgencmd_temperature()
        .or_else(thermal_zone_temperature)
        .or_else(component_temperature);

    if reading.is_none() {
        debug!("No CPU temperature source available");
    }
    reading
}

fn vcgencmd_temperature() -> Option<f32> {
    let output = Command::new("vcgencmd")
        .arg("measure_temp")
        .stderr(Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }
    parse_vcgencmd(&String::from_utf8_lossy(&output.stdout))
}

fn thermal_zone_temperature() -> Option<f32> {
    let raw = std::fs::read_to_string(THERMAL_ZONE_PATH).ok()?;
    parse_millidegrees(&raw)
}

fn component_temperature() -> Option<f32> {
    let components = Components::new_with_refreshed_list();
    components
        .list()
        .iter()
        .map(|c| c.temperature())
        .filter(|t| plausible(*t))
        .reduce(f32::max)
}

/// `temp=48.3'C` → 48.3
pub(crate) fn parse_vcgencmd(output: &str) -> Option<f32> {
    let value = output.trim().strip_prefix("temp=")?;
    let value = value.strip_suffix("'C").unwrap_or(value);
    value.trim().parse::<f32>().ok().filter(|t| plausible(*t))
}

/// `48312` (millidegrees Celsius) → 48.312
pub(crate) fn parse_millidegrees(raw: &str) -> Option<f32> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .map(|m| m as f32 / 1000.0)
        .filter(|t| plausible(*t))
}

// Sensors report 0 or garbage when they are not wired up.
fn plausible(celsius: f32) -> bool {
    celsius.is_finite() && celsius > 0.0 && celsius < 150.0
}

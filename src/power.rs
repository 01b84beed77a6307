//! Battery-power detection (C6).
//!
//! The primary source is a UPower DBus property read, grounded in
//! `other_examples`'s `cosmic-ext-disks` manifest, which is where `zbus`
//! enters this corpus — `backup-btrfs` has no DBus dependency of its own.
//! A `/sys` read is the fallback, matching the original's `btd_on_battery`.

use crate::error::PowerProbeError;
use std::fs;
use std::path::Path;
use zbus::blocking::Connection;
use zbus::zvariant::OwnedValue;

#[cfg(test)]
use mockall::automock;

const UPOWER_DEST: &str = "org.freedesktop.UPower";
const UPOWER_BATTERY_PATH: &str = "/org/freedesktop/UPower/devices/battery_BAT0";
const UPOWER_DEVICE_IFACE: &str = "org.freedesktop.UPower.Device";
const SYS_BATTERY_STATUS: &str = "/sys/class/power_supply/BAT0/status";

/// UPower's `State` enum value meaning the battery is discharging.
const UPOWER_STATE_DISCHARGING: u32 = 2;

#[cfg_attr(test, automock)]
pub trait PowerProbe {
    /// Whether the host is currently running on battery power. Never
    /// fails: a missing battery, DBus failure, or unreadable `/sys` entry
    /// all resolve to `false`.
    fn on_battery(&self) -> bool;
}

pub struct UPowerProbe;

impl PowerProbe for UPowerProbe {
    fn on_battery(&self) -> bool {
        match query_dbus() {
            Ok(state) => state == UPOWER_STATE_DISCHARGING,
            Err(e) => {
                log::debug!("UPower query failed ({e}), falling back to /sys");
                query_sys(Path::new(SYS_BATTERY_STATUS)).unwrap_or(false)
            }
        }
    }
}

fn query_dbus() -> Result<u32, PowerProbeError> {
    let connection =
        Connection::system().map_err(|e| PowerProbeError::Dbus(e.to_string()))?;

    let proxy = zbus::blocking::Proxy::new(
        &connection,
        UPOWER_DEST,
        UPOWER_BATTERY_PATH,
        "org.freedesktop.DBus.Properties",
    )
    .map_err(|e| PowerProbeError::Dbus(e.to_string()))?;

    let value: OwnedValue = proxy
        .call("Get", &(UPOWER_DEVICE_IFACE, "State"))
        .map_err(|e| PowerProbeError::Dbus(e.to_string()))?;

    u32::try_from(value).map_err(|e| PowerProbeError::Dbus(e.to_string()))
}

fn query_sys(path: &Path) -> Result<bool, PowerProbeError> {
    if !path.exists() {
        return Ok(false);
    }

    let contents = fs::read_to_string(path).map_err(|e| PowerProbeError::Sys {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(contents.trim().starts_with("Discharging"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn missing_sys_path_is_not_on_battery() {
        assert!(!query_sys(Path::new("/nonexistent/path/for/tests")).unwrap());
    }

    #[test]
    fn discharging_status_is_on_battery() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Discharging").unwrap();
        assert!(query_sys(file.path()).unwrap());
    }

    #[test]
    fn charging_status_is_not_on_battery() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Charging").unwrap();
        assert!(!query_sys(file.path()).unwrap());
    }
}

//! Crate configuration parameters.
//!
//! All tunable knobs for a [`Gpio`](crate::Gpio) context. Defaults match
//! the stock Raspberry Pi OS environment; tests point `cpuinfo_path` at
//! fixture files to exercise board detection without the real hardware.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Context configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identification file used for board detection.
    pub cpuinfo_path: PathBuf,
    /// Explicit memory device to map instead of the default
    /// `/dev/gpiomem` → `/dev/mem` probe order. The override is mapped at
    /// offset 0, i.e. it must expose the GPIO block directly.
    pub mem_device_override: Option<PathBuf>,
    /// Frequency newly started soft-PWM channels run at (Hz).
    pub pwm_frequency_hz: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cpuinfo_path: PathBuf::from("/proc/cpuinfo"),
            mem_device_override: None,
            // Matches the classic soft-PWM default; callers retune per
            // channel afterwards.
            pwm_frequency_hz: 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = Config::default();
        assert_eq!(c.cpuinfo_path, PathBuf::from("/proc/cpuinfo"));
        assert!(c.mem_device_override.is_none());
        assert!(c.pwm_frequency_hz > 0.0);
    }

    #[test]
    fn serde_roundtrip() {
        let mut c = Config::default();
        c.mem_device_override = Some(PathBuf::from("/dev/gpiomem0"));
        let json = serde_json::to_string(&c).unwrap();
        let c2: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(c.cpuinfo_path, c2.cpuinfo_path);
        assert_eq!(c.mem_device_override, c2.mem_device_override);
        assert!((c.pwm_frequency_hz - c2.pwm_frequency_hz).abs() < f32::EPSILON);
    }
}

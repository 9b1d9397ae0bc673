//! Sensor collaborators
//!
//! Reads are synchronous and never fail. A probe that cannot be read reports
//! [`DISCONNECTED_CELSIUS`], which is published like any other value.

use crate::config::{SensorBackend, SensorsSection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Temperature reported by a disconnected one-wire probe
pub const DISCONNECTED_CELSIUS: f32 = -127.0;
/// Full scale of the 10-bit light ADC
pub const LIGHT_FULL_SCALE: i32 = 1023;

/// Sensor collaborator
pub trait SensorSource: Send {
    /// Raw ambient light reading
    fn read_light(&mut self) -> i32;

    /// Temperature in degrees Celsius
    fn read_temperature(&mut self) -> f32;
}

/// Random-walk sensors for hosts without hardware
#[derive(Debug)]
pub struct SimulatedSensors {
    rng: StdRng,
    light: i32,
    temperature: f32,
}

impl SimulatedSensors {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Deterministic sequence for tests
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            light: 512,
            temperature: 21.5,
        }
    }
}

impl Default for SimulatedSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSource for SimulatedSensors {
    fn read_light(&mut self) -> i32 {
        self.light = (self.light + self.rng.gen_range(-25..=25)).clamp(0, LIGHT_FULL_SCALE);
        self.light
    }

    fn read_temperature(&mut self) -> f32 {
        self.temperature = (self.temperature + self.rng.gen_range(-0.2..=0.2)).clamp(-10.0, 45.0);
        self.temperature
    }
}

/// Sensors exposed through sysfs (IIO illuminance, thermal zones)
#[derive(Debug, Clone)]
pub struct SysfsSensors {
    light_path: PathBuf,
    temperature_path: PathBuf,
}

impl SysfsSensors {
    pub fn new(light_path: impl Into<PathBuf>, temperature_path: impl Into<PathBuf>) -> Self {
        Self {
            light_path: light_path.into(),
            temperature_path: temperature_path.into(),
        }
    }

    fn read_number(path: &Path) -> Option<f64> {
        match std::fs::read_to_string(path) {
            Ok(text) => text.trim().parse().ok(),
            Err(e) => {
                debug!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }
}

impl SensorSource for SysfsSensors {
    fn read_light(&mut self) -> i32 {
        Self::read_number(&self.light_path)
            .map(|raw| (raw.round() as i32).clamp(0, i32::MAX))
            .unwrap_or(0)
    }

    /// Thermal zones report millidegrees
    fn read_temperature(&mut self) -> f32 {
        Self::read_number(&self.temperature_path)
            .map(|milli| (milli / 1000.0) as f32)
            .unwrap_or(DISCONNECTED_CELSIUS)
    }
}

/// Build the configured sensor backend
pub fn from_config(config: &SensorsSection) -> Box<dyn SensorSource> {
    match config.source {
        SensorBackend::Simulated => Box::new(SimulatedSensors::new()),
        SensorBackend::Sysfs => Box::new(SysfsSensors::new(
            &config.light_path,
            &config.temperature_path,
        )),
    }
}

impl<T: SensorSource + ?Sized> SensorSource for Box<T> {
    fn read_light(&mut self) -> i32 {
        (**self).read_light()
    }

    fn read_temperature(&mut self) -> f32 {
        (**self).read_temperature()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_simulated_values_stay_in_range() {
        let mut sensors = SimulatedSensors::seeded(42);
        for _ in 0..1000 {
            let light = sensors.read_light();
            assert!((0..=LIGHT_FULL_SCALE).contains(&light));
            let temperature = sensors.read_temperature();
            assert!((-10.0..=45.0).contains(&temperature));
        }
    }

    #[test]
    fn test_sysfs_reads_files() {
        let mut light = tempfile::NamedTempFile::new().unwrap();
        writeln!(light, "512").unwrap();
        let mut temperature = tempfile::NamedTempFile::new().unwrap();
        writeln!(temperature, "23450").unwrap();

        let mut sensors = SysfsSensors::new(light.path(), temperature.path());
        assert_eq!(sensors.read_light(), 512);
        assert!((sensors.read_temperature() - 23.45).abs() < 0.001);
    }

    #[test]
    fn test_missing_probe_reports_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut sensors = SysfsSensors::new(dir.path().join("light"), dir.path().join("temp"));
        assert_eq!(sensors.read_temperature(), DISCONNECTED_CELSIUS);
        assert_eq!(sensors.read_light(), 0);
    }
}

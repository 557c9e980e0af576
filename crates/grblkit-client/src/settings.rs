//! Controller settings.
//!
//! Decodes the `$n=value` lines the controller prints in response to `$$`
//! into a typed [`Settings`] snapshot, converting units at parse time.
//! Unknown setting numbers are ignored so newer firmware keeps working.

use grblkit_core::{Accel, Distance, Rate, SettingsError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mask of axes whose port signal is inverted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInvertMask {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl PortInvertMask {
    fn from_bits(v: u32) -> PortInvertMask {
        PortInvertMask {
            x: v & (1 << 0) != 0,
            y: v & (1 << 1) != 0,
            z: v & (1 << 2) != 0,
        }
    }
}

/// `$10`/`$13` status report options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReportOptions {
    /// Report machine position rather than work position.
    pub machine_position: bool,
    /// Include buffer occupancy data in reports.
    pub buffer_data: bool,
    /// Report in inches.
    pub inches: bool,
}

/// A value per axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

/// Typed view of the controller's configuration.
///
/// Updated incrementally as `$n=value` lines arrive; only a fresh
/// connection resets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub step_pulse: Duration,
    pub step_idle_delay: Duration,
    pub step_port_invert: PortInvertMask,
    pub direction_port_invert: PortInvertMask,
    pub step_enable_invert: bool,
    pub limit_pins_invert: bool,
    pub probe_pin_invert: bool,
    pub status_report: StatusReportOptions,
    pub junction_deviation: Distance,
    pub arc_tolerance: Distance,
    pub soft_limits: bool,
    pub hard_limits: bool,
    pub homing: bool,
    pub homing_direction_invert: PortInvertMask,
    pub homing_feed: Rate,
    pub homing_seek: Rate,
    pub homing_debounce: Duration,
    pub homing_pull_off: Distance,
    pub max_spindle_speed: u32,
    pub min_spindle_speed: u32,
    pub laser_mode: bool,
    pub steps_per_millimeter: Axes<f64>,
    pub max_rate: Axes<Rate>,
    pub max_acceleration: Axes<Accel>,
    pub max_travel: Axes<Distance>,
}

impl Settings {
    /// Apply one `$n=value` line.
    ///
    /// Unknown keys are ignored. A malformed value for a recognized key
    /// is an error, but never poisons later lines.
    pub fn apply_line(&mut self, line: &str) -> Result<(), SettingsError> {
        let line = line.trim();
        let Some((key, val)) = line.split_once('=') else {
            return Err(SettingsError::Malformed {
                line: line.to_string(),
            });
        };

        match key {
            "$0" => self.step_pulse = parse_duration(key, val, Duration::from_micros(1))?,
            "$1" => self.step_idle_delay = parse_duration(key, val, Duration::from_millis(1))?,
            "$2" => self.step_port_invert = parse_mask(key, val)?,
            "$3" => self.direction_port_invert = parse_mask(key, val)?,
            "$4" => self.step_enable_invert = parse_flag(val),
            "$5" => self.limit_pins_invert = parse_flag(val),
            "$6" => self.probe_pin_invert = parse_flag(val),
            "$10" => {
                let bits = parse_u32(key, val)?;
                self.status_report.machine_position = bits & (1 << 0) != 0;
                self.status_report.buffer_data = bits & (1 << 1) != 0;
            }
            "$11" => self.junction_deviation = parse_millimeters(key, val)?,
            "$12" => self.arc_tolerance = parse_millimeters(key, val)?,
            "$13" => self.status_report.inches = parse_flag(val),
            "$20" => self.soft_limits = parse_flag(val),
            "$21" => self.hard_limits = parse_flag(val),
            "$22" => self.homing = parse_flag(val),
            "$23" => self.homing_direction_invert = parse_mask(key, val)?,
            "$24" => self.homing_feed = parse_feed_rate(key, val)?,
            "$25" => self.homing_seek = parse_feed_rate(key, val)?,
            "$26" => self.homing_debounce = parse_duration(key, val, Duration::from_millis(1))?,
            "$27" => self.homing_pull_off = parse_millimeters(key, val)?,
            "$30" => self.max_spindle_speed = parse_u32(key, val)?,
            "$31" => self.min_spindle_speed = parse_u32(key, val)?,
            "$32" => self.laser_mode = parse_flag(val),
            "$100" => self.steps_per_millimeter.x = parse_f64(key, val)?,
            "$101" => self.steps_per_millimeter.y = parse_f64(key, val)?,
            "$102" => self.steps_per_millimeter.z = parse_f64(key, val)?,
            "$110" => self.max_rate.x = parse_feed_rate(key, val)?,
            "$111" => self.max_rate.y = parse_feed_rate(key, val)?,
            "$112" => self.max_rate.z = parse_feed_rate(key, val)?,
            "$120" => self.max_acceleration.x = parse_acceleration(key, val)?,
            "$121" => self.max_acceleration.y = parse_acceleration(key, val)?,
            "$122" => self.max_acceleration.z = parse_acceleration(key, val)?,
            "$130" => self.max_travel.x = parse_millimeters(key, val)?,
            "$131" => self.max_travel.y = parse_millimeters(key, val)?,
            "$132" => self.max_travel.z = parse_millimeters(key, val)?,
            // unknown keys: newer firmware, ignore
            _ => {}
        }

        Ok(())
    }
}

fn parse_f64(key: &str, val: &str) -> Result<f64, SettingsError> {
    val.parse().map_err(|err: std::num::ParseFloatError| {
        SettingsError::InvalidValue {
            key: key.to_string(),
            reason: err.to_string(),
        }
    })
}

fn parse_u32(key: &str, val: &str) -> Result<u32, SettingsError> {
    // settings dumps print integers as e.g. "1000." on some builds
    let v = parse_f64(key, val)?;
    Ok(v as u32)
}

fn parse_flag(val: &str) -> bool {
    val == "1"
}

fn parse_mask(key: &str, val: &str) -> Result<PortInvertMask, SettingsError> {
    Ok(PortInvertMask::from_bits(parse_u32(key, val)?))
}

fn parse_duration(key: &str, val: &str, unit: Duration) -> Result<Duration, SettingsError> {
    Ok(unit.mul_f64(parse_f64(key, val)?))
}

fn parse_millimeters(key: &str, val: &str) -> Result<Distance, SettingsError> {
    Ok(Distance::MILLIMETER * parse_f64(key, val)?)
}

/// Feed settings are millimeters per minute.
fn parse_feed_rate(key: &str, val: &str) -> Result<Rate, SettingsError> {
    Ok((Distance::MILLIMETER * parse_f64(key, val)?).rate(Duration::from_secs(60)))
}

/// Acceleration settings are millimeters per second squared.
fn parse_acceleration(key: &str, val: &str) -> Result<Accel, SettingsError> {
    Ok((Distance::MILLIMETER * parse_f64(key, val)?)
        .rate(Duration::from_secs(1))
        .accel(Duration::from_secs(1)))
}

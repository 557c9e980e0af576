//! Physical quantities
//!
//! Distances, rates, and accelerations used for unit-correct decoding of
//! controller settings. Distances are stored as integer nanometers so
//! settings survive round trips without drift.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use std::time::Duration;

/// A physical distance, stored as integer nanometers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Distance(i64);

impl Distance {
    /// One nanometer.
    pub const NANOMETER: Distance = Distance(1);
    /// One micrometer.
    pub const MICROMETER: Distance = Distance(1_000);
    /// One millimeter.
    pub const MILLIMETER: Distance = Distance(1_000_000);
    /// One centimeter.
    pub const CENTIMETER: Distance = Distance(10_000_000);
    /// One meter.
    pub const METER: Distance = Distance(1_000_000_000);
    /// One kilometer.
    pub const KILOMETER: Distance = Distance(1_000_000_000_000);
    /// One inch.
    pub const INCH: Distance = Distance(25_400_000);
    /// One foot.
    pub const FOOT: Distance = Distance(304_800_000);
    /// One yard.
    pub const YARD: Distance = Distance(914_400_000);
    /// One mile.
    pub const MILE: Distance = Distance(1_609_344_000_000);

    /// Build a distance from a millimeter value.
    pub fn from_millimeters(mm: f64) -> Distance {
        Self::MILLIMETER * mm
    }

    pub fn nanometers(self) -> i64 {
        self.0
    }

    pub fn millimeters(self) -> f64 {
        self.0 as f64 / Self::MILLIMETER.0 as f64
    }

    pub fn inches(self) -> f64 {
        self.0 as f64 / Self::INCH.0 as f64
    }

    /// The rate covering this distance once per `period`.
    pub fn rate(self, period: Duration) -> Rate {
        Rate {
            distance: self,
            period,
        }
    }

    /// Straight-line distance across two perpendicular axes.
    pub fn hypot(x: Distance, y: Distance) -> Distance {
        Distance(((x.0 as f64).hypot(y.0 as f64)) as i64)
    }

    /// Straight-line distance across three perpendicular axes.
    pub fn hypot3(x: Distance, y: Distance, z: Distance) -> Distance {
        let xy = Self::hypot(x, y);
        Self::hypot(xy, z)
    }
}

impl Add for Distance {
    type Output = Distance;

    fn add(self, rhs: Distance) -> Distance {
        Distance(self.0 + rhs.0)
    }
}

impl Sub for Distance {
    type Output = Distance;

    fn sub(self, rhs: Distance) -> Distance {
        Distance(self.0 - rhs.0)
    }
}

impl Mul<i64> for Distance {
    type Output = Distance;

    fn mul(self, rhs: i64) -> Distance {
        Distance(self.0 * rhs)
    }
}

impl Mul<f64> for Distance {
    type Output = Distance;

    fn mul(self, rhs: f64) -> Distance {
        Distance((self.0 as f64 * rhs) as i64)
    }
}

/// A speed: a distance covered once per period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    distance: Distance,
    period: Duration,
}

impl Rate {
    pub fn new(distance: Distance, period: Duration) -> Rate {
        Rate { distance, period }
    }

    pub fn mm_per_min(self) -> f64 {
        self.distance.millimeters() / (self.period.as_secs_f64() / 60.0)
    }

    pub fn in_per_min(self) -> f64 {
        self.distance.inches() / (self.period.as_secs_f64() / 60.0)
    }

    pub fn kph(self) -> f64 {
        self.distance.0 as f64 / Distance::KILOMETER.0 as f64 / (self.period.as_secs_f64() / 3600.0)
    }

    pub fn mph(self) -> f64 {
        self.distance.0 as f64 / Distance::MILE.0 as f64 / (self.period.as_secs_f64() / 3600.0)
    }

    /// How long covering `d` takes at this rate.
    pub fn time_required(self, d: Distance) -> Duration {
        self.period.mul_f64(d.0 as f64 / self.distance.0 as f64)
    }

    /// The acceleration reaching this rate once per `period`.
    pub fn accel(self, period: Duration) -> Accel {
        Accel {
            distance: self.distance,
            rate_period: self.period,
            period,
        }
    }
}

/// An acceleration: a rate gained once per period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accel {
    distance: Distance,
    rate_period: Duration,
    period: Duration,
}

impl Accel {
    pub fn mm_per_sec2(self) -> f64 {
        self.distance.millimeters() / self.rate_period.as_secs_f64() / self.period.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_conversions() {
        assert_eq!(Distance::FOOT.millimeters(), 304.8);
        assert_eq!(Distance::INCH.millimeters(), 25.4);
        assert_eq!((Distance::METER * 254).inches(), 10000.0);
    }

    #[test]
    fn test_distance_from_millimeters() {
        assert_eq!(Distance::from_millimeters(500.0).nanometers(), 500_000_000);
        assert_eq!(Distance::from_millimeters(500.0).millimeters(), 500.0);
    }

    #[test]
    fn test_rate_mph() {
        let d = Distance::KILOMETER * 402_336;
        let r = d.rate(Duration::from_secs(3600));
        assert_eq!(r.mph(), 250_000.0);
    }

    #[test]
    fn test_rate_mm_per_min() {
        let r = Distance::from_millimeters(500.0).rate(Duration::from_secs(60));
        assert_eq!(r.mm_per_min(), 500.0);
    }

    #[test]
    fn test_time_required() {
        let r = Distance::from_millimeters(100.0).rate(Duration::from_secs(60));
        assert_eq!(
            r.time_required(Distance::from_millimeters(50.0)),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_accel() {
        let a = Distance::from_millimeters(10.0)
            .rate(Duration::from_secs(1))
            .accel(Duration::from_secs(1));
        assert_eq!(a.mm_per_sec2(), 10.0);
    }

    #[test]
    fn test_hypot() {
        let d = Distance::hypot(Distance::MILLIMETER * 3, Distance::MILLIMETER * 4);
        assert_eq!(d.millimeters(), 5.0);
    }
}

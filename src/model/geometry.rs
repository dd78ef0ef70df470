//! Points in scene coordinates and linear/dB conversion helpers.

use serde::{Deserialize, Serialize};

/// A point in the simulation scene (meters).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point3) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

impl From<[f64; 3]> for Point3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl std::fmt::Display for Point3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Linear power to decibels.
pub fn l2db(val: f64) -> f64 {
    10.0 * val.log10()
}

/// Decibels to linear power.
pub fn db2l(val: f64) -> f64 {
    10f64.powf(val / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(3.0, 4.0, 12.0);
        assert!((a.distance(&b) - 13.0).abs() < 1e-12);
        assert_eq!(a.distance(&b), b.distance(&a));
    }

    #[test]
    fn test_db_conversion() {
        assert!((l2db(100.0) - 20.0).abs() < 1e-12);
        assert!((db2l(-30.0) - 1e-3).abs() < 1e-15);
        assert!((db2l(l2db(0.25)) - 0.25).abs() < 1e-12);
    }
}

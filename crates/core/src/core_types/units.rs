//! Semantic unit type for grid lengths
//!
//! The integrator works in meters on bare `f64`s; the grid is configured in
//! kilometers through this newtype so a config value cannot be read in the
//! wrong unit.
//!
//! # Usage
//! ```
//! use otu_core::core_types::units::Kilometers;
//!
//! let cell = Kilometers::new(2.5);
//! assert!((*cell - 2.5).abs() < 1e-12);
//! assert!((cell.squared() - 6.25).abs() < 1e-12);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Length in kilometers, serialised as a bare number
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Kilometers(f64);

impl Deref for Kilometers {
    type Target = f64;
    #[inline]
    fn deref(&self) -> &f64 {
        &self.0
    }
}

impl Kilometers {
    /// Wrap a length in kilometers
    #[inline]
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Kilometers(value)
    }

    /// Raw value
    #[inline]
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Area of a square with this side, km²
    #[inline]
    #[must_use]
    pub fn squared(self) -> f64 {
        self.0 * self.0
    }
}

impl fmt::Display for Kilometers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} km", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_side_area() {
        let side = Kilometers::new(1.5);
        assert_eq!(side.value(), 1.5);
        assert_eq!(side.squared(), 2.25);
        assert!(Kilometers::new(1.0) < side);
    }

    #[test]
    fn test_serialises_as_bare_number() {
        let json = serde_json::to_string(&Kilometers::new(5.0)).unwrap();
        assert_eq!(json, "5.0");
        let back: Kilometers = serde_json::from_str("2").unwrap();
        assert_eq!(*back, 2.0);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Kilometers::new(1.0)), "1.000 km");
    }
}

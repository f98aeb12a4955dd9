//! Fixed-point node coordinates

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of fixed-point units per degree (1e-7 degree resolution)
pub const COORDINATE_PRECISION: i32 = 10_000_000;

const UNDEFINED_COORDINATE: i32 = i32::MAX;

/// A node position stored as 1e-7 degree integers, the OSM convention
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    x: i32,
    y: i32,
}

impl Location {
    /// Location used where no coordinate is known
    pub const UNDEFINED: Location = Location {
        x: UNDEFINED_COORDINATE,
        y: UNDEFINED_COORDINATE,
    };

    /// Build from fixed-point longitude (x) and latitude (y)
    pub const fn from_fixed(x: i32, y: i32) -> Self {
        Location { x, y }
    }

    pub fn from_degrees(lon: f64, lat: f64) -> Self {
        Location {
            x: degrees_to_fixed(lon),
            y: degrees_to_fixed(lat),
        }
    }

    pub const fn x(&self) -> i32 {
        self.x
    }

    pub const fn y(&self) -> i32 {
        self.y
    }

    pub fn lon(&self) -> f64 {
        f64::from(self.x) / f64::from(COORDINATE_PRECISION)
    }

    pub fn lat(&self) -> f64 {
        f64::from(self.y) / f64::from(COORDINATE_PRECISION)
    }

    /// Set and inside the WGS84 range
    pub fn is_valid(&self) -> bool {
        self.is_defined()
            && (-180 * COORDINATE_PRECISION..=180 * COORDINATE_PRECISION).contains(&self.x)
            && (-90 * COORDINATE_PRECISION..=90 * COORDINATE_PRECISION).contains(&self.y)
    }

    pub fn is_defined(&self) -> bool {
        self.x != UNDEFINED_COORDINATE && self.y != UNDEFINED_COORDINATE
    }
}

impl Default for Location {
    fn default() -> Self {
        Location::UNDEFINED
    }
}

fn degrees_to_fixed(value: f64) -> i32 {
    (value * f64::from(COORDINATE_PRECISION)).round() as i32
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "({:.7} {:.7})", self.lon(), self.lat())
        } else {
            f.write_str("(undefined)")
        }
    }
}

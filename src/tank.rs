//! Tank model: geometry, volume and remaining capacity.
//!
//! Pure arithmetic, no I/O.  The tank is a vertical cylinder with the
//! ultrasonic sensor mounted at the top looking down, so the measured
//! distance is the empty air gap above the liquid:
//!
//! ```text
//!   sensor ▼ ─┬─────────────┐
//!             │ distance    │
//!             ├─ ~~~~~~~~~ ─┤ ─┬─
//!             │   liquid    │  │ height − distance
//!             └─────────────┘ ─┴─
//! ```
//!
//! Lengths are centimetres, volumes are litres.

use core::fmt;

use serde::{Deserialize, Serialize};

/// π to four places, as used by the deployed agent, so reported volumes
/// match its dashboards.  Percentages do not depend on it.
pub const PI_APPROX: f32 = 3.1416;

/// cm³ → litres divisor.  Must change together with the length unit.
pub const CUBIC_CM_PER_LITRE: f32 = 1000.0;

/// Cylinder volume in litres for a diameter and a fill height in cm.
///
/// Negative heights produce negative volumes; callers rely on that to
/// surface sensor readings that are beyond the tank bottom.
pub fn volume(diameter_cm: f32, height_cm: f32) -> f32 {
    let radius = diameter_cm / 2.0;
    PI_APPROX * radius * radius * height_cm / CUBIC_CM_PER_LITRE
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Physical dimensions of the tank.  Fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TankGeometry {
    pub diameter_cm: f32,
    pub height_cm: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryError {
    /// Diameter is zero, negative, or not finite.
    InvalidDiameter,
    /// Height is zero, negative, or not finite.
    InvalidHeight,
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDiameter => write!(f, "tank diameter must be a positive length"),
            Self::InvalidHeight => write!(f, "tank height must be a positive length"),
        }
    }
}

impl TankGeometry {
    pub fn new(diameter_cm: f32, height_cm: f32) -> Result<Self, GeometryError> {
        let geometry = Self {
            diameter_cm,
            height_cm,
        };
        geometry.validate()?;
        Ok(geometry)
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(self.diameter_cm.is_finite() && self.diameter_cm > 0.0) {
            return Err(GeometryError::InvalidDiameter);
        }
        if !(self.height_cm.is_finite() && self.height_cm > 0.0) {
            return Err(GeometryError::InvalidHeight);
        }
        Ok(())
    }
}

impl Default for TankGeometry {
    fn default() -> Self {
        Self {
            diameter_cm: 700.0,
            height_cm: 300.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// Remaining liquid derived from one distance sample.
///
/// Deliberately unclamped: a negative or >100 % value means the sensor or
/// the geometry assumptions are wrong, and downstream must see it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityReading {
    pub remaining_litres: f32,
    pub percent_full: f32,
}

/// Capacity for a measured air gap, given the full-tank volume.
pub fn capacity(total_litres: f32, geometry: &TankGeometry, distance_cm: f32) -> CapacityReading {
    let remaining_height = geometry.height_cm - distance_cm;
    let remaining_litres = volume(geometry.diameter_cm, remaining_height);
    CapacityReading {
        remaining_litres,
        percent_full: 100.0 * remaining_litres / total_litres,
    }
}

/// Geometry plus its precomputed full volume.
#[derive(Debug, Clone, Copy)]
pub struct TankModel {
    geometry: TankGeometry,
    total_litres: f32,
}

impl TankModel {
    pub fn new(geometry: TankGeometry) -> Result<Self, GeometryError> {
        geometry.validate()?;
        Ok(Self {
            geometry,
            total_litres: volume(geometry.diameter_cm, geometry.height_cm),
        })
    }

    /// Full-tank volume in litres.
    pub fn total_litres(&self) -> f32 {
        self.total_litres
    }

    pub fn capacity(&self, distance_cm: f32) -> CapacityReading {
        capacity(self.total_litres, &self.geometry, distance_cm)
    }
}

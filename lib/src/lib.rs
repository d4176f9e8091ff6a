//! Tool-path emission core for an FDM slicer.
//!
//! This crate turns an ordered list of planned geometric motions into a
//! textual G-code stream. Two components do the work:
//!
//! - [`gcode::GCodePlanner`] accumulates the travel and extrusion moves of
//!   one layer, applies combing and retraction policy, reorders polygon
//!   traversal, and enforces a minimum layer time by proportional speed
//!   scaling.
//! - [`gcode::GCodeExport`] owns the printer state (position, feedrate,
//!   extruder selection, fan, retraction) and serialises each move into
//!   firmware-specific syntax for several printer flavors, while tracking
//!   cumulative extrusion, filament usage, and print-time estimates.
//!
//! Everything upstream of the planner (slicing, infill, supports, polygon
//! booleans) and the heavy collaborators (combing geometry, path-order
//! optimisation, acceleration-aware time estimation) live behind the
//! traits in [`comb`], [`order`] and [`estimate`].
//!
//! # Units
//!
//! Coordinates are signed 32-bit integers in micrometres. 1 unit = 1 µm,
//! so `scale(1.0)` is one millimetre. Filament amounts are `f64`
//! millimetres; speeds are integer mm/s and become mm/min (`F` words) on
//! the wire.
//!
//! # Example
//!
//! ```
//! use toolpath::gcode::{GCodeExport, GCodePlanner, Sink};
//! use toolpath::config::PathConfig;
//! use toolpath::geometry::Point;
//! use toolpath::scale;
//!
//! let mut gcode = GCodeExport::with_sink(Sink::memory());
//! gcode.set_extrusion(200, 2850, 100).unwrap();
//!
//! let wall = PathConfig::new(50, 400, "WALL-OUTER");
//! let mut planner = GCodePlanner::new(&mut gcode, 150, 1500);
//! planner.add_travel(Point::new(scale(10.0), scale(10.0)));
//! planner.add_extrusion_move(Point::new(scale(30.0), scale(10.0)), &wall);
//! planner.write_gcode(false, 200).unwrap();
//! ```

pub mod comb;
pub mod config;
pub mod estimate;
pub mod gcode;
pub mod geometry;
pub mod order;

use thiserror::Error as ThisError;

/// Scaled integer coordinate type. 1 unit = 1 micrometre.
pub type Coord = i32;

/// Floating-point coordinate type, in millimetres.
pub type CoordF = f64;

/// Scaled units per millimetre.
pub const SCALING_FACTOR: CoordF = 1000.0;

/// Maximum number of extruders an emitter tracks.
pub const MAX_EXTRUDERS: usize = 16;

/// Convert millimetres to scaled integer micrometres.
#[inline]
pub fn scale(mm: CoordF) -> Coord {
    (mm * SCALING_FACTOR) as Coord
}

/// Convert scaled integer micrometres to millimetres.
#[inline]
pub fn unscale(c: Coord) -> CoordF {
    c as CoordF / SCALING_FACTOR
}

/// Error type for the emission core.
#[derive(Debug, ThisError)]
pub enum Error {
    /// Output sink failure (open, write, or seek).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A command exceeded the 96-byte firmware line budget.
    #[error("G-code line of {len} bytes exceeds the {max}-byte budget")]
    LineTooLong { len: usize, max: usize },

    /// A spiralize path with zero total length cannot ramp Z.
    #[error("Spiralize path has zero length")]
    DegenerateSpiral,
}

/// Result type for the emission core.
pub type Result<T> = std::result::Result<T, Error>;

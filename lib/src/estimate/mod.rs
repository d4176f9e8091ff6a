//! Time-estimate kernel interface.
//!
//! The emitter streams every commanded waypoint into an estimator and
//! folds the per-layer result into the running print-time total. The
//! production kernel models firmware acceleration; this core only
//! defines the seam and a straight-line stand-in.

/// One commanded waypoint: XYZ position in millimetres plus the
/// cumulative filament axis, also in millimetres.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub e: f64,
}

impl Waypoint {
    /// Create a waypoint.
    pub fn new(x: f64, y: f64, z: f64, e: f64) -> Self {
        Self { x, y, z, e }
    }
}

/// Accumulates waypoints and estimates the wall-clock time to execute
/// them.
pub trait TimeEstimator {
    /// Plan a move to `target` at `feedrate` mm/s.
    fn plan(&mut self, target: Waypoint, feedrate: f64);

    /// Estimated seconds for the moves planned since the last reset.
    fn calculate(&self) -> f64;

    /// Discard planned moves; the last position is kept.
    fn reset(&mut self);
}

/// Straight-line estimator: distance over feedrate, no acceleration.
///
/// Pure filament moves (retract/prime) count their E-axis travel as the
/// distance, matching how firmware executes them.
#[derive(Debug, Default)]
pub struct NaiveEstimate {
    last: Option<Waypoint>,
    seconds: f64,
}

impl NaiveEstimate {
    /// Create an estimator with no planned moves.
    pub fn new() -> Self {
        Self::default()
    }
}

impl TimeEstimator for NaiveEstimate {
    fn plan(&mut self, target: Waypoint, feedrate: f64) {
        if let Some(last) = self.last {
            let dx = target.x - last.x;
            let dy = target.y - last.y;
            let dz = target.z - last.z;
            let mut distance = (dx * dx + dy * dy + dz * dz).sqrt();
            if distance == 0.0 {
                distance = (target.e - last.e).abs();
            }
            if feedrate > 0.0 {
                self.seconds += distance / feedrate;
            }
        }
        self.last = Some(target);
    }

    fn calculate(&self) -> f64 {
        self.seconds
    }

    fn reset(&mut self) {
        self.seconds = 0.0;
    }
}

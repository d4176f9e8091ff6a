//! Combing oracle interface.
//!
//! Combing routes travel moves inside the printed region's boundary so
//! the nozzle does not cross open air and ooze onto the print. The
//! geometry behind it (boundary offsets, crossing tests, line-of-sight
//! walks) lives outside this core; the planner only consumes the oracle
//! through this trait.

use crate::geometry::Point;
use crate::Coord;

/// Obstacle-aware travel oracle.
///
/// Implementations answer three questions about the current layer's
/// combing boundary: can a travel from `from` to `to` stay inside it
/// (and via which intermediate points), is a point inside it, and how
/// can a point be moved back inside.
pub trait Comb {
    /// Compute an obstacle-free polyline from `from` to `to`.
    ///
    /// On success the intermediate waypoints (excluding `from` and `to`)
    /// are appended to `point_list` and `true` is returned. Returning
    /// `false` means no combed route exists and the caller should
    /// retract instead.
    fn calc(&self, from: Point, to: Point, point_list: &mut Vec<Point>) -> bool;

    /// Whether `p` lies inside the combing boundary.
    fn inside(&self, p: Point) -> bool;

    /// Move `p` inside the boundary by roughly `distance` scaled units.
    ///
    /// Returns `false` when no inward move was found.
    fn move_inside(&self, p: &mut Point, distance: Coord) -> bool;
}

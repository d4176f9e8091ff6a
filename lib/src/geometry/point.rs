//! Point types for 2D and 3D tool-path geometry.
//!
//! Points use integer coordinates scaled by `SCALING_FACTOR` to avoid
//! floating-point precision issues. 1 unit = 1 micrometre.

use crate::{unscale, Coord, CoordF};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};

/// A 2D point with scaled integer coordinates.
///
/// # Example
/// ```
/// use toolpath::geometry::Point;
/// use toolpath::scale;
///
/// // A point at (3mm, 4mm)
/// let p = Point::new(scale(3.0), scale(4.0));
/// assert_eq!(p.vsize_mm(), 5.0);
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: Coord,
    pub y: Coord,
}

impl Point {
    /// Create a new point with the given coordinates.
    #[inline]
    pub const fn new(x: Coord, y: Coord) -> Self {
        Self { x, y }
    }

    /// Create a point at the origin (0, 0).
    #[inline]
    pub const fn zero() -> Self {
        Self { x: 0, y: 0 }
    }

    /// Squared length of this point as a vector, widened to avoid overflow.
    #[inline]
    pub fn length_squared(&self) -> i64 {
        let x = self.x as i64;
        let y = self.y as i64;
        x * x + y * y
    }

    /// Euclidean length of this point as a vector, in scaled units.
    #[inline]
    pub fn vsize(&self) -> i64 {
        (self.length_squared() as CoordF).sqrt() as i64
    }

    /// Euclidean length of this point as a vector, in millimetres.
    #[inline]
    pub fn vsize_mm(&self) -> CoordF {
        (self.length_squared() as CoordF).sqrt() / crate::SCALING_FACTOR
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(&self, other: &Point) -> i64 {
        (*other - *self).length_squared()
    }

    /// Distance to another point, in millimetres.
    #[inline]
    pub fn distance_mm(&self, other: &Point) -> CoordF {
        (*other - *self).vsize_mm()
    }

    /// Whether this vector is strictly shorter than `len` scaled units.
    ///
    /// Compares squared lengths, so the check is exact.
    #[inline]
    pub fn shorter_than(&self, len: Coord) -> bool {
        let len = len as i64;
        self.length_squared() < len * len
    }

    /// Dot product with another point, widened to avoid overflow.
    #[inline]
    pub fn dot(&self, other: &Point) -> i64 {
        (self.x as i64) * (other.x as i64) + (self.y as i64) * (other.y as i64)
    }

    /// Cross product with another point (2D pseudo-cross product).
    #[inline]
    pub fn cross(&self, other: &Point) -> i64 {
        (self.x as i64) * (other.y as i64) - (self.y as i64) * (other.x as i64)
    }

    /// Convert to floating-point millimetre coordinates.
    #[inline]
    pub fn to_mm(&self) -> (CoordF, CoordF) {
        (unscale(self.x), unscale(self.y))
    }
}

impl Add for Point {
    type Output = Point;
    #[inline]
    fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Point {
    #[inline]
    fn add_assign(&mut self, other: Point) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Point {
    type Output = Point;
    #[inline]
    fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }
}

impl SubAssign for Point {
    #[inline]
    fn sub_assign(&mut self, other: Point) {
        self.x -= other.x;
        self.y -= other.y;
    }
}

impl Neg for Point {
    type Output = Point;
    #[inline]
    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

impl Mul<Coord> for Point {
    type Output = Point;
    #[inline]
    fn mul(self, factor: Coord) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }
}

impl Div<Coord> for Point {
    type Output = Point;
    #[inline]
    fn div(self, divisor: Coord) -> Point {
        Point::new(self.x / divisor, self.y / divisor)
    }
}

impl fmt::Debug for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// A 3D point with scaled integer coordinates.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point3 {
    pub x: Coord,
    pub y: Coord,
    pub z: Coord,
}

impl Point3 {
    /// Create a new 3D point.
    #[inline]
    pub const fn new(x: Coord, y: Coord, z: Coord) -> Self {
        Self { x, y, z }
    }

    /// Drop the Z coordinate.
    #[inline]
    pub const fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Lift a 2D point to the given Z.
    #[inline]
    pub const fn from_xy(p: Point, z: Coord) -> Self {
        Self { x: p.x, y: p.y, z }
    }
}

impl fmt::Debug for Point3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

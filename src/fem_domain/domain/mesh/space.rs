use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Add, Div, Index, Mul, Sub};

use json::{array, JsonValue};

/// 2D vector in Real or Parametric Space
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct V2D([f64; 2]);

impl V2D {
    pub const fn from(components: [f64; 2]) -> Self {
        Self(components)
    }

    pub fn dot(a: Self, b: Self) -> f64 {
        a.0[0] * b.0[0] + a.0[1] * b.0[1]
    }

    pub fn x(&self) -> f64 {
        self.0[0]
    }

    pub fn y(&self) -> f64 {
        self.0[1]
    }

    pub fn norm(&self) -> f64 {
        Self::dot(*self, *self).sqrt()
    }
}

impl Index<usize> for V2D {
    type Output = f64;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl Add for V2D {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self([self.0[0] + rhs.0[0], self.0[1] + rhs.0[1]])
    }
}

impl Mul<f64> for V2D {
    type Output = Self;
    fn mul(self, scale: f64) -> Self {
        Self([self.0[0] * scale, self.0[1] * scale])
    }
}

impl Div<f64> for V2D {
    type Output = Self;
    fn div(self, divisor: f64) -> Self {
        self * divisor.recip()
    }
}

/// 2x2 Matrix stored by rows. Used for the Jacobian of the Parametric-to-Real mapping:
///
/// ```text
/// | dx/du  dx/dv |   <- u
/// | dy/du  dy/dv |   <- v
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct M2D {
    pub u: V2D,
    pub v: V2D,
}

impl M2D {
    pub const fn from(r0: [f64; 2], r1: [f64; 2]) -> Self {
        Self {
            u: V2D::from(r0),
            v: V2D::from(r1),
        }
    }

    #[inline]
    pub fn det(&self) -> f64 {
        self.u[0] * self.v[1] - self.u[1] * self.v[0]
    }

    pub fn inverse(&self) -> Self {
        let inv_det = self.det().recip();
        Self::from(
            [self.v[1] * inv_det, -self.u[1] * inv_det],
            [-self.v[0] * inv_det, self.u[0] * inv_det],
        )
    }

    pub fn transpose(&self) -> Self {
        Self::from([self.u[0], self.v[0]], [self.u[1], self.v[1]])
    }

    /// Scale the columns of the matrix (the derivatives with respect to u and v)
    pub fn scale_columns(&self, [su, sv]: [f64; 2]) -> Self {
        Self::from(
            [self.u[0] * su, self.u[1] * sv],
            [self.v[0] * su, self.v[1] * sv],
        )
    }
}

impl Mul<V2D> for M2D {
    type Output = V2D;
    fn mul(self, rhs: V2D) -> V2D {
        V2D::from([V2D::dot(self.u, rhs), V2D::dot(self.v, rhs)])
    }
}

/// Parametric Coordinate Directions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParaDir {
    U,
    V,
}

impl From<ParaDir> for JsonValue {
    fn from(dir: ParaDir) -> Self {
        match dir {
            ParaDir::U => JsonValue::from("U-Dir"),
            ParaDir::V => JsonValue::from("V-Dir"),
        }
    }
}

/// Coordinates closer than this are treated as the same location
const POINT_TOLERANCE: f64 = 1e-12;

/// Point in 2D Real Space
///
/// Equality and hashing snap both coordinates onto a grid of spacing [POINT_TOLERANCE],
/// so that nodes produced by different refinement paths are recognized as the same.
#[derive(Clone, Copy, Debug, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub const fn from([x, y]: [f64; 2]) -> Self {
        Self { x, y }
    }

    /// Midpoint of two Points
    pub fn between(a: &Self, b: &Self) -> Self {
        Self::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0)
    }

    pub fn dist(&self, other: &Self) -> f64 {
        (*other - *self).norm()
    }

    /// The orientation of the "edge" composed of these two Points relative to the Real x-axis
    pub fn orientation_with(&self, other: &Self) -> ParaDir {
        let d = *other - *self;
        if d.y().abs() < d.x().abs() {
            ParaDir::U
        } else {
            ParaDir::V
        }
    }

    /// The z-component of `(b - self) x (c - self)`
    ///
    /// Positive when `c` lies to the left of the directed line from `self` to `b`
    pub fn cross(&self, b: &Self, c: &Self) -> f64 {
        let (db, dc) = (*b - *self, *c - *self);
        db.x() * dc.y() - db.y() * dc.x()
    }

    fn grid_key(&self) -> [i64; 2] {
        let snap = |c: f64| (c / POINT_TOLERANCE).round() as i64;
        [snap(self.x), snap(self.y)]
    }
}

impl Sub for Point {
    type Output = V2D;
    fn sub(self, rhs: Self) -> V2D {
        V2D::from([self.x - rhs.x, self.y - rhs.y])
    }
}

impl Hash for Point {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.grid_key().hash(state);
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.grid_key() == other.grid_key()
    }
}

impl Eq for Point {}

impl From<Point> for JsonValue {
    fn from(point: Point) -> Self {
        array![point.x, point.y]
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn point_equality_is_tolerant() {
        let a = Point::new(0.1 + 0.2, -0.0);
        let b = Point::new(0.3, 0.0);
        assert_eq!(a, b);
        assert_ne!(a, Point::new(0.3, 1e-9));

        let unique: HashSet<Point> = [a, b, Point::between(&a, &b)].into_iter().collect();
        assert_eq!(unique.len(), 1);
    }

    #[test]
    fn jacobian_inverse() {
        let m = M2D::from([2.0, 1.0], [0.5, 3.0]);
        let mi = m.inverse();
        let diag_0 = V2D::dot(mi.u, V2D::from([m.u[0], m.v[0]]));
        let off_diag = V2D::dot(mi.u, V2D::from([m.u[1], m.v[1]]));
        assert!((diag_0 - 1.0).abs() < 1e-14);
        assert!(off_diag.abs() < 1e-14);
        assert!((m.det() - 5.5).abs() < 1e-14);
        assert!((m.transpose().u[1] - 0.5).abs() < 1e-14);
    }

    #[test]
    fn orientation_and_side() {
        let p0 = Point::new(0.0, 0.0);
        let p1 = Point::new(1.0, 0.1);
        assert_eq!(p0.orientation_with(&p1), ParaDir::U);
        assert_eq!(p0.orientation_with(&Point::new(0.1, 1.0)), ParaDir::V);
        assert!(p0.cross(&p1, &Point::new(0.5, 1.0)) > 0.0);
        assert!(p0.cross(&p1, &Point::new(0.5, -1.0)) < 0.0);
        assert!((p0.dist(&Point::new(3.0, 4.0)) - 5.0).abs() < 1e-14);
    }
}

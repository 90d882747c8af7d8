/// Hierarchic Shape Functions defined along a single parametric direction
pub mod shape_fns;

use super::domain::mesh::{
    elem::Elem,
    space::{Point, M2D, V2D},
};
use crate::fem_problem::integration::glq::gauss_quadrature_points;
use std::marker::PhantomData;

pub use shape_fns::{LegendrePoly, LobattoShapeFn};

/// Hierarchical Shape Function along a single direction (defined over (-1.0, +1.0)).
/// [LobattoShapeFn] implements this trait.
/// Alternate Hierarchical Basis Functions can be used by implementing this trait.
///
/// Functions `0` and `1` must be the linear nodal functions (`1` at `-1.0` and `+1.0` respectively).
/// Functions of order `n >= 2` must vanish at both endpoints.
pub trait ShapeFn: Clone {
    /// Evaluate functions `0..=max_order` (and their first two derivatives) over a set of points
    fn with(max_order: usize, points: &[f64]) -> Self;

    fn value(&self, n: usize, p: usize) -> f64;
    fn d1(&self, n: usize, p: usize) -> f64;
    fn d2(&self, n: usize, p: usize) -> f64;

    fn max_order(&self) -> usize;
}

/// Structure used to generate [BasisFn]'s over [Elem]'s in a Mesh.
#[derive(Clone, Debug)]
pub struct BasisFnSampler<SF: ShapeFn> {
    /// Type of [ShapeFn] used in [BasisFn]'s
    shape_type: PhantomData<SF>,
    /// Maximum expansion order along either direction
    pub max_order: usize,
    /// Sample points along both parametric directions (Defined from -1 to +1)
    points: Vec<f64>,
}

impl<SF: ShapeFn> BasisFnSampler<SF> {
    /// Create a sampler over an `num_points` by `num_points` grid of Gauss-Legendre points.
    ///
    /// Returns the sampler along with the associated quadrature weights
    ///
    /// ```
    /// use heat_fem_2d::fem_domain::basis::*;
    ///
    /// let (sampler, weights): (BasisFnSampler<LobattoShapeFn>, _) = BasisFnSampler::with(5, 3);
    /// assert_eq!(sampler.num_points(), 5);
    /// assert!((weights.iter().sum::<f64>() - 2.0).abs() < 1e-12);
    /// ```
    pub fn with(num_points: usize, max_order: usize) -> (Self, Vec<f64>) {
        let (points, weights) = gauss_quadrature_points(num_points);
        (Self::with_points(points, max_order), weights)
    }

    /// Create a sampler over an arbitrary set of points in `[-1, 1]` (used along both directions)
    pub fn with_points(points: Vec<f64>, max_order: usize) -> Self {
        Self {
            shape_type: PhantomData,
            max_order,
            points,
        }
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    /// Generate a [BasisFn] defined over an [Elem]
    pub fn sample_basis_fn(&self, elem: &Elem) -> BasisFn<SF> {
        BasisFn::with(self.max_order, &self.points, &self.points, elem)
    }
}

/// Structure used to evaluate [ShapeFn]'s and their gradients over an [Elem]
///
/// Functions are addressed by a pair of orders `[i, j]` (the u- and v-directed shape function orders);
/// sample points are addressed by a pair of indices `[m, n]` into the u and v point lists.
#[derive(Clone, Debug)]
pub struct BasisFn<SF: ShapeFn> {
    /// Jacobians of the map from the Elem's parametric space into real space at each sample point
    pub t: Vec<Vec<M2D>>,
    /// Inverse-transpose of the Jacobians (maps parametric gradients to real gradients)
    pub ti_t: Vec<Vec<M2D>>,
    /// Determinants of the Jacobians at each sample point
    pub dt: Vec<Vec<f64>>,
    /// Real-space location of each sample point
    pub points: Vec<Vec<Point>>,
    u_shapes: SF,
    v_shapes: SF,
}

impl<SF: ShapeFn> BasisFn<SF> {
    pub fn with(max_order: usize, u_points: &[f64], v_points: &[f64], elem: &Elem) -> Self {
        let t: Vec<Vec<M2D>> = u_points
            .iter()
            .map(|u| {
                v_points
                    .iter()
                    .map(|v| elem.parametric_mapping(V2D::from([*u, *v])))
                    .collect()
            })
            .collect();

        let ti_t = t
            .iter()
            .map(|row| row.iter().map(|m| m.inverse().transpose()).collect())
            .collect();

        let dt = t
            .iter()
            .map(|row| row.iter().map(|m| m.det()).collect())
            .collect();

        let points = u_points
            .iter()
            .map(|u| {
                v_points
                    .iter()
                    .map(|v| elem.map_point(V2D::from([*u, *v])))
                    .collect()
            })
            .collect();

        Self {
            t,
            ti_t,
            dt,
            points,
            u_shapes: SF::with(max_order, u_points),
            v_shapes: SF::with(max_order, v_points),
        }
    }

    /// Value of the shape function product `[i, j]` at sample point `[m, n]`
    #[inline]
    pub fn value(&self, [i, j]: [usize; 2], [m, n]: [usize; 2]) -> f64 {
        self.u_shapes.value(i, m) * self.v_shapes.value(j, n)
    }

    /// Gradient of the shape function product `[i, j]` with respect to the parametric coordinates
    #[inline]
    pub fn para_grad(&self, [i, j]: [usize; 2], [m, n]: [usize; 2]) -> V2D {
        V2D::from([
            self.u_shapes.d1(i, m) * self.v_shapes.value(j, n),
            self.u_shapes.value(i, m) * self.v_shapes.d1(j, n),
        ])
    }

    /// Gradient of the shape function product `[i, j]` with respect to the real coordinates
    #[inline]
    pub fn grad(&self, orders: [usize; 2], [m, n]: [usize; 2]) -> V2D {
        self.ti_t[m][n] * self.para_grad(orders, [m, n])
    }

    #[inline]
    pub fn sample_scale(&self, [m, n]: [usize; 2]) -> f64 {
        self.dt[m][n]
    }

    #[inline]
    pub fn real_point(&self, [m, n]: [usize; 2]) -> &Point {
        &self.points[m][n]
    }

    pub fn num_points(&self) -> [usize; 2] {
        [self.points.len(), self.points.first().map_or(0, |row| row.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_domain::domain::mesh::Mesh;
    use approx::assert_relative_eq;

    fn skewed_mesh() -> Mesh {
        Mesh::from_json_str(
            r#"{
                "Nodes": [[0.0, 0.0], [2.0, 0.0], [0.5, 1.0], [2.5, 1.5]],
                "Elements": [{ "node_ids": [0, 1, 2, 3], "material": "Copper" }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn area_from_jacobians() {
        let mesh = skewed_mesh();
        let (sampler, weights): (BasisFnSampler<LobattoShapeFn>, _) = BasisFnSampler::with(4, 2);
        let bf = sampler.sample_basis_fn(&mesh.elems[0]);

        let mut area = 0.0;
        for (m, wm) in weights.iter().enumerate() {
            for (n, wn) in weights.iter().enumerate() {
                area += bf.sample_scale([m, n]) * wm * wn;
            }
        }

        // shoelace formula over SW -> SE -> NE -> NW
        assert_relative_eq!(area, 2.375, epsilon = 1e-12);
    }

    #[test]
    fn real_gradient_of_linear_function() {
        // x(u, v) is reproduced exactly by the vertex functions, so its real gradient must be [1, 0]
        let mesh = skewed_mesh();
        let (sampler, _): (BasisFnSampler<LobattoShapeFn>, _) = BasisFnSampler::with(3, 1);
        let bf = sampler.sample_basis_fn(&mesh.elems[0]);
        let xs: Vec<f64> = mesh.elem_points(0).iter().map(|p| p.x).collect();
        let vertex_orders = [[0, 0], [1, 0], [0, 1], [1, 1]];

        for m in 0..3 {
            for n in 0..3 {
                let grad = vertex_orders
                    .iter()
                    .zip(xs.iter())
                    .fold(V2D::default(), |acc, (orders, x)| {
                        acc + bf.grad(*orders, [m, n]) * *x
                    });
                assert_relative_eq!(grad.x(), 1.0, epsilon = 1e-12);
                assert_relative_eq!(grad.y(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn sample_points_in_real_space() {
        let mesh = skewed_mesh();
        let sampler: BasisFnSampler<LobattoShapeFn> =
            BasisFnSampler::with_points(vec![-1.0, 1.0], 1);
        let bf = sampler.sample_basis_fn(&mesh.elems[0]);
        assert_eq!(bf.num_points(), [2, 2]);
        assert_eq!(*bf.real_point([1, 1]), *mesh.elem_points(0)[3]);
        assert_relative_eq!(bf.value([1, 1], [1, 1]), 1.0);
        assert!(bf.value([0, 0], [1, 1]).abs() < 1e-15);
    }
}

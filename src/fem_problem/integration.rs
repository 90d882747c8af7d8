use super::weak_form::ElemForms;
use crate::fem_domain::basis::{BasisFn, BasisFnSampler, LobattoShapeFn, ShapeFn};
use crate::fem_domain::domain::mesh::space::V2D;
use crate::fem_domain::domain::space::LocalFn;
use std::collections::BTreeMap;

/// Methods to assist in Gauss-Legendre-Quadrature integration
pub mod glq;

/// Number of Gauss-Legendre points added (along each direction) beyond the `p + 1` needed for affine Elems
pub const DEFAULT_QUAD_ORDER_INCREASE: usize = 2;

/// Number of Gauss-Legendre points used along each direction for an Elem of order `order`
///
/// ```
/// use heat_fem_2d::fem_problem::integration::num_quadrature_points;
///
/// assert_eq!(num_quadrature_points(1, 0), 2);
/// assert_eq!(num_quadrature_points(4, 2), 7);
/// ```
pub fn num_quadrature_points(order: u8, quad_order_increase: usize) -> usize {
    order as usize + 1 + quad_order_increase
}

/// Quadrature grids (with their sampled Lobatto shape functions) for each polynomial order present in a space
#[derive(Clone, Debug)]
pub struct QuadratureTable {
    rules: BTreeMap<u8, (BasisFnSampler<LobattoShapeFn>, Vec<f64>)>,
}

impl QuadratureTable {
    pub fn for_orders(orders: impl IntoIterator<Item = u8>, quad_order_increase: usize) -> Self {
        let mut rules = BTreeMap::new();
        for order in orders {
            rules.entry(order).or_insert_with(|| {
                BasisFnSampler::with(
                    num_quadrature_points(order, quad_order_increase),
                    order as usize,
                )
            });
        }
        Self { rules }
    }

    /// The sampler and weights used to integrate over an Elem of order `order`
    pub fn get(&self, order: u8) -> Option<(&BasisFnSampler<LobattoShapeFn>, &[f64])> {
        self.rules
            .get(&order)
            .map(|(sampler, weights)| (sampler, weights.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Value and real-space gradient of a local shape function at a quadrature point
#[derive(Clone, Copy, Debug)]
pub struct ShapeSample {
    pub value: f64,
    pub grad: V2D,
}

/// Element stiffness matrix (dense, row-major) and load vector over an Elem's local shape functions
#[derive(Clone, Debug)]
pub struct LocalSystem {
    pub size: usize,
    pub stiffness: Vec<f64>,
    pub load: Vec<f64>,
}

impl LocalSystem {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            stiffness: vec![0.0; size * size],
            load: vec![0.0; size],
        }
    }

    #[inline]
    pub fn stiffness(&self, a: usize, b: usize) -> f64 {
        self.stiffness[a * self.size + b]
    }
}

/// Integrate the bilinear and linear forms of an Elem over all pairs of its local shape functions
///
/// Bilinear forms are assumed to be symmetric: only the upper triangle is integrated, then mirrored.
pub fn integrate_local_system<SF: ShapeFn>(
    basis: &BasisFn<SF>,
    weights: &[f64],
    local_fns: &[LocalFn],
    forms: &ElemForms,
) -> LocalSystem {
    let n_fns = local_fns.len();
    let mut local = LocalSystem::new(n_fns);

    let [n_u, n_v] = basis.num_points();
    let mut samples: Vec<ShapeSample> = Vec::with_capacity(n_fns);

    for m in 0..n_u.min(weights.len()) {
        for n in 0..n_v.min(weights.len()) {
            let scale = weights[m] * weights[n] * basis.sample_scale([m, n]);
            let point = basis.real_point([m, n]);

            samples.clear();
            samples.extend(local_fns.iter().map(|lf| ShapeSample {
                value: basis.value(lf.orders, [m, n]),
                grad: basis.grad(lf.orders, [m, n]),
            }));

            for (a, v) in samples.iter().enumerate() {
                for (b, u) in samples.iter().enumerate().skip(a) {
                    local.stiffness[a * n_fns + b] +=
                        forms.bilinear.integrand(point, u, v) * scale;
                }
            }

            if let Some(linear) = forms.linear {
                for (a, v) in samples.iter().enumerate() {
                    local.load[a] += linear.integrand(point, v) * scale;
                }
            }
        }
    }

    for a in 0..n_fns {
        for b in 0..a {
            local.stiffness[a * n_fns + b] = local.stiffness[b * n_fns + a];
        }
    }

    local
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_domain::domain::{bcs::EssentialBCs, mesh::Mesh, space::FunctionSpace};
    use crate::fem_problem::weak_form::WeakForm;
    use std::sync::Arc;

    #[test]
    fn table_deduplicates_orders() {
        let table = QuadratureTable::for_orders(vec![2, 1, 2, 3, 1], DEFAULT_QUAD_ORDER_INCREASE);
        assert_eq!(table.len(), 3);

        let (sampler, weights) = table.get(3).unwrap();
        assert_eq!(sampler.num_points(), 6);
        assert_eq!(sampler.max_order, 3);
        assert_eq!(weights.len(), 6);
        assert!(table.get(4).is_none());
    }

    #[test]
    fn bilinear_stiffness_on_unit_square() {
        // unit square, order 1: the classic bilinear Laplacian stiffness matrix
        let mesh = Mesh::rectangular_grid(1, 1, [0.0, 1.0], [0.0, 1.0], "Copper").unwrap();
        let space = FunctionSpace::new(Arc::new(mesh), EssentialBCs::new(), 1).unwrap();
        let weak_form = WeakForm::new()
            .with_constant_diffusion("Copper", 1.0)
            .with_constant_source(1.0);

        let table = QuadratureTable::for_orders(vec![1], 0);
        let (sampler, weights) = table.get(1).unwrap();
        let elem = &space.mesh().elems[0];
        let basis = sampler.sample_basis_fn(elem);
        let local_fns = space.local_basis(0).unwrap();
        let forms = weak_form.forms_for("Copper").unwrap();

        let local = integrate_local_system(&basis, weights, &local_fns, &forms);

        assert_eq!(local.size, 4);
        // diagonal, edge-neighbours and the opposite corner
        assert!((local.stiffness(0, 0) - 2.0 / 3.0).abs() < 1e-12);
        assert!((local.stiffness(0, 1) + 1.0 / 6.0).abs() < 1e-12);
        assert!((local.stiffness(0, 2) + 1.0 / 6.0).abs() < 1e-12);
        assert!((local.stiffness(0, 3) + 1.0 / 3.0).abs() < 1e-12);
        assert!((local.stiffness(3, 0) - local.stiffness(0, 3)).abs() < 1e-15);

        // each row of a pure diffusion matrix sums to zero; the load is split evenly
        for a in 0..4 {
            let row_sum: f64 = (0..4).map(|b| local.stiffness(a, b)).sum();
            assert!(row_sum.abs() < 1e-12);
            assert!((local.load[a] - 0.25).abs() < 1e-12);
        }
    }
}

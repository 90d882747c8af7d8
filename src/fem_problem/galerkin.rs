use super::{
    integration::{integrate_local_system, LocalSystem, QuadratureTable},
    linalg::{sparse_matrix::SparseMatrix, ElemContribution, LinearSystem},
    weak_form::{ElemForms, WeakForm},
};
use crate::config::AssemblyConfig;
use crate::fem_domain::{
    basis::{BasisFnSampler, LobattoShapeFn},
    domain::{
        mesh::elem::Elem,
        space::{FunctionSpace, LocalFn, SpaceError},
    },
};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::{ThreadPoolBuildError, ThreadPoolBuilder};
use thiserror::Error;

/// Everything needed to integrate over one active Elem
struct ElemTask<'a> {
    elem: &'a Elem,
    sampler: &'a BasisFnSampler<LobattoShapeFn>,
    weights: &'a [f64],
    forms: ElemForms<'a>,
    local_fns: Vec<LocalFn>,
}

/// Fill the global system matrix and right-hand-side using a [FunctionSpace]'s basis as the testing space
///
/// Every active Elem is integrated with an `n x n` Gauss-Legendre grid (`n = p + 1 + quad_order_increase`).
/// Local matrices are scattered through each shape function's constraint row, so:
/// * hanging-node constraints are folded into the global matrix
/// * DoFs fixed by essential boundary conditions never appear; their contribution is moved to the right-hand-side
///
/// Elems are integrated in parallel on a dedicated Rayon pool with `config.num_threads` threads. Contributions are
/// merged in ascending Elem order, so the result does not depend on the number of threads.
///
/// # Returns
/// * An `Err` if an Elem's material region has no bilinear form in the [WeakForm]
/// * An `Err` if the local basis of an Elem cannot be constructed
/// * An `Err` if the thread pool cannot be built
/// * A [LinearSystem], otherwise
pub fn galerkin_assemble(
    space: &FunctionSpace,
    weak_form: &WeakForm,
    config: &AssemblyConfig,
) -> Result<LinearSystem, AssemblyError> {
    let num_dofs = space.get_num_dofs();
    if num_dofs == 0 {
        warn!("FunctionSpace has no Degrees-of-Freedom; the field is fully prescribed by its boundary conditions");
    }

    let table = QuadratureTable::for_orders(
        space.orders().map(|(_, order)| order),
        config.quad_order_increase,
    );

    // resolve everything that can fail before integrating anything
    let tasks = space
        .orders()
        .map(|(elem_id, order)| {
            let elem = &space.mesh().elems[elem_id];
            let (sampler, weights) = table
                .get(order)
                .ok_or(AssemblyError::MissingQuadrature(order))?;

            Ok(ElemTask {
                elem,
                sampler,
                weights,
                forms: weak_form.forms_for(elem.material())?,
                local_fns: space.local_basis(elem_id)?,
            })
        })
        .collect::<Result<Vec<_>, AssemblyError>>()?;

    debug!(
        "Assembling {} Elems ({} quadrature rules) into a system of {} DoFs",
        tasks.len(),
        table.len(),
        num_dofs
    );

    let pool = ThreadPoolBuilder::new()
        .num_threads(config.num_threads)
        .build()?;

    let mut system = LinearSystem::new(num_dofs);
    pool.install(|| {
        system.par_extend(tasks.par_iter().map(|task| {
            let basis = task.sampler.sample_basis_fn(task.elem);
            let local = integrate_local_system(&basis, task.weights, &task.local_fns, &task.forms);
            scatter(&local, &task.local_fns, num_dofs)
        }))
    });

    info!(
        "Assembled {} DoFs over {} Elems ({} stored matrix entries) using {} threads",
        num_dofs,
        tasks.len(),
        system.matrix.num_entries(),
        pool.current_num_threads()
    );

    Ok(system)
}

/// Map an Elem's local system into global DoF ids
///
/// `K_ij += sum_ab C_ai k_ab C_bj` (upper triangle only) and `f_i += sum_a C_ai (f_a - sum_b k_ab g_b)`, where `C`
/// holds the constraint weights and `g` the prescribed offsets of the local functions.
fn scatter(local: &LocalSystem, local_fns: &[LocalFn], num_dofs: usize) -> ElemContribution {
    let mut matrix_entries = Vec::with_capacity(local.size * local.size);
    let mut rhs = Vec::with_capacity(local.size);

    for (a, fn_a) in local_fns.iter().enumerate() {
        let lifted_load = local.load[a]
            - local_fns
                .iter()
                .enumerate()
                .filter(|(_, fn_b)| fn_b.row.offset != 0.0)
                .map(|(b, fn_b)| local.stiffness(a, b) * fn_b.row.offset)
                .sum::<f64>();

        for &(i, c_ai) in fn_a.row.terms.iter() {
            rhs.push((i, c_ai * lifted_load));

            for (b, fn_b) in local_fns.iter().enumerate() {
                let k_ab = local.stiffness(a, b);
                for &(j, c_bj) in fn_b.row.terms.iter() {
                    if i <= j {
                        matrix_entries.push(([i, j], c_ai * k_ab * c_bj));
                    }
                }
            }
        }
    }

    let mut matrix = SparseMatrix::new(num_dofs);
    matrix.insert_group(matrix_entries);

    ElemContribution { matrix, rhs }
}

/// Error Type for Galerkin Assembly
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("No bilinear form defined over material region '{0}'; Cannot assemble system!")]
    MissingRegion(String),
    #[error("No quadrature rule available for order {0}; Cannot assemble system!")]
    MissingQuadrature(u8),
    #[error("Failed to build assembly thread pool: {0}")]
    ThreadPool(#[from] ThreadPoolBuildError),
    #[error(transparent)]
    Space(#[from] SpaceError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_domain::domain::{bcs::EssentialBCs, mesh::Mesh};
    use std::sync::Arc;

    fn unit_square_space(order: u8, bcs: EssentialBCs) -> FunctionSpace {
        let mesh = Mesh::rectangular_grid(2, 2, [0.0, 1.0], [0.0, 1.0], "Copper").unwrap();
        FunctionSpace::new(Arc::new(mesh), bcs, order).unwrap()
    }

    #[test]
    fn missing_region() {
        let space = unit_square_space(1, EssentialBCs::new());
        let weak_form = WeakForm::new().with_constant_diffusion("Aluminum", 1.0);

        match galerkin_assemble(&space, &weak_form, &AssemblyConfig::default()) {
            Err(AssemblyError::MissingRegion(region)) => assert_eq!(region, "Copper"),
            other => panic!("expected MissingRegion, got {:?}", other.map(|s| s.dimension())),
        }
    }

    #[test]
    fn pure_neumann_matrix_annihilates_constants() {
        // without essential boundaries, the constant field lies in the kernel of the diffusion operator
        let space = unit_square_space(3, EssentialBCs::new());
        let weak_form = WeakForm::new().with_constant_diffusion("Copper", 2.5);
        let system = galerkin_assemble(&space, &weak_form, &AssemblyConfig::default()).unwrap();

        let constant: Vec<f64> = (0..space.get_num_dofs())
            .map(|dof_id| match space.dof_map().owner_of(dof_id) {
                Some(crate::fem_domain::domain::space::dof::DofOwner::Vertex(_)) => 1.0,
                _ => 0.0,
            })
            .collect();

        let product = system.matrix.mul_vec(&constant);
        assert!(product.iter().all(|v| v.abs() < 1e-10));
        assert!(system.rhs.iter().all(|v| v.abs() < 1e-15));
    }

    #[test]
    fn dirichlet_lifting_moves_to_rhs() {
        let bcs = EssentialBCs::new().with_constant_on(&["Bottom", "Top", "Left", "Right"], 20.0);
        let space = unit_square_space(1, bcs);
        let weak_form = WeakForm::new().with_constant_diffusion("Copper", 1.0);
        let system = galerkin_assemble(&space, &weak_form, &AssemblyConfig::default()).unwrap();

        // a single interior vertex: 8/3 on the diagonal, and the lifted boundary values on the rhs
        assert_eq!(system.dimension(), 1);
        let diag = system.matrix.iter_upper_tri().next().unwrap().1;
        assert!((diag - 8.0 / 3.0).abs() < 1e-12);
        assert!((system.rhs[0] - 20.0 * 8.0 / 3.0).abs() < 1e-10);
    }
}

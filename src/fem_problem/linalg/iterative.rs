use super::{solver::SolverError, sparse_matrix::to_dvector, LinearSystem};
use log::{debug, warn};
use nalgebra::DVector;
use nalgebra_sparse::ops::{serial::spmm_csc_dense, Op};
use std::time::{Duration, Instant};

/// Settings for the [conjugate_gradient] solver
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CgSettings {
    /// Maximum number of iterations before giving up
    pub max_iterations: usize,
    /// Convergence threshold on `|r| / |b|`
    pub tolerance: f64,
    /// Optional wall-clock budget
    pub time_budget: Option<Duration>,
}

impl Default for CgSettings {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            tolerance: 1e-10,
            time_budget: None,
        }
    }
}

/// Result of a converged [conjugate_gradient] solve
#[derive(Clone, Debug)]
pub struct CgOutcome {
    pub solution: Vec<f64>,
    pub iterations: usize,
    /// Final relative residual `|r| / |b|`
    pub residual: f64,
}

/// Solve a symmetric positive definite [LinearSystem] with Jacobi-preconditioned Conjugate Gradient iteration
///
/// # Returns
/// * `Singular` if the matrix has a non-positive diagonal entry, or a search direction with no curvature is found
/// * `NotConverged` if the tolerance is not met within the iteration budget
/// * `TimeBudgetExceeded` if the wall-clock budget runs out first
pub fn conjugate_gradient(
    system: &LinearSystem,
    settings: &CgSettings,
) -> Result<CgOutcome, SolverError> {
    let dimension = system.dimension();
    let start = Instant::now();

    let b = to_dvector(&system.rhs);
    let b_norm = b.norm();
    if b_norm == 0.0 {
        return Ok(CgOutcome {
            solution: vec![0.0; dimension],
            iterations: 0,
            residual: 0.0,
        });
    }

    let diagonal = system.matrix.diagonal();
    if diagonal.iter().any(|d| *d <= 0.0) {
        return Err(SolverError::Singular { dimension });
    }
    let inv_diag = DVector::from_iterator(dimension, diagonal.iter().map(|d| 1.0 / d));

    let a = system.matrix.to_csc();

    let mut x = DVector::zeros(dimension);
    let mut r = b;
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut ap = DVector::<f64>::zeros(dimension);

    for iteration in 1..=settings.max_iterations {
        if let Some(budget) = settings.time_budget {
            if start.elapsed() >= budget {
                warn!(
                    "CG exceeded its time budget ({:?}) after {} iterations",
                    budget,
                    iteration - 1
                );
                return Err(SolverError::TimeBudgetExceeded {
                    budget,
                    iterations: iteration - 1,
                });
            }
        }

        spmm_csc_dense(0.0, &mut ap, 1.0, Op::NoOp(&a), Op::NoOp(&p));
        let curvature = p.dot(&ap);
        if curvature <= 0.0 || !curvature.is_finite() {
            return Err(SolverError::Singular { dimension });
        }

        let alpha = rz / curvature;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        let residual = r.norm() / b_norm;
        if residual <= settings.tolerance {
            debug!(
                "CG converged in {} iterations (relative residual: {:.3e})",
                iteration, residual
            );
            return Ok(CgOutcome {
                solution: x.iter().copied().collect(),
                iterations: iteration,
                residual,
            });
        }

        z = r.component_mul(&inv_diag);
        let rz_next = r.dot(&z);
        p *= rz_next / rz;
        p += &z;
        rz = rz_next;
    }

    let residual = r.norm() / b_norm;
    warn!(
        "CG failed to converge within {} iterations (relative residual: {:.3e})",
        settings.max_iterations, residual
    );
    Err(SolverError::NotConverged {
        iterations: settings.max_iterations,
        residual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_problem::linalg::sparse_matrix::SparseMatrix;

    fn laplacian_system(n: usize) -> LinearSystem {
        let mut system = LinearSystem::new(n);
        for i in 0..n {
            system.matrix.insert([i, i], 2.0 + i as f64 * 0.1);
            if i + 1 < n {
                system.matrix.insert([i, i + 1], -1.0);
            }
            system.rhs[i] = (i % 3) as f64 - 0.5;
        }
        system
    }

    #[test]
    fn converges_on_spd_system() {
        let system = laplacian_system(40);
        let outcome = conjugate_gradient(&system, &CgSettings::default()).unwrap();

        assert!(outcome.iterations <= 40);
        assert!(outcome.residual <= 1e-10);
        assert!(system.residual_norm(&outcome.solution) < 1e-8);
    }

    #[test]
    fn iteration_budget() {
        let system = laplacian_system(40);
        let settings = CgSettings {
            max_iterations: 2,
            ..Default::default()
        };
        assert!(matches!(
            conjugate_gradient(&system, &settings),
            Err(SolverError::NotConverged { iterations: 2, .. })
        ));
    }

    #[test]
    fn time_budget() {
        let system = laplacian_system(40);

        // an exhausted budget stops the iteration without depending on the timer resolution
        let exhausted = CgSettings {
            time_budget: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(matches!(
            conjugate_gradient(&system, &exhausted),
            Err(SolverError::TimeBudgetExceeded { iterations: 0, .. })
        ));

        let generous = CgSettings {
            time_budget: Some(Duration::from_secs(3600)),
            ..Default::default()
        };
        assert!(conjugate_gradient(&system, &generous).is_ok());
    }

    #[test]
    fn zero_rhs_and_bad_diagonal() {
        let mut system = LinearSystem::new(3);
        system.matrix = SparseMatrix::new(3);
        let outcome = conjugate_gradient(&system, &CgSettings::default()).unwrap();
        assert_eq!(outcome.solution, vec![0.0; 3]);

        system.rhs[1] = 1.0;
        system.matrix.insert([0, 0], 1.0);
        assert!(matches!(
            conjugate_gradient(&system, &CgSettings::default()),
            Err(SolverError::Singular { dimension: 3 })
        ));
    }
}

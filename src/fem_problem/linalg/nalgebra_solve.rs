use super::{solver::SolverError, sparse_matrix::to_dvector, LinearSystem};
use nalgebra_sparse::factorization::CscCholesky;

/// Largest system that will be converted into a dense matrix
pub const MAX_DENSE_SIZE: usize = 1000;
/// Direct solutions with a larger relative residual `|Au - b| / |b|` are rejected as singular
const MAX_RELATIVE_RESIDUAL: f64 = 1e-6;

/// Solve a [LinearSystem] with Nalgebra's dense Cholesky Decomposition
///
/// Only recommended for small problems: the sparse matrix is expanded into a dense one, so memory use grows with the
/// square of the number of DoFs.
pub fn nalgebra_solve_dense(system: &LinearSystem) -> Result<Vec<f64>, SolverError> {
    let dimension = system.dimension();
    if dimension > MAX_DENSE_SIZE {
        return Err(SolverError::ProblemTooLarge {
            dimension,
            max: MAX_DENSE_SIZE,
        });
    }
    if dimension == 0 {
        return Ok(Vec::new());
    }

    let (a_mat, b_vec) = system.to_nalgebra_dense();
    let cholesky_decomp = a_mat
        .cholesky()
        .ok_or(SolverError::Singular { dimension })?;

    checked_solution(system, cholesky_decomp.solve(&b_vec).iter().copied().collect())
}

/// Solve a [LinearSystem] with Nalgebra-Sparse's supernodal Cholesky Decomposition
pub fn nalgebra_solve_sparse(system: &LinearSystem) -> Result<Vec<f64>, SolverError> {
    let dimension = system.dimension();
    if dimension == 0 {
        return Ok(Vec::new());
    }

    let csc = system.matrix.to_csc();
    let cholesky_decomp =
        CscCholesky::factor(&csc).map_err(|_| SolverError::Singular { dimension })?;

    let b_vec = to_dvector(&system.rhs);
    checked_solution(system, cholesky_decomp.solve(&b_vec).iter().copied().collect())
}

// a nearly singular matrix can still factorize, but its solution will not satisfy the system
fn checked_solution(system: &LinearSystem, solution: Vec<f64>) -> Result<Vec<f64>, SolverError> {
    let b_norm = system.rhs.iter().map(|b| b * b).sum::<f64>().sqrt();
    let residual = system.residual_norm(&solution);

    if solution.iter().all(|x| x.is_finite()) && residual <= MAX_RELATIVE_RESIDUAL * b_norm.max(1.0) {
        Ok(solution)
    } else {
        Err(SolverError::Singular {
            dimension: system.dimension(),
        })
    }
}

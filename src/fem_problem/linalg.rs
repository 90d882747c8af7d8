/// Use Nalgebra's dense and sparse Cholesky Decompositions to solve a [LinearSystem]
pub mod nalgebra_solve;
/// Jacobi-preconditioned Conjugate Gradient solver
pub mod iterative;
/// Sparsely Packed Matrix
pub mod sparse_matrix;
/// Solver front-end binding a WeakForm and FunctionSpace to a solution vector
pub mod solver;

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use sparse_matrix::{print_vector_to_petsc_binary_file, to_dvector, AIJMatrixBinary, SparseMatrix};
use std::path::Path;

/// Symmetric Linear System
///
/// Au = b
#[derive(Clone, Debug)]
pub struct LinearSystem {
    /// System (stiffness) Matrix
    pub matrix: SparseMatrix,
    /// Right-hand-side (load) Vector
    pub rhs: Vec<f64>,
}

/// The contribution of a single Elem to a [LinearSystem]
#[derive(Clone, Debug)]
pub struct ElemContribution {
    pub matrix: SparseMatrix,
    pub rhs: Vec<(usize, f64)>,
}

impl LinearSystem {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            matrix: SparseMatrix::new(num_dofs),
            rhs: vec![0.0; num_dofs],
        }
    }

    pub fn dimension(&self) -> usize {
        self.rhs.len()
    }

    /// Add an Elem's contribution to the system, leaving its matrix empty
    pub fn consume(&mut self, contribution: &mut ElemContribution) {
        self.matrix.consume_matrix(&mut contribution.matrix);
        for (dof_id, value) in contribution.rhs.drain(..) {
            self.rhs[dof_id] += value;
        }
    }

    /// `|Au - b|`
    pub fn residual_norm(&self, solution: &[f64]) -> f64 {
        self.matrix
            .mul_vec(solution)
            .iter()
            .zip(self.rhs.iter())
            .map(|(au, b)| (au - b).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Write the matrix and right-hand-side into `dir` as `<prefix>_a.dat` and `<prefix>_b.dat`
    pub fn print_to_petsc_binary_files(
        &self,
        dir: impl AsRef<Path>,
        prefix: impl AsRef<str>,
    ) -> std::io::Result<()> {
        let a: AIJMatrixBinary = (&self.matrix).into();
        a.print_to_petsc_binary_file(dir.as_ref().join(format!("{}_a.dat", prefix.as_ref())))?;
        print_vector_to_petsc_binary_file(
            &self.rhs,
            dir.as_ref().join(format!("{}_b.dat", prefix.as_ref())),
        )
    }

    pub fn to_nalgebra_dense(&self) -> (DMatrix<f64>, DVector<f64>) {
        ((&self.matrix).into(), to_dvector(&self.rhs))
    }
}

impl ParallelExtend<ElemContribution> for LinearSystem {
    /// Contributions are computed in parallel, but always merged in the iterator's order
    fn par_extend<I>(&mut self, elem_contributions: I)
    where
        I: IntoParallelIterator<Item = ElemContribution>,
    {
        let mut contributions: Vec<ElemContribution> =
            elem_contributions.into_par_iter().collect();

        for contribution in contributions.iter_mut() {
            self.consume(contribution);
        }
    }
}

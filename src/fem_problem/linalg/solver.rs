use super::{
    iterative::{conjugate_gradient, CgSettings},
    nalgebra_solve::{nalgebra_solve_dense, nalgebra_solve_sparse},
    LinearSystem,
};
use crate::config::SolverConfig;
use crate::fem_domain::domain::{fields::Solution, space::FunctionSpace};
use crate::fem_problem::{
    galerkin::{galerkin_assemble, AssemblyError},
    weak_form::WeakForm,
};
use log::{info, warn};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use crate::fem_domain::domain::fields::DimensionMismatchError;

/// The method used to solve the assembled [LinearSystem]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SolverKind {
    /// Sparse (supernodal) Cholesky factorization
    SparseCholesky,
    /// Dense Cholesky factorization (limited to small systems)
    DenseCholesky,
    /// Jacobi-preconditioned Conjugate Gradient iteration
    ConjugateGradient {
        max_iterations: usize,
        tolerance: f64,
        time_budget: Option<Duration>,
    },
}

impl Default for SolverKind {
    fn default() -> Self {
        Self::SparseCholesky
    }
}

impl SolverKind {
    /// Conjugate Gradient with the default iteration settings
    pub fn conjugate_gradient() -> Self {
        let CgSettings {
            max_iterations,
            tolerance,
            time_budget,
        } = CgSettings::default();
        Self::ConjugateGradient {
            max_iterations,
            tolerance,
            time_budget,
        }
    }
}

/// Summary of the most recent successful solve
#[derive(Clone, Debug)]
pub struct SolveReport {
    pub num_dofs: usize,
    pub matrix_entries: usize,
    /// Number of iterations (zero for direct solvers)
    pub iterations: usize,
    /// `|Au - b|`
    pub residual: f64,
    pub elapsed: Duration,
}

/// Assembles and solves the discrete system of a [WeakForm] over a [FunctionSpace]
///
/// ```
/// use heat_fem_2d::prelude::*;
/// use std::sync::Arc;
///
/// let mesh = Mesh::rectangular_grid(2, 2, [0.0, 1.0], [0.0, 1.0], "Copper").unwrap();
/// let bcs = EssentialBCs::new().with_constant_on(&["Bottom", "Top", "Left", "Right"], 20.0);
/// let space = FunctionSpace::new(Arc::new(mesh), bcs, 2).unwrap();
/// let weak_form = WeakForm::new().with_constant_diffusion("Copper", 386.0);
///
/// let mut solver = LinearSolver::new(&weak_form, &space);
/// assert!(solver.get_sln_vector().is_err());
///
/// solver.solve().unwrap();
/// let solution = vector_to_solution(solver.get_sln_vector().unwrap().to_vec(), &space).unwrap();
/// let [min, max] = solution.min_max(4).unwrap();
/// assert!((min - 20.0).abs() < 1e-9 && (max - 20.0).abs() < 1e-9);
/// ```
pub struct LinearSolver<'a> {
    weak_form: &'a WeakForm,
    space: &'a FunctionSpace,
    config: SolverConfig,
    solution: Option<Vec<f64>>,
    report: Option<SolveReport>,
}

impl<'a> LinearSolver<'a> {
    pub fn new(weak_form: &'a WeakForm, space: &'a FunctionSpace) -> Self {
        Self {
            weak_form,
            space,
            config: SolverConfig::default(),
            solution: None,
            report: None,
        }
    }

    pub fn with_config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Assemble the system, then factorize or iterate according to the configured [SolverKind]
    ///
    /// A failed solve discards any previous solution vector.
    pub fn solve(&mut self) -> Result<(), SolveError> {
        self.solution = None;
        self.report = None;
        let start = Instant::now();

        let system = galerkin_assemble(self.space, self.weak_form, &self.config.assembly)?;

        let (solution, iterations) = match self.solve_system(&system) {
            Ok(result) => result,
            Err(err) => {
                warn!("Failed to solve system of {} DoFs: {}", system.dimension(), err);
                return Err(err.into());
            }
        };

        let report = SolveReport {
            num_dofs: system.dimension(),
            matrix_entries: system.matrix.num_entries(),
            iterations,
            residual: system.residual_norm(&solution),
            elapsed: start.elapsed(),
        };
        info!(
            "Solved system of {} DoFs with {:?} in {:?} (residual: {:.3e})",
            report.num_dofs, self.config.solver, report.elapsed, report.residual
        );

        self.solution = Some(solution);
        self.report = Some(report);
        Ok(())
    }

    fn solve_system(&self, system: &LinearSystem) -> Result<(Vec<f64>, usize), SolverError> {
        match self.config.solver {
            SolverKind::SparseCholesky => Ok((nalgebra_solve_sparse(system)?, 0)),
            SolverKind::DenseCholesky => Ok((nalgebra_solve_dense(system)?, 0)),
            SolverKind::ConjugateGradient {
                max_iterations,
                tolerance,
                time_budget,
            } => {
                let outcome = conjugate_gradient(
                    system,
                    &CgSettings {
                        max_iterations,
                        tolerance,
                        time_budget,
                    },
                )?;
                Ok((outcome.solution, outcome.iterations))
            }
        }
    }

    pub fn is_solved(&self) -> bool {
        self.solution.is_some()
    }

    /// The coefficient vector of the most recent successful solve
    pub fn get_sln_vector(&self) -> Result<&[f64], NotSolvedError> {
        self.solution.as_deref().ok_or(NotSolvedError)
    }

    /// The most recent solution bound to the solver's [FunctionSpace]
    pub fn get_solution(&self) -> Result<Solution<'a>, NotSolvedError> {
        let coefficients = self.get_sln_vector()?.to_vec();
        // the vector was produced from this space, so its length always matches
        Solution::new(coefficients, self.space).map_err(|_| NotSolvedError)
    }

    pub fn report(&self) -> Option<&SolveReport> {
        self.report.as_ref()
    }
}

/// Bind a coefficient vector to a [FunctionSpace]
pub fn vector_to_solution(
    coefficients: Vec<f64>,
    space: &FunctionSpace,
) -> Result<Solution<'_>, DimensionMismatchError> {
    Solution::new(coefficients, space)
}

/// Numerical failures of the linear solvers
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("System matrix ({dimension} DoFs) is singular or not positive definite; check the essential boundary conditions!")]
    Singular { dimension: usize },
    #[error("Conjugate Gradient failed to converge within {iterations} iterations (relative residual: {residual:.3e})!")]
    NotConverged { iterations: usize, residual: f64 },
    #[error("Solver exceeded its time budget ({budget:?}) after {iterations} iterations!")]
    TimeBudgetExceeded { budget: Duration, iterations: usize },
    #[error("System ({dimension} DoFs) exceeds the maximum dense size ({max}x{max}); Cannot Solve!")]
    ProblemTooLarge { dimension: usize, max: usize },
}

/// Error type for [LinearSolver::solve]
#[derive(Debug, Error)]
pub enum SolveError {
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error(transparent)]
    Solver(#[from] SolverError),
}

impl SolveError {
    /// Did the numerical solve fail (as opposed to the problem setup)
    ///
    /// Drivers report these failures and continue; a different [SolverKind], budget or set of boundary
    /// conditions may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Solver(_))
    }
}

/// No solution vector is available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("The system has not been solved; no solution vector is available!")]
pub struct NotSolvedError;

/// Explicit numeric configuration for assembly and solvers
pub mod config;
/// Geometry, refinement, basis functions and function spaces
pub mod fem_domain;
/// Weak forms, Galerkin assembly and linear solvers
pub mod fem_problem;

/// The types needed to set up and solve a heat conduction problem
pub mod prelude {
    pub use crate::config::{AssemblyConfig, NumericConfig, SolverConfig};
    pub use crate::fem_domain::domain::{
        bcs::EssentialBCs,
        fields::{print_orders_to_vtk, Solution},
        mesh::{h_refinement::HRef, p_refinement::PRef, space::Point, Mesh},
        space::{FunctionSpace, SpaceError},
        views::{LogView, View},
    };
    pub use crate::fem_problem::galerkin::{galerkin_assemble, AssemblyError};
    pub use crate::fem_problem::linalg::solver::{
        vector_to_solution, DimensionMismatchError, LinearSolver, NotSolvedError, SolveError,
        SolverError, SolverKind,
    };
    pub use crate::fem_problem::weak_form::WeakForm;
}

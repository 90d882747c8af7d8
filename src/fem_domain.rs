/// Structures and Traits for Basis Function Evaluation
pub mod basis;
/// Structures to define the geometry, refinement state and function space of an FEM Domain
pub mod domain;

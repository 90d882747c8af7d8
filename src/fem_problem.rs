/// Structures and functions to assist in the integration of Basis Functions
pub mod integration;

/// Symmetric sparse storage and solvers for the assembled Linear System
pub mod linalg;

/// Bilinear and linear forms describing stationary heat conduction
pub mod weak_form;

/// Structures to execute Galerkin assembly over a `FunctionSpace` using a `WeakForm`
pub mod galerkin;

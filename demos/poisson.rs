//! Stationary heat transfer in an L-shaped object made of aluminum and copper
//!
//! The object is heated by a constant volumetric source, and its boundary is held at a fixed temperature.
//!
//! `-div(λ grad u) = q` with `u = 20` on the boundary
//!
//! Run with `cargo run --example poisson [config.json]`; the optional config file is read by `NumericConfig`.

use heat_fem_2d::prelude::*;
use std::error::Error;
use std::sync::Arc;

const P_INIT: u8 = 2;
const INIT_REF_NUM: usize = 1;

const LAMBDA_AL: f64 = 236.0;
const LAMBDA_CU: f64 = 386.0;
const VOLUME_HEAT_SRC: f64 = 5e2;
const FIXED_BDY_TEMP: f64 = 20.0;

fn main() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => NumericConfig::from_file(path)?,
        None => NumericConfig::new(),
    };
    let solver_config = config.solver_config()?;

    let bcs = EssentialBCs::new().with_constant_on(&["Bottom", "Inner", "Outer", "Left"], FIXED_BDY_TEMP);
    let weak_form = WeakForm::new()
        .with_constant_diffusion("Aluminum", LAMBDA_AL)
        .with_constant_diffusion("Copper", LAMBDA_CU)
        .with_constant_source(VOLUME_HEAT_SRC);

    // the original mesh and space are dropped once they have been copied
    let mut space = {
        let mut mesh = Mesh::from_file(concat!(env!("CARGO_MANIFEST_DIR"), "/demos/domain.json"))?;
        mesh.refine(&["Aluminum", "Copper"], INIT_REF_NUM)?;
        mesh.refine_single("Aluminum")?;

        let space = FunctionSpace::new(Arc::new(mesh), bcs, P_INIT)?;
        FunctionSpace::copy(&space, Arc::new(Mesh::blank()))?
    };

    let active: Vec<usize> = space.orders().map(|(elem_id, _)| elem_id).collect();
    for (i, elem_id) in active.into_iter().enumerate() {
        space.set_element_order(elem_id, ((i + 1) % 4 + 1) as u8)?;
    }

    println!("DoFs:             {}", space.get_num_dofs());
    println!("Vertex functions: {}", space.get_vertex_functions_count());
    println!("Edge functions:   {}", space.get_edge_functions_count());
    println!("Bubble functions: {}", space.get_bubble_functions_count());

    let mut view = LogView::new();
    view.show_space("Polynomial orders", &space);
    view.wait_for_close();

    if let Some(dir) = config.system_export_dir() {
        galerkin_assemble(&space, &weak_form, &solver_config.assembly)?
            .print_to_petsc_binary_files(dir, "poisson")?;
        println!("Linear system written to {}", dir);
    }

    let mut solver = LinearSolver::new(&weak_form, &space).with_config(solver_config);
    match solver.solve() {
        Ok(()) => {
            let solution = vector_to_solution(solver.get_sln_vector()?.to_vec(), &space)?;
            let [min, max] = solution.min_max(6)?;
            println!("Temperature range: [{:.4}, {:.4}]", min, max);

            let out_dir = std::env::temp_dir();
            solution.print_to_vtk(out_dir.join("sln.vtk"), "Temperature", 6)?;
            print_orders_to_vtk(&space, out_dir.join("ord.vtk"))?;
            println!("VTK output written to {}", out_dir.display());

            view.show_solution("Solution", &solution);
            view.wait_for_close();
            Ok(())
        }
        Err(err) if err.is_recoverable() => {
            println!("Solver failed: {}", err);
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

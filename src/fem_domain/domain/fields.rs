use super::mesh::space::V2D;
use super::space::{FunctionSpace, LocalFn, SpaceError};
use crate::fem_domain::basis::{BasisFn, BasisFnSampler, LobattoShapeFn, ShapeFn};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;

/// A coefficient vector bound to the [FunctionSpace] it was computed over
///
/// Solutions are read-only; they can be evaluated over the active Elems of the space's Mesh and printed to VTK files
/// for visualization.
#[derive(Debug, Clone)]
pub struct Solution<'s> {
    coefficients: Vec<f64>,
    space: &'s FunctionSpace,
}

impl<'s> Solution<'s> {
    /// Bind a coefficient vector to a space. Its length must match the space's number of DoFs.
    pub fn new(coefficients: Vec<f64>, space: &'s FunctionSpace) -> Result<Self, DimensionMismatchError> {
        if coefficients.len() != space.get_num_dofs() {
            Err(DimensionMismatchError {
                expected: space.get_num_dofs(),
                found: coefficients.len(),
            })
        } else {
            Ok(Self {
                coefficients,
                space,
            })
        }
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    pub fn space(&self) -> &'s FunctionSpace {
        self.space
    }

    /// Evaluate the solution at a point in an active Elem's parametric space (`[-1, 1] x [-1, 1]`)
    pub fn value_at(&self, elem_id: usize, [u, v]: [f64; 2]) -> Result<f64, SpaceError> {
        let p = self.space.get_element_order(elem_id)? as usize;
        let u_shapes = LobattoShapeFn::with(p, &[u]);
        let v_shapes = LobattoShapeFn::with(p, &[v]);

        Ok(self
            .weighted_basis(elem_id)?
            .iter()
            .map(|(lf, c)| c * u_shapes.value(lf.orders[0], 0) * v_shapes.value(lf.orders[1], 0))
            .sum())
    }

    /// Evaluate the solution over a grid of parametric points (`points` along both directions) on an active Elem
    ///
    /// Values are indexed as `[u-index][v-index]`
    pub fn elem_values(&self, elem_id: usize, points: &[f64]) -> Result<Vec<Vec<f64>>, SpaceError> {
        let p = self.space.get_element_order(elem_id)? as usize;
        let sampler: BasisFnSampler<LobattoShapeFn> = BasisFnSampler::with_points(points.to_vec(), p);
        let bf = sampler.sample_basis_fn(&self.space.mesh().elems[elem_id]);
        let weighted = self.weighted_basis(elem_id)?;

        Ok(grid_map(points.len(), |mn| {
            weighted
                .iter()
                .map(|(lf, c)| c * bf.value(lf.orders, mn))
                .sum()
        }))
    }

    /// Evaluate the real-space gradient of the solution over a grid of parametric points on an active Elem
    pub fn elem_gradients(&self, elem_id: usize, points: &[f64]) -> Result<Vec<Vec<[f64; 2]>>, SpaceError> {
        let p = self.space.get_element_order(elem_id)? as usize;
        let bf: BasisFn<LobattoShapeFn> =
            BasisFn::with(p, points, points, &self.space.mesh().elems[elem_id]);
        let weighted = self.weighted_basis(elem_id)?;

        Ok(grid_map(points.len(), |mn| {
            weighted.iter().fold([0.0, 0.0], |[gx, gy], (lf, c)| {
                let grad = bf.grad(lf.orders, mn);
                [gx + c * grad.x(), gy + c * grad.y()]
            })
        }))
    }

    /// The minimum and maximum of the solution sampled on a `density` by `density` grid over each active Elem
    pub fn min_max(&self, density: usize) -> Result<[f64; 2], SpaceError> {
        let points = uniform_range(-1.0, 1.0, density.max(2));
        let mut extrema = [f64::INFINITY, f64::NEG_INFINITY];

        for (elem_id, _) in self.space.orders() {
            for value in self.elem_values(elem_id, &points)?.iter().flatten() {
                extrema[0] = extrema[0].min(*value);
                extrema[1] = extrema[1].max(*value);
            }
        }

        Ok(extrema)
    }

    /// Create a legacy ASCII VTK file at `path` containing the solution (as the point data `field_name`)
    ///
    /// Each active Elem is sampled over a `density` by `density` grid of points, which are connected by quadrilateral cells.
    ///
    /// These files can be plotted using [Visit](https://wci.llnl.gov/simulation/computer-codes/visit) or ParaView
    pub fn print_to_vtk(
        &self,
        path: impl AsRef<Path>,
        field_name: &str,
        density: usize,
    ) -> Result<(), FieldError> {
        if density < 2 {
            return Err(FieldError::InvalidDensity(density));
        }

        let mesh = self.space.mesh();
        let points = uniform_range(-1.0, 1.0, density);
        let active: Vec<usize> = self.space.orders().map(|(elem_id, _)| elem_id).collect();

        let output_file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(&output_file);
        write_vtk_header(&mut writer)?;

        // points
        let num_points = density * density * active.len();
        writeln!(writer, "\nPOINTS {} double", num_points)?;
        for elem_id in active.iter() {
            let elem = &mesh.elems[*elem_id];
            for u in points.iter() {
                for v in points.iter() {
                    let point = elem.map_point(V2D::from([*u, *v]));
                    writeln!(writer, "{:.10} {:.10} 0.0", point.x, point.y)?;
                }
            }
        }

        // cells
        let cells_per_elem = (density - 1) * (density - 1);
        let num_cells = cells_per_elem * active.len();
        writeln!(writer, "\nCELLS {} {}", num_cells, 5 * num_cells)?;
        for k in 0..active.len() {
            for m in 0..(density - 1) {
                for n in 0..(density - 1) {
                    let initial_pt = density * density * k + density * m + n;
                    writeln!(
                        writer,
                        "4\t{}\t{}\t{}\t{}",
                        initial_pt,
                        initial_pt + density,
                        initial_pt + density + 1,
                        initial_pt + 1,
                    )?;
                }
            }
        }

        write_cell_types(&mut writer, num_cells)?;

        // field values
        writeln!(writer, "POINT_DATA {}", num_points)?;
        writeln!(writer, "SCALARS {} double 1\nLOOKUP_TABLE default", field_name)?;
        for elem_id in active.iter() {
            for value in self.elem_values(*elem_id, &points)?.iter().flatten() {
                write!(writer, "{:.15} ", value)?;
            }
        }
        writeln!(writer)?;

        Ok(())
    }

    // pairs of each local function with its coefficient
    fn weighted_basis(&self, elem_id: usize) -> Result<Vec<(LocalFn, f64)>, SpaceError> {
        Ok(self
            .space
            .local_basis(elem_id)?
            .into_iter()
            .map(|lf| {
                let c = lf.row.evaluate(&self.coefficients);
                (lf, c)
            })
            .collect())
    }
}

/// Create a legacy ASCII VTK file at `path` with one cell per active Elem, carrying the Elem's polynomial order
pub fn print_orders_to_vtk(space: &FunctionSpace, path: impl AsRef<Path>) -> Result<(), FieldError> {
    let mesh = space.mesh();
    let num_elems = space.orders().count();

    let output_file = File::create(path.as_ref())?;
    let mut writer = BufWriter::new(&output_file);
    write_vtk_header(&mut writer)?;

    writeln!(writer, "\nPOINTS {} double", 4 * num_elems)?;
    for (elem_id, _) in space.orders() {
        let [sw, se, nw, ne] = mesh.elem_points(elem_id);
        for point in [sw, se, ne, nw] {
            writeln!(writer, "{:.10} {:.10} 0.0", point.x, point.y)?;
        }
    }

    writeln!(writer, "\nCELLS {} {}", num_elems, 5 * num_elems)?;
    for k in 0..num_elems {
        writeln!(writer, "4\t{}\t{}\t{}\t{}", 4 * k, 4 * k + 1, 4 * k + 2, 4 * k + 3)?;
    }

    write_cell_types(&mut writer, num_elems)?;

    writeln!(writer, "CELL_DATA {}", num_elems)?;
    writeln!(writer, "SCALARS order int 1\nLOOKUP_TABLE default")?;
    for (_, order) in space.orders() {
        write!(writer, "{} ", order)?;
    }
    writeln!(writer)?;

    Ok(())
}

fn write_vtk_header(writer: &mut BufWriter<&File>) -> std::io::Result<()> {
    writeln!(writer, "# vtk DataFile Version 3.0")?;
    writeln!(
        writer,
        "File generated by heat_fem_2d at {}s since the epoch",
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map_or(0, |d| d.as_secs())
    )?;
    writeln!(writer, "ASCII")?;
    writeln!(writer, "DATASET UNSTRUCTURED_GRID")
}

fn write_cell_types(writer: &mut BufWriter<&File>, num_cells: usize) -> std::io::Result<()> {
    writeln!(writer, "\nCELL_TYPES {}", num_cells)?;
    for _ in 0..num_cells {
        write!(writer, " 9")?;
    }
    writeln!(writer)
}

fn grid_map<T, F>(n: usize, f: F) -> Vec<Vec<T>>
where
    F: Fn([usize; 2]) -> T,
{
    (0..n).map(|m| (0..n).map(|k| f([m, k])).collect()).collect()
}

fn uniform_range(min: f64, max: f64, n: usize) -> Vec<f64> {
    let step = (max - min) / ((n - 1) as f64);
    (0..n).map(|i| (i as f64) * step + min).collect()
}

/// The length of a coefficient vector does not match the number of DoFs in a [FunctionSpace]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Coefficient vector has length {found}, but the FunctionSpace has {expected} DoFs!")]
pub struct DimensionMismatchError {
    pub expected: usize,
    pub found: usize,
}

/// Error type for Solution evaluation and export
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Failed to write VTK file: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Space(#[from] SpaceError),
    #[error("Sampling density must be at least 2 (got {0})!")]
    InvalidDensity(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_domain::domain::{bcs::EssentialBCs, mesh::Mesh, space::dof::DofOwner};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn linear_space() -> FunctionSpace {
        let mesh = Mesh::rectangular_grid(2, 2, [0.0, 2.0], [0.0, 1.0], "Copper").unwrap();
        FunctionSpace::new(Arc::new(mesh), EssentialBCs::new(), 1).unwrap()
    }

    // coefficients which reproduce f(x, y) = x + 2y with the nodal functions
    fn linear_field(space: &FunctionSpace) -> Vec<f64> {
        let mut coeffs = vec![0.0; space.get_num_dofs()];
        for (owner, range) in space.dof_map().iter() {
            if let DofOwner::Vertex(node_id) = owner {
                let p = space.mesh().nodes[node_id].coords;
                coeffs[range.start] = p.x + 2.0 * p.y;
            }
        }
        coeffs
    }

    #[test]
    fn dimension_mismatch() {
        let space = linear_space();
        assert_eq!(
            Solution::new(vec![0.0; 3], &space).unwrap_err(),
            DimensionMismatchError {
                expected: 9,
                found: 3
            }
        );
    }

    #[test]
    fn evaluate_linear_field() {
        let space = linear_space();
        let solution = Solution::new(linear_field(&space), &space).unwrap();

        // elem 3 covers [1, 2] x [0.5, 1]
        assert_relative_eq!(solution.value_at(3, [0.0, 0.0]).unwrap(), 1.5 + 1.5, epsilon = 1e-12);

        let values = solution.elem_values(0, &[-1.0, 1.0]).unwrap();
        assert_relative_eq!(values[1][1], 1.0 + 1.0, epsilon = 1e-12);

        let grads = solution.elem_gradients(2, &[-0.5, 0.5]).unwrap();
        for g in grads.iter().flatten() {
            assert_relative_eq!(g[0], 1.0, epsilon = 1e-12);
            assert_relative_eq!(g[1], 2.0, epsilon = 1e-12);
        }

        let [min, max] = solution.min_max(3).unwrap();
        assert_relative_eq!(min, 0.0, epsilon = 1e-12);
        assert_relative_eq!(max, 4.0, epsilon = 1e-12);

        assert_eq!(
            solution.value_at(9, [0.0, 0.0]),
            Err(SpaceError::InvalidElement(9))
        );
    }

    #[test]
    fn vtk_export() {
        let space = linear_space();
        let solution = Solution::new(linear_field(&space), &space).unwrap();
        let dir = std::env::temp_dir();

        let field_path = dir.join("heat_fem_2d_field_export.vtk");
        solution.print_to_vtk(&field_path, "temperature", 4).unwrap();
        let contents = std::fs::read_to_string(&field_path).unwrap();
        assert!(contents.contains("POINTS 64 double"));
        assert!(contents.contains("CELLS 36 180"));
        assert!(contents.contains("SCALARS temperature double 1"));

        assert!(matches!(
            solution.print_to_vtk(&field_path, "temperature", 1),
            Err(FieldError::InvalidDensity(1))
        ));

        let orders_path = dir.join("heat_fem_2d_orders_export.vtk");
        print_orders_to_vtk(&space, &orders_path).unwrap();
        let contents = std::fs::read_to_string(&orders_path).unwrap();
        assert!(contents.contains("CELL_DATA 4"));
        assert!(contents.contains("1 1 1 1"));
    }
}

/// Global Degree-of-Freedom numbering and constraint rows
pub mod dof;

use super::{
    bcs::EssentialBCs,
    mesh::{
        p_refinement::{validate_order, PRef, PRefError},
        space::Point,
        topology::{ActiveTopology, HangingNode},
        Mesh,
    },
};
use crate::fem_domain::basis::{LobattoShapeFn, ShapeFn};
use crate::fem_problem::integration::glq::{gauss_quadrature_points, real_gauss_quad_1d};
use dof::{ConstraintRow, DofMap, DofOwner};
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// Constraint weights smaller than this are dropped
const CONSTRAINT_TOLERANCE: f64 = 1e-14;
/// Maximum length of a chain of hanging Nodes constrained by one another
const MAX_CONSTRAINT_DEPTH: usize = 64;

/// Which local shape function a [LocalFn] represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalFnKind {
    /// Nodal function at local vertex `0..4`
    Vertex(usize),
    /// Higher order function along local edge `0..4`
    Edge(usize),
    /// Interior function
    Bubble,
}

/// A shape function of an Elem along with its global constraint row
#[derive(Debug, Clone)]
pub struct LocalFn {
    /// Lobatto shape function orders along the u and v directions
    pub orders: [usize; 2],
    pub kind: LocalFnKind,
    pub row: ConstraintRow,
}

/// An H1-conforming hierarchic function space over the active Elems of a Mesh
///
/// The space is composed of:
/// * Vertex functions: one per (non-hanging) vertex of the active Mesh
/// * Edge functions: `p_edge - 1` per master Edge, where `p_edge` is the minimum order of the Elems touching the Edge
/// * Bubble functions: `(p - 1)^2` per active Elem of order `p`
///
/// Vertices and Edges along essential boundaries carry no DoFs; their coefficients are fixed by the [EssentialBCs].
/// The functions of fine Elems along the sub-edges of a coarser neighbor's Edge are constrained to the coarse trace.
#[derive(Debug, Clone)]
pub struct FunctionSpace {
    mesh: Arc<Mesh>,
    bcs: EssentialBCs,
    topology: ActiveTopology,
    orders: BTreeMap<usize, u8>,
    essential_nodes: BTreeMap<usize, f64>,
    essential_edges: BTreeMap<usize, String>,
    dofs: DofMap,
}

impl FunctionSpace {
    /// Construct a space over the active Elems of a Mesh, where each Elem has the polynomial order `default_order`
    ///
    /// ```
    /// use heat_fem_2d::prelude::*;
    /// use std::sync::Arc;
    ///
    /// let mesh = Arc::new(Mesh::rectangular_grid(2, 2, [0.0, 1.0], [0.0, 1.0], "Copper").unwrap());
    /// let bcs = EssentialBCs::new().with_constant("Bottom", 20.0);
    ///
    /// let space = FunctionSpace::new(mesh, bcs, 2).unwrap();
    /// assert_eq!(space.get_vertex_functions_count(), 6);
    /// assert_eq!(space.get_edge_functions_count(), 10);
    /// assert_eq!(space.get_bubble_functions_count(), 4);
    /// assert_eq!(space.get_num_dofs(), 20);
    /// ```
    pub fn new(mesh: Arc<Mesh>, bcs: EssentialBCs, default_order: u8) -> Result<Self, SpaceError> {
        let default_order = validate_order(default_order)?;
        bcs.unmatched_markers(&mesh);

        let topology = ActiveTopology::from_mesh(&mesh);
        let orders: BTreeMap<usize, u8> = mesh
            .active_elems()
            .map(|elem| (elem.id, default_order))
            .collect();
        let (essential_nodes, essential_edges) = classify_essential(&mesh, &topology, &bcs);

        let mut space = Self {
            mesh,
            bcs,
            topology,
            orders,
            essential_nodes,
            essential_edges,
            dofs: DofMap::default(),
        };
        space.dofs = DofMap::from_counts(space.owner_counts());

        info!(
            "FunctionSpace: {} DoFs ({} vertex, {} edge, {} bubble) over {} Elems",
            space.get_num_dofs(),
            space.get_vertex_functions_count(),
            space.get_edge_functions_count(),
            space.get_bubble_functions_count(),
            space.orders.len(),
        );

        Ok(space)
    }

    /// Copy a space's orders and boundary conditions onto another Mesh
    ///
    /// * If `target_mesh` is blank, the copy receives a deep copy of `other`'s Mesh
    /// * Otherwise `target_mesh` must be structurally identical to `other`'s Mesh
    ///
    /// The copy is fully independent of `other`.
    pub fn copy(other: &Self, target_mesh: Arc<Mesh>) -> Result<Self, SpaceError> {
        let mesh = if target_mesh.is_blank() {
            Arc::new(other.mesh.as_ref().clone())
        } else if target_mesh.is_compatible_with(&other.mesh) {
            target_mesh
        } else {
            return Err(SpaceError::IncompatibleMesh);
        };

        Ok(Self {
            mesh,
            bcs: other.bcs.clone(),
            topology: other.topology.clone(),
            orders: other.orders.clone(),
            essential_nodes: other.essential_nodes.clone(),
            essential_edges: other.essential_edges.clone(),
            dofs: other.dofs.clone(),
        })
    }

    // ----------------------------------------------------------------------------------------------------
    // Accessors
    // ----------------------------------------------------------------------------------------------------

    pub fn get_num_dofs(&self) -> usize {
        self.dofs.num_dofs()
    }

    pub fn get_vertex_functions_count(&self) -> usize {
        self.dofs
            .count_where(|owner| matches!(owner, DofOwner::Vertex(_)))
    }

    pub fn get_edge_functions_count(&self) -> usize {
        self.dofs
            .count_where(|owner| matches!(owner, DofOwner::Edge(_)))
    }

    pub fn get_bubble_functions_count(&self) -> usize {
        self.dofs
            .count_where(|owner| matches!(owner, DofOwner::Bubble(_)))
    }

    /// The polynomial order of an active Elem
    pub fn get_element_order(&self, elem_id: usize) -> Result<u8, SpaceError> {
        self.orders
            .get(&elem_id)
            .copied()
            .ok_or(SpaceError::InvalidElement(elem_id))
    }

    /// Iterate over the active Elems and their polynomial orders (in ascending Elem order)
    pub fn orders(&self) -> impl Iterator<Item = (usize, u8)> + '_ {
        self.orders.iter().map(|(id, order)| (*id, *order))
    }

    /// The largest polynomial order in the space
    pub fn max_order(&self) -> u8 {
        self.orders.values().copied().max().unwrap_or(1)
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn bcs(&self) -> &EssentialBCs {
        &self.bcs
    }

    pub fn topology(&self) -> &ActiveTopology {
        &self.topology
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dofs
    }

    /// The range of global DoF ids belonging to an owner
    pub fn dof_range(&self, owner: DofOwner) -> Option<Range<usize>> {
        self.dofs.range(owner)
    }

    /// Was this space built over the current state of `mesh`
    pub fn is_current_with(&self, mesh: &Mesh) -> bool {
        self.mesh.revision() == mesh.revision() && self.mesh.is_compatible_with(mesh)
    }

    /// The prescribed value at a Node on an essential boundary
    pub fn essential_node_value(&self, node_id: usize) -> Option<f64> {
        self.essential_nodes.get(&node_id).copied()
    }

    /// Is an Edge (of the active Mesh) on an essential boundary
    pub fn is_essential_edge(&self, edge_id: usize) -> bool {
        self.essential_edges.contains_key(&edge_id)
    }

    /// The effective order of a master Edge (the minimum order over all the active Elems touching it)
    pub fn edge_order(&self, edge_id: usize) -> u8 {
        let master_id = self.topology.master_of(edge_id).unwrap_or(edge_id);
        self.topology
            .supporting_elems(master_id)
            .filter_map(|elem_id| self.orders.get(&elem_id))
            .copied()
            .min()
            .unwrap_or(1)
    }

    // ----------------------------------------------------------------------------------------------------
    // p-Refinement
    // ----------------------------------------------------------------------------------------------------

    /// Set the polynomial order of a single active Elem
    ///
    /// Only the DoF ranges of the Elem's bubble and the master Edges it touches are recomputed.
    /// Vertex numbering is never modified.
    pub fn set_element_order(&mut self, elem_id: usize, order: u8) -> Result<(), SpaceError> {
        let order = validate_order(order)?;
        let current = self.get_element_order(elem_id)?;

        if current != order {
            self.orders.insert(elem_id, order);
            let counts = self.elem_owner_counts(elem_id);
            self.dofs.update_counts(counts);
            debug!(
                "Elem {} order {} -> {}; {} DoFs",
                elem_id,
                current,
                order,
                self.get_num_dofs()
            );
        }

        Ok(())
    }

    /// Apply a [PRef] to a list of Elems
    ///
    /// All refinements are validated before any order is modified.
    pub fn p_refine_elems(&mut self, elems: &[usize], refinement: PRef) -> Result<(), SpaceError> {
        let mut seen = BTreeSet::new();
        let mut new_orders = Vec::with_capacity(elems.len());
        for elem_id in elems {
            if !seen.insert(*elem_id) {
                return Err(PRefError::DoubleRefinement(*elem_id).into());
            }
            new_orders.push((*elem_id, refinement.refine(self.get_element_order(*elem_id)?)?));
        }

        for (elem_id, order) in new_orders {
            self.set_element_order(elem_id, order)?;
        }
        Ok(())
    }

    /// Apply a [PRef] to every active Elem
    pub fn global_p_refinement(&mut self, refinement: PRef) -> Result<(), SpaceError> {
        let all_elems: Vec<usize> = self.orders.keys().copied().collect();
        self.p_refine_elems(&all_elems, refinement)
    }

    // ----------------------------------------------------------------------------------------------------
    // Local Basis
    // ----------------------------------------------------------------------------------------------------

    /// The shape functions of an active Elem and their constraint rows
    ///
    /// Functions are listed as: 4 vertex functions, the edge functions of local edges 0 through 3 (in ascending order),
    /// then the bubble functions.
    pub fn local_basis(&self, elem_id: usize) -> Result<Vec<LocalFn>, SpaceError> {
        let p = self.get_element_order(elem_id)? as usize;
        let elem = &self.mesh.elems[elem_id];

        let mut local_fns = Vec::with_capacity((p + 1) * (p + 1));

        for (k, node_id) in elem.nodes.iter().enumerate() {
            local_fns.push(LocalFn {
                orders: [k % 2, k / 2],
                kind: LocalFnKind::Vertex(k),
                row: self.vertex_row(*node_id, 0)?,
            });
        }

        for (k, edge_id) in elem.edges.iter().enumerate() {
            let sign = self.mesh.edge_orientation(elem_id, k);
            let (q, rows) = match self.topology.master_of(*edge_id) {
                Some(master_id) => {
                    let q = self.edge_order(master_id) as usize;
                    (q, self.slave_edge_rows(*edge_id, master_id, q)?)
                }
                None => {
                    let q = self.edge_order(*edge_id) as usize;
                    (q, self.master_edge_rows(*edge_id, q)?)
                }
            };

            for (j, row) in (2..=q).zip(rows) {
                let orders = match k {
                    0 => [j, 0],
                    1 => [j, 1],
                    2 => [0, j],
                    _ => [1, j],
                };
                local_fns.push(LocalFn {
                    orders,
                    kind: LocalFnKind::Edge(k),
                    row: row.scaled(sign.powi(j as i32)),
                });
            }
        }

        let mut bubble_ids = self
            .dofs
            .range(DofOwner::Bubble(elem_id))
            .ok_or(SpaceError::InvalidElement(elem_id))?;
        for i in 2..=p {
            for j in 2..=p {
                let dof_id = bubble_ids
                    .next()
                    .ok_or(SpaceError::InvalidElement(elem_id))?;
                local_fns.push(LocalFn {
                    orders: [i, j],
                    kind: LocalFnKind::Bubble,
                    row: ConstraintRow::free(dof_id),
                });
            }
        }

        Ok(local_fns)
    }

    /// The coefficient of a vertex function in terms of the global DoFs
    fn vertex_row(&self, node_id: usize, depth: usize) -> Result<ConstraintRow, SpaceError> {
        if depth > MAX_CONSTRAINT_DEPTH {
            return Err(SpaceError::UnresolvedNode(node_id));
        }

        if let Some(range) = self.dofs.range(DofOwner::Vertex(node_id)) {
            return Ok(ConstraintRow::free(range.start));
        }
        if let Some(value) = self.essential_nodes.get(&node_id) {
            return Ok(ConstraintRow::fixed(*value));
        }

        match self.topology.hanging_node(node_id) {
            // the hanging Node takes the value of its master Edge's trace
            Some(HangingNode { master, t }) => {
                let q = self.edge_order(master) as usize;
                let shapes = LobattoShapeFn::with(q, &[t]);
                let [n0, n1] = self.mesh.edges[master].nodes;

                let mut row = ConstraintRow::default();
                row.add_scaled(&self.vertex_row(n0, depth + 1)?, shapes.value(0, 0));
                row.add_scaled(&self.vertex_row(n1, depth + 1)?, shapes.value(1, 0));
                for (j, edge_row) in (2..=q).zip(self.master_edge_rows(master, q)?) {
                    row.add_scaled(&edge_row, shapes.value(j, 0));
                }
                row.prune(CONSTRAINT_TOLERANCE);
                Ok(row)
            }
            None => Err(SpaceError::UnresolvedNode(node_id)),
        }
    }

    /// Rows of the edge functions `2..=q` of a master Edge (in the Edge's own direction)
    fn master_edge_rows(&self, edge_id: usize, q: usize) -> Result<Vec<ConstraintRow>, SpaceError> {
        if let Some(marker) = self.essential_edges.get(&edge_id) {
            Ok(self
                .dirichlet_edge_coefficients(edge_id, marker, q)
                .into_iter()
                .map(ConstraintRow::fixed)
                .collect())
        } else {
            let range = self
                .dofs
                .range(DofOwner::Edge(edge_id))
                .ok_or(SpaceError::UnresolvedEdge(edge_id))?;
            if range.len() + 1 != q.max(1) {
                return Err(SpaceError::UnresolvedEdge(edge_id));
            }
            Ok(range.map(ConstraintRow::free).collect())
        }
    }

    /// Rows of the edge functions `2..=q` of a constrained Edge (in the Edge's own direction)
    ///
    /// The master Edge's trace restricted to the sub-edge is expanded over the Lobatto functions of the sub-edge.
    /// Since the derivatives of the higher order functions are orthonormal, the coefficient of function `j` is the
    /// integral of the trace's derivative against `l_j'`.
    fn slave_edge_rows(
        &self,
        edge_id: usize,
        master_id: usize,
        q: usize,
    ) -> Result<Vec<ConstraintRow>, SpaceError> {
        if q < 2 {
            return Ok(Vec::new());
        }

        let [a, b] = self
            .mesh
            .edge_parametric_range(edge_id, master_id)
            .ok_or(SpaceError::UnresolvedEdge(edge_id))?;
        let half_width = (b - a) / 2.0;

        let (xi, weights) = gauss_quadrature_points(q + 1);
        let t: Vec<f64> = xi.iter().map(|x| a + half_width * (x + 1.0)).collect();
        let fine = LobattoShapeFn::with(q, &xi);
        let coarse = LobattoShapeFn::with(q, &t);

        let [n0, n1] = self.mesh.edges[master_id].nodes;
        let mut master_rows = vec![self.vertex_row(n0, 1)?, self.vertex_row(n1, 1)?];
        master_rows.extend(self.master_edge_rows(master_id, q)?);

        Ok((2..=q)
            .map(|j| {
                let mut row = ConstraintRow::default();
                for (m, m_row) in master_rows.iter().enumerate() {
                    let alpha = half_width
                        * real_gauss_quad_1d(&weights, |p| coarse.d1(m, p) * fine.d1(j, p));
                    row.add_scaled(m_row, alpha);
                }
                row.prune(CONSTRAINT_TOLERANCE);
                row
            })
            .collect())
    }

    /// Coefficients of edge functions `2..=q` which best approximate the Dirichlet data along an essential Edge
    ///
    /// The data minus its linear interpolant is projected onto the Lobatto functions in the H1-seminorm:
    /// `a_j = -integral((g - g_lin) * l_j'')`
    fn dirichlet_edge_coefficients(&self, edge_id: usize, marker: &str, q: usize) -> Vec<f64> {
        if q < 2 {
            return Vec::new();
        }

        let [p0, p1] = self.mesh.edge_points(edge_id);
        let [n0, n1] = self.mesh.edges[edge_id].nodes;
        let g0 = self.essential_nodes.get(&n0).copied().unwrap_or(0.0);
        let g1 = self.essential_nodes.get(&n1).copied().unwrap_or(0.0);

        let (points, weights) = gauss_quadrature_points(q + 3);
        let shapes = LobattoShapeFn::with(q, &points);
        let residual: Vec<f64> = points
            .iter()
            .enumerate()
            .map(|(m, t)| {
                let g = self
                    .bcs
                    .value(marker, &point_along(p0, p1, *t))
                    .unwrap_or(0.0);
                g - g0 * shapes.value(0, m) - g1 * shapes.value(1, m)
            })
            .collect();

        (2..=q)
            .map(|j| -real_gauss_quad_1d(&weights, |m| residual[m] * shapes.d2(j, m)))
            .collect()
    }

    // ----------------------------------------------------------------------------------------------------
    // DoF counting
    // ----------------------------------------------------------------------------------------------------

    fn owner_counts(&self) -> Vec<(DofOwner, usize)> {
        let vertices = self
            .topology
            .vertices()
            .filter(|node_id| !self.essential_nodes.contains_key(node_id))
            .map(|node_id| (DofOwner::Vertex(node_id), 1));

        let edges = self
            .topology
            .master_edges()
            .filter(|edge_id| !self.essential_edges.contains_key(edge_id))
            .map(|edge_id| (DofOwner::Edge(edge_id), self.edge_order(edge_id) as usize - 1));

        let bubbles = self
            .orders
            .iter()
            .map(|(elem_id, order)| (DofOwner::Bubble(*elem_id), bubble_count(*order)));

        vertices.chain(edges).chain(bubbles).collect()
    }

    fn elem_owner_counts(&self, elem_id: usize) -> Vec<(DofOwner, usize)> {
        let mut counts = Vec::with_capacity(5);
        if let Some(order) = self.orders.get(&elem_id) {
            counts.push((DofOwner::Bubble(elem_id), bubble_count(*order)));
        }

        for edge_id in self.mesh.elems[elem_id].edges.iter() {
            let master_id = self.topology.master_of(*edge_id).unwrap_or(*edge_id);
            if !self.essential_edges.contains_key(&master_id) {
                counts.push((
                    DofOwner::Edge(master_id),
                    self.edge_order(master_id) as usize - 1,
                ));
            }
        }

        counts
    }
}

fn bubble_count(order: u8) -> usize {
    (order as usize - 1).pow(2)
}

fn point_along(p0: &Point, p1: &Point, t: f64) -> Point {
    let s = (t + 1.0) / 2.0;
    Point::new(p0.x + (p1.x - p0.x) * s, p0.y + (p1.y - p0.y) * s)
}

/// Find the master Edges on essential boundaries and the prescribed values at their Nodes
///
/// Where two essential markers meet at a Node, the marker of the lowest Edge id takes precedence
fn classify_essential(
    mesh: &Mesh,
    topology: &ActiveTopology,
    bcs: &EssentialBCs,
) -> (BTreeMap<usize, f64>, BTreeMap<usize, String>) {
    let mut nodes = BTreeMap::new();
    let mut edges = BTreeMap::new();

    for edge_id in topology.master_edges() {
        let edge = &mesh.edges[edge_id];
        if let Some(marker) = edge.marker.as_deref().filter(|m| bcs.is_essential(m)) {
            for node_id in edge.nodes {
                if let Some(value) = bcs.value(marker, &mesh.nodes[node_id].coords) {
                    nodes.entry(node_id).or_insert(value);
                }
            }
            edges.insert(edge_id, marker.to_string());
        }
    }

    (nodes, edges)
}

/// Error type for FunctionSpace construction and modification
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpaceError {
    #[error("Elem {0} is not an active Elem of the FunctionSpace's Mesh!")]
    InvalidElement(usize),
    #[error(transparent)]
    InvalidOrder(#[from] PRefError),
    #[error("Target Mesh is not structurally identical to the FunctionSpace's Mesh; cannot copy!")]
    IncompatibleMesh,
    #[error("Could not resolve the constraint of Node {0}!")]
    UnresolvedNode(usize),
    #[error("Could not resolve the constraint of Edge {0}!")]
    UnresolvedEdge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fem_domain::domain::mesh::h_refinement::HRef;
    use approx::assert_relative_eq;

    fn unit_grid(n: usize) -> Mesh {
        Mesh::rectangular_grid(n, n, [0.0, 1.0], [0.0, 1.0], "Copper").unwrap()
    }

    fn hanging_mesh() -> Arc<Mesh> {
        let mut mesh = Mesh::rectangular_grid(2, 1, [0.0, 2.0], [0.0, 1.0], "Copper").unwrap();
        mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        Arc::new(mesh)
    }

    fn assert_dof_sum(space: &FunctionSpace) {
        assert_eq!(
            space.get_num_dofs(),
            space.get_vertex_functions_count()
                + space.get_edge_functions_count()
                + space.get_bubble_functions_count()
        );
    }

    /// Evaluate the field `dof_values` at a point in an Elem's parametric space
    fn trace(space: &FunctionSpace, elem_id: usize, dof_values: &[f64], [u, v]: [f64; 2]) -> f64 {
        let p = space.get_element_order(elem_id).unwrap() as usize;
        let u_shapes = LobattoShapeFn::with(p, &[u]);
        let v_shapes = LobattoShapeFn::with(p, &[v]);
        space
            .local_basis(elem_id)
            .unwrap()
            .iter()
            .map(|lf| {
                lf.row.evaluate(dof_values)
                    * u_shapes.value(lf.orders[0], 0)
                    * v_shapes.value(lf.orders[1], 0)
            })
            .sum()
    }

    #[test]
    fn dof_counts() {
        let mesh = Arc::new(unit_grid(2));

        let linear = FunctionSpace::new(mesh.clone(), EssentialBCs::new(), 1).unwrap();
        assert_eq!(linear.get_vertex_functions_count(), 9);
        assert_eq!(linear.get_edge_functions_count(), 0);
        assert_eq!(linear.get_bubble_functions_count(), 0);

        let cubic = FunctionSpace::new(mesh, EssentialBCs::new(), 3).unwrap();
        assert_eq!(cubic.get_vertex_functions_count(), 9);
        assert_eq!(cubic.get_edge_functions_count(), 12 * 2);
        assert_eq!(cubic.get_bubble_functions_count(), 4 * 4);
        assert_dof_sum(&cubic);
    }

    #[test]
    fn essential_boundaries_remove_dofs() {
        let mesh = Arc::new(unit_grid(2));
        let bcs = EssentialBCs::new().with_constant_on(&["Bottom", "Top", "Left", "Right"], 20.0);
        let space = FunctionSpace::new(mesh, bcs, 2).unwrap();

        assert_eq!(space.get_vertex_functions_count(), 1);
        assert_eq!(space.get_edge_functions_count(), 4);
        assert_eq!(space.get_bubble_functions_count(), 4);
        assert_dof_sum(&space);

        let corner_fn = &space.local_basis(0).unwrap()[0];
        assert_eq!(corner_fn.kind, LocalFnKind::Vertex(0));
        assert!(corner_fn.row.is_fixed());
        assert_relative_eq!(corner_fn.row.offset, 20.0);

        // constant data has no higher order component
        let edge_fn = &space.local_basis(0).unwrap()[4];
        assert_eq!(edge_fn.kind, LocalFnKind::Edge(0));
        assert!(edge_fn.row.is_fixed());
        assert!(edge_fn.row.offset.abs() < 1e-14);
    }

    #[test]
    fn essential_entities() {
        let mesh = Arc::new(unit_grid(1));
        let bcs = EssentialBCs::new()
            .with_constant("Bottom", 1.0)
            .with_constant("Left", 2.0);
        let space = FunctionSpace::new(mesh.clone(), bcs, 2).unwrap();

        let [sw, se, nw, ne] = mesh.elems[0].nodes;
        let sw_value = space.essential_node_value(sw).unwrap();
        assert!(sw_value == 1.0 || sw_value == 2.0);
        assert_eq!(space.essential_node_value(se), Some(1.0));
        assert_eq!(space.essential_node_value(nw), Some(2.0));
        assert_eq!(space.essential_node_value(ne), None);

        let [bottom, top, left, right] = mesh.elems[0].edges;
        assert!(space.is_essential_edge(bottom) && space.is_essential_edge(left));
        assert!(!space.is_essential_edge(top) && !space.is_essential_edge(right));
        assert_eq!(space.get_vertex_functions_count(), 1);
    }

    #[test]
    fn quadratic_dirichlet_data() {
        let mesh = Arc::new(unit_grid(1));
        let bcs = EssentialBCs::new().with_fn("Bottom", |p: &Point| p.x * p.x);
        let space = FunctionSpace::new(mesh, bcs, 2).unwrap();

        let basis = space.local_basis(0).unwrap();
        let bottom = basis
            .iter()
            .find(|lf| lf.kind == LocalFnKind::Edge(0))
            .unwrap();

        // x^2 - x = (t^2 - 1) / 4 = l_2(t) / sqrt(6)
        assert_relative_eq!(bottom.row.offset, 1.0 / 6.0_f64.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(basis[1].row.offset, 1.0);
    }

    #[test]
    fn invalid_orders_and_elems() {
        let mesh = Arc::new(unit_grid(2));
        assert_eq!(
            FunctionSpace::new(mesh.clone(), EssentialBCs::new(), 0).unwrap_err(),
            SpaceError::InvalidOrder(PRefError::NegExpansion)
        );

        let mut space = FunctionSpace::new(mesh, EssentialBCs::new(), 2).unwrap();
        assert_eq!(
            space.set_element_order(4, 2),
            Err(SpaceError::InvalidElement(4))
        );
        assert!(space.set_element_order(0, 25).is_err());
        assert_eq!(space.get_element_order(0), Ok(2));
    }

    #[test]
    fn set_element_order_is_local() {
        let mesh = Arc::new(unit_grid(2));
        let mut space = FunctionSpace::new(mesh, EssentialBCs::new(), 2).unwrap();
        let vertex_ranges: Vec<_> = space
            .dof_map()
            .iter()
            .filter(|(owner, _)| matches!(owner, DofOwner::Vertex(_)))
            .collect();

        space.set_element_order(3, 4).unwrap();
        assert_dof_sum(&space);
        // minimum rule: the shared edges keep order 2; the outer edges of elem 3 are raised to 4
        assert_eq!(space.get_edge_functions_count(), 12 + 2 * 2);
        assert_eq!(space.get_bubble_functions_count(), 3 + 9);

        let vertex_ranges_after: Vec<_> = space
            .dof_map()
            .iter()
            .filter(|(owner, _)| matches!(owner, DofOwner::Vertex(_)))
            .collect();
        assert_eq!(vertex_ranges, vertex_ranges_after);

        space.set_element_order(3, 2).unwrap();
        assert_eq!(space.get_num_dofs(), 9 + 12 + 4);
    }

    #[test]
    fn p_refinements() {
        let mesh = Arc::new(unit_grid(2));
        let mut space = FunctionSpace::new(mesh, EssentialBCs::new(), 1).unwrap();
        let linear_dofs = space.get_num_dofs();

        space.global_p_refinement(PRef::from(1)).unwrap();
        assert!(space.get_num_dofs() > linear_dofs);
        assert!(space.orders().all(|(_, order)| order == 2));

        assert_eq!(
            space.p_refine_elems(&[0, 0], PRef::from(1)),
            Err(SpaceError::InvalidOrder(PRefError::DoubleRefinement(0)))
        );
        // an invalid refinement leaves every order untouched
        assert!(space.p_refine_elems(&[1, 2], PRef::from(-2)).is_err());
        assert_eq!(space.get_element_order(1), Ok(2));
    }

    #[test]
    fn copy_onto_meshes() {
        let mesh = Arc::new(unit_grid(2));
        let mut space = FunctionSpace::new(mesh.clone(), EssentialBCs::new(), 2).unwrap();
        space.set_element_order(1, 3).unwrap();

        let identical = Arc::new(unit_grid(2));
        let mut copied = FunctionSpace::copy(&space, identical).unwrap();
        assert_eq!(copied.get_num_dofs(), space.get_num_dofs());
        assert!(copied.orders().eq(space.orders()));

        copied.set_element_order(0, 5).unwrap();
        assert_eq!(space.get_element_order(0), Ok(2));

        let from_blank = FunctionSpace::copy(&space, Arc::new(Mesh::blank())).unwrap();
        assert!(from_blank.mesh().is_compatible_with(&mesh));
        assert!(!Arc::ptr_eq(from_blank.mesh(), &mesh));

        assert_eq!(
            FunctionSpace::copy(&space, Arc::new(unit_grid(3))).unwrap_err(),
            SpaceError::IncompatibleMesh
        );
    }

    #[test]
    fn stale_mesh_detection() {
        let mesh = unit_grid(2);
        let space = FunctionSpace::new(Arc::new(mesh.clone()), EssentialBCs::new(), 1).unwrap();
        assert!(space.is_current_with(&mesh));

        let mut refined = mesh;
        refined.refine_all(1).unwrap();
        assert!(!space.is_current_with(&refined));
    }

    #[test]
    fn hanging_node_constraints() {
        let space = FunctionSpace::new(hanging_mesh(), EssentialBCs::new(), 1).unwrap();
        // 6 base vertices + 4 new vertices, the mid-point of the shared edge hangs
        assert_eq!(space.get_vertex_functions_count(), 10);
        assert_dof_sum(&space);

        let shared = space.mesh().elems[1].edges[2];
        let mid_node = space.mesh().edges[shared].child_node_id().unwrap();
        let [n0, n1] = space.mesh().edges[shared].nodes;
        let d0 = space.dof_range(DofOwner::Vertex(n0)).unwrap().start;
        let d1 = space.dof_range(DofOwner::Vertex(n1)).unwrap().start;

        // SE child of elem 0: its NE corner is the hanging node
        let basis = space.local_basis(3).unwrap();
        assert_eq!(space.mesh().elems[3].nodes[3], mid_node);
        let mut terms = basis[3].row.terms.to_vec();
        terms.sort_by_key(|(id, _)| *id);
        let mut expected = vec![(d0, 0.5), (d1, 0.5)];
        expected.sort_by_key(|(id, _)| *id);
        assert_eq!(terms.len(), 2);
        for ((id, w), (e_id, e_w)) in terms.iter().zip(expected.iter()) {
            assert_eq!(id, e_id);
            assert_relative_eq!(*w, *e_w, epsilon = 1e-14);
        }
    }

    #[test]
    fn traces_are_continuous_across_hanging_nodes() {
        let mut space = FunctionSpace::new(hanging_mesh(), EssentialBCs::new(), 2).unwrap();
        space.set_element_order(1, 3).unwrap();
        space.set_element_order(3, 4).unwrap();
        space.set_element_order(5, 3).unwrap();
        assert_dof_sum(&space);

        let dof_values: Vec<f64> = (0..space.get_num_dofs())
            .map(|i| (i as f64 * 0.37 + 0.1).sin())
            .collect();

        // the shared edge lies at x = 1: u = -1 on elem 1, u = +1 on the east children of elem 0
        for y in [0.05, 0.2, 0.45, 0.5, 0.6, 0.8, 0.99] {
            let coarse = trace(&space, 1, &dof_values, [-1.0, 2.0 * y - 1.0]);
            let fine = if y <= 0.5 {
                trace(&space, 3, &dof_values, [1.0, 4.0 * y - 1.0])
            } else {
                trace(&space, 5, &dof_values, [1.0, 4.0 * y - 3.0])
            };
            assert_relative_eq!(coarse, fine, epsilon = 1e-12);
        }
    }

    #[test]
    fn traces_are_continuous_between_conforming_elems() {
        let mut space = FunctionSpace::new(Arc::new(unit_grid(2)), EssentialBCs::new(), 3).unwrap();
        space.set_element_order(1, 5).unwrap();

        let dof_values: Vec<f64> = (0..space.get_num_dofs())
            .map(|i| (i as f64 * 1.3).cos())
            .collect();

        // elems 0 and 1 share the edge x = 0.5
        for v in [-0.9, -0.3, 0.0, 0.4, 0.8] {
            let west = trace(&space, 0, &dof_values, [1.0, v]);
            let east = trace(&space, 1, &dof_values, [-1.0, v]);
            assert_relative_eq!(west, east, epsilon = 1e-12);
        }
    }
}

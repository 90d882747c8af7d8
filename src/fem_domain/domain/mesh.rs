/// A line between two Nodes
pub mod edge;
/// A Finite Element in Parametric Space
pub mod elem;
/// A Finite Element in Real Space
pub mod element;
/// Structures and Functions to facilitate RBS based anisotropic h-refinement
pub mod h_refinement;
/// Reading and writing Meshes in the JSON mesh format
pub mod io;
/// A Point in Real Space
pub mod node;
/// Structures and Functions to facilitate p-refinement
pub mod p_refinement;
/// Structures to describe the 2D real and parametric spaces defining a Mesh
pub mod space;
/// Classification of the active Edges and Nodes of an h-refined Mesh
pub mod topology;

use edge::Edge;
use elem::{Elem, ElemUninit, EDGE_NODE_IDX};
use element::Element;
use h_refinement::{HRef, HRefError};
use io::MeshParseError;
use node::Node;
use space::{Point, V2D};

use super::IdTracker;

use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Minimum Edge length in real space. h-Refinements will fail after edges are smaller than this value.
pub const MIN_EDGE_LENGTH: f64 = 3.0518e-5; // 15ish refinement layers with unit sized cells

/// The expected "h-Refinement" depth. This determines the stack allocation size of some `SmallVec`s related to h-Refinement
pub const EXPECTED_NUM_H_REFINEMENTS: usize = 8;

/// Maximum Polynomial expansion. p-Refinements will fail when Elem's expansion orders exceed this value.
pub const MAX_POLYNOMIAL_ORDER: u8 = 20;

/// Information used to Define the geometric structure and refinement state of a Domain.
///
/// The Mesh is an arena: `Elem`s, `Edge`s and `Node`s are stored in flat vectors and refer to one another by id.
/// h-Refinement only ever appends to these vectors, so ids are stable for the lifetime of the Mesh.
#[derive(Debug, Clone)]
pub struct Mesh {
    pub elements: Vec<Arc<Element>>,
    pub elems: Vec<Elem>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    num_base_nodes: usize,
    num_base_edges: usize,
    revision: u64,
    refinement_log: Vec<(usize, HRef)>,
}

/// Error type for queries on ids that are not present in the Mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MeshAccessError {
    #[error("Elem {0} does not exist!")]
    ElemDoesNotExist(usize),
    #[error("Edge {0} does not exist!")]
    EdgeDoesNotExist(usize),
}

impl Mesh {
    /// Construct a completely empty Mesh
    pub fn blank() -> Self {
        Self {
            elements: Vec::new(),
            elems: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            num_base_nodes: 0,
            num_base_edges: 0,
            revision: 0,
            refinement_log: Vec::new(),
        }
    }

    /// Construct a conforming base Mesh from its raw parts
    ///
    /// * `points`: the location of each Node
    /// * `element_descs`: the Node ids of each quadrilateral (ordered SW, SE, NW, NE) and the name of its material region
    /// * `boundaries`: pairs of Node ids identifying an Edge, and the marker attached to it
    ///
    /// Elements must not overlap, and the Nodes of each Element must describe an orientation preserving
    /// bilinear map. Markers may be attached to any Edge which exists in the Mesh.
    pub fn from_parts(
        points: Vec<Point>,
        element_descs: Vec<([usize; 4], String)>,
        boundaries: Vec<([usize; 2], String)>,
    ) -> Result<Self, MeshParseError> {
        if element_descs.is_empty() {
            return Err(MeshParseError::NoElements);
        }

        let mut unique_points: HashMap<Point, usize> = HashMap::with_capacity(points.len());
        for (node_id, point) in points.iter().enumerate() {
            if let Some(other_id) = unique_points.insert(*point, node_id) {
                return Err(MeshParseError::DuplicateNodes(other_id, node_id));
            }
        }

        // build the Elements, checking their node ids and geometry
        let elements = element_descs
            .iter()
            .enumerate()
            .map(|(element_id, (node_ids, material))| {
                if let Some(bad_id) = node_ids.iter().find(|id| **id >= points.len()) {
                    return Err(MeshParseError::InvalidNodeId {
                        element: element_id,
                        node: *bad_id,
                    });
                }
                if has_duplicates(node_ids) {
                    return Err(MeshParseError::RepeatedNodeIds(element_id));
                }

                let element =
                    Element::new(element_id, node_ids.map(|id| points[id]), material.as_str());

                if element.is_valid() {
                    Ok(Arc::new(element))
                } else {
                    Err(MeshParseError::DegenerateElement(element_id))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        // build a map which describes all the edges and the (element, local edge index) pairs that use them
        // {[min_node_id, max_node_id] => (directed node ids, [(element_id, local_idx)])}
        let mut edge_descs: BTreeMap<[usize; 2], ([usize; 2], SmallVec<[(usize, usize); 2]>)> =
            BTreeMap::new();
        for (element_id, (node_ids, _)) in element_descs.iter().enumerate() {
            for (local_idx, [a, b]) in EDGE_NODE_IDX.iter().enumerate() {
                let directed = [node_ids[*a], node_ids[*b]];
                let (_, users) = edge_descs
                    .entry(sorted_pair(directed))
                    .or_insert_with(|| (directed, SmallVec::new()));

                users.push((element_id, local_idx));
                if users.len() > 2 {
                    return Err(MeshParseError::NonManifoldEdge(directed));
                }
            }
        }

        let edge_ids: HashMap<[usize; 2], usize> = edge_descs
            .keys()
            .enumerate()
            .map(|(edge_id, key)| (*key, edge_id))
            .collect();

        // attach boundary markers
        let mut markers: Vec<Option<String>> = vec![None; edge_descs.len()];
        for (node_pair, marker) in boundaries {
            match edge_ids.get(&sorted_pair(node_pair)) {
                Some(edge_id) => markers[*edge_id] = Some(marker),
                None => return Err(MeshParseError::UnknownBoundaryEdge(node_pair)),
            }
        }

        // Nodes touching an edge with only one adjacent element sit on the border of the Mesh
        let mut boundary_nodes = vec![false; points.len()];
        for (directed, users) in edge_descs.values() {
            if users.len() == 1 {
                boundary_nodes[directed[0]] = true;
                boundary_nodes[directed[1]] = true;
            }
        }

        let nodes: Vec<Node> = points
            .iter()
            .enumerate()
            .map(|(node_id, point)| Node::new(node_id, *point, boundary_nodes[node_id]))
            .collect();

        let edges: Vec<Edge> = edge_descs
            .values()
            .zip(markers)
            .enumerate()
            .map(|(edge_id, ((directed, users), marker))| {
                Edge::new(
                    edge_id,
                    [&nodes[directed[0]], &nodes[directed[1]]],
                    users.len() == 1,
                    marker,
                )
            })
            .collect();

        let elems: Vec<Elem> = element_descs
            .iter()
            .zip(elements.iter())
            .map(|((node_ids, _), element)| {
                let local_edges = EDGE_NODE_IDX
                    .map(|[a, b]| edge_ids[&sorted_pair([node_ids[a], node_ids[b]])]);
                Elem::new(element.id, *node_ids, local_edges, element.clone())
            })
            .collect();

        let mut mesh = Self {
            num_base_nodes: nodes.len(),
            num_base_edges: edges.len(),
            elements,
            elems,
            nodes,
            edges,
            revision: 0,
            refinement_log: Vec::new(),
        };

        for elem_id in 0..mesh.elems.len() {
            mesh.connect_elem_to_edges(elem_id);
        }

        // a shared Edge must separate its two Elements
        for edge in mesh.edges.iter() {
            for side in 0..2 {
                if let [first, second, ..] = edge.elems_on_side(side) {
                    return Err(MeshParseError::OverlappingElements(*first, *second));
                }
            }
        }

        Ok(mesh)
    }

    /// Construct a structured Mesh of `nx` by `ny` rectangular Elements covering `[x0, x1] x [y0, y1]`
    ///
    /// All Elements belong to the region named `material`. The four sides of the rectangle carry the markers
    /// `"Bottom"`, `"Right"`, `"Top"` and `"Left"`.
    ///
    /// ```
    /// use heat_fem_2d::fem_domain::domain::mesh::Mesh;
    ///
    /// let mesh = Mesh::rectangular_grid(3, 2, [0.0, 3.0], [0.0, 1.0], "Steel").unwrap();
    /// assert_eq!(mesh.elems.len(), 6);
    /// assert_eq!(mesh.nodes.len(), 12);
    /// assert_eq!(mesh.edges.len(), 17);
    /// ```
    pub fn rectangular_grid(
        nx: usize,
        ny: usize,
        [x0, x1]: [f64; 2],
        [y0, y1]: [f64; 2],
        material: &str,
    ) -> Result<Self, MeshParseError> {
        let node_id = |i: usize, j: usize| j * (nx + 1) + i;

        let points = (0..=ny)
            .flat_map(|j| {
                (0..=nx).map(move |i| {
                    Point::new(
                        x0 + (x1 - x0) * i as f64 / nx.max(1) as f64,
                        y0 + (y1 - y0) * j as f64 / ny.max(1) as f64,
                    )
                })
            })
            .collect();

        let element_descs = (0..ny)
            .flat_map(|j| {
                (0..nx).map(move |i| {
                    (
                        [
                            node_id(i, j),
                            node_id(i + 1, j),
                            node_id(i, j + 1),
                            node_id(i + 1, j + 1),
                        ],
                        String::from(material),
                    )
                })
            })
            .collect();

        let mut boundaries = Vec::with_capacity(2 * (nx + ny));
        for i in 0..nx {
            boundaries.push(([node_id(i, 0), node_id(i + 1, 0)], String::from("Bottom")));
            boundaries.push(([node_id(i, ny), node_id(i + 1, ny)], String::from("Top")));
        }
        for j in 0..ny {
            boundaries.push(([node_id(0, j), node_id(0, j + 1)], String::from("Left")));
            boundaries.push(([node_id(nx, j), node_id(nx, j + 1)], String::from("Right")));
        }

        Self::from_parts(points, element_descs, boundaries)
    }

    // ----------------------------------------------------------------------------------------------------
    // General Data Retrieval
    // ----------------------------------------------------------------------------------------------------

    /// Does this Mesh have no Elems
    pub fn is_blank(&self) -> bool {
        self.elems.is_empty()
    }

    /// A counter which is incremented each time the Mesh is h-refined
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every h-refinement applied to the base Mesh (in order of execution)
    pub fn refinement_log(&self) -> &[(usize, HRef)] {
        &self.refinement_log
    }

    pub(crate) fn num_base_nodes(&self) -> usize {
        self.num_base_nodes
    }

    pub(crate) fn num_base_edges(&self) -> usize {
        self.num_base_edges
    }

    /// Iterate over the Elems without children (in order of ascending id)
    pub fn active_elems(&self) -> impl Iterator<Item = &Elem> + '_ {
        self.elems.iter().filter(|elem| !elem.has_children())
    }

    /// Number of Elems without children
    pub fn num_active_elems(&self) -> usize {
        self.active_elems().count()
    }

    /// The names of all material regions in the Mesh
    pub fn regions(&self) -> BTreeSet<&str> {
        self.elements
            .iter()
            .map(|element| element.material.as_str())
            .collect()
    }

    /// The names of all boundary markers in the Mesh
    pub fn markers(&self) -> BTreeSet<&str> {
        self.edges
            .iter()
            .filter_map(|edge| edge.marker.as_deref())
            .collect()
    }

    /// Get the four [Point]s composing an [`Elem`]
    pub fn elem_points(&self, elem_id: usize) -> [&Point; 4] {
        assert!(elem_id < self.elems.len());
        self.elems[elem_id]
            .nodes
            .map(|node_id| &self.nodes[node_id].coords)
    }

    /// Get the two [Point]s composing an [`Edge`]
    pub fn edge_points(&self, edge_id: usize) -> [&Point; 2] {
        assert!(edge_id < self.edges.len());
        [
            &self.nodes[self.edges[edge_id].nodes[0]].coords,
            &self.nodes[self.edges[edge_id].nodes[1]].coords,
        ]
    }

    /// `1.0` if the local Edge `local_idx` of an Elem points in the same direction as the Elem's local coordinate along it,
    /// `-1.0` otherwise
    pub fn edge_orientation(&self, elem_id: usize, local_idx: usize) -> f64 {
        let elem = &self.elems[elem_id];
        let [a, b] = EDGE_NODE_IDX[local_idx];
        if self.edges[elem.edges[local_idx]].nodes == [elem.nodes[a], elem.nodes[b]] {
            1.0
        } else {
            -1.0
        }
    }

    /// Get a list of an [`Elem`]s descendant's IDs
    pub fn descendant_elems(
        &self,
        elem_id: usize,
        include_starting_elem: bool,
    ) -> Result<Vec<usize>, MeshAccessError> {
        if elem_id >= self.elems.len() {
            Err(MeshAccessError::ElemDoesNotExist(elem_id))
        } else {
            let mut descendants = Vec::new();
            self.rec_descendant_elems(elem_id, include_starting_elem, &mut descendants);
            Ok(descendants)
        }
    }

    fn rec_descendant_elems(&self, elem_id: usize, include: bool, desc: &mut Vec<usize>) {
        if include {
            desc.push(elem_id);
        }
        if let Some(child_elem_ids) = self.elems[elem_id].child_ids() {
            for &cei in child_elem_ids {
                self.rec_descendant_elems(cei, true, desc);
            }
        }
    }

    /// Get a list of an [`Elem`]s ancestors's IDs (nearest first)
    pub fn ancestor_elems(
        &self,
        elem_id: usize,
        include_starting_elem: bool,
    ) -> Result<Vec<usize>, MeshAccessError> {
        if elem_id >= self.elems.len() {
            Err(MeshAccessError::ElemDoesNotExist(elem_id))
        } else {
            let mut ancestors = Vec::new();
            if include_starting_elem {
                ancestors.push(elem_id);
            }
            ancestors.extend(
                self.elems[elem_id]
                    .loc_stack()
                    .iter()
                    .rev()
                    .map(|(id, _)| *id),
            );
            Ok(ancestors)
        }
    }

    /// Get a list of an [`Edge`]s descendant's IDs
    pub fn descendant_edges(
        &self,
        edge_id: usize,
        include_starting_edge: bool,
    ) -> Result<Vec<usize>, MeshAccessError> {
        if edge_id >= self.edges.len() {
            Err(MeshAccessError::EdgeDoesNotExist(edge_id))
        } else {
            let mut descendants = Vec::new();
            self.rec_descendant_edges(edge_id, include_starting_edge, &mut descendants);
            Ok(descendants)
        }
    }

    fn rec_descendant_edges(&self, edge_id: usize, include: bool, desc: &mut Vec<usize>) {
        if include {
            desc.push(edge_id);
        }
        if let Some(child_edge_ids) = self.edges[edge_id].child_ids() {
            for cei in child_edge_ids {
                self.rec_descendant_edges(cei, true, desc);
            }
        }
    }

    /// Get a list of an [`Edge`]s ancestor's IDs (nearest first)
    pub fn ancestor_edges(
        &self,
        edge_id: usize,
        include_starting_edge: bool,
    ) -> Result<Vec<usize>, MeshAccessError> {
        if edge_id >= self.edges.len() {
            Err(MeshAccessError::EdgeDoesNotExist(edge_id))
        } else {
            let mut ancestors = Vec::new();
            if include_starting_edge {
                ancestors.push(edge_id);
            }
            let mut current = edge_id;
            while let Some(parent_id) = self.edges[current].parent_id() {
                ancestors.push(parent_id);
                current = parent_id;
            }
            Ok(ancestors)
        }
    }

    /// The portion of an ancestor Edge's parameter (`[-1, 1]` from `nodes[0]` to `nodes[1]`) covered by one of its descendants
    ///
    /// Returns `None` if `ancestor_id` is not an ancestor of `edge_id` (or `edge_id` itself)
    pub fn edge_parametric_range(&self, edge_id: usize, ancestor_id: usize) -> Option<[f64; 2]> {
        if edge_id >= self.edges.len() {
            return None;
        }

        let mut range = [-1.0, 1.0];
        let mut current = edge_id;
        while current != ancestor_id {
            let parent_id = self.edges[current].parent_id()?;
            let [first_child, _] = self.edges[parent_id].child_ids()?;
            range = if current == first_child {
                range.map(|t| (t - 1.0) / 2.0)
            } else {
                range.map(|t| (t + 1.0) / 2.0)
            };
            current = parent_id;
        }

        Some(range)
    }

    /// Determine if this Elem can be h-refined
    /// * returns false if the Elem already has children
    /// * returns false if splitting any of the Elem's Edges would produce Edges shorter than [MIN_EDGE_LENGTH]
    /// * returns an `Err` if the Mesh doesn't have `elem_id`
    pub fn elem_is_h_refineable(&self, elem_id: usize) -> Result<bool, HRefError> {
        if elem_id >= self.elems.len() {
            Err(HRefError::ElemDoesntExist(elem_id))
        } else {
            let elem = &self.elems[elem_id];
            Ok(!elem.has_children()
                && elem
                    .edges
                    .iter()
                    .all(|edge_id| self.edges[*edge_id].length / 2.0 >= MIN_EDGE_LENGTH))
        }
    }

    /// Do two Meshes share the same geometry, regions, markers and refinement state
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.elems.len() == other.elems.len()
            && self.edges.len() == other.edges.len()
            && self.nodes.len() == other.nodes.len()
            && self.elems.iter().zip(other.elems.iter()).all(|(a, b)| {
                a.nodes == b.nodes
                    && a.edges == b.edges
                    && a.has_children() == b.has_children()
                    && a.material() == b.material()
            })
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(a, b)| a.nodes == b.nodes && a.marker == b.marker)
            && self
                .nodes
                .iter()
                .zip(other.nodes.iter())
                .all(|(a, b)| a.coords == b.coords)
    }

    // ----------------------------------------------------------------------------------------------------
    // Region based refinement
    // ----------------------------------------------------------------------------------------------------

    /// Isotropically refine every active Elem in the named regions, `levels` times
    ///
    /// All region names are checked before any refinement is applied. If any of the refinements fail,
    /// the Mesh is left untouched.
    ///
    /// ```
    /// use heat_fem_2d::fem_domain::domain::mesh::{Mesh, h_refinement::HRefError};
    ///
    /// let mut mesh = Mesh::rectangular_grid(2, 1, [0.0, 2.0], [0.0, 1.0], "Steel").unwrap();
    /// mesh.refine(&["Steel"], 2).unwrap();
    /// assert_eq!(mesh.num_active_elems(), 32);
    ///
    /// let err = mesh.refine(&["Steel", "Unobtainium"], 1).unwrap_err();
    /// assert_eq!(err, HRefError::InvalidRegion(String::from("Unobtainium")));
    /// assert_eq!(mesh.num_active_elems(), 32);
    /// ```
    pub fn refine<S: AsRef<str>>(&mut self, regions: &[S], levels: usize) -> Result<(), HRefError> {
        {
            let known_regions = self.regions();
            if let Some(unknown) = regions
                .iter()
                .find(|name| !known_regions.contains(name.as_ref()))
            {
                return Err(HRefError::InvalidRegion(String::from(unknown.as_ref())));
            }
        }

        self.staged_refinement(levels, |_, elem| {
            regions.iter().any(|name| name.as_ref() == elem.material())
        })
    }

    /// Isotropically refine every active Elem in one region, once
    pub fn refine_single(&mut self, region: &str) -> Result<(), HRefError> {
        self.refine(&[region], 1)
    }

    /// Isotropically refine every active Elem in the Mesh, `levels` times
    pub fn refine_all(&mut self, levels: usize) -> Result<(), HRefError> {
        self.staged_refinement(levels, |_, _| true)
    }

    /// Isotropically refine the active Elems adjacent to Edges carrying any of the given markers, `levels` times
    pub fn refine_towards_boundary<S: AsRef<str>>(
        &mut self,
        markers: &[S],
        levels: usize,
    ) -> Result<(), HRefError> {
        {
            let known_markers = self.markers();
            if let Some(unknown) = markers
                .iter()
                .find(|name| !known_markers.contains(name.as_ref()))
            {
                return Err(HRefError::InvalidMarker(String::from(unknown.as_ref())));
            }
        }

        self.staged_refinement(levels, |mesh, elem| {
            elem.edges.iter().any(|edge_id| {
                mesh.edges[*edge_id]
                    .marker
                    .as_deref()
                    .map_or(false, |m| markers.iter().any(|name| name.as_ref() == m))
            })
        })
    }

    fn staged_refinement<F>(&mut self, levels: usize, filt: F) -> Result<(), HRefError>
    where
        F: Fn(&Self, &Elem) -> bool,
    {
        let mut staged = self.clone();
        for _ in 0..levels {
            let elem_ids = staged
                .active_elems()
                .filter(|elem| filt(&staged, elem))
                .map(|elem| elem.id)
                .collect();
            staged.h_refine_elems(elem_ids, HRef::T)?;
        }

        *self = staged;
        Ok(())
    }

    // ----------------------------------------------------------------------------------------------------
    // h-refinement methods
    // ----------------------------------------------------------------------------------------------------

    /// Apply an [HRef] to all [Elem]s in the Mesh that are eligible for h-refinement
    pub fn global_h_refinement(&mut self, refinement: HRef) -> Result<(), HRefError> {
        self.execute_h_refinements(
            self.elems
                .iter()
                .filter(|elem| matches!(self.elem_is_h_refineable(elem.id), Ok(true)))
                .map(|elem| (elem.id, refinement))
                .collect(),
        )
    }

    /// Apply an [HRef] to a list of [Elem]s by their ID
    pub fn h_refine_elems(&mut self, elems: Vec<usize>, refinement: HRef) -> Result<(), HRefError> {
        self.execute_h_refinements(elems.iter().map(|elem_id| (*elem_id, refinement)).collect())
    }

    /// h-refine [Elem]s according to an external filter function
    pub fn h_refine_with_filter<F>(&mut self, filt: F) -> Result<(), HRefError>
    where
        F: Fn(&Elem) -> Option<HRef>,
    {
        self.execute_h_refinements(
            self.elems
                .iter()
                .filter(|elem| matches!(self.elem_is_h_refineable(elem.id), Ok(true)))
                .filter_map(|elem| filt(elem).map(|refinement| (elem.id, refinement)))
                .collect(),
        )
    }

    /// Execute a series of [HRef]s on [Elem]s specified by their id
    ///
    /// The refinements are applied all together or not at all.
    pub fn execute_h_refinements(
        &mut self,
        refinements: Vec<(usize, HRef)>,
    ) -> Result<(), HRefError> {
        if refinements.is_empty() {
            return Ok(());
        }

        let mut staged = self.clone();
        staged.apply_h_refinements(refinements)?;
        staged.revision += 1;

        log::debug!(
            "h-refinement produced {} new Elems (revision {})",
            staged.elems.len() - self.elems.len(),
            staged.revision
        );

        *self = staged;
        Ok(())
    }

    // Execute refinements without staging. Each refinement is recorded in the log with its extension removed;
    // extensions are recorded separately after the refinements of the batch they belong to.
    pub(crate) fn apply_h_refinements(
        &mut self,
        refinements: Vec<(usize, HRef)>,
    ) -> Result<(), HRefError> {
        let mut refinements_map: BTreeMap<usize, HRef> = BTreeMap::new();
        for (elem_id, h_ref) in refinements {
            if elem_id >= self.elems.len() {
                return Err(HRefError::ElemDoesntExist(elem_id));
            }
            if refinements_map.insert(elem_id, h_ref).is_some() {
                return Err(HRefError::DoubleRefinement(elem_id));
            }
        }

        let mut refinement_extensions: Vec<(usize, HRef)> = Vec::new();
        let mut elem_id_tracker = self.elems.len();
        let mut node_id_tracker = IdTracker::new(self.nodes.len());
        let mut edge_id_tracker = IdTracker::new(self.edges.len());

        for (elem_id, refinement) in refinements_map {
            let new_uninitialized_elems =
                self.elems[elem_id].h_refine(refinement, &mut elem_id_tracker)?;

            let new_elems = match refinement {
                HRef::T => self.execute_t_refinement(
                    new_uninitialized_elems,
                    elem_id,
                    &mut node_id_tracker,
                    &mut edge_id_tracker,
                )?,
                HRef::U(extension) => {
                    let new_u_elems = self.execute_u_refinement(
                        new_uninitialized_elems,
                        elem_id,
                        &mut node_id_tracker,
                        &mut edge_id_tracker,
                    )?;
                    if let Some(child_idx) = extension {
                        refinement_extensions.push((new_u_elems[child_idx].id, HRef::v()))
                    }
                    new_u_elems
                }
                HRef::V(extension) => {
                    let new_v_elems = self.execute_v_refinement(
                        new_uninitialized_elems,
                        elem_id,
                        &mut node_id_tracker,
                        &mut edge_id_tracker,
                    )?;
                    if let Some(child_idx) = extension {
                        refinement_extensions.push((new_v_elems[child_idx].id, HRef::u()))
                    }
                    new_v_elems
                }
            };

            self.elems.extend(new_elems);
            self.refinement_log
                .push((elem_id, refinement.without_extension()));
        }

        if !refinement_extensions.is_empty() {
            self.apply_h_refinements(refinement_extensions)?;
        }

        Ok(())
    }

    fn execute_t_refinement(
        &mut self,
        mut new_elems: Vec<ElemUninit>,
        parent_elem_id: usize,
        node_id_tracker: &mut IdTracker,
        edge_id_tracker: &mut IdTracker,
    ) -> Result<Vec<Elem>, HRefError> {
        debug_assert_eq!(new_elems.len(), 4);

        // create a new node in the center of the parent Elem
        let center_node_id = node_id_tracker.next_id();
        let center_point = self.elems[parent_elem_id].map_point(V2D::from([0.0, 0.0]));

        debug_assert_eq!(center_node_id, self.nodes.len());
        self.nodes
            .push(Node::new(center_node_id, center_point, false));

        // connect the child Elems to the center node and the parents nodes
        for (elem_idx, elem_uninit) in new_elems.iter_mut().enumerate() {
            elem_uninit.set_node(3 - elem_idx, center_node_id);
            elem_uninit.set_node(elem_idx, self.elems[parent_elem_id].nodes[elem_idx]);
        }

        // Iterate over each parent Edge and refine it if necessary
        //      connect the child Elems to the edges descendant edges and node
        // Create a new Edge between the center_node and the new descendant Node
        //      connect the child Elems to the new Edge
        for (edge_index, adj_child_elem_indices, shared_node_indices, internal_edge_idx) in [
            (0, [0, 1], [1, 0], [3, 2]),
            (1, [2, 3], [3, 2], [3, 2]),
            (2, [0, 2], [2, 0], [1, 0]),
            (3, [1, 3], [3, 1], [1, 0]),
        ] {
            let (child_edge_ids, shared_node_id) = self.h_refine_local_edge(
                parent_elem_id,
                edge_index,
                node_id_tracker,
                edge_id_tracker,
            )?;

            new_elems[adj_child_elem_indices[0]].set_edge(edge_index, child_edge_ids[0]);
            new_elems[adj_child_elem_indices[1]].set_edge(edge_index, child_edge_ids[1]);

            new_elems[adj_child_elem_indices[0]].set_node(shared_node_indices[0], shared_node_id);
            new_elems[adj_child_elem_indices[1]].set_node(shared_node_indices[1], shared_node_id);

            // create a new edge between the shared node and central node
            let new_edge_id =
                self.new_edge_between_nodes([shared_node_id, center_node_id], edge_id_tracker);

            new_elems[adj_child_elem_indices[0]].set_edge(internal_edge_idx[0], new_edge_id);
            new_elems[adj_child_elem_indices[1]].set_edge(internal_edge_idx[1], new_edge_id);
        }

        // upgrade the ElemUninits to Elems (They should each have 4 node_ids and 4 edge_ids by this point)
        // connect the Elems to their relevant edges in the process
        self.upgrade_uninit_elems(new_elems)
    }

    fn execute_u_refinement(
        &mut self,
        mut new_elems: Vec<ElemUninit>,
        parent_elem_id: usize,
        node_id_tracker: &mut IdTracker,
        edge_id_tracker: &mut IdTracker,
    ) -> Result<Vec<Elem>, HRefError> {
        debug_assert_eq!(new_elems.len(), 2);
        let mut outer_node_ids = [0; 2];

        // h_refine Edges 0 and 1 if necessary and connect child Elems to the relevant Nodes and Edges
        for (edge_index, shared_node_indices, outer_node_indices) in
            [(0, [1, 0], [0, 1]), (1, [3, 2], [2, 3])]
        {
            let (child_edge_ids, shared_node_id) = self.h_refine_local_edge(
                parent_elem_id,
                edge_index,
                node_id_tracker,
                edge_id_tracker,
            )?;

            outer_node_ids[edge_index] = shared_node_id;

            new_elems[0].set_edge(edge_index, child_edge_ids[0]);
            new_elems[1].set_edge(edge_index, child_edge_ids[1]);
            new_elems[0].set_node(shared_node_indices[0], shared_node_id);
            new_elems[1].set_node(shared_node_indices[1], shared_node_id);

            new_elems[0].set_node(
                outer_node_indices[0],
                self.elems[parent_elem_id].nodes[outer_node_indices[0]],
            );
            new_elems[1].set_node(
                outer_node_indices[1],
                self.elems[parent_elem_id].nodes[outer_node_indices[1]],
            );
        }

        let new_edge_id = self.new_edge_between_nodes(outer_node_ids, edge_id_tracker);

        new_elems[0].set_edge(3, new_edge_id);
        new_elems[1].set_edge(2, new_edge_id);

        // the parents outer unrefined Edges are shared with the children
        new_elems[0].set_edge(2, self.elems[parent_elem_id].edges[2]);
        new_elems[1].set_edge(3, self.elems[parent_elem_id].edges[3]);

        self.upgrade_uninit_elems(new_elems)
    }

    fn execute_v_refinement(
        &mut self,
        mut new_elems: Vec<ElemUninit>,
        parent_elem_id: usize,
        node_id_tracker: &mut IdTracker,
        edge_id_tracker: &mut IdTracker,
    ) -> Result<Vec<Elem>, HRefError> {
        debug_assert_eq!(new_elems.len(), 2);
        let mut outer_node_ids = [0; 2];

        // h_refine Edges 2 and 3 if necessary and connect child Elems to the relevant Nodes and Edges
        for (edge_index, shared_node_indices, outer_node_indices) in
            [(2, [2, 0], [0, 2]), (3, [3, 1], [1, 3])]
        {
            let (child_edge_ids, shared_node_id) = self.h_refine_local_edge(
                parent_elem_id,
                edge_index,
                node_id_tracker,
                edge_id_tracker,
            )?;

            outer_node_ids[edge_index - 2] = shared_node_id;

            new_elems[0].set_edge(edge_index, child_edge_ids[0]);
            new_elems[1].set_edge(edge_index, child_edge_ids[1]);
            new_elems[0].set_node(shared_node_indices[0], shared_node_id);
            new_elems[1].set_node(shared_node_indices[1], shared_node_id);

            new_elems[0].set_node(
                outer_node_indices[0],
                self.elems[parent_elem_id].nodes[outer_node_indices[0]],
            );
            new_elems[1].set_node(
                outer_node_indices[1],
                self.elems[parent_elem_id].nodes[outer_node_indices[1]],
            );
        }

        let new_edge_id = self.new_edge_between_nodes(outer_node_ids, edge_id_tracker);

        new_elems[0].set_edge(1, new_edge_id);
        new_elems[1].set_edge(0, new_edge_id);

        new_elems[0].set_edge(0, self.elems[parent_elem_id].edges[0]);
        new_elems[1].set_edge(1, self.elems[parent_elem_id].edges[1]);

        self.upgrade_uninit_elems(new_elems)
    }

    // Split one of an Elem's local Edges (if it hasn't been already). The child ids are returned in the order of the
    // Elem's local coordinate along that Edge.
    fn h_refine_local_edge(
        &mut self,
        elem_id: usize,
        local_idx: usize,
        node_id_tracker: &mut IdTracker,
        edge_id_tracker: &mut IdTracker,
    ) -> Result<([usize; 2], usize), HRefError> {
        let (child_edge_ids, shared_node_id) = self.h_refine_edge_if_needed(
            self.elems[elem_id].edges[local_idx],
            node_id_tracker,
            edge_id_tracker,
        )?;

        if self.edge_orientation(elem_id, local_idx) > 0.0 {
            Ok((child_edge_ids, shared_node_id))
        } else {
            Ok(([child_edge_ids[1], child_edge_ids[0]], shared_node_id))
        }
    }

    fn h_refine_edge_if_needed(
        &mut self,
        parent_edge_id: usize,
        node_id_tracker: &mut IdTracker,
        edge_id_tracker: &mut IdTracker,
    ) -> Result<([usize; 2], usize), HRefError> {
        let parent_edge = &self.edges[parent_edge_id];
        if let (Some(child_ids), Some(node_id)) =
            (parent_edge.child_ids(), parent_edge.child_node_id())
        {
            return Ok((child_ids, node_id));
        }

        let new_edge_ids = edge_id_tracker.next_two_ids();
        let new_node_id = node_id_tracker.next_id();

        let new_edges = self.edges[parent_edge_id].h_refine(new_edge_ids, new_node_id)?;
        self.edges.extend(new_edges);

        let parent_edge_points = self.edge_points(parent_edge_id);
        let node_coords = Point::between(parent_edge_points[0], parent_edge_points[1]);

        debug_assert_eq!(new_node_id, self.nodes.len());
        self.nodes.push(Node::new(
            new_node_id,
            node_coords,
            self.edges[parent_edge_id].boundary,
        ));

        Ok((new_edge_ids, new_node_id))
    }

    fn new_edge_between_nodes(
        &mut self,
        node_ids: [usize; 2],
        edge_id_tracker: &mut IdTracker,
    ) -> usize {
        debug_assert_ne!(node_ids[0], node_ids[1]);

        let new_edge_id = edge_id_tracker.next_id();
        let new_edge = Edge::new(
            new_edge_id,
            [&self.nodes[node_ids[0]], &self.nodes[node_ids[1]]],
            false,
            None,
        );
        self.edges.push(new_edge);

        new_edge_id
    }

    fn upgrade_uninit_elems(
        &mut self,
        elems_uninit: Vec<ElemUninit>,
    ) -> Result<Vec<Elem>, HRefError> {
        let mut elems = Vec::with_capacity(4);
        for elem_uninit in elems_uninit {
            elems.push(elem_uninit.into_elem()?);
        }

        for elem in elems.iter() {
            for edge_id in elem.edges {
                let side = self.side_of_edge(edge_id, elem);
                self.edges[edge_id].connect_elem(elem.id, side);
            }
        }

        Ok(elems)
    }

    fn connect_elem_to_edges(&mut self, elem_id: usize) {
        for edge_id in self.elems[elem_id].edges {
            let side = self.side_of_edge(edge_id, &self.elems[elem_id]);
            self.edges[edge_id].connect_elem(elem_id, side);
        }
    }

    // 0 if the Elem lies to the right of the directed Edge; 1 if it lies to the left
    fn side_of_edge(&self, edge_id: usize, elem: &Elem) -> usize {
        let [p0, p1] = self.edge_points(edge_id);
        let center = elem.map_point(V2D::from([0.0, 0.0]));
        if p0.cross(p1, &center) > 0.0 {
            1
        } else {
            0
        }
    }
}

fn sorted_pair([a, b]: [usize; 2]) -> [usize; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

fn has_duplicates<T>(values: &[T]) -> bool
where
    T: PartialEq,
{
    for (i, val) in values.iter().enumerate() {
        for val_cmp in values.iter().skip(i + 1) {
            if val == val_cmp {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_by_one() -> Mesh {
        Mesh::rectangular_grid(2, 1, [0.0, 2.0], [0.0, 1.0], "Steel").unwrap()
    }

    #[test]
    fn base_connectivity() {
        let mesh = two_by_one();

        // the edge shared by both elements has one elem on each side
        let shared = mesh.elems[0].edges[3];
        assert_eq!(shared, mesh.elems[1].edges[2]);
        assert!(!mesh.edges[shared].is_boundary());
        assert_eq!(mesh.edges[shared].elems_on_side(0).len(), 1);
        assert_eq!(mesh.edges[shared].elems_on_side(1).len(), 1);

        let boundary_count = mesh.edges.iter().filter(|e| e.is_boundary()).count();
        assert_eq!(boundary_count, 6);
        assert!(mesh.edges.iter().filter(|e| e.is_boundary()).all(|e| e.marker.is_some()));
        assert_eq!(mesh.markers().len(), 4);
    }

    #[test]
    fn edge_sides_are_geometric() {
        let mesh = two_by_one();
        for edge in mesh.edges.iter() {
            for side in 0..2 {
                for elem_id in edge.elems_on_side(side) {
                    let [p0, p1] = mesh.edge_points(edge.id);
                    let c = mesh.elems[*elem_id].map_point(V2D::from([0.0, 0.0]));
                    assert_eq!(p0.cross(p1, &c) > 0.0, side == 1);
                }
            }
        }
    }

    #[test]
    fn t_refinement_topology() {
        let mut mesh = two_by_one();
        mesh.h_refine_elems(vec![0], HRef::T).unwrap();

        assert_eq!(mesh.elems.len(), 6);
        assert_eq!(mesh.num_active_elems(), 5);
        assert_eq!(mesh.revision(), 1);
        assert_eq!(mesh.refinement_log(), &[(0, HRef::T)]);

        // 5 center/mid nodes are created
        assert_eq!(mesh.nodes.len(), 6 + 5);

        // each child shares corners with its neighbors
        assert_eq!(mesh.elems[2].nodes[3], mesh.elems[5].nodes[0]);
        assert_eq!(mesh.elems[2].nodes[1], mesh.elems[3].nodes[0]);

        // the shared edge was split; elem 1 still references the parent edge
        let shared = mesh.elems[1].edges[2];
        let [c0, c1] = mesh.edges[shared].child_ids().unwrap();
        assert_eq!(mesh.elems[3].edges[3], c0);
        assert_eq!(mesh.elems[5].edges[3], c1);
        assert_eq!(mesh.edge_parametric_range(c1, shared), Some([0.0, 1.0]));
        assert_eq!(mesh.edge_parametric_range(shared, c1), None);
    }

    #[test]
    fn global_refinement_skips_inactive_elems() {
        let mut mesh = two_by_one();
        mesh.global_h_refinement(HRef::v()).unwrap();
        assert_eq!(mesh.num_active_elems(), 4);
        assert!(mesh.elems[2..]
            .iter()
            .all(|elem| elem.h_levels.u == 0 && elem.h_levels.v == 1));

        mesh.global_h_refinement(HRef::T).unwrap();
        assert_eq!(mesh.num_active_elems(), 16);
        assert_eq!(mesh.revision(), 2);
    }

    #[test]
    fn anisotropic_refinements() {
        let mut mesh = two_by_one();
        mesh.execute_h_refinements(vec![(0, HRef::u_extended(1).unwrap()), (1, HRef::v())])
            .unwrap();

        // 2 + 2 children, then the extension on child 1 of elem 0
        assert_eq!(mesh.elems.len(), 2 + 2 + 2 + 2);
        assert_eq!(mesh.elems[0].refinement(), Some(HRef::u()));
        assert_eq!(mesh.elems[1].refinement(), Some(HRef::v()));
        assert_eq!(mesh.elems[3].refinement(), Some(HRef::v()));
        assert_eq!(mesh.elems[3].child_ids(), Some(&[6, 7][..]));
        assert_eq!(mesh.elems[2].refinement(), None);
        for child_id in [6, 7] {
            let child = &mesh.elems[child_id];
            assert_eq!(child.parent_id(), Some(3));
            assert_eq!([child.h_levels.u, child.h_levels.v], [1, 1]);
            assert_eq!(child.refinement(), None);
        }
        assert_eq!(
            mesh.refinement_log(),
            &[(0, HRef::u()), (1, HRef::v()), (3, HRef::v())]
        );

        for elem in mesh.active_elems() {
            let points = mesh.elem_points(elem.id);
            let mapped = elem.map_point(V2D::from([1.0, 1.0]));
            assert_eq!(mapped, *points[3]);
        }
    }

    #[test]
    fn region_refinement_is_atomic() {
        let mut mesh = two_by_one();
        let before = mesh.clone();

        assert_eq!(
            mesh.refine(&["Steel", "Missing"], 1),
            Err(HRefError::InvalidRegion(String::from("Missing")))
        );
        assert!(mesh.is_compatible_with(&before));
        assert_eq!(mesh.revision(), before.revision());

        mesh.refine(&["Steel"], 0).unwrap();
        assert!(mesh.is_compatible_with(&before));

        mesh.refine_single("Steel").unwrap();
        assert_eq!(mesh.num_active_elems(), 8);
        assert!(!mesh.is_compatible_with(&before));
    }

    #[test]
    fn boundary_refinement() {
        let mut mesh = Mesh::rectangular_grid(3, 1, [0.0, 3.0], [0.0, 1.0], "Steel").unwrap();
        mesh.refine_towards_boundary(&["Left"], 2).unwrap();
        assert_eq!(mesh.num_active_elems(), 2 + 2 + 8);

        assert_eq!(
            mesh.refine_towards_boundary(&["Nowhere"], 1),
            Err(HRefError::InvalidMarker(String::from("Nowhere")))
        );
    }

    #[test]
    fn ancestry_queries() {
        let mut mesh = two_by_one();
        mesh.refine_all(2).unwrap();

        let leaf = mesh.active_elems().last().unwrap().id;
        let ancestors = mesh.ancestor_elems(leaf, false).unwrap();
        assert_eq!(ancestors.len(), 2);
        assert_eq!(*ancestors.last().unwrap(), 1);
        assert!(mesh
            .descendant_elems(1, false)
            .unwrap()
            .contains(&leaf));

        let edge = mesh.elems[leaf].edges[3];
        let anc_edges = mesh.ancestor_edges(edge, true).unwrap();
        assert_eq!(anc_edges[0], edge);
        assert!(mesh.descendant_edges(*anc_edges.last().unwrap(), false).unwrap().contains(&edge));
        assert_eq!(
            mesh.descendant_elems(100, true),
            Err(MeshAccessError::ElemDoesNotExist(100))
        );
    }

    #[test]
    fn invalid_refinements() {
        let mut mesh = two_by_one();
        assert_eq!(
            mesh.h_refine_elems(vec![0, 7], HRef::T),
            Err(HRefError::ElemDoesntExist(7))
        );
        assert_eq!(
            mesh.execute_h_refinements(vec![(0, HRef::T), (0, HRef::u())]),
            Err(HRefError::DoubleRefinement(0))
        );

        mesh.h_refine_elems(vec![0], HRef::T).unwrap();
        assert_eq!(
            mesh.h_refine_elems(vec![0], HRef::T),
            Err(HRefError::ElemHasChildren(0))
        );
    }

    #[test]
    fn minimum_edge_length_exceeded() {
        let mut mesh = two_by_one();
        let result: Result<(), HRefError> = (0..18).try_for_each(|_| {
            mesh.h_refine_with_filter(|elem| {
                if !elem.has_children() && elem.nodes[0] == 0 {
                    Some(HRef::T)
                } else {
                    None
                }
            })
        });
        // refinement stops once edges get too short; the filter only sees refineable elems
        assert!(result.is_ok());
        assert!(mesh
            .active_elems()
            .filter(|elem| elem.nodes[0] == 0)
            .all(|elem| !mesh.elem_is_h_refineable(elem.id).unwrap()));
    }
}

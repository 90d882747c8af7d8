use super::{
    element::Element,
    h_refinement::{HLevels, HRef, HRefError, HRefLoc},
    space::{Point, M2D, V2D},
    EXPECTED_NUM_H_REFINEMENTS,
};
use json::{array, object, JsonValue};
use smallvec::SmallVec;
use std::sync::Arc;

type Ancestry = SmallVec<[(usize, HRefLoc); EXPECTED_NUM_H_REFINEMENTS]>;

/// A quadrilateral cell of the [Mesh](super::Mesh), described in the parametric space of its base [Element]
///
/// Elems form a refinement tree: base Elems are created one per Element, and every h-refinement turns an
/// active Elem into an inactive parent of 2 or 4 children. Only active (childless) Elems carry DoFs.
///
/// ## Layout
///
/// ```text
///               N
///         2 --------- 3
///         |     1     |
///      W  |2         3|  E
///         |     0     |
///         0 --------- 1
///               S
/// ```
///
/// Local Edge `k` runs between the Nodes `EDGE_NODE_IDX[k]`. Edges 0 and 1 are parameterized by `u`;
/// Edges 2 and 3 by `v`.
///
/// ## Children
///
/// ```text
///     T-Type              U-Type              V-Type
///  *-----*-----*       *-----*-----*       *-----------*
///  |  2  |  3  |       |     |     |       |     1     |
///  *-----*-----*       |  0  |  1  |       *-----------*
///  |  0  |  1  |       |     |     |       |     0     |
///  *-----*-----*       *-----*-----*       *-----------*
/// ```
#[derive(Debug, Clone)]
pub struct Elem {
    pub id: usize,
    pub nodes: [usize; 4],
    pub edges: [usize; 4],
    pub element: Arc<Element>,
    pub h_levels: HLevels,
    children: SmallVec<[usize; 4]>,
    refinement: Option<HRef>,
    ancestors: Ancestry,
}

/// Pairs of local Node indices composing each local Edge
pub const EDGE_NODE_IDX: [[usize; 2]; 4] = [[0, 1], [2, 3], [0, 2], [1, 3]];

impl Elem {
    /// A base-layer Elem covering the whole of its Element
    pub fn new(id: usize, nodes: [usize; 4], edges: [usize; 4], element: Arc<Element>) -> Self {
        Self {
            id,
            nodes,
            edges,
            element,
            h_levels: HLevels::default(),
            children: SmallVec::new(),
            refinement: None,
            ancestors: SmallVec::new(),
        }
    }

    /// Mark this Elem as refined and produce placeholders for its children
    ///
    /// Child ids are taken from `id_counter` in local-index order.
    pub(crate) fn h_refine(
        &mut self,
        refinement: HRef,
        id_counter: &mut usize,
    ) -> Result<Vec<ElemUninit>, HRefError> {
        if self.has_children() {
            return Err(HRefError::ElemHasChildren(self.id));
        }

        let children: Vec<ElemUninit> = refinement
            .indices_and_ids(id_counter)
            .map(|(child_idx, child_id)| {
                let mut ancestors = self.ancestors.clone();
                ancestors.push((self.id, refinement.loc(child_idx)));
                ElemUninit {
                    id: child_id,
                    nodes: [None; 4],
                    edges: [None; 4],
                    element: self.element.clone(),
                    ancestors,
                    h_levels: self.h_levels.refined(refinement),
                }
            })
            .collect();

        self.children = children.iter().map(|child| child.id).collect();
        self.refinement = Some(refinement.without_extension());
        Ok(children)
    }

    pub fn parent_id(&self) -> Option<usize> {
        self.ancestors.last().map(|(id, _)| *id)
    }

    /// Ancestor ids (base layer first) with the position of each descendant inside its parent
    pub fn loc_stack(&self) -> &[(usize, HRefLoc)] {
        &self.ancestors
    }

    /// Bounds of this Elem within the parametric space (`[-1, 1] x [-1, 1]`) of its Element
    pub fn parametric_range(&self) -> [[f64; 2]; 2] {
        self.ancestors
            .iter()
            .fold([[-1.0, 1.0], [-1.0, 1.0]], |range, (_, loc)| loc.sub_range(range))
    }

    /// Name of the material region this Elem belongs to
    pub fn material(&self) -> &str {
        &self.element.material
    }

    /// Jacobian of the map from this Elem's local coordinates (`[-1, 1] x [-1, 1]`) into real space
    pub fn parametric_mapping(&self, local_point: V2D) -> M2D {
        self.element
            .parametric_mapping(local_point, self.parametric_range())
    }

    /// Map a point in this Elem's local coordinates (`[-1, 1] x [-1, 1]`) into real space
    pub fn map_point(&self, local_point: V2D) -> Point {
        self.element
            .map_sub_region(local_point, self.parametric_range())
    }

    pub fn child_ids(&self) -> Option<&[usize]> {
        if self.children.is_empty() {
            None
        } else {
            Some(&self.children)
        }
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// The h-refinement which produced this Elem's children, without extensions (`None` for active Elems)
    pub fn refinement(&self) -> Option<HRef> {
        self.refinement
    }

    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "element_id": self.element.id,
            "parent": self.parent_id(),
            "active": !self.has_children(),
            "nodes": array![self.nodes[0], self.nodes[1], self.nodes[2], self.nodes[3]],
            "edges": array![self.edges[0], self.edges[1], self.edges[2], self.edges[3]],
            "h_levels": array![self.h_levels.u, self.h_levels.v],
            "children": JsonValue::from(self.children.to_vec()),
        }
    }
}

/// A child [Elem] whose Nodes and Edges are still being connected during an h-refinement
#[derive(Debug, Clone)]
pub(crate) struct ElemUninit {
    pub id: usize,
    pub nodes: [Option<usize>; 4],
    pub edges: [Option<usize>; 4],
    pub element: Arc<Element>,
    ancestors: Ancestry,
    h_levels: HLevels,
}

impl ElemUninit {
    pub fn set_node(&mut self, node_idx: usize, node_id: usize) {
        debug_assert!(
            self.nodes[node_idx].map_or(true, |current| current == node_id),
            "Node {} of child Elem {} is already connected to {:?}",
            node_idx,
            self.id,
            self.nodes[node_idx],
        );
        self.nodes[node_idx] = Some(node_id);
    }

    pub fn set_edge(&mut self, edge_idx: usize, edge_id: usize) {
        debug_assert!(
            self.edges[edge_idx].is_none(),
            "Edge {} of child Elem {} is already connected to {:?}",
            edge_idx,
            self.id,
            self.edges[edge_idx],
        );
        self.edges[edge_idx] = Some(edge_id);
    }

    /// Fails if any Node or Edge was left unconnected
    pub fn into_elem(self) -> Result<Elem, HRefError> {
        let connected = |ids: [Option<usize>; 4]| -> Option<[usize; 4]> {
            Some([ids[0]?, ids[1]?, ids[2]?, ids[3]?])
        };

        match (connected(self.nodes), connected(self.edges)) {
            (Some(nodes), Some(edges)) => Ok(Elem {
                id: self.id,
                nodes,
                edges,
                element: self.element,
                h_levels: self.h_levels,
                children: SmallVec::new(),
                refinement: None,
                ancestors: self.ancestors,
            }),
            _ => Err(HRefError::UninitializedElem(self.id)),
        }
    }
}

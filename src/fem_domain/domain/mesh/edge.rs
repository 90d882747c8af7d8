use super::{h_refinement::HRefError, node::Node, space::ParaDir, MIN_EDGE_LENGTH};
use json::{array, object, JsonValue};
use smallvec::{smallvec, SmallVec};

/// Edges describe a straight line in real space between two `Node`s
///
/// Edges keep track of every `Elem` that has used them (on either side) along with their refinement tree.
/// Boundary Edges carry an optional marker which is used to attach boundary conditions.
///
/// ## Layout
///
/// An Edge is directed from `nodes[0]` to `nodes[1]`. Elems lying to the right of that direction are connected on side 0;
/// Elems lying to the left are connected on side 1.
///
/// ```text
///              side 1
///    0 *-------------------> * 1
///              side 0
/// ```
///
/// Indices of child-edges after h-refinement (children keep the direction of their parent):
/// ```text
///         0     1
///      *-----*----->
/// ```
#[derive(Debug, Clone)]
pub struct Edge {
    pub id: usize,
    pub nodes: [usize; 2],
    pub boundary: bool,
    pub marker: Option<String>,
    pub dir: ParaDir,
    pub length: f64,
    children: Option<[usize; 2]>,
    parent: Option<usize>,
    elems: [SmallVec<[usize; 4]>; 2],
    child_node: Option<usize>,
}

impl Edge {
    /// Construct a new edge between two points in real space
    pub fn new(id: usize, nodes: [&Node; 2], boundary: bool, marker: Option<String>) -> Self {
        let dir = nodes[0].coords.orientation_with(&nodes[1].coords);

        Self {
            id,
            nodes: [nodes[0].id, nodes[1].id],
            boundary,
            marker,
            dir,
            length: nodes[0].coords.dist(&nodes[1].coords),
            children: None,
            parent: None,
            elems: [SmallVec::new(), SmallVec::new()],
            child_node: None,
        }
    }

    pub(crate) fn connect_elem(&mut self, elem_id: usize, side_index: usize) {
        if !self.elems[side_index].contains(&elem_id) {
            self.elems[side_index].push(elem_id);
        }
    }

    /// Produce two child Edges from this edge and connect them to a new Node along its center
    pub(crate) fn h_refine(
        &mut self,
        new_ids: [usize; 2],
        new_node_id: usize,
    ) -> Result<SmallVec<[Self; 2]>, HRefError> {
        match self.children {
            Some(_) => Err(HRefError::EdgeHasChildren(self.id)),
            None => {
                let child_edge_length = self.length / 2.0;

                if child_edge_length < MIN_EDGE_LENGTH {
                    Err(HRefError::MinEdgeLength(self.id))
                } else {
                    self.children = Some(new_ids);
                    self.child_node = Some(new_node_id);
                    Ok(smallvec![
                        self.child(new_ids[0], [self.nodes[0], new_node_id]),
                        self.child(new_ids[1], [new_node_id, self.nodes[1]]),
                    ])
                }
            }
        }
    }

    fn child(&self, id: usize, nodes: [usize; 2]) -> Self {
        Self {
            id,
            nodes,
            boundary: self.boundary,
            marker: self.marker.clone(),
            dir: self.dir,
            length: self.length / 2.0,
            children: None,
            parent: Some(self.id),
            elems: [SmallVec::new(), SmallVec::new()],
            child_node: None,
        }
    }

    /// Id of the Parent Edge if this Edge has a parent
    pub fn parent_id(&self) -> Option<usize> {
        self.parent
    }

    /// Returns the two child Edge ids. Will return `None` if this Edge has no children.
    pub fn child_ids(&self) -> Option<[usize; 2]> {
        self.children
    }

    /// Has been h-Refined?
    pub fn has_children(&self) -> bool {
        self.children.is_some()
    }

    /// Returns the Node sitting on the center of this Edge if it has been h-Refined; otherwise, `None` is returned.
    pub fn child_node_id(&self) -> Option<usize> {
        self.child_node
    }

    /// All of the Elems (active or not) that were connected to this Edge on one side
    pub fn elems_on_side(&self, side_index: usize) -> &[usize] {
        &self.elems[side_index]
    }

    /// Is this edge on the border of the Mesh (does it have elements only on one side)
    pub fn is_boundary(&self) -> bool {
        self.boundary
    }

    /// Produce a Json Object that describes this Edge
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "boundary": self.boundary,
            "marker": self.marker.clone(),
            "direction": self.dir,
            "nodes": array![self.nodes[0], self.nodes[1]],
            "parent": self.parent_id(),
            "children": match self.children {
                Some(child_ids) => array![child_ids[0], child_ids[1]],
                None => array![],
            },
            "elems": array![self.elems[0].to_vec(), self.elems[1].to_vec()],
        }
    }
}

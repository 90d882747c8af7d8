use super::Mesh;
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// A Node lying on the interior of a larger active Edge
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HangingNode {
    /// The constraining Edge
    pub master: usize,
    /// The Node's location along the constraining Edge's parameter (`[-1, 1]` from `nodes[0]` to `nodes[1]`)
    pub t: f64,
}

/// Classification of the Edges and Nodes used by the active Elems of a Mesh
///
/// When neighboring Elems are refined to different levels, an Edge of the coarser Elem (a "master" Edge) is covered
/// by several smaller Edges belonging to the finer Elems ("slave" Edges). Endpoints of slave Edges which lie strictly
/// inside of their master are "hanging" Nodes.
#[derive(Debug, Clone)]
pub struct ActiveTopology {
    referrers: BTreeMap<usize, SmallVec<[(usize, usize); 2]>>,
    masters: BTreeMap<usize, usize>,
    supports: BTreeMap<usize, BTreeSet<usize>>,
    hanging: BTreeMap<usize, HangingNode>,
    vertices: BTreeSet<usize>,
}

impl ActiveTopology {
    pub fn from_mesh(mesh: &Mesh) -> Self {
        // (active Elem, local edge index) pairs using each Edge
        let mut referrers: BTreeMap<usize, SmallVec<[(usize, usize); 2]>> = BTreeMap::new();
        for elem in mesh.active_elems() {
            for (local_idx, edge_id) in elem.edges.iter().enumerate() {
                referrers
                    .entry(*edge_id)
                    .or_insert_with(SmallVec::new)
                    .push((elem.id, local_idx));
            }
        }

        // the master of a constrained Edge is its furthest ancestor that is also used by an active Elem
        let mut masters = BTreeMap::new();
        let mut supports: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        for (edge_id, users) in referrers.iter() {
            let mut master = *edge_id;
            let mut current = *edge_id;
            while let Some(parent_id) = mesh.edges[current].parent_id() {
                if referrers.contains_key(&parent_id) {
                    master = parent_id;
                }
                current = parent_id;
            }

            if master != *edge_id {
                masters.insert(*edge_id, master);
            }
            supports
                .entry(master)
                .or_default()
                .extend(users.iter().map(|(elem_id, _)| *elem_id));
        }

        let mut hanging = BTreeMap::new();
        for (slave_id, master_id) in masters.iter() {
            let master_nodes = mesh.edges[*master_id].nodes;
            if let Some(range) = mesh.edge_parametric_range(*slave_id, *master_id) {
                for (node_id, t) in mesh.edges[*slave_id].nodes.iter().zip(range) {
                    if !master_nodes.contains(node_id) {
                        hanging.insert(
                            *node_id,
                            HangingNode {
                                master: *master_id,
                                t,
                            },
                        );
                    }
                }
            }
        }

        let vertices = mesh
            .active_elems()
            .flat_map(|elem| elem.nodes)
            .filter(|node_id| !hanging.contains_key(node_id))
            .collect();

        Self {
            referrers,
            masters,
            supports,
            hanging,
            vertices,
        }
    }

    /// The (active Elem, local edge index) pairs using an Edge
    pub fn referrers(&self, edge_id: usize) -> &[(usize, usize)] {
        self.referrers
            .get(&edge_id)
            .map(|users| users.as_slice())
            .unwrap_or(&[])
    }

    /// The Edge constraining `edge_id`, or `None` if it is unconstrained
    pub fn master_of(&self, edge_id: usize) -> Option<usize> {
        self.masters.get(&edge_id).copied()
    }

    /// Iterate over the unconstrained Edges used by active Elems (in ascending order)
    pub fn master_edges(&self) -> impl Iterator<Item = usize> + '_ {
        self.referrers
            .keys()
            .copied()
            .filter(move |edge_id| !self.masters.contains_key(edge_id))
    }

    /// All active Elems touching a master Edge (directly, or through one of its slaves)
    pub fn supporting_elems(&self, master_id: usize) -> impl Iterator<Item = usize> + '_ {
        self.supports
            .get(&master_id)
            .into_iter()
            .flat_map(|elems| elems.iter().copied())
    }

    /// Hanging Node information, if `node_id` is hanging
    pub fn hanging_node(&self, node_id: usize) -> Option<HangingNode> {
        self.hanging.get(&node_id).copied()
    }

    /// Iterate over the hanging Nodes (in ascending order)
    pub fn hanging_nodes(&self) -> impl Iterator<Item = (usize, HangingNode)> + '_ {
        self.hanging.iter().map(|(id, hn)| (*id, *hn))
    }

    /// Iterate over the corner Nodes of active Elems which are not hanging (in ascending order)
    pub fn vertices(&self) -> impl Iterator<Item = usize> + '_ {
        self.vertices.iter().copied()
    }

    pub fn is_vertex(&self, node_id: usize) -> bool {
        self.vertices.contains(&node_id)
    }
}

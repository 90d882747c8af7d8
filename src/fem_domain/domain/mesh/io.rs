use super::{h_refinement::HRef, h_refinement::HRefError, space::Point, Mesh};
use json::{array, object, JsonValue};
use std::fs::{read_to_string, File};
use std::io::BufWriter;
use std::path::Path;
use thiserror::Error;

/// Error type for Mesh construction
#[derive(Debug, Error)]
pub enum MeshParseError {
    #[error("Unable to read Mesh file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unable to parse Mesh file as JSON: {0}")]
    Json(#[from] json::Error),
    #[error("Invalid Mesh format: {0}")]
    Format(String),
    #[error("Mesh must have at least one Element!")]
    NoElements,
    #[error("Nodes {0} and {1} are at the same location!")]
    DuplicateNodes(usize, usize),
    #[error("Element {element} references Node {node}, which does not exist!")]
    InvalidNodeId { element: usize, node: usize },
    #[error("Element {0} must have 4 unique node_ids!")]
    RepeatedNodeIds(usize),
    #[error("Element {0} is degenerate or its Nodes are not ordered SW, SE, NW, NE!")]
    DegenerateElement(usize),
    #[error("Edge {0:?} is shared by more than two Elements!")]
    NonManifoldEdge([usize; 2]),
    #[error("Elements {0} and {1} overlap!")]
    OverlappingElements(usize, usize),
    #[error("Boundary {0:?} does not correspond to an Edge in the Mesh!")]
    UnknownBoundaryEdge([usize; 2]),
    #[error("Unable to replay Mesh refinements: {0}")]
    Refinement(#[from] HRefError),
}

impl Mesh {
    /// Construct a Mesh from a JSON file with the following format
    ///
    /// The following describes a two element mesh with a marked outer boundary:
    /// ```text
    ///     3               4               5
    /// 1.0 *---------------*---------------*
    ///     |               |               |
    ///     |   Aluminum    |    Copper     |
    ///     |               |               |
    /// 0.0 *---------------*---------------*
    ///  y  0               1               2
    ///  x 0.0             1.0             2.0
    /// ```
    ///
    /// mesh.json
    /// ```JSON
    /// {
    ///     "Nodes": [
    ///         [0.0, 0.0], [1.0, 0.0], [2.0, 0.0],
    ///         [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]
    ///     ],
    ///     "Elements": [
    ///         { "node_ids": [0, 1, 3, 4], "material": "Aluminum" },
    ///         { "node_ids": [1, 2, 4, 5], "material": "Copper" }
    ///     ],
    ///     "Boundaries": [
    ///         { "node_ids": [0, 1], "marker": "Bottom" },
    ///         { "node_ids": [1, 2], "marker": "Bottom" },
    ///         { "node_ids": [3, 4], "marker": "Top" },
    ///         { "node_ids": [4, 5], "marker": "Top" }
    ///     ],
    ///     "Refinements": [ [0, "T"], [3, "U"] ]
    /// }
    /// ```
    ///
    /// Element node_ids are ordered: SW, SE, NW, NE. "Boundaries" and "Refinements" are optional.
    /// Refinements are replayed in order, so a Mesh written with [Mesh::export_to_json] is reconstructed with
    /// identical Elem, Edge and Node ids.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MeshParseError> {
        let mesh_file_contents = read_to_string(path.as_ref())?;
        Self::from_json_str(&mesh_file_contents)
    }

    /// Construct a Mesh from a string in the format described by [Mesh::from_file]
    pub fn from_json_str(contents: &str) -> Result<Self, MeshParseError> {
        let mesh_json = json::parse(contents)?;
        Self::from_json(&mesh_json)
    }

    /// Construct a Mesh from a parsed JSON object in the format described by [Mesh::from_file]
    pub fn from_json(mesh_json: &JsonValue) -> Result<Self, MeshParseError> {
        let points = parse_node_information(mesh_json)?;
        let element_descs = parse_element_information(mesh_json)?;
        let boundaries = parse_boundary_information(mesh_json)?;
        let refinements = parse_refinement_information(mesh_json)?;

        let mut mesh = Self::from_parts(points, element_descs, boundaries)?;
        for refinement in refinements {
            mesh.apply_h_refinements(vec![refinement])?;
        }

        log::debug!(
            "Loaded Mesh with {} Elements, {} active Elems and {} Nodes",
            mesh.elements.len(),
            mesh.num_active_elems(),
            mesh.nodes.len()
        );

        Ok(mesh)
    }

    /// Describe the base Mesh, its boundary markers and its refinement history in the format read by [Mesh::from_file]
    pub fn to_json(&self) -> JsonValue {
        let nodes: Vec<JsonValue> = self.nodes[..self.num_base_nodes()]
            .iter()
            .map(|node| JsonValue::from(node.coords))
            .collect();

        let elements: Vec<JsonValue> = self
            .elements
            .iter()
            .map(|element| {
                let node_ids = self.elems[element.id].nodes;
                object! {
                    "node_ids": array![node_ids[0], node_ids[1], node_ids[2], node_ids[3]],
                    "material": element.material.as_str(),
                }
            })
            .collect();

        let boundaries: Vec<JsonValue> = self.edges[..self.num_base_edges()]
            .iter()
            .filter_map(|edge| {
                edge.marker.as_deref().map(|marker| {
                    object! {
                        "node_ids": array![edge.nodes[0], edge.nodes[1]],
                        "marker": marker,
                    }
                })
            })
            .collect();

        let refinements: Vec<JsonValue> = self
            .refinement_log()
            .iter()
            .map(|(elem_id, refinement)| array![*elem_id, refinement.tag()])
            .collect();

        object! {
            "Nodes": nodes,
            "Elements": elements,
            "Boundaries": boundaries,
            "Refinements": refinements,
        }
    }

    /// [Mesh::to_json] as a pretty printed string
    pub fn to_json_string(&self) -> String {
        self.to_json().pretty(4)
    }

    /// Print the mesh to a JSON file (in the format read by [Mesh::from_file])
    #[cfg(feature = "json_export")]
    pub fn export_to_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);
        self.to_json().write_pretty(&mut w, 4)?;
        Ok(())
    }

    /// Print every Element, Elem, Node and Edge in the Mesh to a JSON file
    #[cfg(feature = "json_export")]
    pub fn export_topology_to_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let f = File::create(path.as_ref())?;
        let mut w = BufWriter::new(&f);

        let mesh_object = object! {
            "Elements": JsonValue::from(self.elements.iter().map(|element| element.to_json()).collect::<Vec<_>>()),
            "Elems": JsonValue::from(self.elems.iter().map(|elem| elem.to_json()).collect::<Vec<_>>()),
            "Nodes": JsonValue::from(self.nodes.iter().map(|node| node.to_json()).collect::<Vec<_>>()),
            "Edges": JsonValue::from(self.edges.iter().map(|edge| edge.to_json()).collect::<Vec<_>>()),
        };

        mesh_object.write_pretty(&mut w, 4)?;

        Ok(())
    }
}

fn format_err(msg: impl Into<String>) -> MeshParseError {
    MeshParseError::Format(msg.into())
}

fn parse_node_information(mesh_json: &JsonValue) -> Result<Vec<Point>, MeshParseError> {
    if !mesh_json["Nodes"].is_array() {
        return Err(format_err("Nodes must be an Array!"));
    }

    mesh_json["Nodes"]
        .members()
        .enumerate()
        .map(|(node_id, json_point)| {
            match (json_point.is_array(), json_point.len(), json_point[0].as_f64(), json_point[1].as_f64()) {
                (true, 2, Some(x), Some(y)) => Ok(Point::new(x, y)),
                _ => Err(format_err(format!(
                    "Node {} must be an Array of two numbers!",
                    node_id
                ))),
            }
        })
        .collect()
}

fn parse_element_information(
    mesh_json: &JsonValue,
) -> Result<Vec<([usize; 4], String)>, MeshParseError> {
    if !mesh_json["Elements"].is_array() {
        return Err(format_err("Elements must be an Array!"));
    }

    mesh_json["Elements"]
        .members()
        .enumerate()
        .map(|(element_id, json_element)| {
            let node_ids = parse_id_array::<4>(&json_element["node_ids"]).ok_or_else(|| {
                format_err(format!(
                    "Element {} must have an Array of 4 non-negative integer node_ids!",
                    element_id
                ))
            })?;

            let material = json_element["material"].as_str().ok_or_else(|| {
                format_err(format!(
                    "Element {} must have a material region name!",
                    element_id
                ))
            })?;

            Ok((node_ids, String::from(material)))
        })
        .collect()
}

fn parse_boundary_information(
    mesh_json: &JsonValue,
) -> Result<Vec<([usize; 2], String)>, MeshParseError> {
    let boundaries = &mesh_json["Boundaries"];
    if boundaries.is_null() {
        return Ok(Vec::new());
    }
    if !boundaries.is_array() {
        return Err(format_err("Boundaries must be an Array!"));
    }

    boundaries
        .members()
        .enumerate()
        .map(|(idx, json_boundary)| {
            match (
                parse_id_array::<2>(&json_boundary["node_ids"]),
                json_boundary["marker"].as_str(),
            ) {
                (Some(node_ids), Some(marker)) => Ok((node_ids, String::from(marker))),
                _ => Err(format_err(format!(
                    "Boundary {} must have an Array of 2 node_ids and a marker!",
                    idx
                ))),
            }
        })
        .collect()
}

fn parse_refinement_information(
    mesh_json: &JsonValue,
) -> Result<Vec<(usize, HRef)>, MeshParseError> {
    let refinements = &mesh_json["Refinements"];
    if refinements.is_null() {
        return Ok(Vec::new());
    }
    if !refinements.is_array() {
        return Err(format_err("Refinements must be an Array!"));
    }

    refinements
        .members()
        .enumerate()
        .map(|(idx, json_refinement)| {
            match (
                json_refinement[0].as_usize(),
                json_refinement[1].as_str().and_then(HRef::from_tag),
            ) {
                (Some(elem_id), Some(refinement)) => Ok((elem_id, refinement)),
                _ => Err(format_err(format!(
                    "Refinement {} must be an Array of an Elem id and a refinement tag!",
                    idx
                ))),
            }
        })
        .collect()
}

fn parse_id_array<const N: usize>(json_ids: &JsonValue) -> Option<[usize; N]> {
    if !json_ids.is_array() || json_ids.len() != N {
        return None;
    }

    let mut ids = [0; N];
    for (id, json_id) in ids.iter_mut().zip(json_ids.members()) {
        *id = json_id.as_usize()?;
    }
    Some(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ELEMENTS: &str = r#"{
        "Nodes": [[0.0, 0.0], [1.0, 0.0], [2.0, 0.0], [0.0, 1.0], [1.0, 1.0], [2.0, 1.0]],
        "Elements": [
            { "node_ids": [0, 1, 3, 4], "material": "Aluminum" },
            { "node_ids": [1, 2, 4, 5], "material": "Copper" }
        ],
        "Boundaries": [
            { "node_ids": [0, 1], "marker": "Bottom" },
            { "node_ids": [2, 1], "marker": "Bottom" },
            { "node_ids": [3, 4], "marker": "Top" }
        ]
    }"#;

    #[test]
    fn mesh_from_json() {
        let mesh = Mesh::from_json_str(TWO_ELEMENTS).unwrap();
        assert_eq!(mesh.elems.len(), 2);
        assert_eq!(mesh.edges.len(), 7);
        assert_eq!(mesh.regions().into_iter().collect::<Vec<_>>(), ["Aluminum", "Copper"]);
        assert_eq!(mesh.markers().into_iter().collect::<Vec<_>>(), ["Bottom", "Top"]);

        // the right edge has no marker but is still on the boundary
        let right_edge = &mesh.edges[mesh.elems[1].edges[3]];
        assert!(right_edge.is_boundary());
        assert!(right_edge.marker.is_none());
        assert!(mesh.nodes.iter().all(|node| node.boundary));
    }

    #[test]
    fn refined_mesh_round_trip() {
        let mut mesh = Mesh::from_json_str(TWO_ELEMENTS).unwrap();
        mesh.refine_single("Aluminum").unwrap();
        mesh.execute_h_refinements(vec![(1, HRef::v_extended(0).unwrap()), (3, HRef::T)])
            .unwrap();

        let reloaded = Mesh::from_json_str(&mesh.to_json_string()).unwrap();
        assert!(reloaded.is_compatible_with(&mesh));
        assert_eq!(reloaded.refinement_log(), mesh.refinement_log());
    }

    #[test]
    #[cfg(feature = "json_export")]
    fn mesh_to_file() {
        let mut mesh = Mesh::from_json_str(TWO_ELEMENTS).unwrap();
        mesh.refine_all(1).unwrap();

        let dir = std::env::temp_dir();
        let path = dir.join("heat_fem_2d_mesh_to_file.json");
        mesh.export_to_json(&path).unwrap();
        mesh.export_topology_to_json(dir.join("heat_fem_2d_topology.json"))
            .unwrap();

        let reloaded = Mesh::from_file(&path).unwrap();
        assert!(reloaded.is_compatible_with(&mesh));
    }

    #[test]
    fn malformed_meshes() {
        assert!(matches!(
            Mesh::from_json_str("{ \"Nodes\": [[0.0, 0.0]"),
            Err(MeshParseError::Json(_))
        ));
        assert!(matches!(
            Mesh::from_json_str(r#"{ "Nodes": [[0.0, 0.0]], "Elements": [] }"#),
            Err(MeshParseError::NoElements)
        ));

        let bad_node_id = TWO_ELEMENTS.replace("[1, 2, 4, 5]", "[1, 2, 4, 9]");
        assert!(matches!(
            Mesh::from_json_str(&bad_node_id),
            Err(MeshParseError::InvalidNodeId { element: 1, node: 9 })
        ));

        let twisted = TWO_ELEMENTS.replace("[1, 2, 4, 5]", "[1, 2, 5, 4]");
        assert!(matches!(
            Mesh::from_json_str(&twisted),
            Err(MeshParseError::DegenerateElement(1))
        ));

        let unknown_boundary = TWO_ELEMENTS.replace("[3, 4], \"marker\"", "[3, 5], \"marker\"");
        assert!(matches!(
            Mesh::from_json_str(&unknown_boundary),
            Err(MeshParseError::UnknownBoundaryEdge([3, 5]))
        ));

        let overlapping = TWO_ELEMENTS
            .replace("[1, 2, 4, 5]", "[0, 1, 3, 4]")
            .replace("[2, 1]", "[1, 0]");
        assert!(matches!(
            Mesh::from_json_str(&overlapping),
            Err(MeshParseError::OverlappingElements(0, 1))
        ));

        let bad_material = TWO_ELEMENTS.replace("\"material\": \"Copper\"", "\"material\": 4");
        assert!(matches!(
            Mesh::from_json_str(&bad_material),
            Err(MeshParseError::Format(_))
        ));
    }

    #[test]
    fn bad_refinement_replay() {
        let mut mesh_json = json::parse(TWO_ELEMENTS).unwrap();
        mesh_json["Refinements"] = array![array![0, "T"], array![0, "U"]];
        assert!(matches!(
            Mesh::from_json(&mesh_json),
            Err(MeshParseError::Refinement(HRefError::ElemHasChildren(0)))
        ));
    }
}

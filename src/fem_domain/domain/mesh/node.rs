use super::space::Point;
use json::{object, JsonValue};

/// A point in 2D space.
/// Pairs of Nodes describe Edges and groups of 4 Nodes describe Elems.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub coords: Point,
    /// Node sits on the outer border of the Mesh
    pub boundary: bool,
}

impl Node {
    pub fn new(id: usize, coords: Point, boundary: bool) -> Self {
        Self {
            id,
            coords,
            boundary,
        }
    }

    /// Produce a Json Object that describes this Node
    #[cfg(feature = "json_export")]
    pub fn to_json(&self) -> JsonValue {
        object! {
            "id": self.id,
            "coords": self.coords,
            "boundary": self.boundary,
        }
    }
}

/// Essential (Dirichlet) boundary conditions attached to boundary markers
pub mod bcs;
/// Structures used to evaluate and export a solution over a FunctionSpace
pub mod fields;
/// The internal geometric structure of a Domain. This is modified by h-refinements.
pub mod mesh;
/// Degree-of-Freedom numbering over a Mesh (vertex, edge and bubble functions)
pub mod space;
/// Visualization sinks
pub mod views;

pub use bcs::EssentialBCs;
pub use fields::Solution;
pub use mesh::Mesh;
pub use space::{FunctionSpace, SpaceError};

struct IdTracker {
    next_id: usize,
}

impl IdTracker {
    pub fn new(start: usize) -> Self {
        Self { next_id: start }
    }

    pub fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id - 1
    }

    pub fn next_two_ids(&mut self) -> [usize; 2] {
        let ids = [self.next_id, self.next_id + 1];
        self.next_id += 2;
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_tracking() {
        let mut tracker = IdTracker::new(4);
        assert_eq!(tracker.next_id(), 4);
        assert_eq!(tracker.next_two_ids(), [5, 6]);
        assert_eq!(tracker.next_id(), 7);
    }
}

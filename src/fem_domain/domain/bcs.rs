use super::mesh::{space::Point, Mesh};
use log::warn;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A Dirichlet value function over real space
pub type BoundaryFn = Arc<dyn Fn(&Point) -> f64 + Send + Sync>;

/// Essential (Dirichlet) Boundary Conditions
///
/// Maps boundary markers to the function prescribing the solution's value along the edges carrying that marker.
/// Boundary Edges without an essential condition are left free (a natural, zero-flux condition).
///
/// ```
/// use heat_fem_2d::fem_domain::domain::EssentialBCs;
/// use heat_fem_2d::fem_domain::domain::mesh::space::Point;
///
/// let bcs = EssentialBCs::new()
///     .with_constant("Outer", 20.0)
///     .with_fn("Inlet", |p: &Point| 20.0 + p.y);
///
/// assert_eq!(bcs.value("Outer", &Point::new(1.0, 2.0)), Some(20.0));
/// assert_eq!(bcs.value("Inlet", &Point::new(1.0, 2.0)), Some(22.0));
/// assert_eq!(bcs.value("Bottom", &Point::new(1.0, 2.0)), None);
/// ```
#[derive(Clone, Default)]
pub struct EssentialBCs {
    values: BTreeMap<String, BoundaryFn>,
}

impl EssentialBCs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fix the solution to `value` along the Edges carrying `marker`
    pub fn with_constant(self, marker: impl Into<String>, value: f64) -> Self {
        self.with_fn(marker, move |_: &Point| value)
    }

    /// Fix the solution to `g(point)` along the Edges carrying `marker`
    pub fn with_fn<F>(mut self, marker: impl Into<String>, g: F) -> Self
    where
        F: Fn(&Point) -> f64 + Send + Sync + 'static,
    {
        self.values.insert(marker.into(), Arc::new(g));
        self
    }

    /// Fix the solution to `value` along every marker in `markers`
    pub fn with_constant_on<S: AsRef<str>>(self, markers: &[S], value: f64) -> Self {
        markers
            .iter()
            .fold(self, |bcs, marker| bcs.with_constant(marker.as_ref(), value))
    }

    /// Add (or replace) the condition for a marker
    pub fn add_constant(&mut self, marker: impl Into<String>, value: f64) {
        self.values
            .insert(marker.into(), Arc::new(move |_: &Point| value));
    }

    pub fn is_essential(&self, marker: &str) -> bool {
        self.values.contains_key(marker)
    }

    /// Evaluate the prescribed value of `marker` at `point`. Returns `None` if `marker` is free.
    pub fn value(&self, marker: &str, point: &Point) -> Option<f64> {
        self.values.get(marker).map(|g| g(point))
    }

    /// The essential markers (in ascending order)
    pub fn markers(&self) -> impl Iterator<Item = &str> + '_ {
        self.values.keys().map(|m| m.as_str())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Markers which have a condition but do not appear on any Edge of the Mesh
    ///
    /// Each unmatched marker is logged as a warning since it leaves the intended boundary free
    pub fn unmatched_markers(&self, mesh: &Mesh) -> Vec<String> {
        let mesh_markers = mesh.markers();
        self.markers()
            .filter(|marker| !mesh_markers.contains(marker))
            .map(|marker| {
                warn!(
                    "Boundary marker '{}' does not appear in the Mesh; it will have no effect",
                    marker
                );
                marker.to_string()
            })
            .collect()
    }
}

impl fmt::Debug for EssentialBCs {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.values.keys()).finish()
    }
}

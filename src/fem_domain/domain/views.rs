use super::{fields::Solution, space::FunctionSpace};
use log::info;

/// Sampling density used by [LogView] to locate the extrema of a Solution
const LOG_VIEW_DENSITY: usize = 5;

/// A sink which visualizes Solutions and FunctionSpaces
///
/// Implementations decide how (and if) the data is displayed. Views never modify what they are shown.
pub trait View {
    /// Display a Solution under some title
    fn show_solution(&mut self, title: &str, solution: &Solution);

    /// Display the polynomial orders of a FunctionSpace under some title
    fn show_space(&mut self, title: &str, space: &FunctionSpace);

    /// Block until the view is closed (non-interactive views return immediately)
    fn wait_for_close(&mut self) {}
}

/// A [View] which logs a summary of everything it is shown
#[derive(Debug, Default)]
pub struct LogView {
    /// Number of items shown so far
    pub shown: usize,
}

impl LogView {
    pub fn new() -> Self {
        Self::default()
    }
}

impl View for LogView {
    fn show_solution(&mut self, title: &str, solution: &Solution) {
        self.shown += 1;
        match solution.min_max(LOG_VIEW_DENSITY) {
            Ok([min, max]) => info!(
                "{}: {} coefficients; min = {:.6}, max = {:.6}",
                title,
                solution.coefficients().len(),
                min,
                max
            ),
            Err(err) => info!("{}: could not evaluate solution ({})", title, err),
        }
    }

    fn show_space(&mut self, title: &str, space: &FunctionSpace) {
        self.shown += 1;
        let mut histogram = std::collections::BTreeMap::new();
        for (_, order) in space.orders() {
            *histogram.entry(order).or_insert(0_usize) += 1;
        }
        info!(
            "{}: {} DoFs over {} Elems; Elems by order: {:?}",
            title,
            space.get_num_dofs(),
            space.orders().count(),
            histogram
        );
    }
}

use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

/// The Mesh entity that a group of Degrees-of-Freedom belongs to
///
/// Owners are ordered Vertex < Edge < Bubble (then by entity id), which is also the order of their DoF ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DofOwner {
    /// A single nodal function at a (non-hanging) vertex of the active Mesh. (Node id)
    Vertex(usize),
    /// `p_edge - 1` higher order functions along a master Edge. (Edge id)
    Edge(usize),
    /// `(p - 1)^2` interior functions of an active Elem. (Elem id)
    Bubble(usize),
}

impl fmt::Display for DofOwner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Vertex(id) => write!(f, "Vertex({})", id),
            Self::Edge(id) => write!(f, "Edge({})", id),
            Self::Bubble(id) => write!(f, "Bubble({})", id),
        }
    }
}

/// Contiguous ranges of global DoF ids assigned to each [DofOwner]
///
/// The ranges are packed in owner order without gaps, so the total number of DoFs is the end of the last range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DofMap {
    ranges: BTreeMap<DofOwner, Range<usize>>,
    num_dofs: usize,
}

impl DofMap {
    /// Build a packed map from a list of owners and the number of DoFs each one carries
    ///
    /// ```
    /// use heat_fem_2d::fem_domain::domain::space::dof::{DofMap, DofOwner};
    ///
    /// let map = DofMap::from_counts(vec![
    ///     (DofOwner::Bubble(0), 4),
    ///     (DofOwner::Vertex(3), 1),
    ///     (DofOwner::Edge(7), 2),
    /// ]);
    ///
    /// assert_eq!(map.num_dofs(), 7);
    /// assert_eq!(map.range(DofOwner::Vertex(3)), Some(0..1));
    /// assert_eq!(map.range(DofOwner::Edge(7)), Some(1..3));
    /// assert_eq!(map.range(DofOwner::Bubble(0)), Some(3..7));
    /// ```
    pub fn from_counts(counts: impl IntoIterator<Item = (DofOwner, usize)>) -> Self {
        let mut map = Self {
            ranges: counts
                .into_iter()
                .map(|(owner, count)| (owner, 0..count))
                .collect(),
            num_dofs: 0,
        };
        map.compact_all();
        map
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn range(&self, owner: DofOwner) -> Option<Range<usize>> {
        self.ranges.get(&owner).cloned()
    }

    pub fn contains(&self, owner: DofOwner) -> bool {
        self.ranges.contains_key(&owner)
    }

    /// Iterate over the owners and their ranges (in DoF order)
    pub fn iter(&self) -> impl Iterator<Item = (DofOwner, Range<usize>)> + '_ {
        self.ranges.iter().map(|(owner, range)| (*owner, range.clone()))
    }

    /// Total number of DoFs belonging to owners which satisfy a predicate
    pub fn count_where<F>(&self, filt: F) -> usize
    where
        F: Fn(&DofOwner) -> bool,
    {
        self.ranges
            .iter()
            .filter(|(owner, _)| filt(owner))
            .map(|(_, range)| range.len())
            .sum()
    }

    /// Find the owner of a global DoF id
    pub fn owner_of(&self, dof_id: usize) -> Option<DofOwner> {
        self.ranges
            .iter()
            .find(|(_, range)| range.contains(&dof_id))
            .map(|(owner, _)| *owner)
    }

    /// Update the number of DoFs carried by some owners, then re-pack every range following the first one modified
    ///
    /// Ranges preceding the first modified owner are left untouched.
    pub(crate) fn update_counts(&mut self, counts: impl IntoIterator<Item = (DofOwner, usize)>) {
        let mut first_modified: Option<DofOwner> = None;

        for (owner, count) in counts {
            let is_new = !self.ranges.contains_key(&owner);
            let range = self.ranges.entry(owner).or_insert(0..0);
            if is_new || range.len() != count {
                range.end = range.start + count;
                first_modified = Some(first_modified.map_or(owner, |first| first.min(owner)));
            }
        }

        if let Some(first) = first_modified {
            self.compact_from(first);
        }
    }

    fn compact_all(&mut self) {
        let mut next_start = 0;
        for range in self.ranges.values_mut() {
            let len = range.len();
            *range = next_start..(next_start + len);
            next_start += len;
        }
        self.num_dofs = next_start;
    }

    fn compact_from(&mut self, first: DofOwner) {
        let mut next_start = self
            .ranges
            .range(..first)
            .next_back()
            .map_or(0, |(_, range)| range.end);

        for (_, range) in self.ranges.range_mut(first..) {
            let len = range.len();
            *range = next_start..(next_start + len);
            next_start += len;
        }
        self.num_dofs = next_start;
    }
}

/// The coefficient of a local shape function expressed in terms of the global DoFs
///
/// `coefficient = sum(weight * dof_value) + offset`
///
/// Free functions have a single unit term; functions fixed by an essential boundary condition have no terms and a
/// non-zero offset; constrained functions (along the fine side of a hanging node) combine several terms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintRow {
    pub terms: SmallVec<[(usize, f64); 4]>,
    pub offset: f64,
}

impl ConstraintRow {
    pub fn free(dof_id: usize) -> Self {
        let mut terms = SmallVec::new();
        terms.push((dof_id, 1.0));
        Self { terms, offset: 0.0 }
    }

    pub fn fixed(value: f64) -> Self {
        Self {
            terms: SmallVec::new(),
            offset: value,
        }
    }

    /// Does this row depend only on prescribed values
    pub fn is_fixed(&self) -> bool {
        self.terms.is_empty()
    }

    /// `self += other * scale`
    pub fn add_scaled(&mut self, other: &Self, scale: f64) {
        self.offset += other.offset * scale;
        for (dof_id, weight) in other.terms.iter() {
            match self.terms.iter_mut().find(|(id, _)| id == dof_id) {
                Some((_, w)) => *w += weight * scale,
                None => self.terms.push((*dof_id, weight * scale)),
            }
        }
    }

    pub fn scaled(&self, scale: f64) -> Self {
        Self {
            terms: self
                .terms
                .iter()
                .map(|(dof_id, weight)| (*dof_id, weight * scale))
                .collect(),
            offset: self.offset * scale,
        }
    }

    /// Remove terms whose weights are negligible, and sort the remaining terms by DoF id
    pub fn prune(&mut self, tolerance: f64) {
        self.terms.retain(|(_, weight)| weight.abs() > tolerance);
        self.terms.sort_by_key(|(dof_id, _)| *dof_id);
    }

    /// Evaluate the coefficient given the values of all global DoFs
    pub fn evaluate(&self, dof_values: &[f64]) -> f64 {
        self.terms
            .iter()
            .map(|(dof_id, weight)| weight * dof_values[*dof_id])
            .sum::<f64>()
            + self.offset
    }
}

impl fmt::Display for ConstraintRow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[")?;
        for (dof_id, weight) in self.terms.iter() {
            write!(f, " {:.4}*d{}", weight, dof_id)?;
        }
        write!(f, " ] + {:.4}", self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_map() -> DofMap {
        DofMap::from_counts(vec![
            (DofOwner::Vertex(0), 1),
            (DofOwner::Vertex(1), 1),
            (DofOwner::Edge(2), 1),
            (DofOwner::Edge(5), 1),
            (DofOwner::Bubble(0), 1),
            (DofOwner::Bubble(1), 1),
        ])
    }

    #[test]
    fn owner_ordering() {
        assert!(DofOwner::Vertex(100) < DofOwner::Edge(0));
        assert!(DofOwner::Edge(100) < DofOwner::Bubble(0));
        assert!(DofOwner::Bubble(1) < DofOwner::Bubble(2));
    }

    #[test]
    fn partial_update_compacts_later_ranges() {
        let mut map = sample_map();
        map.update_counts(vec![(DofOwner::Edge(5), 3), (DofOwner::Bubble(0), 4)]);

        assert_eq!(map.range(DofOwner::Vertex(1)), Some(1..2));
        assert_eq!(map.range(DofOwner::Edge(2)), Some(2..3));
        assert_eq!(map.range(DofOwner::Edge(5)), Some(3..6));
        assert_eq!(map.range(DofOwner::Bubble(0)), Some(6..10));
        assert_eq!(map.range(DofOwner::Bubble(1)), Some(10..11));
        assert_eq!(map.num_dofs(), 11);

        // shrinking to zero keeps the owner with an empty range
        map.update_counts(vec![(DofOwner::Edge(5), 0)]);
        assert_eq!(map.range(DofOwner::Edge(5)), Some(3..3));
        assert_eq!(map.num_dofs(), 8);
        assert_eq!(map.count_where(|o| matches!(o, DofOwner::Edge(_))), 1);
        assert_eq!(map.owner_of(3), Some(DofOwner::Bubble(0)));
    }

    #[test]
    fn unchanged_counts_are_a_no_op() {
        let mut map = sample_map();
        let before = map.clone();
        map.update_counts(vec![(DofOwner::Edge(2), 1)]);
        assert_eq!(map, before);
    }

    #[test]
    fn constraint_rows() {
        let mut row = ConstraintRow::free(3).scaled(0.5);
        row.add_scaled(&ConstraintRow::free(3), 0.25);
        row.add_scaled(&ConstraintRow::fixed(8.0), 0.5);
        row.add_scaled(&ConstraintRow::free(1), 1e-18);
        row.prune(1e-14);

        assert_eq!(row.terms.as_slice(), &[(3, 0.75)]);
        assert!((row.offset - 4.0).abs() < 1e-15);
        assert!((row.evaluate(&[0.0, 0.0, 0.0, 2.0]) - 5.5).abs() < 1e-15);
        assert!(ConstraintRow::fixed(1.0).is_fixed());
    }
}

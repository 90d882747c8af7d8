use thiserror::Error;

/// Description of an h-Refinement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HRef {
    /// isotropic (4 children)
    T,
    /// anisotropic about the u-direction (with the option for the subsequent v-refinement of one child Elem)
    U(Option<usize>),
    /// anisotropic about the v-direction (with the option for the subsequent u-refinement of one child Elem)
    V(Option<usize>),
}

impl HRef {
    /// Anisotropic u-refinement without an extension
    pub const fn u() -> Self {
        Self::U(None)
    }

    /// Anisotropic v-refinement without an extension
    pub const fn v() -> Self {
        Self::V(None)
    }

    /// Anisotropic u-refinement followed by a v-refinement of the child at `child_idx`
    pub fn u_extended(child_idx: usize) -> Result<Self, HRefError> {
        if child_idx < 2 {
            Ok(Self::U(Some(child_idx)))
        } else {
            Err(HRefError::BisectionIdxExceeded)
        }
    }

    /// The same refinement without any extension onto a child
    pub const fn without_extension(self) -> Self {
        match self {
            Self::T => Self::T,
            Self::U(_) => Self::U(None),
            Self::V(_) => Self::V(None),
        }
    }

    /// Anisotropic v-refinement followed by a u-refinement of the child at `child_idx`
    pub fn v_extended(child_idx: usize) -> Result<Self, HRefError> {
        if child_idx < 2 {
            Ok(Self::V(Some(child_idx)))
        } else {
            Err(HRefError::BisectionIdxExceeded)
        }
    }

    /// Number of child Elems produced by this refinement
    pub fn num_children(&self) -> usize {
        match self {
            Self::T => 4,
            Self::U(_) | Self::V(_) => 2,
        }
    }

    pub(crate) fn indices_and_ids(
        &self,
        id_counter: &mut usize,
    ) -> impl Iterator<Item = (usize, usize)> {
        let first_id = *id_counter;
        let n = self.num_children();
        *id_counter += n;
        (0..n).map(move |idx| (idx, first_id + idx))
    }

    /// The location of the child at `idx` relative to its parent
    pub fn loc(&self, idx: usize) -> HRefLoc {
        match self {
            Self::T => HRefLoc::T(Quadrant::from_index(idx)),
            Self::U(_) => HRefLoc::U(Bisection::from_index(idx)),
            Self::V(_) => HRefLoc::V(Bisection::from_index(idx)),
        }
    }

    /// Tag used to record the refinement in mesh files (`"T"`, `"U"`, `"V"`, `"U0"`, `"V1"`, ...)
    pub fn tag(&self) -> String {
        match self {
            Self::T => String::from("T"),
            Self::U(None) => String::from("U"),
            Self::V(None) => String::from("V"),
            Self::U(Some(idx)) => format!("U{}", idx),
            Self::V(Some(idx)) => format!("V{}", idx),
        }
    }

    /// Parse a tag produced by [HRef::tag]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "T" => Some(Self::T),
            "U" => Some(Self::u()),
            "V" => Some(Self::v()),
            "U0" | "U1" => Some(Self::U(Some(tag[1..].parse().ok()?))),
            "V0" | "V1" => Some(Self::V(Some(tag[1..].parse().ok()?))),
            _ => None,
        }
    }
}

/// Quadrant of a child Elem following a T-Type h-Refinement (from the parent Elem's perspective)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quadrant {
    /// south west
    SW,
    /// south east
    SE,
    /// north west
    NW,
    /// north east
    NE,
}

impl Quadrant {
    pub fn index(&self) -> usize {
        match self {
            Self::SW => 0,
            Self::SE => 1,
            Self::NW => 2,
            Self::NE => 3,
        }
    }

    fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::SW,
            1 => Self::SE,
            2 => Self::NW,
            3 => Self::NE,
            _ => unreachable!(),
        }
    }
}

/// Location of a child Elem following a U-Type or V-Type h-refinement (from the parent Elem's perspective).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bisection {
    /// Bottom (V-type) or Left (U-type)
    BL,
    /// Top (V-Type) or Right (U-type)
    TR,
}

impl Bisection {
    pub fn index(&self) -> usize {
        match self {
            Self::BL => 0,
            Self::TR => 1,
        }
    }

    fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::BL,
            1 => Self::TR,
            _ => unreachable!(),
        }
    }

    fn sub_range([min, max]: [f64; 2], half: Self) -> [f64; 2] {
        let mid = (min + max) / 2.0;
        match half {
            Self::BL => [min, mid],
            Self::TR => [mid, max],
        }
    }
}

/// The location of an Elem relative to its parent following an h-refinement
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HRefLoc {
    T(Quadrant),
    U(Bisection),
    V(Bisection),
}

impl HRefLoc {
    pub fn index(&self) -> usize {
        match self {
            Self::T(quad) => quad.index(),
            Self::U(bi) | Self::V(bi) => bi.index(),
        }
    }

    /// Shrink a parametric range `[[u_min, u_max], [v_min, v_max]]` to the portion covered by this location
    pub fn sub_range(&self, [u_range, v_range]: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
        match self {
            Self::T(quad) => {
                let (u_half, v_half) = match quad {
                    Quadrant::SW => (Bisection::BL, Bisection::BL),
                    Quadrant::SE => (Bisection::TR, Bisection::BL),
                    Quadrant::NW => (Bisection::BL, Bisection::TR),
                    Quadrant::NE => (Bisection::TR, Bisection::TR),
                };
                [
                    Bisection::sub_range(u_range, u_half),
                    Bisection::sub_range(v_range, v_half),
                ]
            }
            Self::U(bi) => [Bisection::sub_range(u_range, *bi), v_range],
            Self::V(bi) => [u_range, Bisection::sub_range(v_range, *bi)],
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
/// Description of an Elem's h-Refinement levels in the u and v directions
pub struct HLevels {
    pub u: u8,
    pub v: u8,
}

impl HLevels {
    pub fn from(u: u8, v: u8) -> Self {
        Self { u, v }
    }

    pub fn refined(&self, refinement: HRef) -> Self {
        match refinement {
            HRef::T => Self::from(self.u + 1, self.v + 1),
            HRef::U(_) => Self::from(self.u + 1, self.v),
            HRef::V(_) => Self::from(self.u, self.v + 1),
        }
    }
}

impl Default for HLevels {
    fn default() -> Self {
        Self { u: 0, v: 0 }
    }
}

/// Error type for h-Refinements
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HRefError {
    #[error("Elem {0} does not exist; cannot apply h-refinement!")]
    ElemDoesntExist(usize),
    #[error("Elem {0} has already been h-refined; cannot refine again!")]
    ElemHasChildren(usize),
    #[error("Edge {0} has already been h-refined; cannot refine again!")]
    EdgeHasChildren(usize),
    #[error("Elem {0} was specified more than once in the same set of h-refinements!")]
    DoubleRefinement(usize),
    #[error("Edge {0} is too short to be refined!")]
    MinEdgeLength(usize),
    #[error("Child Elem {0} was not fully initialized during h-refinement!")]
    UninitializedElem(usize),
    #[error("Extended anisotropic refinements can only be applied to child 0 or 1!")]
    BisectionIdxExceeded,
    #[error("No Elem belongs to the region '{0}'; cannot refine!")]
    InvalidRegion(String),
    #[error("No Edge carries the boundary marker '{0}'; cannot refine towards it!")]
    InvalidMarker(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_sub_ranges() {
        let range = [[-1.0, 1.0], [-1.0, 1.0]];
        let ne = HRefLoc::T(Quadrant::NE).sub_range(range);
        assert_eq!(ne, [[0.0, 1.0], [0.0, 1.0]]);

        let ne_left = HRefLoc::U(Bisection::BL).sub_range(ne);
        assert_eq!(ne_left, [[0.0, 0.5], [0.0, 1.0]]);

        let ne_left_top = HRefLoc::V(Bisection::TR).sub_range(ne_left);
        assert_eq!(ne_left_top, [[0.0, 0.5], [0.5, 1.0]]);
    }

    #[test]
    fn extended_refinement_bounds() {
        assert_eq!(HRef::u_extended(1), Ok(HRef::U(Some(1))));
        assert_eq!(HRef::v_extended(2), Err(HRefError::BisectionIdxExceeded));
    }

    #[test]
    fn tags_round_trip() {
        for href in [HRef::T, HRef::u(), HRef::V(Some(1))] {
            assert_eq!(HRef::from_tag(&href.tag()), Some(href));
        }
        assert_eq!(HRef::from_tag("X"), None);
    }

    #[test]
    fn child_ids_are_sequential() {
        let mut counter = 10;
        let ids: Vec<(usize, usize)> = HRef::T.indices_and_ids(&mut counter).collect();
        assert_eq!(ids, vec![(0, 10), (1, 11), (2, 12), (3, 13)]);
        assert_eq!(counter, 14);
        assert_eq!(HRef::v().loc(1), HRefLoc::V(Bisection::TR));
    }
}

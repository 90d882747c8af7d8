use super::MAX_POLYNOMIAL_ORDER;
use std::{cmp::Ordering, fmt, ops::AddAssign};
use thiserror::Error;

/// Check that a polynomial order falls within `1..=MAX_POLYNOMIAL_ORDER`
pub fn validate_order(order: u8) -> Result<u8, PRefError> {
    if order > MAX_POLYNOMIAL_ORDER {
        Err(PRefError::ExceededMaxExpansion(order))
    } else if order < 1 {
        Err(PRefError::NegExpansion)
    } else {
        Ok(order)
    }
}

// the internal p-refinement type
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PRefInt {
    Increment(u8),
    Decrement(u8),
    None,
}

impl PRefInt {
    fn refine(&self, n: u8) -> Result<u8, PRefError> {
        match self {
            Self::Increment(delta) => validate_order(n.saturating_add(*delta)),
            Self::Decrement(delta) => {
                if *delta >= n {
                    Err(PRefError::NegExpansion)
                } else {
                    Ok(n - *delta)
                }
            }
            Self::None => Ok(n),
        }
    }

    const fn from_i8(delta: i8) -> Self {
        match delta {
            0 => PRefInt::None,
            d if d > 0 => PRefInt::Increment(d as u8),
            d => PRefInt::Decrement(d.unsigned_abs()),
        }
    }

    fn as_i8(&self) -> i8 {
        match self {
            Self::None => 0,
            Self::Increment(delta) => *delta as i8,
            Self::Decrement(delta) => -(*delta as i8),
        }
    }
}

impl AddAssign for PRefInt {
    fn add_assign(&mut self, rhs: Self) {
        let sum = match (*self, rhs) {
            (Self::None, other) | (other, Self::None) => other,
            (Self::Increment(a), Self::Increment(b)) => Self::Increment(a + b),
            (Self::Decrement(a), Self::Decrement(b)) => Self::Decrement(a + b),
            (Self::Increment(up), Self::Decrement(down))
            | (Self::Decrement(down), Self::Increment(up)) => match up.cmp(&down) {
                Ordering::Equal => Self::None,
                Ordering::Greater => Self::Increment(up - down),
                Ordering::Less => Self::Decrement(down - up),
            },
        };

        *self = sum;
    }
}

/// The p-Refinement Type
///
/// p-refinements shift the polynomial order associated with an active Elem up or down
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PRef {
    delta: PRefInt,
}

impl PRef {
    /// Create a new p-refinement which shifts an Elem's order by `delta`
    pub const fn from(delta: i8) -> Self {
        Self {
            delta: PRefInt::from_i8(delta),
        }
    }

    /// The shift in polynomial order
    pub fn as_i8(&self) -> i8 {
        self.delta.as_i8()
    }

    /// Apply this refinement to an order, returning an `Err` if the result falls outside of the valid range
    pub fn refine(&self, order: u8) -> Result<u8, PRefError> {
        self.delta.refine(order)
    }
}

impl AddAssign for PRef {
    fn add_assign(&mut self, rhs: Self) {
        self.delta += rhs.delta;
    }
}

impl fmt::Display for PRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.delta {
            PRefInt::None => write!(f, "PRef (0)"),
            PRefInt::Decrement(delta) => write!(f, "PRef (-{})", delta),
            PRefInt::Increment(delta) => write!(f, "PRef (+{})", delta),
        }
    }
}

/// Error type for p-Refinements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PRefError {
    #[error("Polynomial order {0} exceeds the maximum of {}!", MAX_POLYNOMIAL_ORDER)]
    ExceededMaxExpansion(u8),
    #[error("Polynomial orders cannot be less than 1!")]
    NegExpansion,
    #[error("Elem {0} was specified more than once in the same set of p-refinements!")]
    DoubleRefinement(usize),
}

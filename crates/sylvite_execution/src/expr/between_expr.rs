use std::fmt;

use super::Expression;

/// Inclusivity of the two bounds of a between predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BetweenKind {
    Inclusive,
    LowerExclusive,
    UpperExclusive,
    Exclusive,
}

impl BetweenKind {
    pub const fn from_bounds(lower_inclusive: bool, upper_inclusive: bool) -> Self {
        match (lower_inclusive, upper_inclusive) {
            (true, true) => Self::Inclusive,
            (false, true) => Self::LowerExclusive,
            (true, false) => Self::UpperExclusive,
            (false, false) => Self::Exclusive,
        }
    }

    pub const fn lower_inclusive(&self) -> bool {
        matches!(self, Self::Inclusive | Self::UpperExclusive)
    }

    pub const fn upper_inclusive(&self) -> bool {
        matches!(self, Self::Inclusive | Self::LowerExclusive)
    }
}

/// `<input> BETWEEN <lower> AND <upper>`
#[derive(Debug, Clone, PartialEq)]
pub struct BetweenExpr {
    pub input: Box<Expression>,
    pub lower: Box<Expression>,
    pub upper: Box<Expression>,
    pub kind: BetweenKind,
}

impl fmt::Display for BetweenExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let open = if self.kind.lower_inclusive() { '[' } else { '(' };
        let close = if self.kind.upper_inclusive() { ']' } else { ')' };
        write!(
            f,
            "{} BETWEEN {}{} AND {}{}",
            self.input, open, self.lower, self.upper, close
        )
    }
}

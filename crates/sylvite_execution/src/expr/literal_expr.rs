use std::fmt;

use sylvite_storage::scalar::ScalarValue;

/// A scalar literal.
#[derive(Debug, Clone, PartialEq)]
pub struct LiteralExpr {
    pub literal: ScalarValue,
}

impl fmt::Display for LiteralExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.literal)
    }
}

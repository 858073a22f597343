use std::fmt;

use sylvite_storage::rows::ColumnId;

/// Reference to a column in the input by its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnExpr {
    pub column: ColumnId,
}

impl fmt::Display for ColumnExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.column)
    }
}

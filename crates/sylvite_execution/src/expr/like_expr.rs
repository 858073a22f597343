use std::fmt;

use super::Expression;

/// `<input> [NOT] LIKE <pattern>`
#[derive(Debug, Clone, PartialEq)]
pub struct LikeExpr {
    pub negated: bool,
    pub input: Box<Expression>,
    pub pattern: Box<Expression>,
}

impl fmt::Display for LikeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}LIKE {}",
            self.input,
            if self.negated { "NOT " } else { "" },
            self.pattern
        )
    }
}

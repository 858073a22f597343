pub mod between_expr;
pub mod column_expr;
pub mod comparison_expr;
pub mod conjunction_expr;
pub mod like_expr;
pub mod literal_expr;

use std::fmt;

use sylvite_storage::rows::ColumnId;
use sylvite_storage::scalar::ScalarValue;

use crate::errors::Result;
use between_expr::{BetweenExpr, BetweenKind};
use column_expr::ColumnExpr;
use comparison_expr::{ComparisonExpr, ComparisonOperator};
use conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use like_expr::LikeExpr;
use literal_expr::LiteralExpr;

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Column(ColumnExpr),
    Literal(LiteralExpr),
    Comparison(ComparisonExpr),
    Between(BetweenExpr),
    Conjunction(ConjunctionExpr),
    Like(LikeExpr),
}

impl Expression {
    /// Apply a function to each direct child of this expression.
    pub fn for_each_child_mut<F>(&mut self, f: &mut F) -> Result<()>
    where
        F: FnMut(&mut Expression) -> Result<()>,
    {
        match self {
            Self::Column(_) | Self::Literal(_) => Ok(()),
            Self::Comparison(ComparisonExpr { left, right, .. }) => {
                f(left)?;
                f(right)
            }
            Self::Between(BetweenExpr {
                input,
                lower,
                upper,
                ..
            }) => {
                f(input)?;
                f(lower)?;
                f(upper)
            }
            Self::Conjunction(ConjunctionExpr { expressions, .. }) => {
                for expr in expressions {
                    f(expr)?;
                }
                Ok(())
            }
            Self::Like(LikeExpr { input, pattern, .. }) => {
                f(input)?;
                f(pattern)
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column(expr) => expr.fmt(f),
            Self::Literal(expr) => expr.fmt(f),
            Self::Comparison(expr) => expr.fmt(f),
            Self::Between(expr) => expr.fmt(f),
            Self::Conjunction(expr) => expr.fmt(f),
            Self::Like(expr) => expr.fmt(f),
        }
    }
}

pub fn lit(value: impl Into<ScalarValue>) -> Expression {
    Expression::Literal(LiteralExpr {
        literal: value.into(),
    })
}

pub fn col_ref(column: ColumnId) -> Expression {
    Expression::Column(ColumnExpr { column })
}

pub fn compare(left: Expression, op: ComparisonOperator, right: Expression) -> Expression {
    Expression::Comparison(ComparisonExpr {
        left: Box::new(left),
        right: Box::new(right),
        op,
    })
}

pub fn between(
    input: Expression,
    lower: Expression,
    upper: Expression,
    kind: BetweenKind,
) -> Expression {
    Expression::Between(BetweenExpr {
        input: Box::new(input),
        lower: Box::new(lower),
        upper: Box::new(upper),
        kind,
    })
}

pub fn and(expressions: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Conjunction(ConjunctionExpr {
        op: ConjunctionOperator::And,
        expressions: expressions.into_iter().collect(),
    })
}

pub fn or(expressions: impl IntoIterator<Item = Expression>) -> Expression {
    Expression::Conjunction(ConjunctionExpr {
        op: ConjunctionOperator::Or,
        expressions: expressions.into_iter().collect(),
    })
}

pub fn like(input: Expression, pattern: impl Into<ScalarValue>) -> Expression {
    Expression::Like(LikeExpr {
        negated: false,
        input: Box::new(input),
        pattern: Box::new(lit(pattern)),
    })
}

use sylvite_storage::scalar::ScalarValue;

use super::{placeholder_operator, ExpressionRewriteRule, OptimizeRule};
use crate::errors::Result;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::expr::like_expr::LikeExpr;
use crate::expr::{self, Expression};
use crate::logical::operator::LogicalOperator;

/// Rewrite LIKE expressions into equivalent range predicates if possible.
///
/// `col LIKE 'abc%'` selects exactly the values in `['abc', 'abd')`, which a
/// scan can evaluate without pattern matching (and a dictionary-encoded
/// column can answer from its value ids alone). Patterns with non-trailing
/// wildcards are left untouched.
#[derive(Debug)]
pub struct LikeRewrite;

impl OptimizeRule for LikeRewrite {
    fn optimize(&self, mut plan: LogicalOperator) -> Result<LogicalOperator> {
        if let LogicalOperator::Filter(filter) = &mut plan {
            // Replace with temp dummy value.
            let orig = std::mem::replace(&mut filter.node.predicate, expr::lit(0));
            filter.node.predicate = Self::rewrite(orig)?;
        }

        for child in plan.children_mut() {
            let orig = std::mem::replace(child, placeholder_operator());
            *child = self.optimize(orig)?;
        }

        Ok(plan)
    }
}

impl ExpressionRewriteRule for LikeRewrite {
    fn rewrite(mut expression: Expression) -> Result<Expression> {
        fn inner(expr: &mut Expression) -> Result<()> {
            if let Expression::Like(like) = expr {
                if let Some(replacement) = rewrite_like(like) {
                    *expr = replacement;
                    return Ok(());
                }
            }
            expr.for_each_child_mut(&mut inner)
        }

        inner(&mut expression)?;

        Ok(expression)
    }
}

fn rewrite_like(like: &LikeExpr) -> Option<Expression> {
    if like.negated {
        return None;
    }
    let pattern = match like.pattern.as_ref() {
        Expression::Literal(lit) => match &lit.literal {
            ScalarValue::Utf8(pattern) => pattern,
            _ => return None,
        },
        _ => return None,
    };
    let input = like.input.as_ref().clone();

    if can_str_compare(pattern) {
        // No pattern characters at all, a plain string comparison will do.
        return Some(expr::compare(
            input,
            ComparisonOperator::Eq,
            expr::lit(pattern.as_str()),
        ));
    }

    if !is_prefix_pattern(pattern) {
        return None;
    }
    let prefix = &pattern[..pattern.len() - 1];
    if prefix.is_empty() {
        return None;
    }

    let lower = expr::compare(
        input.clone(),
        ComparisonOperator::GtEq,
        expr::lit(prefix),
    );
    match next_prefix(prefix) {
        Some(upper) => Some(expr::and([
            lower,
            expr::compare(input, ComparisonOperator::Lt, expr::lit(upper)),
        ])),
        // Every character overflowed, there is no string greater than the
        // prefix. The lower bound alone is exact.
        None => Some(lower),
    }
}

/// Checks if the string actually contains any pattern characters. If it
/// doesn't, we can just compare the strings directly.
fn can_str_compare(s: &str) -> bool {
    !s.contains('%') && !s.contains('_')
}

/// A prefix pattern has exactly one '%', unescaped, at the very end, and no
/// '_' anywhere.
fn is_prefix_pattern(s: &str) -> bool {
    let pat_pos = match s.find('%') {
        Some(idx) => idx,
        None => return false,
    };

    if s.contains('_') {
        return false;
    }

    if pat_pos != s.len() - 1 {
        return false;
    }

    // Ensure '%' isn't escaped.
    if pat_pos != 0 && s.as_bytes()[pat_pos - 1] == b'\\' {
        return false;
    }

    true
}

/// The smallest string greater than every string starting with `prefix`:
/// increment the last character, carrying left when a character has no
/// successor. Returns `None` when every position overflows.
fn next_prefix(prefix: &str) -> Option<String> {
    let mut chars: Vec<char> = prefix.chars().collect();
    while let Some(last) = chars.pop() {
        // Step over the surrogate gap and any other non-characters.
        let mut code = last as u32 + 1;
        while code <= char::MAX as u32 {
            if let Some(next) = char::from_u32(code) {
                chars.push(next);
                return Some(chars.into_iter().collect());
            }
            code += 1;
        }
    }
    None
}

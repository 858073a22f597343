use std::cmp::Ordering;
use std::collections::BTreeMap;

use sylvite_storage::rows::ColumnId;
use sylvite_storage::scalar::ScalarValue;

use super::{placeholder_operator, OptimizeRule};
use crate::errors::Result;
use crate::expr::between_expr::BetweenKind;
use crate::expr::comparison_expr::{ComparisonExpr, ComparisonOperator};
use crate::expr::conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use crate::expr::{self, Expression};
use crate::logical::logical_filter::LogicalFilter;
use crate::logical::operator::{LogicalOperator, Node};

/// Fuse chains of binary predicates that bracket a column from above and
/// below into a single between predicate, so scans can take the dictionary
/// fast path.
///
/// `a >= 3 AND a <= 7 AND a > 5` becomes `a BETWEEN (5 AND 7]`. Predicates
/// that don't contribute a bound are preserved verbatim; a column bounded
/// from only one side keeps its original comparisons. The number of
/// comparisons never increases.
#[derive(Debug)]
pub struct BetweenComposition;

impl OptimizeRule for BetweenComposition {
    fn optimize(&self, plan: LogicalOperator) -> Result<LogicalOperator> {
        Ok(Self::apply(plan))
    }
}

impl BetweenComposition {
    fn apply(plan: LogicalOperator) -> LogicalOperator {
        match plan {
            LogicalOperator::Filter(node) => Self::compose_chain(node),
            mut other => {
                for child in other.children_mut() {
                    let orig = std::mem::replace(child, placeholder_operator());
                    *child = Self::apply(orig);
                }
                other
            }
        }
    }

    /// Collect the maximal chain of filters below `top`, compose their
    /// predicates, and splice the rebuilt chain over the chain's input.
    fn compose_chain(mut top: Node<LogicalFilter>) -> LogicalOperator {
        // A filter with a right input is not a predicate chain element.
        if top.children.len() > 1 {
            for child in top.children.iter_mut() {
                let orig = std::mem::replace(child, placeholder_operator());
                *child = Self::apply(orig);
            }
            return LogicalOperator::Filter(top);
        }

        let mut predicates = Vec::new();
        let mut node = top;
        let input = loop {
            predicates.push(node.node.predicate);
            match node.children.pop() {
                Some(LogicalOperator::Filter(next)) if next.children.len() <= 1 => {
                    node = next;
                }
                // Chain ends; whatever is below gets optimized on its own.
                Some(other) => break Some(Self::apply(other)),
                None => break None,
            }
        };

        Self::rebuild(Self::compose(predicates), input)
    }

    /// Normalize the predicates of a chain into per-column boundaries and
    /// emit the composed predicate list: non-boundary predicates first (in
    /// encounter order, with one-sided columns re-emitted verbatim), then one
    /// between predicate per fully-bounded column.
    fn compose(predicates: Vec<Expression>) -> Vec<Expression> {
        let mut composed: Vec<Expression> = Vec::new();
        let mut by_column: BTreeMap<ColumnId, Vec<ColumnBoundary>> = BTreeMap::new();

        for predicate in predicates {
            for leaf in flatten_and(predicate) {
                match leaf {
                    Expression::Comparison(cmp) => match boundary_of(&cmp) {
                        Some(boundary) => {
                            by_column.entry(boundary.column).or_default().push(boundary)
                        }
                        None => composed.push(Expression::Comparison(cmp)),
                    },
                    other => composed.push(other),
                }
            }
        }

        let mut betweens = Vec::new();
        for (column, boundaries) in by_column {
            match tightest_bounds(&boundaries) {
                Some((lower, upper)) => betweens.push(expr::between(
                    expr::col_ref(column),
                    expr::lit(lower.value),
                    expr::lit(upper.value),
                    BetweenKind::from_bounds(lower.inclusive, upper.inclusive),
                )),
                None => composed.extend(
                    boundaries.into_iter().map(ColumnBoundary::into_expression),
                ),
            }
        }
        composed.extend(betweens);
        composed
    }

    fn rebuild(predicates: Vec<Expression>, input: Option<LogicalOperator>) -> LogicalOperator {
        let mut iter = predicates.into_iter().rev();
        let deepest = match iter.next() {
            Some(predicate) => predicate,
            // Nothing survived composition (e.g. an empty conjunction);
            // nothing to filter.
            None => {
                return match input {
                    Some(input) => input,
                    None => placeholder_operator(),
                }
            }
        };

        let mut current = LogicalOperator::Filter(Node::with_children(
            LogicalFilter { predicate: deepest },
            input.into_iter().collect(),
        ));
        for predicate in iter {
            current = LogicalOperator::Filter(Node::with_children(
                LogicalFilter { predicate },
                vec![current],
            ));
        }
        current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryKind {
    LowerInclusive,
    LowerExclusive,
    UpperInclusive,
    UpperExclusive,
}

impl BoundaryKind {
    fn as_comparison(self) -> ComparisonOperator {
        match self {
            Self::LowerInclusive => ComparisonOperator::GtEq,
            Self::LowerExclusive => ComparisonOperator::Gt,
            Self::UpperInclusive => ComparisonOperator::LtEq,
            Self::UpperExclusive => ComparisonOperator::Lt,
        }
    }
}

/// One normalized half-bound on a column: `column (>=|>|<=|<) value`.
#[derive(Debug, Clone)]
struct ColumnBoundary {
    column: ColumnId,
    value: ScalarValue,
    kind: BoundaryKind,
}

impl ColumnBoundary {
    fn into_expression(self) -> Expression {
        expr::compare(
            expr::col_ref(self.column),
            self.kind.as_comparison(),
            expr::lit(self.value),
        )
    }
}

#[derive(Debug)]
struct Bound {
    value: ScalarValue,
    inclusive: bool,
}

/// Normalize a binary comparison into a column boundary, accounting for the
/// operand order: `5 <= a` is the same bound as `a >= 5`.
fn boundary_of(expr: &ComparisonExpr) -> Option<ColumnBoundary> {
    let (column, literal, op) = match (expr.left.as_ref(), expr.right.as_ref()) {
        (Expression::Column(col), Expression::Literal(lit)) => (col, lit, expr.op),
        (Expression::Literal(lit), Expression::Column(col)) => (col, lit, expr.op.flip()),
        _ => return None,
    };
    if literal.literal.is_null() {
        return None;
    }

    let kind = match op {
        ComparisonOperator::GtEq => BoundaryKind::LowerInclusive,
        ComparisonOperator::Gt => BoundaryKind::LowerExclusive,
        ComparisonOperator::LtEq => BoundaryKind::UpperInclusive,
        ComparisonOperator::Lt => BoundaryKind::UpperExclusive,
        _ => return None,
    };

    Some(ColumnBoundary {
        column: column.column,
        value: literal.literal.clone(),
        kind,
    })
}

/// Select the tightest lower and upper bound for one column: the largest
/// lower and smallest upper literal, preferring exclusive over inclusive at
/// equal literals. Returns `None` when the column isn't bounded from both
/// sides, or when two of its literals aren't comparable.
fn tightest_bounds(boundaries: &[ColumnBoundary]) -> Option<(Bound, Bound)> {
    let mut lower: Option<Bound> = None;
    let mut upper: Option<Bound> = None;

    for boundary in boundaries {
        let (slot, inclusive, replace_on) = match boundary.kind {
            BoundaryKind::LowerInclusive => (&mut lower, true, &[Ordering::Less][..]),
            BoundaryKind::LowerExclusive => {
                (&mut lower, false, &[Ordering::Less, Ordering::Equal][..])
            }
            BoundaryKind::UpperInclusive => (&mut upper, true, &[Ordering::Greater][..]),
            BoundaryKind::UpperExclusive => {
                (&mut upper, false, &[Ordering::Greater, Ordering::Equal][..])
            }
        };

        let replace = match &*slot {
            None => true,
            Some(current) => {
                match current.value.try_compare(&boundary.value) {
                    Ok(Some(ord)) => replace_on.contains(&ord),
                    // Mixed-type bounds on one column; don't try to compose.
                    Ok(None) | Err(_) => return None,
                }
            }
        };
        if replace {
            *slot = Some(Bound {
                value: boundary.value.clone(),
                inclusive,
            });
        }
    }

    // The two selected bounds must be comparable with each other as well.
    match (lower, upper) {
        (Some(lower), Some(upper)) => match lower.value.try_compare(&upper.value) {
            Ok(Some(_)) => Some((lower, upper)),
            Ok(None) | Err(_) => None,
        },
        _ => None,
    }
}

/// Flatten nested AND conjunctions into their leaves.
fn flatten_and(expr: Expression) -> Vec<Expression> {
    fn inner(expr: Expression, out: &mut Vec<Expression>) {
        match expr {
            Expression::Conjunction(ConjunctionExpr {
                op: ConjunctionOperator::And,
                expressions,
            }) => {
                for child in expressions {
                    inner(child, out);
                }
            }
            other => out.push(other),
        }
    }

    let mut out = Vec::new();
    inner(expr, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{col_ref, lit};
    use crate::logical::logical_scan::LogicalScan;

    fn filter(predicate: Expression, input: Option<LogicalOperator>) -> LogicalOperator {
        LogicalOperator::Filter(Node::with_children(
            LogicalFilter { predicate },
            input.into_iter().collect(),
        ))
    }

    fn scan() -> LogicalOperator {
        LogicalOperator::Scan(Node::new(LogicalScan {
            table_name: "t".to_string(),
        }))
    }

    fn cmp(column: ColumnId, op: ComparisonOperator, value: i32) -> Expression {
        expr::compare(col_ref(column), op, lit(value))
    }

    #[test]
    fn composes_chain_into_single_between() {
        // a >= 3, a <= 7, a > 5 => a BETWEEN (5 AND 7]
        let plan = filter(
            cmp(0, ComparisonOperator::GtEq, 3),
            Some(filter(
                cmp(0, ComparisonOperator::LtEq, 7),
                Some(filter(cmp(0, ComparisonOperator::Gt, 5), Some(scan()))),
            )),
        );

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected = filter(
            expr::between(col_ref(0), lit(5), lit(7), BetweenKind::LowerExclusive),
            Some(scan()),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn composes_conjunction_in_single_node() {
        let plan = filter(
            expr::and([
                cmp(0, ComparisonOperator::GtEq, 2),
                cmp(0, ComparisonOperator::LtEq, 4),
            ]),
            Some(scan()),
        );

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected = filter(
            expr::between(col_ref(0), lit(2), lit(4), BetweenKind::Inclusive),
            Some(scan()),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn exclusive_beats_inclusive_at_equal_literals() {
        for order in [
            [
                cmp(0, ComparisonOperator::GtEq, 5),
                cmp(0, ComparisonOperator::Gt, 5),
            ],
            [
                cmp(0, ComparisonOperator::Gt, 5),
                cmp(0, ComparisonOperator::GtEq, 5),
            ],
        ] {
            let plan = filter(
                expr::and(order.into_iter().chain([cmp(0, ComparisonOperator::Lt, 9)])),
                Some(scan()),
            );

            let got = BetweenComposition.optimize(plan).unwrap();

            let expected = filter(
                expr::between(col_ref(0), lit(5), lit(9), BetweenKind::Exclusive),
                Some(scan()),
            );
            assert_eq!(expected, got);
        }
    }

    #[test]
    fn one_sided_bounds_are_reemitted() {
        let plan = filter(
            cmp(0, ComparisonOperator::GtEq, 3),
            Some(filter(cmp(0, ComparisonOperator::Gt, 5), Some(scan()))),
        );

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected = filter(
            cmp(0, ComparisonOperator::GtEq, 3),
            Some(filter(cmp(0, ComparisonOperator::Gt, 5), Some(scan()))),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn non_boundary_predicates_are_preserved() {
        // b = 2 contributes no bound, a gets composed.
        let plan = filter(
            expr::and([
                cmp(0, ComparisonOperator::GtEq, 1),
                cmp(1, ComparisonOperator::Eq, 2),
                cmp(0, ComparisonOperator::Lt, 9),
            ]),
            Some(scan()),
        );

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected = filter(
            cmp(1, ComparisonOperator::Eq, 2),
            Some(filter(
                expr::between(col_ref(0), lit(1), lit(9), BetweenKind::UpperExclusive),
                Some(scan()),
            )),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn flipped_operands_normalize() {
        // 3 <= a AND 7 >= a => a BETWEEN [3 AND 7]
        let plan = filter(
            expr::and([
                expr::compare(lit(3), ComparisonOperator::LtEq, col_ref(0)),
                expr::compare(lit(7), ComparisonOperator::GtEq, col_ref(0)),
            ]),
            Some(scan()),
        );

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected = filter(
            expr::between(col_ref(0), lit(3), lit(7), BetweenKind::Inclusive),
            Some(scan()),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn mixed_type_bounds_are_left_alone() {
        let plan = filter(
            expr::and([
                cmp(0, ComparisonOperator::GtEq, 3),
                expr::compare(col_ref(0), ComparisonOperator::LtEq, lit("z")),
                cmp(0, ComparisonOperator::GtEq, 5),
            ]),
            Some(scan()),
        );

        let got = BetweenComposition.optimize(plan.clone()).unwrap();

        // All three boundaries re-emitted as individual predicates.
        let expected = filter(
            cmp(0, ComparisonOperator::GtEq, 3),
            Some(filter(
                expr::compare(col_ref(0), ComparisonOperator::LtEq, lit("z")),
                Some(filter(cmp(0, ComparisonOperator::GtEq, 5), Some(scan()))),
            )),
        );
        assert_eq!(expected, got);
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let plan = filter(
            expr::and([
                cmp(0, ComparisonOperator::GtEq, 2),
                cmp(1, ComparisonOperator::Eq, 0),
                cmp(0, ComparisonOperator::Lt, 9),
            ]),
            Some(filter(cmp(2, ComparisonOperator::Gt, 1), Some(scan()))),
        );

        let once = BetweenComposition.optimize(plan).unwrap();
        let twice = BetweenComposition.optimize(once.clone()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn chain_stops_at_non_filter_nodes() {
        // The join breaks the chain; each side composes independently.
        let join = LogicalOperator::Join(Node::with_children(
            crate::logical::logical_join::LogicalJoin {
                join_type: crate::logical::logical_join::JoinType::Inner,
                condition: cmp(0, ComparisonOperator::Eq, 0),
            },
            vec![
                filter(
                    expr::and([
                        cmp(0, ComparisonOperator::GtEq, 1),
                        cmp(0, ComparisonOperator::LtEq, 2),
                    ]),
                    Some(scan()),
                ),
                scan(),
            ],
        ));
        let plan = filter(cmp(1, ComparisonOperator::Eq, 5), Some(join));

        let got = BetweenComposition.optimize(plan).unwrap();

        let expected_join = LogicalOperator::Join(Node::with_children(
            crate::logical::logical_join::LogicalJoin {
                join_type: crate::logical::logical_join::JoinType::Inner,
                condition: cmp(0, ComparisonOperator::Eq, 0),
            },
            vec![
                filter(
                    expr::between(col_ref(0), lit(1), lit(2), BetweenKind::Inclusive),
                    Some(scan()),
                ),
                scan(),
            ],
        ));
        let expected = filter(cmp(1, ComparisonOperator::Eq, 5), Some(expected_join));
        assert_eq!(expected, got);
    }
}

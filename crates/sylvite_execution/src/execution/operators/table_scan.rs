use std::fmt;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::debug;

use sylvite_storage::datatype::DataType;
use sylvite_storage::errors::StorageError;
use sylvite_storage::native::NativeType;
use sylvite_storage::rows::{ChunkId, ChunkOffset, ColumnId, PositionList, RowId};
use sylvite_storage::scalar::ScalarValue;
use sylvite_storage::segment::{
    typed_positions, DictionarySegment, Segment, ValueId, INVALID_VALUE_ID,
};
use sylvite_storage::table::Table;

use super::{reference_output_table, PhysicalOperator};
use crate::errors::Result;
use crate::execution::ExecutionContext;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::between_expr::BetweenKind;
use crate::expr::comparison_expr::ComparisonOperator;

/// The predicate a table scan evaluates against its column: a comparison
/// against one value, or a range test against two.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPredicate {
    Comparison {
        op: ComparisonOperator,
        value: ScalarValue,
    },
    Between {
        lower: ScalarValue,
        upper: ScalarValue,
        kind: BetweenKind,
    },
}

impl ScanPredicate {
    fn has_null_operand(&self) -> bool {
        match self {
            Self::Comparison { value, .. } => value.is_null(),
            Self::Between { lower, upper, .. } => lower.is_null() || upper.is_null(),
        }
    }
}

impl fmt::Display for ScanPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comparison { op, value } => write!(f, "{} {}", op, value),
            Self::Between { lower, upper, kind } => {
                let open = if kind.lower_inclusive() { '[' } else { '(' };
                let close = if kind.upper_inclusive() { ']' } else { ')' };
                write!(f, "BETWEEN {}{} AND {}{}", open, lower, upper, close)
            }
        }
    }
}

/// Scan of a single column, emitting a reference table over the input with
/// the positions of all rows satisfying the predicate, in (chunk, offset)
/// order.
///
/// Chunks are scanned independently (in parallel) and their matches
/// concatenated in chunk order. Each chunk picks one of three evaluation
/// strategies: the dictionary fast path for between predicates over encoded
/// segments, a typed loop when the operands convert exactly to the column
/// type, and a coerced scalar loop otherwise (also used to chase reference
/// inputs).
#[derive(Debug)]
pub struct TableScan {
    input: Box<dyn PhysicalOperator>,
    column_id: ColumnId,
    predicate: ScanPredicate,
}

impl TableScan {
    pub fn new(
        input: Box<dyn PhysicalOperator>,
        column_id: ColumnId,
        predicate: ScanPredicate,
    ) -> Self {
        TableScan {
            input,
            column_id,
            predicate,
        }
    }
}

impl PhysicalOperator for TableScan {
    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        ctx.check_canceled()?;
        let input = self.input.execute(ctx)?;
        debug!("executing {}", self.explain_entry(ExplainConfig::default()));

        let datatype = input.data_type(self.column_id)?;

        // Comparing anything with NULL yields NULL, so a NULL operand can
        // never produce a match.
        if self.predicate.has_null_operand() {
            return reference_output_table(&input, PositionList::empty());
        }

        let predicate = TypedPredicate::resolve(&self.predicate, datatype)?;

        let chunks = input.chunks();
        let per_chunk = chunks
            .par_iter()
            .enumerate()
            .map(|(chunk_id, chunk)| {
                ctx.check_canceled()?;
                let mut matches = PositionList::empty();
                let segment = chunk.segment(self.column_id)?;
                scan_segment(segment.as_ref(), chunk_id as ChunkId, &predicate, &mut matches)?;
                Ok(matches)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut matches = PositionList::empty();
        for chunk_matches in per_chunk {
            matches.extend(chunk_matches.iter());
        }

        reference_output_table(&input, matches)
    }
}

impl Explainable for TableScan {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("TableScan")
            .with_value("column", self.column_id)
            .with_value("predicate", &self.predicate)
    }
}

/// A scan predicate with its operands resolved against the column type.
///
/// `typed` records whether every operand was converted exactly to the column
/// type; if not (e.g. `a < 2.5` on an integer column), evaluation falls back
/// to coerced scalar comparisons, which are slower but lose nothing.
#[derive(Debug)]
enum TypedPredicate {
    Comparison {
        op: ComparisonOperator,
        value: ScalarValue,
        typed: bool,
    },
    Between {
        lower: ScalarValue,
        upper: ScalarValue,
        kind: BetweenKind,
        typed: bool,
    },
}

impl TypedPredicate {
    /// Errors on fundamentally incompatible operands (string vs. numeric),
    /// which abort the query.
    fn resolve(predicate: &ScanPredicate, datatype: DataType) -> Result<Self> {
        let resolve_operand = |operand: &ScalarValue| -> Result<(ScalarValue, bool)> {
            Ok(match operand.cast_to(datatype)? {
                Some(cast) => (cast, true),
                None => (operand.clone(), false),
            })
        };

        Ok(match predicate {
            ScanPredicate::Comparison { op, value } => {
                let (value, typed) = resolve_operand(value)?;
                TypedPredicate::Comparison {
                    op: *op,
                    value,
                    typed,
                }
            }
            ScanPredicate::Between { lower, upper, kind } => {
                let (lower, lower_typed) = resolve_operand(lower)?;
                let (upper, upper_typed) = resolve_operand(upper)?;
                TypedPredicate::Between {
                    lower,
                    upper,
                    kind: *kind,
                    typed: lower_typed && upper_typed,
                }
            }
        })
    }

    fn is_typed(&self) -> bool {
        match self {
            Self::Comparison { typed, .. } => *typed,
            Self::Between { typed, .. } => *typed,
        }
    }
}

fn scan_segment(
    segment: &Segment,
    chunk_id: ChunkId,
    predicate: &TypedPredicate,
    matches: &mut PositionList,
) -> Result<()> {
    match segment {
        // Reference inputs are chased value by value; the emitted positions
        // live in the input table's coordinates and get re-expressed in terms
        // of the data table during output materialization.
        Segment::Reference(reference) => {
            for offset in 0..reference.len() as ChunkOffset {
                if scalar_matches(&reference.scalar_at(offset)?, predicate)? {
                    matches.push(RowId::new(chunk_id, offset));
                }
            }
            Ok(())
        }
        Segment::Dictionary(dictionary) => match predicate {
            TypedPredicate::Between {
                lower,
                upper,
                kind,
                typed: true,
            } => scan_dictionary_between(dictionary, chunk_id, lower, upper, *kind, matches),
            _ => scan_data_segment(segment, chunk_id, predicate, matches),
        },
        Segment::Value(_) => scan_data_segment(segment, chunk_id, predicate, matches),
    }
}

/// Range scan over the attribute vector of a dictionary segment.
///
/// The bounds are translated to value ids once; the per-row test reduces to
/// a single unsigned subtract-and-compare and never touches the dictionary
/// values. NULL rows carry the id one past the dictionary, which lies outside
/// the clamped range.
fn scan_dictionary_between(
    segment: &DictionarySegment,
    chunk_id: ChunkId,
    lower: &ScalarValue,
    upper: &ScalarValue,
    kind: BetweenKind,
    matches: &mut PositionList,
) -> Result<()> {
    let lower_id = if kind.lower_inclusive() {
        segment.lower_bound(lower)?
    } else {
        segment.upper_bound(lower)?
    };
    let mut upper_id = if kind.upper_inclusive() {
        segment.upper_bound(upper)?
    } else {
        segment.lower_bound(upper)?
    };

    let unique_values = segment.unique_values_count() as ValueId;
    if upper_id == INVALID_VALUE_ID {
        // The upper bound lies beyond the dictionary; clamp it so the range
        // still excludes the NULL id.
        upper_id = unique_values;
    }

    if lower_id == 0 && upper_id == unique_values {
        // All values match.
        let null_id = segment.null_value_id();
        for (offset, value_id) in segment.attribute_vector().iter().enumerate() {
            if *value_id != null_id {
                matches.push(RowId::new(chunk_id, offset as ChunkOffset));
            }
        }
        return Ok(());
    }

    if lower_id == INVALID_VALUE_ID || lower_id >= unique_values || lower_id >= upper_id {
        // No values match.
        return Ok(());
    }

    // (x >= a && x < b) === ((x - a) < (b - a)) in unsigned arithmetic. No
    // need to check for NULL: its value id is outside the range.
    let value_id_diff = upper_id - lower_id;
    for (offset, value_id) in segment.attribute_vector().iter().enumerate() {
        if value_id.wrapping_sub(lower_id) < value_id_diff {
            matches.push(RowId::new(chunk_id, offset as ChunkOffset));
        }
    }
    Ok(())
}

fn scan_data_segment(
    segment: &Segment,
    chunk_id: ChunkId,
    predicate: &TypedPredicate,
    matches: &mut PositionList,
) -> Result<()> {
    if !predicate.is_typed() {
        // Coerced comparisons against an operand of a different numeric type.
        for offset in 0..segment.len() as ChunkOffset {
            if scalar_matches(&segment.scalar_at(offset)?, predicate)? {
                matches.push(RowId::new(chunk_id, offset));
            }
        }
        return Ok(());
    }

    match segment.data_type() {
        DataType::Int32 => scan_typed::<i32>(segment, chunk_id, predicate, matches),
        DataType::Int64 => scan_typed::<i64>(segment, chunk_id, predicate, matches),
        DataType::Float32 => scan_typed::<f32>(segment, chunk_id, predicate, matches),
        DataType::Float64 => scan_typed::<f64>(segment, chunk_id, predicate, matches),
        DataType::Utf8 => scan_typed::<String>(segment, chunk_id, predicate, matches),
    }
}

fn scan_typed<T: NativeType>(
    segment: &Segment,
    chunk_id: ChunkId,
    predicate: &TypedPredicate,
    matches: &mut PositionList,
) -> Result<()> {
    fn operand<T: NativeType>(value: &ScalarValue) -> Result<T> {
        T::from_scalar(value).ok_or_else(|| {
            StorageError::TypeMismatch(format!(
                "operand {} does not match column type {}",
                value,
                T::DATATYPE
            ))
            .into()
        })
    }

    match predicate {
        TypedPredicate::Comparison { op, value, .. } => {
            let value = operand::<T>(value)?;
            match op {
                ComparisonOperator::Eq => scan_positions(segment, chunk_id, matches, |v: &T| v == &value),
                ComparisonOperator::NotEq => {
                    scan_positions(segment, chunk_id, matches, |v: &T| v != &value)
                }
                ComparisonOperator::Lt => scan_positions(segment, chunk_id, matches, |v: &T| v < &value),
                ComparisonOperator::LtEq => {
                    scan_positions(segment, chunk_id, matches, |v: &T| v <= &value)
                }
                ComparisonOperator::Gt => scan_positions(segment, chunk_id, matches, |v: &T| v > &value),
                ComparisonOperator::GtEq => {
                    scan_positions(segment, chunk_id, matches, |v: &T| v >= &value)
                }
            }
        }
        TypedPredicate::Between {
            lower, upper, kind, ..
        } => {
            let lower = operand::<T>(lower)?;
            let upper = operand::<T>(upper)?;
            match kind {
                BetweenKind::Inclusive => scan_positions(segment, chunk_id, matches, |v: &T| {
                    v >= &lower && v <= &upper
                }),
                BetweenKind::LowerExclusive => scan_positions(segment, chunk_id, matches, |v: &T| {
                    v > &lower && v <= &upper
                }),
                BetweenKind::UpperExclusive => scan_positions(segment, chunk_id, matches, |v: &T| {
                    v >= &lower && v < &upper
                }),
                BetweenKind::Exclusive => scan_positions(segment, chunk_id, matches, |v: &T| {
                    v > &lower && v < &upper
                }),
            }
        }
    }
}

/// NULL positions never match.
fn scan_positions<T: NativeType>(
    segment: &Segment,
    chunk_id: ChunkId,
    matches: &mut PositionList,
    comparator: impl Fn(&T) -> bool,
) -> Result<()> {
    for position in typed_positions::<T>(segment, None)? {
        if let Some(value) = position.value() {
            if comparator(value) {
                matches.push(RowId::new(chunk_id, position.chunk_offset()));
            }
        }
    }
    Ok(())
}

fn scalar_matches(value: &ScalarValue, predicate: &TypedPredicate) -> Result<bool> {
    if value.is_null() {
        return Ok(false);
    }
    match predicate {
        TypedPredicate::Comparison { op, value: operand, .. } => {
            Ok(op.matches(value.try_compare(operand)?))
        }
        TypedPredicate::Between {
            lower, upper, kind, ..
        } => {
            let lower_op = if kind.lower_inclusive() {
                ComparisonOperator::GtEq
            } else {
                ComparisonOperator::Gt
            };
            let upper_op = if kind.upper_inclusive() {
                ComparisonOperator::LtEq
            } else {
                ComparisonOperator::Lt
            };
            Ok(lower_op.matches(value.try_compare(lower)?)
                && upper_op.matches(value.try_compare(upper)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operators::table_source::TableSource;
    use crate::testutil::{collect_column, int_table, row_ids, scan};

    fn positions_of(table: &Arc<Table>) -> Vec<RowId> {
        row_ids(table)
    }

    #[test]
    fn between_on_dictionary_takes_fast_path() {
        let table = int_table([Some(1), Some(2), Some(3), Some(4), Some(5)]);
        table.encode_chunk(0).unwrap();

        let result = scan(
            table,
            0,
            ScanPredicate::Between {
                lower: ScalarValue::from(2),
                upper: ScalarValue::from(4),
                kind: BetweenKind::Inclusive,
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 1), RowId::new(0, 2), RowId::new(0, 3)],
            positions_of(&result)
        );
    }

    #[test]
    fn fast_path_equals_generic_path() {
        let values = [
            Some(5),
            None,
            Some(1),
            Some(3),
            Some(3),
            Some(9),
            None,
            Some(7),
        ];
        let plain = int_table(values);
        let encoded = int_table(values);
        encoded.encode_chunk(0).unwrap();

        let kinds = [
            BetweenKind::Inclusive,
            BetweenKind::LowerExclusive,
            BetweenKind::UpperExclusive,
            BetweenKind::Exclusive,
        ];
        for kind in kinds {
            let predicate = ScanPredicate::Between {
                lower: ScalarValue::from(3),
                upper: ScalarValue::from(7),
                kind,
            };
            let from_plain = scan(plain.clone(), 0, predicate.clone()).unwrap();
            let from_encoded = scan(encoded.clone(), 0, predicate).unwrap();

            assert_eq!(
                positions_of(&from_plain),
                positions_of(&from_encoded),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn null_values_never_match() {
        let table = int_table([Some(1), None, Some(3)]);

        let result = scan(
            table,
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Gt,
                value: ScalarValue::from(0),
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(0, 2)],
            positions_of(&result)
        );
    }

    #[test]
    fn null_operand_matches_nothing() {
        let table = int_table([Some(1), Some(2)]);

        let result = scan(
            table,
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Eq,
                value: ScalarValue::Null,
            },
        )
        .unwrap();

        assert_eq!(0, result.row_count());
    }

    #[test]
    fn between_with_swapped_bounds_is_empty() {
        for encode in [false, true] {
            let table = int_table([Some(1), Some(2), Some(3)]);
            if encode {
                table.encode_chunk(0).unwrap();
            }

            let result = scan(
                table,
                0,
                ScanPredicate::Between {
                    lower: ScalarValue::from(4),
                    upper: ScalarValue::from(2),
                    kind: BetweenKind::Inclusive,
                },
            )
            .unwrap();
            assert_eq!(0, result.row_count());
        }
    }

    #[test]
    fn between_clamps_upper_beyond_dictionary() {
        let table = int_table([Some(1), None, Some(3), Some(5)]);
        table.encode_chunk(0).unwrap();

        let result = scan(
            table,
            0,
            ScanPredicate::Between {
                lower: ScalarValue::from(2),
                upper: ScalarValue::from(100),
                kind: BetweenKind::Inclusive,
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 2), RowId::new(0, 3)],
            positions_of(&result)
        );
    }

    #[test]
    fn between_matching_everything_excludes_nulls() {
        let table = int_table([Some(2), None, Some(3)]);
        table.encode_chunk(0).unwrap();

        let result = scan(
            table,
            0,
            ScanPredicate::Between {
                lower: ScalarValue::from(0),
                upper: ScalarValue::from(10),
                kind: BetweenKind::Inclusive,
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(0, 2)],
            positions_of(&result)
        );
    }

    #[test]
    fn fractional_operand_on_integer_column() {
        // 2.5 has no i32 representation; the scan falls back to coerced
        // comparisons instead of mangling the operand.
        let table = int_table([Some(1), Some(2), Some(3)]);

        let result = scan(
            table,
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Lt,
                value: ScalarValue::from(2.5f64),
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(0, 1)],
            positions_of(&result)
        );
    }

    #[test]
    fn string_operand_on_integer_column_is_fatal() {
        let table = int_table([Some(1)]);

        scan(
            table,
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Eq,
                value: ScalarValue::from("1"),
            },
        )
        .unwrap_err();
    }

    #[test]
    fn scan_of_scan_flattens_references() {
        let table = int_table([Some(1), Some(2), Some(3), Some(4)]);

        let first = TableScan::new(
            Box::new(TableSource::new(table.clone())),
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Gt,
                value: ScalarValue::from(1),
            },
        );
        let second = TableScan::new(
            Box::new(first),
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Lt,
                value: ScalarValue::from(4),
            },
        );

        let result = second.execute(&ExecutionContext::new()).unwrap();

        // Positions point at the data table, not at the intermediate result.
        assert_eq!(
            vec![RowId::new(0, 1), RowId::new(0, 2)],
            positions_of(&result)
        );
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(3)],
            collect_column(&result, 0)
        );
    }

    #[test]
    fn scan_spans_multiple_chunks_in_order() {
        let table = int_table_chunked([Some(1), Some(5), Some(2), Some(6), Some(3)], 2);

        let result = scan(
            table,
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Lt,
                value: ScalarValue::from(4),
            },
        )
        .unwrap();

        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(1, 0), RowId::new(2, 0)],
            positions_of(&result)
        );
    }

    #[test]
    fn canceled_scan_produces_no_result() {
        let table = int_table([Some(1), Some(2)]);
        let operator = TableScan::new(
            Box::new(TableSource::new(table)),
            0,
            ScanPredicate::Comparison {
                op: ComparisonOperator::Gt,
                value: ScalarValue::from(0),
            },
        );

        let ctx = ExecutionContext::new();
        ctx.cancel();
        assert!(matches!(
            operator.execute(&ctx),
            Err(crate::errors::ExecutionError::QueryCanceled)
        ));
    }

    fn int_table_chunked(
        values: impl IntoIterator<Item = Option<i32>>,
        max_chunk_size: usize,
    ) -> Arc<Table> {
        use sylvite_storage::field::{Field, Schema};
        use sylvite_storage::table::TableType;

        let table = Table::try_new(
            Schema::new([Field::new("a", DataType::Int32, true)]),
            TableType::Data,
            max_chunk_size,
        )
        .unwrap();
        for value in values {
            table.append(vec![ScalarValue::from(value)]).unwrap();
        }
        Arc::new(table)
    }
}

use std::sync::Arc;

use tracing::debug;

use sylvite_storage::chunk::Chunk;
use sylvite_storage::datatype::DataType;
use sylvite_storage::errors::StorageError;
use sylvite_storage::field::{Field, Schema};
use sylvite_storage::native::NativeType;
use sylvite_storage::rows::{ChunkId, ChunkOffset, ColumnId, PositionList, RowId};
use sylvite_storage::scalar::ScalarValue;
use sylvite_storage::segment::value::ValueSegment;
use sylvite_storage::segment::{DictionarySegment, Segment, SegmentPosition};
use sylvite_storage::table::{Table, TableType, DEFAULT_MAX_CHUNK_SIZE};

use super::{reference_output_segments, PhysicalOperator};
use crate::errors::Result;
use crate::execution::ExecutionContext;
use crate::explain::{ExplainConfig, ExplainEntry, Explainable};
use crate::expr::comparison_expr::ComparisonOperator;
use crate::logical::logical_join::JoinType;

/// Nested loop join over one comparison condition.
///
/// Supports every join type and NULL values. The quadratic loop makes it far
/// slower than a hash or sort-merge join; its value is being the fallback
/// that handles arbitrary comparison operators.
#[derive(Debug)]
pub struct NestedLoopJoin {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    join_type: JoinType,
    column_ids: (ColumnId, ColumnId),
    op: ComparisonOperator,
}

impl NestedLoopJoin {
    pub fn new(
        left: Box<dyn PhysicalOperator>,
        right: Box<dyn PhysicalOperator>,
        join_type: JoinType,
        column_ids: (ColumnId, ColumnId),
        op: ComparisonOperator,
    ) -> Self {
        NestedLoopJoin {
            left,
            right,
            join_type,
            column_ids,
            op,
        }
    }
}

impl PhysicalOperator for NestedLoopJoin {
    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>> {
        ctx.check_canceled()?;
        let left_input = self.left.execute(ctx)?;
        let right_input = self.right.execute(ctx)?;
        debug!("executing {}", self.explain_entry(ExplainConfig::default()));

        // A right join runs as a left join with the inputs swapped and the
        // comparison flipped. This is the only place flipping happens.
        let flipped = self.join_type == JoinType::Right;
        let (left_table, right_table, (left_column, right_column), op) = if flipped {
            (
                right_input.clone(),
                left_input.clone(),
                (self.column_ids.1, self.column_ids.0),
                self.op.flip(),
            )
        } else {
            (
                left_input.clone(),
                right_input.clone(),
                self.column_ids,
                self.op,
            )
        };
        let join_type = if flipped { JoinType::Left } else { self.join_type };

        let left_type = left_table.data_type(left_column)?;
        let right_type = right_table.data_type(right_column)?;
        if (left_type == DataType::Utf8) != (right_type == DataType::Utf8) {
            return Err(StorageError::TypeMismatch(format!(
                "cannot join a {} column with a {} column",
                left_type, right_type
            ))
            .into());
        }

        let emit_pairs = !matches!(join_type, JoinType::Semi | JoinType::Anti);
        let track_left = !matches!(join_type, JoinType::Inner);
        let track_right = join_type == JoinType::Full;

        let left_chunks = left_table.chunks();
        let right_chunks = right_table.chunks();

        let mut pos_left = PositionList::empty();
        let mut pos_right = PositionList::empty();

        // For full outer joins, remember the matches on the right side.
        let mut right_matches: Vec<Vec<bool>> = right_chunks
            .iter()
            .map(|chunk| {
                if track_right {
                    vec![false; chunk.len()]
                } else {
                    Vec::new()
                }
            })
            .collect();

        for (left_chunk_id, left_chunk) in left_chunks.iter().enumerate() {
            ctx.check_canceled()?;
            let left_segment = left_chunk.segment(left_column)?;

            let mut left_matches = if track_left {
                vec![false; left_chunk.len()]
            } else {
                Vec::new()
            };

            for (right_chunk_id, right_chunk) in right_chunks.iter().enumerate() {
                let right_segment = right_chunk.segment(right_column)?;

                let mut params = JoinParams {
                    pos_left: &mut pos_left,
                    pos_right: &mut pos_right,
                    left_matches: &mut left_matches,
                    right_matches: &mut right_matches[right_chunk_id],
                    track_left,
                    track_right,
                    emit_pairs,
                };
                join_segments(
                    left_segment.as_ref(),
                    right_segment.as_ref(),
                    left_chunk_id as ChunkId,
                    right_chunk_id as ChunkId,
                    op,
                    &mut params,
                )?;
            }

            let left_chunk_id = left_chunk_id as ChunkId;
            match join_type {
                // Unmatched rows on the left join with a NULL row.
                JoinType::Left | JoinType::Full => {
                    for (offset, matched) in left_matches.iter().enumerate() {
                        if !matched {
                            pos_left.push(RowId::new(left_chunk_id, offset as ChunkOffset));
                            pos_right.push(RowId::NULL);
                        }
                    }
                }
                JoinType::Semi => {
                    for (offset, matched) in left_matches.iter().enumerate() {
                        if *matched {
                            pos_left.push(RowId::new(left_chunk_id, offset as ChunkOffset));
                        }
                    }
                }
                JoinType::Anti => {
                    for (offset, matched) in left_matches.iter().enumerate() {
                        if !matched {
                            pos_left.push(RowId::new(left_chunk_id, offset as ChunkOffset));
                        }
                    }
                }
                _ => {}
            }
        }

        // Unmatched rows on the right side, in chunk-then-offset order.
        // Unmatched left rows were already handled in the main loop.
        if join_type == JoinType::Full {
            for (right_chunk_id, chunk_matches) in right_matches.iter().enumerate() {
                for (offset, matched) in chunk_matches.iter().enumerate() {
                    if !matched {
                        pos_left.push(RowId::NULL);
                        pos_right.push(RowId::new(right_chunk_id as ChunkId, offset as ChunkOffset));
                    }
                }
            }
        }

        // Undo the normalization swap: output columns are always the original
        // left columns followed by the original right columns.
        let (left_positions, right_positions) = if flipped {
            (pos_right, pos_left)
        } else {
            (pos_left, pos_right)
        };

        let left_nullable = matches!(self.join_type, JoinType::Right | JoinType::Full);
        let right_nullable = matches!(self.join_type, JoinType::Left | JoinType::Full);

        let left_positions = Arc::new(left_positions);
        let mut segments = reference_output_segments(&left_input, &left_positions)?;
        let mut fields: Vec<Field> = left_input
            .schema()
            .fields
            .iter()
            .cloned()
            .map(|mut field| {
                field.nullable |= left_nullable;
                field
            })
            .collect();

        // Semi and anti joins emit the left columns only.
        if emit_pairs {
            let right_positions = Arc::new(right_positions);
            segments.extend(reference_output_segments(&right_input, &right_positions)?);
            fields.extend(right_input.schema().fields.iter().cloned().map(|mut field| {
                field.nullable |= right_nullable;
                field
            }));
        }

        let output = Table::try_new(
            Schema::new(fields),
            TableType::References,
            DEFAULT_MAX_CHUNK_SIZE,
        )?;
        output.append_chunk(Chunk::try_new(segments)?)?;
        Ok(Arc::new(output))
    }
}

impl Explainable for NestedLoopJoin {
    fn explain_entry(&self, _conf: ExplainConfig) -> ExplainEntry {
        ExplainEntry::new("NestedLoopJoin")
            .with_value("join_type", self.join_type)
            .with_value("left_column", self.column_ids.0)
            .with_value("right_column", self.column_ids.1)
            .with_value("op", self.op)
    }
}

struct JoinParams<'a> {
    pos_left: &'a mut PositionList,
    pos_right: &'a mut PositionList,
    left_matches: &'a mut [bool],
    right_matches: &'a mut [bool],
    track_left: bool,
    track_right: bool,
    emit_pairs: bool,
}

fn process_match(left_row: RowId, right_row: RowId, params: &mut JoinParams) {
    if params.emit_pairs {
        params.pos_left.push(left_row);
        params.pos_right.push(right_row);
    }
    if params.track_left {
        params.left_matches[left_row.chunk_offset as usize] = true;
    }
    if params.track_right {
        params.right_matches[right_row.chunk_offset as usize] = true;
    }
}

/// Join one pair of segments.
///
/// When both sides share the data type and the encoding, the inner loop runs
/// fully typed with the comparator selected once (the fast path). Everything
/// else falls back to materialized scalars compared under the coercion rules;
/// the output of both paths is identical.
fn join_segments(
    left: &Segment,
    right: &Segment,
    left_chunk_id: ChunkId,
    right_chunk_id: ChunkId,
    op: ComparisonOperator,
    params: &mut JoinParams,
) -> Result<()> {
    if left.data_type() == right.data_type() {
        match (left, right) {
            (Segment::Value(l), Segment::Value(r)) => {
                return join_value_segments(l, r, left_chunk_id, right_chunk_id, op, params)
            }
            (Segment::Dictionary(l), Segment::Dictionary(r)) => {
                return join_dictionary_segments(l, r, left_chunk_id, right_chunk_id, op, params)
            }
            _ => {}
        }
    }

    // Slow path: scalar comparison with numeric coercion. Incompatible
    // string/non-string pairings were rejected from the schemas already.
    let left_values = materialize(left)?;
    let right_values = materialize(right)?;
    for (left_offset, left_value) in left_values.iter().enumerate() {
        if left_value.is_null() {
            continue;
        }
        for (right_offset, right_value) in right_values.iter().enumerate() {
            if right_value.is_null() {
                continue;
            }
            if op.matches(left_value.try_compare(right_value)?) {
                process_match(
                    RowId::new(left_chunk_id, left_offset as ChunkOffset),
                    RowId::new(right_chunk_id, right_offset as ChunkOffset),
                    params,
                );
            }
        }
    }
    Ok(())
}

fn materialize(segment: &Segment) -> Result<Vec<ScalarValue>> {
    (0..segment.len() as ChunkOffset)
        .map(|offset| segment.scalar_at(offset).map_err(Into::into))
        .collect()
}

fn join_value_segments(
    left: &ValueSegment,
    right: &ValueSegment,
    left_chunk_id: ChunkId,
    right_chunk_id: ChunkId,
    op: ComparisonOperator,
    params: &mut JoinParams,
) -> Result<()> {
    use ValueSegment::*;

    match (left, right) {
        (Int32(l), Int32(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Int64(l), Int64(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Float32(l), Float32(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Float64(l), Float64(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Utf8(l), Utf8(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        _ => unreachable!("segment types verified by caller"),
    }
    Ok(())
}

fn join_dictionary_segments(
    left: &DictionarySegment,
    right: &DictionarySegment,
    left_chunk_id: ChunkId,
    right_chunk_id: ChunkId,
    op: ComparisonOperator,
    params: &mut JoinParams,
) -> Result<()> {
    use DictionarySegment::*;

    match (left, right) {
        (Int32(l), Int32(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Int64(l), Int64(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Float32(l), Float32(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Float64(l), Float64(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        (Utf8(l), Utf8(r)) => join_with_op(
            || l.positions(None),
            || r.positions(None),
            left_chunk_id,
            right_chunk_id,
            op,
            params,
        ),
        _ => unreachable!("segment types verified by caller"),
    }
    Ok(())
}

/// Specialize the inner loop on the comparison operator so it inlines.
fn join_with_op<'a, T, L, R, LF, RF>(
    left: LF,
    right: RF,
    left_chunk_id: ChunkId,
    right_chunk_id: ChunkId,
    op: ComparisonOperator,
    params: &mut JoinParams,
) where
    T: NativeType,
    LF: Fn() -> L,
    RF: Fn() -> R,
    L: Iterator<Item = SegmentPosition<'a, T>>,
    R: Iterator<Item = SegmentPosition<'a, T>>,
{
    match op {
        ComparisonOperator::Eq => {
            join_loop(left(), right, |a, b| a == b, left_chunk_id, right_chunk_id, params)
        }
        ComparisonOperator::NotEq => {
            join_loop(left(), right, |a, b| a != b, left_chunk_id, right_chunk_id, params)
        }
        ComparisonOperator::Lt => {
            join_loop(left(), right, |a, b| a < b, left_chunk_id, right_chunk_id, params)
        }
        ComparisonOperator::LtEq => {
            join_loop(left(), right, |a, b| a <= b, left_chunk_id, right_chunk_id, params)
        }
        ComparisonOperator::Gt => {
            join_loop(left(), right, |a, b| a > b, left_chunk_id, right_chunk_id, params)
        }
        ComparisonOperator::GtEq => {
            join_loop(left(), right, |a, b| a >= b, left_chunk_id, right_chunk_id, params)
        }
    }
}

/// The nested loops. Rows with a NULL on either side never match.
fn join_loop<'a, T, L, R, RF, C>(
    left: L,
    right: RF,
    compare: C,
    left_chunk_id: ChunkId,
    right_chunk_id: ChunkId,
    params: &mut JoinParams,
) where
    T: NativeType,
    L: Iterator<Item = SegmentPosition<'a, T>>,
    RF: Fn() -> R,
    R: Iterator<Item = SegmentPosition<'a, T>>,
    C: Fn(&T, &T) -> bool,
{
    for left_position in left {
        let left_value = match left_position.value() {
            Some(value) => value,
            None => continue,
        };
        for right_position in right() {
            let right_value = match right_position.value() {
                Some(value) => value,
                None => continue,
            };
            if compare(left_value, right_value) {
                process_match(
                    RowId::new(left_chunk_id, left_position.chunk_offset()),
                    RowId::new(right_chunk_id, right_position.chunk_offset()),
                    params,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{collect_column, int_table, join, row_ids_at};

    #[test]
    fn inner_join_on_equality() {
        let left = int_table([Some(1), Some(2), Some(3)]);
        let right = int_table([Some(2), Some(3), Some(4)]);

        let result = join(left, right, JoinType::Inner, ComparisonOperator::Eq).unwrap();

        assert_eq!(
            vec![RowId::new(0, 1), RowId::new(0, 2)],
            row_ids_at(&result, 0)
        );
        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(0, 1)],
            row_ids_at(&result, 1)
        );
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(3)],
            collect_column(&result, 0)
        );
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(3)],
            collect_column(&result, 1)
        );
    }

    #[test]
    fn left_join_pads_unmatched_rows() {
        let left = int_table([Some(1), Some(2)]);
        let right = int_table([Some(3)]);

        let result = join(left, right, JoinType::Left, ComparisonOperator::Eq).unwrap();

        assert_eq!(
            vec![RowId::new(0, 0), RowId::new(0, 1)],
            row_ids_at(&result, 0)
        );
        assert_eq!(vec![RowId::NULL, RowId::NULL], row_ids_at(&result, 1));
        assert_eq!(
            vec![ScalarValue::Null, ScalarValue::Null],
            collect_column(&result, 1)
        );
        // The padded side's column is nullable in the output.
        assert!(result.schema().fields[1].nullable);
    }

    #[test]
    fn right_join_normalizes_to_left() {
        let left = int_table([Some(1), Some(2)]);
        let right = int_table([Some(2), Some(5)]);

        let result = join(
            left.clone(),
            right.clone(),
            JoinType::Right,
            ComparisonOperator::Eq,
        )
        .unwrap();

        // Row order follows the (swapped) outer side; columns stay in
        // left-then-right order.
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::Null],
            collect_column(&result, 0)
        );
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(5)],
            collect_column(&result, 1)
        );
        assert!(result.schema().fields[0].nullable);
    }

    #[test]
    fn right_join_with_asymmetric_comparison() {
        let left = int_table([Some(1), Some(4)]);
        let right = int_table([Some(2)]);

        // left.a < right.b only holds for the pair (1, 2).
        let result = join(left, right, JoinType::Right, ComparisonOperator::Lt).unwrap();

        assert_eq!(vec![ScalarValue::from(1)], collect_column(&result, 0));
        assert_eq!(vec![ScalarValue::from(2)], collect_column(&result, 1));
    }

    #[test]
    fn full_join_pads_both_sides() {
        let left = int_table([Some(1), Some(2)]);
        let right = int_table([Some(2), Some(3)]);

        let result = join(left, right, JoinType::Full, ComparisonOperator::Eq).unwrap();

        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(1), ScalarValue::Null],
            collect_column(&result, 0)
        );
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::Null, ScalarValue::from(3)],
            collect_column(&result, 1)
        );
    }

    #[test]
    fn semi_and_anti_join_emit_left_rows_once() {
        let left = int_table([Some(1), Some(2), Some(3)]);
        let right = int_table([Some(2), Some(2), Some(3)]);

        let semi = join(
            left.clone(),
            right.clone(),
            JoinType::Semi,
            ComparisonOperator::Eq,
        )
        .unwrap();
        assert_eq!(1, semi.column_count());
        assert_eq!(
            vec![ScalarValue::from(2), ScalarValue::from(3)],
            collect_column(&semi, 0)
        );

        let anti = join(left, right, JoinType::Anti, ComparisonOperator::Eq).unwrap();
        assert_eq!(vec![ScalarValue::from(1)], collect_column(&anti, 0));
    }

    #[test]
    fn nulls_never_join() {
        let left = int_table([Some(1), None]);
        let right = int_table([None, Some(1)]);

        let result = join(left, right, JoinType::Inner, ComparisonOperator::Eq).unwrap();

        assert_eq!(vec![ScalarValue::from(1)], collect_column(&result, 0));
        assert_eq!(vec![ScalarValue::from(1)], collect_column(&result, 1));
    }

    #[test]
    fn dictionary_inputs_take_the_fast_path_with_equal_results() {
        let plain_left = int_table([Some(1), Some(2), None, Some(3)]);
        let plain_right = int_table([Some(3), Some(1), Some(1)]);
        let encoded_left = int_table([Some(1), Some(2), None, Some(3)]);
        let encoded_right = int_table([Some(3), Some(1), Some(1)]);
        encoded_left.encode_chunk(0).unwrap();
        encoded_right.encode_chunk(0).unwrap();

        let from_plain = join(
            plain_left,
            plain_right,
            JoinType::Inner,
            ComparisonOperator::Eq,
        )
        .unwrap();
        let from_encoded = join(
            encoded_left,
            encoded_right,
            JoinType::Inner,
            ComparisonOperator::Eq,
        )
        .unwrap();

        assert_eq!(row_ids_at(&from_plain, 0), row_ids_at(&from_encoded, 0));
        assert_eq!(row_ids_at(&from_plain, 1), row_ids_at(&from_encoded, 1));
    }

    #[test]
    fn string_with_numeric_join_column_is_fatal() {
        use sylvite_storage::field::{Field, Schema};

        let left = int_table([Some(1)]);
        let right = Arc::new(Table::new_data(Schema::new([Field::new(
            "s",
            DataType::Utf8,
            false,
        )])));
        right.append(vec![ScalarValue::from("1")]).unwrap();

        join(left, right, JoinType::Inner, ComparisonOperator::Eq).unwrap_err();
    }

    #[test]
    fn mixed_numeric_types_use_the_slow_path() {
        use sylvite_storage::field::{Field, Schema};

        let left = int_table([Some(1), Some(2)]);
        let right = Arc::new(Table::new_data(Schema::new([Field::new(
            "b",
            DataType::Int64,
            false,
        )])));
        right.append(vec![ScalarValue::from(2i64)]).unwrap();

        let result = join(left, right, JoinType::Inner, ComparisonOperator::Eq).unwrap();
        assert_eq!(vec![ScalarValue::from(2)], collect_column(&result, 0));
        assert_eq!(vec![ScalarValue::from(2i64)], collect_column(&result, 1));
    }
}

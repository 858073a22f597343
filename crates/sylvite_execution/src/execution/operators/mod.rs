pub mod nested_loop_join;
pub mod table_scan;
pub mod table_source;

use std::fmt::Debug;
use std::sync::Arc;

use sylvite_storage::errors::StorageError;
use sylvite_storage::rows::{PositionList, RowId};
use sylvite_storage::segment::{ReferenceSegment, Segment};
use sylvite_storage::table::{Table, TableType};

use super::ExecutionContext;
use crate::errors::Result;
use crate::explain::Explainable;

/// A node in a physical plan.
///
/// Operators own their inputs and pull them on demand; `execute` returns a
/// complete result table or fails. Scans and joins produce reference tables
/// whose segments point into the data tables at the leaves.
pub trait PhysicalOperator: Debug + Explainable + Send + Sync {
    fn execute(&self, ctx: &ExecutionContext) -> Result<Arc<Table>>;
}

/// Build one reference segment per column of `input`, all sharing
/// `positions`.
///
/// When the input is itself a reference table, each column's position list is
/// chased one level so the emitted row ids point at the ultimate data table;
/// reference chains never grow across operators. When the input is a
/// reference table without chunks there is nothing to deduce the referenced
/// table from; the position list holds only null row ids then, so a dummy
/// data table serves as the referent.
pub(crate) fn reference_output_segments(
    input: &Arc<Table>,
    positions: &Arc<PositionList>,
) -> Result<Vec<Arc<Segment>>> {
    let mut segments = Vec::with_capacity(input.column_count());

    match input.table_type() {
        TableType::Data => {
            for column_id in 0..input.column_count() {
                segments.push(Arc::new(Segment::Reference(ReferenceSegment::new(
                    input.clone(),
                    column_id,
                    positions.clone(),
                )?)));
            }
        }
        TableType::References if input.chunk_count() == 0 => {
            let dummy = Table::create_dummy(input.schema().clone());
            for column_id in 0..input.column_count() {
                segments.push(Arc::new(Segment::Reference(ReferenceSegment::new(
                    dummy.clone(),
                    column_id,
                    positions.clone(),
                )?)));
            }
        }
        TableType::References => {
            let chunks = input.chunks();
            for column_id in 0..input.column_count() {
                let mut chased = PositionList::with_capacity(positions.len());
                for row_id in positions.iter() {
                    if row_id.is_null() {
                        chased.push(RowId::NULL);
                        continue;
                    }
                    let segment = chunks[row_id.chunk_id as usize].segment(column_id)?;
                    let reference = as_reference(segment)?;
                    chased.push(
                        reference
                            .positions()
                            .get(row_id.chunk_offset as usize)
                            .ok_or(StorageError::OffsetOutOfBounds {
                                offset: row_id.chunk_offset,
                                len: reference.positions().len(),
                            })?,
                    );
                }

                let first = as_reference(chunks[0].segment(column_id)?)?;
                segments.push(Arc::new(Segment::Reference(ReferenceSegment::new(
                    first.referenced_table().clone(),
                    first.referenced_column_id(),
                    Arc::new(chased),
                )?)));
            }
        }
    }

    Ok(segments)
}

fn as_reference(segment: &Segment) -> Result<&ReferenceSegment> {
    match segment {
        Segment::Reference(reference) => Ok(reference),
        _ => Err(StorageError::SegmentTypeMismatch(
            "expected a reference segment in a reference table".to_string(),
        )
        .into()),
    }
}

/// Assemble a single-chunk reference table over `input` from the positions an
/// operator matched.
pub(crate) fn reference_output_table(
    input: &Arc<Table>,
    positions: PositionList,
) -> Result<Arc<Table>> {
    use sylvite_storage::chunk::Chunk;
    use sylvite_storage::table::DEFAULT_MAX_CHUNK_SIZE;

    let positions = Arc::new(positions);
    let segments = reference_output_segments(input, &positions)?;
    let output = Table::try_new(
        input.schema().clone(),
        TableType::References,
        DEFAULT_MAX_CHUNK_SIZE,
    )?;
    output.append_chunk(Chunk::try_new(segments)?)?;
    Ok(Arc::new(output))
}

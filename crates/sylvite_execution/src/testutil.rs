//! Helpers for constructing small tables and running single operators in
//! tests.

use std::sync::Arc;

use sylvite_storage::datatype::DataType;
use sylvite_storage::field::{Field, Schema};
use sylvite_storage::rows::{ChunkOffset, ColumnId, RowId};
use sylvite_storage::scalar::ScalarValue;
use sylvite_storage::segment::Segment;
use sylvite_storage::table::Table;

use crate::errors::Result;
use crate::execution::operators::nested_loop_join::NestedLoopJoin;
use crate::execution::operators::table_scan::{ScanPredicate, TableScan};
use crate::execution::operators::table_source::TableSource;
use crate::execution::operators::PhysicalOperator;
use crate::execution::ExecutionContext;
use crate::expr::comparison_expr::ComparisonOperator;
use crate::logical::logical_join::JoinType;

/// Single nullable Int32 column named "a".
pub fn int_table(values: impl IntoIterator<Item = Option<i32>>) -> Arc<Table> {
    let table = Table::new_data(Schema::new([Field::new("a", DataType::Int32, true)]));
    for value in values {
        table.append(vec![ScalarValue::from(value)]).unwrap();
    }
    Arc::new(table)
}

/// Single nullable Utf8 column named "s".
pub fn utf8_table(values: impl IntoIterator<Item = Option<&'static str>>) -> Arc<Table> {
    let table = Table::new_data(Schema::new([Field::new("s", DataType::Utf8, true)]));
    for value in values {
        table.append(vec![ScalarValue::from(value)]).unwrap();
    }
    Arc::new(table)
}

pub fn scan(
    table: Arc<Table>,
    column_id: ColumnId,
    predicate: ScanPredicate,
) -> Result<Arc<Table>> {
    TableScan::new(Box::new(TableSource::new(table)), column_id, predicate)
        .execute(&ExecutionContext::new())
}

/// Join two tables on their first columns.
pub fn join(
    left: Arc<Table>,
    right: Arc<Table>,
    join_type: JoinType,
    op: ComparisonOperator,
) -> Result<Arc<Table>> {
    NestedLoopJoin::new(
        Box::new(TableSource::new(left)),
        Box::new(TableSource::new(right)),
        join_type,
        (0, 0),
        op,
    )
    .execute(&ExecutionContext::new())
}

/// The position list behind one column of a single-chunk reference table.
pub fn row_ids_at(table: &Arc<Table>, column_id: ColumnId) -> Vec<RowId> {
    let chunks = table.chunks();
    assert_eq!(1, chunks.len(), "expected a single-chunk result table");
    match chunks[0].segment(column_id).unwrap().as_ref() {
        Segment::Reference(reference) => reference.positions().iter().collect(),
        other => panic!("expected a reference segment, got {other:?}"),
    }
}

pub fn row_ids(table: &Arc<Table>) -> Vec<RowId> {
    row_ids_at(table, 0)
}

/// Materialize one column of a table in row order.
pub fn collect_column(table: &Arc<Table>, column_id: ColumnId) -> Vec<ScalarValue> {
    let mut values = Vec::new();
    for chunk in table.chunks() {
        let segment = chunk.segment(column_id).unwrap();
        for offset in 0..segment.len() as ChunkOffset {
            values.push(segment.scalar_at(offset).unwrap());
        }
    }
    values
}

use std::sync::Arc;

use crate::datatype::DataType;
use crate::errors::{Result, StorageError};
use crate::rows::{ChunkOffset, ColumnId, PositionList};
use crate::scalar::ScalarValue;
use crate::table::Table;

/// A segment that owns no data: it points into another table through a
/// position list. Operators use reference segments to represent intermediate
/// result sets without materializing values. Immutable once created.
#[derive(Debug, Clone)]
pub struct ReferenceSegment {
    referenced_table: Arc<Table>,
    referenced_column_id: ColumnId,
    positions: Arc<PositionList>,
    datatype: DataType,
}

impl ReferenceSegment {
    pub fn new(
        referenced_table: Arc<Table>,
        referenced_column_id: ColumnId,
        positions: Arc<PositionList>,
    ) -> Result<Self> {
        let datatype = referenced_table.data_type(referenced_column_id)?;
        Ok(ReferenceSegment {
            referenced_table,
            referenced_column_id,
            positions,
            datatype,
        })
    }

    pub fn referenced_table(&self) -> &Arc<Table> {
        &self.referenced_table
    }

    pub fn referenced_column_id(&self) -> ColumnId {
        self.referenced_column_id
    }

    pub fn positions(&self) -> &Arc<PositionList> {
        &self.positions
    }

    pub fn data_type(&self) -> DataType {
        self.datatype
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Chase the position at `offset` to the referenced table and read the
    /// value there. A null row id reads as NULL.
    pub fn scalar_at(&self, offset: ChunkOffset) -> Result<ScalarValue> {
        let row_id = self.positions.get(offset as usize).ok_or({
            StorageError::OffsetOutOfBounds {
                offset,
                len: self.positions.len(),
            }
        })?;
        if row_id.is_null() {
            return Ok(ScalarValue::Null);
        }

        let chunk = self.referenced_table.chunk(row_id.chunk_id)?;
        let segment = chunk.segment(self.referenced_column_id)?;
        segment.scalar_at(row_id.chunk_offset)
    }
}

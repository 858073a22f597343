use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::chunk::Chunk;
use crate::datatype::DataType;
use crate::errors::{Result, StorageError};
use crate::field::{Field, Schema};
use crate::rows::{ChunkId, ColumnId};
use crate::scalar::ScalarValue;
use crate::segment::{DictionarySegment, Segment};

pub const DEFAULT_MAX_CHUNK_SIZE: usize = 4096;

/// Whether a table owns its data or references another table's.
///
/// A table either consists entirely of data segments (value or dictionary) or
/// entirely of reference segments; mixing is forbidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableType {
    Data,
    References,
}

/// An ordered list of chunks sharing one schema.
///
/// Appends are serialized by a table-level lock and fill the last chunk until
/// it reaches `max_chunk_size`, then roll over to a fresh one. Readers take a
/// snapshot of the chunk list; the in-flight chunk is copied on write when a
/// reader still holds it, so published snapshots never change underneath a
/// reader.
#[derive(Debug)]
pub struct Table {
    schema: Schema,
    table_type: TableType,
    max_chunk_size: usize,
    chunks: RwLock<Vec<Arc<Chunk>>>,
    append_lock: Mutex<()>,
}

impl Table {
    pub fn try_new(
        schema: Schema,
        table_type: TableType,
        max_chunk_size: usize,
    ) -> Result<Self> {
        if max_chunk_size == 0 {
            return Err(StorageError::TypeMismatch(
                "table must have a chunk size greater than 0".to_string(),
            ));
        }
        Ok(Table {
            schema,
            table_type,
            max_chunk_size,
            chunks: RwLock::new(Vec::new()),
            append_lock: Mutex::new(()),
        })
    }

    pub fn new_data(schema: Schema) -> Self {
        Self::try_new(schema, TableType::Data, DEFAULT_MAX_CHUNK_SIZE)
            .expect("default chunk size is non-zero")
    }

    /// An empty data table used as a placeholder referent when an operator
    /// has to emit reference segments over an input without chunks.
    pub fn create_dummy(schema: Schema) -> Arc<Self> {
        Arc::new(Self::new_data(schema))
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn table_type(&self) -> TableType {
        self.table_type
    }

    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    pub fn column_count(&self) -> usize {
        self.schema.fields.len()
    }

    pub fn field(&self, column_id: ColumnId) -> Result<&Field> {
        self.schema
            .fields
            .get(column_id)
            .ok_or(StorageError::ColumnIdOutOfRange {
                column_id,
                column_count: self.schema.fields.len(),
            })
    }

    pub fn data_type(&self, column_id: ColumnId) -> Result<DataType> {
        Ok(self.field(column_id)?.datatype)
    }

    pub fn column_id_by_name(&self, name: &str) -> Result<ColumnId> {
        self.schema
            .fields
            .iter()
            .position(|field| field.name == name)
            .ok_or_else(|| StorageError::UnknownColumn(name.to_string()))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.schema
            .fields
            .iter()
            .map(|field| field.name.clone())
            .collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.read().len()
    }

    /// Snapshot of the chunk list. Chunks already published here are never
    /// mutated in place.
    pub fn chunks(&self) -> Vec<Arc<Chunk>> {
        self.chunks.read().clone()
    }

    pub fn chunk(&self, chunk_id: ChunkId) -> Result<Arc<Chunk>> {
        let chunks = self.chunks.read();
        chunks
            .get(chunk_id as usize)
            .cloned()
            .ok_or(StorageError::ChunkIdOutOfRange {
                chunk_id,
                chunk_count: chunks.len(),
            })
    }

    pub fn row_count(&self) -> usize {
        self.chunks.read().iter().map(|chunk| chunk.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Append a row to the table. Only data tables accept appends; the row's
    /// scalars must match the schema's types exactly.
    pub fn append(&self, row: Vec<ScalarValue>) -> Result<()> {
        if self.table_type != TableType::Data {
            return Err(StorageError::SegmentTypeMismatch(
                "cannot append to a reference table".to_string(),
            ));
        }
        if row.len() != self.column_count() {
            return Err(StorageError::TypeMismatch(format!(
                "row has {} values, table has {} columns",
                row.len(),
                self.column_count()
            )));
        }
        // Validate the whole row up front so a failed append never leaves a
        // torn row behind.
        for (value, field) in row.iter().zip(&self.schema.fields) {
            if value.is_null() {
                if !field.nullable {
                    return Err(StorageError::TypeMismatch(format!(
                        "NULL value for non-nullable column '{}'",
                        field.name
                    )));
                }
            } else if value.datatype() != Some(field.datatype) {
                return Err(StorageError::TypeMismatch(format!(
                    "cannot append {} to column '{}' of type {}",
                    value, field.name, field.datatype
                )));
            }
        }

        let _guard = self.append_lock.lock();
        let mut chunks = self.chunks.write();

        let needs_new_chunk = match chunks.last() {
            Some(chunk) => chunk.len() >= self.max_chunk_size || !chunk.is_mutable(),
            None => true,
        };
        if needs_new_chunk {
            trace!(chunk_id = chunks.len(), "starting new chunk");
            chunks.push(Arc::new(Chunk::with_value_segments(&self.schema)));
        }

        let chunk = chunks.last_mut().expect("chunk was just ensured");
        // Copy on write: if a reader still holds this chunk, it keeps its
        // snapshot and the append goes to a fresh copy.
        Arc::make_mut(chunk).append_row(&row)
    }

    /// Append a complete chunk, e.g. an operator's output. The chunk's
    /// segment kinds must agree with the table type and its segment types
    /// with the schema.
    pub fn append_chunk(&self, chunk: Chunk) -> Result<()> {
        if chunk.column_count() != self.column_count() {
            return Err(StorageError::TypeMismatch(format!(
                "chunk has {} columns, table has {}",
                chunk.column_count(),
                self.column_count()
            )));
        }
        for (segment, field) in chunk.segments().iter().zip(&self.schema.fields) {
            let kind_ok = match self.table_type {
                TableType::Data => !segment.is_reference(),
                TableType::References => segment.is_reference(),
            };
            if !kind_ok {
                return Err(StorageError::SegmentTypeMismatch(format!(
                    "segment kind not allowed in a {:?} table",
                    self.table_type
                )));
            }
            if segment.data_type() != field.datatype {
                return Err(StorageError::TypeMismatch(format!(
                    "segment of type {} for column '{}' of type {}",
                    segment.data_type(),
                    field.name,
                    field.datatype
                )));
            }
        }

        let _guard = self.append_lock.lock();
        self.chunks.write().push(Arc::new(chunk));
        Ok(())
    }

    /// Dictionary-encode all segments of a chunk, replacing it. The chunk no
    /// longer accepts appends afterwards; a subsequent `append` rolls over to
    /// a new chunk.
    pub fn encode_chunk(&self, chunk_id: ChunkId) -> Result<()> {
        let _guard = self.append_lock.lock();

        let encoded = {
            let chunks = self.chunks.read();
            let chunk = chunks
                .get(chunk_id as usize)
                .ok_or(StorageError::ChunkIdOutOfRange {
                    chunk_id,
                    chunk_count: chunks.len(),
                })?;

            let segments = chunk
                .segments()
                .iter()
                .map(|segment| match segment.as_ref() {
                    Segment::Value(s) => Ok(Arc::new(Segment::Dictionary(
                        DictionarySegment::encode(s),
                    ))),
                    Segment::Dictionary(s) => {
                        Ok(Arc::new(Segment::Dictionary(s.clone())))
                    }
                    Segment::Reference(_) => Err(StorageError::SegmentTypeMismatch(
                        "cannot dictionary-encode a reference segment".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Chunk::try_new(segments)?
        };

        trace!(chunk_id, "dictionary-encoded chunk");
        self.chunks.write()[chunk_id as usize] = Arc::new(encoded);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;

    fn int_schema() -> Schema {
        Schema::new([Field::new("a", DataType::Int32, true)])
    }

    fn int_table(max_chunk_size: usize) -> Table {
        Table::try_new(int_schema(), TableType::Data, max_chunk_size).unwrap()
    }

    #[test]
    fn append_rolls_over_chunks() {
        let table = int_table(2);
        for v in 0..5 {
            table.append(vec![ScalarValue::from(v)]).unwrap();
        }

        assert_eq!(3, table.chunk_count());
        assert_eq!(5, table.row_count());
        let chunks = table.chunks();
        assert_eq!(2, chunks[0].len());
        assert_eq!(2, chunks[1].len());
        // Only the last chunk is partially filled.
        assert_eq!(1, chunks[2].len());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let table = int_table(4);
        table.append(vec![ScalarValue::from(1)]).unwrap();

        let snapshot = table.chunks();
        table.append(vec![ScalarValue::from(2)]).unwrap();

        assert_eq!(1, snapshot[0].len());
        assert_eq!(2, table.chunks()[0].len());
    }

    #[test]
    fn append_after_encode_starts_new_chunk() {
        let table = int_table(4);
        table.append(vec![ScalarValue::from(1)]).unwrap();
        table.encode_chunk(0).unwrap();

        table.append(vec![ScalarValue::from(2)]).unwrap();
        assert_eq!(2, table.chunk_count());
    }

    #[test]
    fn append_checks_types() {
        let table = int_table(4);
        table.append(vec![ScalarValue::from("x")]).unwrap_err();
        table.append(vec![ScalarValue::from(1i64)]).unwrap_err();
        table.append(vec![ScalarValue::Null]).unwrap();
    }

    #[test]
    fn unknown_column_name() {
        let table = int_table(4);
        assert_eq!(0, table.column_id_by_name("a").unwrap());
        table.column_id_by_name("b").unwrap_err();
    }

    #[test]
    fn zero_chunk_size_rejected() {
        Table::try_new(int_schema(), TableType::Data, 0).unwrap_err();
    }
}

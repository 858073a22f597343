use std::sync::Arc;

use crate::errors::{Result, StorageError};
use crate::field::Schema;
use crate::rows::ColumnId;
use crate::scalar::ScalarValue;
use crate::segment::{Segment, ValueSegment};

/// A horizontal partition of a table: one segment per column, all of equal
/// length.
#[derive(Debug, Clone)]
pub struct Chunk {
    segments: Vec<Arc<Segment>>,
}

impl Chunk {
    pub fn try_new(segments: Vec<Arc<Segment>>) -> Result<Self> {
        let expected = segments.first().map(|s| s.len()).unwrap_or(0);
        for segment in &segments {
            if segment.len() != expected {
                return Err(StorageError::SegmentLengthMismatch {
                    have: segment.len(),
                    expected,
                });
            }
        }
        Ok(Chunk { segments })
    }

    /// A fresh, empty chunk of value segments matching the schema. Used as
    /// the in-flight chunk of a data table.
    pub fn with_value_segments(schema: &Schema) -> Self {
        let segments = schema
            .fields
            .iter()
            .map(|field| {
                Arc::new(Segment::Value(ValueSegment::with_type(
                    field.datatype,
                    field.nullable,
                )))
            })
            .collect();
        Chunk { segments }
    }

    /// Number of rows in the chunk.
    pub fn len(&self) -> usize {
        self.segments.first().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, column_id: ColumnId) -> Result<&Arc<Segment>> {
        self.segments
            .get(column_id)
            .ok_or(StorageError::ColumnIdOutOfRange {
                column_id,
                column_count: self.segments.len(),
            })
    }

    pub fn segments(&self) -> &[Arc<Segment>] {
        &self.segments
    }

    /// Whether all segments are value segments, i.e. the chunk can still
    /// receive appends.
    pub fn is_mutable(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s.as_ref(), Segment::Value(_)))
    }

    pub(crate) fn append_row(&mut self, row: &[ScalarValue]) -> Result<()> {
        if row.len() != self.segments.len() {
            return Err(StorageError::TypeMismatch(format!(
                "row has {} values, chunk has {} columns",
                row.len(),
                self.segments.len()
            )));
        }
        for (segment, value) in self.segments.iter_mut().zip(row) {
            match Arc::make_mut(segment) {
                Segment::Value(s) => s.push_scalar(value)?,
                other => {
                    return Err(StorageError::SegmentTypeMismatch(format!(
                        "cannot append into a {} segment",
                        if other.is_reference() {
                            "reference"
                        } else {
                            "dictionary"
                        }
                    )))
                }
            }
        }
        Ok(())
    }
}

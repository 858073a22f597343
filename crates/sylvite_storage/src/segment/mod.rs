pub mod dictionary;
pub mod reference;
pub mod value;

use crate::datatype::DataType;
use crate::errors::{Result, StorageError};
use crate::native::NativeType;
use crate::rows::ChunkOffset;
use crate::scalar::ScalarValue;

pub use dictionary::{DictionarySegment, ValueId, INVALID_VALUE_ID};
pub use reference::ReferenceSegment;
pub use value::ValueSegment;

/// One column's storage inside a chunk.
///
/// Value and dictionary segments own data; reference segments represent
/// intermediate results by row-id indirection into another table.
#[derive(Debug, Clone)]
pub enum Segment {
    Value(ValueSegment),
    Dictionary(DictionarySegment),
    Reference(ReferenceSegment),
}

impl Segment {
    pub fn len(&self) -> usize {
        match self {
            Self::Value(s) => s.len(),
            Self::Dictionary(s) => s.len(),
            Self::Reference(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Value(s) => s.data_type(),
            Self::Dictionary(s) => s.data_type(),
            Self::Reference(s) => s.data_type(),
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, Self::Reference(_))
    }

    /// Read a single value, chasing indirection for reference segments.
    pub fn scalar_at(&self, offset: ChunkOffset) -> Result<ScalarValue> {
        match self {
            Self::Value(s) => s.scalar_at(offset),
            Self::Dictionary(s) => s.scalar_at(offset),
            Self::Reference(s) => s.scalar_at(offset),
        }
    }
}

/// A single position yielded by segment iteration: the value (if any), and
/// the offset of the row within its chunk.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPosition<'a, T> {
    value: Option<&'a T>,
    chunk_offset: ChunkOffset,
}

impl<'a, T> SegmentPosition<'a, T> {
    pub fn new(value: Option<&'a T>, chunk_offset: ChunkOffset) -> Self {
        SegmentPosition {
            value,
            chunk_offset,
        }
    }

    pub fn value(&self) -> Option<&'a T> {
        self.value
    }

    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    pub fn chunk_offset(&self) -> ChunkOffset {
        self.chunk_offset
    }
}

/// Iterate a data segment with the segment encoding erased but the element
/// type kept.
///
/// This is the slow-path half of the iteration contract: callers that know
/// the concrete segment variant iterate it directly for a monomorphic inner
/// loop, everything else goes through the boxed iterator returned here. Both
/// produce identical positions.
pub type Positions<'a, T> = Box<dyn Iterator<Item = SegmentPosition<'a, T>> + 'a>;

pub fn typed_positions<'a, T: NativeType>(
    segment: &'a Segment,
    position_filter: Option<&'a [ChunkOffset]>,
) -> Result<Positions<'a, T>> {
    match segment {
        Segment::Value(s) => match T::value_segment(s) {
            Some(s) => Ok(Box::new(s.positions(position_filter)) as Positions<'a, T>),
            None => Err(type_mismatch::<T>(s.data_type())),
        },
        Segment::Dictionary(s) => match T::dictionary_segment(s) {
            Some(s) => Ok(Box::new(s.positions(position_filter)) as Positions<'a, T>),
            None => Err(type_mismatch::<T>(s.data_type())),
        },
        Segment::Reference(_) => Err(StorageError::SegmentTypeMismatch(
            "reference segments are resolved through their position list, not iterated".to_string(),
        )),
    }
}

fn type_mismatch<T: NativeType>(have: DataType) -> StorageError {
    StorageError::TypeMismatch(format!(
        "expected segment of type {}, have {}",
        T::DATATYPE,
        have
    ))
}

use crate::datatype::DataType;
use crate::errors::{Result, StorageError};
use crate::native::NativeType;
use crate::rows::ChunkOffset;
use crate::scalar::ScalarValue;
use crate::segment::SegmentPosition;

/// Unencoded column storage: a dense vector of values plus an optional
/// validity mask (true = valid). Mutable under append until the owning chunk
/// rolls over, immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValueSegment<T> {
    values: Vec<T>,
    validity: Option<Vec<bool>>,
}

impl<T: NativeType> TypedValueSegment<T> {
    pub fn new(nullable: bool) -> Self {
        TypedValueSegment {
            values: Vec::new(),
            validity: nullable.then(Vec::new),
        }
    }

    pub fn from_options(values: impl IntoIterator<Item = Option<T>>) -> Self
    where
        T: Default,
    {
        let mut segment = TypedValueSegment::new(true);
        for value in values {
            segment.push(value).expect("segment is nullable");
        }
        segment
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: Option<T>) -> Result<()>
    where
        T: Default,
    {
        match (value, &mut self.validity) {
            (Some(v), validity) => {
                self.values.push(v);
                if let Some(validity) = validity {
                    validity.push(true);
                }
            }
            (None, Some(validity)) => {
                self.values.push(T::default());
                validity.push(false);
            }
            (None, None) => {
                return Err(StorageError::TypeMismatch(
                    "NULL value for non-nullable column".to_string(),
                ))
            }
        }
        Ok(())
    }

    pub fn is_valid(&self, idx: usize) -> bool {
        match &self.validity {
            Some(validity) => validity.get(idx).copied().unwrap_or(false),
            None => idx < self.values.len(),
        }
    }

    /// Get a value, `None` if the row is NULL.
    pub fn get(&self, idx: usize) -> Option<&T> {
        self.is_valid(idx).then(|| &self.values[idx])
    }

    /// Iterate positions in storage order, optionally restricted to the given
    /// chunk offsets (in filter order).
    pub fn positions<'a>(
        &'a self,
        position_filter: Option<&'a [ChunkOffset]>,
    ) -> ValueSegmentIter<'a, T> {
        ValueSegmentIter {
            segment: self,
            position_filter,
            idx: 0,
        }
    }
}

#[derive(Debug)]
pub struct ValueSegmentIter<'a, T> {
    segment: &'a TypedValueSegment<T>,
    position_filter: Option<&'a [ChunkOffset]>,
    idx: usize,
}

impl<'a, T: NativeType> Iterator for ValueSegmentIter<'a, T> {
    type Item = SegmentPosition<'a, T>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = match self.position_filter {
            Some(filter) => *filter.get(self.idx)?,
            None => {
                if self.idx >= self.segment.len() {
                    return None;
                }
                self.idx as ChunkOffset
            }
        };
        self.idx += 1;
        Some(SegmentPosition::new(
            self.segment.get(offset as usize),
            offset,
        ))
    }
}

macro_rules! value_segment_dispatch {
    ($self:expr, $segment:pat => $body:expr) => {
        match $self {
            ValueSegment::Int32($segment) => $body,
            ValueSegment::Int64($segment) => $body,
            ValueSegment::Float32($segment) => $body,
            ValueSegment::Float64($segment) => $body,
            ValueSegment::Utf8($segment) => $body,
        }
    };
}

/// A value segment of any of the supported column types.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueSegment {
    Int32(TypedValueSegment<i32>),
    Int64(TypedValueSegment<i64>),
    Float32(TypedValueSegment<f32>),
    Float64(TypedValueSegment<f64>),
    Utf8(TypedValueSegment<String>),
}

impl ValueSegment {
    pub fn with_type(datatype: DataType, nullable: bool) -> Self {
        match datatype {
            DataType::Int32 => Self::Int32(TypedValueSegment::new(nullable)),
            DataType::Int64 => Self::Int64(TypedValueSegment::new(nullable)),
            DataType::Float32 => Self::Float32(TypedValueSegment::new(nullable)),
            DataType::Float64 => Self::Float64(TypedValueSegment::new(nullable)),
            DataType::Utf8 => Self::Utf8(TypedValueSegment::new(nullable)),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Self::Int32(_) => DataType::Int32,
            Self::Int64(_) => DataType::Int64,
            Self::Float32(_) => DataType::Float32,
            Self::Float64(_) => DataType::Float64,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    pub fn len(&self) -> usize {
        value_segment_dispatch!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a scalar. The scalar's type must match the segment's type
    /// exactly; `Null` requires a nullable segment.
    pub fn push_scalar(&mut self, value: &ScalarValue) -> Result<()> {
        fn push<T: NativeType + Default>(
            segment: &mut TypedValueSegment<T>,
            value: &ScalarValue,
        ) -> Result<()> {
            if value.is_null() {
                return segment.push(None);
            }
            match T::from_scalar(value) {
                Some(v) => segment.push(Some(v)),
                None => Err(StorageError::TypeMismatch(format!(
                    "cannot append {} to a {} column",
                    value,
                    T::DATATYPE
                ))),
            }
        }

        value_segment_dispatch!(self, s => push(s, value))
    }

    pub fn scalar_at(&self, offset: ChunkOffset) -> Result<ScalarValue> {
        let idx = offset as usize;
        if idx >= self.len() {
            return Err(StorageError::OffsetOutOfBounds {
                offset,
                len: self.len(),
            });
        }
        Ok(value_segment_dispatch!(self, s => {
            s.get(idx).map(|v| v.to_scalar()).unwrap_or(ScalarValue::Null)
        }))
    }
}

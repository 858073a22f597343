use std::cmp::Ordering;

use crate::datatype::DataType;
use crate::errors::{Result, StorageError};
use crate::native::NativeType;
use crate::rows::ChunkOffset;
use crate::scalar::ScalarValue;
use crate::segment::value::{TypedValueSegment, ValueSegment};
use crate::segment::SegmentPosition;

/// Index into a dictionary.
pub type ValueId = u32;

/// Sentinel returned by the bound searches when the probe value lies beyond
/// every dictionary entry.
pub const INVALID_VALUE_ID: ValueId = ValueId::MAX;

/// Dictionary-encoded column storage: each distinct value is stored once in a
/// sorted dictionary, rows hold small integer ids into it. NULL is encoded as
/// the id one past the dictionary (`unique_values_count`).
#[derive(Debug, Clone, PartialEq)]
pub struct TypedDictionarySegment<T> {
    dictionary: Vec<T>,
    attribute_vector: Vec<ValueId>,
}

impl<T: NativeType> TypedDictionarySegment<T> {
    /// Dictionary-encode a value segment.
    pub fn encode(values: &TypedValueSegment<T>) -> Self {
        let mut dictionary: Vec<T> = values
            .positions(None)
            .filter_map(|pos| pos.value().cloned())
            .collect();
        dictionary.sort_unstable_by(cmp_values);
        dictionary.dedup();

        let null_value_id = dictionary.len() as ValueId;
        let attribute_vector = values
            .positions(None)
            .map(|pos| match pos.value() {
                Some(v) => dictionary
                    .partition_point(|entry| cmp_values(entry, v) == Ordering::Less)
                    as ValueId,
                None => null_value_id,
            })
            .collect();

        TypedDictionarySegment {
            dictionary,
            attribute_vector,
        }
    }

    pub fn len(&self) -> usize {
        self.attribute_vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attribute_vector.is_empty()
    }

    pub fn unique_values_count(&self) -> usize {
        self.dictionary.len()
    }

    /// The id that encodes NULL in the attribute vector.
    pub fn null_value_id(&self) -> ValueId {
        self.dictionary.len() as ValueId
    }

    pub fn dictionary(&self) -> &[T] {
        &self.dictionary
    }

    pub fn attribute_vector(&self) -> &[ValueId] {
        &self.attribute_vector
    }

    /// Id of the first dictionary entry `>= value`, or [`INVALID_VALUE_ID`]
    /// if the value is greater than everything in the dictionary.
    pub fn lower_bound(&self, value: &T) -> ValueId {
        let idx = self
            .dictionary
            .partition_point(|entry| cmp_values(entry, value) == Ordering::Less);
        if idx == self.dictionary.len() {
            INVALID_VALUE_ID
        } else {
            idx as ValueId
        }
    }

    /// Id of the first dictionary entry `> value`, or [`INVALID_VALUE_ID`]
    /// if the value is greater than or equal to everything in the dictionary.
    pub fn upper_bound(&self, value: &T) -> ValueId {
        let idx = self
            .dictionary
            .partition_point(|entry| cmp_values(entry, value) != Ordering::Greater);
        if idx == self.dictionary.len() {
            INVALID_VALUE_ID
        } else {
            idx as ValueId
        }
    }

    /// Decode the value at a row, `None` if the row is NULL.
    pub fn get(&self, idx: usize) -> Option<&T> {
        let value_id = *self.attribute_vector.get(idx)?;
        self.dictionary.get(value_id as usize)
    }

    pub fn positions<'a>(
        &'a self,
        position_filter: Option<&'a [ChunkOffset]>,
    ) -> DictionarySegmentIter<'a, T> {
        DictionarySegmentIter {
            segment: self,
            position_filter,
            idx: 0,
        }
    }
}

fn cmp_values<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    a.partial_cmp(b).unwrap_or(Ordering::Equal)
}

/// Decoding iterator over a dictionary segment.
#[derive(Debug)]
pub struct DictionarySegmentIter<'a, T> {
    segment: &'a TypedDictionarySegment<T>,
    position_filter: Option<&'a [ChunkOffset]>,
    idx: usize,
}

impl<'a, T: NativeType> Iterator for DictionarySegmentIter<'a, T> {
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

macro_rules! dictionary_segment_dispatch {
    ($self:expr, $segment:pat => $body:expr) => {
        match $self {
            DictionarySegment::Int32($segment) => $body,
            DictionarySegment::Int64($segment) => $body,
            DictionarySegment::Float32($segment) => $body,
            DictionarySegment::Float64($segment) => $body,
            DictionarySegment::Utf8($segment) => $body,
        }
    };
}

/// A dictionary segment of any of the supported column types.
#[derive(Debug, Clone, PartialEq)]
pub enum DictionarySegment {
    Int32(TypedDictionarySegment<i32>),
    Int64(TypedDictionarySegment<i64>),
    Float32(TypedDictionarySegment<f32>),
    Float64(TypedDictionarySegment<f64>),
    Utf8(TypedDictionarySegment<String>),
}

impl DictionarySegment {
    pub fn encode(values: &ValueSegment) -> Self {
        match values {
            ValueSegment::Int32(s) => Self::Int32(TypedDictionarySegment::encode(s)),
            ValueSegment::Int64(s) => Self::Int64(TypedDictionarySegment::encode(s)),
            ValueSegment::Float32(s) => Self::Float32(TypedDictionarySegment::encode(s)),
            ValueSegment::Float64(s) => Self::Float64(TypedDictionarySegment::encode(s)),
            ValueSegment::Utf8(s) => Self::Utf8(TypedDictionarySegment::encode(s)),
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
        dictionary_segment_dispatch!(self, s => s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn unique_values_count(&self) -> usize {
        dictionary_segment_dispatch!(self, s => s.unique_values_count())
    }

    pub fn null_value_id(&self) -> ValueId {
        dictionary_segment_dispatch!(self, s => s.null_value_id())
    }

    pub fn attribute_vector(&self) -> &[ValueId] {
        dictionary_segment_dispatch!(self, s => s.attribute_vector())
    }

    /// See [`TypedDictionarySegment::lower_bound`]. The probe scalar must be
    /// of the segment's type.
    pub fn lower_bound(&self, value: &ScalarValue) -> Result<ValueId> {
        fn bound<T: NativeType>(
            segment: &TypedDictionarySegment<T>,
            value: &ScalarValue,
        ) -> Result<ValueId> {
            match T::from_scalar(value) {
                Some(v) => Ok(segment.lower_bound(&v)),
                None => Err(probe_type_mismatch::<T>(value)),
            }
        }
        dictionary_segment_dispatch!(self, s => bound(s, value))
    }

    /// See [`TypedDictionarySegment::upper_bound`]. The probe scalar must be
    /// of the segment's type.
    pub fn upper_bound(&self, value: &ScalarValue) -> Result<ValueId> {
        fn bound<T: NativeType>(
            segment: &TypedDictionarySegment<T>,
            value: &ScalarValue,
        ) -> Result<ValueId> {
            match T::from_scalar(value) {
                Some(v) => Ok(segment.upper_bound(&v)),
                None => Err(probe_type_mismatch::<T>(value)),
            }
        }
        dictionary_segment_dispatch!(self, s => bound(s, value))
    }

    pub fn scalar_at(&self, offset: ChunkOffset) -> Result<ScalarValue> {
        let idx = offset as usize;
        if idx >= self.len() {
            return Err(StorageError::OffsetOutOfBounds {
                offset,
                len: self.len(),
            });
        }
        Ok(dictionary_segment_dispatch!(self, s => {
            s.get(idx).map(|v| v.to_scalar()).unwrap_or(ScalarValue::Null)
        }))
    }
}

fn probe_type_mismatch<T: NativeType>(value: &ScalarValue) -> StorageError {
    StorageError::TypeMismatch(format!(
        "cannot probe a {} dictionary with {}",
        T::DATATYPE,
        value
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(values: impl IntoIterator<Item = Option<i32>>) -> TypedDictionarySegment<i32> {
        TypedDictionarySegment::encode(&TypedValueSegment::from_options(values))
    }

    #[test]
    fn encode_sorts_and_dedups() {
        let segment = segment([Some(3), Some(1), None, Some(3), Some(2)]);

        assert_eq!(&[1, 2, 3], segment.dictionary());
        assert_eq!(3, segment.unique_values_count());
        assert_eq!(3, segment.null_value_id());
        assert_eq!(&[2, 0, 3, 2, 1], segment.attribute_vector());
    }

    #[test]
    fn bounds() {
        let segment = segment([Some(1), Some(2), Some(4), Some(5)]);

        assert_eq!(0, segment.lower_bound(&0));
        assert_eq!(0, segment.lower_bound(&1));
        assert_eq!(1, segment.upper_bound(&1));
        assert_eq!(2, segment.lower_bound(&3));
        assert_eq!(2, segment.upper_bound(&3));
        assert_eq!(INVALID_VALUE_ID, segment.lower_bound(&6));
        assert_eq!(INVALID_VALUE_ID, segment.upper_bound(&5));
    }

    #[test]
    fn bounds_on_single_value_dictionary() {
        let segment = segment([Some(7), Some(7), Some(7)]);

        assert_eq!(1, segment.unique_values_count());
        assert_eq!(0, segment.lower_bound(&7));
        assert_eq!(INVALID_VALUE_ID, segment.upper_bound(&7));
        assert_eq!(INVALID_VALUE_ID, segment.lower_bound(&8));
    }

    #[test]
    fn decode_round_trip() {
        let segment = segment([Some(3), None, Some(1)]);

        let got: Vec<_> = segment
            .positions(None)
            .map(|pos| pos.value().copied())
            .collect();
        assert_eq!(vec![Some(3), None, Some(1)], got);
    }

    #[test]
    fn all_null_segment() {
        let segment = segment([None, None]);

        assert_eq!(0, segment.unique_values_count());
        assert_eq!(&[0, 0], segment.attribute_vector());
        assert_eq!(None, segment.get(0));
        assert_eq!(INVALID_VALUE_ID, segment.lower_bound(&1));
    }
}

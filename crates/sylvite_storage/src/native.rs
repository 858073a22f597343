use std::fmt::Debug;

use crate::datatype::DataType;
use crate::scalar::ScalarValue;
use crate::segment::dictionary::{DictionarySegment, TypedDictionarySegment};
use crate::segment::value::{TypedValueSegment, ValueSegment};

/// Native Rust types a column can be stored as.
///
/// This is the seam between the type-erased segment enums and monomorphic
/// scan/join loops: resolving a column's [`DataType`] to its implementation of
/// this trait recovers typed access to the concrete segment.
pub trait NativeType:
    Debug + Clone + PartialEq + PartialOrd + Send + Sync + 'static
{
    const DATATYPE: DataType;

    /// Convert from a scalar of exactly this type. Returns `None` for any
    /// other variant, including `Null`.
    fn from_scalar(scalar: &ScalarValue) -> Option<Self>;

    fn to_scalar(&self) -> ScalarValue;

    fn value_segment(segment: &ValueSegment) -> Option<&TypedValueSegment<Self>>;

    fn dictionary_segment(segment: &DictionarySegment) -> Option<&TypedDictionarySegment<Self>>;
}

macro_rules! impl_native_type {
    ($native:ty, $variant:ident) => {
        impl NativeType for $native {
            const DATATYPE: DataType = DataType::$variant;

            fn from_scalar(scalar: &ScalarValue) -> Option<Self> {
                match scalar {
                    ScalarValue::$variant(v) => Some(v.clone()),
                    _ => None,
                }
            }

            fn to_scalar(&self) -> ScalarValue {
                ScalarValue::$variant(self.clone())
            }

            fn value_segment(segment: &ValueSegment) -> Option<&TypedValueSegment<Self>> {
                match segment {
                    ValueSegment::$variant(s) => Some(s),
                    _ => None,
                }
            }

            fn dictionary_segment(
                segment: &DictionarySegment,
            ) -> Option<&TypedDictionarySegment<Self>> {
                match segment {
                    DictionarySegment::$variant(s) => Some(s),
                    _ => None,
                }
            }
        }
    };
}

impl_native_type!(i32, Int32);
impl_native_type!(i64, Int64);
impl_native_type!(f32, Float32);
impl_native_type!(f64, Float64);
impl_native_type!(String, Utf8);

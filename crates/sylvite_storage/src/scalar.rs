use std::cmp::Ordering;
use std::fmt;

use crate::datatype::DataType;
use crate::errors::{Result, StorageError};

/// A single scalar value.
///
/// Comparisons between values of different numeric types go through the
/// implicit coercion rules in [`ScalarValue::try_compare`]. Anything compared
/// against `Null` yields no ordering, which downstream predicate evaluation
/// treats as "no match".
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,

    /// Signed 32bit int.
    Int32(i32),

    /// Signed 64bit int.
    Int64(i64),

    /// 32bit float.
    Float32(f32),

    /// 64bit float.
    Float64(f64),

    /// Utf-8 encoded string.
    Utf8(String),
}

impl ScalarValue {
    pub fn datatype(&self) -> Option<DataType> {
        match self {
            ScalarValue::Null => None,
            ScalarValue::Int32(_) => Some(DataType::Int32),
            ScalarValue::Int64(_) => Some(DataType::Int64),
            ScalarValue::Float32(_) => Some(DataType::Float32),
            ScalarValue::Float64(_) => Some(DataType::Float64),
            ScalarValue::Utf8(_) => Some(DataType::Utf8),
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Compare two values under the engine's coercion rules.
    ///
    /// Returns `None` when either side is `Null` (or a float comparison
    /// involves NaN); predicates treat that as false. Comparing a string with
    /// a non-string is a fatal type mismatch rather than a NULL result.
    pub fn try_compare(&self, other: &ScalarValue) -> Result<Option<Ordering>> {
        use ScalarValue::*;

        Ok(match (self, other) {
            (Null, _) | (_, Null) => None,
            (Utf8(a), Utf8(b)) => Some(a.cmp(b)),
            (Utf8(_), _) | (_, Utf8(_)) => {
                return Err(StorageError::TypeMismatch(format!(
                    "cannot compare {} with {}",
                    self, other
                )))
            }
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(x), Some(y)) => Some(x.cmp(&y)),
                // At least one side is a float, compare as f64. NaN produces
                // no ordering and therefore never matches.
                _ => a
                    .as_f64()
                    .zip(b.as_f64())
                    .and_then(|(x, y)| x.partial_cmp(&y)),
            },
        })
    }

    /// Cast a value to the given type without losing information.
    ///
    /// Returns `Ok(None)` when the value is numeric but not exactly
    /// representable in the target type (the caller falls back to coerced
    /// comparisons), and an error when the types are fundamentally
    /// incompatible (string vs. numeric).
    pub fn cast_to(&self, datatype: DataType) -> Result<Option<ScalarValue>> {
        use ScalarValue::*;

        if self.is_null() {
            return Ok(Some(Null));
        }
        if self.datatype() == Some(datatype) {
            return Ok(Some(self.clone()));
        }

        match (self, datatype) {
            (Null, _) => Ok(Some(Null)),
            (Utf8(_), _) | (_, DataType::Utf8) => Err(StorageError::TypeMismatch(format!(
                "cannot cast {} to {}",
                self, datatype
            ))),
            (value, DataType::Int32) => Ok(value
                .as_exact_i64()
                .and_then(|v| i32::try_from(v).ok())
                .map(Int32)),
            (value, DataType::Int64) => Ok(value.as_exact_i64().map(Int64)),
            (Float32(v), DataType::Float32) => Ok(Some(Float32(*v))),
            (Int32(v), DataType::Float32) => {
                let f = *v as f32;
                Ok((f as i32 == *v).then_some(Float32(f)))
            }
            (Int64(v), DataType::Float32) => {
                let f = *v as f32;
                Ok((f as i64 == *v).then_some(Float32(f)))
            }
            (Float64(v), DataType::Float32) => {
                let f = *v as f32;
                Ok((f64::from(f) == *v).then_some(Float32(f)))
            }
            (value, DataType::Float64) => {
                let v = match value {
                    Int32(v) => f64::from(*v),
                    Int64(v) => {
                        let f = *v as f64;
                        if f as i64 != *v {
                            return Ok(None);
                        }
                        f
                    }
                    Float32(v) => f64::from(*v),
                    _ => unreachable!("remaining variants handled above"),
                };
                Ok(Some(Float64(v)))
            }
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int32(v) => Some(i64::from(*v)),
            ScalarValue::Int64(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int32(v) => Some(f64::from(*v)),
            ScalarValue::Int64(v) => Some(*v as f64),
            ScalarValue::Float32(v) => Some(f64::from(*v)),
            ScalarValue::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer representation of the value if it has one exactly.
    fn as_exact_i64(&self) -> Option<i64> {
        match self {
            ScalarValue::Int32(v) => Some(i64::from(*v)),
            ScalarValue::Int64(v) => Some(*v),
            ScalarValue::Float32(v) => {
                let v = f64::from(*v);
                (v.fract() == 0.0 && v.is_finite() && v.abs() < 2f64.powi(63))
                    .then(|| v as i64)
            }
            ScalarValue::Float64(v) => {
                (v.fract() == 0.0 && v.is_finite() && v.abs() < 2f64.powi(63))
                    .then(|| *v as i64)
            }
            _ => None,
        }
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        ScalarValue::Int32(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        ScalarValue::Int64(value)
    }
}

impl From<f32> for ScalarValue {
    fn from(value: f32) -> Self {
        ScalarValue::Float32(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        ScalarValue::Float64(value)
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        ScalarValue::Utf8(value)
    }
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        ScalarValue::Utf8(value.to_string())
    }
}

impl<T> From<Option<T>> for ScalarValue
where
    T: Into<ScalarValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => ScalarValue::Null,
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => write!(f, "NULL"),
            ScalarValue::Int32(v) => write!(f, "{}", v),
            ScalarValue::Int64(v) => write!(f, "{}", v),
            ScalarValue::Float32(v) => write!(f, "{}", v),
            ScalarValue::Float64(v) => write!(f, "{}", v),
            ScalarValue::Utf8(v) => write!(f, "'{}'", v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_coerces_numerics() {
        let cases = [
            (ScalarValue::from(3), ScalarValue::from(4i64), Ordering::Less),
            (ScalarValue::from(4i64), ScalarValue::from(4), Ordering::Equal),
            (
                ScalarValue::from(2.5f64),
                ScalarValue::from(2),
                Ordering::Greater,
            ),
            (
                ScalarValue::from(1.5f32),
                ScalarValue::from(2.5f64),
                Ordering::Less,
            ),
        ];

        for (left, right, expected) in cases {
            let got = left.try_compare(&right).unwrap();
            assert_eq!(Some(expected), got, "{left} vs {right}");
        }
    }

    #[test]
    fn compare_null_yields_none() {
        assert_eq!(
            None,
            ScalarValue::Null.try_compare(&ScalarValue::from(1)).unwrap()
        );
        assert_eq!(
            None,
            ScalarValue::from("a").try_compare(&ScalarValue::Null).unwrap()
        );
    }

    #[test]
    fn compare_string_with_numeric_fails() {
        ScalarValue::from("a")
            .try_compare(&ScalarValue::from(1))
            .unwrap_err();
    }

    #[test]
    fn cast_lossless_or_none() {
        assert_eq!(
            Some(ScalarValue::Int32(5)),
            ScalarValue::from(5i64).cast_to(DataType::Int32).unwrap()
        );
        // Out of range for i32.
        assert_eq!(
            None,
            ScalarValue::from(5_000_000_000i64)
                .cast_to(DataType::Int32)
                .unwrap()
        );
        // Fractional value has no integer representation.
        assert_eq!(
            None,
            ScalarValue::from(2.5f64).cast_to(DataType::Int32).unwrap()
        );
        assert_eq!(
            Some(ScalarValue::Int64(2)),
            ScalarValue::from(2.0f64).cast_to(DataType::Int64).unwrap()
        );
        ScalarValue::from("a").cast_to(DataType::Int32).unwrap_err();
    }
}

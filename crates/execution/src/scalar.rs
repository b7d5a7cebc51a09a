//! Single-value representation used by aggregation, joins and text rendering.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, BooleanArray, BooleanBuilder, Float64Array,
    Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder,
};
use arrow::compute::kernels::cast::cast;
use arrow_schema::DataType;
use flowq_common::{FlowqError, Result};

/// One cell value.
///
/// Floats are stored as bits so values can be hashed and used as group or
/// join keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ScalarValue {
    /// Any integer type, widened.
    Int64(i64),
    /// Any float type, widened, stored as `f64::to_bits`.
    Float64Bits(u64),
    /// Character data.
    Utf8(String),
    /// Untyped bytes.
    Binary(Vec<u8>),
    /// Boolean.
    Boolean(bool),
    /// Missing value.
    Null,
}

impl ScalarValue {
    /// Float view of numeric values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Int64(x) => Some(*x as f64),
            ScalarValue::Float64Bits(x) => Some(f64::from_bits(*x)),
            _ => None,
        }
    }

    /// `true` for [`ScalarValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, ScalarValue::Null)
    }

    /// Approximate in-memory size of the value payload.
    pub fn estimated_bytes(&self) -> usize {
        match self {
            ScalarValue::Int64(_) | ScalarValue::Float64Bits(_) => 8,
            ScalarValue::Utf8(s) => s.len(),
            ScalarValue::Binary(b) => b.len(),
            ScalarValue::Boolean(_) => 1,
            ScalarValue::Null => 0,
        }
    }

    /// Ordering between two non-null values of the same kind.
    pub fn compare(&self, other: &ScalarValue) -> Result<Ordering> {
        match (self, other) {
            (ScalarValue::Int64(x), ScalarValue::Int64(y)) => Ok(x.cmp(y)),
            (ScalarValue::Float64Bits(x), ScalarValue::Float64Bits(y)) => {
                Ok(f64::from_bits(*x).total_cmp(&f64::from_bits(*y)))
            }
            (ScalarValue::Utf8(x), ScalarValue::Utf8(y)) => Ok(x.cmp(y)),
            (ScalarValue::Binary(x), ScalarValue::Binary(y)) => Ok(x.cmp(y)),
            (ScalarValue::Boolean(x), ScalarValue::Boolean(y)) => Ok(x.cmp(y)),
            _ => Err(FlowqError::Execution(
                "cannot compare values of different types".to_string(),
            )),
        }
    }
}

/// Tuple-field rendering: floats always keep a fractional part (`10.0`),
/// nulls render empty.
impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Int64(x) => write!(f, "{x}"),
            ScalarValue::Float64Bits(x) => write!(f, "{:?}", f64::from_bits(*x)),
            ScalarValue::Utf8(s) => f.write_str(s),
            ScalarValue::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
            ScalarValue::Boolean(b) => write!(f, "{b}"),
            ScalarValue::Null => Ok(()),
        }
    }
}

fn widened(array: &ArrayRef, to: &DataType) -> Result<ArrayRef> {
    cast(array, to).map_err(|e| FlowqError::Execution(format!("cast to {to:?} failed: {e}")))
}

/// Read the value at `row`.
pub fn scalar_from_array(array: &ArrayRef, row: usize) -> Result<ScalarValue> {
    if array.is_null(row) {
        return Ok(ScalarValue::Null);
    }
    match array.data_type() {
        DataType::Null => Ok(ScalarValue::Null),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let wide = widened(&array.slice(row, 1), &DataType::Int64)?;
            let a = wide
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| FlowqError::Execution("expected Int64Array".to_string()))?;
            Ok(ScalarValue::Int64(a.value(0)))
        }
        DataType::Float32 | DataType::Float64 => {
            let wide = widened(&array.slice(row, 1), &DataType::Float64)?;
            let a = wide
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| FlowqError::Execution("expected Float64Array".to_string()))?;
            Ok(ScalarValue::Float64Bits(a.value(0).to_bits()))
        }
        DataType::Utf8 => {
            let a = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| FlowqError::Execution("expected StringArray".to_string()))?;
            Ok(ScalarValue::Utf8(a.value(row).to_string()))
        }
        DataType::LargeUtf8 => {
            let narrow = widened(&array.slice(row, 1), &DataType::Utf8)?;
            scalar_from_array(&narrow, 0)
        }
        DataType::Binary => {
            let a = array
                .as_any()
                .downcast_ref::<BinaryArray>()
                .ok_or_else(|| FlowqError::Execution("expected BinaryArray".to_string()))?;
            Ok(ScalarValue::Binary(a.value(row).to_vec()))
        }
        DataType::LargeBinary => {
            let narrow = widened(&array.slice(row, 1), &DataType::Binary)?;
            scalar_from_array(&narrow, 0)
        }
        DataType::Boolean => {
            let a = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| FlowqError::Execution("expected BooleanArray".to_string()))?;
            Ok(ScalarValue::Boolean(a.value(row)))
        }
        other => Err(FlowqError::Unsupported(format!(
            "scalar type not supported yet: {other:?}"
        ))),
    }
}

/// Build an array of type `dt` from values.
///
/// Values are collected in their widened form and cast to `dt` afterwards,
/// so narrower integer and float types round-trip.
pub fn scalars_to_array(values: &[ScalarValue], dt: &DataType) -> Result<ArrayRef> {
    let mismatch = |kind: &str| {
        FlowqError::Execution(format!("type mismatch while building {kind} array"))
    };
    let built: ArrayRef = match dt {
        DataType::Null => arrow::array::new_null_array(&DataType::Null, values.len()),
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Int64(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch("Int64")),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Float32 | DataType::Float64 => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Float64Bits(x) => b.append_value(f64::from_bits(*x)),
                    ScalarValue::Int64(x) => b.append_value(*x as f64),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch("Float64")),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Utf8 | DataType::LargeUtf8 => {
            let mut b = StringBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v {
                    ScalarValue::Utf8(x) => b.append_value(x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch("Utf8")),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Binary | DataType::LargeBinary => {
            let mut b = BinaryBuilder::with_capacity(values.len(), values.len() * 8);
            for v in values {
                match v {
                    ScalarValue::Binary(x) => b.append_value(x),
                    ScalarValue::Null => b.append_null(),
                    other => b.append_value(other.to_string().as_bytes()),
                }
            }
            Arc::new(b.finish())
        }
        DataType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in values {
                match v {
                    ScalarValue::Boolean(x) => b.append_value(*x),
                    ScalarValue::Null => b.append_null(),
                    _ => return Err(mismatch("Boolean")),
                }
            }
            Arc::new(b.finish())
        }
        other => {
            return Err(FlowqError::Unsupported(format!(
                "output type not supported yet: {other:?}"
            )))
        }
    };
    if built.data_type() == dt {
        Ok(built)
    } else {
        widened(&built, dt)
    }
}

//! Column type coercion.
//!
//! Raw tables carry quantities as `0x` hex strings and decoded integers as
//! decimal strings. Coercion parses those into the declared [`ColumnType`];
//! any other source type goes through `arrow-cast`. A column that already has
//! its declared type is left untouched, so coercing twice is a no-op.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::U256;
use arrow_array::{Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field, Schema};
use mev_commit::ColumnType;

use crate::error::{QueryError, Result};

/// Arrow type of a [`ColumnType`].
#[must_use]
pub const fn data_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::UInt64 => DataType::UInt64,
        ColumnType::Utf8 => DataType::Utf8,
        ColumnType::Boolean => DataType::Boolean,
    }
}

enum Number {
    Unsigned(U256),
    Signed(i128),
    Float(f64),
}

fn parse_number(s: &str) -> Option<Number> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() {
            return Some(Number::Unsigned(U256::ZERO));
        }
        return U256::from_str_radix(hex, 16).ok().map(Number::Unsigned);
    }
    if let Some(digits) = s.strip_prefix('-') {
        if digits.bytes().all(|b| b.is_ascii_digit()) {
            return s
                .parse::<i128>()
                .ok()
                .map(Number::Signed)
                .or_else(|| s.parse().ok().map(Number::Float));
        }
        return s.parse().ok().map(Number::Float);
    }
    if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
        return U256::from_str_radix(s, 10).ok().map(Number::Unsigned);
    }
    s.parse().ok().map(Number::Float)
}

fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0_f64, |acc, limb| acc.mul_add(18_446_744_073_709_551_616.0, *limb as f64))
}

impl Number {
    fn to_f64(&self) -> f64 {
        match self {
            Self::Unsigned(v) => u256_to_f64(*v),
            Self::Signed(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }

    fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Unsigned(v) => i64::try_from(*v).ok(),
            Self::Signed(v) => i64::try_from(*v).ok(),
            Self::Float(_) => None,
        }
    }

    fn to_u64(&self) -> Option<u64> {
        match self {
            Self::Unsigned(v) => u64::try_from(*v).ok(),
            Self::Signed(v) => u64::try_from(*v).ok(),
            Self::Float(_) => None,
        }
    }
}

fn parse_strings<T>(
    column: &str,
    strings: &StringArray,
    ty: ColumnType,
    convert: impl Fn(&Number) -> Option<T>,
) -> Result<Vec<Option<T>>> {
    strings
        .iter()
        .map(|value| {
            value
                .map(|s| {
                    parse_number(s).as_ref().and_then(&convert).ok_or_else(|| {
                        QueryError::Decode(format!("column `{column}`: `{s}` is not a valid {ty}"))
                    })
                })
                .transpose()
        })
        .collect()
}

/// Coerce one column to `ty`.
///
/// # Errors
///
/// Returns [`QueryError::Decode`] if a string value does not parse or does
/// not fit the target integer type, or [`QueryError::Arrow`] if `arrow-cast`
/// rejects the conversion.
pub fn coerce_column(column: &str, array: &ArrayRef, ty: ColumnType) -> Result<ArrayRef> {
    let target = data_type(ty);
    if array.data_type() == &target {
        return Ok(Arc::clone(array));
    }

    let strings = array.as_any().downcast_ref::<StringArray>();
    let coerced: ArrayRef = match (strings, ty) {
        (Some(s), ColumnType::Float64) => {
            Arc::new(Float64Array::from(parse_strings(column, s, ty, |n| Some(n.to_f64()))?))
        }
        (Some(s), ColumnType::Int64) => {
            Arc::new(Int64Array::from(parse_strings(column, s, ty, Number::to_i64)?))
        }
        (Some(s), ColumnType::UInt64) => {
            Arc::new(UInt64Array::from(parse_strings(column, s, ty, Number::to_u64)?))
        }
        _ => arrow_cast::cast(array, &target)?,
    };
    Ok(coerced)
}

/// Coerce every column of `batch` named in `mapping`; other columns pass
/// through unchanged.
///
/// # Errors
///
/// Returns the first column coercion error.
pub fn coerce_batch(
    batch: &RecordBatch,
    mapping: &BTreeMap<String, ColumnType>,
) -> Result<RecordBatch> {
    if mapping.is_empty() {
        return Ok(batch.clone());
    }

    let schema = batch.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    let mut columns = Vec::with_capacity(batch.num_columns());

    for (field, array) in schema.fields().iter().zip(batch.columns()) {
        match mapping.get(field.name()) {
            Some(ty) => {
                let coerced = coerce_column(field.name(), array, *ty)?;
                fields.push(Field::new(field.name(), coerced.data_type().clone(), true));
                columns.push(coerced);
            }
            None => {
                fields.push(field.as_ref().clone());
                columns.push(Arc::clone(array));
            }
        }
    }

    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

//! Per-cell type coercion for delimited input.

pub mod dates;

use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson};
use data_encoding::BASE32;

use crate::errors::{ImportError, Result};
use crate::fields::{BinaryEncoding, ColumnType, FieldColumn};

/// Coerces one raw cell into the column's declared type.
///
/// # Errors
/// A coercion error for any value that does not parse as the declared
/// type; the caller applies the configured parse grace.
pub fn coerce(cell: &str, column: &FieldColumn) -> Result<Bson> {
    match &column.ty {
        ColumnType::Auto => Ok(auto(cell)),
        ColumnType::String => Ok(Bson::String(cell.to_string())),
        ColumnType::Int32 => {
            cell.parse::<i32>().map(Bson::Int32).map_err(|e| fail(cell, "int32", &e.to_string()))
        }
        ColumnType::Int64 => {
            cell.parse::<i64>().map(Bson::Int64).map_err(|e| fail(cell, "int64", &e.to_string()))
        }
        ColumnType::Double => {
            cell.parse::<f64>().map(Bson::Double).map_err(|e| fail(cell, "double", &e.to_string()))
        }
        ColumnType::Decimal => bson::Decimal128::from_str(cell)
            .map(Bson::Decimal128)
            .map_err(|e| fail(cell, "decimal", &e.to_string())),
        ColumnType::Boolean => {
            if cell.eq_ignore_ascii_case("true") {
                Ok(Bson::Boolean(true))
            } else if cell.eq_ignore_ascii_case("false") {
                Ok(Bson::Boolean(false))
            } else {
                Err(fail(cell, "boolean", "expected true or false"))
            }
        }
        ColumnType::Binary(encoding) => {
            let bytes = match encoding {
                BinaryEncoding::Base32 => BASE32
                    .decode(cell.as_bytes())
                    .map_err(|e| fail(cell, "binary", &e.to_string()))?,
                BinaryEncoding::Base64 => {
                    BASE64.decode(cell).map_err(|e| fail(cell, "binary", &e.to_string()))?
                }
                BinaryEncoding::Hex => {
                    hex::decode(cell).map_err(|e| fail(cell, "binary", &e.to_string()))?
                }
            };
            Ok(Bson::Binary(Binary { subtype: BinarySubtype::Generic, bytes }))
        }
        ColumnType::Date(style, layout) => {
            let dt = dates::parse_date(cell, *style, layout)?;
            Ok(Bson::DateTime(bson::DateTime::from_millis(dt.and_utc().timestamp_millis())))
        }
    }
}

/// Best-effort coercion: integer, then double, then boolean, else the
/// string itself. Never fails.
#[must_use]
pub fn auto(cell: &str) -> Bson {
    if let Ok(n) = cell.parse::<i64>() {
        return i32::try_from(n).map_or(Bson::Int64(n), Bson::Int32);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Bson::Double(f);
    }
    if cell.eq_ignore_ascii_case("true") {
        return Bson::Boolean(true);
    }
    if cell.eq_ignore_ascii_case("false") {
        return Bson::Boolean(false);
    }
    Bson::String(cell.to_string())
}

fn fail(value: &str, ty: &str, message: &str) -> ImportError {
    ImportError::Coerce {
        value: value.to_string(),
        ty: ty.to_string(),
        message: message.to_string(),
    }
}

//! Extended-JSON decoding into `Bson` values.
//!
//! Both dialects share one recursive walker; only the type-wrapper
//! recognition differs. Canonical is the modern `{"$numberInt": "42"}`
//! convention, legacy the older shapes such as `{"$date": 1136214245000}`
//! and the two-key `{"$binary": "...", "$type": "00"}` form.

use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bson::oid::ObjectId;
use bson::spec::BinarySubtype;
use bson::{Binary, Bson, Document, Regex, Timestamp};
use chrono::DateTime;
use serde_json::{Map, Value};

use crate::errors::{ImportError, Result};

/// Which extended-JSON convention to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Canonical,
    Legacy,
}

/// Converts a parsed JSON value into a `Bson` value, decoding any type
/// wrappers along the way.
///
/// # Errors
/// Fails on malformed or unknown `$`-wrappers.
pub fn to_bson(value: Value, dialect: Dialect) -> Result<Bson> {
    match value {
        Value::Null => Ok(Bson::Null),
        Value::Bool(b) => Ok(Bson::Boolean(b)),
        Value::Number(n) => Ok(number(&n)),
        Value::String(s) => Ok(Bson::String(s)),
        Value::Array(items) => {
            let converted: Result<Vec<Bson>> =
                items.into_iter().map(|v| to_bson(v, dialect)).collect();
            Ok(Bson::Array(converted?))
        }
        Value::Object(map) => {
            if let Some(wrapped) = wrapper(&map, dialect)? {
                return Ok(wrapped);
            }
            let mut doc = Document::new();
            for (key, value) in map {
                doc.insert(key, to_bson(value, dialect)?);
            }
            Ok(Bson::Document(doc))
        }
    }
}

/// Converts a top-level JSON value into a document.
///
/// # Errors
/// A top-level array is rejected (array mode handles those); any other
/// non-object value is a structural error.
pub fn to_document(value: Value, dialect: Dialect) -> Result<Document> {
    match value {
        Value::Array(_) => Err(ImportError::UnexpectedArray),
        Value::Object(_) => match to_bson(value, dialect)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(ImportError::Parse {
                row: 0,
                message: format!("expected a document, found a {:?} value", other.element_type()),
            }),
        },
        other => Err(ImportError::Parse {
            row: 0,
            message: format!("cannot import non-document JSON value: {other}"),
        }),
    }
}

fn number(n: &serde_json::Number) -> Bson {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map_or(Bson::Int64(i), Bson::Int32);
    }
    Bson::Double(n.as_f64().unwrap_or(f64::NAN))
}

fn wrapper(map: &Map<String, Value>, dialect: Dialect) -> Result<Option<Bson>> {
    let Some((first_key, first_value)) = map.iter().next() else {
        return Ok(None);
    };
    if !first_key.starts_with('$') {
        return Ok(None);
    }

    // The legacy binary form carries two keys: {"$binary": .., "$type": ..}.
    if dialect == Dialect::Legacy && map.len() == 2 {
        if let (Some(Value::String(payload)), Some(Value::String(subtype))) =
            (map.get("$binary"), map.get("$type"))
        {
            return binary_parts(payload, subtype).map(Some);
        }
        if let (Some(Value::String(pattern)), Some(Value::String(options))) =
            (map.get("$regex"), map.get("$options"))
        {
            return Ok(Some(Bson::RegularExpression(Regex {
                pattern: pattern.clone(),
                options: options.clone(),
            })));
        }
    }

    if map.len() != 1 {
        return Ok(None);
    }
    let converted = match (first_key.as_str(), first_value) {
        ("$oid", Value::String(s)) => Bson::ObjectId(
            ObjectId::parse_str(s).map_err(|_| bad_wrapper("$oid"))?,
        ),
        ("$numberInt", Value::String(s)) => {
            Bson::Int32(s.parse().map_err(|_| bad_wrapper("$numberInt"))?)
        }
        ("$numberLong", Value::String(s)) => {
            Bson::Int64(s.parse().map_err(|_| bad_wrapper("$numberLong"))?)
        }
        ("$numberDouble", Value::String(s)) => {
            Bson::Double(s.parse().map_err(|_| bad_wrapper("$numberDouble"))?)
        }
        ("$numberDecimal", Value::String(s)) => Bson::Decimal128(
            bson::Decimal128::from_str(s).map_err(|_| bad_wrapper("$numberDecimal"))?,
        ),
        ("$undefined", Value::Bool(true)) => Bson::Undefined,
        ("$symbol", Value::String(s)) => Bson::Symbol(s.clone()),
        ("$minKey", Value::Number(_)) => Bson::MinKey,
        ("$maxKey", Value::Number(_)) => Bson::MaxKey,
        ("$date", value) => return date_wrapper(value, dialect).map(Some),
        ("$binary", Value::Object(inner)) if dialect == Dialect::Canonical => {
            match (inner.get("base64"), inner.get("subType")) {
                (Some(Value::String(payload)), Some(Value::String(subtype))) => {
                    binary_parts(payload, subtype)?
                }
                _ => return Err(bad_wrapper("$binary")),
            }
        }
        ("$regularExpression", Value::Object(inner)) if dialect == Dialect::Canonical => {
            match (inner.get("pattern"), inner.get("options")) {
                (Some(Value::String(pattern)), Some(Value::String(options))) => {
                    Bson::RegularExpression(Regex {
                        pattern: pattern.clone(),
                        options: options.clone(),
                    })
                }
                _ => return Err(bad_wrapper("$regularExpression")),
            }
        }
        ("$timestamp", Value::Object(inner)) => {
            match (inner.get("t").and_then(Value::as_u64), inner.get("i").and_then(Value::as_u64)) {
                (Some(t), Some(i)) => Bson::Timestamp(Timestamp {
                    time: u32::try_from(t).map_err(|_| bad_wrapper("$timestamp"))?,
                    increment: u32::try_from(i).map_err(|_| bad_wrapper("$timestamp"))?,
                }),
                _ => return Err(bad_wrapper("$timestamp")),
            }
        }
        (key, _) => return Err(ImportError::UnknownTypeWrapper(key.to_string())),
    };
    Ok(Some(converted))
}

fn date_wrapper(value: &Value, dialect: Dialect) -> Result<Bson> {
    match (dialect, value) {
        // Canonical nests the millisecond count in a $numberLong wrapper.
        (Dialect::Canonical, Value::Object(inner)) => match inner.get("$numberLong") {
            Some(Value::String(ms)) => {
                let millis: i64 = ms.parse().map_err(|_| bad_wrapper("$date"))?;
                Ok(Bson::DateTime(bson::DateTime::from_millis(millis)))
            }
            _ => Err(bad_wrapper("$date")),
        },
        (Dialect::Legacy, Value::Number(ms)) => {
            let millis = ms.as_i64().ok_or_else(|| bad_wrapper("$date"))?;
            Ok(Bson::DateTime(bson::DateTime::from_millis(millis)))
        }
        (_, Value::String(s)) => {
            let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| bad_wrapper("$date"))?;
            Ok(Bson::DateTime(bson::DateTime::from_millis(parsed.timestamp_millis())))
        }
        _ => Err(bad_wrapper("$date")),
    }
}

fn binary_parts(payload: &str, subtype: &str) -> Result<Bson> {
    let bytes = BASE64.decode(payload).map_err(|_| bad_wrapper("$binary"))?;
    let tag = u8::from_str_radix(subtype, 16).map_err(|_| bad_wrapper("$binary"))?;
    Ok(Bson::Binary(Binary { subtype: BinarySubtype::from(tag), bytes }))
}

fn bad_wrapper(name: &str) -> ImportError {
    ImportError::UnknownTypeWrapper(format!("malformed {name} value"))
}

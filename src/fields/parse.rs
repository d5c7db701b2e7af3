use crate::errors::{ImportError, Result};

use super::{BinaryEncoding, ColumnType, DateStyle};

/// Splits an inline field list on commas, treating commas inside balanced
/// parentheses (typed-column arguments) as part of the field name.
/// Newlines inside type arguments are legal and preserved.
#[must_use]
pub fn split_inline_header(header: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut depth: usize = 0;
    for c in header.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Parses a typed column name of the form `<path>.<type>(<arg>)`.
///
/// The path is greedy: the last `.word(` introduces the type, so dots in
/// the path and commas or spaces in the argument survive intact.
///
/// # Errors
/// Fails when the name does not match the typed form, the type is
/// unknown, or the argument is invalid for the type.
pub fn parse_typed_column(name: &str) -> Result<(String, ColumnType)> {
    let stripped = name.strip_suffix(')').ok_or_else(|| bad_typed(name))?;
    for (i, _) in stripped.char_indices().rev().filter(|&(_, c)| c == '.') {
        let tail = &stripped[i + 1..];
        let Some(j) = tail.find('(') else { continue };
        let token = &tail[..j];
        if token.is_empty()
            || !token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            continue;
        }
        let path = &stripped[..i];
        if path.is_empty() {
            return Err(bad_typed(name));
        }
        let ty = column_type(token, &tail[j + 1..])?;
        return Ok((path.to_string(), ty));
    }
    Err(bad_typed(name))
}

fn bad_typed(name: &str) -> ImportError {
    ImportError::InvalidField(format!(
        "'{name}' is not a valid typed column; expected <name>.<type>(<arg>)"
    ))
}

fn column_type(token: &str, arg: &str) -> Result<ColumnType> {
    let no_arg = |ty: ColumnType| {
        if arg.is_empty() {
            Ok(ty)
        } else {
            Err(ImportError::InvalidField(format!("type {token} takes an empty argument")))
        }
    };
    let layout = |style: DateStyle| {
        if arg.is_empty() {
            Err(ImportError::InvalidField(format!("type {token} needs a datetime layout argument")))
        } else {
            Ok(ColumnType::Date(style, arg.to_string()))
        }
    };
    match token {
        "auto" => no_arg(ColumnType::Auto),
        "boolean" => no_arg(ColumnType::Boolean),
        "decimal" => no_arg(ColumnType::Decimal),
        "double" => no_arg(ColumnType::Double),
        "int32" => no_arg(ColumnType::Int32),
        "int64" => no_arg(ColumnType::Int64),
        "string" => no_arg(ColumnType::String),
        "date" | "date_go" => layout(DateStyle::Go),
        "date_ms" => layout(DateStyle::Ms),
        "date_oracle" => layout(DateStyle::Oracle),
        "binary" => match arg {
            "base32" => Ok(ColumnType::Binary(BinaryEncoding::Base32)),
            "base64" => Ok(ColumnType::Binary(BinaryEncoding::Base64)),
            "hex" => Ok(ColumnType::Binary(BinaryEncoding::Hex)),
            other => Err(ImportError::InvalidField(format!(
                "'{other}' is not a binary encoding; expected base32, base64, or hex"
            ))),
        },
        other => Err(ImportError::InvalidField(format!("unknown column type: {other}"))),
    }
}

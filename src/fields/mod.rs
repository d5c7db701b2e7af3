//! Field descriptors: the positional column list driving delimited input.

mod parse;

use std::fs;
use std::path::Path;

use bson::Bson;

use crate::errors::{ImportError, Result};
use crate::expand::DocumentBuilder;

pub use parse::{parse_typed_column, split_inline_header};

/// Encoding for `binary(<arg>)` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryEncoding {
    Base32,
    Base64,
    Hex,
}

/// Layout dialect for the date column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    Go,
    Ms,
    Oracle,
}

/// Target type for one column's cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Auto,
    Boolean,
    Decimal,
    Double,
    Int32,
    Int64,
    String,
    Binary(BinaryEncoding),
    Date(DateStyle, String),
}

impl ColumnType {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Boolean => "boolean",
            Self::Decimal => "decimal",
            Self::Double => "double",
            Self::Int32 => "int32",
            Self::Int64 => "int64",
            Self::String => "string",
            Self::Binary(_) => "binary",
            Self::Date(..) => "date",
        }
    }
}

/// One positional column: the dotted path it lands at and its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldColumn {
    pub name: String,
    pub parts: Vec<String>,
    pub ty: ColumnType,
}

impl FieldColumn {
    fn untyped(name: &str) -> Result<Self> {
        Self::with_type(name, name, ColumnType::Auto)
    }

    fn with_type(name: &str, path: &str, ty: ColumnType) -> Result<Self> {
        if path.is_empty() {
            return Err(ImportError::InvalidField("field names cannot be empty".to_string()));
        }
        let parts: Vec<String> = path.split('.').map(str::to_string).collect();
        if parts.iter().any(String::is_empty) {
            return Err(ImportError::InvalidField(format!(
                "field '{name}' has an empty path segment"
            )));
        }
        Ok(Self { name: name.to_string(), parts, ty })
    }

    /// A synthetic `fieldN` column for cells beyond a header-derived list.
    #[must_use]
    pub fn synthetic(index: usize) -> Self {
        let name = format!("field{index}");
        Self { name: name.clone(), parts: vec![name], ty: ColumnType::Auto }
    }
}

/// The validated positional field list for a delimited input.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub columns: Vec<FieldColumn>,
    pub use_array_index_fields: bool,
    /// Whether the list came from the input's own header line; only then
    /// may ragged rows extend it with synthetic `fieldN` columns.
    pub header_derived: bool,
}

impl FieldSpec {
    /// Builds a spec from an inline comma-separated list.
    ///
    /// # Errors
    /// Propagates name, type, and structural-collision errors.
    pub fn from_inline(
        fields: &str,
        columns_have_types: bool,
        use_array_index_fields: bool,
    ) -> Result<Self> {
        let names = split_inline_header(fields);
        Self::from_names(&names, columns_have_types, use_array_index_fields, false)
    }

    /// Builds a spec from a field file with one name per line.
    ///
    /// # Errors
    /// Propagates I/O errors and everything `from_names` rejects.
    pub fn from_field_file(
        path: &Path,
        columns_have_types: bool,
        use_array_index_fields: bool,
    ) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let names: Vec<String> =
            contents.lines().filter(|l| !l.is_empty()).map(str::to_string).collect();
        Self::from_names(&names, columns_have_types, use_array_index_fields, false)
    }

    /// Builds a spec from a list of column names, typed or plain.
    ///
    /// # Errors
    /// Rejects empty names and segments, unknown types, duplicate paths,
    /// structurally incompatible paths, and bad array indexes.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        columns_have_types: bool,
        use_array_index_fields: bool,
        header_derived: bool,
    ) -> Result<Self> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let column = if columns_have_types {
                let (path, ty) = parse_typed_column(name)?;
                FieldColumn::with_type(name, &path, ty)?
            } else {
                FieldColumn::untyped(name)?
            };
            columns.push(column);
        }
        let spec = Self { columns, use_array_index_fields, header_derived };
        spec.check_structure()?;
        Ok(spec)
    }

    /// Runs the nested-field walk once with placeholder values so that
    /// duplicate, incompatible, and array-index errors surface at setup.
    fn check_structure(&self) -> Result<()> {
        let mut builder = DocumentBuilder::new(self.use_array_index_fields);
        for column in &self.columns {
            builder.insert(&column.name, &column.parts, Bson::Null)?;
        }
        Ok(())
    }

    /// Blank typed cells have no defined coercion, so ignoring blanks is
    /// only accepted when every declared type keeps the cell textual.
    ///
    /// # Errors
    /// Returns a setup error naming the first offending column.
    pub fn check_blank_compat(&self) -> Result<()> {
        for column in &self.columns {
            if !matches!(column.ty, ColumnType::Auto | ColumnType::String) {
                return Err(ImportError::InvalidOption(format!(
                    "ignoring blanks requires string or auto columns; '{}' is {}",
                    column.name,
                    column.ty.name()
                )));
            }
        }
        Ok(())
    }
}

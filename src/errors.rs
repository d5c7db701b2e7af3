use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("array index error with field '{field}': array indexes in fields must start from 0 and increase sequentially")]
    ArrayIndex { field: String },

    #[error("fields '{first}' and '{second}' are incompatible")]
    IncompatibleFields { first: String, second: String },

    #[error("fields cannot be identical: '{first}' and '{second}'")]
    IdenticalFields { first: String, second: String },

    #[error("unknown JSON type wrapper: {0}")]
    UnknownTypeWrapper(String),

    #[error("cannot decode a JSON array into a document; enable array mode to import a top-level array")]
    UnexpectedArray,

    #[error("expected a JSON array at the top level")]
    ExpectedArray,

    #[error("parse error on row {row}: {message}")]
    Parse { row: u64, message: String },

    #[error("cannot coerce '{value}' into type {ty}: {message}")]
    Coerce { value: String, ty: String, message: String },

    #[error("write error: {0}")]
    Write(String),

    #[error("connection error: {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, ImportError>;

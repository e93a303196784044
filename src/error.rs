use std::path::PathBuf;

use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Message shown for every rejected split request. The specific cause is kept
/// as the error source.
pub const INVALID_SPLIT_MESSAGE: &str =
    "Instructions to split the given table are not valid. Please confirm your settings!";

/// Everything that can end a read, write or conversion.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Unsupported file type: {0}")]
    UnsupportedKind(String),

    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("'{}' is not valid {encoding} text", path.display())]
    Decode { path: PathBuf, encoding: String },

    #[error("Invalid value {value:?} for option '{option}'")]
    InvalidOption { option: &'static str, value: String },

    #[error("Column '{0}' not found")]
    MissingColumn(String),

    #[error("Cannot insert column '{0}', it already exists")]
    DuplicateColumn(String),

    #[error("Instructions to split the given table are not valid. Please confirm your settings!")]
    InvalidSplitConfiguration(#[source] SplitError),

    #[error("I/O error on '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to process table data for '{}'", path.display())]
    Arrow {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },

    #[error("Parquet error on '{}'", path.display())]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },
}

impl ConvertError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ConvertError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn arrow(path: impl Into<PathBuf>, source: ArrowError) -> Self {
        ConvertError::Arrow {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn parquet(path: impl Into<PathBuf>, source: ParquetError) -> Self {
        ConvertError::Parquet {
            path: path.into(),
            source,
        }
    }
}

/// The specific reason a split request was rejected or failed.
#[derive(Error, Debug)]
pub enum SplitError {
    #[error("unknown split mode '{0}', expected 'date' or 'length'")]
    UnknownMode(String),

    #[error("no 'split_by' value given")]
    MissingSplitBy,

    #[error("unknown timeframe '{0}', expected 'Last X Months', 'Monthly' or 'Yearly'")]
    UnknownTimeframe(String),

    #[error("no 'date_col' given for a date split")]
    MissingDateColumn,

    #[error("date column '{0}' not found in the table")]
    DateColumnNotFound(String),

    #[error("'{0}' is not a positive number of parts")]
    InvalidPartCount(String),

    #[error("column '{column}' could not be read as dates")]
    DateParse {
        column: String,
        #[source]
        source: ArrowError,
    },

    #[error("cutoff of {months} months before {latest} is out of range")]
    CutoffOutOfRange { latest: String, months: u32 },

    #[error("failed to select rows for a fragment")]
    Select(#[source] ArrowError),

    #[error("failed to write fragment '{}'", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: Box<ConvertError>,
    },
}

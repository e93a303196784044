//! Convert tabular files between CSV and Parquet, optionally splitting the
//! output by date or into equal parts.

pub mod cli;
pub mod convert;
pub mod data;
pub mod error;
pub mod state;

pub use convert::{Conversion, ConversionReport, WrittenFile};
pub use data::model::{FileKind, FileRef, Table};
pub use data::options::{ReadOptions, Settings, WriteOptions};
pub use error::{ConvertError, Result, SplitError};

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, BooleanArray, UInt32Array, UInt64Array};
use arrow::compute::{filter, filter_record_batch, take, take_record_batch};
use arrow::datatypes::{DataType, Field, FieldRef, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;

use crate::error::ConvertError;

// ---------------------------------------------------------------------------
// FileKind – the two supported on-disk formats
// ---------------------------------------------------------------------------

/// On-disk table format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// Delimited text, optionally compressed.
    Csv,
    /// Columnar binary (Parquet).
    Parquet,
}

impl FileKind {
    /// Canonical file extension, without the dot.
    pub const fn extension(self) -> &'static str {
        match self {
            FileKind::Csv => "csv",
            FileKind::Parquet => "parquet",
        }
    }

    /// `Parquet` iff the file extension is `parquet`, otherwise `Csv`.
    pub fn from_path(path: &Path) -> Self {
        let is_parquet = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("parquet"));
        if is_parquet {
            FileKind::Parquet
        } else {
            FileKind::Csv
        }
    }

    /// The format a file of this kind is normally converted into.
    pub const fn counterpart(self) -> Self {
        match self {
            FileKind::Csv => FileKind::Parquet,
            FileKind::Parquet => FileKind::Csv,
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            FileKind::Csv => "CSV",
            FileKind::Parquet => "Parquet",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileKind {
    type Err = ConvertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" | "text" => Ok(FileKind::Csv),
            "parquet" | "columnar" => Ok(FileKind::Parquet),
            _ => Err(ConvertError::UnsupportedKind(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// FileRef – a path with its declared format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub path: PathBuf,
    pub kind: FileKind,
}

impl FileRef {
    pub fn new(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    /// Build a reference whose kind is inferred from the extension.
    pub fn infer(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let kind = FileKind::from_path(&path);
        Self { path, kind }
    }
}

// ---------------------------------------------------------------------------
// Table – one loaded dataframe
// ---------------------------------------------------------------------------

/// Name given to the row index when it is written as a Parquet column.
pub const INDEX_COLUMN: &str = "index";

/// Columns plus a row index.
///
/// A freshly loaded table is indexed `0..N`. Slicing, filtering and taking
/// rows carry the original index values along, so a fragment still knows
/// which input rows it holds.
#[derive(Debug, Clone)]
pub struct Table {
    batch: RecordBatch,
    index: UInt64Array,
}

impl Table {
    /// Wrap a batch with a default `0..N` index.
    pub fn new(batch: RecordBatch) -> Self {
        let index = UInt64Array::from_iter_values(0..batch.num_rows() as u64);
        Self { batch, index }
    }

    /// Wrap a batch with an explicit index of the same length.
    pub fn with_index(batch: RecordBatch, index: UInt64Array) -> Result<Self, ArrowError> {
        if index.len() != batch.num_rows() {
            return Err(ArrowError::InvalidArgumentError(format!(
                "index has {} values but the table has {} rows",
                index.len(),
                batch.num_rows()
            )));
        }
        Ok(Self { batch, index })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn index(&self) -> &UInt64Array {
        &self.index
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn num_columns(&self) -> usize {
        self.batch.num_columns()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Column names in display order.
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.batch.schema().index_of(name).is_ok()
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// Zero-copy view of `len` rows starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Self {
        Self {
            batch: self.batch.slice(offset, len),
            index: self.index.slice(offset, len),
        }
    }

    /// Keep the rows where `mask` is true.
    pub fn filter(&self, mask: &BooleanArray) -> Result<Self, ArrowError> {
        let batch = filter_record_batch(&self.batch, mask)?;
        let index = filter(&self.index, mask)?;
        Self::with_index(batch, downcast_index(index)?)
    }

    /// Gather the rows at `indices`, in that order.
    pub fn take(&self, indices: &UInt32Array) -> Result<Self, ArrowError> {
        let batch = take_record_batch(&self.batch, indices)?;
        let index = take(&self.index, indices, None)?;
        Self::with_index(batch, downcast_index(index)?)
    }

    /// The batch with the row index prepended as an ordinary `UInt64` column.
    pub fn batch_with_index(&self, name: &str) -> Result<RecordBatch, ArrowError> {
        let schema = self.batch.schema();
        if schema.index_of(name).is_ok() {
            return Err(ArrowError::SchemaError(format!(
                "cannot insert '{name}', it already exists"
            )));
        }

        let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len() + 1);
        fields.push(Arc::new(Field::new(name, DataType::UInt64, false)));
        fields.extend(schema.fields().iter().cloned());

        let mut columns: Vec<ArrayRef> = Vec::with_capacity(fields.len());
        columns.push(Arc::new(self.index.clone()));
        columns.extend(self.batch.columns().iter().cloned());

        let schema = Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone()));
        RecordBatch::try_new(schema, columns)
    }
}

fn downcast_index(array: ArrayRef) -> Result<UInt64Array, ArrowError> {
    array
        .as_any()
        .downcast_ref::<UInt64Array>()
        .cloned()
        .ok_or_else(|| ArrowError::CastError("row index is not UInt64".to_string()))
}

use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::reader::Format;
use arrow::csv::ReaderBuilder;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use encoding_rs::UTF_8;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;

use super::compression;
use super::model::{FileKind, FileRef, Table};
use super::options::{ascii_byte, DtypePolicy, ReadOptions, FALLBACK_ENCODING};
use crate::error::{ConvertError, Result};

/// Records scanned for schema inference when `low_memory` is set.
const LOW_MEMORY_INFER_RECORDS: usize = 1000;
const BATCH_SIZE: usize = 64 * 1024;
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a table, dispatching on the declared kind.
///
/// CSV input that fails to load as UTF-8 is retried once as ISO-8859-1. If the
/// retry fails too, the first error is returned.
pub fn read(input: &FileRef, options: &ReadOptions) -> Result<Table> {
    let table = match input.kind {
        FileKind::Csv => read_csv_with_fallback(&input.path, options)?,
        FileKind::Parquet => read_parquet(&input.path, &options.without_dtype())?,
    };
    log::info!(
        "Read {} rows x {} columns from {}",
        table.num_rows(),
        table.num_columns(),
        input.path.display()
    );
    Ok(table)
}

/// Load at most `rows` rows, for previews.
pub fn preview(input: &FileRef, options: &ReadOptions, rows: usize) -> Result<Table> {
    read(input, &options.with_nrows(rows))
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

fn read_csv_with_fallback(path: &Path, options: &ReadOptions) -> Result<Table> {
    match read_csv(path, options) {
        Ok(table) => Ok(table),
        Err(err) if options.uses_default_encoding() => {
            log::warn!(
                "Reading {} as {} failed ({err}), retrying as {FALLBACK_ENCODING}",
                path.display(),
                options.encoding
            );
            read_csv(path, &options.with_encoding(FALLBACK_ENCODING)).map_err(|retry_err| {
                log::debug!("{FALLBACK_ENCODING} retry failed too: {retry_err}");
                err
            })
        }
        Err(err) => Err(err),
    }
}

fn read_csv(path: &Path, options: &ReadOptions) -> Result<Table> {
    let bytes = compression::read_all(path)?;
    let text = decode(path, &bytes, options)?;
    let format = csv_format(options)?;

    let infer_limit = options.low_memory.then_some(LOW_MEMORY_INFER_RECORDS);
    let (inferred, _) = format
        .clone()
        .infer_schema(Cursor::new(text.as_bytes()), infer_limit)
        .map_err(|e| ConvertError::arrow(path, e))?;
    let schema = match options.dtype_policy() {
        DtypePolicy::Infer => inferred,
        DtypePolicy::Text => all_text(&inferred),
    };
    log::debug!("CSV schema for {}: {schema:?}", path.display());

    let schema = Arc::new(schema);
    let mut builder = ReaderBuilder::new(schema.clone())
        .with_header(options.has_header)
        .with_delimiter(ascii_byte("delimiter", options.delimiter)?)
        .with_quote(ascii_byte("quote", options.quote)?)
        .with_batch_size(BATCH_SIZE);
    if let Some(escape) = options.escape {
        builder = builder.with_escape(ascii_byte("escape", escape)?);
    }
    if let Some(comment) = options.comment {
        builder = builder.with_comment(ascii_byte("comment", comment)?);
    }
    if let Some(nrows) = options.nrows {
        builder = builder.with_bounds(0, nrows);
    }

    let output_schema = match &options.columns {
        Some(columns) => {
            let indices = column_indices(&schema, columns)?;
            builder = builder.with_projection(indices.clone());
            Arc::new(
                schema
                    .project(&indices)
                    .map_err(|e| ConvertError::arrow(path, e))?,
            )
        }
        None => schema,
    };

    let reader = builder
        .build(Cursor::new(text.as_bytes()))
        .map_err(|e| ConvertError::arrow(path, e))?;
    let batches = reader
        .collect::<std::result::Result<Vec<_>, ArrowError>>()
        .map_err(|e| ConvertError::arrow(path, e))?;
    let batch = concat_batches(&output_schema, &batches).map_err(|e| ConvertError::arrow(path, e))?;
    Ok(Table::new(batch))
}

fn decode(path: &Path, bytes: &[u8], options: &ReadOptions) -> Result<String> {
    let encoding = options.resolved_encoding()?;
    let bytes = if encoding == UTF_8 {
        bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes)
    } else {
        bytes
    };
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|text| text.into_owned())
        .ok_or_else(|| ConvertError::Decode {
            path: path.to_path_buf(),
            encoding: encoding.name().to_string(),
        })
}

fn csv_format(options: &ReadOptions) -> Result<Format> {
    let mut format = Format::default()
        .with_header(options.has_header)
        .with_delimiter(ascii_byte("delimiter", options.delimiter)?)
        .with_quote(ascii_byte("quote", options.quote)?);
    if let Some(escape) = options.escape {
        format = format.with_escape(ascii_byte("escape", escape)?);
    }
    if let Some(comment) = options.comment {
        format = format.with_comment(ascii_byte("comment", comment)?);
    }
    Ok(format)
}

fn all_text(schema: &Schema) -> Schema {
    let fields: Vec<Field> = schema
        .fields()
        .iter()
        .map(|f| Field::new(f.name(), DataType::Utf8, true))
        .collect();
    Schema::new(fields)
}

fn column_indices(schema: &Schema, columns: &[String]) -> Result<Vec<usize>> {
    columns
        .iter()
        .map(|name| {
            schema
                .index_of(name)
                .map_err(|_| ConvertError::MissingColumn(name.clone()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file into a single table.
///
/// Works with files written by Pandas, Polars and this crate. Column
/// projection keeps the file's column order.
fn read_parquet(path: &Path, options: &ReadOptions) -> Result<Table> {
    let file = File::open(path).map_err(|e| ConvertError::io(path, e))?;
    let mut builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|e| ConvertError::parquet(path, e))?;

    if let Some(columns) = &options.columns {
        let mut indices = column_indices(builder.schema(), columns)?;
        indices.sort_unstable();
        indices.dedup();
        let mask = ProjectionMask::roots(builder.parquet_schema(), indices);
        builder = builder.with_projection(mask);
    }
    if let Some(nrows) = options.nrows {
        builder = builder.with_limit(nrows);
    }

    let reader = builder
        .with_batch_size(BATCH_SIZE)
        .build()
        .map_err(|e| ConvertError::parquet(path, e))?;
    let schema: SchemaRef = reader.schema();
    let batches: Vec<RecordBatch> = reader
        .collect::<std::result::Result<Vec<_>, ArrowError>>()
        .map_err(|e| ConvertError::arrow(path, e))?;
    let batch = concat_batches(&schema, &batches).map_err(|e| ConvertError::arrow(path, e))?;
    Ok(Table::new(batch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, AsArray};
    use arrow::datatypes::Int64Type;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> FileRef {
        let path = dir.join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(contents)
            .unwrap();
        FileRef::infer(path)
    }

    #[test]
    fn csv_types_are_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(
            dir.path(),
            "people.csv",
            b"id,name,score,joined\n1,Ann,1.5,2021-01-04\n2,Bob,2.0,2022-06-30\n",
        );
        let table = read(&input, &ReadOptions::default()).unwrap();

        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names(), vec!["id", "name", "score", "joined"]);
        let schema = table.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert_eq!(schema.field(1).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        assert_eq!(schema.field(3).data_type(), &DataType::Date32);
        let ids = table.column("id").unwrap().as_primitive::<Int64Type>();
        assert_eq!(ids.value(1), 2);
    }

    #[test]
    fn text_policy_keeps_strings() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "codes.csv", b"zip,code\n01234,007\n");
        let options = ReadOptions {
            dtype: Some(DtypePolicy::Text),
            ..ReadOptions::default()
        };
        let table = read(&input, &options).unwrap();
        let zip = table.column("zip").unwrap().as_string::<i32>();
        assert_eq!(zip.value(0), "01234");
    }

    #[test]
    fn latin1_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        // "café" in ISO-8859-1: 0xE9 is not valid UTF-8 on its own.
        let input = write_file(dir.path(), "menu.csv", b"item,price\ncaf\xe9,3\ntea,2\n");
        let table = read(&input, &ReadOptions::default()).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.num_columns(), 2);
        let items = table.column("item").unwrap().as_string::<i32>();
        assert_eq!(items.value(0), "café");
    }

    #[test]
    fn non_default_encoding_is_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "menu.csv", b"item\ncaf\xe9\n");
        // 0xE9 starts a two-byte Shift_JIS sequence, a newline cannot end it.
        let options = ReadOptions::default().with_encoding("shift_jis");
        let err = read(&input, &options).unwrap_err();
        assert!(matches!(err, ConvertError::Decode { encoding, .. } if encoding == "Shift_JIS"));
    }

    #[test]
    fn missing_file_reports_original_error() {
        let input = FileRef::new("/definitely/not/here.csv", FileKind::Csv);
        let err = read(&input, &ReadOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }

    #[test]
    fn nrows_and_columns_limit_the_read() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "n.csv", b"a,b,c\n1,2,3\n4,5,6\n7,8,9\n");
        let options = ReadOptions {
            columns: Some(vec!["c".to_string(), "a".to_string()]),
            ..ReadOptions::default()
        };
        let table = preview(&input, &options, 2).unwrap();
        assert_eq!(table.num_rows(), 2);
        assert_eq!(table.column_names(), vec!["c", "a"]);

        let missing = ReadOptions {
            columns: Some(vec!["nope".to_string()]),
            ..ReadOptions::default()
        };
        assert!(matches!(
            read(&input, &missing),
            Err(ConvertError::MissingColumn(c)) if c == "nope"
        ));
    }

    #[test]
    fn gzipped_csv_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv.gz");
        let mut w = compression::create_writer(&path).unwrap();
        w.write_all(b"v\n1\n2\n3\n").unwrap();
        w.finish().unwrap();
        let table = read(&FileRef::infer(&path), &ReadOptions::default()).unwrap();
        assert_eq!(table.num_rows(), 3);
        assert!(table.column("v").unwrap().null_count() == 0);
    }

    #[test]
    fn semicolon_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_file(dir.path(), "semi.csv", b"a;b\n1;2\n");
        let options = ReadOptions {
            delimiter: ';',
            ..ReadOptions::default()
        };
        let table = read(&input, &options).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);

        let bad = ReadOptions {
            delimiter: '§',
            ..ReadOptions::default()
        };
        assert!(read(&input, &bad).is_err());
    }
}

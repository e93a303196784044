use std::fs::File;
use std::path::Path;

use arrow::csv::WriterBuilder;
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{BrotliLevel, Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;

use super::compression;
use super::model::{FileKind, FileRef, Table, INDEX_COLUMN};
use super::options::{ascii_byte, ParquetCompression, SaveOptions};
use crate::error::{ConvertError, Result};

/// Header of the index column in CSV output, matching what Pandas writes.
const CSV_INDEX_HEADER: &str = "";

/// Write `table` to `output` in its declared format.
pub fn save(table: &Table, output: &FileRef, options: &SaveOptions) -> Result<()> {
    match output.kind {
        FileKind::Parquet => save_parquet(table, &output.path, options)?,
        FileKind::Csv => save_csv(table, &output.path, options)?,
    }
    log::info!("Wrote {} rows to {}", table.num_rows(), output.path.display());
    Ok(())
}

fn batch_for_output(table: &Table, path: &Path, index: bool, name: &str) -> Result<RecordBatch> {
    if !index {
        return Ok(table.batch().clone());
    }
    if table.has_column(name) {
        return Err(ConvertError::DuplicateColumn(name.to_string()));
    }
    table
        .batch_with_index(name)
        .map_err(|e| ConvertError::arrow(path, e))
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn save_parquet(table: &Table, path: &Path, options: &SaveOptions) -> Result<()> {
    let batch = batch_for_output(table, path, options.index, INDEX_COLUMN)?;

    let mut props = WriterProperties::builder().set_compression(parquet_codec(options.compression));
    if let Some(rows) = options.row_group_size {
        props = props.set_max_row_group_size(rows.max(1));
    }

    let file = File::create(path).map_err(|e| ConvertError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props.build()))
        .map_err(|e| ConvertError::parquet(path, e))?;
    writer
        .write(&batch)
        .map_err(|e| ConvertError::parquet(path, e))?;
    writer.close().map_err(|e| ConvertError::parquet(path, e))?;
    Ok(())
}

fn parquet_codec(compression: ParquetCompression) -> Compression {
    match compression {
        ParquetCompression::None => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Lz4 => Compression::LZ4_RAW,
        ParquetCompression::Brotli => Compression::BROTLI(BrotliLevel::default()),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn save_csv(table: &Table, path: &Path, options: &SaveOptions) -> Result<()> {
    let batch = batch_for_output(table, path, options.index, CSV_INDEX_HEADER)?;

    let mut builder = WriterBuilder::new()
        .with_header(options.header)
        .with_delimiter(ascii_byte("delimiter", options.delimiter)?)
        .with_quote(ascii_byte("quote", options.quote)?);
    if let Some(null) = &options.null_value {
        builder = builder.with_null(null.clone());
    }
    if let Some(format) = &options.date_format {
        builder = builder.with_date_format(format.clone());
    }
    if let Some(format) = &options.datetime_format {
        builder = builder
            .with_datetime_format(format.clone())
            .with_timestamp_format(format.clone());
    }

    let sink = compression::create_writer(path)?;
    let mut writer = builder.build(sink);
    writer
        .write(&batch)
        .map_err(|e| ConvertError::arrow(path, e))?;
    writer
        .into_inner()
        .finish()
        .map_err(|e| ConvertError::io(path, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Array, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;
    use crate::data::loader;
    use crate::data::options::ReadOptions;

    fn table() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("city", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(vec![1, 2, 3, 4])),
                Arc::new(StringArray::from(vec!["Oslo", "Lima", "Pune", "Kyiv"])),
            ],
        )
        .unwrap();
        Table::new(batch)
    }

    #[test]
    fn parquet_round_trip_drops_index_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileRef::new(dir.path().join("t.parquet"), FileKind::Parquet);
        save(&table(), &out, &SaveOptions::default()).unwrap();

        let back = loader::read(&out, &ReadOptions::default()).unwrap();
        assert_eq!(back.num_rows(), 4);
        assert_eq!(back.column_names(), vec!["id", "city"]);
    }

    #[test]
    fn parquet_index_becomes_a_column() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileRef::new(dir.path().join("t.parquet"), FileKind::Parquet);
        let options = SaveOptions {
            index: true,
            compression: ParquetCompression::Zstd,
            ..SaveOptions::default()
        };
        save(&table().slice(2, 2), &out, &options).unwrap();

        let back = loader::read(&out, &ReadOptions::default()).unwrap();
        assert_eq!(back.column_names(), vec!["index", "id", "city"]);
        let index = back
            .column("index")
            .unwrap()
            .as_any()
            .downcast_ref::<arrow::array::UInt64Array>()
            .unwrap();
        assert_eq!(index.values().to_vec(), vec![2, 3]);
    }

    #[test]
    fn csv_index_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let plain = FileRef::new(dir.path().join("plain.csv"), FileKind::Csv);
        save(&table().slice(0, 2), &plain, &SaveOptions::default()).unwrap();
        let text = std::fs::read_to_string(&plain.path).unwrap();
        assert_eq!(text, "id,city\n1,Oslo\n2,Lima\n");

        let indexed = FileRef::new(dir.path().join("indexed.csv"), FileKind::Csv);
        let options = SaveOptions {
            index: true,
            delimiter: ';',
            ..SaveOptions::default()
        };
        save(&table().slice(1, 2), &indexed, &options).unwrap();
        let text = std::fs::read_to_string(&indexed.path).unwrap();
        assert_eq!(text, ";id;city\n1;2;Lima\n2;3;Pune\n");
    }

    #[test]
    fn compressed_csv_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileRef::new(dir.path().join("t.csv.gz"), FileKind::Csv);
        save(&table(), &out, &SaveOptions::default()).unwrap();
        let back = loader::read(&out, &ReadOptions::default()).unwrap();
        assert_eq!(back.num_rows(), 4);
    }

    #[test]
    fn unwritable_path_is_io_error() {
        let out = FileRef::new("/no/such/dir/t.parquet", FileKind::Parquet);
        let err = save(&table(), &out, &SaveOptions::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Io { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn csv_write_failure_is_reported() {
        let out = FileRef::new("/dev/full", FileKind::Csv);
        let err = save(&table(), &out, &SaveOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Io { .. } | ConvertError::Arrow { .. }
        ));
    }
}

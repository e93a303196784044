use std::path::{Path, PathBuf};

use crate::convert::{Conversion, ConversionReport};
use crate::data::compression::strip_codec_suffix;
use crate::data::loader;
use crate::data::model::{FileKind, FileRef, Table};
use crate::data::options::{ReadOptions, WriteOptions};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Converter session state
// ---------------------------------------------------------------------------

/// Everything a front end tracks between picking a file and converting it,
/// independent of rendering.
#[derive(Debug, Default)]
pub struct ConverterState {
    /// Selected input (None until the user picks a file).
    pub input: Option<FileRef>,

    /// Destination, pre-filled with a suggestion when an input is picked.
    pub output: Option<FileRef>,

    pub read_options: ReadOptions,
    pub write_options: WriteOptions,

    /// Rows loaded for display, cached until the input changes.
    pub preview: Option<Table>,

    /// Status / error message shown to the user.
    pub status_message: Option<String>,
}

impl ConverterState {
    /// Pick an input file: infer its kind and suggest the opposite format
    /// next to it.
    pub fn select_input(&mut self, path: impl Into<PathBuf>) {
        let input = FileRef::infer(path);
        let output_kind = input.kind.counterpart();
        self.output = Some(FileRef::new(
            suggested_output(&input.path, output_kind),
            output_kind,
        ));
        log::info!("Selected file: {}", input.path.display());
        self.input = Some(input);
        self.preview = None;
        self.status_message = None;
    }

    pub fn set_output(&mut self, output: FileRef) {
        self.output = Some(output);
    }

    /// "CSV to Parquet", "Parquet to CSV", or "Convert" before a selection.
    pub fn direction_label(&self) -> String {
        match (&self.input, &self.output) {
            (Some(input), Some(output)) => format!(
                "{} to {}",
                input.kind.display_name(),
                output.kind.display_name()
            ),
            _ => "Convert".to_string(),
        }
    }

    pub fn can_convert(&self) -> bool {
        self.input.is_some() && self.output.is_some()
    }

    /// Load (or reuse) up to `rows` rows of the input for display.
    pub fn load_preview(&mut self, rows: usize) -> Result<Option<&Table>> {
        let Some(input) = &self.input else {
            return Ok(None);
        };
        let stale = self.preview.as_ref().map_or(true, |p| p.num_rows() < rows);
        if stale {
            match loader::preview(input, &self.read_options, rows) {
                Ok(table) => self.preview = Some(table),
                Err(e) => {
                    log::error!("Failed to load preview: {e:#}");
                    self.status_message = Some(format!("Error: {e}"));
                    return Err(e);
                }
            }
        }
        Ok(self.preview.as_ref())
    }

    pub fn conversion(&self) -> Option<Conversion> {
        let input = self.input.clone()?;
        let output = self.output.clone()?;
        Some(
            Conversion::new(input, output)
                .with_read_options(self.read_options.clone())
                .with_write_options(self.write_options.clone()),
        )
    }

    /// Run the conversion and record the outcome in `status_message`.
    pub fn convert(&mut self) -> Option<Result<ConversionReport>> {
        let conversion = self.conversion()?;
        let result = conversion.convert();
        self.status_message = Some(match &result {
            Ok(_) => format!(
                "File converted successfully:\n{}",
                conversion.output.path.display()
            ),
            Err(e) => {
                log::error!("Conversion failed: {e:#}");
                format!("Error converting file:\n{e}")
            }
        });
        Some(result)
    }
}

/// `data.csv.gz` → `data.parquet`, `data.parquet` → `data.csv`.
pub fn suggested_output(input: &Path, kind: FileKind) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (name, _) = strip_codec_suffix(&file_name);
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{stem}.{}", kind.extension()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_input_suggests_parquet() {
        let mut state = ConverterState::default();
        assert_eq!(state.direction_label(), "Convert");
        assert!(!state.can_convert());

        state.select_input("exports/sales.csv.gz");
        let output = state.output.clone().unwrap();
        assert_eq!(output.kind, FileKind::Parquet);
        assert_eq!(output.path, PathBuf::from("exports/sales.parquet"));
        assert_eq!(state.direction_label(), "CSV to Parquet");
        assert!(state.can_convert());
    }

    #[test]
    fn parquet_input_suggests_csv() {
        let mut state = ConverterState::default();
        state.select_input("sales.parquet");
        assert_eq!(state.output.as_ref().unwrap().path, PathBuf::from("sales.csv"));
        assert_eq!(state.direction_label(), "Parquet to CSV");
    }

    #[test]
    fn convert_records_status() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.csv");
        std::fs::write(&input, "a,b\n1,x\n2,y\n3,z\n").unwrap();

        let mut state = ConverterState::default();
        state.select_input(&input);
        assert_eq!(state.load_preview(2).unwrap().unwrap().num_rows(), 2);

        let report = state.convert().unwrap().unwrap();
        assert_eq!(report.rows_read, 3);
        let message = state.status_message.clone().unwrap();
        assert!(message.starts_with("File converted successfully:"));
        assert!(dir.path().join("in.parquet").exists());
    }

    #[test]
    fn failed_convert_records_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = ConverterState::default();
        state.select_input(dir.path().join("missing.csv"));
        assert!(state.convert().unwrap().is_err());
        assert!(state
            .status_message
            .as_deref()
            .unwrap()
            .starts_with("Error converting file:"));
    }
}

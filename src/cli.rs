use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::convert::Conversion;
use crate::data::model::{FileKind, FileRef};
use crate::data::options::{DtypePolicy, Settings, SplitBy};
use crate::state::suggested_output;

/// Convert CSV files to Parquet and back
#[derive(Parser, Debug)]
#[command(name = "csv2parquet", version)]
#[command(about = "Convert CSV files to Parquet and back, optionally splitting the output", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Convert a file, optionally splitting the output
    Convert(ConvertArgs),
    /// Print the first rows of a file
    Preview(PreviewArgs),
}

/// Split modes exposed on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SplitMode {
    Date,
    Length,
}

impl SplitMode {
    fn as_str(self) -> &'static str {
        match self {
            SplitMode::Date => "date",
            SplitMode::Length => "length",
        }
    }
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Input file (.csv, .csv.gz, ..., .parquet)
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output file; defaults to the input with the other format's extension
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Input format (csv or parquet); inferred from the extension if omitted
    #[arg(long = "from", value_name = "KIND")]
    pub input_kind: Option<String>,

    /// Output format (csv or parquet); inferred from the output path if omitted
    #[arg(long = "to", value_name = "KIND")]
    pub output_kind: Option<String>,

    /// JSON file with "read" and "write" option objects
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Split the output by date or into equal parts
    #[arg(long = "split", value_name = "MODE")]
    pub split: Option<SplitMode>,

    /// "Last X Months", "Monthly", "Yearly" for date splits, a part count for length splits
    #[arg(long = "split-by", value_name = "VALUE")]
    pub split_by: Option<String>,

    /// Column holding the dates for a date split
    #[arg(long = "date-col", value_name = "COLUMN")]
    pub date_col: Option<String>,

    /// Months kept by "Last X Months"
    #[arg(long = "month-n", value_name = "N")]
    pub month_n: Option<u32>,

    /// Write the row index
    #[arg(long)]
    pub index: bool,

    /// Text encoding of CSV input
    #[arg(long, value_name = "ENCODING")]
    pub encoding: Option<String>,

    /// Read every CSV column as text instead of inferring types
    #[arg(long)]
    pub text: bool,

    /// Field delimiter for CSV input and output
    #[arg(long, value_name = "CHAR")]
    pub delimiter: Option<char>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Number of rows to show
    #[arg(long, default_value_t = 20)]
    pub rows: usize,

    /// Input format (csv or parquet); inferred from the extension if omitted
    #[arg(long = "from", value_name = "KIND")]
    pub input_kind: Option<String>,

    /// Text encoding of CSV input
    #[arg(long, value_name = "ENCODING")]
    pub encoding: Option<String>,
}

/// Parse command-line arguments, exiting with usage on error.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

fn file_ref(path: PathBuf, kind: Option<&str>) -> Result<FileRef> {
    match kind {
        Some(kind) => {
            let kind: FileKind = kind.parse()?;
            Ok(FileRef::new(path, kind))
        }
        None => Ok(FileRef::infer(path)),
    }
}

impl ConvertArgs {
    /// Settings file values with command-line flags layered on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.settings {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };

        let read = &mut settings.read;
        if let Some(encoding) = &self.encoding {
            read.encoding = encoding.clone();
        }
        if self.text {
            read.dtype = Some(DtypePolicy::Text);
        }

        let write = &mut settings.write;
        if let Some(delimiter) = self.delimiter {
            read.delimiter = delimiter;
            write.save.delimiter = delimiter;
        }
        if self.index {
            write.save.index = true;
        }
        if let Some(mode) = self.split {
            write.split.to_split = Some(mode.as_str().to_string());
        }
        if let Some(split_by) = &self.split_by {
            write.split.split_by = Some(SplitBy::Label(split_by.clone()));
        }
        if let Some(date_col) = &self.date_col {
            write.split.date_col = Some(date_col.clone());
        }
        if let Some(month_n) = self.month_n {
            write.split.month_n = month_n;
        }
        Ok(settings)
    }

    pub fn to_conversion(&self) -> Result<Conversion> {
        let input = file_ref(self.input.clone(), self.input_kind.as_deref())
            .context("invalid input format")?;

        let output = match (&self.output, self.output_kind.as_deref()) {
            (Some(path), kind) => file_ref(path.clone(), kind),
            (None, Some(kind)) => {
                let kind: FileKind = kind.parse()?;
                Ok(FileRef::new(suggested_output(&input.path, kind), kind))
            }
            (None, None) => {
                let kind = input.kind.counterpart();
                Ok(FileRef::new(suggested_output(&input.path, kind), kind))
            }
        }
        .context("invalid output format")?;
        if output.path == input.path {
            bail!(
                "output {} is the input file; choose another path with -o",
                output.path.display()
            );
        }

        let settings = self.settings()?;
        Ok(Conversion::new(input, output)
            .with_read_options(settings.read)
            .with_write_options(settings.write))
    }
}

impl PreviewArgs {
    pub fn input(&self) -> Result<FileRef> {
        file_ref(self.input.clone(), self.input_kind.as_deref()).context("invalid input format")
    }
}

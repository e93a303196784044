//! The conversion pipeline: read, optionally split, write.

use std::path::PathBuf;

use crate::data::loader;
use crate::data::model::{FileRef, Table};
use crate::data::options::{ReadOptions, SaveOptions, SplitPlan, SplitPolicy, WriteOptions};
use crate::data::split::{self, Fragment};
use crate::data::writer;
use crate::error::{ConvertError, Result, SplitError};

/// One file produced by a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub path: PathBuf,
    pub rows: usize,
}

/// What a successful [`Conversion::convert`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionReport {
    pub rows_read: usize,
    pub outputs: Vec<WrittenFile>,
}

/// A single input → output conversion with its options.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub input: FileRef,
    pub output: FileRef,
    pub read_options: ReadOptions,
    pub write_options: WriteOptions,
}

impl Conversion {
    pub fn new(input: FileRef, output: FileRef) -> Self {
        Self {
            input,
            output,
            read_options: ReadOptions::default(),
            write_options: WriteOptions::default(),
        }
    }

    pub fn with_read_options(mut self, options: ReadOptions) -> Self {
        self.read_options = options;
        self
    }

    pub fn with_write_options(mut self, options: WriteOptions) -> Self {
        self.write_options = options;
        self
    }

    /// Read the input and write it whole or in fragments.
    ///
    /// Any problem with the split instructions, including failures while
    /// writing fragments, is returned as
    /// [`ConvertError::InvalidSplitConfiguration`] with the cause attached.
    pub fn convert(&self) -> Result<ConversionReport> {
        let table = loader::read(&self.input, &self.read_options)?;
        let (request, save_options) = self.write_options.clone().into_parts();

        let policy = request
            .resolve(&table)
            .map_err(ConvertError::InvalidSplitConfiguration)?;
        log::debug!("split policy for {}: {policy:?}", self.output.path.display());

        let outputs = match policy {
            SplitPolicy::Whole => {
                writer::save(&table, &self.output, &save_options)?;
                vec![WrittenFile {
                    path: self.output.path.clone(),
                    rows: table.num_rows(),
                }]
            }
            SplitPolicy::Split(plan) => self
                .write_split(&table, &plan, &save_options)
                .map_err(ConvertError::InvalidSplitConfiguration)?,
        };

        Ok(ConversionReport {
            rows_read: table.num_rows(),
            outputs,
        })
    }

    fn write_split(
        &self,
        table: &Table,
        plan: &SplitPlan,
        options: &SaveOptions,
    ) -> std::result::Result<Vec<WrittenFile>, SplitError> {
        let fragments: Vec<Fragment> = match plan {
            SplitPlan::ByDate {
                column,
                timeframe,
                month_n,
            } => split::split_by_date(table, &self.output, column, *timeframe, *month_n)?,
            SplitPlan::ByParts(parts) => split::split_by_parts(table, &self.output, *parts),
        };
        log::info!(
            "Splitting {} rows into {} file(s)",
            table.num_rows(),
            fragments.len()
        );

        split::write_fragments(&fragments, self.output.kind, options)?;
        Ok(fragments
            .into_iter()
            .map(|f| WrittenFile {
                rows: f.table.num_rows(),
                path: f.path,
            })
            .collect())
    }
}

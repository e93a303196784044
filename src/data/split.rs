use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::{Path, PathBuf};

use arrow::array::timezone::Tz;
use arrow::array::{Array, ArrayRef, AsArray, BooleanArray, UInt32Array};
use arrow::compute::kernels::cast::{cast_with_options, CastOptions};
use arrow::datatypes::{DataType, TimeUnit, TimestampMillisecondType};
use chrono::{Datelike, Months, NaiveDateTime, NaiveTime};

use super::compression::strip_codec_suffix;
use super::model::{FileKind, FileRef, Table};
use super::options::{SaveOptions, Timeframe};
use super::writer;
use crate::error::SplitError;

// ---------------------------------------------------------------------------
// Fragments
// ---------------------------------------------------------------------------

/// One piece of a split table and the file it goes to.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub table: Table,
    pub path: PathBuf,
}

/// Write every fragment in order. Stops at the first failure; fragments
/// already written stay on disk.
pub fn write_fragments(
    fragments: &[Fragment],
    kind: FileKind,
    options: &SaveOptions,
) -> Result<(), SplitError> {
    for fragment in fragments {
        let output = FileRef::new(&fragment.path, kind);
        writer::save(&fragment.table, &output, options).map_err(|e| SplitError::Write {
            path: fragment.path.clone(),
            source: Box::new(e),
        })?;
    }
    Ok(())
}

/// Destination of the fragment labelled `label`.
///
/// `sales.parquet` + `2021` → `sales_2021.parquet`. Only the file name's own
/// extension is replaced, so `parquet_data/sales` → `parquet_data/sales_2021.parquet`.
/// CSV outputs keep a trailing compression suffix: `sales.csv.gz` → `sales_2021.csv.gz`.
pub fn fragment_path(output: &FileRef, label: &str) -> PathBuf {
    let ext = output.kind.extension();
    let file_name = output
        .path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (name, codec_suffix) = match output.kind {
        FileKind::Csv => strip_codec_suffix(&file_name),
        FileKind::Parquet => (file_name.as_str(), ""),
    };
    let stem = strip_extension(name, ext);
    let part_name = format!("{stem}_{label}.{ext}{codec_suffix}");

    match output.path.parent() {
        Some(parent) => parent.join(part_name),
        None => PathBuf::from(part_name),
    }
}

fn strip_extension<'a>(name: &'a str, ext: &str) -> &'a str {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(found) if found.eq_ignore_ascii_case(ext) => &name[..name.len() - found.len() - 1],
        _ => name,
    }
}

// ---------------------------------------------------------------------------
// Split by row count
// ---------------------------------------------------------------------------

/// Balanced contiguous ranges: part `i` is `i*N/n .. (i+1)*N/n`.
pub fn part_ranges(n_rows: usize, parts: NonZeroUsize) -> Vec<Range<usize>> {
    let parts = parts.get();
    (0..parts)
        .map(|i| (i * n_rows / parts)..((i + 1) * n_rows / parts))
        .collect()
}

/// Cut the table into `parts` nearly equal pieces named `<base>_part_<i>`.
pub fn split_by_parts(table: &Table, output: &FileRef, parts: NonZeroUsize) -> Vec<Fragment> {
    part_ranges(table.num_rows(), parts)
        .into_iter()
        .enumerate()
        .map(|(i, range)| Fragment {
            table: table.slice(range.start, range.len()),
            path: fragment_path(output, &format!("part_{}", i + 1)),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Split by date
// ---------------------------------------------------------------------------

/// Split on the dates in `column`.
///
/// Rows whose date is null belong to no group and never pass the cutoff.
pub fn split_by_date(
    table: &Table,
    output: &FileRef,
    column: &str,
    timeframe: Timeframe,
    month_n: u32,
) -> Result<Vec<Fragment>, SplitError> {
    let array = table
        .column(column)
        .ok_or_else(|| SplitError::DateColumnNotFound(column.to_string()))?;
    let stamps = timestamps(array, column)?;

    match timeframe {
        Timeframe::LastMonths => {
            let kept = last_months(table, &stamps, month_n)?;
            Ok(vec![Fragment {
                table: kept,
                path: output.path.clone(),
            }])
        }
        Timeframe::Yearly => group_by_period(table, output, &stamps, |ts| (ts.year(), None)),
        Timeframe::Monthly => {
            group_by_period(table, output, &stamps, |ts| (ts.year(), Some(ts.month())))
        }
    }
}

/// Convert a date-like column to naive timestamps. Strings are parsed; a
/// value that does not parse is an error. Zoned timestamps become wall-clock
/// time in their own zone.
pub fn timestamps(array: &ArrayRef, column: &str) -> Result<Vec<Option<NaiveDateTime>>, SplitError> {
    let parse_error = |source| SplitError::DateParse {
        column: column.to_string(),
        source,
    };
    let zone = match array.data_type() {
        DataType::Timestamp(_, Some(tz)) => Some(tz.clone()),
        _ => None,
    };
    let options = CastOptions {
        safe: false,
        ..Default::default()
    };
    let cast = cast_with_options(
        array,
        &DataType::Timestamp(TimeUnit::Millisecond, zone.clone()),
        &options,
    )
    .map_err(parse_error)?;
    let millis = cast.as_primitive::<TimestampMillisecondType>();

    let tz: Option<Tz> = zone
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(parse_error)?;
    Ok((0..millis.len())
        .map(|i| {
            if millis.is_null(i) {
                return None;
            }
            match tz {
                Some(tz) => millis
                    .value_as_datetime_with_tz(i, tz)
                    .map(|local| local.naive_local()),
                None => millis.value_as_datetime(i),
            }
        })
        .collect())
}

/// Cutoff for "Last X Months": the first day of the latest month, minus
/// `month_n` months.
pub fn trailing_cutoff(latest: NaiveDateTime, month_n: u32) -> Result<NaiveDateTime, SplitError> {
    latest
        .date()
        .with_day(1)
        .and_then(|first| first.checked_sub_months(Months::new(month_n)))
        .map(|day| day.and_time(NaiveTime::MIN))
        .ok_or_else(|| SplitError::CutoffOutOfRange {
            latest: latest.to_string(),
            months: month_n,
        })
}

fn last_months(
    table: &Table,
    stamps: &[Option<NaiveDateTime>],
    month_n: u32,
) -> Result<Table, SplitError> {
    let Some(latest) = stamps.iter().flatten().max().copied() else {
        log::debug!("date column has no values, nothing to keep");
        return Ok(table.slice(0, 0));
    };
    let cutoff = trailing_cutoff(latest, month_n)?;
    log::debug!("keeping rows after {cutoff} (latest {latest}, {month_n} months)");

    let mask: BooleanArray = stamps
        .iter()
        .map(|ts| Some(ts.is_some_and(|ts| ts > cutoff)))
        .collect();
    table.filter(&mask).map_err(SplitError::Select)
}

fn group_by_period(
    table: &Table,
    output: &FileRef,
    stamps: &[Option<NaiveDateTime>],
    period: impl Fn(&NaiveDateTime) -> (i32, Option<u32>),
) -> Result<Vec<Fragment>, SplitError> {
    let mut groups: BTreeMap<(i32, Option<u32>), Vec<u32>> = BTreeMap::new();
    for (row, ts) in stamps.iter().enumerate() {
        if let Some(ts) = ts {
            groups.entry(period(ts)).or_default().push(row as u32);
        }
    }
    log::debug!("date split produced {} groups", groups.len());

    groups
        .into_iter()
        .map(|((year, month), rows)| {
            let label = match month {
                Some(month) => format!("{year}_{month:02}"),
                None => year.to_string(),
            };
            let table = table
                .take(&UInt32Array::from(rows))
                .map_err(SplitError::Select)?;
            Ok(Fragment {
                table,
                path: fragment_path(output, &label),
            })
        })
        .collect()
}

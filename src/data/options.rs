use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::str::FromStr;

use encoding_rs::{Encoding, UTF_8};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use super::model::Table;
use crate::error::{ConvertError, Result, SplitError};

pub const DEFAULT_ENCODING: &str = "utf-8";
pub const FALLBACK_ENCODING: &str = "ISO-8859-1";

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// How CSV columns get their types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtypePolicy {
    /// Infer integers, floats, booleans, dates and timestamps from content.
    Infer,
    /// Every column is read as text.
    Text,
}

/// Options for [`crate::data::loader::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub encoding: String,
    /// Ignored for Parquet input.
    pub dtype: Option<DtypePolicy>,
    /// Infer the CSV schema from the first records only.
    pub low_memory: bool,
    pub delimiter: char,
    pub has_header: bool,
    pub quote: char,
    pub escape: Option<char>,
    pub comment: Option<char>,
    /// Stop after this many rows.
    pub nrows: Option<usize>,
    /// Only load these columns.
    pub columns: Option<Vec<String>>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            encoding: DEFAULT_ENCODING.to_string(),
            dtype: None,
            low_memory: false,
            delimiter: ',',
            has_header: true,
            quote: '"',
            escape: None,
            comment: None,
            nrows: None,
            columns: None,
        }
    }
}

impl ReadOptions {
    /// A copy with the `dtype` option removed, as Parquet readers expect.
    pub fn without_dtype(&self) -> Self {
        Self {
            dtype: None,
            ..self.clone()
        }
    }

    pub fn with_encoding(&self, encoding: &str) -> Self {
        Self {
            encoding: encoding.to_string(),
            ..self.clone()
        }
    }

    pub fn with_nrows(&self, nrows: usize) -> Self {
        Self {
            nrows: Some(nrows),
            ..self.clone()
        }
    }

    pub fn dtype_policy(&self) -> DtypePolicy {
        self.dtype.unwrap_or(DtypePolicy::Infer)
    }

    /// Resolve the `encoding` label (`utf8`, `latin1`, `cp1252`, ...).
    pub fn resolved_encoding(&self) -> Result<&'static Encoding> {
        Encoding::for_label(self.encoding.trim().as_bytes())
            .ok_or_else(|| ConvertError::UnsupportedEncoding(self.encoding.clone()))
    }

    /// Whether the configured encoding is UTF-8, which enables the
    /// single-byte fallback.
    pub fn uses_default_encoding(&self) -> bool {
        matches!(self.resolved_encoding(), Ok(enc) if enc == UTF_8)
    }
}

/// Single-byte value of a delimiter/quote style option.
pub(crate) fn ascii_byte(option: &'static str, c: char) -> Result<u8> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| ConvertError::InvalidOption {
            option,
            value: c.to_string(),
        })
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Parquet page compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    None,
    #[default]
    Snappy,
    Gzip,
    Zstd,
    Lz4,
    Brotli,
}

/// Writer-facing options, everything in [`WriteOptions`] except the split keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Write the row index.
    pub index: bool,
    pub delimiter: char,
    pub header: bool,
    pub quote: char,
    pub null_value: Option<String>,
    pub date_format: Option<String>,
    pub datetime_format: Option<String>,
    pub compression: ParquetCompression,
    pub row_group_size: Option<usize>,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            index: false,
            delimiter: ',',
            header: true,
            quote: '"',
            null_value: None,
            date_format: None,
            datetime_format: None,
            compression: ParquetCompression::default(),
            row_group_size: None,
        }
    }
}

/// `split_by` accepts a timeframe label or a part count; counts may arrive
/// as strings from form fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitBy {
    Count(i64),
    Label(String),
}

impl SplitBy {
    fn as_label(&self) -> String {
        match self {
            SplitBy::Count(n) => n.to_string(),
            SplitBy::Label(s) => s.clone(),
        }
    }

    fn as_count(&self) -> Option<i64> {
        match self {
            SplitBy::Count(n) => Some(*n),
            SplitBy::Label(s) => s.trim().parse().ok(),
        }
    }
}

impl From<&str> for SplitBy {
    fn from(s: &str) -> Self {
        SplitBy::Label(s.to_string())
    }
}

impl From<i64> for SplitBy {
    fn from(n: i64) -> Self {
        SplitBy::Count(n)
    }
}

fn default_month_n() -> u32 {
    1
}

/// `to_split` as written in settings files: a mode name, `false` or `null`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ModeOrFlag {
    Mode(String),
    Flag(bool),
}

fn mode_or_false<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<ModeOrFlag>::deserialize(deserializer)? {
        None | Some(ModeOrFlag::Flag(false)) => Ok(None),
        Some(ModeOrFlag::Mode(mode)) => Ok(Some(mode)),
        Some(ModeOrFlag::Flag(true)) => Err(D::Error::custom(
            "to_split must be \"date\", \"length\" or false",
        )),
    }
}

/// The orchestration keys of [`WriteOptions`]. Never reaches the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitRequest {
    /// `"date"`, `"length"` or nothing. `false` in a settings file means nothing.
    #[serde(default, deserialize_with = "mode_or_false")]
    pub to_split: Option<String>,
    #[serde(default)]
    pub split_by: Option<SplitBy>,
    #[serde(default)]
    pub date_col: Option<String>,
    /// Months kept by `"Last X Months"`.
    #[serde(default = "default_month_n")]
    pub month_n: u32,
}

impl Default for SplitRequest {
    fn default() -> Self {
        Self {
            to_split: None,
            split_by: None,
            date_col: None,
            month_n: default_month_n(),
        }
    }
}

/// Flat write configuration as supplied by a front end or settings file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    #[serde(flatten)]
    pub split: SplitRequest,
    #[serde(flatten)]
    pub save: SaveOptions,
}

impl WriteOptions {
    /// Separate the orchestration keys from the options the writer sees.
    pub fn into_parts(self) -> (SplitRequest, SaveOptions) {
        (self.split, self.save)
    }
}

// ---------------------------------------------------------------------------
// Split policy
// ---------------------------------------------------------------------------

/// Date split granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeframe {
    /// Only the trailing `month_n` months, as one file.
    LastMonths,
    Monthly,
    Yearly,
}

impl Timeframe {
    pub const ALL: [Timeframe; 3] = [Timeframe::LastMonths, Timeframe::Monthly, Timeframe::Yearly];

    pub const fn label(self) -> &'static str {
        match self {
            Timeframe::LastMonths => "Last X Months",
            Timeframe::Monthly => "Monthly",
            Timeframe::Yearly => "Yearly",
        }
    }
}

impl FromStr for Timeframe {
    type Err = SplitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Timeframe::ALL
            .into_iter()
            .find(|t| t.label() == s)
            .ok_or_else(|| SplitError::UnknownTimeframe(s.to_string()))
    }
}

/// A validated split decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPolicy {
    Whole,
    Split(SplitPlan),
}

/// How a table is cut into several files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SplitPlan {
    ByDate {
        column: String,
        timeframe: Timeframe,
        month_n: u32,
    },
    ByParts(NonZeroUsize),
}

impl SplitRequest {
    pub fn is_requested(&self) -> bool {
        self.to_split.as_deref().is_some_and(|m| !m.trim().is_empty())
    }

    /// Validate the request against the loaded table.
    pub fn resolve(&self, table: &Table) -> std::result::Result<SplitPolicy, SplitError> {
        if !self.is_requested() {
            return Ok(SplitPolicy::Whole);
        }
        let mode = self.to_split.as_deref().unwrap_or_default().trim();
        let split_by = self.split_by.as_ref().ok_or(SplitError::MissingSplitBy)?;

        match mode {
            "date" => {
                let timeframe: Timeframe = split_by.as_label().parse()?;
                let column = self.date_col.clone().ok_or(SplitError::MissingDateColumn)?;
                if !table.has_column(&column) {
                    return Err(SplitError::DateColumnNotFound(column));
                }
                Ok(SplitPolicy::Split(SplitPlan::ByDate {
                    column,
                    timeframe,
                    month_n: self.month_n,
                }))
            }
            "length" => split_by
                .as_count()
                .and_then(|n| usize::try_from(n).ok())
                .and_then(NonZeroUsize::new)
                .map(|parts| SplitPolicy::Split(SplitPlan::ByParts(parts)))
                .ok_or_else(|| SplitError::InvalidPartCount(split_by.as_label())),
            other => Err(SplitError::UnknownMode(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Settings file
// ---------------------------------------------------------------------------

/// Read and write options stored together in a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub read: ReadOptions,
    pub write: WriteOptions,
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow::array::{Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use rstest::rstest;

    use super::*;

    fn table() -> Table {
        let schema = Arc::new(Schema::new(vec![
            Field::new("when", DataType::Utf8, false),
            Field::new("amount", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["2021-01-05", "2022-03-01"])),
                Arc::new(Int64Array::from(vec![1, 2])),
            ],
        )
        .unwrap();
        Table::new(batch)
    }

    fn request(to_split: &str, split_by: SplitBy, date_col: Option<&str>) -> SplitRequest {
        SplitRequest {
            to_split: Some(to_split.to_string()),
            split_by: Some(split_by),
            date_col: date_col.map(str::to_string),
            ..SplitRequest::default()
        }
    }

    #[test]
    fn partial_json_uses_defaults() {
        let settings: Settings = serde_json::from_str(
            r#"{"read": {"encoding": "latin1"}, "write": {"to_split": "length", "split_by": "3", "index": true}}"#,
        )
        .unwrap();
        assert_eq!(settings.read.encoding, "latin1");
        assert!(!settings.read.low_memory);
        assert_eq!(settings.read.delimiter, ',');

        let (split, save) = settings.write.into_parts();
        assert_eq!(split.to_split.as_deref(), Some("length"));
        assert_eq!(split.split_by, Some(SplitBy::Label("3".to_string())));
        assert_eq!(split.month_n, 1);
        assert!(save.index);
        assert_eq!(save.compression, ParquetCompression::Snappy);
    }

    #[test]
    fn derived_read_options_leave_original_alone() {
        let original = ReadOptions {
            dtype: Some(DtypePolicy::Text),
            ..ReadOptions::default()
        };
        let stripped = original.without_dtype();
        let latin = original.with_encoding(FALLBACK_ENCODING);
        assert_eq!(stripped.dtype, None);
        assert_eq!(original.dtype, Some(DtypePolicy::Text));
        assert_eq!(original.encoding, DEFAULT_ENCODING);
        assert!(!latin.uses_default_encoding());
        assert!(original.uses_default_encoding());
    }

    #[test]
    fn encoding_labels_resolve() {
        assert!(ReadOptions::default().with_encoding("UTF8").uses_default_encoding());
        assert!(ReadOptions::default().with_encoding("latin1").resolved_encoding().is_ok());
        let err = ReadOptions::default()
            .with_encoding("klingon")
            .resolved_encoding()
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedEncoding(_)));
    }

    #[test]
    fn no_split_requested() {
        assert_eq!(SplitRequest::default().resolve(&table()).unwrap(), SplitPolicy::Whole);
        let blank = SplitRequest {
            to_split: Some(String::new()),
            ..SplitRequest::default()
        };
        assert_eq!(blank.resolve(&table()).unwrap(), SplitPolicy::Whole);
    }

    #[rstest]
    #[case::flag_false(r#"{"write": {"to_split": false, "split_by": 3}}"#)]
    #[case::null(r#"{"write": {"to_split": null}}"#)]
    #[case::absent(r#"{"write": {"index": true}}"#)]
    fn falsy_to_split_writes_whole(#[case] json: &str) {
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.write.split.to_split, None);
        assert_eq!(settings.write.split.resolve(&table()).unwrap(), SplitPolicy::Whole);
    }

    #[test]
    fn to_split_true_is_rejected() {
        let parsed = serde_json::from_str::<Settings>(r#"{"write": {"to_split": true}}"#);
        assert!(parsed.is_err());
    }

    #[rstest]
    #[case(SplitBy::Count(3), 3)]
    #[case(SplitBy::Label("4".into()), 4)]
    #[case(SplitBy::Label(" 1 ".into()), 1)]
    fn length_split_counts(#[case] split_by: SplitBy, #[case] expected: usize) {
        let policy = request("length", split_by, None).resolve(&table()).unwrap();
        assert_eq!(
            policy,
            SplitPolicy::Split(SplitPlan::ByParts(NonZeroUsize::new(expected).unwrap()))
        );
    }

    #[rstest]
    #[case(SplitBy::Count(0))]
    #[case(SplitBy::Count(-2))]
    #[case(SplitBy::Label("three".into()))]
    fn bad_part_counts(#[case] split_by: SplitBy) {
        let err = request("length", split_by, None).resolve(&table()).unwrap_err();
        assert!(matches!(err, SplitError::InvalidPartCount(_)));
    }

    #[test]
    fn date_split_checks_label_and_column() {
        let ok = request("date", "Monthly".into(), Some("when")).resolve(&table());
        assert!(matches!(
            ok,
            Ok(SplitPolicy::Split(SplitPlan::ByDate {
                timeframe: Timeframe::Monthly,
                month_n: 1,
                ..
            }))
        ));

        let bad_label = request("date", "Weekly".into(), Some("when")).resolve(&table());
        assert!(matches!(bad_label, Err(SplitError::UnknownTimeframe(_))));

        let bad_col = request("date", "Yearly".into(), Some("missing")).resolve(&table());
        assert!(matches!(bad_col, Err(SplitError::DateColumnNotFound(_))));

        let no_col = request("date", "Yearly".into(), None).resolve(&table());
        assert!(matches!(no_col, Err(SplitError::MissingDateColumn)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = request("rows", SplitBy::Count(2), None).resolve(&table()).unwrap_err();
        assert!(matches!(err, SplitError::UnknownMode(m) if m == "rows"));
    }
}

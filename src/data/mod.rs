/// Data layer: tables, reading, splitting and writing.
///
/// Architecture:
/// ```text
///  .csv[.gz|.bz2|.xz|.zst|.zip] / .parquet
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  decode + parse file → Table   (compression, options)
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  split    │  none / by date / by row count → Vec<Fragment>
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │  writer   │  Table → .csv[.gz|...] / .parquet
///   └──────────┘
/// ```

pub mod compression;
pub mod loader;
pub mod model;
pub mod options;
pub mod split;
pub mod writer;
